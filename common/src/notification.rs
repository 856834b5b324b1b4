use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use zbus::zvariant::{OwnedValue, Type};

use crate::{
    actions::{ActionInfo, decode_actions, encode_actions},
    hints::Hints,
    notify_err,
    utils::errors::{NotifyError, NotifyErrorKind},
};

/// Manager default expiry.
pub const EXPIRE_DEFAULT: i32 = -1;
/// Never expire.
pub const EXPIRE_NEVER: i32 = 0;

/// The notification tuple exactly as marshalled, `(susssasa{sv}i)`.
#[derive(Deserialize, Serialize, Type, Debug, Default)]
pub struct NotificationRecord {
    pub app_name: String,
    pub replaces_id: u32,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<String>,
    pub hints: HashMap<String, OwnedValue>,
    pub expire_timeout: i32,
}

/// Typed view of a [`NotificationRecord`].
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationData {
    pub app_name: String,
    pub replaces_id: u32,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<ActionInfo>,
    pub hints: Hints,
    pub expire_timeout: i32,
}
impl Default for NotificationData {
    fn default() -> Self {
        Self {
            app_name: String::new(),
            replaces_id: 0,
            app_icon: String::new(),
            summary: String::new(),
            body: String::new(),
            actions: Vec::new(),
            hints: Hints::new(),
            expire_timeout: EXPIRE_DEFAULT,
        }
    }
}
impl NotificationData {
    pub fn wire_actions(&self) -> Vec<String> {
        encode_actions(&self.actions)
    }
}
impl From<&NotificationRecord> for NotificationData {
    fn from(record: &NotificationRecord) -> Self {
        Self {
            app_name: record.app_name.clone(),
            replaces_id: record.replaces_id,
            app_icon: record.app_icon.clone(),
            summary: record.summary.clone(),
            body: record.body.clone(),
            actions: decode_actions(&record.actions),
            hints: Hints::from_wire(&record.hints),
            expire_timeout: record.expire_timeout,
        }
    }
}
impl From<NotificationRecord> for NotificationData {
    fn from(record: NotificationRecord) -> Self {
        Self::from(&record)
    }
}
impl TryFrom<&NotificationData> for NotificationRecord {
    type Error = NotifyError;

    fn try_from(data: &NotificationData) -> Result<Self, Self::Error> {
        let hints = data
            .hints
            .to_wire()
            .into_iter()
            .map(|(k, v)| {
                OwnedValue::try_from(v)
                    .map(|v| (k.clone(), v))
                    .map_err(|e| notify_err!(NotifyErrorKind::Serialize, "hint {}: {}", k, e))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self {
            app_name: data.app_name.clone(),
            replaces_id: data.replaces_id,
            app_icon: data.app_icon.clone(),
            summary: data.summary.clone(),
            body: data.body.clone(),
            actions: data.wire_actions(),
            hints,
            expire_timeout: data.expire_timeout,
        })
    }
}
