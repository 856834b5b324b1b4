use common::{hints::HINT_OWNER, notification::EXPIRE_DEFAULT, protocol::Urgency};
use serde::{Deserialize, Serialize};

use crate::notification::Notification;

/// Defaults applied to every notification the CLI sends.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub app_icon: Option<String>,
    #[serde(default = "default_expire_timeout")]
    pub expire_timeout: i32,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub category: Option<String>,
    /// Replaces the process name in the owner hint.
    #[serde(default)]
    pub owner: Option<String>,
}
impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            app_name: None,
            app_icon: None,
            expire_timeout: default_expire_timeout(),
            urgency: Urgency::default(),
            category: None,
            owner: None,
        }
    }
}
impl ClientConfig {
    pub fn apply(&self, notification: &mut Notification) {
        if let Some(app_name) = &self.app_name {
            notification.set_app_name(app_name.as_str());
        }
        if let Some(app_icon) = &self.app_icon {
            notification.set_app_icon(app_icon.as_str());
        }
        if let Some(category) = &self.category {
            notification.set_category(category.as_str());
        }
        if let Some(owner) = self.owner.as_deref().filter(|o| !o.is_empty()) {
            notification.set_hint_value(HINT_OWNER, owner);
        }
        notification.set_expire_timeout(self.expire_timeout);
        notification.set_urgency(self.urgency);
    }
}

fn default_expire_timeout() -> i32 {
    EXPIRE_DEFAULT
}
