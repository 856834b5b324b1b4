use base64::{Engine, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    hints::HintValue,
    notify_err,
    utils::errors::{NotifyError, NotifyErrorKind},
};

/// D-Bus method invoked by the manager when a remote action fires.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CallbackTarget {
    pub service: String,
    pub path: String,
    pub interface: String,
    pub method: String,
    pub arguments: Vec<HintValue>,
}
impl CallbackTarget {
    pub fn new(
        service: impl Into<String>,
        path: impl Into<String>,
        interface: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            interface: interface.into(),
            method: method.into(),
            arguments: Vec::new(),
        }
    }
    pub fn with_arguments(mut self, arguments: Vec<HintValue>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Number of identifying fields that are set, 0 through 4.
    pub fn field_count(&self) -> usize {
        [&self.service, &self.path, &self.interface, &self.method]
            .iter()
            .filter(|f| !f.is_empty())
            .count()
    }
    pub fn is_complete(&self) -> bool {
        self.field_count() == 4
    }

    /// Serializes into the single hint string understood by the manager:
    /// `"<service> <path> <iface> <method>[ <base64-arg>]*"`.
    pub fn encode(&self) -> Result<String, NotifyError> {
        let mut s = [
            self.service.as_str(),
            self.path.as_str(),
            self.interface.as_str(),
            self.method.as_str(),
        ]
        .join(" ");

        for arg in &self.arguments {
            let buffer = bincode::serde::encode_to_vec(arg, bincode::config::standard())
                .map_err(|e| notify_err!(NotifyErrorKind::Serialize, e.to_string()))?;
            s.push(' ');
            s.push_str(&general_purpose::STANDARD.encode(buffer));
        }
        Ok(s)
    }

    /// Parses a callback hint.
    ///
    /// Returns `Ok(None)` when fewer than four tokens are present. A corrupt
    /// argument token fails the whole target.
    pub fn decode(hint: &str) -> Result<Option<Self>, NotifyError> {
        let elements: Vec<&str> = hint.split(' ').filter(|t| !t.is_empty()).collect();
        let [service, path, interface, method, args @ ..] = elements.as_slice() else {
            warn!(hint, "Unable to decode invalid remote action");
            return Ok(None);
        };

        let arguments = args
            .iter()
            .map(|arg| decode_argument(arg))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(Self {
            service: (*service).into(),
            path: (*path).into(),
            interface: (*interface).into(),
            method: (*method).into(),
            arguments,
        }))
    }
}

/// Upper bound on the bytes a single decoded argument may claim.
const ARGUMENT_LIMIT: usize = 64 * 1024;

fn decode_argument(token: &str) -> Result<HintValue, NotifyError> {
    let buffer = general_purpose::STANDARD
        .decode(token)
        .map_err(|e| notify_err!(NotifyErrorKind::Base64Decode, e.to_string()))?;
    if buffer.len() > ARGUMENT_LIMIT {
        return Err(notify_err!(
            NotifyErrorKind::Deserialize,
            "argument of {} bytes exceeds limit",
            buffer.len()
        ));
    }
    // Length prefixes are untrusted
    let config = bincode::config::standard().with_limit::<ARGUMENT_LIMIT>();
    let (value, _read) = bincode::serde::decode_from_slice::<HintValue, _>(&buffer, config)
        .map_err(|e| notify_err!(NotifyErrorKind::Deserialize, e.to_string()))?;
    Ok(value)
}
