use std::fmt::Display;

#[macro_export]
macro_rules! notify_err {
    // Case with just a message literal
    ($kind:expr, $msg:expr) => {
        $crate::utils::errors::NotifyError {
            kind: $kind,
            message: $msg.into(),
            file: file!(),
            line: line!(),
        }
    };
    // Case with message + format arguments
    ($kind:expr, $fmt:expr, $($args:tt)*) => {
        $crate::utils::errors::NotifyError {
            kind: $kind,
            message: format!($fmt, $($args)*),
            file: file!(),
            line: line!(),
        }
    };
}

#[derive(Debug)]
pub struct NotifyError {
    pub kind: NotifyErrorKind,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
}
impl Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?}: {} ({}:{})",
            self.kind, self.message, self.file, self.line
        )
    }
}
impl std::error::Error for NotifyError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyErrorKind {
    Serialize,
    Deserialize,

    Base64Decode,

    InvalidAttribute,
    InvalidData,

    FileOpen,
    DirRead,
    EnvVar,

    DBusConnect,
    ProxyCreate,
    DBusProxyCall,
    DBusSignal,
}
