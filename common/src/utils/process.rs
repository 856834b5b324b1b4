use std::path::PathBuf;

use crate::{
    notify_err,
    utils::errors::{NotifyError, NotifyErrorKind},
};

fn current_exe() -> Result<PathBuf, NotifyError> {
    std::env::current_exe().map_err(|e| notify_err!(NotifyErrorKind::EnvVar, e.to_string()))
}

/// Returns the name this process publishes notifications under.
///
/// Defaults to the file stem of the running executable. Falls back to the
/// first command line argument, and finally to `"unknown"`.
pub fn process_name() -> String {
    let from_exe = current_exe().ok().and_then(|path| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    });
    if let Some(name) = from_exe.filter(|n| !n.is_empty()) {
        return name;
    }

    std::env::args()
        .next()
        .and_then(|arg0| {
            PathBuf::from(arg0)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_name_is_never_empty() {
        assert!(!process_name().is_empty());
    }
}
