use std::{
    fs::File,
    io::{BufReader, ErrorKind},
    path::{Path, PathBuf},
};

use common::{
    notify_err,
    utils::errors::{NotifyError, NotifyErrorKind},
};
use tracing::debug;

mod structs;
pub use structs::ClientConfig;

const CONFIG_FILE: &str = "config.json";

/// `$XDG_CONFIG_HOME/nemo-notify/config.json`
pub fn config_path() -> Result<PathBuf, NotifyError> {
    let dir = xdg::BaseDirectories::with_prefix("nemo-notify")
        .get_config_home()
        .ok_or_else(|| notify_err!(NotifyErrorKind::DirRead, "Could not find config directory"))?;
    Ok(dir.join(CONFIG_FILE))
}

pub fn load_config() -> Result<ClientConfig, NotifyError> {
    load_config_from(&config_path()?)
}

/// Reads the config at `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, NotifyError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(ClientConfig::default());
        }
        Err(e) => return Err(notify_err!(NotifyErrorKind::FileOpen, e.to_string())),
    };

    let reader = BufReader::new(file);
    serde_json::from_reader::<_, ClientConfig>(reader).map_err(|e| {
        notify_err!(
            NotifyErrorKind::Deserialize,
            "{}: {}",
            path.display(),
            e
        )
    })
}
