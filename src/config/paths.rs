//! Where the controller looks for its configuration file

use directories::ProjectDirs;
use std::ffi::OsString;
use std::path::PathBuf;

const APP_NAME: &str = "appnav-controller";

/// Overrides the configuration directory when set
pub const CONFIG_DIR_ENV: &str = "APPNAV_CONFIG_DIR";

/// Configuration directory: `APPNAV_CONFIG_DIR` when set, otherwise the
/// platform config directory (`$XDG_CONFIG_HOME/appnav-controller` on Linux).
pub fn config_dir() -> PathBuf {
    config_dir_from(std::env::var_os(CONFIG_DIR_ENV))
}

fn config_dir_from(override_dir: Option<OsString>) -> PathBuf {
    if let Some(dir) = override_dir.filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    match ProjectDirs::from("", "", APP_NAME) {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        // no home directory, e.g. in a bare container
        None => PathBuf::from(APP_NAME),
    }
}

/// Default configuration file
pub fn root_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}
