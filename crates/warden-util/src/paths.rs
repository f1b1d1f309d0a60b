//! Default paths for warden
//!
//! Paths are user-writable by default:
//! - Config: `$XDG_CONFIG_HOME/warden/config.toml` or `~/.config/warden/config.toml`
//! - Data: `$XDG_DATA_HOME/warden` or `~/.local/share/warden`

use std::path::PathBuf;

/// Environment variable for overriding the data directory
pub const WARDEN_DATA_DIR_ENV: &str = "WARDEN_DATA_DIR";

/// Environment variable for overriding the config file
pub const WARDEN_CONFIG_ENV: &str = "WARDEN_CONFIG";

/// Application subdirectory name
const APP_DIR: &str = "warden";

/// Database filename within the data directory
pub const DATABASE_FILENAME: &str = "warden.db";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$WARDEN_CONFIG`
/// 2. `$XDG_CONFIG_HOME/warden/config.toml`
/// 3. `~/.config/warden/config.toml`
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(WARDEN_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join(APP_DIR).join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml");
    }

    PathBuf::from("/etc").join(APP_DIR).join("config.toml")
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$WARDEN_DATA_DIR`
/// 2. `$XDG_DATA_HOME/warden`
/// 3. `~/.local/share/warden`
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(WARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking WARDEN_DATA_DIR.
/// Used for config defaults where the env var is checked separately.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join("data")
}
