//! Default paths for lessord components
//!
//! Paths are user-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/lessord/lessord.sock` or `/tmp/lessord-$USER/lessord.sock`
//! - Data: `$XDG_DATA_HOME/lessord` or `~/.local/share/lessord`
//! - Config: `$XDG_CONFIG_HOME/lessor/config.toml` or `~/.config/lessor/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const LESSOR_SOCKET_ENV: &str = "LESSOR_SOCKET";

/// Environment variable for overriding the data directory
pub const LESSOR_DATA_DIR_ENV: &str = "LESSOR_DATA_DIR";

const SOCKET_FILENAME: &str = "lessord.sock";

const APP_DIR: &str = "lessord";

/// Get the default socket path.
///
/// Order of precedence:
/// 1. `$LESSOR_SOCKET` environment variable (if set)
/// 2. `$XDG_RUNTIME_DIR/lessord/lessord.sock` (if XDG_RUNTIME_DIR is set)
/// 3. `/tmp/lessord-$USER/lessord.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(LESSOR_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    socket_path_without_env()
}

/// Get the socket path without checking the LESSOR_SOCKET env var.
pub fn socket_path_without_env() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Get the default data directory.
///
/// Order of precedence:
/// 1. `$LESSOR_DATA_DIR` environment variable (if set)
/// 2. `$XDG_DATA_HOME/lessord` (if XDG_DATA_HOME is set)
/// 3. `~/.local/share/lessord` (fallback)
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(LESSOR_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    data_dir_without_env()
}

/// Get the data directory without checking the LESSOR_DATA_DIR env var.
pub fn data_dir_without_env() -> PathBuf {
    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share").join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Get the default configuration file path.
pub fn default_config_path() -> PathBuf {
    let config_home = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .unwrap_or_else(|_| PathBuf::from("/etc"));

    config_home.join("lessor").join("config.toml")
}
