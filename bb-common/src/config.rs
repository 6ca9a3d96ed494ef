//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration is deliberately small: everything here is read once at
//! startup. Resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable config file never stops startup; defaults are used
//! and a warning is logged.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "BB_ROOT_FOLDER";

/// Environment variable overriding the config file location
pub const CONFIG_FILE_ENV: &str = "BB_CONFIG";

/// Default config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "bb-server.toml";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "breadboard.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database (and anything else the server writes)
    pub root_folder: Option<PathBuf>,

    /// Explicit database path; defaults to `<root_folder>/breadboard.db`
    pub database_path: Option<PathBuf>,

    /// HTTP listen address
    pub bind: String,

    /// Half-width of the run matching window, in seconds
    pub match_tolerance_secs: u64,

    /// Lifetime of cached list responses, in seconds (0 disables caching)
    pub list_cache_ttl_secs: u64,

    /// Optional webhook receiving new-image notifications
    pub notify_url: Option<String>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            database_path: None,
            bind: default_bind(),
            match_tolerance_secs: 7,
            list_cache_ttl_secs: 60 * 60 * 2,
            notify_url: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:5780".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, falling back to defaults when no file is usable
    ///
    /// `explicit` is the `--config` argument; otherwise `BB_CONFIG` and then
    /// the platform config directory are tried.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let candidate = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(default_config_path);

        match candidate {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => {
                    info!("Loaded configuration from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("{}; using built-in defaults", e);
                    Self::default()
                }
            },
            Some(path) => {
                warn!(
                    "Config file {} not found; using built-in defaults",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("Could not determine config directory; using built-in defaults");
                Self::default()
            }
        }
    }

    /// Run matching tolerance as a duration
    pub fn match_tolerance(&self) -> Duration {
        Duration::from_secs(self.match_tolerance_secs)
    }

    /// List cache lifetime as a duration
    pub fn list_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.list_cache_ttl_secs)
    }

    /// Resolve the database file path for a given root folder
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
    }
}

/// Resolve the root folder following the priority order above
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Platform config file location (`~/.config/breadboard/bb-server.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("breadboard").join(CONFIG_FILE_NAME))
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/breadboard (or /var/lib/breadboard for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("breadboard"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/breadboard"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("breadboard"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/breadboard"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("breadboard"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\breadboard"))
    } else {
        PathBuf::from("./breadboard_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.bind, "127.0.0.1:5780");
        assert_eq!(config.match_tolerance(), Duration::from_secs(7));
        assert_eq!(config.list_cache_ttl(), Duration::from_secs(7200));
        assert_eq!(config.logging.level, "info");
        assert!(config.notify_url.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            match_tolerance_secs = 3

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.match_tolerance_secs, 3);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.bind, "127.0.0.1:5780");
        assert_eq!(config.list_cache_ttl_secs, 7200);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("match_tolerance_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_database_path_defaults_under_root() {
        let config = TomlConfig::default();
        let root = PathBuf::from("/srv/bb");
        assert_eq!(config.database_path(&root), root.join(DATABASE_FILE_NAME));

        let config = TomlConfig {
            database_path: Some(PathBuf::from("/tmp/other.db")),
            ..TomlConfig::default()
        };
        assert_eq!(config.database_path(&root), PathBuf::from("/tmp/other.db"));
    }

    #[test]
    fn test_cli_argument_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..TomlConfig::default()
        };
        let resolved = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }
}
