//! Configuration loading and resolution
//!
//! Bootstrap configuration follows the priority order:
//! 1. Environment variable (highest priority)
//! 2. TOML config file
//! 3. OS-dependent compiled default (fallback)
//!
//! Runtime tunables live in the `settings` database table owned by each
//! service; only bootstrap concerns (database path, port, credentials,
//! logging) are resolved here.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port for the udx-dc classification service
pub const DEFAULT_PORT: u16 = 5811;

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// HTTP server port (default: 5811)
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// API key for the generative model service
    #[serde(default)]
    pub llm_api_key: Option<String>,

    /// Base URL override for the generative model service
    #[serde(default)]
    pub llm_base_url: Option<String>,

    /// Model identifier override (e.g. "gemini-1.5-flash")
    #[serde(default)]
    pub llm_model: Option<String>,

    /// Path to an operator-provided confusion example corpus (TOML)
    #[serde(default)]
    pub confusion_examples_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load TOML configuration from an explicit path or the default location
///
/// A missing file yields built-in defaults; a file that exists but fails to
/// parse is a hard error, since a silently ignored config is a deployment
/// hazard.
pub fn load_toml_config(explicit_path: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit_path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    match path {
        Some(p) if p.exists() => {
            let content = std::fs::read_to_string(&p)
                .map_err(|e| Error::Config(format!("Failed to read config {:?}: {}", p, e)))?;
            let config: TomlConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Failed to parse config {:?}: {}", p, e)))?;
            info!("Loaded TOML configuration from {:?}", p);
            Ok(config)
        }
        Some(p) => {
            if explicit_path.is_some() {
                return Err(Error::Config(format!("Config file not found: {:?}", p)));
            }
            Ok(TomlConfig::default())
        }
        None => Ok(TomlConfig::default()),
    }
}

/// Default configuration file path for the platform
///
/// Linux: `~/.config/udx/udx-dc.toml`, then `/etc/udx/udx-dc.toml`
fn default_config_path() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        if let Some(user_config) = dirs::config_dir().map(|d| d.join("udx").join("udx-dc.toml")) {
            if user_config.exists() {
                return Some(user_config);
            }
        }
        let system_config = PathBuf::from("/etc/udx/udx-dc.toml");
        if system_config.exists() {
            return Some(system_config);
        }
        None
    } else {
        dirs::config_dir().map(|d| d.join("udx").join("udx-dc.toml"))
    }
}

/// Resolve the SQLite database path
///
/// Priority: environment variable > TOML config > OS-dependent default.
pub fn resolve_database_path(env_var_name: &str, toml_config: &TomlConfig) -> PathBuf {
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            info!("Database path from environment: {}", path);
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.database_path {
        info!("Database path from TOML config: {:?}", path);
        return path.clone();
    }

    default_database_path()
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("udx").join("udx.db"))
        .unwrap_or_else(|| PathBuf::from("./udx.db"))
}

/// Resolve the HTTP port
///
/// Priority: environment variable > TOML config > compiled default (5811).
/// A malformed environment value is logged and skipped rather than aborting
/// startup.
pub fn resolve_port(env_var_name: &str, toml_config: &TomlConfig) -> u16 {
    if let Ok(raw) = std::env::var(env_var_name) {
        match raw.parse::<u16>() {
            Ok(port) => return port,
            Err(_) => warn!("Ignoring malformed {}='{}'", env_var_name, raw),
        }
    }

    toml_config.port.unwrap_or(DEFAULT_PORT)
}

/// Standard User-Agent string for outbound HTTP clients
pub fn get_user_agent() -> String {
    format!("udx-dc/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_log_level() {
        assert_eq!(default_log_level(), "info");
        assert_eq!(LoggingConfig::default().level, "info");
    }

    #[test]
    fn test_load_toml_config_parses_all_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("udx-dc.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/var/lib/udx/udx.db"
port = 6000
llm_api_key = "test-key"
llm_model = "gemini-1.5-flash"
confusion_examples_path = "/etc/udx/confusion.toml"

[logging]
level = "debug"
"#,
        )
        .unwrap();

        let config = load_toml_config(Some(&path)).unwrap();
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/udx/udx.db"))
        );
        assert_eq!(config.port, Some(6000));
        assert_eq!(config.llm_api_key.as_deref(), Some("test-key"));
        assert_eq!(config.llm_model.as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(
            config.confusion_examples_path,
            Some(PathBuf::from("/etc/udx/confusion.toml"))
        );
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_toml_config_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number").unwrap();

        let result = load_toml_config(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_toml_config_missing_explicit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(
            load_toml_config(Some(&path)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_database_path_priority() {
        // ENV beats TOML
        std::env::set_var("UDX_TEST_DB_PATH", "/tmp/env.db");
        let toml = TomlConfig {
            database_path: Some(PathBuf::from("/tmp/toml.db")),
            ..Default::default()
        };
        assert_eq!(
            resolve_database_path("UDX_TEST_DB_PATH", &toml),
            PathBuf::from("/tmp/env.db")
        );

        // TOML when ENV absent
        std::env::remove_var("UDX_TEST_DB_PATH");
        assert_eq!(
            resolve_database_path("UDX_TEST_DB_PATH", &toml),
            PathBuf::from("/tmp/toml.db")
        );

        // Default when neither present
        let empty = TomlConfig::default();
        let resolved = resolve_database_path("UDX_TEST_DB_PATH", &empty);
        assert!(resolved.to_string_lossy().ends_with("udx.db"));
    }

    #[test]
    #[serial]
    fn test_resolve_port_priority() {
        std::env::set_var("UDX_TEST_PORT", "7001");
        let toml = TomlConfig {
            port: Some(6000),
            ..Default::default()
        };
        assert_eq!(resolve_port("UDX_TEST_PORT", &toml), 7001);

        // Malformed env value falls through to TOML
        std::env::set_var("UDX_TEST_PORT", "not-a-port");
        assert_eq!(resolve_port("UDX_TEST_PORT", &toml), 6000);

        std::env::remove_var("UDX_TEST_PORT");
        assert_eq!(resolve_port("UDX_TEST_PORT", &TomlConfig::default()), 5811);
    }

    #[test]
    fn test_user_agent_format() {
        let ua = get_user_agent();
        assert!(ua.starts_with("udx-dc/"));
    }
}
