//! Configuration for fmlkb
//!
//! Settings come from a TOML file, then environment variables override
//! individual keys.
//!
//! # Configuration File Locations
//!
//! Searched in order (first found wins):
//! 1. `./fmlkb.toml` - Project-local configuration
//! 2. `~/.config/fmlkb/config.toml` - User configuration (XDG)
//! 3. `~/.fmlkb/config.toml` - User configuration (legacy)
//! 4. `/etc/fmlkb/config.toml` - System-wide configuration
//!
//! # Environment Variables
//!
//! - `FMLKB_LOG_LEVEL` - Logging verbosity (quiet, normal, verbose, debug)
//! - `FMLKB_STRICT_PARSE` - Require weight/scale/complement (true/false)
//! - `FMLKB_INDENT` - Spaces per level in written FML
//! - `FMLKB_SERVER_HOST` - HTTP bind address
//! - `FMLKB_SERVER_PORT` - HTTP port
//! - `FMLKB_STORE` - Store backend (memory, sqlite)
//! - `FMLKB_DATABASE` - SQLite database path
//!
//! # Example Configuration
//!
//! ```toml
//! [general]
//! log_level = "normal"
//!
//! [codec]
//! strict_parse = true
//! indent = 2
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//!
//! [store]
//! backend = "sqlite"
//! database_path = "./fmlkb.db"
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::CodecOptions;
use crate::error::{ErrorCode, FmlError};

// ============================================================================
// Configuration Schema
// ============================================================================

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FmlConfig {
    pub general: GeneralConfig,
    /// FML parse/serialize options
    pub codec: CodecOptions,
    pub server: ServerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneralConfig {
    /// Logging level
    pub log_level: LogLevel,
}

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "127.0.0.1".to_string(),
            cors_enabled: true,
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }
}

/// Store backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type
    pub backend: StoreBackend,
    /// Database path for the sqlite backend
    pub database_path: Option<PathBuf>,
}

impl StoreConfig {
    /// The SQLite file to open: the configured path, else `fmlkb.db` in the
    /// user data directory, else in the working directory
    pub fn resolved_database_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        match dirs::data_dir() {
            Some(dir) => dir.join("fmlkb").join("fmlkb.db"),
            None => PathBuf::from("fmlkb.db"),
        }
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Log level options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    Verbose,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Verbose => "verbose",
            LogLevel::Debug => "debug",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quiet" | "q" | "0" => Some(LogLevel::Quiet),
            "normal" | "n" | "1" => Some(LogLevel::Normal),
            "verbose" | "v" | "2" => Some(LogLevel::Verbose),
            "debug" | "d" | "3" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// `tracing` filter directive for this level
    pub fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Quiet => "error",
            LogLevel::Normal => "info",
            LogLevel::Verbose => "fmlkb=debug,info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Store backend options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store, lost on exit
    Memory,
    /// SQLite file
    #[default]
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Sqlite => "sqlite",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" | "inmemory" => Some(StoreBackend::Memory),
            "sqlite" | "sql" => Some(StoreBackend::Sqlite),
            _ => None,
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val == "true" || val == "1" || val == "yes"
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl FmlConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default locations, then apply
    /// environment variable overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for path in Self::config_paths() {
            if path.exists() {
                config = Self::load_from_file(&path)?;
                break;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load an explicit file, then apply environment variable overrides
    pub fn load_explicit(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<string>"), e.to_string()))
    }

    /// Get the list of config file search paths
    pub fn config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        paths.push(PathBuf::from("./fmlkb.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("fmlkb").join("config.toml"));
        }

        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".fmlkb").join("config.toml"));
        }

        #[cfg(unix)]
        paths.push(PathBuf::from("/etc/fmlkb/config.toml"));

        paths
    }

    /// Apply `FMLKB_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("FMLKB_LOG_LEVEL").and_then(|v| LogLevel::from_str(&v)) {
            self.general.log_level = level;
        }

        if let Some(val) = lookup("FMLKB_STRICT_PARSE") {
            self.codec.strict_parse = parse_flag(&val);
        }

        if let Some(indent) = lookup("FMLKB_INDENT").and_then(|v| v.parse::<usize>().ok()) {
            self.codec.indent = indent;
        }

        if let Some(host) = lookup("FMLKB_SERVER_HOST") {
            self.server.host = host;
        }

        if let Some(port) = lookup("FMLKB_SERVER_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.port = port;
        }

        if let Some(backend) = lookup("FMLKB_STORE").and_then(|v| StoreBackend::from_str(&v)) {
            self.store.backend = backend;
        }

        if let Some(path) = lookup("FMLKB_DATABASE") {
            self.store.database_path = Some(PathBuf::from(path));
        }
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Generate a default configuration file content
    pub fn default_config_content() -> &'static str {
        r#"# fmlkb configuration file

[general]
# Logging level: quiet, normal, verbose, debug
log_level = "normal"

[codec]
# Require rule weight, variable scale and term complement when parsing FML
strict_parse = true
# Spaces per nesting level in written FML (0 = single line)
indent = 2
# Start written FML with an XML declaration
xml_declaration = true

[server]
# HTTP port
port = 5000
# Bind address
host = "127.0.0.1"
# Enable CORS for browser access
cors_enabled = true
# Maximum request body size (bytes)
max_body_size = 10485760

[store]
# Backend: memory, sqlite
backend = "sqlite"
# Database path (defaults to the user data directory)
# database_path = "./fmlkb.db"
"#
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {path}", path = .0.display())]
    NotFound(PathBuf),

    #[error("IO error reading {path}: {1}", path = .0.display())]
    Io(PathBuf, String),

    #[error("parse error in {path}: {1}", path = .0.display())]
    Parse(PathBuf, String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl From<ConfigError> for FmlError {
    fn from(err: ConfigError) -> Self {
        let code = match &err {
            ConfigError::NotFound(_) => ErrorCode::ConfigNotFound,
            ConfigError::Parse(..) => ErrorCode::InvalidConfigSyntax,
            ConfigError::Io(..) | ConfigError::Serialize(_) => ErrorCode::ConfigError,
        };
        FmlError::config(err.to_string()).with_code(code)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = FmlConfig::new();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert!(config.codec.strict_parse);
        assert_eq!(config.general.log_level, LogLevel::Normal);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [general]
            log_level = "verbose"

            [codec]
            strict_parse = false
            indent = 0

            [server]
            port = 9000

            [store]
            backend = "memory"
        "#;

        let config = FmlConfig::load_from_str(toml).unwrap();
        assert_eq!(config.general.log_level, LogLevel::Verbose);
        assert!(!config.codec.strict_parse);
        assert_eq!(config.codec.indent, 0);
        assert!(config.codec.xml_declaration);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn test_default_content_parses() {
        let config = FmlConfig::load_from_str(FmlConfig::default_config_content()).unwrap();
        assert_eq!(config, FmlConfig::default());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("FMLKB_LOG_LEVEL", "debug"),
            ("FMLKB_STRICT_PARSE", "false"),
            ("FMLKB_INDENT", "4"),
            ("FMLKB_SERVER_PORT", "not-a-port"),
            ("FMLKB_STORE", "memory"),
            ("FMLKB_DATABASE", "/tmp/kb.db"),
        ]
        .into_iter()
        .collect();

        let mut config = FmlConfig::new();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.general.log_level, LogLevel::Debug);
        assert!(!config.codec.strict_parse);
        assert_eq!(config.codec.indent, 4);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.resolved_database_path(), PathBuf::from("/tmp/kb.db"));
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("quiet"), Some(LogLevel::Quiet));
        assert_eq!(LogLevel::from_str("V"), Some(LogLevel::Verbose));
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!(StoreBackend::from_str("sqlite"), Some(StoreBackend::Sqlite));
        assert_eq!(StoreBackend::from_str("mem"), Some(StoreBackend::Memory));
        assert_eq!(StoreBackend::from_str("fuseki"), None);
    }

    #[test]
    fn test_serialize_config() {
        let toml = FmlConfig::new().to_toml().unwrap();
        assert!(toml.contains("[codec]"));
        assert!(toml.contains("[store]"));
    }

    #[test]
    fn test_config_paths() {
        let paths = FmlConfig::config_paths();
        assert!(paths[0].ends_with("fmlkb.toml"));
    }

    #[test]
    fn test_config_error_codes() {
        let err: FmlError = ConfigError::NotFound(PathBuf::from("x.toml")).into();
        assert_eq!(err.code, ErrorCode::ConfigNotFound);

        let err: FmlError = FmlConfig::load_from_str("[server]\nport = \"high\"").unwrap_err().into();
        assert_eq!(err.code, ErrorCode::InvalidConfigSyntax);
    }
}
