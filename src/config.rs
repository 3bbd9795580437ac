//! Configuration for Agent Bridge
//!
//! The bridge reads a single JSON file (camelCase keys). Every field has a
//! default, so an empty object, or no file at all, yields a usable config.
//!
//! Resolution order for the file path:
//! 1. explicit path (the `--config` flag)
//! 2. `AGENT_BRIDGE_CONFIG` environment variable
//! 3. `./config.json`
//!
//! When the resolved file is missing but `./config.example.json` exists, the
//! example is copied into place so the user has something to edit.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Environment variable that redirects the config file location.
pub const CONFIG_ENV_VAR: &str = "AGENT_BRIDGE_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "config.json";
const EXAMPLE_CONFIG_FILE: &str = "config.example.json";

/// Lowest port the bridge may bind (unprivileged range only).
pub const MIN_PORT: u16 = 1024;

/// Log verbosity accepted in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// The `tracing` filter directive for this level. `fatal` has no tracing
    /// equivalent and maps to `error`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
        }
    }
}

/// Azure app registration used for the Microsoft OAuth flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AzureConfig {
    pub client_id: String,
    pub tenant_id: String,
}

/// Top-level bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Interface both listeners bind to.
    pub host: String,
    /// Port for the request/response API.
    pub http_port: u16,
    /// Port for the WebSocket transport.
    pub ws_port: u16,
    pub azure: AzureConfig,
    /// Directory scanned for plugin manifests.
    pub plugins_dir: String,
    /// Where the Microsoft token is persisted.
    pub token_store_path: String,
    pub log_level: LogLevel,
    /// Upper bound for a single action or terminal command. `0` disables it.
    pub action_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            http_port: 3333,
            ws_port: 3334,
            azure: AzureConfig::default(),
            plugins_dir: "./plugins".to_string(),
            token_store_path: "./.tokens.json".to_string(),
            log_level: LogLevel::Info,
            action_timeout_secs: 300,
        }
    }
}

impl Config {
    /// Parse and validate a config from its JSON text.
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(raw)
            .map_err(|e| BridgeError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        let mut issues = Vec::new();

        if self.host.trim().is_empty() {
            issues.push("host: must not be empty".to_string());
        }
        for (field, port) in [("httpPort", self.http_port), ("wsPort", self.ws_port)] {
            if port < MIN_PORT {
                issues.push(format!("{}: must be between {} and 65535", field, MIN_PORT));
            }
        }
        if self.http_port == self.ws_port {
            issues.push("wsPort: must differ from httpPort".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::Config(format!(
                "Invalid config:\n  {}",
                issues.join("\n  ")
            )))
        }
    }

    /// Resolve which file to read, honouring an explicit path first, then
    /// the environment override, then `./config.json`.
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => PathBuf::from(DEFAULT_CONFIG_FILE),
        }
    }

    /// Load the config from disk.
    ///
    /// A missing file falls back to a copy of `config.example.json` (sitting
    /// next to the process cwd) or, failing that, to defaults. The returned
    /// [`ConfigSource`] says which happened so the caller can report it once
    /// logging is up.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let path = Self::resolve_path(explicit);
        Self::load_from(&path, Path::new(EXAMPLE_CONFIG_FILE))
    }

    /// Load from `path`, seeding it from `example` when it does not exist.
    pub fn load_from(path: &Path, example: &Path) -> Result<(Self, ConfigSource)> {
        let source = if path.exists() {
            ConfigSource::File(path.to_path_buf())
        } else if example.exists() {
            fs::copy(example, path).map_err(|e| {
                BridgeError::Config(format!(
                    "Failed to copy {} to {}: {}",
                    example.display(),
                    path.display(),
                    e
                ))
            })?;
            ConfigSource::CopiedExample(path.to_path_buf())
        } else {
            return Ok((Self::default(), ConfigSource::Defaults(path.to_path_buf())));
        };

        let raw = fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok((Self::from_json(&raw)?, source))
    }

    /// OAuth redirect target served by this process.
    pub fn redirect_uri(&self) -> String {
        format!("http://{}:{}/auth/callback", self.host, self.http_port)
    }

    /// Effective per-invocation timeout, `None` when disabled.
    pub fn action_timeout(&self) -> Option<Duration> {
        (self.action_timeout_secs > 0).then(|| Duration::from_secs(self.action_timeout_secs))
    }
}

/// Where a loaded config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from an existing file.
    File(PathBuf),
    /// The file was missing and has just been seeded from the example.
    CopiedExample(PathBuf),
    /// No file and no example, so defaults apply.
    Defaults(PathBuf),
}

impl ConfigSource {
    /// Warning worth showing the user, if any.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::File(_) => None,
            Self::CopiedExample(path) => Some(format!(
                "Config not found, copied from example to {}. Edit it before use.",
                path.display()
            )),
            Self::Defaults(path) => Some(format!(
                "No config file found at {}, using defaults",
                path.display()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = Config::from_json("{}").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.http_port, 3333);
        assert_eq!(config.ws_port, 3334);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.plugins_dir, "./plugins");
        assert_eq!(config.token_store_path, "./.tokens.json");
        assert_eq!(config.azure.client_id, "");
        assert_eq!(config.azure.tenant_id, "");
        assert_eq!(config.action_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_overrides_keep_other_defaults() {
        let config = Config::from_json(r#"{"httpPort": 4000, "logLevel": "debug"}"#).unwrap();
        assert_eq!(config.http_port, 4000);
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.ws_port, 3334);
    }

    #[test]
    fn test_partial_azure_section() {
        let config = Config::from_json(r#"{"azure": {"clientId": "abc"}}"#).unwrap();
        assert_eq!(config.azure.client_id, "abc");
        assert_eq!(config.azure.tenant_id, "");
    }

    #[test]
    fn test_rejects_privileged_port() {
        let err = Config::from_json(r#"{"httpPort": 80}"#).unwrap_err();
        assert!(err.to_string().contains("httpPort"));
    }

    #[test]
    fn test_rejects_out_of_range_port() {
        assert!(Config::from_json(r#"{"wsPort": 70000}"#).is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        assert!(Config::from_json(r#"{"logLevel": "verbose"}"#).is_err());
    }

    #[test]
    fn test_rejects_same_ports() {
        assert!(Config::from_json(r#"{"httpPort": 5000, "wsPort": 5000}"#).is_err());
    }

    #[test]
    fn test_zero_timeout_disables() {
        let config = Config::from_json(r#"{"actionTimeoutSecs": 0}"#).unwrap();
        assert_eq!(config.action_timeout(), None);
    }

    #[test]
    fn test_fatal_maps_to_error_filter() {
        assert_eq!(LogLevel::Fatal.as_filter(), "error");
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
    }

    #[test]
    fn test_redirect_uri() {
        let config = Config::default();
        assert_eq!(config.redirect_uri(), "http://127.0.0.1:3333/auth/callback");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("config.json");
        let (config, source) = Config::load_from(&target, &tmp.path().join("none.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(source, ConfigSource::Defaults(target.clone()));
        assert!(source.notice().unwrap().contains("using defaults"));
    }

    #[test]
    fn test_load_copies_example() {
        let tmp = TempDir::new().unwrap();
        let example = tmp.path().join("config.example.json");
        let target = tmp.path().join("config.json");
        fs::write(&example, r#"{"httpPort": 4100}"#).unwrap();

        let (config, source) = Config::load_from(&target, &example).unwrap();
        assert_eq!(config.http_port, 4100);
        assert!(target.exists());
        assert_eq!(source, ConfigSource::CopiedExample(target.clone()));
        assert!(source.notice().unwrap().contains("copied from example"));

        // Second load reads the seeded file quietly.
        let (_, source) = Config::load_from(&target, &example).unwrap();
        assert_eq!(source, ConfigSource::File(target));
        assert!(source.notice().is_none());
    }

    #[test]
    fn test_load_reports_invalid_file() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("config.json");
        fs::write(&target, "{ not json").unwrap();

        let err = Config::load_from(&target, &tmp.path().join("none.json")).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }
}
