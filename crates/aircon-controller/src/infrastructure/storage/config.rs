//! TOML-based configuration for the controller.
//!
//! Example `aircon.toml`:
//!
//! ```toml
//! token = "33965903-4482-M306-1002-000000000000"
//! certificate_path = "ac14k_m.pfx"
//! log_level = "info"
//!
//! [discovery]
//! port = 1900
//! timeout_ms = 10000
//!
//! [session]
//! connect_timeout_ms = 10000
//! ```
//!
//! Every field carries a serde default, so a missing file (or an older
//! file missing newer fields) still produces a working configuration.
//! The `TOKEN` environment variable overrides the configured token; an
//! empty token selects the pairing flow.

use std::path::{Path, PathBuf};
use std::time::Duration;

use aircon_core::protocol::request::DISCOVERY_PORT;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ControllerConfig {
    /// Stored session token; empty selects the pairing flow.
    #[serde(default)]
    pub token: String,
    /// Path to the pinned PKCS#12 client certificate.
    #[serde(default = "default_certificate_path")]
    pub certificate_path: PathBuf,
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// UDP port for announcements and advertisements.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Deadline for the whole discovery attempt.
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_ms: u64,
}

/// Control-channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Deadline for TCP + TLS establishment.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_certificate_path() -> PathBuf {
    PathBuf::from("ac14k_m.pfx")
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}

fn default_discovery_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            certificate_path: default_certificate_path(),
            log_level: default_log_level(),
            discovery: DiscoveryConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            timeout_ms: default_discovery_timeout_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl ControllerConfig {
    /// Loads the configuration from `path`.
    ///
    /// A missing file yields the default configuration; a present but
    /// malformed file is an error (silently ignoring a typo'd config is
    /// worse than failing).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&text)?)
    }

    /// The effective token: the `TOKEN` environment variable when set,
    /// otherwise the configured one.  `None` means "pair".
    pub fn effective_token(&self) -> Option<String> {
        let token = std::env::var("TOKEN").unwrap_or_else(|_| self.token.clone());
        if token.is_empty() {
            None
        } else {
            Some(token)
        }
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.session.connect_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = ControllerConfig::load(Path::new("/nonexistent/aircon.toml")).unwrap();
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.discovery.port, 1900);
        assert_eq!(config.certificate_path, PathBuf::from("ac14k_m.pfx"));
    }

    #[test]
    fn test_partial_file_fills_missing_fields_with_defaults() {
        let config: ControllerConfig =
            toml::from_str("token = \"abc\"\n[discovery]\ntimeout_ms = 2500\n").unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.discovery.timeout_ms, 2_500);
        assert_eq!(config.discovery.port, 1900);
        assert_eq!(config.session.connect_timeout_ms, 10_000);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let result: Result<ControllerConfig, _> = toml::from_str("token = [not a string");
        assert!(result.is_err());
    }

    #[test]
    fn test_durations_derive_from_millis() {
        let config = ControllerConfig::default();
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }
}
