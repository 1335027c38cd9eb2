//! Configuration management for SoftAP onboarding.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/softap/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use softap_protocol::MessageCodec;
use thiserror::Error;

use crate::network::socket::{
    ChannelConfig, SocketTarget, TcpConnector, DEFAULT_HOST, DEFAULT_PORT, READ_CHUNK_SIZE,
};
use crate::network::InteractionSettings;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("device host must not be empty")]
    EmptyHost,

    #[error("device port must be greater than 0")]
    InvalidPort,

    #[error("{0} must be greater than 0")]
    ZeroValue(&'static str),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Where the device listens.
    pub device: DeviceConfig,

    /// Socket timing and reconnection policy.
    pub connection: ConnectionConfig,

    /// Wire protocol options.
    pub protocol: ProtocolConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Device socket address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device address on its access point.
    pub host: String,

    /// Onboarding port.
    pub port: u16,
}

/// Socket timing and reconnection policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Milliseconds for the socket to open before it times out.
    pub open_timeout_ms: u64,

    /// Milliseconds of quiet before a status change is published.
    pub debounce_ms: u64,

    /// Maximum bytes per socket read.
    pub read_chunk_size: usize,

    /// Reconnection attempts allowed after the first one.
    pub max_reconnection_attempts: u32,

    /// Seconds the CLI waits for a response.
    pub response_timeout_secs: u64,
}

/// Wire protocol options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Reject frames whose length tag disagrees with the body.
    pub validate_frame_length: bool,

    /// Encrypt credential fields before sending them.
    pub encrypt_credentials: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 5_000,
            debounce_ms: 500,
            read_chunk_size: READ_CHUNK_SIZE,
            max_reconnection_attempts: 3,
            response_timeout_secs: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("softap")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - SOFTAP_DEVICE_HOST: Override device host
    /// - SOFTAP_DEVICE_PORT: Override device port
    /// - SOFTAP_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("SOFTAP_DEVICE_HOST") {
            if !host.is_empty() {
                tracing::info!("Overriding device host from environment: {}", host);
                self.device.host = host;
            }
        }

        if let Ok(port) = std::env::var("SOFTAP_DEVICE_PORT") {
            match port.parse() {
                Ok(port) => {
                    tracing::info!("Overriding device port from environment: {}", port);
                    self.device.port = port;
                }
                Err(_) if port.is_empty() => {}
                Err(_) => tracing::warn!("Ignoring invalid SOFTAP_DEVICE_PORT: {}", port),
            }
        }

        if let Ok(level) = std::env::var("SOFTAP_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        if self.device.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.connection.open_timeout_ms == 0 {
            return Err(ConfigError::ZeroValue("open_timeout_ms"));
        }

        if self.connection.read_chunk_size == 0 {
            return Err(ConfigError::ZeroValue("read_chunk_size"));
        }

        if self.connection.response_timeout_secs == 0 {
            return Err(ConfigError::ZeroValue("response_timeout_secs"));
        }

        let level = self.logging.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }

    /// Address of the device socket.
    pub fn socket_target(&self) -> SocketTarget {
        SocketTarget::new(self.device.host.clone(), self.device.port)
    }

    /// Codec selected by `validate_frame_length`.
    pub fn codec(&self) -> MessageCodec {
        MessageCodec::with_length_validation(self.protocol.validate_frame_length)
    }

    /// Channel settings derived from the connection section.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::default()
            .with_open_timeout(Duration::from_millis(self.connection.open_timeout_ms))
            .with_debounce(Duration::from_millis(self.connection.debounce_ms))
            .with_read_chunk_size(self.connection.read_chunk_size)
            .with_codec(self.codec())
    }

    /// Interaction settings over TCP.
    pub fn interaction_settings(&self) -> InteractionSettings {
        InteractionSettings {
            channel: self.channel_config(),
            encrypt_credentials: self.protocol.encrypt_credentials,
            connector: Arc::new(TcpConnector),
        }
    }

    /// How long callers wait for a single response.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.response_timeout_secs)
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.device.host, "192.168.1.1");
        assert_eq!(config.device.port, 50000);
        assert_eq!(config.connection.open_timeout_ms, 5000);
        assert_eq!(config.connection.debounce_ms, 500);
        assert_eq!(config.connection.read_chunk_size, 4096);
        assert_eq!(config.connection.max_reconnection_attempts, 3);
        assert_eq!(config.connection.response_timeout_secs, 10);
        assert!(!config.protocol.validate_frame_length);
        assert!(!config.protocol.encrypt_credentials);
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[device]
host = "10.0.0.1"

[protocol]
validate_frame_length = true
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.device.host, "10.0.0.1");
        assert_eq!(config.device.port, 50000);
        assert!(config.protocol.validate_frame_length);
        assert_eq!(config.connection, ConnectionConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[device]
host = "192.168.4.1"
port = 6000

[connection]
open_timeout_ms = 2000
debounce_ms = 100
read_chunk_size = 1024
max_reconnection_attempts = 5
response_timeout_secs = 30

[protocol]
validate_frame_length = true
encrypt_credentials = true

[logging]
log_level = "trace"
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.socket_target(), SocketTarget::new("192.168.4.1", 6000));
        assert_eq!(config.connection.max_reconnection_attempts, 5);
        assert_eq!(config.response_timeout(), Duration::from_secs(30));
        assert!(config.protocol.encrypt_credentials);
        assert_eq!(config.logging.log_level, "trace");

        let channel = config.channel_config();
        assert_eq!(channel.open_timeout, Duration::from_secs(2));
        assert_eq!(channel.debounce, Duration::from_millis(100));
        assert_eq!(channel.read_chunk_size, 1024);
        assert!(channel.codec.validates_length());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[device\nhost = \"x\"");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let toml = r#"
[device]
port = "fifty thousand"
"#;
        assert!(Config::from_toml(toml).is_err());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut original = Config::default();
        original.device.host = "10.1.1.1".to_string();
        original.connection.max_reconnection_attempts = 7;
        original.protocol.encrypt_credentials = true;

        let toml = original.to_toml().unwrap();
        assert!(toml.contains("[connection]"));
        assert_eq!(Config::from_toml(&toml).unwrap(), original);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/path/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original = Config::default();
        original.logging.log_level = "debug".to_string();
        original.device.port = 50001;

        original.save(&config_path).unwrap();
        assert_eq!(Config::load(&config_path).unwrap(), original);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "invalid [ toml").unwrap();

        let err = Config::load(&config_path).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.to_string_lossy().contains("softap"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_validate_empty_host() {
        let mut config = Config::default();
        config.device.host = "  ".to_string();
        assert_eq!(config.validate(), Err(ConfigError::EmptyHost));
    }

    #[test]
    fn test_validate_zero_port() {
        let mut config = Config::default();
        config.device.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.connection.open_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue("open_timeout_ms"))
        );

        let mut config = Config::default();
        config.connection.read_chunk_size = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue("read_chunk_size"))
        );

        let mut config = Config::default();
        config.connection.response_timeout_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroValue("response_timeout_secs"))
        );
    }

    #[test]
    fn test_validate_zero_debounce_allowed() {
        let mut config = Config::default();
        config.connection.debounce_ms = 0;
        config.connection.max_reconnection_attempts = 0;
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.log_level = "WARN".to_string();
        assert_eq!(config.validate(), Ok(()));

        config.logging.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::ZeroValue("read_chunk_size").to_string(),
            "read_chunk_size must be greater than 0"
        );
        assert_eq!(
            ConfigError::EmptyHost.to_string(),
            "device host must not be empty"
        );
    }

    #[test]
    fn test_interaction_settings() {
        let mut config = Config::default();
        config.protocol.encrypt_credentials = true;
        let settings = config.interaction_settings();
        assert!(settings.encrypt_credentials);
        assert_eq!(settings.channel.read_chunk_size, 4096);
    }

    #[test]
    #[serial]
    fn test_env_override_host_and_port() {
        std::env::set_var("SOFTAP_DEVICE_HOST", "10.9.8.7");
        std::env::set_var("SOFTAP_DEVICE_PORT", "6001");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.device.host, "10.9.8.7");
        assert_eq!(config.device.port, 6001);

        std::env::remove_var("SOFTAP_DEVICE_HOST");
        std::env::remove_var("SOFTAP_DEVICE_PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_port_ignored() {
        std::env::set_var("SOFTAP_DEVICE_PORT", "not-a-port");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.device.port, 50000);

        std::env::remove_var("SOFTAP_DEVICE_PORT");
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::set_var("SOFTAP_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.logging.log_level, "debug");

        std::env::remove_var("SOFTAP_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("SOFTAP_DEVICE_HOST", "");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.device.host, "192.168.1.1");

        std::env::remove_var("SOFTAP_DEVICE_HOST");
    }
}
