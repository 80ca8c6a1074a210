//! SDK configuration management.
//!
//! Holds the endpoint settings consumed by the REST client and the
//! notification subscriber, plus logging preferences. Configuration can be
//! persisted as TOML on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants;
use crate::error::{Dp5Error, Dp5Result};
use crate::platform::Platform;

/// Top-level SDK configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST endpoint settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Push notification channel settings.
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// REST endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host name or address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout for GET actions, in seconds.
    #[serde(default = "default_action_timeout")]
    pub get_timeout_secs: u64,

    /// Timeout for POST actions, in seconds.
    #[serde(default = "default_action_timeout")]
    pub post_timeout_secs: u64,

    /// Timeout for PUT actions, in seconds.
    #[serde(default = "default_action_timeout")]
    pub put_timeout_secs: u64,

    /// Timeout for DELETE actions, in seconds.
    #[serde(default = "default_action_timeout")]
    pub delete_timeout_secs: u64,

    /// TCP connect timeout for the HTTP transport, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

/// Notification channel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// WebSocket endpoint path on the server.
    #[serde(default = "default_notification_path")]
    pub path: String,

    /// Topic to subscribe to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Time allowed for the connect + subscribe handshake, in seconds.
    #[serde(default = "default_handshake_timeout")]
    pub connect_timeout_secs: u64,

    /// Requested heart-beat interval in milliseconds (0 disables).
    #[serde(default = "default_heartbeat")]
    pub heartbeat_ms: u64,

    /// Ask the server for a RECEIPT on subscribe/unsubscribe.
    #[serde(default = "default_true")]
    pub auto_receipt: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for log files. If empty, uses the default location.
    #[serde(default)]
    pub directory: String,

    /// Enable JSON structured output for the log file.
    #[serde(default)]
    pub json_output: bool,
}

// Default value functions for serde

fn default_host() -> String {
    constants::DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    constants::DEFAULT_PORT
}

fn default_action_timeout() -> u64 {
    constants::DEFAULT_ACTION_TIMEOUT_SECS
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_notification_path() -> String {
    constants::NOTIFICATION_PATH.to_string()
}

fn default_topic() -> String {
    constants::EVENTS_TOPIC.to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_heartbeat() -> u64 {
    constants::DEFAULT_HEARTBEAT_MS
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            get_timeout_secs: default_action_timeout(),
            post_timeout_secs: default_action_timeout(),
            put_timeout_secs: default_action_timeout(),
            delete_timeout_secs: default_action_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            path: default_notification_path(),
            topic: default_topic(),
            connect_timeout_secs: default_handshake_timeout(),
            heartbeat_ms: default_heartbeat(),
            auto_receipt: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
            json_output: false,
        }
    }
}

impl ServerConfig {
    /// Configuration for a server on the given host and port, default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Base URL every REST action is appended to.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}{}", self.host, self.port, constants::REMOTE_STUB)
    }

    /// WebSocket URL of the notification endpoint.
    pub fn notification_url(&self, notifications: &NotificationConfig) -> String {
        let path = notifications.path.trim_start_matches('/');
        format!("ws://{}:{}/{}", self.host, self.port, path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl NotificationConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl AppConfig {
    /// Load configuration from the default config file path.
    pub fn load_default() -> Dp5Result<Self> {
        let path = Self::default_config_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Dp5Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific file path.
    pub fn save_to_file(&self, path: &Path) -> Dp5Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Dp5Error::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Dp5Result<PathBuf> {
        Ok(Platform::config_dir()?.join("config.toml"))
    }

    /// Get the effective log directory, using the configured path or the default.
    pub fn effective_log_dir(&self) -> Dp5Result<PathBuf> {
        if self.logging.directory.is_empty() {
            Ok(Platform::data_dir()?.join("logs"))
        } else {
            Ok(PathBuf::from(&self.logging.directory))
        }
    }

    /// Notification URL derived from the server and notification sections.
    pub fn notification_url(&self) -> String {
        self.server.notification_url(&self.notifications)
    }
}

/// Thread-safe configuration holder for shared access.
#[derive(Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<AppConfig>>,
}

impl ConfigHandle {
    /// Create a new configuration handle.
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Read the configuration.
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, AppConfig> {
        self.inner.read().await
    }

    /// Write/update the configuration.
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, AppConfig> {
        self.inner.write().await
    }

    /// Save the current configuration to a file.
    pub async fn save_to_file(&self, path: &Path) -> Dp5Result<()> {
        let config = self.inner.read().await;
        config.save_to_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8777);
        assert_eq!(config.server.get_timeout_secs, 10);
        assert_eq!(config.server.delete_timeout_secs, 10);
        assert_eq!(config.notifications.topic, "/topic/events");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_urls() {
        let config = AppConfig::default();
        assert_eq!(
            config.server.base_url(),
            "http://localhost:8777/dp5/remote/v1"
        );
        assert_eq!(
            config.notification_url(),
            "ws://localhost:8777/dp5-websocket"
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            host = "lab-pc"
            post_timeout_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.server.host, "lab-pc");
        assert_eq!(config.server.port, 8777);
        assert_eq!(config.server.post_timeout_secs, 60);
        assert_eq!(config.server.get_timeout_secs, 10);
        assert!(config.notifications.auto_receipt);
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.server.port = 9000;
        config.notifications.heartbeat_ms = 0;
        config.save_to_file(&path).unwrap();

        let loaded = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.server.port, 9000);
        assert_eq!(loaded.notifications.heartbeat_ms, 0);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(Dp5Error::Config(_))
        ));
    }

    #[test]
    fn test_effective_log_dir() {
        let mut config = AppConfig::default();
        let default_dir = config.effective_log_dir().unwrap();
        assert!(default_dir.ends_with(Path::new(constants::APP_NAME).join("logs")));

        config.logging.directory = "/var/log/dp5".into();
        assert_eq!(
            config.effective_log_dir().unwrap(),
            PathBuf::from("/var/log/dp5")
        );
    }

    #[test]
    fn test_load_default_path() {
        let path = AppConfig::default_config_path().unwrap();
        assert!(path.ends_with(Path::new(constants::APP_NAME).join("config.toml")));
        if !path.exists() {
            let config = AppConfig::load_default().unwrap();
            assert_eq!(config.server.host, constants::DEFAULT_HOST);
            assert_eq!(config.server.port, constants::DEFAULT_PORT);
        }
    }

    #[tokio::test]
    async fn test_config_handle_write() {
        let handle = ConfigHandle::new(AppConfig::default());
        handle.write().await.server.host = "10.0.0.2".into();
        assert_eq!(handle.read().await.server.host, "10.0.0.2");
    }
}
