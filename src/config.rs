//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides. The
//! resulting [`Config`] is built once at startup and never changes.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cluster::DEFAULT_TOPIC;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub news: NewsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Relay listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Close connections silent in both directions for this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Largest inbound frame accepted
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_idle_timeout() -> u64 {
    60
}

fn default_max_message_bytes() -> usize {
    16 * 1024 // 16 KB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            idle_timeout_secs: default_idle_timeout(),
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Admin channel credentials
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Shared secret expected in `/admin?token=`
    #[serde(default = "default_admin_token")]
    pub token: String,
}

fn default_admin_token() -> String {
    "admin-secret-token".to_string()
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            token: default_admin_token(),
        }
    }
}

/// Cross-process replication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_topic")]
    pub topic: String,

    /// Process identity; the host name when unset
    pub pod_name: Option<String>,

    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}

fn default_reconnect_backoff() -> u64 {
    3000 // 3 seconds
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: default_redis_url(),
            topic: default_topic(),
            pod_name: None,
            reconnect_backoff_ms: default_reconnect_backoff(),
        }
    }
}

impl ClusterConfig {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Identity of this process on the bus
    pub fn pod_name(&self) -> String {
        if let Some(name) = &self.pod_name {
            return name.clone();
        }
        hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| format!("pod-{}", std::process::id()))
    }
}

/// News API collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_news_port")]
    pub port: u16,

    /// Base WebSocket URL of the relay
    #[serde(default = "default_relay_url")]
    pub relay_url: String,

    #[serde(default = "default_news_reconnect")]
    pub reconnect_secs: u64,

    #[serde(default = "default_news_title")]
    pub title: String,

    #[serde(default = "default_news_description")]
    pub description: String,
}

fn default_news_port() -> u16 {
    3000
}

fn default_relay_url() -> String {
    "ws://localhost:8080".to_string()
}

fn default_news_reconnect() -> u64 {
    3
}

fn default_news_title() -> String {
    "Breaking News: WebSocket Server Update".to_string()
}

fn default_news_description() -> String {
    "The WebSocket server has been successfully updated with new features including image carousel control and real-time notifications.".to_string()
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_news_port(),
            relay_url: default_relay_url(),
            reconnect_secs: default_news_reconnect(),
            title: default_news_title(),
            description: default_news_description(),
        }
    }
}

impl NewsConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `pretty` or `json`
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file locations searched when no path is given
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::config_dir().map(|p| p.join("pagecast").join("config.toml")),
            Some(PathBuf::from("/etc/pagecast/config.toml")),
            Some(PathBuf::from("./pagecast.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Load the first existing file in `candidates`, or defaults if none exists
    ///
    /// An existing file that cannot be read or parsed is an error rather than
    /// a reason to fall back. Returns the file actually used.
    pub fn load_first(candidates: &[PathBuf]) -> Result<(Self, Option<PathBuf>), ConfigError> {
        match candidates.iter().find(|path| path.exists()) {
            Some(path) => Ok((Self::load_with_env(path)?, Some(path.clone()))),
            None => Ok((Self::from_env(), None)),
        }
    }

    /// Load from default locations or environment
    pub fn load_default() -> Result<(Self, Option<PathBuf>), ConfigError> {
        Self::load_first(&Self::default_paths())
    }

    /// Check invariants the rest of the system relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.token.is_empty() {
            return Err(ConfigError::Invalid(
                "admin.token must not be empty".to_string(),
            ));
        }
        if self.server.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.idle_timeout_secs must be positive".to_string(),
            ));
        }
        if self.cluster.enabled && self.cluster.topic.is_empty() {
            return Err(ConfigError::Invalid(
                "cluster.topic must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(host) = lookup("PAGECAST_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PAGECAST_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Some(token) = lookup("PAGECAST_ADMIN_TOKEN") {
            self.admin.token = token;
        }

        // Cluster overrides
        if let Some(url) = lookup("REDIS_URL") {
            self.cluster.redis_url = url;
            self.cluster.enabled = true;
        }
        if let Some(enabled) = lookup("PAGECAST_CLUSTER_ENABLED") {
            self.cluster.enabled = enabled.to_lowercase() != "false" && enabled != "0";
        }
        if let Some(pod) = lookup("PAGECAST_POD_NAME") {
            self.cluster.pod_name = Some(pod);
        }

        // News API overrides
        if let Some(port) = lookup("PAGECAST_NEWS_PORT") {
            if let Ok(p) = port.parse() {
                self.news.port = p;
            }
        }
        if let Some(url) = lookup("PAGECAST_RELAY_URL") {
            self.news.relay_url = url;
        }

        // Logging overrides
        if let Some(level) = lookup("PAGECAST_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("PAGECAST_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Pagecast Configuration
#
# Environment variables override these settings:
# - PAGECAST_HOST, PAGECAST_PORT
# - PAGECAST_ADMIN_TOKEN
# - REDIS_URL (also enables clustering), PAGECAST_CLUSTER_ENABLED, PAGECAST_POD_NAME
# - PAGECAST_NEWS_PORT, PAGECAST_RELAY_URL
# - PAGECAST_LOG_LEVEL, PAGECAST_LOG_FORMAT

[server]
host = "0.0.0.0"
port = 8080
# Close connections after this many seconds without traffic
idle_timeout_secs = 60
max_message_bytes = 16384

[admin]
# Shared secret for ws://host:port/admin?token=...
token = "admin-secret-token"

[cluster]
enabled = false
redis_url = "redis://localhost:6379"
topic = "GLOBAL_BROADCAST"
# pod_name = "relay-1"   # defaults to the host name
reconnect_backoff_ms = 3000

[news]
host = "0.0.0.0"
port = 3000
relay_url = "ws://localhost:8080"
reconnect_secs = 3

[logging]
# Log level: trace, debug, info, warn, error
level = "info"
# Log format: pretty, json
format = "pretty"
"#
    .to_string()
}
