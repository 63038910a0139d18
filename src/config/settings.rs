//! Configuration settings for the bridgeward daemon.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::BridgeError;

/// Main configuration structure for the daemon.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address the bridge listens on.
    #[serde(default = "default_listen_addr")]
    pub addr: String,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Issued token lifetime in seconds.
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: u64,
    /// How long an unauthenticated connection may exist before it is closed.
    #[serde(default = "default_auth_deadline")]
    pub auth_deadline_seconds: u64,
    /// Width of the per-source authentication failure window.
    #[serde(default = "default_failure_window")]
    pub failure_window_seconds: u64,
    /// In-window failures after which further attempts are refused outright.
    #[serde(default = "default_rate_limit_failures")]
    pub rate_limit_failures: usize,
    /// In-window failures that trigger an automatic block.
    #[serde(default = "default_auto_block_failures")]
    pub auto_block_failures: usize,
    /// Duration of a block, automatic or manual.
    #[serde(default = "default_block_duration")]
    pub block_duration_seconds: u64,
    /// Interval between reputation sweep passes.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

/// Limits configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// Messages an authenticated connection may send per window.
    #[serde(default = "default_messages_per_window")]
    pub messages_per_window: u32,
    /// Width of the per-connection message window in seconds.
    #[serde(default = "default_message_window")]
    pub message_window_seconds: u64,
    /// Maximum concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_concurrent_connections: usize,
    /// Socket write timeout in seconds.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_seconds: u64,
}

/// Paths configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the signing secret, block list, and revocation file.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl PathsConfig {
    /// Path of the persisted signing secret.
    pub fn secret_path(&self) -> PathBuf {
        self.state_dir.join("secret.key")
    }

    /// Path of the persisted block list.
    pub fn block_list_path(&self) -> PathBuf {
        self.state_dir.join("blocklist.json")
    }

    /// Path of the persisted revocation ledger.
    pub fn revocation_path(&self) -> PathBuf {
        self.state_dir.join("revocations.json")
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Whether audit logging is enabled.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Path to the audit log file.
    #[serde(default = "default_audit_log_path")]
    pub log_path: PathBuf,
}

// Default value functions
fn default_listen_addr() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_token_ttl() -> u64 {
    86_400
}

fn default_auth_deadline() -> u64 {
    10
}

fn default_failure_window() -> u64 {
    300
}

fn default_rate_limit_failures() -> usize {
    10
}

fn default_auto_block_failures() -> usize {
    20
}

fn default_block_duration() -> u64 {
    3_600
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_max_message_size() -> usize {
    1_048_576 // 1MiB
}

fn default_messages_per_window() -> u32 {
    100
}

fn default_message_window() -> u64 {
    60
}

fn default_max_connections() -> usize {
    64
}

fn default_socket_timeout() -> u64 {
    30
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/bridgeward")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_audit_enabled() -> bool {
    true
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("/var/log/bridgeward/audit.log")
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            addr: default_listen_addr(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_ttl_seconds: default_token_ttl(),
            auth_deadline_seconds: default_auth_deadline(),
            failure_window_seconds: default_failure_window(),
            rate_limit_failures: default_rate_limit_failures(),
            auto_block_failures: default_auto_block_failures(),
            block_duration_seconds: default_block_duration(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            messages_per_window: default_messages_per_window(),
            message_window_seconds: default_message_window(),
            max_concurrent_connections: default_max_connections(),
            socket_timeout_seconds: default_socket_timeout(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            log_path: default_audit_log_path(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            security: SecurityConfig::default(),
            limits: LimitsConfig::default(),
            paths: PathsConfig::default(),
            logging: LoggingConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| BridgeError::Config {
            message: format!("Failed to read config file '{}': {}", path.display(), e),
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| BridgeError::Config {
            message: format!("Failed to parse config file '{}': {}", path.display(), e),
        })?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), BridgeError> {
        self.listen
            .addr
            .parse::<SocketAddr>()
            .map_err(|e| BridgeError::Config {
                message: format!("Invalid listen address '{}': {}", self.listen.addr, e),
            })?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(BridgeError::Config {
                message: format!(
                    "Invalid log level '{}'. Valid levels: {:?}",
                    self.logging.level, valid_levels
                ),
            });
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(BridgeError::Config {
                message: format!(
                    "Invalid log format '{}'. Valid formats: {:?}",
                    self.logging.format, valid_formats
                ),
            });
        }

        if self.security.token_ttl_seconds == 0 {
            return Err(BridgeError::Config {
                message: "token_ttl_seconds must be greater than zero".to_string(),
            });
        }

        if self.security.rate_limit_failures == 0 || self.security.auto_block_failures == 0 {
            return Err(BridgeError::Config {
                message: "failure thresholds must be greater than zero".to_string(),
            });
        }

        if self.security.rate_limit_failures > self.security.auto_block_failures {
            return Err(BridgeError::Config {
                message: format!(
                    "rate_limit_failures ({}) must not exceed auto_block_failures ({})",
                    self.security.rate_limit_failures, self.security.auto_block_failures
                ),
            });
        }

        if self.limits.messages_per_window == 0 || self.limits.max_message_size == 0 {
            return Err(BridgeError::Config {
                message: "message limits must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
