//! # Configuration Management
//!
//! Centralized configuration for the BidCoS engine.
//!
//! This module provides structured configuration for the resend and lifetime
//! timers, the dispatch executor, the radio line framing and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`
//!
//! ## Timing
//! The defaults reproduce the radio protocol's timing exactly; changing them is
//! only useful for tests or for sticks with unusual latency.

use crate::error::{BidCoSError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Main engine configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    /// Resend and record lifetime timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Handler and transport dispatch
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Radio line framing
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| BidCoSError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| BidCoSError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| BidCoSError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(ttl) = std::env::var("BIDCOS_QUEUE_TTL_MS") {
            if let Ok(val) = ttl.parse::<u64>() {
                config.timing.queue_ttl = Duration::from_millis(val);
            }
        }

        if let Ok(ttl) = std::env::var("BIDCOS_PACKET_TTL_MS") {
            if let Ok(val) = ttl.parse::<u64>() {
                config.timing.packet_ttl = Duration::from_millis(val);
            }
        }

        if let Ok(limit) = std::env::var("BIDCOS_MAX_DISPATCHES") {
            if let Ok(val) = limit.parse::<usize>() {
                config.executor.max_concurrent_dispatches = val;
            }
        }

        if let Ok(prefix) = std::env::var("BIDCOS_SEND_PREFIX") {
            config.transport.send_prefix = prefix;
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BidCoSError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| BidCoSError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.timing.validate());
        errors.extend(self.executor.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(BidCoSError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Resend, pop-wait and record lifetime timing.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Tick of the initial wait before the first resend cycle
    #[serde(with = "duration_serde")]
    pub resend_jitter_tick: Duration,

    /// Number of jitter ticks (first arm only)
    pub resend_jitter_ticks: u32,

    /// Tick of the resend cycle
    #[serde(with = "duration_serde")]
    pub resend_tick: Duration,

    /// Number of ticks per resend cycle
    pub resend_ticks: u32,

    /// Tick used while waiting in `pop_wait`
    #[serde(with = "duration_serde")]
    pub pop_wait_tick: Duration,

    /// Idle lifetime of a "last packet" record
    #[serde(with = "duration_serde")]
    pub packet_ttl: Duration,

    /// Poll interval of a packet record watcher
    #[serde(with = "duration_serde")]
    pub packet_poll: Duration,

    /// Idle lifetime of a queue record
    #[serde(with = "duration_serde")]
    pub queue_ttl: Duration,

    /// Poll interval of a queue record watcher
    #[serde(with = "duration_serde")]
    pub queue_poll: Duration,

    /// Extra lifetime granted by a long keep-alive
    #[serde(with = "duration_serde")]
    pub long_keep_alive: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resend_jitter_tick: Duration::from_millis(30),
            resend_jitter_ticks: 3,
            resend_tick: Duration::from_millis(25),
            resend_ticks: 16,
            pop_wait_tick: Duration::from_millis(25),
            packet_ttl: Duration::from_millis(500),
            packet_poll: Duration::from_millis(50),
            queue_ttl: Duration::from_millis(1000),
            queue_poll: Duration::from_millis(300),
            long_keep_alive: Duration::from_millis(5000),
        }
    }
}

impl TimingConfig {
    /// Total wait before the first resend of a freshly armed head
    pub fn first_resend_delay(&self) -> Duration {
        self.resend_jitter_tick * self.resend_jitter_ticks + self.resend_cycle()
    }

    pub fn resend_cycle(&self) -> Duration {
        self.resend_tick * self.resend_ticks
    }

    /// Validate timing configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.resend_tick.is_zero() || self.resend_ticks == 0 {
            errors.push("Resend cycle must be longer than 0ms".to_string());
        }

        if self.pop_wait_tick.is_zero() {
            errors.push("Pop-wait tick must be longer than 0ms".to_string());
        }

        if self.packet_poll.is_zero() {
            errors.push("Packet watcher poll interval must be longer than 0ms".to_string());
        } else if self.packet_poll > self.packet_ttl {
            errors.push("Packet watcher poll interval exceeds packet TTL".to_string());
        }

        if self.queue_poll.is_zero() {
            errors.push("Queue watcher poll interval must be longer than 0ms".to_string());
        } else if self.queue_poll > self.queue_ttl {
            errors.push("Queue watcher poll interval exceeds queue TTL".to_string());
        }

        if self.queue_ttl < self.first_resend_delay() {
            errors.push(format!(
                "Queue TTL ({}ms) shorter than the first resend delay ({}ms)",
                self.queue_ttl.as_millis(),
                self.first_resend_delay().as_millis()
            ));
        }

        errors
    }
}

/// Bounded dispatch of handler invocations and transmissions
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Maximum number of handler/transport dispatches running at once
    pub max_concurrent_dispatches: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: 16,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.max_concurrent_dispatches == 0 {
            errors.push("Max concurrent dispatches must be greater than 0".to_string());
        } else if self.max_concurrent_dispatches > 1024 {
            errors.push(format!(
                "Max concurrent dispatches too large: {} (maximum: 1024)",
                self.max_concurrent_dispatches
            ));
        }
        errors
    }
}

/// Radio line framing
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Marker preceding received packet lines (`None` = bare hex)
    pub frame_prefix: Option<char>,

    /// Command prefix written before outgoing packets
    pub send_prefix: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            frame_prefix: Some('A'),
            send_prefix: String::from("As"),
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(prefix) = self.frame_prefix {
            if prefix.is_ascii_hexdigit() && prefix != 'A' {
                errors.push(format!(
                    "Frame prefix '{prefix}' is a hex digit and cannot be told apart from packet data"
                ));
            }
            if !prefix.is_ascii() {
                errors.push("Frame prefix must be an ASCII character".to_string());
            }
        }

        if !self.send_prefix.is_ascii() {
            errors.push("Send prefix must be ASCII".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("bidcos-engine"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
