//! Configuration types for the NASA bridge
//!
//! This module provides configuration structures for the serial transport,
//! the MQTT endpoint, polling cadence, debug logging and reconnection.
//! Durations are written as humantime strings (`"30s"`, `"500ms"`).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::codec::{Address, MessageNumber};
use crate::error::{BridgeError, Result};

/// Default baud rate of the NASA bus
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default topic prefix for state and command topics
pub const DEFAULT_TOPIC_PREFIX: &str = "samsung_ehs";

/// Default topic prefix for the debug message tree
pub const DEFAULT_DEBUG_PREFIX: &str = "samsung_ehs_debug";

/// Default polling interval in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default capacity of the MQTT publish queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Main configuration for the bridge
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Nasa2MqttConfig {
    /// Bus transport (serial port or TCP gateway)
    #[serde(default)]
    pub transport: TransportConfig,

    /// MQTT endpoint
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Polling behaviour
    #[serde(default)]
    pub poll: PollConfig,

    /// Debug logging switches
    #[serde(default)]
    pub debug: DebugConfig,

    /// Reconnection settings, shared by the transport and MQTT
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl Nasa2MqttConfig {
    /// Check the configuration for values the bridge cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval.is_zero() {
            return Err(BridgeError::InvalidConfig(
                "poll.interval must be greater than zero".into(),
            ));
        }
        if self.poll.response_timeout.is_zero() || self.poll.response_timeout >= self.poll.interval
        {
            return Err(BridgeError::InvalidConfig(format!(
                "poll.response_timeout ({}) must be non-zero and shorter than poll.interval ({})",
                humantime::format_duration(self.poll.response_timeout),
                humantime::format_duration(self.poll.interval)
            )));
        }

        if self.mqtt.is_enabled() {
            if self.mqtt.port == 0 {
                return Err(BridgeError::InvalidConfig("mqtt.port must not be 0".into()));
            }
            for prefix in [&self.mqtt.topic_prefix, &self.mqtt.debug_prefix] {
                if prefix.is_empty() || prefix.contains(['+', '#']) || prefix.ends_with('/') {
                    return Err(BridgeError::InvalidConfig(format!(
                        "invalid MQTT topic prefix '{}'",
                        prefix
                    )));
                }
            }
            if self.mqtt.queue_capacity == 0 {
                return Err(BridgeError::InvalidConfig(
                    "mqtt.queue_capacity must be greater than zero".into(),
                ));
            }
        }

        if self.reconnect.initial_delay > self.reconnect.max_delay {
            return Err(BridgeError::InvalidConfig(
                "reconnect.initial_delay exceeds reconnect.max_delay".into(),
            ));
        }

        if let TransportConfig::Tcp { host, .. } = &self.transport {
            if host.is_empty() {
                return Err(BridgeError::InvalidConfig("transport.host is empty".into()));
            }
        }

        Ok(())
    }
}

/// Transport used to reach the NASA bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// RS-485 adapter on a local serial port (9600 8E1)
    Serial {
        /// Path to serial port (e.g., /dev/ttyUSB0, COM3)
        port: PathBuf,
        /// Baud rate (default: 9600)
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// RS-485 to TCP gateway
    Tcp {
        /// Gateway host
        host: String,
        /// Gateway port
        port: u16,
    },
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Serial {
            port: PathBuf::from("/dev/ttyUSB0"),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// MQTT endpoint configuration
///
/// An empty `host` disables MQTT; decoded values are then only logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host, empty to disable
    #[serde(default)]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Username, empty for anonymous
    #[serde(default)]
    pub username: String,

    /// Password
    #[serde(default)]
    pub password: String,

    /// MQTT client identifier, generated when empty
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Prefix of state and command topics
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    /// Prefix of the debug message tree
    #[serde(default = "default_debug_prefix")]
    pub debug_prefix: String,

    /// Keep-alive interval
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive: Duration,

    /// Publishes held while disconnected; the oldest is dropped on overflow
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl MqttConfig {
    /// Whether MQTT bridging is configured at all
    pub fn is_enabled(&self) -> bool {
        !self.host.is_empty()
    }
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_client_id() -> String {
    "nasa2mqtt".to_string()
}

fn default_topic_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

fn default_debug_prefix() -> String {
    DEFAULT_DEBUG_PREFIX.to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MQTT_PORT,
            username: String::new(),
            password: String::new(),
            client_id: default_client_id(),
            topic_prefix: default_topic_prefix(),
            debug_prefix: default_debug_prefix(),
            keep_alive: default_keep_alive(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// A device capability polled with read requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PollTarget {
    /// Device address, e.g. "20.00.00"
    pub address: Address,
    /// Message number, e.g. "4203"
    pub message: MessageNumber,
}

/// Polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Interval between poll rounds and discovery reports
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub interval: Duration,

    /// How long to wait for a response before retrying
    #[serde(with = "humantime_serde", default = "default_response_timeout")]
    pub response_timeout: Duration,

    /// Retries after the first request before a pair is marked stale
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Pairs to poll; empty means passive listening only
    #[serde(default)]
    pub targets: Vec<PollTarget>,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
}

fn default_response_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_max_retries() -> u32 {
    3
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            response_timeout: default_response_timeout(),
            max_retries: default_max_retries(),
            targets: Vec::new(),
        }
    }
}

/// Debug logging switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    /// Log every decoded frame (and publish the debug topic tree)
    #[serde(default)]
    pub log_messages: bool,

    /// Log raw received bytes as hex
    #[serde(default)]
    pub log_messages_raw: bool,

    /// Records buffered for the log sink before new ones are dropped
    #[serde(default = "default_debug_capacity")]
    pub channel_capacity: usize,
}

fn default_debug_capacity() -> usize {
    1024
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_messages: false,
            log_messages_raw: false,
            channel_capacity: default_debug_capacity(),
        }
    }
}

/// Reconnection behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Enable automatic reconnection
    #[serde(default = "default_auto_reconnect")]
    pub enabled: bool,

    /// Initial delay before first reconnection attempt
    #[serde(with = "humantime_serde", default = "default_initial_delay")]
    pub initial_delay: Duration,

    /// Maximum delay between reconnection attempts
    #[serde(with = "humantime_serde", default = "default_max_delay")]
    pub max_delay: Duration,

    /// Maximum number of reconnection attempts (0 = infinite)
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based), doubling up to
    /// `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows(&self, attempts: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempts < self.max_attempts)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            max_attempts: 0,
        }
    }
}

/// Builder for Nasa2MqttConfig
#[derive(Debug, Default)]
pub struct Nasa2MqttConfigBuilder {
    config: Nasa2MqttConfig,
}

impl Nasa2MqttConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a local serial port
    pub fn serial_port(mut self, port: impl Into<PathBuf>) -> Self {
        self.config.transport = TransportConfig::Serial {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        };
        self
    }

    /// Use an RS-485 to TCP gateway
    pub fn tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.transport = TransportConfig::Tcp {
            host: host.into(),
            port,
        };
        self
    }

    /// Set the MQTT broker
    pub fn mqtt_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.config.mqtt.host = host.into();
        self.config.mqtt.port = port;
        self
    }

    /// Set MQTT credentials
    pub fn mqtt_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.mqtt.username = username.into();
        self.config.mqtt.password = password.into();
        self
    }

    /// Set the MQTT publish queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.mqtt.queue_capacity = capacity;
        self
    }

    /// Set the polling interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll.interval = interval;
        self
    }

    /// Set the response timeout and retry budget
    pub fn retries(mut self, response_timeout: Duration, max_retries: u32) -> Self {
        self.config.poll.response_timeout = response_timeout;
        self.config.poll.max_retries = max_retries;
        self
    }

    /// Add a pair to poll
    pub fn poll_target(mut self, address: Address, message: MessageNumber) -> Self {
        self.config.poll.targets.push(PollTarget { address, message });
        self
    }

    /// Enable or disable decoded message logging
    pub fn debug_log_messages(mut self, enabled: bool) -> Self {
        self.config.debug.log_messages = enabled;
        self
    }

    /// Enable or disable raw byte logging
    pub fn debug_log_messages_raw(mut self, enabled: bool) -> Self {
        self.config.debug.log_messages_raw = enabled;
        self
    }

    /// Enable or disable auto-reconnect
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect.enabled = enabled;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Nasa2MqttConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Nasa2MqttConfig::default();
        assert!(!config.mqtt.is_enabled());
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.poll.interval, Duration::from_secs(30));
        assert!(!config.debug.log_messages);
        assert!(!config.debug.log_messages_raw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = Nasa2MqttConfigBuilder::new()
            .tcp("192.168.1.50", 8899)
            .mqtt_host("broker.local", 1884)
            .mqtt_credentials("ehs", "secret")
            .poll_interval(Duration::from_secs(10))
            .poll_target("20.00.00".parse().unwrap(), MessageNumber(0x4203))
            .debug_log_messages(true)
            .build();

        assert!(config.mqtt.is_enabled());
        assert_eq!(config.mqtt.username, "ehs");
        assert_eq!(config.poll.targets.len(), 1);
        assert!(config.debug.log_messages);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config: Nasa2MqttConfig = toml::from_str(
            r#"
            [transport]
            type = "serial"
            port = "/dev/ttyAMA0"

            [mqtt]
            host = "10.0.0.2"
            username = "ehs"

            [poll]
            interval = "1m"
            response_timeout = "1500ms"
            targets = [{ address = "20.00.00", message = "4203" }]

            [debug]
            log_messages_raw = true
            "#,
        )
        .unwrap();

        match &config.transport {
            TransportConfig::Serial { port, baud_rate } => {
                assert_eq!(port, &PathBuf::from("/dev/ttyAMA0"));
                assert_eq!(*baud_rate, 9600);
            }
            other => panic!("unexpected transport {:?}", other),
        }
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.topic_prefix, "samsung_ehs");
        assert_eq!(config.poll.interval, Duration::from_secs(60));
        assert_eq!(config.poll.response_timeout, Duration::from_millis(1500));
        assert_eq!(config.poll.targets[0].message, MessageNumber(0x4203));
        assert!(config.debug.log_messages_raw);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = Nasa2MqttConfigBuilder::new()
            .poll_interval(Duration::from_secs(1))
            .retries(Duration::from_secs(2), 3)
            .build();
        assert!(config.validate().is_err());

        let mut config = Nasa2MqttConfigBuilder::new()
            .mqtt_host("broker", 1883)
            .build();
        config.mqtt.topic_prefix = "ehs/#".into();
        assert!(config.validate().is_err());

        let config = Nasa2MqttConfigBuilder::new()
            .mqtt_host("broker", 1883)
            .queue_capacity(0)
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_backoff() {
        let reconnect = ReconnectConfig::default();
        assert_eq!(reconnect.backoff(1), Duration::from_secs(1));
        assert_eq!(reconnect.backoff(2), Duration::from_secs(2));
        assert_eq!(reconnect.backoff(4), Duration::from_secs(8));
        assert_eq!(reconnect.backoff(10), Duration::from_secs(60));
        assert!(reconnect.allows(1000));

        let limited = ReconnectConfig {
            max_attempts: 3,
            ..ReconnectConfig::default()
        };
        assert!(limited.allows(2));
        assert!(!limited.allows(3));
    }
}
