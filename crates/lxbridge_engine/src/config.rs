//! Configuration for the bridge engine.

use crate::error::{BridgeError, BridgeResult};
use lxbridge_protocol::{ENABLE_UPDATES_PATH, STRUCTURE_PATH};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Configuration for one controller connection.
///
/// Deserializes from the host's JSON adapter configuration; durations are given
/// in milliseconds (`ackTimeoutMs`, `counterFlushIntervalMs`, `reconnect.delayMs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Controller address.
    pub endpoint: Endpoint,
    /// Login credentials.
    pub credentials: Credentials,
    /// Reconnect behavior.
    pub reconnect: ReconnectConfig,
    /// How long a local write waits for the controller's confirmation.
    #[serde(rename = "ackTimeoutMs", with = "duration_ms")]
    pub ack_timeout: Duration,
    /// Minimum interval between two persisted updates of the same counter.
    #[serde(rename = "counterFlushIntervalMs", with = "duration_ms")]
    pub counter_flush_interval: Duration,
    /// Request path of the structure description.
    pub structure_path: String,
    /// Request path that enables push updates.
    pub enable_updates_path: String,
}

impl BridgeConfig {
    /// Creates a configuration for the given controller.
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            endpoint: Endpoint {
                host: host.into(),
                port,
            },
            credentials,
            reconnect: ReconnectConfig::default(),
            ack_timeout: Duration::from_millis(500),
            counter_flush_interval: Duration::from_secs(30),
            structure_path: STRUCTURE_PATH.to_string(),
            enable_updates_path: ENABLE_UPDATES_PATH.to_string(),
        }
    }

    /// Sets the default acknowledgement timeout.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Sets the counter flush interval.
    pub fn with_counter_flush_interval(mut self, interval: Duration) -> Self {
        self.counter_flush_interval = interval;
        self
    }

    /// Sets the reconnect configuration.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Checks the configuration for values the engine cannot run with.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.endpoint.host.trim().is_empty() {
            return Err(BridgeError::Config("controller host is empty".into()));
        }
        if self.endpoint.port == 0 {
            return Err(BridgeError::Config("controller port is 0".into()));
        }
        if self.ack_timeout.is_zero() {
            return Err(BridgeError::Config("ack timeout must be positive".into()));
        }
        if self.counter_flush_interval.is_zero() {
            return Err(BridgeError::Config(
                "counter flush interval must be positive".into(),
            ));
        }
        if self.reconnect.delay.is_zero() {
            return Err(BridgeError::Config("reconnect delay must be positive".into()));
        }
        if self.structure_path.is_empty() || self.enable_updates_path.is_empty() {
            return Err(BridgeError::Config("request paths must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new("", 80, Credentials::default())
    }
}

/// Controller address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 80,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Login credentials.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Configuration for reconnect behavior.
///
/// The delay is fixed: every failed attempt waits the same amount of time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectConfig {
    /// Delay before the next connection attempt.
    #[serde(rename = "delayMs", with = "duration_ms")]
    pub delay: Duration,
}

impl ReconnectConfig {
    /// Creates a reconnect configuration with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = BridgeConfig::new("192.168.1.77", 80, Credentials::new("admin", "secret"))
            .with_ack_timeout(Duration::from_millis(250))
            .with_counter_flush_interval(Duration::from_secs(10))
            .with_reconnect(ReconnectConfig::new(Duration::from_secs(2)));

        assert_eq!(config.endpoint.to_string(), "192.168.1.77:80");
        assert_eq!(config.ack_timeout, Duration::from_millis(250));
        assert_eq!(config.counter_flush_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect.delay, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults() {
        let config = BridgeConfig::new("ms", 80, Credentials::default());
        assert_eq!(config.ack_timeout, Duration::from_millis(500));
        assert_eq!(config.counter_flush_interval, Duration::from_secs(30));
        assert_eq!(config.reconnect.delay, Duration::from_secs(5));
        assert_eq!(config.structure_path, STRUCTURE_PATH);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(BridgeConfig::default().validate().is_err());

        let config = BridgeConfig::new("ms", 80, Credentials::default())
            .with_ack_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));

        let config = BridgeConfig::new("ms", 80, Credentials::default())
            .with_reconnect(ReconnectConfig::new(Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn deserialize_from_host_json() {
        let json = r#"{
            "endpoint": {"host": "10.0.0.5", "port": 8080},
            "credentials": {"username": "bridge", "password": "pw"},
            "ackTimeoutMs": 1000,
            "reconnect": {"delayMs": 7000}
        }"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.endpoint.port, 8080);
        assert_eq!(config.ack_timeout, Duration::from_millis(1000));
        assert_eq!(config.reconnect.delay, Duration::from_secs(7));
        assert_eq!(config.counter_flush_interval, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "hunter2");
        let printed = format!("{creds:?}");
        assert!(printed.contains("admin"));
        assert!(!printed.contains("hunter2"));
    }
}
