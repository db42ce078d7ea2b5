#![deny(unsafe_code)]
//! Supervisor configuration
//!
//! Credentials and addresses are `&'static str` so they can be baked into the
//! firmware image (e.g. via `env!`). The managers validate and copy what they
//! need into fixed-capacity storage at construction time.

use connectivity_hal::{Endpoint, QoS};

use super::error::ConfigError;

/// Interval between runs of each manager's tick
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 100;
/// How long a join may take before it is abandoned and restarted
pub const DEFAULT_ASSOCIATION_TIMEOUT_MS: u32 = 20_000;
/// Delay between reconnection attempts
pub const DEFAULT_RETRY_INTERVAL_MS: u32 = 2_000;
/// Port of the TCP test server
pub const DEFAULT_TCP_PORT: u16 = 4242;
/// Plain MQTT port
pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_KEEP_ALIVE_SECS: u16 = 60;

/// Wireless association settings
#[derive(Debug, Clone, Copy)]
pub struct WifiConfig {
    /// Network name (1..=32 bytes)
    pub ssid: &'static str,
    /// WPA2 passphrase (1..=63 bytes)
    pub passphrase: &'static str,
    pub poll_interval_ms: u32,
    pub association_timeout_ms: u32,
}

impl Default for WifiConfig {
    fn default() -> Self {
        Self {
            ssid: "iot-playground",
            passphrase: "changeme",
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            association_timeout_ms: DEFAULT_ASSOCIATION_TIMEOUT_MS,
        }
    }
}

/// Outbound TCP session settings
#[derive(Debug, Clone, Copy)]
pub struct TcpConfig {
    /// Server to connect to
    pub remote: Endpoint,
    pub poll_interval_ms: u32,
    /// Minimum spacing between connection attempts
    pub retry_interval_ms: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            remote: Endpoint::ipv4(192, 168, 1, 1, DEFAULT_TCP_PORT),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

/// MQTT session settings
#[derive(Debug, Clone, Copy)]
pub struct MqttConfig {
    /// Broker address
    pub broker: Endpoint,
    /// Client identifier sent with CONNECT
    pub client_id: &'static str,
    /// Keep-alive interval in seconds
    pub keep_alive_secs: u16,
    /// Topic filters subscribed to once the broker accepts the connection
    pub topics: &'static [&'static str],
    /// QoS used for every subscription
    pub qos: QoS,
    pub poll_interval_ms: u32,
    /// Minimum spacing between connection attempts
    pub retry_interval_ms: u32,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: Endpoint::ipv4(192, 168, 1, 1, DEFAULT_MQTT_PORT),
            client_id: "iot-playground",
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            topics: &["/led"],
            qos: QoS::AtLeastOnce,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

/// Everything the supervisor runs; `None` leaves that session out
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub wifi: WifiConfig,
    pub tcp: Option<TcpConfig>,
    pub mqtt: Option<MqttConfig>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            wifi: WifiConfig::default(),
            tcp: Some(TcpConfig::default()),
            mqtt: None,
        }
    }
}

/// Parse a textual IP address into an [`Endpoint`]
///
/// # Errors
///
/// [`ConfigError::InvalidAddress`] if `addr` is not an IPv4 or IPv6 literal.
///
/// # Example
///
/// ```
/// use connectivity_core::network::config::parse_endpoint;
///
/// let broker = parse_endpoint("10.0.0.2", 1883).unwrap();
/// assert_eq!(broker.port, 1883);
/// assert!(parse_endpoint("broker.local", 1883).is_err());
/// ```
pub fn parse_endpoint(addr: &str, port: u16) -> Result<Endpoint, ConfigError> {
    Endpoint::parse(addr, port).map_err(|_| ConfigError::InvalidAddress)
}
