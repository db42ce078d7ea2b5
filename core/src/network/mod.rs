#![deny(unsafe_code)]
//! Network session management
//!
//! One manager per layer. Each is a plain state machine advanced by `tick`
//! and fed by the callback handlers in [`dispatch`].

pub mod config;
pub mod dispatch;
pub mod error;
pub mod mqtt;
pub mod tcp;
pub mod wifi;

pub use config::{MqttConfig, SupervisorConfig, TcpConfig, WifiConfig};
pub use dispatch::Dispatch;
pub use error::{ConfigError, Error, Violation};
pub use mqtt::{InboundMessage, MqttManager, MqttState, MqttStats};
pub use tcp::{TcpManager, TcpState, TcpStats};
pub use wifi::{LinkState, LinkStats, WirelessManager};
