//! Platform-agnostic connectivity supervisor for IoT firmware
//!
//! This crate contains the connection logic shared across all supported
//! boards. It has NO hardware dependencies: the radio driver, the TCP/IP
//! stack and the MQTT client are reached through the traits in
//! `connectivity-hal`.
//!
//! ## Architecture
//!
//! Three cooperating state machines, all advanced from one non-blocking tick:
//!
//! - [`network::wifi::WirelessManager`]: association and reconnection
//! - [`network::tcp::TcpManager`]: one outbound TCP session with a bounded
//!   receive buffer
//! - [`network::mqtt::MqttManager`]: MQTT connect, subscribe, publish and
//!   orderly shutdown with reference-counted subscriptions
//!
//! [`Supervisor::tick`] polls the stack once (delivering callbacks through
//! [`network::dispatch::Dispatch`]), runs the follow-up work those callbacks
//! requested, then advances each state machine whose interval has elapsed.
//! Nothing blocks and nothing allocates.
//!
//! ## Usage
//! ```ignore
//! let mut supervisor = Supervisor::new(board, &config)?;
//! loop {
//!     if let Err(e) = supervisor.run_once(&clock) {
//!         error!("MQTT session halted: {}", e);
//!         supervisor.restart_mqtt();
//!     }
//!     board.sleep_ms(10);
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

// Must come first so the logging macros are visible to every other module.
#[macro_use]
mod fmt;

pub mod buffer;
pub mod network;
pub mod supervisor;
pub mod time;

#[cfg(test)]
mod mock;

pub use buffer::RxBuffer;
pub use network::config::{MqttConfig, SupervisorConfig, TcpConfig, WifiConfig};
pub use network::error::{ConfigError, Error, Violation};
pub use supervisor::{Platform, Supervisor};

pub use connectivity_hal as hal;
