//! Hardware and network-stack abstraction traits for the connectivity supervisor
//!
//! This crate defines the capability surface the supervisor consumes from its
//! external collaborators. Board support packages implement these traits on top
//! of their radio driver and TCP/IP stack; the supervisor core never touches
//! vendor APIs directly.
//!
//! - **`clock`**: monotonic millisecond readings with wraparound arithmetic
//! - **`link`**: wireless link driver (association + status)
//! - **`net`**: endpoints, handles, callback tags, stack errors and the event sink
//! - **`tcp`**: outbound TCP connection primitives
//! - **`mqtt`**: MQTT client primitives and the two-phase publish callback shape

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod clock;
pub mod link;
pub mod mqtt;
pub mod net;
pub mod tcp;

pub use clock::{Clock, ClockReading};
pub use link::{LinkDriver, LinkStatus};
pub use mqtt::{ClientInfo, ConnectionStatus, DataFlags, MqttHandle, MqttStack, QoS};
pub use net::{CallbackTag, Endpoint, EventSource, NetEvents, StackError};
pub use tcp::{TcpHandle, TcpStack};
