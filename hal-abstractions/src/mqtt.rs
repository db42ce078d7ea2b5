#![deny(unsafe_code)]
//! MQTT client primitives
//!
//! The stack owns the wire protocol. The supervisor only drives the session:
//! connect, subscribe, publish, unsubscribe, disconnect. Inbound publishes
//! arrive in two phases: the topic first
//! ([`NetEvents::mqtt_incoming_publish`]), then one or more payload fragments
//! ([`NetEvents::mqtt_incoming_data`]), the final one flagged
//! [`DataFlags::LAST`].
//!
//! [`NetEvents::mqtt_incoming_publish`]: crate::NetEvents::mqtt_incoming_publish
//! [`NetEvents::mqtt_incoming_data`]: crate::NetEvents::mqtt_incoming_data

use crate::net::{CallbackTag, Endpoint, StackError};

/// Opaque identifier of one MQTT client instance inside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MqttHandle(u16);

impl MqttHandle {
    /// Wrap a stack-assigned identifier
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Stack-assigned identifier
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// MQTT delivery guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// At most once (QoS 0)
    AtMostOnce,
    /// At least once (QoS 1)
    #[default]
    AtLeastOnce,
    /// Exactly once (QoS 2)
    ExactlyOnce,
}

impl QoS {
    /// Numeric QoS level as carried on the wire
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// Broker connection status reported through the connection callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    /// CONNACK accepted
    Accepted,
    /// Broker does not support the protocol version
    RefusedProtocolVersion,
    /// Client identifier rejected
    RefusedIdentifier,
    /// Broker unavailable
    RefusedServer,
    /// Bad user name or password
    RefusedCredentials,
    /// Client not authorised
    RefusedNotAuthorized,
    /// Connection closed
    Disconnected,
    /// No CONNACK within the stack's timeout
    Timeout,
}

impl core::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::RefusedProtocolVersion => write!(f, "refused: protocol version"),
            Self::RefusedIdentifier => write!(f, "refused: identifier"),
            Self::RefusedServer => write!(f, "refused: server unavailable"),
            Self::RefusedCredentials => write!(f, "refused: bad credentials"),
            Self::RefusedNotAuthorized => write!(f, "refused: not authorized"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Flags attached to an inbound payload fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataFlags(u8);

impl DataFlags {
    /// No flags: more fragments follow
    pub const NONE: Self = Self(0);
    /// Final fragment of the current publish
    pub const LAST: Self = Self(0x01);

    /// Wrap raw flag bits
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw flag bits
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether this fragment completes the publish
    pub const fn is_last(self) -> bool {
        self.0 & Self::LAST.0 != 0
    }
}

/// Client parameters sent with CONNECT
#[derive(Debug, Clone, Copy)]
pub struct ClientInfo<'a> {
    /// Client identifier
    pub client_id: &'a str,
    /// Keep-alive interval in seconds (0 disables)
    pub keep_alive_secs: u16,
}

/// MQTT capabilities consumed by the MQTT session manager
///
/// Requests complete asynchronously through [`NetEvents`](crate::NetEvents)
/// under the tag given with the request.
pub trait MqttStack {
    /// Allocate a client instance
    fn new_client(&mut self) -> Result<MqttHandle, StackError>;

    /// Start connecting `handle` to `broker`
    fn connect(
        &mut self,
        handle: MqttHandle,
        broker: &Endpoint,
        info: &ClientInfo<'_>,
        tag: CallbackTag,
    ) -> Result<(), StackError>;

    /// Route inbound publish callbacks of `handle` to the sink with `tag`
    fn set_publish_callbacks(&mut self, handle: MqttHandle, tag: CallbackTag);

    /// Request a subscription to `topic`
    fn subscribe(
        &mut self,
        handle: MqttHandle,
        topic: &str,
        qos: QoS,
        tag: CallbackTag,
    ) -> Result<(), StackError>;

    /// Request removal of the subscription to `topic`
    fn unsubscribe(
        &mut self,
        handle: MqttHandle,
        topic: &str,
        tag: CallbackTag,
    ) -> Result<(), StackError>;

    /// Publish `payload` on `topic`
    fn publish(
        &mut self,
        handle: MqttHandle,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        tag: CallbackTag,
    ) -> Result<(), StackError>;

    /// Send DISCONNECT and close the connection
    fn disconnect(&mut self, handle: MqttHandle);

    /// Free the client instance
    fn release_client(&mut self, handle: MqttHandle);
}
