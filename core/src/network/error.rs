#![deny(unsafe_code)]
//! Error types for the connectivity supervisor

use connectivity_hal::{ConnectionStatus, StackError};

/// Rejected configuration input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    EmptySsid,
    SsidTooLong,
    EmptyPassphrase,
    PassphraseTooLong,
    InvalidAddress,
    EmptyClientId,
    ClientIdTooLong,
    EmptyTopic,
    TopicTooLong,
    TooManyTopics,
    /// Topic contains NUL, or a wildcard where a topic name is required
    InvalidTopic,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptySsid => write!(f, "SSID is empty"),
            Self::SsidTooLong => write!(f, "SSID exceeds 32 bytes"),
            Self::EmptyPassphrase => write!(f, "passphrase is empty"),
            Self::PassphraseTooLong => write!(f, "passphrase exceeds 63 bytes"),
            Self::InvalidAddress => write!(f, "not an IP address"),
            Self::EmptyClientId => write!(f, "MQTT client ID is empty"),
            Self::ClientIdTooLong => write!(f, "MQTT client ID too long"),
            Self::EmptyTopic => write!(f, "MQTT topic is empty"),
            Self::TopicTooLong => write!(f, "MQTT topic too long"),
            Self::TooManyTopics => write!(f, "too many MQTT topics"),
            Self::InvalidTopic => write!(f, "invalid MQTT topic"),
        }
    }
}

impl core::error::Error for ConfigError {}

/// Broker behaviour the MQTT session can not recover from on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Violation {
    /// Connection closed before the broker ever accepted it
    BrokerUnreachable,
    /// Connection callback reported a refusal or other unexpected status
    UnexpectedStatus(ConnectionStatus),
    /// Broker rejected a subscription
    SubscribeRejected(StackError),
    /// Broker rejected an unsubscribe
    UnsubscribeRejected(StackError),
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BrokerUnreachable => write!(f, "disconnected before the broker accepted"),
            Self::UnexpectedStatus(status) => write!(f, "unexpected connection status: {}", status),
            Self::SubscribeRejected(e) => write!(f, "subscribe rejected: {}", e),
            Self::UnsubscribeRejected(e) => write!(f, "unsubscribe rejected: {}", e),
        }
    }
}

/// Supervisor error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Bad input at initialization
    InvalidConfig(ConfigError),
    /// The stack could not create a connection or client instance
    HandleAllocation(StackError),
    /// No link within the association timeout
    AssociationTimeout,
    /// The access point rejected the credentials
    AssociationAuthFailure,
    /// A connection request failed or the connection was lost
    Connection(StackError),
    /// The MQTT session halted; needs an explicit restart
    ProtocolViolation(Violation),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidConfig(e) => write!(f, "Invalid configuration: {}", e),
            Self::HandleAllocation(e) => write!(f, "Handle allocation failed: {}", e),
            Self::AssociationTimeout => write!(f, "Association timed out"),
            Self::AssociationAuthFailure => write!(f, "Association rejected credentials"),
            Self::Connection(e) => write!(f, "Connection error: {}", e),
            Self::ProtocolViolation(v) => write!(f, "Protocol violation: {}", v),
        }
    }
}

impl core::error::Error for Error {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

impl From<Violation> for Error {
    fn from(v: Violation) -> Self {
        Self::ProtocolViolation(v)
    }
}
