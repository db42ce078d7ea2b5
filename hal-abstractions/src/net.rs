#![deny(unsafe_code)]
//! Shared network types and the callback sink
//!
//! The underlying stack completes work asynchronously. Instead of invoking
//! user code through raw function pointers, it reports completions through
//! [`EventSource::poll_events`], handing each one to a [`NetEvents`] sink.
//! The sink only borrows the session managers, never the stack itself, so a
//! callback can not recurse back into the stack or into the supervisor tick.

use core::net::{AddrParseError, IpAddr, Ipv4Addr};
use core::str::FromStr;

use crate::mqtt::{ConnectionStatus, DataFlags};

/// Remote address and port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// IPv4 or IPv6 address
    pub addr: IpAddr,
    /// Port number
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint from an address and port
    pub const fn new(addr: IpAddr, port: u16) -> Self {
        Self { addr, port }
    }

    /// Create an IPv4 endpoint from octets
    pub const fn ipv4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), port)
    }

    /// Parse a textual address (`"192.168.1.10"`, `"fe80::1"`) into an endpoint
    ///
    /// # Errors
    ///
    /// Returns the parse error if `addr` is not a valid IPv4 or IPv6 address.
    ///
    /// # Example
    ///
    /// ```
    /// use connectivity_hal::Endpoint;
    ///
    /// let server = Endpoint::parse("192.168.1.10", 4242).unwrap();
    /// assert_eq!(server, Endpoint::ipv4(192, 168, 1, 10, 4242));
    /// ```
    pub fn parse(addr: &str, port: u16) -> Result<Self, AddrParseError> {
        IpAddr::from_str(addr).map(|addr| Self::new(addr, port))
    }
}

impl core::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.addr {
            IpAddr::V4(v4) => write!(f, "{}:{}", v4, self.port),
            IpAddr::V6(v6) => write!(f, "[{}]:{}", v6, self.port),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Endpoint {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self.addr {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                defmt::write!(f, "{}.{}.{}.{}:{}", o[0], o[1], o[2], o[3], self.port)
            }
            IpAddr::V6(v6) => defmt::write!(f, "[{:?}]:{}", v6.segments(), self.port),
        }
    }
}

/// Generation tag attached to every callback registration
///
/// A manager hands out a fresh tag each time it creates a connection and
/// drops events that carry any other tag. This is what keeps a late callback
/// for an already released handle from touching the new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CallbackTag(u32);

impl CallbackTag {
    /// Wrap a raw tag value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw tag value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The tag following this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Error reported by the network stack
///
/// Variants follow the lwIP `err_t` codes, which is what the supported
/// boards run underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// Out of memory (`ERR_MEM`)
    OutOfMemory,
    /// Buffer error (`ERR_BUF`)
    Buffer,
    /// Operation timed out (`ERR_TIMEOUT`)
    Timeout,
    /// No route to host (`ERR_RTE`)
    Routing,
    /// Operation already in progress (`ERR_INPROGRESS`)
    InProgress,
    /// Illegal value (`ERR_VAL`)
    IllegalValue,
    /// Operation would block (`ERR_WOULDBLOCK`)
    WouldBlock,
    /// Address in use (`ERR_USE`)
    AddrInUse,
    /// Already connecting (`ERR_ALREADY`)
    Already,
    /// Connection already established (`ERR_ISCONN`)
    IsConnected,
    /// Not connected (`ERR_CONN`)
    NotConnected,
    /// Low-level network interface error (`ERR_IF`)
    Interface,
    /// Connection aborted (`ERR_ABRT`)
    Aborted,
    /// Connection reset by peer (`ERR_RST`)
    Reset,
    /// Connection closed (`ERR_CLSD`)
    Closed,
    /// Illegal argument (`ERR_ARG`)
    IllegalArgument,
    /// Any code not listed above
    Other(i8),
}

impl StackError {
    /// Map a raw lwIP-style error code; `0` (`ERR_OK`) yields `None`
    pub const fn from_code(code: i8) -> Option<Self> {
        Some(match code {
            0 => return None,
            -1 => Self::OutOfMemory,
            -2 => Self::Buffer,
            -3 => Self::Timeout,
            -4 => Self::Routing,
            -5 => Self::InProgress,
            -6 => Self::IllegalValue,
            -7 => Self::WouldBlock,
            -8 => Self::AddrInUse,
            -9 => Self::Already,
            -10 => Self::IsConnected,
            -11 => Self::NotConnected,
            -12 => Self::Interface,
            -13 => Self::Aborted,
            -14 => Self::Reset,
            -15 => Self::Closed,
            -16 => Self::IllegalArgument,
            other => Self::Other(other),
        })
    }

    /// Raw lwIP-style error code
    pub const fn code(self) -> i8 {
        match self {
            Self::OutOfMemory => -1,
            Self::Buffer => -2,
            Self::Timeout => -3,
            Self::Routing => -4,
            Self::InProgress => -5,
            Self::IllegalValue => -6,
            Self::WouldBlock => -7,
            Self::AddrInUse => -8,
            Self::Already => -9,
            Self::IsConnected => -10,
            Self::NotConnected => -11,
            Self::Interface => -12,
            Self::Aborted => -13,
            Self::Reset => -14,
            Self::Closed => -15,
            Self::IllegalArgument => -16,
            Self::Other(code) => code,
        }
    }
}

impl core::fmt::Display for StackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "Out of memory"),
            Self::Buffer => write!(f, "Buffer error"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Routing => write!(f, "Routing problem"),
            Self::InProgress => write!(f, "Operation in progress"),
            Self::IllegalValue => write!(f, "Illegal value"),
            Self::WouldBlock => write!(f, "Operation would block"),
            Self::AddrInUse => write!(f, "Address in use"),
            Self::Already => write!(f, "Already connecting"),
            Self::IsConnected => write!(f, "Already connected"),
            Self::NotConnected => write!(f, "Not connected"),
            Self::Interface => write!(f, "Low-level netif error"),
            Self::Aborted => write!(f, "Connection aborted"),
            Self::Reset => write!(f, "Connection reset"),
            Self::Closed => write!(f, "Connection closed"),
            Self::IllegalArgument => write!(f, "Illegal argument"),
            Self::Other(code) => write!(f, "Stack error {}", code),
        }
    }
}

impl core::error::Error for StackError {}

impl embedded_io::Error for StackError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            Self::OutOfMemory | Self::Buffer => embedded_io::ErrorKind::OutOfMemory,
            Self::Timeout => embedded_io::ErrorKind::TimedOut,
            Self::IllegalValue | Self::IllegalArgument => embedded_io::ErrorKind::InvalidInput,
            Self::AddrInUse => embedded_io::ErrorKind::AddrInUse,
            Self::NotConnected => embedded_io::ErrorKind::NotConnected,
            Self::Aborted => embedded_io::ErrorKind::ConnectionAborted,
            Self::Reset => embedded_io::ErrorKind::ConnectionReset,
            Self::Closed => embedded_io::ErrorKind::BrokenPipe,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

/// Receiver of asynchronous completions from the network stack
///
/// Each method corresponds to one callback the stack can fire. The `tag` is
/// the one supplied when the callbacks were registered.
pub trait NetEvents {
    /// The TCP connect issued under `tag` completed
    fn tcp_connected(&mut self, tag: CallbackTag);

    /// Bytes arrived on the TCP connection; `None` means the peer closed it
    fn tcp_received(&mut self, tag: CallbackTag, data: Option<&[u8]>);

    /// The peer acknowledged `len` previously sent bytes
    fn tcp_sent(&mut self, tag: CallbackTag, len: u16);

    /// The TCP connection failed; the stack has already dropped its state
    fn tcp_error(&mut self, tag: CallbackTag, error: StackError);

    /// Broker connection status changed
    fn mqtt_connection(&mut self, tag: CallbackTag, status: ConnectionStatus);

    /// A subscribe request completed
    fn mqtt_subscribed(&mut self, tag: CallbackTag, result: Result<(), StackError>);

    /// An unsubscribe request completed
    fn mqtt_unsubscribed(&mut self, tag: CallbackTag, result: Result<(), StackError>);

    /// A publish request completed
    fn mqtt_published(&mut self, tag: CallbackTag, result: Result<(), StackError>);

    /// First phase of an inbound publish: topic name and total payload length
    fn mqtt_incoming_publish(&mut self, tag: CallbackTag, topic: &str, total_len: u32);

    /// Second phase of an inbound publish: one payload fragment
    fn mqtt_incoming_data(&mut self, tag: CallbackTag, data: &[u8], flags: DataFlags);
}

/// Stack side of callback delivery
pub trait EventSource {
    /// Process pending stack work once, without blocking, and deliver every
    /// completion that became ready to `sink`
    fn poll_events(&mut self, sink: &mut dyn NetEvents);
}
