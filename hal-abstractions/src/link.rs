#![deny(unsafe_code)]
//! Wireless link driver abstraction

/// Link status as reported by the radio driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    /// Not associated and not trying
    Down,
    /// Association or address configuration in progress
    Joining,
    /// Associated with an address; traffic can flow
    Up,
    /// The access point rejected the credentials
    AuthFailed,
}

impl core::fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Down => write!(f, "down"),
            Self::Joining => write!(f, "joining"),
            Self::Up => write!(f, "up"),
            Self::AuthFailed => write!(f, "auth failed"),
        }
    }
}

/// Radio driver capabilities consumed by the wireless association manager
///
/// Every method must return promptly. `begin_association` only starts the
/// join; progress is observed later through `link_status`.
pub trait LinkDriver {
    /// Let the driver process pending work (interrupt backlog, firmware events)
    fn poll_once(&mut self);

    /// Start joining the network identified by `ssid` (fire-and-forget)
    fn begin_association(&mut self, ssid: &str, passphrase: &str);

    /// Current link status of the station interface
    fn link_status(&self) -> LinkStatus;
}
