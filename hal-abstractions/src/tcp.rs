#![deny(unsafe_code)]
//! Outbound TCP primitives

use crate::net::{CallbackTag, Endpoint, StackError};

/// Opaque identifier of one connection control block inside the stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TcpHandle(u16);

impl TcpHandle {
    /// Wrap a stack-assigned identifier
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Stack-assigned identifier
    pub const fn raw(self) -> u16 {
        self.0
    }
}

/// TCP capabilities consumed by the TCP session manager
///
/// None of these may block. `connect` only issues the SYN; completion is
/// reported later through [`NetEvents::tcp_connected`] or
/// [`NetEvents::tcp_error`].
///
/// [`NetEvents::tcp_connected`]: crate::NetEvents::tcp_connected
/// [`NetEvents::tcp_error`]: crate::NetEvents::tcp_error
pub trait TcpStack {
    /// Allocate a control block suitable for reaching `remote`
    fn allocate(&mut self, remote: &Endpoint) -> Result<TcpHandle, StackError>;

    /// Route all future callbacks of `handle` to the sink with `tag`
    fn register_callbacks(&mut self, handle: TcpHandle, tag: CallbackTag);

    /// Start connecting `handle` to `remote`
    fn connect(&mut self, handle: TcpHandle, remote: &Endpoint) -> Result<(), StackError>;

    /// Queue `data` for transmission; returns the number of bytes accepted
    fn send(&mut self, handle: TcpHandle, data: &[u8]) -> Result<usize, StackError>;

    /// Close and free the control block; no callbacks follow for `handle`
    ///
    /// Must tolerate a handle the stack already dropped on its own after
    /// reporting [`NetEvents::tcp_error`].
    fn release(&mut self, handle: TcpHandle);
}
