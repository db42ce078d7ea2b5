#![deny(unsafe_code)]
//! TCP session manager
//!
//! Maintains one outbound connection to a fixed server. Connection attempts
//! are spaced by the retry interval; a connect that stays pending past that
//! interval is abandoned and reissued on a fresh handle. Received bytes land
//! in a bounded [`RxBuffer`] that the application drains at its own pace.
//!
//! Callback handlers never talk to the stack. When a callback ends the
//! connection, the handle is parked and released by [`TcpManager::service`],
//! which the supervisor runs right after delivering callbacks.

use connectivity_hal::{CallbackTag, ClockReading, Endpoint, StackError, TcpHandle, TcpStack};

use super::config::TcpConfig;
use super::error::Error;
use crate::buffer::RxBuffer;
use crate::time::{Deadline, IntervalTimer};

/// Receive buffer size, terminator included
pub const DEFAULT_RX_CAPACITY: usize = 1024;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TcpState {
    Disconnected,
    /// Connect issued, waiting for the stack to confirm
    Connecting,
    Connected,
}

/// Counters kept across reconnections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TcpStats {
    /// Handles opened (connect issued)
    pub opens: u32,
    /// Connections established
    pub connects: u32,
    /// Errors reported by the stack, including failed opens
    pub errors: u32,
    /// Orderly closes initiated by the server
    pub peer_closes: u32,
    pub bytes_received: u32,
    /// Bytes lost to a full receive buffer
    pub bytes_dropped: u32,
    /// Bytes the server acknowledged
    pub bytes_acked: u32,
}

/// TCP session manager with an `RX`-byte receive buffer
pub struct TcpManager<const RX: usize = DEFAULT_RX_CAPACITY> {
    remote: Endpoint,
    handle: Option<TcpHandle>,
    /// Handle dropped by a callback, waiting for [`service`](Self::service)
    retired: Option<TcpHandle>,
    tag: CallbackTag,
    state: TcpState,
    rx: RxBuffer<RX>,
    interval: IntervalTimer,
    retry_interval_ms: u32,
    retry: Option<Deadline>,
    stats: TcpStats,
}

impl<const RX: usize> TcpManager<RX> {
    /// Create a disconnected manager; the first due tick opens the connection
    pub fn new(config: &TcpConfig) -> Self {
        Self {
            remote: config.remote,
            handle: None,
            retired: None,
            tag: CallbackTag::default(),
            state: TcpState::Disconnected,
            rx: RxBuffer::new(),
            interval: IntervalTimer::new(config.poll_interval_ms),
            retry_interval_ms: config.retry_interval_ms,
            retry: None,
            stats: TcpStats::default(),
        }
    }

    /// Open a connection to `remote`
    ///
    /// Any previous handle is released first, so at most one connection
    /// exists at a time. On success the manager is [`TcpState::Connecting`]
    /// and completion arrives through [`on_connected`](Self::on_connected)
    /// or [`on_error`](Self::on_error). The retry interval for the new
    /// connection starts at the next [`tick`](Self::tick).
    ///
    /// # Errors
    ///
    /// - [`Error::HandleAllocation`] if the stack has no control block to spare
    /// - [`Error::Connection`] if the connect request itself was refused; the
    ///   fresh handle is released again
    pub fn open<S: TcpStack + ?Sized>(
        &mut self,
        stack: &mut S,
        remote: Endpoint,
    ) -> Result<(), Error> {
        self.release_handles(stack);
        self.state = TcpState::Disconnected;
        self.remote = remote;
        self.retry = None;

        let handle = stack.allocate(&remote).map_err(|e| {
            error!("Failed to allocate TCP handle: {}", e);
            self.stats.errors = self.stats.errors.wrapping_add(1);
            Error::HandleAllocation(e)
        })?;

        self.tag = self.tag.next();
        stack.register_callbacks(handle, self.tag);
        self.stats.opens = self.stats.opens.wrapping_add(1);

        info!("Connecting to {}", remote);
        if let Err(e) = stack.connect(handle, &remote) {
            warn!("TCP connect to {} failed: {}", remote, e);
            self.stats.errors = self.stats.errors.wrapping_add(1);
            stack.release(handle);
            return Err(Error::Connection(e));
        }

        self.handle = Some(handle);
        self.state = TcpState::Connecting;
        Ok(())
    }

    /// Reconnect when due
    ///
    /// Releases anything the callback handlers retired, then, while
    /// disconnected, opens a connection as soon as the retry interval since
    /// the previous attempt has passed (immediately the first time). A
    /// connection still pending when the retry interval runs out is
    /// abandoned and reopened.
    pub fn tick<S: TcpStack + ?Sized>(&mut self, stack: &mut S, now: ClockReading) {
        self.service(stack);
        if !self.interval.is_due(now) {
            return;
        }

        match (self.state, self.retry) {
            (TcpState::Disconnected, None) => self.reopen(stack, now),
            (TcpState::Disconnected, Some(retry)) if retry.has_expired(now) => {
                self.reopen(stack, now)
            }
            // Opened outside of `tick`: the pending connect gets a full interval.
            (TcpState::Connecting, None) => {
                self.retry = Some(Deadline::arm(now, self.retry_interval_ms));
            }
            (TcpState::Connecting, Some(retry)) if retry.has_expired(now) => {
                warn!("Connect to {} still pending, starting over", self.remote);
                self.reopen(stack, now);
            }
            _ => {}
        }
    }

    fn reopen<S: TcpStack + ?Sized>(&mut self, stack: &mut S, now: ClockReading) {
        let result = self.open(stack, self.remote);
        self.retry = Some(Deadline::arm(now, self.retry_interval_ms));
        if let Err(e) = result {
            debug!("TCP open failed, retrying in {} ms: {}", self.retry_interval_ms, e);
        }
    }

    /// Release whatever the callback handlers retired
    pub fn service<S: TcpStack + ?Sized>(&mut self, stack: &mut S) {
        if let Some(handle) = self.retired.take() {
            debug!("Releasing TCP handle {}", handle.raw());
            stack.release(handle);
        }
    }

    /// Queue `data` on the open connection
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] with [`StackError::NotConnected`] unless
    /// connected, or whatever the stack reports.
    pub fn send<S: TcpStack + ?Sized>(&mut self, stack: &mut S, data: &[u8]) -> Result<usize, Error> {
        let handle = match (self.state, self.handle) {
            (TcpState::Connected, Some(handle)) => handle,
            _ => return Err(Error::Connection(StackError::NotConnected)),
        };
        stack.send(handle, data).map_err(|e| {
            warn!("TCP send of {} bytes failed: {}", data.len(), e);
            Error::Connection(e)
        })
    }

    /// Drop the connection because the link went away
    ///
    /// Everything is released right away and the next tick after the link
    /// returns reconnects without waiting for the retry interval.
    pub fn link_lost<S: TcpStack + ?Sized>(&mut self, stack: &mut S) {
        if self.state != TcpState::Disconnected {
            info!("Link down, closing connection to {}", self.remote);
        }
        self.release_handles(stack);
        self.state = TcpState::Disconnected;
        self.retry = None;
    }

    fn release_handles<S: TcpStack + ?Sized>(&mut self, stack: &mut S) {
        if let Some(handle) = self.handle.take() {
            stack.release(handle);
        }
        if let Some(handle) = self.retired.take() {
            stack.release(handle);
        }
    }

    fn is_current(&self, tag: CallbackTag) -> bool {
        self.handle.is_some() && tag == self.tag
    }

    /// Tear down after a callback; the handle goes to `service`
    fn drop_connection(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.retired = Some(handle);
        }
        self.state = TcpState::Disconnected;
    }

    /// The stack finished the connect issued under `tag`
    pub fn on_connected(&mut self, tag: CallbackTag) {
        if !self.is_current(tag) {
            trace!("Ignoring stale TCP connect (tag {})", tag.raw());
            return;
        }
        if self.state == TcpState::Connected {
            return;
        }
        info!("Connected to {}", self.remote);
        self.state = TcpState::Connected;
        self.stats.connects = self.stats.connects.wrapping_add(1);
    }

    /// Bytes arrived, or `None` when the server closed the connection
    pub fn on_data(&mut self, tag: CallbackTag, data: Option<&[u8]>) {
        if !self.is_current(tag) {
            trace!("Ignoring stale TCP data (tag {})", tag.raw());
            return;
        }
        let Some(bytes) = data else {
            info!("Server {} closed the connection", self.remote);
            self.stats.peer_closes = self.stats.peer_closes.wrapping_add(1);
            self.drop_connection();
            return;
        };

        let accepted = self.rx.append(bytes);
        self.stats.bytes_received = self.stats.bytes_received.wrapping_add(accepted as u32);
        let dropped = bytes.len() - accepted;
        if dropped > 0 {
            warn!("Receive buffer full, dropped {} bytes", dropped);
            self.stats.bytes_dropped = self.stats.bytes_dropped.wrapping_add(dropped as u32);
        } else {
            trace!("Received {} bytes", accepted);
        }
    }

    /// The server acknowledged `len` bytes
    pub fn on_sent(&mut self, tag: CallbackTag, len: u16) {
        if !self.is_current(tag) {
            return;
        }
        self.stats.bytes_acked = self.stats.bytes_acked.wrapping_add(u32::from(len));
    }

    /// The connection failed; the stack has already given up on it
    pub fn on_error(&mut self, tag: CallbackTag, error: StackError) {
        if !self.is_current(tag) {
            trace!("Ignoring stale TCP error (tag {})", tag.raw());
            return;
        }
        warn!("TCP connection to {} failed: {}", self.remote, error);
        self.stats.errors = self.stats.errors.wrapping_add(1);
        self.drop_connection();
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == TcpState::Connected
    }

    pub fn remote(&self) -> Endpoint {
        self.remote
    }

    /// Tag of the current connection
    pub fn tag(&self) -> CallbackTag {
        self.tag
    }

    /// Bytes received so far
    pub fn received(&self) -> &RxBuffer<RX> {
        &self.rx
    }

    /// Receive buffer, for draining
    pub fn received_mut(&mut self) -> &mut RxBuffer<RX> {
        &mut self.rx
    }

    pub fn stats(&self) -> TcpStats {
        self.stats
    }
}
