#![deny(unsafe_code)]
//! MQTT session manager
//!
//! Drives one broker session on top of the stack's MQTT client:
//!
//! 1. `start` creates a client and issues CONNECT ([`MqttState::Connecting`])
//! 2. the broker accepts ([`MqttState::Connected`]) and every configured topic
//!    is subscribed
//! 3. once all subscriptions are acknowledged the session is
//!    [`MqttState::Subscribed`]
//!
//! Active subscriptions are counted. A stop request unsubscribes everything
//! first and sends DISCONNECT exactly once, when the last unsubscribe is
//! acknowledged.
//!
//! Broker behaviour the session can not sensibly recover from (refused
//! connection, rejected subscription) halts the manager. The fault is
//! surfaced to the caller through [`MqttManager::take_fault`] and nothing is
//! retried until [`MqttManager::reset`] or [`MqttManager::start`] is called.

use connectivity_hal::{
    CallbackTag, ClientInfo, ClockReading, ConnectionStatus, DataFlags, Endpoint, MqttHandle,
    MqttStack, QoS, StackError,
};
use heapless::{Deque, String, Vec};

use super::config::MqttConfig;
use super::error::{ConfigError, Error, Violation};
use crate::buffer::RxBuffer;
use crate::time::{Deadline, IntervalTimer};

/// Maximum topic length in bytes
pub const MAX_TOPIC_LEN: usize = 100;
/// Maximum number of subscribed topic filters
pub const MAX_TOPICS: usize = 4;
/// Maximum client identifier length in bytes
pub const MAX_CLIENT_ID_LEN: usize = 64;
/// Inbound payload bytes kept per message; the rest is dropped
pub const MAX_PAYLOAD_LEN: usize = 256;

const PAYLOAD_BUFFER_LEN: usize = MAX_PAYLOAD_LEN + 1;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttState {
    #[default]
    Disconnected,
    /// CONNECT sent, waiting for the broker
    Connecting,
    /// Broker accepted; subscriptions outstanding
    Connected,
    /// Every configured topic is subscribed
    Subscribed,
}

/// Counters kept across sessions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MqttStats {
    /// Sessions started (client created and CONNECT sent)
    pub starts: u32,
    /// Sessions the broker accepted
    pub connects: u32,
    /// Accepted sessions that later dropped
    pub connection_losses: u32,
    /// Complete inbound messages
    pub messages: u32,
    /// Inbound messages whose topic or payload did not fit
    pub truncated: u32,
    pub publishes: u32,
    pub publish_failures: u32,
}

/// Most recent inbound publish
///
/// Filled in two steps: the topic and announced length first, then payload
/// fragments until the one flagged last.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    topic: String<MAX_TOPIC_LEN>,
    payload: RxBuffer<PAYLOAD_BUFFER_LEN>,
    total_len: u32,
    receiving: bool,
    truncated: bool,
}

impl InboundMessage {
    fn begin(&mut self, topic: &str, total_len: u32) {
        self.topic.clear();
        self.truncated = false;
        for ch in topic.chars() {
            if self.topic.push(ch).is_err() {
                self.truncated = true;
                break;
            }
        }
        self.payload.clear();
        self.total_len = total_len;
        self.receiving = true;
    }

    /// Returns true when the message is complete
    fn feed(&mut self, data: &[u8], flags: DataFlags) -> bool {
        if self.payload.append(data) < data.len() {
            self.truncated = true;
        }
        if flags.is_last() {
            self.receiving = false;
            return true;
        }
        false
    }

    /// Topic the message was published on
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Payload bytes received
    pub fn payload(&self) -> &[u8] {
        self.payload.as_bytes()
    }

    /// Payload as text, if it is valid UTF-8
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }

    /// Payload with a trailing NUL
    pub fn payload_with_nul(&self) -> &[u8] {
        self.payload.as_bytes_with_nul()
    }

    /// Payload length announced by the broker
    pub fn total_len(&self) -> u32 {
        self.total_len
    }

    /// Whether the topic or payload was cut short
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Stack calls requested by callback handlers, run by `service`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum FollowUp {
    Subscribe,
    Disconnect,
    Release(MqttHandle),
}

/// Everything that starts from zero with each new session
#[derive(Default)]
struct Session {
    handle: Option<MqttHandle>,
    state: MqttState,
    connect_done: bool,
    subscriptions: u8,
    /// Unsubscribe requests still waiting for their acknowledgement
    unsubscribes_pending: u8,
    stop_requested: bool,
    disconnect_issued: bool,
    inbound: InboundMessage,
    unread: bool,
    follow_ups: Deque<FollowUp, 4>,
}

/// MQTT session manager
pub struct MqttManager {
    broker: Endpoint,
    client_id: String<MAX_CLIENT_ID_LEN>,
    keep_alive_secs: u16,
    topics: Vec<String<MAX_TOPIC_LEN>, MAX_TOPICS>,
    qos: QoS,
    interval: IntervalTimer,
    retry_interval_ms: u32,
    retry: Option<Deadline>,
    tag: CallbackTag,
    session: Session,
    halted: bool,
    fault: Option<Error>,
    stats: MqttStats,
}

impl MqttManager {
    /// Validate the configuration; no client exists until the first start
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] for an empty or oversized client ID, more than
    /// [`MAX_TOPICS`] topics, or a topic that is empty, longer than
    /// [`MAX_TOPIC_LEN`] or contains NUL.
    pub fn new(config: &MqttConfig) -> Result<Self, Error> {
        if config.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId.into());
        }
        let client_id: String<MAX_CLIENT_ID_LEN> =
            String::try_from(config.client_id).map_err(|_| ConfigError::ClientIdTooLong)?;

        let mut topics: Vec<String<MAX_TOPIC_LEN>, MAX_TOPICS> = Vec::new();
        for &topic in config.topics {
            if topic.is_empty() {
                return Err(ConfigError::EmptyTopic.into());
            }
            if topic.contains('\0') {
                return Err(ConfigError::InvalidTopic.into());
            }
            let topic: String<MAX_TOPIC_LEN> =
                String::try_from(topic).map_err(|_| ConfigError::TopicTooLong)?;
            topics.push(topic).map_err(|_| ConfigError::TooManyTopics)?;
        }

        Ok(Self {
            broker: config.broker,
            client_id,
            keep_alive_secs: config.keep_alive_secs,
            topics,
            qos: config.qos,
            interval: IntervalTimer::new(config.poll_interval_ms),
            retry_interval_ms: config.retry_interval_ms,
            retry: None,
            tag: CallbackTag::default(),
            session: Session::default(),
            halted: false,
            fault: None,
            stats: MqttStats::default(),
        })
    }

    /// Start a fresh session
    ///
    /// Releases any previous client, resets all session state (including a
    /// pending stop and a halt) and sends CONNECT on a new client.
    ///
    /// # Errors
    ///
    /// - [`Error::HandleAllocation`] if the stack can not create a client.
    ///   The manager halts until reset.
    /// - [`Error::Connection`] if the CONNECT request was refused locally.
    ///   The client is released and the next due tick tries again.
    pub fn start<S: MqttStack + ?Sized>(&mut self, stack: &mut S) -> Result<(), Error> {
        self.release_all(stack);
        self.session = Session::default();
        self.halted = false;
        self.fault = None;

        let handle = match stack.new_client() {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to create MQTT client: {}", e);
                self.halted = true;
                return Err(Error::HandleAllocation(e));
            }
        };

        self.tag = self.tag.next();
        stack.set_publish_callbacks(handle, self.tag);
        self.stats.starts = self.stats.starts.wrapping_add(1);

        let info = ClientInfo {
            client_id: &self.client_id,
            keep_alive_secs: self.keep_alive_secs,
        };
        info!(
            "Connecting to MQTT broker {} as '{}'",
            self.broker,
            self.client_id.as_str()
        );
        if let Err(e) = stack.connect(handle, &self.broker, &info, self.tag) {
            warn!("MQTT connect request failed: {}", e);
            stack.release_client(handle);
            return Err(Error::Connection(e));
        }

        self.session.handle = Some(handle);
        self.session.state = MqttState::Connecting;
        Ok(())
    }

    /// Reconnect when due
    ///
    /// A disconnected session is restarted once the retry interval since the
    /// previous attempt has passed, unless a stop was requested or the
    /// manager is halted.
    ///
    /// # Errors
    ///
    /// [`Error::HandleAllocation`] from a restart; connect request failures
    /// are retried silently.
    pub fn tick<S: MqttStack + ?Sized>(
        &mut self,
        stack: &mut S,
        now: ClockReading,
    ) -> Result<(), Error> {
        if !self.interval.is_due(now) {
            return Ok(());
        }
        if self.halted
            || self.session.stop_requested
            || self.session.state != MqttState::Disconnected
        {
            return Ok(());
        }
        if self.retry.is_some_and(|d| !d.has_expired(now)) {
            return Ok(());
        }

        self.retry = Some(Deadline::arm(now, self.retry_interval_ms));
        match self.start(stack) {
            Err(Error::Connection(e)) => {
                debug!("MQTT start failed, retrying in {} ms: {}", self.retry_interval_ms, e);
                Ok(())
            }
            other => other,
        }
    }

    /// Run the stack calls that callback handlers deferred
    pub fn service<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        while let Some(step) = self.session.follow_ups.pop_front() {
            match step {
                FollowUp::Release(handle) => stack.release_client(handle),
                FollowUp::Subscribe => self.subscribe_all(stack),
                FollowUp::Disconnect => self.close(stack),
            }
        }
    }

    fn subscribe_all<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        let Some(handle) = self.session.handle else {
            return;
        };
        if self.session.state != MqttState::Connected {
            return;
        }
        if self.topics.is_empty() {
            info!("MQTT session ready (no subscriptions)");
            self.session.state = MqttState::Subscribed;
            return;
        }

        let mut failed = None;
        for topic in &self.topics {
            info!("Subscribing to '{}'", topic.as_str());
            if let Err(e) = stack.subscribe(handle, topic, self.qos, self.tag) {
                warn!("Subscribe request for '{}' failed: {}", topic.as_str(), e);
                failed = Some(e);
                break;
            }
        }
        if failed.is_some() {
            self.close(stack);
        }
    }

    /// Disconnect and free the client now
    fn close<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        if let Some(handle) = self.session.handle.take() {
            info!("Disconnecting from MQTT broker {}", self.broker);
            stack.disconnect(handle);
            stack.release_client(handle);
        }
        self.session.state = MqttState::Disconnected;
        self.session.subscriptions = 0;
    }

    fn release_all<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        while let Some(step) = self.session.follow_ups.pop_front() {
            if let FollowUp::Release(handle) = step {
                stack.release_client(handle);
            }
        }
        if let Some(handle) = self.session.handle.take() {
            stack.release_client(handle);
        }
    }

    fn defer(&mut self, step: FollowUp) {
        if self.session.follow_ups.push_back(step).is_err() {
            error!("MQTT follow-up queue full, dropping {:?}", step);
        }
    }

    /// Drop the session after the connection went away; the stack call
    /// happens in `service`
    fn retire(&mut self) {
        if let Some(handle) = self.session.handle.take() {
            self.defer(FollowUp::Release(handle));
        }
        self.session.state = MqttState::Disconnected;
        self.session.subscriptions = 0;
    }

    fn halt(&mut self, violation: Violation) {
        error!("MQTT session halted: {}", violation);
        self.retire();
        self.halted = true;
        self.fault = Some(Error::ProtocolViolation(violation));
    }

    fn is_current(&self, tag: CallbackTag) -> bool {
        self.session.handle.is_some() && tag == self.tag
    }

    /// Ask for an orderly shutdown
    ///
    /// With no active subscriptions the client disconnects right away.
    /// Otherwise every topic is unsubscribed and DISCONNECT follows the last
    /// acknowledgement. Either way the manager does not reconnect until the
    /// next [`start`](Self::start) or [`reset`](Self::reset).
    pub fn request_stop<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        if self.session.stop_requested {
            return;
        }
        self.session.stop_requested = true;

        let Some(handle) = self.session.handle else {
            info!("MQTT stop requested while disconnected");
            return;
        };
        if self.session.subscriptions == 0 {
            self.session.disconnect_issued = true;
            self.close(stack);
            return;
        }

        info!(
            "Unsubscribing {} topics before disconnecting",
            self.session.subscriptions
        );
        let mut failed = None;
        for topic in &self.topics {
            if let Err(e) = stack.unsubscribe(handle, topic, self.tag) {
                warn!("Unsubscribe request for '{}' failed: {}", topic.as_str(), e);
                failed = Some(e);
                break;
            }
            self.session.unsubscribes_pending =
                self.session.unsubscribes_pending.saturating_add(1);
        }
        if failed.is_some() {
            self.session.disconnect_issued = true;
            self.close(stack);
        }
    }

    /// Publish `payload` on `topic`
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] if `topic` is not a valid topic name
    /// - [`Error::Connection`] with [`StackError::NotConnected`] unless the
    ///   broker has accepted the session and no stop is pending, or whatever
    ///   the stack reports
    pub fn publish<S: MqttStack + ?Sized>(
        &mut self,
        stack: &mut S,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        validate_topic_name(topic)?;
        let handle = match self.session.handle {
            Some(handle)
                if matches!(
                    self.session.state,
                    MqttState::Connected | MqttState::Subscribed
                ) && !self.session.stop_requested =>
            {
                handle
            }
            _ => return Err(Error::Connection(StackError::NotConnected)),
        };

        if let Err(e) = stack.publish(handle, topic, payload, qos, retain, self.tag) {
            warn!("Publish to '{}' failed: {}", topic, e);
            self.stats.publish_failures = self.stats.publish_failures.wrapping_add(1);
            return Err(Error::Connection(e));
        }
        self.stats.publishes = self.stats.publishes.wrapping_add(1);
        Ok(())
    }

    /// Build a per-device topic name: `device/{client_id}/{subtopic}`
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if `subtopic` is empty or contains wildcards
    /// or NUL, or if the result exceeds [`MAX_TOPIC_LEN`].
    ///
    /// # Example
    ///
    /// ```
    /// use connectivity_core::network::mqtt::MqttManager;
    /// use connectivity_core::MqttConfig;
    ///
    /// let config = MqttConfig { client_id: "node-7", ..Default::default() };
    /// let mqtt = MqttManager::new(&config).unwrap();
    /// assert_eq!(mqtt.device_topic("telemetry").unwrap(), "device/node-7/telemetry");
    /// ```
    pub fn device_topic(&self, subtopic: &str) -> Result<String<MAX_TOPIC_LEN>, Error> {
        validate_topic_name(&self.client_id)?;
        validate_topic_name(subtopic)?;

        let mut topic = String::<MAX_TOPIC_LEN>::new();
        topic
            .push_str("device/")
            .map_err(|_| ConfigError::TopicTooLong)?;
        topic
            .push_str(&self.client_id)
            .map_err(|_| ConfigError::TopicTooLong)?;
        topic.push('/').map_err(|_| ConfigError::TopicTooLong)?;
        topic
            .push_str(subtopic)
            .map_err(|_| ConfigError::TopicTooLong)?;
        Ok(topic)
    }

    /// Drop the session because the link went away
    ///
    /// The client is released immediately. A pending stop and a complete
    /// message not yet taken survive; otherwise the next due tick after the
    /// link returns reconnects.
    pub fn link_lost<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        if self.session.state != MqttState::Disconnected {
            info!("Link down, dropping MQTT session");
        }
        let stop_requested = self.session.stop_requested;
        let unread = self.session.unread;
        self.release_all(stack);
        let mut inbound = core::mem::take(&mut self.session.inbound);
        // A half-received message can not be completed by the next session.
        inbound.receiving = false;
        self.session = Session {
            stop_requested,
            inbound,
            unread,
            ..Session::default()
        };
        self.retry = None;
    }

    /// Clear a halt or stop and let the next due tick start a new session
    pub fn reset<S: MqttStack + ?Sized>(&mut self, stack: &mut S) {
        info!("Resetting MQTT session");
        self.release_all(stack);
        self.session = Session::default();
        self.halted = false;
        self.fault = None;
        self.retry = None;
        self.interval.reset();
    }

    /// Connection status callback
    pub fn on_connection(&mut self, tag: CallbackTag, status: ConnectionStatus) {
        if !self.is_current(tag) {
            trace!("Ignoring stale MQTT connection status (tag {})", tag.raw());
            return;
        }
        match status {
            ConnectionStatus::Accepted => {
                if self.session.connect_done {
                    return;
                }
                info!("MQTT broker {} accepted the connection", self.broker);
                self.session.connect_done = true;
                self.session.state = MqttState::Connected;
                self.stats.connects = self.stats.connects.wrapping_add(1);
                self.defer(FollowUp::Subscribe);
            }
            ConnectionStatus::Disconnected if self.session.connect_done => {
                warn!("MQTT connection to {} lost", self.broker);
                self.stats.connection_losses = self.stats.connection_losses.wrapping_add(1);
                self.retire();
            }
            ConnectionStatus::Disconnected => self.halt(Violation::BrokerUnreachable),
            other => self.halt(Violation::UnexpectedStatus(other)),
        }
    }

    /// Subscribe acknowledgement callback
    pub fn on_subscribe_ack(&mut self, tag: CallbackTag, result: Result<(), StackError>) {
        if !self.is_current(tag) {
            return;
        }
        if self.session.stop_requested {
            // The unsubscribe for this topic is already on its way.
            match result {
                Ok(()) => {
                    self.session.subscriptions = self.session.subscriptions.saturating_add(1);
                }
                Err(e) => debug!("Subscribe rejected while stopping: {}", e),
            }
            return;
        }
        if let Err(e) = result {
            self.halt(Violation::SubscribeRejected(e));
            return;
        }

        self.session.subscriptions = self.session.subscriptions.saturating_add(1);
        debug!(
            "Subscription acknowledged ({}/{})",
            self.session.subscriptions,
            self.topics.len()
        );
        if self.session.state == MqttState::Connected
            && usize::from(self.session.subscriptions) >= self.topics.len()
        {
            info!("MQTT session ready");
            self.session.state = MqttState::Subscribed;
        }
    }

    /// Unsubscribe acknowledgement callback
    pub fn on_unsubscribe_ack(&mut self, tag: CallbackTag, result: Result<(), StackError>) {
        if !self.is_current(tag) {
            return;
        }
        if let Err(e) = result {
            self.halt(Violation::UnsubscribeRejected(e));
            return;
        }

        match self.session.subscriptions.checked_sub(1) {
            Some(remaining) => self.session.subscriptions = remaining,
            None => warn!("Unsubscribe acknowledged with no active subscriptions"),
        }
        self.session.unsubscribes_pending = self.session.unsubscribes_pending.saturating_sub(1);
        if self.session.unsubscribes_pending == 0
            && self.session.stop_requested
            && !self.session.disconnect_issued
        {
            self.session.disconnect_issued = true;
            self.defer(FollowUp::Disconnect);
        }
    }

    /// Publish acknowledgement callback
    pub fn on_publish_ack(&mut self, tag: CallbackTag, result: Result<(), StackError>) {
        if !self.is_current(tag) {
            return;
        }
        match result {
            Ok(()) => trace!("Publish acknowledged"),
            Err(e) => {
                warn!("Publish not acknowledged: {}", e);
                self.stats.publish_failures = self.stats.publish_failures.wrapping_add(1);
            }
        }
    }

    /// First phase of an inbound publish
    pub fn on_incoming_publish(&mut self, tag: CallbackTag, topic: &str, total_len: u32) {
        if !self.is_current(tag) {
            return;
        }
        debug!("Incoming publish on '{}' ({} bytes)", topic, total_len);
        self.session.inbound.begin(topic, total_len);
        self.session.unread = false;
    }

    /// Second phase of an inbound publish: one payload fragment
    pub fn on_incoming_data(&mut self, tag: CallbackTag, data: &[u8], flags: DataFlags) {
        if !self.is_current(tag) {
            return;
        }
        if !self.session.inbound.receiving {
            warn!("Dropping {} payload bytes with no topic", data.len());
            return;
        }
        if self.session.inbound.feed(data, flags) {
            let message = &self.session.inbound;
            info!(
                "Topic: {}, Message: {} bytes",
                message.topic(),
                message.payload().len()
            );
            self.stats.messages = self.stats.messages.wrapping_add(1);
            if message.is_truncated() {
                self.stats.truncated = self.stats.truncated.wrapping_add(1);
            }
            self.session.unread = true;
        }
    }

    /// The latest complete inbound message, once
    pub fn take_message(&mut self) -> Option<&InboundMessage> {
        if !self.session.unread {
            return None;
        }
        self.session.unread = false;
        Some(&self.session.inbound)
    }

    /// Fault that halted the session, once
    pub fn take_fault(&mut self) -> Option<Error> {
        self.fault.take()
    }

    pub fn state(&self) -> MqttState {
        self.session.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Subscriptions the broker has acknowledged and not yet released
    pub fn subscriptions(&self) -> u8 {
        self.session.subscriptions
    }

    pub fn stop_requested(&self) -> bool {
        self.session.stop_requested
    }

    /// Tag of the current session
    pub fn tag(&self) -> CallbackTag {
        self.tag
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(|t| t.as_str())
    }

    pub fn stats(&self) -> MqttStats {
        self.stats
    }
}

/// Check a topic name for publishing: non-empty, bounded, no wildcards or NUL
fn validate_topic_name(topic: &str) -> Result<(), ConfigError> {
    if topic.is_empty() {
        return Err(ConfigError::EmptyTopic);
    }
    if topic.len() > MAX_TOPIC_LEN {
        return Err(ConfigError::TopicTooLong);
    }
    if topic.contains(['+', '#', '\0']) {
        return Err(ConfigError::InvalidTopic);
    }
    Ok(())
}
