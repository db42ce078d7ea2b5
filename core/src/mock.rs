//! Scripted stand-in for the radio driver and network stack (tests only)

use std::collections::VecDeque;

use connectivity_hal::{
    CallbackTag, ClientInfo, ConnectionStatus, DataFlags, Endpoint, EventSource, LinkDriver,
    LinkStatus, MqttHandle, MqttStack, NetEvents, QoS, StackError, TcpHandle, TcpStack,
};

/// One callback the mock stack will deliver on the next poll
#[derive(Debug, Clone)]
pub enum Event {
    TcpConnected(CallbackTag),
    TcpReceived(CallbackTag, Option<Vec<u8>>),
    TcpSent(CallbackTag, u16),
    TcpError(CallbackTag, StackError),
    MqttConnection(CallbackTag, ConnectionStatus),
    MqttSubscribed(CallbackTag, Result<(), StackError>),
    MqttUnsubscribed(CallbackTag, Result<(), StackError>),
    MqttPublished(CallbackTag, Result<(), StackError>),
    MqttIncomingPublish(CallbackTag, String, u32),
    MqttIncomingData(CallbackTag, Vec<u8>, DataFlags),
}

pub struct MockPlatform {
    pub status: LinkStatus,
    pub polls: usize,
    pub associations: Vec<(String, String)>,

    next_handle: u16,
    pub live_tcp: Vec<TcpHandle>,
    pub released_tcp: Vec<TcpHandle>,
    pub tcp_tags: Vec<(TcpHandle, CallbackTag)>,
    pub tcp_connects: Vec<(TcpHandle, Endpoint)>,
    pub sent: Vec<u8>,
    pub fail_allocate: Option<StackError>,
    pub fail_connect: Option<StackError>,

    pub live_clients: Vec<MqttHandle>,
    pub mqtt_connects: Vec<(MqttHandle, String, u16, CallbackTag)>,
    pub publish_callbacks: Vec<(MqttHandle, CallbackTag)>,
    pub subscribes: Vec<(String, QoS)>,
    pub unsubscribes: Vec<String>,
    pub publishes: Vec<(String, Vec<u8>, QoS, bool)>,
    pub disconnects: Vec<MqttHandle>,
    pub fail_new_client: Option<StackError>,
    pub fail_mqtt_connect: Option<StackError>,
    pub fail_subscribe: Option<StackError>,
    pub fail_unsubscribe: Option<StackError>,

    pub pending: VecDeque<Event>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            status: LinkStatus::Down,
            polls: 0,
            associations: Vec::new(),
            next_handle: 1,
            live_tcp: Vec::new(),
            released_tcp: Vec::new(),
            tcp_tags: Vec::new(),
            tcp_connects: Vec::new(),
            sent: Vec::new(),
            fail_allocate: None,
            fail_connect: None,
            live_clients: Vec::new(),
            mqtt_connects: Vec::new(),
            publish_callbacks: Vec::new(),
            subscribes: Vec::new(),
            unsubscribes: Vec::new(),
            publishes: Vec::new(),
            disconnects: Vec::new(),
            fail_new_client: None,
            fail_mqtt_connect: None,
            fail_subscribe: None,
            fail_unsubscribe: None,
            pending: VecDeque::new(),
        }
    }

    /// Queue a callback for the next `poll_events`
    pub fn push(&mut self, event: Event) {
        self.pending.push_back(event);
    }

    /// Tag registered for the most recently allocated TCP handle
    pub fn last_tcp_tag(&self) -> CallbackTag {
        self.tcp_tags.last().map(|&(_, tag)| tag).unwrap_or_default()
    }

    /// Tag of the most recent MQTT connect
    pub fn last_mqtt_tag(&self) -> CallbackTag {
        self.mqtt_connects
            .last()
            .map(|(_, _, _, tag)| *tag)
            .unwrap_or_default()
    }

    fn fresh_handle(&mut self) -> u16 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }
}

impl LinkDriver for MockPlatform {
    fn poll_once(&mut self) {
        self.polls += 1;
    }

    fn begin_association(&mut self, ssid: &str, passphrase: &str) {
        self.associations
            .push((ssid.to_string(), passphrase.to_string()));
    }

    fn link_status(&self) -> LinkStatus {
        self.status
    }
}

impl TcpStack for MockPlatform {
    fn allocate(&mut self, _remote: &Endpoint) -> Result<TcpHandle, StackError> {
        if let Some(e) = self.fail_allocate {
            return Err(e);
        }
        let handle = TcpHandle::new(self.fresh_handle());
        self.live_tcp.push(handle);
        Ok(handle)
    }

    fn register_callbacks(&mut self, handle: TcpHandle, tag: CallbackTag) {
        self.tcp_tags.push((handle, tag));
    }

    fn connect(&mut self, handle: TcpHandle, remote: &Endpoint) -> Result<(), StackError> {
        if let Some(e) = self.fail_connect {
            return Err(e);
        }
        self.tcp_connects.push((handle, *remote));
        Ok(())
    }

    fn send(&mut self, _handle: TcpHandle, data: &[u8]) -> Result<usize, StackError> {
        self.sent.extend_from_slice(data);
        Ok(data.len())
    }

    fn release(&mut self, handle: TcpHandle) {
        self.live_tcp.retain(|&h| h != handle);
        self.released_tcp.push(handle);
    }
}

impl MqttStack for MockPlatform {
    fn new_client(&mut self) -> Result<MqttHandle, StackError> {
        if let Some(e) = self.fail_new_client {
            return Err(e);
        }
        let handle = MqttHandle::new(self.fresh_handle());
        self.live_clients.push(handle);
        Ok(handle)
    }

    fn connect(
        &mut self,
        handle: MqttHandle,
        _broker: &Endpoint,
        info: &ClientInfo<'_>,
        tag: CallbackTag,
    ) -> Result<(), StackError> {
        if let Some(e) = self.fail_mqtt_connect {
            return Err(e);
        }
        self.mqtt_connects.push((
            handle,
            info.client_id.to_string(),
            info.keep_alive_secs,
            tag,
        ));
        Ok(())
    }

    fn set_publish_callbacks(&mut self, handle: MqttHandle, tag: CallbackTag) {
        self.publish_callbacks.push((handle, tag));
    }

    fn subscribe(
        &mut self,
        _handle: MqttHandle,
        topic: &str,
        qos: QoS,
        _tag: CallbackTag,
    ) -> Result<(), StackError> {
        if let Some(e) = self.fail_subscribe {
            return Err(e);
        }
        self.subscribes.push((topic.to_string(), qos));
        Ok(())
    }

    fn unsubscribe(
        &mut self,
        _handle: MqttHandle,
        topic: &str,
        _tag: CallbackTag,
    ) -> Result<(), StackError> {
        if let Some(e) = self.fail_unsubscribe {
            return Err(e);
        }
        self.unsubscribes.push(topic.to_string());
        Ok(())
    }

    fn publish(
        &mut self,
        _handle: MqttHandle,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
        _tag: CallbackTag,
    ) -> Result<(), StackError> {
        self.publishes
            .push((topic.to_string(), payload.to_vec(), qos, retain));
        Ok(())
    }

    fn disconnect(&mut self, handle: MqttHandle) {
        self.disconnects.push(handle);
    }

    fn release_client(&mut self, handle: MqttHandle) {
        self.live_clients.retain(|&h| h != handle);
    }
}

impl EventSource for MockPlatform {
    fn poll_events(&mut self, sink: &mut dyn NetEvents) {
        while let Some(event) = self.pending.pop_front() {
            match event {
                Event::TcpConnected(tag) => sink.tcp_connected(tag),
                Event::TcpReceived(tag, data) => sink.tcp_received(tag, data.as_deref()),
                Event::TcpSent(tag, len) => sink.tcp_sent(tag, len),
                Event::TcpError(tag, e) => sink.tcp_error(tag, e),
                Event::MqttConnection(tag, status) => sink.mqtt_connection(tag, status),
                Event::MqttSubscribed(tag, r) => sink.mqtt_subscribed(tag, r),
                Event::MqttUnsubscribed(tag, r) => sink.mqtt_unsubscribed(tag, r),
                Event::MqttPublished(tag, r) => sink.mqtt_published(tag, r),
                Event::MqttIncomingPublish(tag, topic, len) => {
                    sink.mqtt_incoming_publish(tag, &topic, len)
                }
                Event::MqttIncomingData(tag, data, flags) => {
                    sink.mqtt_incoming_data(tag, &data, flags)
                }
            }
        }
    }
}
