#![deny(unsafe_code)]
//! Routes stack callbacks to the session managers
//!
//! A [`Dispatch`] is built fresh for every poll and borrows only the
//! managers. Handlers therefore can not reach the stack; anything that needs
//! a stack call is recorded and carried out by the managers' `service` step.

use connectivity_hal::{CallbackTag, ConnectionStatus, DataFlags, NetEvents, StackError};

use super::mqtt::MqttManager;
use super::tcp::TcpManager;

/// Callback sink handed to [`EventSource::poll_events`](connectivity_hal::EventSource::poll_events)
pub struct Dispatch<'a, const RX: usize> {
    tcp: Option<&'a mut TcpManager<RX>>,
    mqtt: Option<&'a mut MqttManager>,
}

impl<'a, const RX: usize> Dispatch<'a, RX> {
    pub fn new(tcp: Option<&'a mut TcpManager<RX>>, mqtt: Option<&'a mut MqttManager>) -> Self {
        Self { tcp, mqtt }
    }
}

impl<const RX: usize> NetEvents for Dispatch<'_, RX> {
    fn tcp_connected(&mut self, tag: CallbackTag) {
        match self.tcp.as_deref_mut() {
            Some(tcp) => tcp.on_connected(tag),
            None => trace!("TCP event with no TCP session"),
        }
    }

    fn tcp_received(&mut self, tag: CallbackTag, data: Option<&[u8]>) {
        match self.tcp.as_deref_mut() {
            Some(tcp) => tcp.on_data(tag, data),
            None => trace!("TCP event with no TCP session"),
        }
    }

    fn tcp_sent(&mut self, tag: CallbackTag, len: u16) {
        if let Some(tcp) = self.tcp.as_deref_mut() {
            tcp.on_sent(tag, len);
        }
    }

    fn tcp_error(&mut self, tag: CallbackTag, error: StackError) {
        match self.tcp.as_deref_mut() {
            Some(tcp) => tcp.on_error(tag, error),
            None => trace!("TCP event with no TCP session"),
        }
    }

    fn mqtt_connection(&mut self, tag: CallbackTag, status: ConnectionStatus) {
        match self.mqtt.as_deref_mut() {
            Some(mqtt) => mqtt.on_connection(tag, status),
            None => trace!("MQTT event with no MQTT session"),
        }
    }

    fn mqtt_subscribed(&mut self, tag: CallbackTag, result: Result<(), StackError>) {
        if let Some(mqtt) = self.mqtt.as_deref_mut() {
            mqtt.on_subscribe_ack(tag, result);
        }
    }

    fn mqtt_unsubscribed(&mut self, tag: CallbackTag, result: Result<(), StackError>) {
        if let Some(mqtt) = self.mqtt.as_deref_mut() {
            mqtt.on_unsubscribe_ack(tag, result);
        }
    }

    fn mqtt_published(&mut self, tag: CallbackTag, result: Result<(), StackError>) {
        if let Some(mqtt) = self.mqtt.as_deref_mut() {
            mqtt.on_publish_ack(tag, result);
        }
    }

    fn mqtt_incoming_publish(&mut self, tag: CallbackTag, topic: &str, total_len: u32) {
        if let Some(mqtt) = self.mqtt.as_deref_mut() {
            mqtt.on_incoming_publish(tag, topic, total_len);
        }
    }

    fn mqtt_incoming_data(&mut self, tag: CallbackTag, data: &[u8], flags: DataFlags) {
        if let Some(mqtt) = self.mqtt.as_deref_mut() {
            mqtt.on_incoming_data(tag, data, flags);
        }
    }
}
