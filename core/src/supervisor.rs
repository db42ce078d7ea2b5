#![deny(unsafe_code)]
//! Connectivity supervisor
//!
//! Owns the platform and the three session managers and advances them from a
//! single [`Supervisor::tick`]. The order within a tick is fixed:
//!
//! 1. poll the stack once, delivering callbacks to the managers
//! 2. run the follow-up stack calls those callbacks requested
//! 3. advance the wireless manager
//! 4. advance TCP and MQTT if the link is up, otherwise tear them down
//!
//! Losing the wireless link releases every TCP and MQTT handle. Both sessions
//! reconnect on their own once the link is back.

use connectivity_hal::{
    Clock, ClockReading, EventSource, LinkDriver, LinkStatus, MqttStack, QoS, StackError, TcpStack,
};

use crate::network::config::SupervisorConfig;
use crate::network::dispatch::Dispatch;
use crate::network::error::Error;
use crate::network::mqtt::MqttManager;
use crate::network::tcp::{TcpManager, DEFAULT_RX_CAPACITY};
use crate::network::wifi::WirelessManager;

/// Everything the supervisor needs from the board
///
/// Implemented automatically for any type providing the radio driver, the
/// event source and both stacks.
pub trait Platform: LinkDriver + EventSource + TcpStack + MqttStack {}

impl<T: LinkDriver + EventSource + TcpStack + MqttStack> Platform for T {}

/// Connectivity supervisor
pub struct Supervisor<P, const RX: usize = DEFAULT_RX_CAPACITY> {
    platform: P,
    wifi: WirelessManager,
    tcp: Option<TcpManager<RX>>,
    mqtt: Option<MqttManager>,
    link_up: bool,
}

impl<P: Platform, const RX: usize> Supervisor<P, RX> {
    /// Validate the configuration and build the managers
    ///
    /// Nothing is sent until the first tick.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] from any of the managers.
    pub fn new(platform: P, config: &SupervisorConfig) -> Result<Self, Error> {
        let wifi = WirelessManager::initialize(&config.wifi)?;
        let tcp = config.tcp.as_ref().map(TcpManager::new);
        let mqtt = config.mqtt.as_ref().map(MqttManager::new).transpose()?;

        info!(
            "Supervisor ready (tcp: {}, mqtt: {})",
            tcp.is_some(),
            mqtt.is_some()
        );
        Ok(Self {
            platform,
            wifi,
            tcp,
            mqtt,
            link_up: false,
        })
    }

    /// Advance everything by one step
    ///
    /// # Errors
    ///
    /// Returns the fault that halted the MQTT session, once. The supervisor
    /// keeps running the other layers; call [`restart_mqtt`](Self::restart_mqtt)
    /// to try MQTT again.
    pub fn tick(&mut self, now: ClockReading) -> Result<(), Error> {
        {
            let mut sink = Dispatch::new(self.tcp.as_mut(), self.mqtt.as_mut());
            self.platform.poll_events(&mut sink);
        }
        if let Some(tcp) = self.tcp.as_mut() {
            tcp.service(&mut self.platform);
        }
        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.service(&mut self.platform);
        }

        self.wifi.tick(&mut self.platform, now);
        let link_up = self.wifi.is_up() && self.platform.link_status() == LinkStatus::Up;
        if link_up != self.link_up {
            info!("Network {}", if link_up { "available" } else { "unavailable" });
            self.link_up = link_up;
        }

        if let Some(tcp) = self.tcp.as_mut() {
            if link_up {
                tcp.tick(&mut self.platform, now);
            } else {
                tcp.link_lost(&mut self.platform);
            }
        }

        let Some(mqtt) = self.mqtt.as_mut() else {
            return Ok(());
        };
        let result = if link_up {
            mqtt.tick(&mut self.platform, now)
        } else {
            mqtt.link_lost(&mut self.platform);
            Ok(())
        };
        match mqtt.take_fault() {
            Some(fault) => Err(fault),
            None => result,
        }
    }

    /// [`tick`](Self::tick) with the current reading of `clock`
    pub fn run_once<C: Clock + ?Sized>(&mut self, clock: &C) -> Result<(), Error> {
        self.tick(clock.now())
    }

    /// Send `data` on the TCP session
    ///
    /// # Errors
    ///
    /// [`Error::Connection`] if there is no connected TCP session.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, Error> {
        match self.tcp.as_mut() {
            Some(tcp) => tcp.send(&mut self.platform, data),
            None => Err(Error::Connection(StackError::NotConnected)),
        }
    }

    /// Publish on the MQTT session
    ///
    /// # Errors
    ///
    /// See [`MqttManager::publish`]; [`Error::Connection`] without an MQTT
    /// session.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), Error> {
        match self.mqtt.as_mut() {
            Some(mqtt) => mqtt.publish(&mut self.platform, topic, payload, qos, retain),
            None => Err(Error::Connection(StackError::NotConnected)),
        }
    }

    /// Begin an orderly MQTT shutdown (unsubscribe, then disconnect)
    pub fn request_mqtt_stop(&mut self) {
        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.request_stop(&mut self.platform);
        }
    }

    /// Clear an MQTT halt or stop; the session restarts on a following tick
    pub fn restart_mqtt(&mut self) {
        if let Some(mqtt) = self.mqtt.as_mut() {
            mqtt.reset(&mut self.platform);
        }
    }

    /// Whether the wireless link is usable
    pub fn is_link_up(&self) -> bool {
        self.link_up
    }

    pub fn wifi(&self) -> &WirelessManager {
        &self.wifi
    }

    pub fn tcp(&self) -> Option<&TcpManager<RX>> {
        self.tcp.as_ref()
    }

    pub fn tcp_mut(&mut self) -> Option<&mut TcpManager<RX>> {
        self.tcp.as_mut()
    }

    pub fn mqtt(&self) -> Option<&MqttManager> {
        self.mqtt.as_ref()
    }

    pub fn mqtt_mut(&mut self) -> Option<&mut MqttManager> {
        self.mqtt.as_mut()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Event, MockPlatform};
    use crate::network::config::{MqttConfig, TcpConfig, WifiConfig};
    use crate::network::mqtt::MqttState;
    use crate::network::tcp::TcpState;
    use crate::network::wifi::LinkState;
    use connectivity_hal::{ConnectionStatus, DataFlags, Endpoint};

    fn at(ms: u32) -> ClockReading {
        ClockReading::from_millis(ms)
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            wifi: WifiConfig {
                ssid: "workshop",
                passphrase: "hunter22",
                poll_interval_ms: 100,
                association_timeout_ms: 20_000,
            },
            tcp: Some(TcpConfig {
                remote: Endpoint::ipv4(10, 0, 0, 2, 4242),
                poll_interval_ms: 100,
                retry_interval_ms: 2_000,
            }),
            mqtt: Some(MqttConfig {
                broker: Endpoint::ipv4(10, 0, 0, 3, 1883),
                client_id: "pico",
                topics: &["/led"],
                ..MqttConfig::default()
            }),
        }
    }

    /// Associate and bring both sessions to their ready state
    fn online() -> Supervisor<MockPlatform, 128> {
        let mut sup = Supervisor::new(MockPlatform::new(), &config()).unwrap();

        sup.tick(at(0)).unwrap();
        assert_eq!(sup.wifi().state(), LinkState::Joining);

        sup.platform_mut().status = LinkStatus::Up;
        sup.tick(at(100)).unwrap();
        assert!(sup.is_link_up());
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Connecting);
        assert_eq!(sup.mqtt().unwrap().state(), MqttState::Connecting);

        let tcp_tag = sup.platform().last_tcp_tag();
        let mqtt_tag = sup.platform().last_mqtt_tag();
        sup.platform_mut().push(Event::TcpConnected(tcp_tag));
        sup.platform_mut()
            .push(Event::MqttConnection(mqtt_tag, ConnectionStatus::Accepted));
        sup.tick(at(200)).unwrap();
        assert_eq!(sup.platform().subscribes.len(), 1);

        sup.platform_mut().push(Event::MqttSubscribed(mqtt_tag, Ok(())));
        sup.tick(at(300)).unwrap();
        assert!(sup.tcp().unwrap().is_connected());
        assert_eq!(sup.mqtt().unwrap().state(), MqttState::Subscribed);
        sup
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config();
        cfg.wifi.ssid = "";
        assert!(matches!(
            Supervisor::<_, 128>::new(MockPlatform::new(), &cfg),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_nothing_opens_without_link() {
        let mut sup: Supervisor<_, 128> = Supervisor::new(MockPlatform::new(), &config()).unwrap();
        for t in (0..3_000).step_by(100) {
            sup.tick(at(t)).unwrap();
        }
        assert!(!sup.is_link_up());
        assert_eq!(sup.platform().associations.len(), 1);
        assert!(sup.platform().live_tcp.is_empty());
        assert!(sup.platform().live_clients.is_empty());
    }

    #[test]
    fn test_end_to_end_traffic() {
        let mut sup = online();
        let tcp_tag = sup.platform().last_tcp_tag();
        let mqtt_tag = sup.platform().last_mqtt_tag();

        assert_eq!(sup.send(b"hello"), Ok(5));
        assert_eq!(sup.platform().sent, b"hello");

        sup.publish("/status", b"online", QoS::AtLeastOnce, false)
            .unwrap();
        assert_eq!(sup.platform().publishes.len(), 1);

        sup.platform_mut()
            .push(Event::TcpReceived(tcp_tag, Some(b"echo".to_vec())));
        sup.platform_mut().push(Event::MqttIncomingPublish(
            mqtt_tag,
            "/led".to_string(),
            2,
        ));
        sup.platform_mut()
            .push(Event::MqttIncomingData(mqtt_tag, b"on".to_vec(), DataFlags::LAST));
        sup.tick(at(400)).unwrap();

        assert_eq!(sup.tcp().unwrap().received().as_bytes(), b"echo");
        let message = sup.mqtt_mut().unwrap().take_message().unwrap();
        assert_eq!(message.topic(), "/led");
        assert_eq!(message.payload(), b"on");
    }

    #[test]
    fn test_link_loss_resets_sessions() {
        let mut sup = online();

        sup.platform_mut().status = LinkStatus::Down;
        sup.tick(at(400)).unwrap();

        assert!(!sup.is_link_up());
        assert_eq!(sup.wifi().state(), LinkState::Down);
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Disconnected);
        assert_eq!(sup.mqtt().unwrap().state(), MqttState::Disconnected);
        assert!(sup.platform().live_tcp.is_empty());
        assert!(sup.platform().live_clients.is_empty());

        // Link returns: both sessions come back without waiting out a retry.
        sup.tick(at(500)).unwrap();
        assert_eq!(sup.wifi().state(), LinkState::Joining);
        sup.platform_mut().status = LinkStatus::Up;
        sup.tick(at(600)).unwrap();
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Connecting);
        assert_eq!(sup.mqtt().unwrap().state(), MqttState::Connecting);
        assert_eq!(sup.platform().live_tcp.len(), 1);
        assert_eq!(sup.platform().live_clients.len(), 1);
    }

    #[test]
    fn test_tcp_error_recovers_after_retry() {
        let mut sup = online();
        let tag = sup.platform().last_tcp_tag();

        sup.platform_mut()
            .push(Event::TcpError(tag, StackError::Reset));
        sup.tick(at(400)).unwrap();
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Disconnected);
        assert!(sup.platform().live_tcp.is_empty());

        // Late events for the dead connection are ignored.
        sup.platform_mut().push(Event::TcpConnected(tag));
        sup.tick(at(500)).unwrap();
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Disconnected);

        sup.tick(at(2_100)).unwrap();
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Connecting);
        assert_ne!(sup.platform().last_tcp_tag(), tag);
    }

    #[test]
    fn test_mqtt_fault_surfaces_once() {
        let mut sup: Supervisor<_, 128> = Supervisor::new(MockPlatform::new(), &config()).unwrap();
        sup.tick(at(0)).unwrap();
        sup.platform_mut().status = LinkStatus::Up;
        sup.tick(at(100)).unwrap();

        let tag = sup.platform().last_mqtt_tag();
        sup.platform_mut()
            .push(Event::MqttConnection(tag, ConnectionStatus::Disconnected));
        assert!(matches!(
            sup.tick(at(200)),
            Err(Error::ProtocolViolation(_))
        ));
        assert_eq!(sup.tick(at(300)), Ok(()));
        assert!(sup.mqtt().unwrap().is_halted());

        // TCP keeps going regardless.
        assert_eq!(sup.tcp().unwrap().state(), TcpState::Connecting);

        sup.restart_mqtt();
        sup.tick(at(400)).unwrap();
        assert_eq!(sup.mqtt().unwrap().state(), MqttState::Connecting);
        assert_eq!(sup.platform().mqtt_connects.len(), 2);
    }

    #[test]
    fn test_mqtt_stop_through_supervisor() {
        let mut sup = online();
        let tag = sup.platform().last_mqtt_tag();

        sup.request_mqtt_stop();
        assert_eq!(sup.platform().unsubscribes, ["/led"]);

        sup.platform_mut().push(Event::MqttUnsubscribed(tag, Ok(())));
        sup.tick(at(400)).unwrap();
        assert_eq!(sup.platform().disconnects.len(), 1);
        assert_eq!(sup.mqtt().unwrap().state(), MqttState::Disconnected);

        sup.tick(at(5_000)).unwrap();
        assert_eq!(sup.platform().mqtt_connects.len(), 1);
        assert!(sup.tcp().unwrap().is_connected());
    }

    #[test]
    fn test_run_once_reads_clock() {
        struct Fixed(u32);
        impl Clock for Fixed {
            fn now(&self) -> ClockReading {
                ClockReading::from_millis(self.0)
            }
        }

        let mut sup: Supervisor<_, 128> = Supervisor::new(MockPlatform::new(), &config()).unwrap();
        sup.run_once(&Fixed(u32::MAX - 50)).unwrap();
        assert_eq!(sup.platform().associations.len(), 1);
        sup.run_once(&Fixed(49)).unwrap();
        assert_eq!(sup.platform().polls, 2);
    }
}
