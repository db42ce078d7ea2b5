#![deny(unsafe_code)]
//! Wireless association manager
//!
//! Keeps the station associated: starts a join whenever the link is down,
//! abandons a join that has not produced a link within the timeout, and
//! notices when an established link drops. The radio driver does the actual
//! work; this module only decides when to ask for it.

use connectivity_hal::{ClockReading, LinkDriver, LinkStatus};
use heapless::String;

use super::config::WifiConfig;
use super::error::{ConfigError, Error};
use crate::time::{Deadline, IntervalTimer};

/// Longest SSID allowed by 802.11
pub const MAX_SSID_LEN: usize = 32;
/// Longest WPA2 passphrase
pub const MAX_PASSPHRASE_LEN: usize = 63;

/// Association state as tracked by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// No link; the next due tick starts a join
    Down,
    /// Join requested, waiting for the driver to report the link up
    Joining,
    /// Associated and addressed
    Up,
}

/// Counters kept across the lifetime of the manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStats {
    pub association_attempts: u32,
    pub timeouts: u32,
    pub auth_failures: u32,
    pub link_losses: u32,
}

/// Wireless association manager
pub struct WirelessManager {
    ssid: String<MAX_SSID_LEN>,
    passphrase: String<MAX_PASSPHRASE_LEN>,
    state: LinkState,
    interval: IntervalTimer,
    association_timeout_ms: u32,
    deadline: Option<Deadline>,
    last_status: LinkStatus,
    last_failure: Option<Error>,
    stats: LinkStats,
}

impl WirelessManager {
    /// Validate and store the credentials; the link starts out [`LinkState::Down`]
    ///
    /// No radio activity happens here. The first [`tick`](Self::tick) starts
    /// the join.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidConfig`] if the SSID or passphrase is empty or longer
    /// than [`MAX_SSID_LEN`] / [`MAX_PASSPHRASE_LEN`] bytes.
    pub fn initialize(config: &WifiConfig) -> Result<Self, Error> {
        if config.ssid.is_empty() {
            return Err(ConfigError::EmptySsid.into());
        }
        if config.passphrase.is_empty() {
            return Err(ConfigError::EmptyPassphrase.into());
        }
        let ssid: String<MAX_SSID_LEN> =
            String::try_from(config.ssid).map_err(|_| ConfigError::SsidTooLong)?;
        let passphrase: String<MAX_PASSPHRASE_LEN> =
            String::try_from(config.passphrase).map_err(|_| ConfigError::PassphraseTooLong)?;

        debug!(
            "Wi-Fi manager ready for '{}' (timeout {} ms)",
            ssid.as_str(),
            config.association_timeout_ms
        );

        Ok(Self {
            ssid,
            passphrase,
            state: LinkState::Down,
            interval: IntervalTimer::new(config.poll_interval_ms),
            association_timeout_ms: config.association_timeout_ms,
            deadline: None,
            last_status: LinkStatus::Down,
            last_failure: None,
            stats: LinkStats::default(),
        })
    }

    /// Advance the association state machine
    ///
    /// Does nothing until the poll interval has elapsed since the last run.
    /// Otherwise lets the driver process pending work, samples its status and
    /// acts on it. Never blocks.
    pub fn tick<D: LinkDriver + ?Sized>(&mut self, driver: &mut D, now: ClockReading) {
        if !self.interval.is_due(now) {
            return;
        }

        driver.poll_once();
        let status = driver.link_status();
        if status != self.last_status {
            debug!("Wi-Fi driver status: {} -> {}", self.last_status, status);
            self.last_status = status;
        }

        match self.state {
            LinkState::Down => self.begin_join(driver, now),
            LinkState::Joining => {
                // The timeout wins over a status that arrives on the same tick.
                if self.deadline.map_or(true, |d| d.has_expired(now)) {
                    warn!(
                        "Association with '{}' timed out after {} ms",
                        self.ssid.as_str(),
                        self.association_timeout_ms
                    );
                    self.stats.timeouts = self.stats.timeouts.wrapping_add(1);
                    self.join_failed(Error::AssociationTimeout);
                    return;
                }
                match status {
                    LinkStatus::Up => {
                        info!("Wi-Fi link up ('{}')", self.ssid.as_str());
                        self.state = LinkState::Up;
                        self.deadline = None;
                        self.last_failure = None;
                    }
                    LinkStatus::AuthFailed => {
                        warn!("Access point rejected credentials for '{}'", self.ssid.as_str());
                        self.stats.auth_failures = self.stats.auth_failures.wrapping_add(1);
                        self.join_failed(Error::AssociationAuthFailure);
                    }
                    LinkStatus::Down | LinkStatus::Joining => {}
                }
            }
            LinkState::Up => {
                if status != LinkStatus::Up {
                    warn!("Wi-Fi link lost (driver reports {})", status);
                    self.stats.link_losses = self.stats.link_losses.wrapping_add(1);
                    self.state = LinkState::Down;
                }
            }
        }
    }

    fn begin_join<D: LinkDriver + ?Sized>(&mut self, driver: &mut D, now: ClockReading) {
        info!("Joining Wi-Fi network '{}'", self.ssid.as_str());
        driver.begin_association(&self.ssid, &self.passphrase);
        self.stats.association_attempts = self.stats.association_attempts.wrapping_add(1);
        self.deadline = Some(Deadline::arm(now, self.association_timeout_ms));
        self.state = LinkState::Joining;
    }

    fn join_failed(&mut self, reason: Error) {
        self.last_failure = Some(reason);
        self.deadline = None;
        self.state = LinkState::Down;
    }

    /// True only while associated
    pub fn is_up(&self) -> bool {
        self.state == LinkState::Up
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Status the driver reported on the most recent run
    pub fn last_status(&self) -> LinkStatus {
        self.last_status
    }

    /// Why the most recent join attempt failed, cleared once the link comes up
    pub fn last_failure(&self) -> Option<Error> {
        self.last_failure
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPlatform;

    fn at(ms: u32) -> ClockReading {
        ClockReading::from_millis(ms)
    }

    fn config() -> WifiConfig {
        WifiConfig {
            ssid: "workshop",
            passphrase: "hunter22",
            poll_interval_ms: 100,
            association_timeout_ms: 4_000,
        }
    }

    #[test]
    fn test_initialize_validates_credentials() {
        let mut cfg = config();
        cfg.ssid = "";
        assert_eq!(
            WirelessManager::initialize(&cfg).err(),
            Some(Error::InvalidConfig(ConfigError::EmptySsid))
        );

        cfg.ssid = "an-ssid-that-is-definitely-over-32b";
        assert_eq!(
            WirelessManager::initialize(&cfg).err(),
            Some(Error::InvalidConfig(ConfigError::SsidTooLong))
        );

        let mut cfg = config();
        cfg.passphrase = "";
        assert_eq!(
            WirelessManager::initialize(&cfg).err(),
            Some(Error::InvalidConfig(ConfigError::EmptyPassphrase))
        );

        let long = "p".repeat(64);
        cfg.passphrase = std::boxed::Box::leak(long.into_boxed_str());
        assert_eq!(
            WirelessManager::initialize(&cfg).err(),
            Some(Error::InvalidConfig(ConfigError::PassphraseTooLong))
        );

        let mut cfg = config();
        cfg.ssid = "exactly-thirty-two-bytes-long-ok";
        assert_eq!(cfg.ssid.len(), 32);
        let wifi = WirelessManager::initialize(&cfg).unwrap();
        assert_eq!(wifi.state(), LinkState::Down);
        assert_eq!(wifi.ssid(), "exactly-thirty-two-bytes-long-ok");
    }

    #[test]
    fn test_first_tick_starts_join() {
        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        wifi.tick(&mut driver, at(0));
        assert_eq!(wifi.state(), LinkState::Joining);
        assert_eq!(driver.polls, 1);
        assert_eq!(driver.associations.len(), 1);
        assert_eq!(driver.associations[0].0, "workshop");
        assert_eq!(driver.associations[0].1, "hunter22");
    }

    #[test]
    fn test_ticks_are_interval_gated() {
        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        wifi.tick(&mut driver, at(0));
        wifi.tick(&mut driver, at(50));
        wifi.tick(&mut driver, at(99));
        assert_eq!(driver.polls, 1);
        wifi.tick(&mut driver, at(100));
        assert_eq!(driver.polls, 2);
    }

    #[test]
    fn test_join_times_out_and_retries() {
        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        wifi.tick(&mut driver, at(0));
        assert_eq!(wifi.state(), LinkState::Joining);

        let mut t = 100;
        while t < 4_000 {
            wifi.tick(&mut driver, at(t));
            assert_eq!(wifi.state(), LinkState::Joining, "at {} ms", t);
            t += 100;
        }

        wifi.tick(&mut driver, at(4_000));
        assert_eq!(wifi.state(), LinkState::Down);
        assert_eq!(wifi.last_failure(), Some(Error::AssociationTimeout));
        assert_eq!(driver.associations.len(), 1);

        wifi.tick(&mut driver, at(4_100));
        assert_eq!(wifi.state(), LinkState::Joining);
        assert_eq!(driver.associations.len(), 2);
        assert_eq!(wifi.stats().timeouts, 1);
        assert_eq!(wifi.stats().association_attempts, 2);
    }

    #[test]
    fn test_timeout_wins_over_late_link_up() {
        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        wifi.tick(&mut driver, at(0));
        driver.status = LinkStatus::Up;
        wifi.tick(&mut driver, at(4_000));
        assert_eq!(wifi.state(), LinkState::Down);
        assert!(!wifi.is_up());
    }

    #[test]
    fn test_link_up_then_lost() {
        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        wifi.tick(&mut driver, at(0));
        driver.status = LinkStatus::Joining;
        wifi.tick(&mut driver, at(100));
        assert_eq!(wifi.state(), LinkState::Joining);

        driver.status = LinkStatus::Up;
        wifi.tick(&mut driver, at(200));
        assert!(wifi.is_up());
        assert_eq!(wifi.last_failure(), None);

        // Stays up well past the association timeout.
        wifi.tick(&mut driver, at(60_000));
        assert!(wifi.is_up());

        driver.status = LinkStatus::Down;
        wifi.tick(&mut driver, at(60_100));
        assert_eq!(wifi.state(), LinkState::Down);
        assert_eq!(wifi.stats().link_losses, 1);

        wifi.tick(&mut driver, at(60_200));
        assert_eq!(wifi.state(), LinkState::Joining);
        assert_eq!(driver.associations.len(), 2);
    }

    #[test]
    fn test_auth_failure_goes_down() {
        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        wifi.tick(&mut driver, at(0));
        driver.status = LinkStatus::AuthFailed;
        wifi.tick(&mut driver, at(100));
        assert_eq!(wifi.state(), LinkState::Down);
        assert_eq!(wifi.last_failure(), Some(Error::AssociationAuthFailure));
        assert_eq!(wifi.stats().auth_failures, 1);
    }

    #[test]
    fn test_never_up_unless_driver_up() {
        const STATUSES: [LinkStatus; 4] = [
            LinkStatus::Down,
            LinkStatus::Joining,
            LinkStatus::Up,
            LinkStatus::AuthFailed,
        ];

        let mut driver = MockPlatform::new();
        let mut wifi = WirelessManager::initialize(&config()).unwrap();

        // Deterministic pseudo-random walk over driver statuses and tick spacing.
        let mut seed: u32 = 0x1234_5678;
        let mut now = ClockReading::from_millis(u32::MAX - 10_000);
        for _ in 0..5_000 {
            seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            driver.status = STATUSES[(seed >> 24) as usize % STATUSES.len()];
            now = now.offset(100 + (seed >> 8) % 700);

            wifi.tick(&mut driver, now);
            if wifi.is_up() {
                assert_eq!(wifi.last_status(), LinkStatus::Up);
                assert_eq!(driver.status, LinkStatus::Up);
            }
        }
        assert!(wifi.stats().association_attempts > 1);
    }
}
