//! Beacon responder - classifies samples and keeps the connection slot

use log::*;
use proxi_proto::{DEFAULT_ULTRA_CLOSE_POINTS, SignalSample, Verdict, gatt::BEACON_NAME};

use crate::server::{BeaconEvent, BeaconServer, Indicator, PeerHandle};

#[derive(thiserror::Error, Debug)]
pub enum BeaconError<E: std::fmt::Debug> {
    #[error("BLE server error: {0:?}")]
    Server(E),
}

/// Beacon settings, fixed at boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconConfig {
    pub device_name: String,
    /// Points attached to an ultra close verdict
    pub ultra_close_points: i32,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            device_name: BEACON_NAME.to_string(),
            ultra_close_points: DEFAULT_ULTRA_CLOSE_POINTS,
        }
    }
}

/// Company role state machine
///
/// Purely reactive: every event is handled to completion inside `handle`,
/// including the verdict notification.
pub struct Beacon<S: BeaconServer, I: Indicator> {
    server: S,
    indicator: I,
    config: BeaconConfig,
    peer: Option<PeerHandle>,
    advertising: bool,
}

impl<S: BeaconServer, I: Indicator> Beacon<S, I> {
    pub fn new(server: S, indicator: I, config: BeaconConfig) -> Self {
        Self {
            server,
            indicator,
            config,
            peer: None,
            advertising: false,
        }
    }

    pub fn config(&self) -> &BeaconConfig {
        &self.config
    }

    /// Connected central, if any
    pub fn peer(&self) -> Option<PeerHandle> {
        self.peer
    }

    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    /// Begin advertising; call once after the GATT service is registered
    pub fn start(&mut self) -> Result<(), BeaconError<S::Error>> {
        self.advertise()?;
        info!("Beacon live as '{}'. Waiting for user...", self.config.device_name);
        Ok(())
    }

    /// Handle one event from the BLE stack
    ///
    /// Returns the verdict that was notified, if the event was a valid sample.
    ///
    /// A failed re-advertise leaves the beacon idle and unadvertised; it is
    /// retried after every later event that completes, and by
    /// `retry_advertising`.
    pub fn handle(&mut self, event: BeaconEvent) -> Result<Option<Verdict>, BeaconError<S::Error>> {
        let outcome = match event {
            BeaconEvent::Connected(peer) => self.on_connect(peer).map(|_| None),
            BeaconEvent::Disconnected(peer) => self.on_disconnect(peer).map(|_| None),
            BeaconEvent::Write(data) => self.on_write(&data),
        };
        if outcome.is_ok() {
            self.retry_advertising();
        }
        outcome
    }

    /// Advertise again if the slot is free and advertising is not running.
    ///
    /// Returns whether the beacon is advertising afterwards.
    pub fn retry_advertising(&mut self) -> bool {
        if self.peer.is_some() || self.advertising {
            return self.advertising;
        }
        match self.advertise() {
            Ok(()) => {
                info!("Advertising resumed as '{}'", self.config.device_name);
                true
            }
            Err(e) => {
                warn!("Advertising still down: {}", e);
                false
            }
        }
    }

    fn on_connect(&mut self, peer: PeerHandle) -> Result<(), BeaconError<S::Error>> {
        if let Some(current) = self.peer {
            warn!("Refusing peer {} - slot held by peer {}", peer, current);
            return self.server.disconnect(peer).map_err(BeaconError::Server);
        }

        info!("User connected (peer {})", peer);
        self.peer = Some(peer);
        if self.advertising {
            self.server.stop_advertising().map_err(BeaconError::Server)?;
            self.advertising = false;
        }
        Ok(())
    }

    fn on_disconnect(&mut self, peer: PeerHandle) -> Result<(), BeaconError<S::Error>> {
        match self.peer {
            Some(current) if current != peer => {
                // A refused peer leaving; the slot is still taken.
                debug!("Refused peer {} disconnected", peer);
                Ok(())
            }
            _ => {
                self.peer = None;
                self.advertise()?;
                info!("User disconnected. Advertising...");
                Ok(())
            }
        }
    }

    fn on_write(&mut self, data: &[u8]) -> Result<Option<Verdict>, BeaconError<S::Error>> {
        let sample = match SignalSample::from_bytes(data) {
            Ok(sample) => sample,
            Err(e) => {
                warn!("Ignoring write: {}", e);
                return Ok(None);
            }
        };

        let verdict = Verdict::for_sample(sample, self.config.ultra_close_points);
        let packet = verdict.to_packet();

        self.server.notify(packet.as_bytes()).map_err(BeaconError::Server)?;
        self.indicator.set(verdict.zone.indicator_active());

        info!("Received RSSI: {} | Sent: {}", sample, packet);
        Ok(Some(verdict))
    }

    fn advertise(&mut self) -> Result<(), BeaconError<S::Error>> {
        self.server
            .start_advertising(&self.config.device_name)
            .map_err(BeaconError::Server)?;
        self.advertising = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxi_proto::ProximityZone;

    #[derive(Default)]
    struct RecordingServer {
        advertised: Vec<String>,
        stops: usize,
        notified: Vec<Vec<u8>>,
        dropped: Vec<PeerHandle>,
    }

    impl BeaconServer for RecordingServer {
        type Error = ();

        fn start_advertising(&mut self, device_name: &str) -> Result<(), ()> {
            self.advertised.push(device_name.to_string());
            Ok(())
        }

        fn stop_advertising(&mut self) -> Result<(), ()> {
            self.stops += 1;
            Ok(())
        }

        fn notify(&mut self, payload: &[u8]) -> Result<(), ()> {
            self.notified.push(payload.to_vec());
            Ok(())
        }

        fn disconnect(&mut self, peer: PeerHandle) -> Result<(), ()> {
            self.dropped.push(peer);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Led(Vec<bool>);

    impl Indicator for Led {
        fn set(&mut self, active: bool) {
            self.0.push(active);
        }
    }

    fn beacon() -> Beacon<RecordingServer, Led> {
        let mut b = Beacon::new(RecordingServer::default(), Led::default(), BeaconConfig::default());
        b.start().unwrap();
        b
    }

    #[test]
    fn write_produces_one_notification() {
        let mut b = beacon();
        b.handle(BeaconEvent::Connected(1)).unwrap();

        let v = b.handle(BeaconEvent::Write(b"-15".to_vec())).unwrap().unwrap();
        assert_eq!(v.zone, ProximityZone::UltraClose);
        assert_eq!(v.point_delta, -3);
        assert_eq!(
            b.server().notified,
            vec![b"DATA_PACKET: ULTRA_CLOSE_PROXIMITY | POINTS:-3".to_vec()]
        );
    }

    #[test]
    fn indicator_follows_zone() {
        let mut b = beacon();
        for sample in ["-10", "-45", "-90"] {
            b.handle(BeaconEvent::Write(sample.as_bytes().to_vec())).unwrap();
        }
        assert_eq!(b.indicator().0, vec![true, true, false]);
    }

    #[test]
    fn malformed_write_is_ignored() {
        let mut b = beacon();
        assert_eq!(b.handle(BeaconEvent::Write(Vec::new())).unwrap(), None);
        assert_eq!(b.handle(BeaconEvent::Write(b"near".to_vec())).unwrap(), None);
        assert!(b.server().notified.is_empty());
        assert!(b.indicator().0.is_empty());
    }

    #[test]
    fn configured_penalty_is_sent() {
        let config = BeaconConfig {
            ultra_close_points: 5,
            ..BeaconConfig::default()
        };
        let mut b = Beacon::new(RecordingServer::default(), Led::default(), config);
        b.handle(BeaconEvent::Write(b"-1".to_vec())).unwrap();
        assert_eq!(
            b.server().notified,
            vec![b"DATA_PACKET: ULTRA_CLOSE_PROXIMITY | POINTS:5".to_vec()]
        );
    }

    #[test]
    fn single_slot_refuses_second_peer() {
        let mut b = beacon();
        b.handle(BeaconEvent::Connected(1)).unwrap();
        assert!(!b.is_advertising());

        b.handle(BeaconEvent::Connected(2)).unwrap();
        assert_eq!(b.peer(), Some(1));
        assert_eq!(b.server().dropped, vec![2]);

        // refused peer leaving does not free the slot
        b.handle(BeaconEvent::Disconnected(2)).unwrap();
        assert_eq!(b.peer(), Some(1));
        assert!(!b.is_advertising());
    }

    /// Server whose first `fails` advertise calls fail
    #[derive(Default)]
    struct Flaky {
        fails: usize,
        advertising: bool,
    }

    impl BeaconServer for Flaky {
        type Error = ();

        fn start_advertising(&mut self, _device_name: &str) -> Result<(), ()> {
            if self.fails > 0 {
                self.fails -= 1;
                return Err(());
            }
            self.advertising = true;
            Ok(())
        }

        fn stop_advertising(&mut self) -> Result<(), ()> {
            self.advertising = false;
            Ok(())
        }

        fn notify(&mut self, _payload: &[u8]) -> Result<(), ()> {
            Ok(())
        }

        fn disconnect(&mut self, _peer: PeerHandle) -> Result<(), ()> {
            Ok(())
        }
    }

    #[test]
    fn failed_readvertise_is_retried_on_next_event() {
        let mut b = Beacon::new(Flaky::default(), Led::default(), BeaconConfig::default());
        b.start().unwrap();
        b.handle(BeaconEvent::Connected(1)).unwrap();

        b.server.fails = 1;
        assert!(b.handle(BeaconEvent::Disconnected(1)).is_err());
        assert_eq!(b.peer(), None);
        assert!(!b.is_advertising());

        b.handle(BeaconEvent::Write(b"-50".to_vec())).unwrap();
        assert!(b.is_advertising());
        assert!(b.server().advertising);
    }

    #[test]
    fn retry_advertising_recovers_after_failed_start() {
        let server = Flaky {
            fails: 2,
            ..Flaky::default()
        };
        let mut b = Beacon::new(server, Led::default(), BeaconConfig::default());
        assert!(b.start().is_err());
        assert!(!b.retry_advertising());
        assert!(b.retry_advertising());
        assert!(b.server().advertising);

        // nothing to do while a user holds the slot
        b.handle(BeaconEvent::Connected(3)).unwrap();
        assert!(!b.retry_advertising());
        assert!(!b.server().advertising);
    }

    #[test]
    fn disconnect_readvertises() {
        let mut b = beacon();
        b.handle(BeaconEvent::Connected(7)).unwrap();
        b.handle(BeaconEvent::Disconnected(7)).unwrap();

        assert_eq!(b.peer(), None);
        assert!(b.is_advertising());
        assert_eq!(b.server().advertised, vec!["COMPANY_DEVICE", "COMPANY_DEVICE"]);

        // next user can take the slot
        b.handle(BeaconEvent::Connected(8)).unwrap();
        assert_eq!(b.peer(), Some(8));
    }
}
