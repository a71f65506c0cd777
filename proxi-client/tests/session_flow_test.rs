//! End-to-end runs of the User loop against a simulated radio that hosts a
//! real beacon responder.

use std::collections::VecDeque;
use std::time::Duration;

use proxi_beacon::{Beacon, BeaconConfig, BeaconEvent, BeaconServer, NoIndicator, PeerHandle};
use proxi_client::{
    Candidate, Central, Client, ClientConfig, ClientEvent, ClientState, LedgerStore,
    TransportError, event_channel,
};
use tokio::sync::mpsc;

const PEER: PeerHandle = 1;

#[derive(Default)]
struct Radio {
    notified: Vec<Vec<u8>>,
    /// peers the beacon turned away
    disconnected: Vec<PeerHandle>,
}

impl BeaconServer for Radio {
    type Error = ();

    fn start_advertising(&mut self, _device_name: &str) -> Result<(), ()> {
        Ok(())
    }

    fn stop_advertising(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), ()> {
        self.notified.push(payload.to_vec());
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerHandle) -> Result<(), ()> {
        self.disconnected.push(peer);
        Ok(())
    }
}

struct SimCentral {
    events: mpsc::Sender<ClientEvent>,
    beacon: Beacon<Radio, NoIndicator>,
    adverts: Vec<Candidate>,
    rssi: i16,
    writable: bool,
    connect_results: VecDeque<bool>,
    /// this many connects bring the link up and then never return
    hang_connects: usize,
    /// stop advertising once this many sessions have connected
    max_sessions: usize,
    /// link drops after this many samples in a session
    drop_after: Option<usize>,
    connected: bool,
    /// link up at the radio level, whether or not connect returned
    link_up: bool,
    scans: usize,
    connect_attempts: usize,
    connects: usize,
    disconnects: usize,
    session_sends: usize,
    sent: Vec<Vec<u8>>,
}

impl SimCentral {
    fn new(events: mpsc::Sender<ClientEvent>) -> Self {
        let mut beacon = Beacon::new(Radio::default(), NoIndicator, BeaconConfig::default());
        beacon.start().unwrap();
        Self {
            events,
            beacon,
            adverts: vec![company(-40)],
            rssi: -10,
            writable: true,
            connect_results: VecDeque::new(),
            hang_connects: 0,
            max_sessions: 1,
            drop_after: None,
            connected: false,
            link_up: false,
            scans: 0,
            connect_attempts: 0,
            connects: 0,
            disconnects: 0,
            session_sends: 0,
            sent: Vec::new(),
        }
    }

    fn push(&self, event: ClientEvent) {
        self.events.try_send(event).expect("event channel full");
    }
}

impl Central for SimCentral {
    async fn start_scan(&mut self) -> Result<(), TransportError> {
        self.scans += 1;
        if self.connects < self.max_sessions {
            for advert in &self.adverts {
                self.push(ClientEvent::AdvertisementSeen(advert.clone()));
            }
        }
        Ok(())
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn connect(&mut self, _candidate: &Candidate) -> Result<(), TransportError> {
        self.connect_attempts += 1;
        if self.hang_connects > 0 {
            self.hang_connects -= 1;
            self.link_up = true;
            self.beacon.handle(BeaconEvent::Connected(PEER)).unwrap();
            return std::future::pending().await;
        }
        if !self.connect_results.pop_front().unwrap_or(true) {
            return Err(TransportError::PeerNotFound("gone".to_string()));
        }
        self.connected = true;
        self.link_up = true;
        self.connects += 1;
        self.session_sends = 0;
        self.beacon.handle(BeaconEvent::Connected(PEER)).unwrap();
        Ok(())
    }

    async fn request_mtu(&mut self, mtu: u16) -> Result<u16, TransportError> {
        Ok(mtu)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if !self.writable {
            return Err(TransportError::WriteUnsupported);
        }
        self.sent.push(payload.to_vec());
        self.session_sends += 1;

        if self.beacon.handle(BeaconEvent::Write(payload.to_vec())).unwrap().is_some() {
            let packet = self.beacon.server().notified.last().unwrap().clone();
            self.push(ClientEvent::Notification(packet));
        }

        if self.drop_after == Some(self.session_sends) {
            self.connected = false;
            self.link_up = false;
            self.beacon.handle(BeaconEvent::Disconnected(PEER)).unwrap();
            self.push(ClientEvent::Disconnected);
        }
        Ok(())
    }

    async fn signal_strength(&mut self) -> Result<i16, TransportError> {
        Ok(self.rssi)
    }

    async fn is_connected(&mut self) -> bool {
        self.connected
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.disconnects += 1;
        self.connected = false;
        self.link_up = false;
        if self.beacon.peer().is_some() {
            self.beacon.handle(BeaconEvent::Disconnected(PEER)).unwrap();
        }
        Ok(())
    }
}

fn company(rssi: i16) -> Candidate {
    Candidate {
        address: "24:0A:C4:12:34:56".to_string(),
        name: Some("COMPANY_DEVICE".to_string()),
        rssi: Some(rssi),
    }
}

fn temp_home() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("proxi-flow-{}", rand::random::<u64>()))
}

fn client_with(
    balance: u64,
    setup: impl FnOnce(&mut SimCentral),
) -> (Client<SimCentral>, LedgerStore, std::path::PathBuf) {
    let config = ClientConfig::default();
    let (tx, rx) = event_channel(config.event_capacity);
    let mut central = SimCentral::new(tx);
    setup(&mut central);

    let home = temp_home();
    let store = LedgerStore::in_home(&home);
    store.save(balance).unwrap();

    (Client::new(central, rx, config, Some(store.clone())), store, home)
}

async fn run_for(client: &mut Client<SimCentral>, secs: u64) {
    let outcome = tokio::time::timeout(Duration::from_secs(secs), client.run()).await;
    assert!(outcome.is_err(), "client loop should only stop on timeout");
}

#[tokio::test(start_paused = true)]
async fn stationary_user_is_penalized_once_per_session() {
    let (mut client, store, home) = client_with(5, |_| {});
    run_for(&mut client, 5).await;

    let central = client.central();
    assert_eq!(central.connects, 1);
    assert!(central.sent.len() >= 4, "one sample per second expected");
    assert_eq!(central.sent[0], b"-10".to_vec());

    assert_eq!(client.balance(), 2);
    assert!(client.machine().ledger().award_guard());
    assert_eq!(client.machine().state(), &ClientState::Connected);
    assert_eq!(store.load().unwrap(), 2);

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn each_reconnect_allows_one_more_award() {
    let (mut client, store, home) = client_with(10, |central| {
        central.max_sessions = 3;
        central.drop_after = Some(2);
    });
    run_for(&mut client, 30).await;

    let central = client.central();
    assert_eq!(central.connects, 3);
    assert_eq!(central.sent.len(), 6);
    assert_eq!(client.balance(), 1);
    assert_eq!(client.machine().state(), &ClientState::Scanning);
    assert!(!client.machine().ledger().award_guard());
    assert_eq!(store.load().unwrap(), 1);

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn penalty_never_takes_balance_below_zero() {
    let (mut client, store, home) = client_with(1, |central| {
        central.max_sessions = 2;
        central.drop_after = Some(1);
    });
    run_for(&mut client, 10).await;

    assert_eq!(client.central().connects, 2);
    assert_eq!(client.balance(), 0);
    assert_eq!(store.load().unwrap(), 0);

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn standard_zone_keeps_balance() {
    let (mut client, _store, home) = client_with(7, |central| central.rssi = -45);
    run_for(&mut client, 4).await;

    assert!(!client.central().sent.is_empty());
    assert_eq!(client.balance(), 7);
    assert!(!client.machine().ledger().award_guard());

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn unwritable_characteristic_keeps_connection() {
    let (mut client, _store, home) = client_with(3, |central| central.writable = false);
    run_for(&mut client, 4).await;

    let central = client.central();
    assert!(central.sent.is_empty());
    assert_eq!(central.connects, 1);
    assert_eq!(client.machine().state(), &ClientState::Connected);
    assert_eq!(client.balance(), 3);

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_rescans() {
    let (mut client, _store, home) = client_with(0, |central| {
        central.connect_results = VecDeque::from([false, true]);
    });
    run_for(&mut client, 3).await;

    let central = client.central();
    assert_eq!(central.connect_attempts, 2);
    assert_eq!(central.scans, 2);
    assert_eq!(client.machine().state(), &ClientState::Connected);

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn timed_out_connect_frees_the_beacon_slot() {
    let (mut client, _store, home) = client_with(0, |central| central.hang_connects = 1);
    run_for(&mut client, 15).await;

    let central = client.central();
    assert_eq!(central.connect_attempts, 2);
    assert_eq!(central.disconnects, 1);
    assert_eq!(central.scans, 2);
    assert_eq!(central.connects, 1);
    assert!(central.link_up);
    assert_eq!(central.beacon.peer(), Some(PEER));
    assert!(!central.beacon.server().disconnected.contains(&PEER));
    assert_eq!(client.machine().state(), &ClientState::Connected);
    assert!(!central.sent.is_empty());

    let _ = std::fs::remove_dir_all(home);
}

#[tokio::test(start_paused = true)]
async fn zero_send_interval_does_not_stall_or_panic() {
    let config = ClientConfig {
        send_interval_ms: 0,
        ..ClientConfig::default()
    };
    let (tx, rx) = event_channel(config.event_capacity);
    let mut client = Client::new(SimCentral::new(tx), rx, config, None);

    let outcome = tokio::time::timeout(Duration::from_millis(100), client.run()).await;
    assert!(outcome.is_err());
    assert!(client.central().sent.len() > 1);
    assert_eq!(client.balance(), 0);
}

#[tokio::test(start_paused = true)]
async fn strangers_and_weak_beacons_are_ignored() {
    let (mut client, _store, home) = client_with(0, |central| {
        central.adverts = vec![
            Candidate {
                name: Some("USER_DEVICE".to_string()),
                ..company(-30)
            },
            company(-85),
        ];
    });
    run_for(&mut client, 3).await;

    assert_eq!(client.central().connect_attempts, 0);
    assert_eq!(client.machine().state(), &ClientState::Scanning);
    assert!(client.machine().recent_peers().is_empty());

    let _ = std::fs::remove_dir_all(home);
}
