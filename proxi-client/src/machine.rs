//! User role state machine
//!
//! Scanning → Connecting → Connected → Disconnecting → Scanning. Every
//! transport event goes through `ProximityClient::dispatch`, which updates
//! the owned state and answers with the actions the runner must carry out.

use tracing::{debug, info, warn};

use proxi_proto::VerdictPacket;

use crate::{Candidate, ClientConfig, ConnectionSession, PointLedger, RecentPeerCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Scanning,
    Connecting(Candidate),
    Connected,
    Disconnecting,
}

impl ClientState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ClientState::Connected)
    }
}

/// Everything the transport (or the runner, for connect/release outcomes)
/// can tell the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    AdvertisementSeen(Candidate),
    Connected,
    ConnectFailed,
    Disconnected,
    Notification(Vec<u8>),
    /// Session resources have been released after a disconnect
    Released,
}

/// Work the runner must perform, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    StopScan,
    StartScan,
    Connect(Candidate),
    NegotiateMtu,
    Release,
    PersistBalance(u64),
}

pub struct ProximityClient {
    beacon_name: String,
    proximity_gate: i16,
    state: ClientState,
    session: Option<ConnectionSession>,
    ledger: PointLedger,
    recent: RecentPeerCache,
}

impl ProximityClient {
    pub fn new(config: &ClientConfig, ledger: PointLedger) -> Self {
        Self {
            beacon_name: config.beacon_name.clone(),
            proximity_gate: config.proximity_gate,
            state: ClientState::Scanning,
            session: None,
            ledger,
            recent: RecentPeerCache::new(),
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn session(&self) -> Option<&ConnectionSession> {
        self.session.as_ref()
    }

    pub fn ledger(&self) -> &PointLedger {
        &self.ledger
    }

    pub fn recent_peers(&self) -> &RecentPeerCache {
        &self.recent
    }

    /// Name matches exactly and the signal clears the proximity gate
    pub fn accepts(&self, candidate: &Candidate) -> bool {
        candidate.name.as_deref() == Some(self.beacon_name.as_str())
            && candidate.rssi.is_some_and(|rssi| rssi > self.proximity_gate)
    }

    pub fn dispatch(&mut self, event: ClientEvent) -> Vec<Action> {
        match event {
            ClientEvent::AdvertisementSeen(candidate) if self.state == ClientState::Scanning => {
                self.on_advertisement(candidate)
            }
            ClientEvent::Connected if self.is_connecting() => self.on_connected(),
            ClientEvent::ConnectFailed if self.is_connecting() => self.on_connect_failed(),
            ClientEvent::Notification(data) if self.state.is_connected() => {
                self.on_notification(&data)
            }
            ClientEvent::Disconnected if self.is_connecting() || self.state.is_connected() => {
                let was_connected = self
                    .session
                    .as_ref()
                    .is_some_and(ConnectionSession::is_connected);
                info!(was_connected, "Disconnected. Releasing session...");
                self.state = ClientState::Disconnecting;
                vec![Action::Release]
            }
            ClientEvent::Released if self.state == ClientState::Disconnecting => {
                self.ledger.reset_guard();
                self.session = None;
                self.state = ClientState::Scanning;
                info!("Resuming scan...");
                vec![Action::StartScan]
            }
            event => {
                debug!(state = ?self.state, ?event, "event ignored in this state");
                Vec::new()
            }
        }
    }

    fn is_connecting(&self) -> bool {
        matches!(self.state, ClientState::Connecting(_))
    }

    /// A connect that failed half way may still hold the link (and the
    /// beacon's only slot), so it is released like any other disconnect.
    fn on_connect_failed(&mut self) -> Vec<Action> {
        if let ClientState::Connecting(candidate) = &self.state {
            warn!(address = %candidate.address, "connect failed, releasing before rescan");
        }
        self.state = ClientState::Disconnecting;
        vec![Action::Release]
    }

    fn on_advertisement(&mut self, candidate: Candidate) -> Vec<Action> {
        if !self.accepts(&candidate) {
            debug!(
                address = %candidate.address,
                name = ?candidate.name,
                rssi = ?candidate.rssi,
                "candidate rejected"
            );
            return Vec::new();
        }

        info!(address = %candidate.address, rssi = ?candidate.rssi, "beacon found");
        self.recent.record(candidate.address.clone());
        self.session = Some(ConnectionSession::new(candidate.address.clone()));
        self.state = ClientState::Connecting(candidate.clone());
        vec![Action::StopScan, Action::Connect(candidate)]
    }

    fn on_connected(&mut self) -> Vec<Action> {
        if let Some(session) = self.session.as_mut() {
            session.mark_connected();
            info!(peer = session.peer(), "Connected!");
        }
        self.ledger.reset_guard();
        self.state = ClientState::Connected;
        vec![Action::NegotiateMtu]
    }

    fn on_notification(&mut self, data: &[u8]) -> Vec<Action> {
        let packet = VerdictPacket::from_bytes(data);
        info!("Update from Company: {}", packet);

        if packet.zone().is_none() {
            warn!(packet = packet.as_str(), "unrecognized verdict packet");
        }

        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };

        // The first message of a session is authorized whatever its zone.
        let first = session.take_first_message();
        if !(packet.is_ultra_close() || first) {
            return Vec::new();
        }

        let delta = match packet.points() {
            None => return Vec::new(),
            Some(Ok(delta)) => delta,
            Some(Err(e)) => {
                warn!("{}, counting as 0 points", e);
                0
            }
        };

        match self.ledger.award(delta) {
            Some(balance) => vec![Action::PersistBalance(balance)],
            None => Vec::new(),
        }
    }
}
