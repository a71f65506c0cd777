//! Async runner for the User role
//!
//! One task owns the state machine, the transport and the event receiver.
//! Sending the RSSI on the interval and handling inbound events are
//! arms of the same `select!`, so they never overlap.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use proxi_proto::SignalSample;

use crate::{
    Action, Central, ClientConfig, ClientEvent, LedgerStore, PointLedger, ProximityClient,
    TransportError,
};

/// Longest pause between attempts to restart a failed scan
const MAX_SCAN_RETRY: Duration = Duration::from_secs(30);

/// `tokio::time::interval` panics on a zero period
const MIN_SEND_INTERVAL: Duration = Duration::from_millis(1);

pub struct Client<C: Central> {
    central: C,
    events: mpsc::Receiver<ClientEvent>,
    machine: ProximityClient,
    store: Option<LedgerStore>,
    config: ClientConfig,
}

impl<C: Central> Client<C> {
    /// Build a client, restoring the balance from `store` if given
    pub fn new(
        central: C,
        events: mpsc::Receiver<ClientEvent>,
        config: ClientConfig,
        store: Option<LedgerStore>,
    ) -> Self {
        let balance = match store.as_ref().map(LedgerStore::load) {
            Some(Ok(balance)) => balance,
            Some(Err(e)) => {
                warn!("Failed to load ledger, starting from 0: {}", e);
                0
            }
            None => 0,
        };
        info!(balance, "Loaded point balance");

        let machine = ProximityClient::new(&config, PointLedger::with_balance(balance));
        Self {
            central,
            events,
            machine,
            store,
            config,
        }
    }

    pub fn machine(&self) -> &ProximityClient {
        &self.machine
    }

    pub fn central(&self) -> &C {
        &self.central
    }

    pub fn balance(&self) -> u64 {
        self.machine.ledger().balance()
    }

    /// Scan, connect, report, repeat
    ///
    /// Only returns when the transport's event stream closes.
    pub async fn run(&mut self) -> Result<(), TransportError> {
        info!(beacon = %self.config.beacon_name, "Scanning...");
        self.start_scan().await;

        let mut ticker = new_ticker(self.config.send_interval());

        loop {
            let event = if self.machine.state().is_connected() {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.report_signal().await;
                        continue;
                    }
                    event = self.events.recv() => event,
                }
            } else {
                self.events.recv().await
            };

            let Some(event) = event else {
                error!("Transport event stream closed");
                return Err(TransportError::EventStreamClosed);
            };

            let was_connected = self.machine.state().is_connected();
            self.process(event).await;
            if !was_connected && self.machine.state().is_connected() {
                // first sample goes out right after connecting
                ticker.reset_immediately();
            }
        }
    }

    /// Dispatch an event and everything that follows from it
    async fn process(&mut self, event: ClientEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for action in self.machine.dispatch(event) {
                if let Some(next) = self.perform(action).await {
                    pending.push_back(next);
                }
            }
        }
    }

    async fn perform(&mut self, action: Action) -> Option<ClientEvent> {
        match action {
            Action::StopScan => {
                if let Err(e) = self.central.stop_scan().await {
                    warn!("Failed to stop scan: {}", e);
                }
                None
            }
            Action::StartScan => {
                self.start_scan().await;
                None
            }
            Action::Connect(candidate) => {
                info!(address = %candidate.address, "Connecting...");
                let attempt = self.central.connect(&candidate);
                match tokio::time::timeout(self.config.connect_timeout(), attempt).await {
                    Ok(Ok(())) => Some(ClientEvent::Connected),
                    Ok(Err(e)) => {
                        warn!("Connect failed: {}", e);
                        Some(ClientEvent::ConnectFailed)
                    }
                    Err(_) => {
                        warn!(timeout = ?self.config.connect_timeout(), "Connect timed out");
                        Some(ClientEvent::ConnectFailed)
                    }
                }
            }
            Action::NegotiateMtu => {
                match self.central.request_mtu(self.config.mtu).await {
                    Ok(mtu) => debug!(mtu, "MTU negotiated"),
                    Err(e) => warn!("MTU negotiation failed, keeping default: {}", e),
                }
                None
            }
            Action::Release => {
                if let Err(e) = self.central.disconnect().await {
                    debug!("Disconnect during release: {}", e);
                }
                Some(ClientEvent::Released)
            }
            Action::PersistBalance(balance) => {
                if let Some(store) = &self.store {
                    if let Err(e) = store.save(balance) {
                        error!("Failed to save balance {}: {}", balance, e);
                    }
                }
                None
            }
        }
    }

    /// Keep trying until the scan is running; a dead scan would leave the
    /// client waiting forever.
    async fn start_scan(&mut self) {
        let mut retry_delay = Duration::from_secs(1);
        loop {
            match self.central.start_scan().await {
                Ok(()) => return,
                Err(e) => {
                    warn!("Failed to start scan: {}, retrying in {:?}", e, retry_delay);
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(MAX_SCAN_RETRY);
                }
            }
        }
    }

    /// One periodic cycle of the Connected state
    async fn report_signal(&mut self) {
        if !self.central.is_connected().await {
            self.process(ClientEvent::Disconnected).await;
            return;
        }

        let rssi = match self.central.signal_strength().await {
            Ok(rssi) => rssi,
            Err(e) => {
                warn!("No RSSI this cycle: {}", e);
                return;
            }
        };

        let sample = SignalSample::from(rssi);
        match self.central.send(&sample.to_bytes()).await {
            Ok(()) => info!(rssi = sample.dbm(), "Sent RSSI"),
            Err(TransportError::WriteUnsupported) => {
                warn!("Characteristic not writable, skipping this cycle");
            }
            Err(e) => {
                warn!("Failed to send RSSI: {}", e);
                if !self.central.is_connected().await {
                    self.process(ClientEvent::Disconnected).await;
                }
            }
        }
    }
}

fn new_ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period.max(MIN_SEND_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
