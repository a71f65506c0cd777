//! Transport seam for the User role
//!
//! A `Central` wraps whatever BLE stack the host has. Anything the stack
//! reports asynchronously (advertisements, notifications, link loss) goes
//! into the event channel handed out by `event_channel`, never into a
//! callback, so the client loop sees it in order with its own work.

use tokio::sync::mpsc;

use crate::{ClientEvent, TransportError};

/// Advertisement heard while scanning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Stack-specific address, used to connect
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

/// Bounded channel from the transport to the client; a capacity of 0 is
/// raised to 1
pub fn event_channel(capacity: usize) -> (mpsc::Sender<ClientEvent>, mpsc::Receiver<ClientEvent>) {
    mpsc::channel(capacity.max(1))
}

/// BLE central operations the client needs
///
/// Implementations hold at most one connected peer.
#[allow(async_fn_in_trait)]
pub trait Central {
    /// Start reporting `ClientEvent::AdvertisementSeen` on the event channel
    async fn start_scan(&mut self) -> Result<(), TransportError>;

    async fn stop_scan(&mut self) -> Result<(), TransportError>;

    /// Connect, discover the proximity characteristic and subscribe to it
    async fn connect(&mut self, candidate: &Candidate) -> Result<(), TransportError>;

    /// Returns the MTU actually in effect
    async fn request_mtu(&mut self, mtu: u16) -> Result<u16, TransportError>;

    /// Write to the proximity characteristic
    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError>;

    /// Current RSSI towards the connected peer
    async fn signal_strength(&mut self) -> Result<i16, TransportError>;

    async fn is_connected(&mut self) -> bool;

    /// Drop the peer and free its resources, including a link left behind
    /// by a connect that never returned; fine to call when already gone
    async fn disconnect(&mut self) -> Result<(), TransportError>;
}
