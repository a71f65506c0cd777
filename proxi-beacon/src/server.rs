//! BLE GATT server traits and events for the beacon
//!
//! UUIDs and the advertised name are in proxi_proto::gatt.

pub use proxi_proto::gatt::{BEACON_NAME, CHARACTERISTIC_UUID, SERVICE_UUID};

/// Connection handle assigned by the BLE stack
pub type PeerHandle = u16;

/// Event delivered by the BLE stack to the beacon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconEvent {
    /// A central connected
    Connected(PeerHandle),
    /// A central went away, for whatever reason
    Disconnected(PeerHandle),
    /// Raw bytes written to the sample characteristic
    Write(Vec<u8>),
}

/// Trait for BLE GATT server implementations
///
/// MCU-specific crates implement this trait using their BLE stack.
pub trait BeaconServer {
    /// Error type for BLE operations
    type Error: std::fmt::Debug;

    /// Start advertising the proximity service under `device_name`
    fn start_advertising(&mut self, device_name: &str) -> Result<(), Self::Error>;

    /// Stop advertising
    fn stop_advertising(&mut self) -> Result<(), Self::Error>;

    /// Set the characteristic value and notify subscribed centrals
    fn notify(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Drop a connected central
    fn disconnect(&mut self, peer: PeerHandle) -> Result<(), Self::Error>;
}

/// Binary output driven once per verdict (LED, serial line to another board...)
pub trait Indicator {
    fn set(&mut self, active: bool);
}

/// Indicator that drives nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set(&mut self, _active: bool) {}
}
