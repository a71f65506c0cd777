//! BLE GATT constants shared by the Company beacon and the User client
//!
//! Both roles know these ahead of time; nothing here is negotiated.

/// Proximity service UUID: 4fafc201-1fb5-459e-8fcc-c5c9c331914b
pub const SERVICE_UUID: &str = "4fafc201-1fb5-459e-8fcc-c5c9c331914b";

/// Sample/verdict characteristic UUID (read | write | notify)
///
/// The client writes signal samples to it and the beacon notifies verdicts
/// back on it.
pub const CHARACTERISTIC_UUID: &str = "beb5483e-36e1-4688-b7f5-ea07361b26a8";

/// Name the beacon advertises; the client matches it exactly
pub const BEACON_NAME: &str = "COMPANY_DEVICE";

/// Name the client uses for its own BLE identity
pub const CLIENT_NAME: &str = "USER_DEVICE";

/// ATT MTU requested by the client after connecting
pub const DEFAULT_MTU: u16 = 517;
