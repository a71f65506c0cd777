//! Proxi BLE
//!
//! Host-side transport for the User role, built on btleplug.
//!
//! # Example
//!
//! ```ignore
//! use proxi_ble::central::BtleCentral;
//! use proxi_client::{Client, ClientConfig, event_channel};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::default();
//!     let (tx, rx) = event_channel(config.event_capacity);
//!     let central = BtleCentral::new(tx).await?;
//!
//!     Client::new(central, rx, config, None).run().await?;
//!     Ok(())
//! }
//! ```

pub mod central;
pub mod logging;
