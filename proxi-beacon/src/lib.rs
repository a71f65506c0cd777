//! Proxi Beacon Library
//!
//! The Company side of the proximity game, written against traits so any MCU
//! BLE stack can host it.
//!
//! This crate provides:
//! - `BeaconServer` and `Indicator` traits for the BLE GATT server and the
//!   external indicator output
//! - `Beacon`, which turns connect/disconnect/write events into verdict
//!   notifications and keeps the single connection slot
//!
//! # MCU implementations
//! - ESP32: see `firmware/beacon-esp32`

pub mod beacon;
pub mod server;

pub use beacon::*;
pub use server::*;
