//! Proxi Company Beacon for ESP32
//!
//! Advertises the proximity service, answers every RSSI sample with a
//! verdict and drives two indicator LEDs: GPIO26 while the user is near,
//! GPIO27 while the signal is weak.

mod ble;

use esp_idf_svc::hal::{
    gpio::{Gpio26, Gpio27, Output, PinDriver},
    prelude::Peripherals,
};
use log::*;
use proxi_beacon::{Beacon, BeaconConfig, Indicator};
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

const ADVERTISE_RETRY: Duration = Duration::from_secs(2);

struct Leds {
    near: PinDriver<'static, Gpio26, Output>,
    idle: PinDriver<'static, Gpio27, Output>,
}

impl Indicator for Leds {
    fn set(&mut self, active: bool) {
        let (on, off) = if active {
            (&mut self.near, &mut self.idle)
        } else {
            (&mut self.idle, &mut self.near)
        };
        let _ = on.set_high();
        let _ = off.set_low();
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("Proxi Company Beacon v0.1");

    let peripherals = Peripherals::take()?;
    let leds = Leds {
        near: PinDriver::output(peripherals.pins.gpio26)?,
        idle: PinDriver::output(peripherals.pins.gpio27)?,
    };

    let config = BeaconConfig::default();
    let (server, events) = ble::start_gatt_server(&config.device_name)?;

    let mut beacon = Beacon::new(server, leds, config);
    if let Err(e) = beacon.start() {
        error!("Failed to start advertising: {:?}", e);
    }

    // Every event is handled to completion before the next one. A quiet
    // queue is the chance to bring advertising back after a failure.
    loop {
        match events.recv_timeout(ADVERTISE_RETRY) {
            Ok(event) => {
                if let Err(e) = beacon.handle(event) {
                    error!("Beacon error: {:?}", e);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                beacon.retry_advertising();
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    warn!("BLE event queue closed");
    Ok(())
}
