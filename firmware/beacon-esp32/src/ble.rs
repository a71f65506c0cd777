//! NimBLE GATT server for the proximity service
//!
//! NimBLE callbacks run on the host task; they only turn what happened
//! into a `BeaconEvent` and queue it for the main loop.

use esp32_nimble::{
    utilities::{mutex::Mutex, BleUuid},
    uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEError, NimbleProperties,
};
use log::*;
use proxi_beacon::{BeaconEvent, BeaconServer, PeerHandle};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;

// These must match proxi_beacon::{SERVICE_UUID, CHARACTERISTIC_UUID}
const SERVICE_UUID: BleUuid = uuid128!("4fafc201-1fb5-459e-8fcc-c5c9c331914b");
const CHARACTERISTIC_UUID: BleUuid = uuid128!("beb5483e-36e1-4688-b7f5-ea07361b26a8");

const EVENT_QUEUE: usize = 16;

/// Handle to the registered service; the device and server are the
/// NimBLE singletons behind `BLEDevice::take()`
pub struct NimbleServer {
    characteristic: Arc<Mutex<BLECharacteristic>>,
}

/// Register the service and wire NimBLE callbacks into an event queue
pub fn start_gatt_server(device_name: &str) -> anyhow::Result<(NimbleServer, Receiver<BeaconEvent>)> {
    let (tx, rx) = sync_channel(EVENT_QUEUE);

    let ble_device = BLEDevice::take();
    BLEDevice::set_device_name(device_name)?;

    let server = ble_device.get_server();
    // Re-advertising is the beacon's call, not the stack's
    server.advertise_on_disconnect(false);

    let connect_tx = tx.clone();
    server.on_connect(move |_server, desc| {
        queue(&connect_tx, BeaconEvent::Connected(desc.conn_handle()));
    });

    let disconnect_tx = tx.clone();
    server.on_disconnect(move |desc, reason| {
        info!("BLE link closed: {:?}", reason);
        queue(&disconnect_tx, BeaconEvent::Disconnected(desc.conn_handle()));
    });

    let service = server.create_service(SERVICE_UUID);
    let characteristic = service.lock().create_characteristic(
        CHARACTERISTIC_UUID,
        NimbleProperties::READ | NimbleProperties::WRITE | NimbleProperties::NOTIFY,
    );

    let write_tx = tx;
    characteristic.lock().on_write(move |args| {
        queue(&write_tx, BeaconEvent::Write(args.recv_data().to_vec()));
    });

    Ok((
        NimbleServer { characteristic },
        rx,
    ))
}

/// Samples may be dropped under load, connection changes never are
fn queue(tx: &SyncSender<BeaconEvent>, event: BeaconEvent) {
    match event {
        BeaconEvent::Write(_) => {
            if tx.try_send(event).is_err() {
                warn!("BLE event queue full, dropping sample");
            }
        }
        BeaconEvent::Connected(_) | BeaconEvent::Disconnected(_) => {
            if tx.send(event).is_err() {
                error!("BLE event queue closed, lost connection event");
            }
        }
    }
}

impl BeaconServer for NimbleServer {
    type Error = BLEError;

    fn start_advertising(&mut self, device_name: &str) -> Result<(), BLEError> {
        let mut advertising = BLEDevice::take().get_advertising().lock();
        advertising.set_data(
            BLEAdvertisementData::new()
                .name(device_name)
                .add_service_uuid(SERVICE_UUID),
        )?;
        advertising.start()
    }

    fn stop_advertising(&mut self) -> Result<(), BLEError> {
        BLEDevice::take().get_advertising().lock().stop()
    }

    fn notify(&mut self, payload: &[u8]) -> Result<(), BLEError> {
        self.characteristic.lock().set_value(payload).notify();
        Ok(())
    }

    fn disconnect(&mut self, peer: PeerHandle) -> Result<(), BLEError> {
        BLEDevice::take().get_server().disconnect(peer)
    }
}
