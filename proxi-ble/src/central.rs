//! btleplug implementation of the client transport
//!
//! Adapter events (advertisements, link loss) and characteristic
//! notifications are forwarded into the client's event channel by
//! background tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use btleplug::api::{
    Central as _, CentralEvent, CharPropFlags, Characteristic, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use proxi_client::{Candidate, Central, ClientEvent, TransportError};

/// 4fafc201-1fb5-459e-8fcc-c5c9c331914b, see proxi_proto::gatt::SERVICE_UUID
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x4fafc201_1fb5_459e_8fcc_c5c9c331914b);

/// beb5483e-36e1-4688-b7f5-ea07361b26a8, see proxi_proto::gatt::CHARACTERISTIC_UUID
pub const CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0xbeb5483e_36e1_4688_b7f5_ea07361b26a8);

fn backend(e: btleplug::Error) -> TransportError {
    TransportError::Backend(Box::new(e))
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, TransportError> {
    let manager = Manager::new().await.map_err(backend)?;
    let adapters = manager.adapters().await.map_err(backend)?;
    adapters.into_iter().next().ok_or(TransportError::NoAdapter)
}

pub fn candidate(peripheral: &Peripheral, props: PeripheralProperties) -> Candidate {
    Candidate {
        address: peripheral.address().to_string(),
        name: props.local_name,
        rssi: props.rssi,
    }
}

struct Link {
    peripheral: Peripheral,
    characteristic: Characteristic,
    notify_task: Option<JoinHandle<()>>,
}

pub struct BtleCentral {
    adapter: Adapter,
    events: mpsc::Sender<ClientEvent>,
    scanning: Arc<AtomicBool>,
    connected_id: Arc<Mutex<Option<PeripheralId>>>,
    link: Option<Link>,
    // peripheral of a connect still in flight; survives the future being dropped
    pending: Option<Peripheral>,
    adapter_task: JoinHandle<()>,
}

impl BtleCentral {
    /// Open the first adapter and start forwarding its events
    pub async fn new(events: mpsc::Sender<ClientEvent>) -> Result<Self, TransportError> {
        let adapter = get_adapter().await?;
        let scanning = Arc::new(AtomicBool::new(false));
        let connected_id = Arc::new(Mutex::new(None));

        let stream = adapter.events().await.map_err(backend)?;
        let adapter_task = tokio::spawn(forward_adapter_events(
            adapter.clone(),
            stream,
            events.clone(),
            scanning.clone(),
            connected_id.clone(),
        ));

        Ok(Self {
            adapter,
            events,
            scanning,
            connected_id,
            link: None,
            pending: None,
            adapter_task,
        })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, TransportError> {
        let peripherals = self.adapter.peripherals().await.map_err(backend)?;
        peripherals
            .into_iter()
            .find(|p| p.address().to_string() == address)
            .ok_or_else(|| TransportError::PeerNotFound(address.to_string()))
    }

    async fn open_link(&self, peripheral: &Peripheral) -> Result<Link, TransportError> {
        peripheral.discover_services().await.map_err(backend)?;

        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == CHARACTERISTIC_UUID)
            .ok_or(TransportError::CharacteristicNotFound)?;

        let notify_task = if characteristic.properties.contains(CharPropFlags::NOTIFY) {
            peripheral.subscribe(&characteristic).await.map_err(backend)?;
            let stream = peripheral.notifications().await.map_err(backend)?;
            Some(tokio::spawn(forward_notifications(stream, self.events.clone())))
        } else {
            warn!("Characteristic cannot notify, verdicts will not arrive");
            None
        };

        Ok(Link {
            peripheral: peripheral.clone(),
            characteristic,
            notify_task,
        })
    }

    fn drop_link(&mut self) -> Option<Peripheral> {
        *self.connected_id.lock().unwrap_or_else(|e| e.into_inner()) = None;
        let link = self.link.take()?;
        if let Some(task) = link.notify_task {
            task.abort();
        }
        Some(link.peripheral)
    }
}

impl Drop for BtleCentral {
    fn drop(&mut self) {
        self.adapter_task.abort();
        if let Some(task) = self.link.as_mut().and_then(|l| l.notify_task.take()) {
            task.abort();
        }
    }
}

impl Central for BtleCentral {
    async fn start_scan(&mut self) -> Result<(), TransportError> {
        self.scanning.store(true, Ordering::SeqCst);
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)
    }

    async fn stop_scan(&mut self) -> Result<(), TransportError> {
        self.scanning.store(false, Ordering::SeqCst);
        self.adapter.stop_scan().await.map_err(backend)
    }

    async fn connect(&mut self, candidate: &Candidate) -> Result<(), TransportError> {
        let peripheral = self.find_peripheral(&candidate.address).await?;
        self.pending = Some(peripheral.clone());
        peripheral.connect().await.map_err(backend)?;

        match self.open_link(&peripheral).await {
            Ok(link) => {
                *self.connected_id.lock().unwrap_or_else(|e| e.into_inner()) = Some(peripheral.id());
                self.link = Some(link);
                self.pending = None;
                Ok(())
            }
            Err(e) => {
                self.pending = None;
                let _ = peripheral.disconnect().await;
                Err(e)
            }
        }
    }

    async fn request_mtu(&mut self, mtu: u16) -> Result<u16, TransportError> {
        // btleplug has no MTU call; the platform stack runs the exchange
        // itself when the link comes up.
        debug!(mtu, "MTU exchange left to the platform");
        Ok(mtu)
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        let props = link.characteristic.properties;
        let write_type = if props.contains(CharPropFlags::WRITE) {
            WriteType::WithResponse
        } else if props.contains(CharPropFlags::WRITE_WITHOUT_RESPONSE) {
            WriteType::WithoutResponse
        } else {
            return Err(TransportError::WriteUnsupported);
        };

        link.peripheral
            .write(&link.characteristic, payload, write_type)
            .await
            .map_err(backend)
    }

    async fn signal_strength(&mut self) -> Result<i16, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        let props = link.peripheral.properties().await.map_err(backend)?;
        props
            .and_then(|p| p.rssi)
            .ok_or(TransportError::SignalUnavailable)
    }

    async fn is_connected(&mut self) -> bool {
        match &self.link {
            Some(link) => link.peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let pending = self.pending.take();
        let Some(peripheral) = self.drop_link().or(pending) else {
            return Ok(());
        };
        if peripheral.is_connected().await.unwrap_or(false) {
            peripheral.disconnect().await.map_err(backend)?;
        }
        info!("Link released");
        Ok(())
    }
}

async fn forward_adapter_events(
    adapter: Adapter,
    mut stream: std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>,
    events: mpsc::Sender<ClientEvent>,
    scanning: Arc<AtomicBool>,
    connected_id: Arc<Mutex<Option<PeripheralId>>>,
) {
    while let Some(event) = stream.next().await {
        let forwarded = match event {
            CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                if !scanning.load(Ordering::SeqCst) {
                    continue;
                }
                let Ok(peripheral) = adapter.peripheral(&id).await else {
                    continue;
                };
                match peripheral.properties().await {
                    Ok(Some(props)) => ClientEvent::AdvertisementSeen(candidate(&peripheral, props)),
                    _ => continue,
                }
            }
            CentralEvent::DeviceDisconnected(id) => {
                let ours = connected_id
                    .lock()
                    .map(|current| current.as_ref() == Some(&id))
                    .unwrap_or(false);
                if !ours {
                    continue;
                }
                ClientEvent::Disconnected
            }
            _ => continue,
        };

        if events.send(forwarded).await.is_err() {
            break;
        }
    }
    debug!("Adapter event stream ended");
}

async fn forward_notifications(
    mut stream: std::pin::Pin<Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>>,
    events: mpsc::Sender<ClientEvent>,
) {
    while let Some(notification) = stream.next().await {
        if notification.uuid != CHARACTERISTIC_UUID {
            continue;
        }
        if events
            .send(ClientEvent::Notification(notification.value))
            .await
            .is_err()
        {
            break;
        }
    }
}
