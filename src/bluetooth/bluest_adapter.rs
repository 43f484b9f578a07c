//! [`ControllerAdapter`] on top of the `bluest` BLE stack

use super::{
    matches_signature, ControllerAdapter, ControllerLink, DiscoveredController, LinkError,
    DEFAULT_CONTROLLER_NAME, INPUT_CHARACTERISTIC, NOTIFICATION_BUFFER,
};
use async_trait::async_trait;
use bluest::{Adapter, AdvertisingDevice, Characteristic, Device};
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct BluestAdapter {
    adapter: Adapter,

    discovered: Mutex<LastMatch<Device>>,
}

/// Device found by the most recent scan, looked up by address on connect
struct LastMatch<D> {
    slot: Option<(String, D)>,
}

impl<D: Clone> LastMatch<D> {
    fn new() -> Self {
        Self { slot: None }
    }

    fn clear(&mut self) {
        self.slot = None;
    }

    fn remember(&mut self, address: String, device: D) {
        self.slot = Some((address, device));
    }

    fn get(&self, address: &str) -> Option<D> {
        self.slot
            .as_ref()
            .filter(|(known, _)| known == address)
            .map(|(_, device)| device.clone())
    }
}

impl BluestAdapter {
    /// Opens the default adapter and waits until it is powered on.
    pub async fn open() -> Result<Self, LinkError> {
        let adapter = Adapter::default()
            .await
            .ok_or(LinkError::AdapterUnavailable)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter available");

        Ok(Self {
            adapter,
            discovered: Mutex::new(LastMatch::new()),
        })
    }

    async fn scan_for_controller(&self) -> Result<Option<(DiscoveredController, Device)>, LinkError> {
        let mut scan = self
            .adapter
            .scan(&[])
            .await
            .map_err(|e| LinkError::ScanError(e.to_string()))?;

        while let Some(found) = scan.next().await {
            if let Some(controller) = identify(&found) {
                return Ok(Some((controller, found.device)));
            }
        }

        Ok(None)
    }

    async fn find_input_characteristic(device: &Device) -> Result<Characteristic, LinkError> {
        for service in device.discover_services().await? {
            for characteristic in service.discover_characteristics().await? {
                if characteristic.uuid() == INPUT_CHARACTERISTIC {
                    debug!("Input characteristic found in service {}", service.uuid());
                    return Ok(characteristic);
                }
            }
        }
        Err(LinkError::CharacteristicNotFound(INPUT_CHARACTERISTIC))
    }
}

fn identify(found: &AdvertisingDevice) -> Option<DiscoveredController> {
    let manufacturer = found.adv_data.manufacturer_data.as_ref()?;
    if !matches_signature(&manufacturer.data) {
        return None;
    }

    let name = found
        .adv_data
        .local_name
        .clone()
        .or_else(|| found.device.name().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTROLLER_NAME.to_string());

    Some(DiscoveredController {
        address: format!("{:?}", found.device.id()),
        name,
    })
}

#[async_trait]
impl ControllerAdapter for BluestAdapter {
    async fn discover(&self, timeout: Duration) -> Result<Option<DiscoveredController>, LinkError> {
        info!("Scanning for controller ({} ms)", timeout.as_millis());

        // Nur der Treffer des aktuellen Scans bleibt verbindbar
        self.discovered.lock().await.clear();

        let result = match tokio::time::timeout(timeout, self.scan_for_controller()).await {
            Ok(result) => result?,
            Err(_) => None,
        };

        match result {
            Some((controller, device)) => {
                info!("Found {} at {}", controller.name, controller.address);
                self.discovered
                    .lock()
                    .await
                    .remember(controller.address.clone(), device);
                Ok(Some(controller))
            }
            None => Ok(None),
        }
    }

    async fn connect(
        &self,
        controller: &DiscoveredController,
    ) -> Result<Box<dyn ControllerLink>, LinkError> {
        let device = self
            .discovered
            .lock()
            .await
            .get(&controller.address)
            .ok_or_else(|| LinkError::UnknownDevice(controller.address.clone()))?;

        self.adapter
            .connect_device(&device)
            .await
            .map_err(|e| LinkError::ConnectError(e.to_string()))?;

        let input = match Self::find_input_characteristic(&device).await {
            Ok(input) => input,
            Err(e) => {
                if let Err(e) = self.adapter.disconnect_device(&device).await {
                    warn!("Disconnect after failed discovery: {}", e);
                }
                return Err(e);
            }
        };

        Ok(Box::new(BluestLink {
            adapter: self.adapter.clone(),
            device,
            input,
            pump: None,
        }))
    }
}

/// Open connection; notifications are pumped by a separate task into a queue
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    input: Characteristic,
    pump: Option<JoinHandle<()>>,
}

#[async_trait]
impl ControllerLink for BluestLink {
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, LinkError> {
        let (report_tx, report_rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();
        let characteristic = self.input.clone();

        let pump = tokio::spawn(async move {
            let mut notifications = match characteristic.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(LinkError::SubscribeError(e.to_string())));
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                match notification {
                    Ok(report) => {
                        if report_tx.send(report).await.is_err() {
                            debug!("Report queue closed, stopping notification pump");
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Notification stream failed: {}", e);
                        break;
                    }
                }
            }
        });

        match ready_rx.await {
            Ok(Ok(())) => {
                self.pump = Some(pump);
                Ok(report_rx)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(LinkError::SubscribeError(
                "notification task ended before subscribing".to_string(),
            )),
        }
    }

    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn unsubscribe(&mut self) -> Result<(), LinkError> {
        // Dropping the notify stream ends the subscription
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        if !self.device.is_connected().await {
            return Ok(());
        }
        self.adapter
            .disconnect_device(&self.device)
            .await
            .map_err(|e| LinkError::DisconnectError(e.to_string()))
    }
}

impl Drop for BluestLink {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}
