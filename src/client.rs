use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::controller::{MachineController, ProfileSlot};
use crate::dispatcher::MachineCommand;
use crate::error::{CommandError, TransportError, UploadError};
use crate::protocol::{SHOT_SAMPLE_CHARACTERISTIC, STATE_INFO_CHARACTERISTIC};
use crate::transport::Transport;
use crate::types::{MachineEvent, NotificationKind, Profile, RawNotification};

// ── De1Device ─────────────────────────────────────────────────────────────────

/// A machine discovered during a BLE scan.
///
/// Returned by [`De1Client::scan_all`]; pass to [`De1Client::connect_to`].
#[derive(Clone, Debug)]
pub struct De1Device {
    /// Advertised device name (e.g. `"DE1"`).
    pub name: String,
    /// Platform BLE identifier.
    /// • macOS / Windows — a UUID string
    /// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub id: String,
    pub(crate) peripheral: Peripheral,
    /// Kept so the disconnect watcher listens on the adapter that found the
    /// device.
    pub(crate) adapter: Adapter,
}

// ── De1ClientConfig ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct De1ClientConfig {
    /// BLE scan duration in seconds before giving up. Default: `15`.
    pub scan_timeout_secs: u64,
    /// Match devices whose advertised name starts with this string.
    /// Default: `"DE1"`.
    pub name_prefix: String,
    /// Hard limit on `connect()` and on service discovery. Default: `10`.
    pub connect_timeout_secs: u64,
    /// Capacity of the bounded event channel.  When full, the notification
    /// pump waits, which leaves buffering to the BLE stack. Default: `256`.
    pub event_buffer: usize,
}

impl Default for De1ClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 15,
            name_prefix: "DE1".into(),
            connect_timeout_secs: 10,
            event_buffer: 256,
        }
    }
}

// ── BleTransport ──────────────────────────────────────────────────────────────

/// [`Transport`] over a connected btleplug peripheral.
pub struct BleTransport {
    peripheral: Peripheral,
    chars: BTreeSet<Characteristic>,
}

impl BleTransport {
    fn find_char(&self, uuid: Uuid) -> Result<&Characteristic, TransportError> {
        self.chars
            .iter()
            .find(|c| c.uuid == uuid)
            .ok_or(TransportError::CharacteristicNotFound(uuid))
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for BleTransport {
    async fn write_characteristic(&self, id: Uuid, bytes: &[u8]) -> Result<(), TransportError> {
        let c = self.find_char(id)?;
        if !self.is_connected().await {
            return Err(TransportError::NotConnected);
        }
        // WithResponse: the call returns only once the peripheral has
        // acknowledged the write.
        self.peripheral
            .write(c, bytes, WriteType::WithResponse)
            .await
            .map_err(|e| TransportError::Write {
                characteristic: id,
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, id: Uuid) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
        let c = self.find_char(id)?;
        let sub_err = |e: btleplug::Error| TransportError::Subscribe {
            characteristic: id,
            reason: e.to_string(),
        };
        self.peripheral.subscribe(c).await.map_err(sub_err)?;
        let notifications = self.peripheral.notifications().await.map_err(sub_err)?;
        Ok(notifications
            .filter(move |n| futures::future::ready(n.uuid == id))
            .map(|n| n.value)
            .boxed())
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }
}

// ── De1Client ─────────────────────────────────────────────────────────────────

/// BLE client for DE1 espresso machines.
///
/// Handles scanning, connecting, GATT subscription and the notification
/// pump.  The pump forwards raw StateInfo and ShotSample values, stamped with
/// their arrival time, into a bounded channel; decoding and recording happen
/// in the consumer (see [`crate::session::ShotSession`]).
pub struct De1Client {
    config: De1ClientConfig,
}

impl De1Client {
    pub fn new(config: De1ClientConfig) -> Self {
        Self { config }
    }

    async fn first_adapter() -> Result<Adapter> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;

        // macOS: CBCentralManager silently ignores scans until it reports
        // poweredOn.
        #[cfg(target_os = "macos")]
        {
            use btleplug::api::CentralState;

            let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
            loop {
                match adapter.adapter_state().await {
                    Ok(CentralState::PoweredOn) => break,
                    Ok(state) if tokio::time::Instant::now() >= deadline => {
                        warn!("macOS: adapter still {state:?} after 3 s, proceeding anyway");
                        break;
                    }
                    Ok(state) => debug!("macOS: adapter state = {state:?}, waiting…"),
                    Err(e) => {
                        warn!("macOS: adapter_state() error: {e}");
                        break;
                    }
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
        }

        Ok(adapter)
    }

    // ── Public: scan ─────────────────────────────────────────────────────────

    /// Scan for `config.scan_timeout_secs` and return every matching machine.
    pub async fn scan_all(&self) -> Result<Vec<De1Device>> {
        let adapter = Self::first_adapter().await?;

        info!("scan_all: scanning for {} s …", self.config.scan_timeout_secs);
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs)).await;
        adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in adapter.peripherals().await? {
            if let Ok(Some(props)) = p.properties().await {
                if let Some(name) = props.local_name {
                    if name.starts_with(&self.config.name_prefix) {
                        let id = p.id().to_string();
                        info!("scan_all: found {name}  id={id}");
                        found.push(De1Device {
                            name,
                            id,
                            peripheral: p,
                            adapter: adapter.clone(),
                        });
                    }
                }
            }
        }
        info!("scan_all: {} device(s) found", found.len());
        Ok(found)
    }

    // ── Public: connect ──────────────────────────────────────────────────────

    /// Connect to a device returned by [`De1Client::scan_all`].
    pub async fn connect_to(
        &self,
        device: De1Device,
    ) -> Result<(mpsc::Receiver<MachineEvent>, De1Handle)> {
        self.setup_peripheral(device.peripheral, device.name, device.adapter)
            .await
    }

    /// Connect to the first machine found.
    pub async fn connect(&self) -> Result<(mpsc::Receiver<MachineEvent>, De1Handle)> {
        let adapter = Self::first_adapter().await?;

        info!(
            "Scanning for DE1 machines (timeout: {} s) …",
            self.config.scan_timeout_secs
        );
        adapter.start_scan(ScanFilter::default()).await?;
        let peripheral = self.find_first(&adapter).await?;
        adapter.stop_scan().await.ok();

        let props = peripheral.properties().await?.unwrap_or_default();
        let device_name = props.local_name.unwrap_or_else(|| "Unknown".into());
        info!("Found device: {device_name}");

        self.setup_peripheral(peripheral, device_name, adapter).await
    }

    // ── Private ──────────────────────────────────────────────────────────────

    async fn setup_peripheral(
        &self,
        peripheral: Peripheral,
        device_name: String,
        adapter: Adapter,
    ) -> Result<(mpsc::Receiver<MachineEvent>, De1Handle)> {
        let limit = Duration::from_secs(self.config.connect_timeout_secs);

        // BlueZ's Device1.Connect can block forever on a device that went
        // out of range.
        tokio::time::timeout(limit, peripheral.connect())
            .await
            .map_err(|_| anyhow!("BLE connect() timed out after {limit:?}"))??;

        // BlueZ reports the link up before the remote GATT cache is filled.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(limit, peripheral.discover_services())
            .await
            .map_err(|_| anyhow!("discover_services() timed out after {limit:?}"))??;
        info!("Connected and services discovered: {device_name}");

        let transport = Arc::new(BleTransport {
            chars: peripheral.characteristics(),
            peripheral: peripheral.clone(),
        });

        let (tx, rx) = mpsc::channel::<MachineEvent>(self.config.event_buffer);
        let _ = tx.send(MachineEvent::Connected(device_name.clone())).await;

        // ── Disconnect watcher ───────────────────────────────────────────────
        let disconnect_tx = tx.clone();
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("Disconnect watcher: device {id:?} disconnected.");
                                let _ = disconnect_tx.send(MachineEvent::Disconnected).await;
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("Disconnect watcher: could not subscribe to adapter events: {e}"),
            }
        });

        // ── Notification pump ────────────────────────────────────────────────
        let states = transport
            .subscribe(STATE_INFO_CHARACTERISTIC)
            .await?
            .map(|v| (NotificationKind::State, v));
        let samples = transport
            .subscribe(SHOT_SAMPLE_CHARACTERISTIC)
            .await?
            .map(|v| (NotificationKind::Sample, v));

        tokio::spawn(async move {
            let mut merged = stream::select(states, samples);
            let mut count: u64 = 0;
            info!("Notification stream subscribed, waiting for data…");

            while let Some((kind, value)) = merged.next().await {
                count += 1;
                if count <= 5 || count % 500 == 0 {
                    debug!("notif #{count} {kind:?} len={}", value.len());
                }
                let event = MachineEvent::Notification(RawNotification::new(kind, value));
                if tx.send(event).await.is_err() {
                    debug!("event receiver dropped, stopping pump");
                    return;
                }
            }

            info!("Notification stream ended – device disconnected.");
            let _ = tx.send(MachineEvent::Disconnected).await;
        });

        let handle = De1Handle {
            controller: MachineController::new(Arc::clone(&transport)),
            transport,
        };
        Ok((rx, handle))
    }

    /// Poll until the first matching peripheral appears or the scan times out.
    async fn find_first(&self, adapter: &Adapter) -> Result<Peripheral> {
        use tokio::time::{sleep, timeout};

        let prefix = &self.config.name_prefix;
        let timeout_secs = self.config.scan_timeout_secs;
        let result = timeout(Duration::from_secs(timeout_secs), async {
            loop {
                let peripherals = adapter.peripherals().await.unwrap_or_default();
                for p in peripherals {
                    if let Ok(Some(props)) = p.properties().await {
                        if let Some(name) = &props.local_name {
                            if name.starts_with(prefix.as_str()) {
                                return p;
                            }
                        }
                    }
                }
                sleep(Duration::from_millis(250)).await;
            }
        })
        .await;

        result.map_err(|_| anyhow!("Timed out scanning for a DE1 after {timeout_secs} s"))
    }
}

// ── De1Handle ─────────────────────────────────────────────────────────────────

/// A handle to a connected machine for sending commands and profiles.
pub struct De1Handle {
    transport: Arc<BleTransport>,
    controller: MachineController<Arc<BleTransport>>,
}

impl De1Handle {
    pub async fn send(&self, cmd: MachineCommand) -> Result<(), CommandError> {
        self.controller.send(cmd).await
    }

    /// Start an espresso with whatever profile the machine holds.
    ///
    /// Refused after an incomplete [`upload_profile`](Self::upload_profile).
    pub async fn start_espresso(&self) -> Result<(), CommandError> {
        self.send(MachineCommand::StartEspresso).await
    }

    pub async fn stop(&self) -> Result<(), CommandError> {
        self.send(MachineCommand::Stop).await
    }

    pub async fn upload_profile(&self, profile: &Profile) -> Result<(), UploadError> {
        self.controller.upload(profile).await
    }

    pub fn profile_slot(&self) -> ProfileSlot {
        self.controller.profile_slot()
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.is_connected().await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await
    }
}
