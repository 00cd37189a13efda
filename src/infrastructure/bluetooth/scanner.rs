//! BLE Scanner Module
//!
//! Emulates a device chooser on top of btleplug: scans for a short window
//! and selects the first peripheral accepted by the [`DeviceFilter`].

use crate::infrastructure::bluetooth::platform::{
    DeviceFilter, DeviceScanner, LinkId, PeripheralId, PlatformEvent, SelectedDevice,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info, warn};

/// Poll interval while waiting for advertisements
const SCAN_POLL_MS: u64 = 100;

/// Key used for a peripheral in [`PlatformEvent`]s.
pub fn peripheral_key(id: &btleplug::platform::PeripheralId) -> PeripheralId {
    format!("{:?}", id)
}

/// Live links by peripheral. Only peripherals present here have their
/// adapter-level disconnects forwarded.
#[derive(Default)]
pub struct LinkRegistry(Mutex<HashMap<PeripheralId, LinkId>>);

impl LinkRegistry {
    pub fn register(&self, peripheral: PeripheralId, link: LinkId) {
        if let Ok(mut links) = self.0.lock() {
            links.insert(peripheral, link);
        }
    }

    /// Forget `link`. A newer link for the same peripheral is kept.
    pub fn release(&self, peripheral: &str, link: LinkId) {
        if let Ok(mut links) = self.0.lock() {
            if links.get(peripheral) == Some(&link) {
                links.remove(peripheral);
            }
        }
    }

    /// Remove and return the live link of a peripheral that went away.
    pub fn take(&self, peripheral: &str) -> Option<LinkId> {
        self.0.lock().ok()?.remove(peripheral)
    }
}

fn no_match_message(scan_window: Duration) -> String {
    format!(
        "No matching device found within {} ms",
        scan_window.as_millis()
    )
}

/// Lazily opened Bluetooth adapter shared by the scanner and the transport.
pub struct BleAdapter {
    adapter: OnceCell<Adapter>,
    event_sender: mpsc::UnboundedSender<PlatformEvent>,
    links: Arc<LinkRegistry>,
}

impl BleAdapter {
    pub fn new(event_sender: mpsc::UnboundedSender<PlatformEvent>) -> Self {
        Self {
            adapter: OnceCell::new(),
            event_sender,
            links: Arc::new(LinkRegistry::default()),
        }
    }

    pub fn event_sender(&self) -> &mpsc::UnboundedSender<PlatformEvent> {
        &self.event_sender
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// First adapter of the system. Opened on first use so that a missing
    /// radio is reported by `connect()` rather than at startup.
    pub async fn get(&self) -> Result<&Adapter> {
        self.adapter
            .get_or_try_init(|| async {
                let manager = Manager::new().await?;
                let adapter = manager
                    .adapters()
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("No Bluetooth adapters found"))?;
                info!("Using Bluetooth adapter: {}", adapter.adapter_info().await?);
                self.watch_disconnects(&adapter).await?;
                Ok::<_, anyhow::Error>(adapter)
            })
            .await
    }

    async fn watch_disconnects(&self, adapter: &Adapter) -> Result<()> {
        let mut events = adapter.events().await?;
        let sender = self.event_sender.clone();
        let links = self.links.clone();

        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let CentralEvent::DeviceDisconnected(id) = event else {
                    continue;
                };
                let peripheral = peripheral_key(&id);
                // Our own teardown released the link already.
                let Some(link) = links.take(&peripheral) else {
                    debug!("Disconnect of {} has no live link", peripheral);
                    continue;
                };
                debug!("Adapter reported disconnect of {} (link {})", peripheral, link);
                if sender
                    .send(PlatformEvent::Disconnected { peripheral, link })
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(())
    }
}

/// BLE Scanner for UART peripherals
pub struct BleScanner {
    adapter: Arc<BleAdapter>,
    scan_window: Duration,
}

impl BleScanner {
    pub fn new(adapter: Arc<BleAdapter>, scan_window: Duration) -> Self {
        Self {
            adapter,
            scan_window,
        }
    }

    async fn find_matching(
        &self,
        adapter: &Adapter,
        filter: &DeviceFilter,
    ) -> Result<Option<SelectedDevice<Peripheral>>> {
        let start = Instant::now();

        while start.elapsed() < self.scan_window {
            for peripheral in adapter.peripherals().await? {
                let Some(props) = peripheral.properties().await? else {
                    continue;
                };

                if filter.matches(props.local_name.as_deref(), &props.services) {
                    return Ok(Some(SelectedDevice {
                        id: peripheral_key(&peripheral.id()),
                        name: props.local_name,
                        handle: peripheral,
                    }));
                }
            }

            tokio::time::sleep(Duration::from_millis(SCAN_POLL_MS)).await;
        }

        info!("{}", no_match_message(self.scan_window));
        Ok(None)
    }
}

#[async_trait]
impl DeviceScanner for BleScanner {
    type Device = Peripheral;

    async fn is_available(&self) -> Result<()> {
        self.adapter.get().await.map(|_| ())
    }

    async fn request_device(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Option<SelectedDevice<Peripheral>>> {
        let adapter = self.adapter.get().await?;

        let scan_filter = ScanFilter {
            services: filter.scan_services(),
        };
        info!("Starting BLE scan (required services: {:?})", scan_filter.services);
        adapter.start_scan(scan_filter).await?;

        let found = self.find_matching(adapter, filter).await;

        if let Err(e) = adapter.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }
        found
    }
}
