//! BLE Connection Module
//!
//! GATT transport on top of btleplug: connection, service and
//! characteristic lookup, notification forwarding and writes.

use crate::infrastructure::bluetooth::platform::{GattTransport, LinkId, PlatformEvent};
use crate::infrastructure::bluetooth::scanner::{peripheral_key, BleAdapter};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Characteristic, Peripheral as _, Service, WriteType};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// An open connection and the link it was opened for.
pub struct BleLink {
    peripheral: Peripheral,
    link: LinkId,
}

/// BLE GATT transport
pub struct BleConnection {
    adapter: Arc<BleAdapter>,
    notification_task: Mutex<Option<JoinHandle<()>>>,
}

impl BleConnection {
    pub fn new(adapter: Arc<BleAdapter>) -> Self {
        Self {
            adapter,
            notification_task: Mutex::new(None),
        }
    }

    fn replace_notification_task(&self, task: Option<JoinHandle<()>>) {
        if let Ok(mut slot) = self.notification_task.lock() {
            if let Some(previous) = slot.take() {
                previous.abort();
            }
            *slot = task;
        }
    }
}

/// Prefer acknowledged writes so completion means the device received it.
fn write_type_for(characteristic: &Characteristic) -> WriteType {
    if characteristic.properties.contains(CharPropFlags::WRITE) {
        WriteType::WithResponse
    } else {
        WriteType::WithoutResponse
    }
}

#[async_trait]
impl GattTransport for BleConnection {
    type Device = Peripheral;
    type Connection = BleLink;
    type Service = Service;
    type Characteristic = Characteristic;

    async fn connect(&self, device: &Peripheral, link: LinkId) -> Result<BleLink> {
        if !device.is_connected().await? {
            device.connect().await?;
        }
        info!("GATT connected to {:?} (link {})", device.id(), link);

        device.discover_services().await?;
        debug!("Discovered {} services", device.services().len());

        self.adapter
            .links()
            .register(peripheral_key(&device.id()), link);

        Ok(BleLink {
            peripheral: device.clone(),
            link,
        })
    }

    async fn disconnect(&self, connection: &BleLink) -> Result<()> {
        self.replace_notification_task(None);
        self.adapter
            .links()
            .release(&peripheral_key(&connection.peripheral.id()), connection.link);
        if connection.peripheral.is_connected().await? {
            connection.peripheral.disconnect().await?;
        }
        Ok(())
    }

    async fn get_service(&self, connection: &BleLink, service: Uuid) -> Result<Service> {
        connection
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == service)
            .ok_or_else(|| anyhow!("Service {} not found", service))
    }

    async fn get_characteristic(
        &self,
        service: &Service,
        characteristic: Uuid,
    ) -> Result<Characteristic> {
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == characteristic)
            .cloned()
            .ok_or_else(|| anyhow!("Characteristic {} not found", characteristic))
    }

    async fn subscribe(
        &self,
        connection: &BleLink,
        characteristic: &Characteristic,
    ) -> Result<()> {
        if !characteristic
            .properties
            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
        {
            return Err(anyhow!(
                "Characteristic {} does not support notifications",
                characteristic.uuid
            ));
        }

        let mut stream = connection.peripheral.notifications().await?;
        connection.peripheral.subscribe(characteristic).await?;

        let peripheral = peripheral_key(&connection.peripheral.id());
        let link = connection.link;
        let uuid = characteristic.uuid;
        let sender = self.adapter.event_sender().clone();

        let task = tokio::spawn(async move {
            while let Some(data) = stream.next().await {
                if data.uuid != uuid {
                    continue;
                }
                let event = PlatformEvent::Notification {
                    peripheral: peripheral.clone(),
                    link,
                    value: data.value,
                };
                if sender.send(event).is_err() {
                    break;
                }
            }
            debug!("Notification stream for {} ended", peripheral);
        });
        self.replace_notification_task(Some(task));

        Ok(())
    }

    async fn unsubscribe(
        &self,
        connection: &BleLink,
        characteristic: &Characteristic,
    ) -> Result<()> {
        self.replace_notification_task(None);
        connection.peripheral.unsubscribe(characteristic).await?;
        Ok(())
    }

    async fn write(
        &self,
        connection: &BleLink,
        characteristic: &Characteristic,
        value: &[u8],
    ) -> Result<()> {
        connection
            .peripheral
            .write(characteristic, value, write_type_for(characteristic))
            .await?;
        Ok(())
    }
}
