//! In-memory platform collaborators for tests.

use crate::domain::models::AppEvent;
use crate::domain::session::PeripheralSession;
use crate::infrastructure::bluetooth::platform::{
    DeviceFilter, DeviceScanner, GattTransport, LinkId, PlatformEvent, SelectedDevice,
};
use crate::infrastructure::bluetooth::protocol::{self, UartProfile};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

pub(crate) const DEVICE_ID: &str = "AA:BB:CC:DD:EE:01";

/// Which collaborator call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fail {
    Unavailable,
    Scan,
    Select,
    Connect,
    Service,
    WriteChar,
    NotifyChar,
    Subscribe,
    Write,
}

#[derive(Default)]
pub(crate) struct Recorder {
    pub fail: Option<Fail>,
    pub next_device: String,
    pub connects: Vec<String>,
    pub links: Vec<LinkId>,
    pub disconnects: Vec<String>,
    pub writes: Vec<Vec<u8>>,
    pub subscribed: Vec<Uuid>,
    /// When set, closing a connection raises `PlatformEvent::Disconnected`
    /// for it, as the adapter does for a real peripheral.
    pub platform: Option<mpsc::UnboundedSender<PlatformEvent>>,
}

/// Connection handed out by [`FakeTransport`].
pub(crate) struct FakeLink {
    pub device: String,
    pub link: LinkId,
}

pub(crate) type Shared = Arc<Mutex<Recorder>>;

pub(crate) struct FakeScanner(pub Shared);
pub(crate) struct FakeTransport(pub Shared);

#[async_trait]
impl DeviceScanner for FakeScanner {
    type Device = String;

    async fn is_available(&self) -> Result<()> {
        if self.0.lock().unwrap().fail == Some(Fail::Unavailable) {
            bail!("no adapter");
        }
        Ok(())
    }

    async fn request_device(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Option<SelectedDevice<String>>> {
        assert!(filter.optional_services.contains(&protocol::UART_SERVICE));
        let rec = self.0.lock().unwrap();
        match rec.fail {
            Some(Fail::Scan) => bail!("adapter refused to start scanning"),
            Some(Fail::Select) => return Ok(None),
            _ => {}
        }
        Ok(Some(SelectedDevice {
            id: rec.next_device.clone(),
            name: Some("BBC micro:bit [test]".to_string()),
            handle: rec.next_device.clone(),
        }))
    }
}

#[async_trait]
impl GattTransport for FakeTransport {
    type Device = String;
    type Connection = FakeLink;
    type Service = Uuid;
    type Characteristic = Uuid;

    async fn connect(&self, device: &String, link: LinkId) -> Result<FakeLink> {
        let mut rec = self.0.lock().unwrap();
        if rec.fail == Some(Fail::Connect) {
            bail!("gatt connect timed out");
        }
        rec.connects.push(device.clone());
        rec.links.push(link);
        Ok(FakeLink {
            device: device.clone(),
            link,
        })
    }

    async fn disconnect(&self, connection: &FakeLink) -> Result<()> {
        let mut rec = self.0.lock().unwrap();
        rec.disconnects.push(connection.device.clone());
        if let Some(platform) = &rec.platform {
            let _ = platform.send(PlatformEvent::Disconnected {
                peripheral: connection.device.clone(),
                link: connection.link,
            });
        }
        Ok(())
    }

    async fn get_service(&self, _connection: &FakeLink, service: Uuid) -> Result<Uuid> {
        if self.0.lock().unwrap().fail == Some(Fail::Service) {
            bail!("service not found");
        }
        Ok(service)
    }

    async fn get_characteristic(&self, _service: &Uuid, characteristic: Uuid) -> Result<Uuid> {
        let fail = self.0.lock().unwrap().fail;
        match fail {
            Some(Fail::WriteChar) if characteristic == protocol::UART_WRITE_CHAR => {
                Err(anyhow!("write characteristic missing"))
            }
            Some(Fail::NotifyChar) if characteristic == protocol::UART_NOTIFY_CHAR => {
                Err(anyhow!("notify characteristic missing"))
            }
            _ => Ok(characteristic),
        }
    }

    async fn subscribe(&self, _connection: &FakeLink, characteristic: &Uuid) -> Result<()> {
        let mut rec = self.0.lock().unwrap();
        if rec.fail == Some(Fail::Subscribe) {
            bail!("cccd write rejected");
        }
        rec.subscribed.push(*characteristic);
        Ok(())
    }

    async fn unsubscribe(&self, _connection: &FakeLink, characteristic: &Uuid) -> Result<()> {
        self.0.lock().unwrap().subscribed.retain(|c| c != characteristic);
        Ok(())
    }

    async fn write(
        &self,
        _connection: &FakeLink,
        characteristic: &Uuid,
        value: &[u8],
    ) -> Result<()> {
        let mut rec = self.0.lock().unwrap();
        assert_eq!(*characteristic, protocol::UART_WRITE_CHAR);
        if rec.fail == Some(Fail::Write) {
            bail!("link severed");
        }
        rec.writes.push(value.to_vec());
        Ok(())
    }
}

pub(crate) fn fake_session() -> (
    PeripheralSession<FakeScanner, FakeTransport>,
    Shared,
    mpsc::UnboundedReceiver<AppEvent>,
) {
    let shared: Shared = Arc::new(Mutex::new(Recorder {
        next_device: DEVICE_ID.to_string(),
        ..Default::default()
    }));
    let (tx, rx) = mpsc::unbounded_channel();
    let filter = DeviceFilter::for_service(protocol::UART_SERVICE, Some("BBC micro:bit"), false);
    let session = PeripheralSession::new(
        FakeScanner(shared.clone()),
        FakeTransport(shared.clone()),
        UartProfile::default(),
        filter,
        tx,
    );
    (session, shared, rx)
}

pub(crate) fn set_fail(shared: &Shared, fail: Option<Fail>) {
    shared.lock().unwrap().fail = fail;
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<AppEvent>) -> Vec<AppEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
