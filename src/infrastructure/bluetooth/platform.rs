//! Platform Collaborators
//!
//! Seams between the peripheral session and the BLE stack. The session only
//! sees these traits, so it can be driven by the btleplug backend at runtime
//! and by in-memory fakes in tests.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Opaque identifier of a peripheral, stable for the lifetime of the process.
pub type PeripheralId = String;

/// Generation of a connection, assigned by the session on every connect.
///
/// Reconnecting to the same peripheral yields a new id, so events raised
/// by the teardown of an earlier link can be told apart from the live one.
pub type LinkId = u64;

/// Asynchronous signals raised by the platform, independent of caller action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// The notify characteristic delivered a value.
    Notification {
        peripheral: PeripheralId,
        link: LinkId,
        value: Vec<u8>,
    },
    /// The platform lost the connection to a peripheral.
    Disconnected {
        peripheral: PeripheralId,
        link: LinkId,
    },
}

/// One alternative of a device filter. All set fields must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterRule {
    pub services: Vec<Uuid>,
    pub name_prefix: Option<String>,
}

impl FilterRule {
    pub fn service(uuid: Uuid) -> Self {
        Self {
            services: vec![uuid],
            name_prefix: None,
        }
    }

    pub fn name_prefix(prefix: impl Into<String>) -> Self {
        Self {
            services: Vec::new(),
            name_prefix: Some(prefix.into()),
        }
    }

    fn matches(&self, name: Option<&str>, advertised: &[Uuid]) -> bool {
        let name_ok = match &self.name_prefix {
            Some(prefix) => name.is_some_and(|n| n.starts_with(prefix.as_str())),
            None => true,
        };
        let services_ok = self.services.iter().all(|s| advertised.contains(s));
        name_ok && services_ok
    }
}

/// Device selection criteria.
///
/// A device is offered if it matches any rule, or unconditionally when
/// `accept_all` is set. `optional_services` must remain reachable after
/// pairing even when no rule mentions them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub rules: Vec<FilterRule>,
    pub accept_all: bool,
    pub optional_services: Vec<Uuid>,
}

impl DeviceFilter {
    /// Filter for a UART peripheral: name prefix OR advertised service.
    pub fn for_service(service: Uuid, name_prefix: Option<&str>, accept_all: bool) -> Self {
        let mut rules = Vec::new();
        if let Some(prefix) = name_prefix {
            rules.push(FilterRule::name_prefix(prefix));
        }
        rules.push(FilterRule::service(service));

        Self {
            rules,
            accept_all,
            optional_services: vec![service],
        }
    }

    pub fn matches(&self, name: Option<&str>, advertised: &[Uuid]) -> bool {
        self.accept_all || self.rules.iter().any(|r| r.matches(name, advertised))
    }

    /// Services that a platform-level scan filter may safely require.
    ///
    /// Empty when any rule can match without a service, since most stacks
    /// treat the scan filter as mandatory.
    pub fn scan_services(&self) -> Vec<Uuid> {
        if self.accept_all || self.rules.iter().any(|r| r.services.is_empty()) {
            return Vec::new();
        }
        let mut services: Vec<Uuid> = self
            .rules
            .iter()
            .flat_map(|r| r.services.iter().copied())
            .collect();
        services.sort();
        services.dedup();
        services
    }
}

/// A peripheral picked by the scanner.
#[derive(Debug, Clone)]
pub struct SelectedDevice<D> {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub handle: D,
}

impl<D> SelectedDevice<D> {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Asks the platform (or user) to pick a peripheral.
#[async_trait]
pub trait DeviceScanner: Send + Sync {
    type Device: Send + Sync;

    /// Whether a BLE radio can be used at all.
    async fn is_available(&self) -> Result<()>;

    /// `Ok(None)` when nothing was chosen; `Err` when the scan itself failed.
    async fn request_device(
        &self,
        filter: &DeviceFilter,
    ) -> Result<Option<SelectedDevice<Self::Device>>>;
}

/// GATT transport, including the notification and write channels.
#[async_trait]
pub trait GattTransport: Send + Sync {
    type Device: Send + Sync;
    type Connection: Send + Sync;
    type Service: Send + Sync;
    type Characteristic: Send + Sync;

    /// Open a connection. Events raised for it carry `link`.
    async fn connect(&self, device: &Self::Device, link: LinkId) -> Result<Self::Connection>;

    async fn disconnect(&self, connection: &Self::Connection) -> Result<()>;

    async fn get_service(
        &self,
        connection: &Self::Connection,
        service: Uuid,
    ) -> Result<Self::Service>;

    async fn get_characteristic(
        &self,
        service: &Self::Service,
        characteristic: Uuid,
    ) -> Result<Self::Characteristic>;

    /// Start notifications; values arrive as [`PlatformEvent::Notification`].
    async fn subscribe(
        &self,
        connection: &Self::Connection,
        characteristic: &Self::Characteristic,
    ) -> Result<()>;

    async fn unsubscribe(
        &self,
        connection: &Self::Connection,
        characteristic: &Self::Characteristic,
    ) -> Result<()>;

    /// Write a value and wait for the write to complete.
    async fn write(
        &self,
        connection: &Self::Connection,
        characteristic: &Self::Characteristic,
        value: &[u8],
    ) -> Result<()>;
}
