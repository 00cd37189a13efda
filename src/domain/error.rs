use std::fmt;
use thiserror::Error;

/// Step of the connection sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    Scan,
    Connect,
    ResolveService,
    ResolveWriteCharacteristic,
    ResolveNotifyCharacteristic,
    Subscribe,
}

impl fmt::Display for SetupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scan => "Device scan",
            Self::Connect => "GATT connect",
            Self::ResolveService => "UART service lookup",
            Self::ResolveWriteCharacteristic => "write characteristic lookup",
            Self::ResolveNotifyCharacteristic => "notify characteristic lookup",
            Self::Subscribe => "notification subscription",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by [`PeripheralSession`](crate::domain::session::PeripheralSession).
///
/// Every variant leaves the session `Disconnected`; none is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Bluetooth is not available: {0}")]
    CapabilityUnavailable(String),

    #[error("Device selection cancelled: {0}")]
    SelectionCancelled(String),

    #[error("{step} failed: {reason}")]
    TransportFailure { step: SetupStep, reason: String },

    #[error("Not connected to a device")]
    NotConnected,

    #[error("Failed to send command: {0}")]
    WriteFailure(String),
}

impl SessionError {
    pub(crate) fn transport(step: SetupStep, err: anyhow::Error) -> Self {
        Self::TransportFailure {
            step,
            reason: format!("{:#}", err),
        }
    }
}
