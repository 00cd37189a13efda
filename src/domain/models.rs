use std::fmt;

/// Connection lifecycle of the peripheral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Last LED state reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedState {
    On,
    Off,
    Unknown,
}

/// Events published by the bluetooth worker for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    ConnectionState(ConnectionState),
    LedState(LedState),
    /// Trimmed text received from the device.
    Inbound(String),
    /// Command text that was written to the device (without terminator).
    Outbound(String),
    LogMessage(StatusMessage),
}

/// Requests from the presentation layer to the bluetooth worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BluetoothCommand {
    Connect,
    Disconnect,
    Send(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
