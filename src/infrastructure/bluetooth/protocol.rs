//! micro:bit UART Protocol
//!
//! This module contains the protocol definitions for talking to the
//! micro:bit firmware over the Nordic UART-like BLE service.
//!
//! Commands are free text, sent as UTF-8 with a single `\n` terminator.
//! Replies arrive as notifications and are treated as one opaque text
//! chunk each; there is no reassembly across notifications.

use crate::domain::models::LedState;
use anyhow::{Context, Result};
use uuid::Uuid;

/// UART service UUID
pub const UART_SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Write characteristic UUID - where commands are sent (device RX)
pub const UART_WRITE_CHAR_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// Notify characteristic UUID - where replies are received (device TX)
pub const UART_NOTIFY_CHAR_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

pub const UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
pub const UART_WRITE_CHAR: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
pub const UART_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// Advertised name prefix of the target board
pub const DEFAULT_NAME_PREFIX: &str = "BBC micro:bit";

/// Commands understood by the reference firmware
pub const REFERENCE_COMMANDS: &[&str] = &["ON", "OFF", "STATUS"];

/// Command terminator
pub const COMMAND_TERMINATOR: char = '\n';

/// Service and characteristic identifiers of the UART link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartProfile {
    pub service: Uuid,
    pub write_char: Uuid,
    pub notify_char: Uuid,
}

impl Default for UartProfile {
    fn default() -> Self {
        Self {
            service: UART_SERVICE,
            write_char: UART_WRITE_CHAR,
            notify_char: UART_NOTIFY_CHAR,
        }
    }
}

impl UartProfile {
    pub fn parse(service: &str, write_char: &str, notify_char: &str) -> Result<Self> {
        Ok(Self {
            service: parse_uuid(service).context("service UUID")?,
            write_char: parse_uuid(write_char).context("write characteristic UUID")?,
            notify_char: parse_uuid(notify_char).context("notify characteristic UUID")?,
        })
    }
}

pub fn parse_uuid(uuid_str: &str) -> Result<Uuid> {
    Uuid::parse_str(uuid_str.trim()).with_context(|| format!("Invalid UUID '{}'", uuid_str))
}

/// Encode a command for the write characteristic.
pub fn encode_command(command: &str) -> Vec<u8> {
    let mut frame = String::with_capacity(command.len() + 1);
    frame.push_str(command);
    frame.push(COMMAND_TERMINATOR);
    frame.into_bytes()
}

/// A decoded notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundText {
    /// Payload text with surrounding whitespace removed
    pub text: String,
    /// LED state named by the payload, if any
    pub led: Option<LedState>,
}

/// Decode a notification payload.
///
/// Returns `None` for empty or whitespace-only payloads.
pub fn decode_inbound(bytes: &[u8]) -> Option<InboundText> {
    let decoded = String::from_utf8_lossy(bytes);
    let text = decoded.trim();
    if text.is_empty() {
        return None;
    }

    Some(InboundText {
        text: text.to_string(),
        led: classify_led(&decoded),
    })
}

/// Case-sensitive substring match: "ON" then "OFF", the later match wins.
pub fn classify_led(text: &str) -> Option<LedState> {
    let mut led = None;
    if text.contains("ON") {
        led = Some(LedState::On);
    }
    if text.contains("OFF") {
        led = Some(LedState::Off);
    }
    led
}
