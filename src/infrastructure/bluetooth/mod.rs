//! Bluetooth Module
//!
//! Provides BLE communication with a micro:bit over the UART-like service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │    (worker task - owns the PeripheralSession)            │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ DeviceScanner / GattTransport
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌───────────┐  ┌────────────┐  ┌──────────┐
//! │  Scanner  │  │ Connection │  │ Protocol │
//! │           │  │            │  │          │
//! │ - adapter │  │ - GATT     │  │ - UUIDs  │
//! │ - device  │  │ - notify   │  │ - encode │
//! │   chooser │  │ - write    │  │ - decode │
//! └───────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`platform`] - Collaborator traits, device filters and platform events
//! - [`protocol`] - UART UUIDs, command encoding and reply classification
//! - [`scanner`] - btleplug adapter and device selection
//! - [`connection`] - btleplug GATT transport
//! - [`service`] - Worker that runs the session

pub mod connection;
pub mod platform;
pub mod protocol;
pub mod scanner;
pub mod service;

#[cfg(test)]
pub(crate) mod fake;
