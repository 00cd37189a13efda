//! Bluetooth Service Module
//!
//! Worker that owns the [`PeripheralSession`] and drives it from UI commands
//! and platform events on a single task.

use crate::domain::models::{AppEvent, BluetoothCommand};
use crate::domain::session::PeripheralSession;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    connection::BleConnection,
    platform::{DeviceFilter, DeviceScanner, GattTransport, PlatformEvent},
    scanner::{BleAdapter, BleScanner},
};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Main Bluetooth service coordinating all BLE operations
pub struct BluetoothService<S, T>
where
    S: DeviceScanner,
    T: GattTransport<Device = S::Device>,
{
    session: PeripheralSession<S, T>,
}

impl<S, T> BluetoothService<S, T>
where
    S: DeviceScanner,
    T: GattTransport<Device = S::Device>,
{
    pub fn new(session: PeripheralSession<S, T>) -> Self {
        Self { session }
    }

    /// Process commands and platform events until the UI hangs up.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<BluetoothCommand>,
        mut platform_events: mpsc::UnboundedReceiver<PlatformEvent>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd).await,
                    None => break,
                },
                Some(event) = platform_events.recv() => self.handle_platform_event(event),
            }
        }

        info!("Command channel closed, shutting down Bluetooth worker");
        self.session.disconnect().await;
    }

    async fn handle_command(&mut self, cmd: BluetoothCommand) {
        // Errors are already logged and published by the session.
        match cmd {
            BluetoothCommand::Connect => {
                let _ = self.session.connect().await;
            }
            BluetoothCommand::Disconnect => self.session.disconnect().await,
            BluetoothCommand::Send(text) => {
                let _ = self.session.send_command(&text).await;
            }
        }
    }

    fn handle_platform_event(&mut self, event: PlatformEvent) {
        match event {
            PlatformEvent::Notification {
                peripheral,
                link,
                value,
            } => self.session.on_data_received(&peripheral, link, &value),
            PlatformEvent::Disconnected { peripheral, link } => {
                self.session.on_platform_disconnect(&peripheral, link)
            }
        }
    }
}

/// Start the btleplug-backed worker on its own thread.
///
/// Returns the sender the UI uses to issue [`BluetoothCommand`]s.
pub fn spawn(
    settings: &Settings,
    event_sender: mpsc::UnboundedSender<AppEvent>,
) -> Result<mpsc::UnboundedSender<BluetoothCommand>> {
    let profile = settings.uart_profile()?;
    let filter = DeviceFilter::for_service(
        profile.service,
        settings.device_name_prefix.as_deref(),
        settings.accept_any_device,
    );
    let scan_window = Duration::from_millis(settings.scan_window_ms);

    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (platform_tx, platform_rx) = mpsc::unbounded_channel();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("bluetooth".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                let adapter = Arc::new(BleAdapter::new(platform_tx));
                let session = PeripheralSession::new(
                    BleScanner::new(adapter.clone(), scan_window),
                    BleConnection::new(adapter),
                    profile,
                    filter,
                    event_sender,
                );
                BluetoothService::new(session)
                    .run(cmd_rx, platform_rx)
                    .await;
            });
        })
        .map_err(|e| {
            error!("Failed to start Bluetooth thread: {}", e);
            e
        })?;

    Ok(cmd_tx)
}
