use crate::domain::models::{
    AppEvent, BluetoothCommand, ConnectionState, LedState, MessageSeverity,
};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::service;
use crate::infrastructure::logging::LoggingGuard;
use crate::presentation::components::Components;
use crate::presentation::log_book::LogBook;
use eframe::egui;
use tokio::sync::mpsc;
use tracing::error;

pub struct ControllerApp {
    // Bluetooth
    bluetooth_tx: Option<mpsc::UnboundedSender<BluetoothCommand>>,
    event_rx: mpsc::UnboundedReceiver<AppEvent>,

    // State
    connection_state: ConnectionState,
    led_state: LedState,
    log: LogBook,

    // UI State
    quick_commands: Vec<String>,
    command_input: String,

    _logging_guard: Option<LoggingGuard>,
}

impl ControllerApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        settings: SettingsService,
        settings_warning: Option<String>,
        logging_guard: Option<LoggingGuard>,
    ) -> Self {
        let settings = settings.get();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut log = LogBook::new(settings.log_capacity);
        if let Some(warning) = settings_warning {
            log.push(warning, MessageSeverity::Warning);
        }

        let bluetooth_tx = match service::spawn(settings, event_tx) {
            Ok(tx) => Some(tx),
            Err(e) => {
                error!("Failed to start Bluetooth worker: {:#}", e);
                log.push(
                    format!("Bluetooth unavailable: {:#}", e),
                    MessageSeverity::Error,
                );
                None
            }
        };

        Self {
            bluetooth_tx,
            event_rx,
            connection_state: ConnectionState::Disconnected,
            led_state: LedState::Unknown,
            log,
            quick_commands: settings.quick_commands.clone(),
            command_input: String::new(),
            _logging_guard: logging_guard,
        }
    }

    fn send(&mut self, cmd: BluetoothCommand) {
        let Some(tx) = &self.bluetooth_tx else {
            self.log
                .push("Bluetooth worker is not running", MessageSeverity::Error);
            return;
        };
        if tx.send(cmd).is_err() {
            self.log
                .push("Bluetooth worker stopped", MessageSeverity::Error);
            self.bluetooth_tx = None;
        }
    }

    fn apply_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ConnectionState(state) => self.connection_state = state,
            AppEvent::LedState(led) => self.led_state = led,
            AppEvent::Inbound(text) => self
                .log
                .push(format!("micro:bit: {}", text), MessageSeverity::Info),
            AppEvent::Outbound(cmd) => self
                .log
                .push(format!("Command sent: {}", cmd), MessageSeverity::Info),
            AppEvent::LogMessage(msg) => self.log.push(msg.message, msg.severity),
        }
    }

    fn ui_connection_panel(&mut self, ui: &mut egui::Ui) {
        Components::card(ui, "Connection", |ui| {
            Components::status_banner(ui, self.connection_state);
            ui.add_space(8.0);

            ui.horizontal(|ui| match self.connection_state {
                ConnectionState::Disconnected => {
                    if ui.button("Connect").clicked() {
                        self.send(BluetoothCommand::Connect);
                    }
                }
                ConnectionState::Connecting => {
                    ui.add_enabled(false, egui::Button::new("Connect"));
                    ui.spinner();
                }
                ConnectionState::Connected => {
                    if ui.button("Reconnect").clicked() {
                        self.send(BluetoothCommand::Connect);
                    }
                    if ui.button("Disconnect").clicked() {
                        self.send(BluetoothCommand::Disconnect);
                    }
                }
            });
        });
    }

    fn ui_controls_panel(&mut self, ui: &mut egui::Ui) {
        Components::card(ui, "Controls", |ui| {
            Components::led_indicator(ui, self.led_state);
            ui.add_space(6.0);

            let mut pending = None;
            ui.horizontal(|ui| {
                for cmd in &self.quick_commands {
                    if ui.button(cmd).clicked() {
                        pending = Some(cmd.clone());
                    }
                }
            });

            ui.horizontal(|ui| {
                let input = ui.text_edit_singleline(&mut self.command_input);
                let submitted =
                    input.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if (ui.button("Send").clicked() || submitted) && !self.command_input.is_empty() {
                    pending = Some(std::mem::take(&mut self.command_input));
                }
            });

            if let Some(cmd) = pending {
                self.send(BluetoothCommand::Send(cmd));
            }
        });
    }

    fn ui_log_panel(&mut self, ui: &mut egui::Ui) {
        Components::card(ui, "Log", |ui| {
            if ui.small_button("Clear").clicked() {
                self.log.clear();
            }
            egui::ScrollArea::vertical()
                .stick_to_bottom(true)
                .auto_shrink([false, false])
                .show(ui, |ui| {
                    for entry in self.log.entries() {
                        ui.label(
                            egui::RichText::new(format!("[{}] {}", entry.timestamp, entry.message))
                                .monospace()
                                .color(Components::severity_color(entry.severity)),
                        );
                    }
                });
        });
    }
}

impl eframe::App for ControllerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.apply_event(event);
        }

        // Events arrive from another thread; keep polling.
        ctx.request_repaint_after(std::time::Duration::from_millis(100));

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("micro:bit UART Controller");
            ui.add_space(10.0);

            self.ui_connection_panel(ui);
            ui.add_space(10.0);

            // Controls are only offered while connected
            if self.connection_state == ConnectionState::Connected {
                self.ui_controls_panel(ui);
                ui.add_space(10.0);
            }

            self.ui_log_panel(ui);
        });
    }
}
