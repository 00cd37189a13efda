mod domain;
mod infrastructure;
mod presentation;

use domain::settings::SettingsService;
use eframe::egui;

fn main() -> Result<(), eframe::Error> {
    let (settings, settings_error) = SettingsService::load();

    let logging_guard = infrastructure::logging::init_logger(&settings.get().log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    tracing::info!("Starting micro:bit UART Controller");
    if let Some(path) = settings.path() {
        tracing::debug!("Settings file: {}", path.display());
    }
    let settings_warning = settings_error.map(|e| {
        tracing::warn!("{:#}; using defaults", e);
        format!("{:#}; using defaults", e)
    });

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([480.0, 640.0])
            .with_title("micro:bit UART Controller"),
        ..Default::default()
    };

    eframe::run_native(
        "micro:bit UART Controller",
        options,
        Box::new(|cc| {
            Ok(Box::new(presentation::app::ControllerApp::new(
                cc,
                settings,
                settings_warning,
                logging_guard,
            )))
        }),
    )
}
