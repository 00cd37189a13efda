use crate::domain::models::{ConnectionState, LedState, MessageSeverity};
use eframe::egui;

pub struct Components;

impl Components {
    pub fn card<R>(
        ui: &mut egui::Ui,
        title: &str,
        add_contents: impl FnOnce(&mut egui::Ui) -> R,
    ) -> R {
        let stroke = ui.style().visuals.widgets.noninteractive.bg_stroke;
        let bg = ui.style().visuals.widgets.noninteractive.bg_fill;

        egui::Frame::none()
            .inner_margin(egui::Margin::same(12.0))
            .stroke(stroke)
            .fill(bg)
            .show(ui, |ui| {
                ui.vertical(|ui| {
                    ui.label(egui::RichText::new(title).strong().size(16.0));
                    ui.add_space(6.0);
                    add_contents(ui)
                })
                .inner
            })
            .inner
    }

    pub fn status_banner(ui: &mut egui::Ui, state: ConnectionState) {
        let (text, bg_color, text_color) = match state {
            ConnectionState::Connected => (
                "CONNECTED",
                egui::Color32::from_rgb(0, 200, 0),
                egui::Color32::BLACK,
            ),
            ConnectionState::Connecting => (
                "CONNECTING...",
                egui::Color32::from_rgb(255, 200, 0),
                egui::Color32::BLACK,
            ),
            ConnectionState::Disconnected => (
                "DISCONNECTED",
                egui::Color32::from_gray(100),
                egui::Color32::WHITE,
            ),
        };

        ui.add_sized(
            [ui.available_width(), 32.0],
            egui::Label::new(
                egui::RichText::new(text)
                    .color(text_color)
                    .background_color(bg_color)
                    .size(16.0)
                    .strong(),
            )
            .wrap_mode(egui::TextWrapMode::Extend),
        );
    }

    pub fn led_indicator(ui: &mut egui::Ui, led: LedState) {
        let (label, color) = match led {
            LedState::On => ("LED ON", egui::Color32::from_rgb(255, 60, 60)),
            LedState::Off => ("LED OFF", egui::Color32::from_gray(60)),
            LedState::Unknown => ("LED ?", egui::Color32::from_gray(150)),
        };

        ui.horizontal(|ui| {
            let (rect, _) = ui.allocate_exact_size(egui::vec2(14.0, 14.0), egui::Sense::hover());
            ui.painter().circle_filled(rect.center(), 7.0, color);
            ui.label(label);
        });
    }

    pub fn severity_color(severity: MessageSeverity) -> egui::Color32 {
        match severity {
            MessageSeverity::Info => egui::Color32::GRAY,
            MessageSeverity::Success => egui::Color32::from_rgb(0, 170, 0),
            MessageSeverity::Warning => egui::Color32::from_rgb(220, 160, 0),
            MessageSeverity::Error => egui::Color32::from_rgb(220, 50, 50),
        }
    }
}
