use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts};
use log_metropolis::{HoverTooltip, InspectorAction, InspectorView, Rgb, TierStyle};

use super::city_scene::CityWorld;
use super::picking::HudPointerState;
use super::{format_status, ConnectionStatus, ViewerState};

const INSPECTOR_WIDTH: f32 = 280.0;
const METRIC_BAR_WIDTH: f32 = 220.0;
const PANEL_FILL: egui::Color32 = egui::Color32::from_rgb(22, 26, 46);
const PANEL_STROKE: egui::Color32 = egui::Color32::from_rgb(52, 60, 92);
const HOVER_ACCENT: egui::Color32 = egui::Color32::from_rgb(0, 255, 255);
const MUTED_TEXT: egui::Color32 = egui::Color32::from_rgb(140, 148, 170);

pub(super) fn rgb_to_color32(rgb: Rgb) -> egui::Color32 {
    let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
    egui::Color32::from_rgb(channel(rgb.r), channel(rgb.g), channel(rgb.b))
}

pub(super) fn style_color32(style: &TierStyle) -> egui::Color32 {
    rgb_to_color32(style.color)
}

fn status_color(status: &ConnectionStatus) -> egui::Color32 {
    match status {
        ConnectionStatus::Connected | ConnectionStatus::LocalDemo => {
            egui::Color32::from_rgb(0, 255, 136)
        }
        ConnectionStatus::Connecting => egui::Color32::from_rgb(255, 170, 0),
        ConnectionStatus::Error(_) => egui::Color32::from_rgb(255, 68, 68),
    }
}

pub(super) fn render_city_hud(
    mut contexts: EguiContexts,
    mut city: ResMut<CityWorld>,
    state: Option<Res<ViewerState>>,
    mut hud: ResMut<HudPointerState>,
) {
    let Ok(context) = contexts.ctx_mut() else {
        return;
    };

    let inspector = InspectorView::from_store(&city.store, city.mapper());
    if let Some(view) = inspector {
        let mut close = false;
        egui::SidePanel::left("city-service-inspector")
            .resizable(false)
            .exact_width(INSPECTOR_WIDTH)
            .frame(
                egui::Frame::default()
                    .fill(PANEL_FILL)
                    .stroke(egui::Stroke::new(1.0, PANEL_STROKE))
                    .inner_margin(egui::Margin::same(12)),
            )
            .show(context, |ui| {
                close = render_inspector(ui, &view);
            });
        if close {
            InspectorAction::Close.apply(&mut city.store);
        }
    }

    if let Some(tooltip) = HoverTooltip::from_store(&city.store) {
        egui::Area::new(egui::Id::new("city-hover-tooltip"))
            .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-16.0, 16.0))
            .movable(false)
            .interactable(false)
            .show(context, |ui| {
                egui::Frame::group(ui.style())
                    .fill(PANEL_FILL.gamma_multiply(0.9))
                    .stroke(egui::Stroke::new(1.0, HOVER_ACCENT))
                    .corner_radius(egui::CornerRadius::same(10))
                    .inner_margin(egui::Margin::same(10))
                    .show(ui, |ui| {
                        ui.small(egui::RichText::new("HOVERING").color(MUTED_TEXT));
                        ui.strong(egui::RichText::new(tooltip.id).color(HOVER_ACCENT));
                    });
            });
    }

    if let Some(state) = state.as_deref() {
        let buildings = city.store.len();
        egui::Area::new(egui::Id::new("city-connection-status"))
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(12.0, -12.0))
            .movable(false)
            .interactable(false)
            .show(context, |ui| {
                egui::Frame::group(ui.style())
                    .fill(PANEL_FILL.gamma_multiply(0.85))
                    .corner_radius(egui::CornerRadius::same(8))
                    .inner_margin(egui::Margin::same(8))
                    .show(ui, |ui| {
                        ui.small(
                            egui::RichText::new(format_status(&state.status))
                                .color(status_color(&state.status)),
                        );
                        let tick = state
                            .last_tick
                            .map(|tick| format!("tick {tick}"))
                            .unwrap_or_else(|| "no snapshot yet".to_string());
                        ui.small(
                            egui::RichText::new(format!("{buildings} services, {tick}"))
                                .color(MUTED_TEXT),
                        );
                    });
            });
    }

    hud.over_ui = context.is_pointer_over_area();
}

/// Returns true when the close button was pressed.
fn render_inspector(ui: &mut egui::Ui, view: &InspectorView) -> bool {
    let accent = style_color32(&view.style);
    let mut close = false;

    ui.horizontal(|ui| {
        ui.heading("Service Inspector");
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            if ui.small_button("Close").clicked() {
                close = true;
            }
        });
    });
    ui.separator();

    ui.label(egui::RichText::new(&view.id).strong().size(18.0));
    ui.small(egui::RichText::new(view.status_label()).color(accent));
    ui.add_space(8.0);

    metric_row(ui, "Health", &view.health_label, view.health_fill, accent);
    metric_row(ui, "Load", &view.load_label, view.load_fill, accent);

    ui.add_space(6.0);
    ui.small(egui::RichText::new("Grid Position").color(MUTED_TEXT));
    ui.monospace(&view.position_label);

    ui.add_space(12.0);
    ui.small(egui::RichText::new("Click elsewhere to deselect").color(MUTED_TEXT));
    close
}

fn metric_row(ui: &mut egui::Ui, label: &str, value: &str, fill: f32, color: egui::Color32) {
    ui.horizontal(|ui| {
        ui.small(egui::RichText::new(label).color(MUTED_TEXT));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            ui.strong(value);
        });
    });
    ui.add(
        egui::ProgressBar::new(fill)
            .desired_width(METRIC_BAR_WIDTH)
            .fill(color),
    );
}
