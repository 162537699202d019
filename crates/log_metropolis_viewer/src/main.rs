use std::sync::mpsc::Receiver;
use std::sync::Mutex;

use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy_egui::{EguiPlugin, EguiPrimaryContextPass};
use log_metropolis::{resolve_city_visual_config, CityVisualConfig};

mod camera_controls;
mod city_scene;
mod ghost_cursor;
mod hud;
mod main_connection;
mod picking;
mod traffic;

use camera_controls::orbit_camera_controls;
use city_scene::{
    drain_metrics_inbox, setup_city_scene, sync_building_entities, CityScene, CityWorld,
};
use ghost_cursor::{sync_ghost_cursor, GhostCursorState};
use hud::render_city_hud;
use main_connection::{
    attempt_feed_reconnect, friendly_connection_error, poll_feed_messages, setup_startup_state,
    FeedEvent,
};
use picking::{pick_buildings, HudPointerState};
use traffic::{sync_traffic_particles, TrafficScene};

const DEFAULT_ADDR: &str = "127.0.0.1:5020";
const RECONNECT_BACKOFF_BASE_SECS: f64 = 0.5;
const RECONNECT_BACKOFF_MAX_SECS: f64 = 8.0;
const LOCAL_DEMO_TICK_MS: u64 = 100;
const BACKGROUND_COLOR: u32 = 0x1a1a2e;

fn main() {
    let addr = resolve_addr();
    let headless = std::env::var("LOG_METROPOLIS_VIEWER_HEADLESS").is_ok();
    let offline = resolve_offline(headless);
    let visual = resolve_city_visual_config();

    if headless {
        run_headless(addr, offline, visual);
    } else {
        run_ui(addr, offline, visual);
    }
}

fn run_ui(addr: String, offline: bool, visual: CityVisualConfig) {
    App::new()
        .insert_resource(ViewerConfig { addr })
        .insert_resource(OfflineConfig { offline })
        .insert_resource(CityWorld::new(visual))
        .insert_resource(CityScene::default())
        .insert_resource(GhostCursorState::default())
        .insert_resource(TrafficScene::default())
        .insert_resource(HudPointerState::default())
        .insert_resource(ClearColor(hex_color(BACKGROUND_COLOR)))
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "Log Metropolis".to_string(),
                resolution: (1280, 800).into(),
                ..default()
            }),
            ..default()
        }))
        .add_plugins(EguiPlugin::default())
        .add_systems(Startup, (setup_startup_state, setup_city_scene))
        .add_systems(
            Update,
            (
                poll_feed_messages,
                attempt_feed_reconnect,
                drain_metrics_inbox,
                sync_building_entities,
                sync_ghost_cursor,
                sync_traffic_particles,
            )
                .chain(),
        )
        .add_systems(Update, orbit_camera_controls)
        .add_systems(
            PostUpdate,
            pick_buildings.after(TransformSystems::Propagate),
        )
        .add_systems(EguiPrimaryContextPass, render_city_hud)
        .run();
}

fn run_headless(addr: String, offline: bool, visual: CityVisualConfig) {
    App::new()
        .insert_resource(ViewerConfig { addr })
        .insert_resource(OfflineConfig { offline })
        .insert_resource(CityWorld::new(visual))
        .insert_resource(HeadlessStatus::default())
        .add_plugins((MinimalPlugins, LogPlugin::default()))
        .add_systems(Startup, setup_startup_state)
        .add_systems(
            Update,
            (
                poll_feed_messages,
                attempt_feed_reconnect,
                drain_metrics_inbox,
                headless_report,
            )
                .chain(),
        )
        .run();
}

#[derive(Resource)]
struct ViewerConfig {
    addr: String,
}

#[derive(Resource, Default)]
struct OfflineConfig {
    offline: bool,
}

/// Status side of the feed connection. Snapshots bypass this channel and go
/// straight into the city inbox.
#[derive(Resource)]
struct FeedClient {
    rx: Mutex<Receiver<FeedEvent>>,
}

#[derive(Resource)]
struct ViewerState {
    status: ConnectionStatus,
    last_tick: Option<u64>,
}

impl Default for ViewerState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            last_tick: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ConnectionStatus {
    Connecting,
    Connected,
    LocalDemo,
    Error(String),
}

#[derive(Resource, Default)]
struct HeadlessStatus {
    last_status: Option<ConnectionStatus>,
    last_buildings: usize,
}

fn resolve_addr() -> String {
    std::env::var("LOG_METROPOLIS_VIEWER_ADDR")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

fn resolve_offline(headless: bool) -> bool {
    let offline_env = std::env::var("LOG_METROPOLIS_VIEWER_OFFLINE").is_ok();
    let force_online = std::env::var("LOG_METROPOLIS_VIEWER_FORCE_ONLINE").is_ok();
    decide_offline(headless, offline_env, force_online)
}

fn decide_offline(headless: bool, offline_env: bool, force_online: bool) -> bool {
    if force_online {
        return false;
    }
    if offline_env {
        return true;
    }
    headless
}

fn headless_report(
    mut status: ResMut<HeadlessStatus>,
    state: Option<Res<ViewerState>>,
    city: Res<CityWorld>,
) {
    if let Some(state) = state {
        if status.last_status.as_ref() != Some(&state.status) {
            info!("viewer status: {}", format_status(&state.status));
            status.last_status = Some(state.status.clone());
        }
    }

    let buildings = city.store.len();
    if buildings != status.last_buildings {
        info!("viewer buildings: {buildings}");
        status.last_buildings = buildings;
    }
}

fn format_status(status: &ConnectionStatus) -> String {
    match status {
        ConnectionStatus::Connecting => "connecting".to_string(),
        ConnectionStatus::Connected => "connected".to_string(),
        ConnectionStatus::LocalDemo => "local demo".to_string(),
        ConnectionStatus::Error(message) => {
            format!("error: {}", friendly_connection_error(message))
        }
    }
}

fn hex_color(hex: u32) -> Color {
    Color::srgb_u8((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
}

#[cfg(test)]
mod tests;
