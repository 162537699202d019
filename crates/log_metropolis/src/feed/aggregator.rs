use std::collections::BTreeMap;

use crate::city::GridLayout;

use super::protocol::{BuildingSnapshot, CitySnapshot, EventType, LogEvent, TrafficLink};

const DEFAULT_HEALTH_SMOOTHING: f32 = 0.3;
const DEFAULT_LOAD_SMOOTHING: f32 = 0.5;
const DEFAULT_LOAD_REFERENCE_EVENTS: f32 = 20.0;
const DEFAULT_STALE_AFTER_TICKS: u32 = 50;
const DEFAULT_GRID_SPACING: f32 = 3.0;
// Routes whose smoothed rate decays below this are forgotten.
const ROUTE_FADE_RATE: f32 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatorConfig {
    /// Weight of the newest sample in the health moving average.
    pub health_smoothing: f32,
    pub load_smoothing: f32,
    /// Traffic events per tick that map to a load of 1.0.
    pub load_reference_events: f32,
    /// Ticks without any event before a service is flagged inactive.
    pub stale_after_ticks: u32,
    pub grid_spacing: f32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            health_smoothing: DEFAULT_HEALTH_SMOOTHING,
            load_smoothing: DEFAULT_LOAD_SMOOTHING,
            load_reference_events: DEFAULT_LOAD_REFERENCE_EVENTS,
            stale_after_ticks: DEFAULT_STALE_AFTER_TICKS,
            grid_spacing: DEFAULT_GRID_SPACING,
        }
    }
}

#[derive(Debug, Clone)]
struct ServiceStats {
    grid_x: f32,
    grid_z: f32,
    health: f32,
    load: f32,
    window_traffic: u32,
    window_errors: u32,
    window_heartbeats: u32,
    idle_ticks: u32,
}

impl ServiceStats {
    fn new(grid_x: f32, grid_z: f32) -> Self {
        Self {
            grid_x,
            grid_z,
            health: 1.0,
            load: 0.0,
            window_traffic: 0,
            window_errors: 0,
            window_heartbeats: 0,
            idle_ticks: 0,
        }
    }

    fn is_active(&self, stale_after_ticks: u32) -> bool {
        self.idle_ticks < stale_after_ticks
    }
}

#[derive(Debug, Clone, Default)]
struct RouteStats {
    rate: f32,
    window_calls: u32,
}

/// Folds raw log events into per-service health and load, one window per tick.
#[derive(Debug, Clone)]
pub struct CityAggregator {
    config: AggregatorConfig,
    layout: GridLayout,
    services: BTreeMap<String, ServiceStats>,
    routes: BTreeMap<(String, String), RouteStats>,
    tick: u64,
}

impl CityAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            layout: GridLayout::new(config.grid_spacing),
            config,
            services: BTreeMap::new(),
            routes: BTreeMap::new(),
            tick: 0,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Returns `false` for events without a service name.
    pub fn ingest(&mut self, event: &LogEvent) -> bool {
        let service = event.service_name.trim();
        if service.is_empty() {
            tracing::warn!(
                target: "log_metropolis::aggregator",
                timestamp = event.timestamp,
                "event.dropped=missing_service"
            );
            return false;
        }

        if event.has_target() {
            let target = event.target_service.trim();
            self.ensure_service(target);
            if target != service && event.event_type != EventType::Heartbeat {
                self.routes
                    .entry((service.to_string(), target.to_string()))
                    .or_default()
                    .window_calls += 1;
            }
        }

        let stats = self.ensure_service(service);
        match event.event_type {
            EventType::Heartbeat => stats.window_heartbeats += 1,
            EventType::Traffic | EventType::Error => stats.window_traffic += 1,
        }
        if event.is_error() {
            stats.window_errors += 1;
        }
        true
    }

    /// Closes the current window and returns the resulting city snapshot.
    pub fn tick(&mut self) -> CitySnapshot {
        self.tick += 1;
        let config = self.config;

        for stats in self.services.values_mut() {
            let seen = stats.window_traffic + stats.window_heartbeats;
            if seen == 0 {
                stats.idle_ticks = stats.idle_ticks.saturating_add(1);
            } else {
                stats.idle_ticks = 0;
            }

            if stats.window_traffic > 0 {
                let errors = stats.window_errors.min(stats.window_traffic);
                let error_ratio = errors as f32 / stats.window_traffic as f32;
                let sample = 1.0 - error_ratio;
                stats.health += config.health_smoothing * (sample - stats.health);
            }

            let load_sample = stats.window_traffic as f32 / config.load_reference_events;
            stats.load += config.load_smoothing * (load_sample - stats.load);

            stats.window_traffic = 0;
            stats.window_errors = 0;
            stats.window_heartbeats = 0;
        }

        self.routes.retain(|_, route| {
            let sample = route.window_calls as f32 / config.load_reference_events;
            route.rate += config.load_smoothing * (sample - route.rate);
            route.window_calls = 0;
            route.rate >= ROUTE_FADE_RATE
        });

        self.snapshot()
    }

    /// Current state without closing the window.
    pub fn snapshot(&self) -> CitySnapshot {
        CitySnapshot {
            tick: self.tick,
            buildings: self
                .services
                .iter()
                .map(|(id, stats)| BuildingSnapshot {
                    id: id.clone(),
                    grid_x: stats.grid_x,
                    grid_z: stats.grid_z,
                    health: stats.health.clamp(0.0, 1.0),
                    height: stats.load.max(0.0),
                    active: stats.is_active(self.config.stale_after_ticks),
                })
                .collect(),
            links: self
                .routes
                .iter()
                .map(|((source, target), route)| TrafficLink {
                    source: source.clone(),
                    target: target.clone(),
                    rate: route.rate,
                })
                .collect(),
        }
    }

    fn ensure_service(&mut self, service: &str) -> &mut ServiceStats {
        let layout = &mut self.layout;
        self.services
            .entry(service.to_string())
            .or_insert_with(|| {
                let (grid_x, grid_z) = layout.next_position();
                tracing::info!(
                    target: "log_metropolis::aggregator",
                    service,
                    grid_x,
                    grid_z,
                    "service.registered"
                );
                ServiceStats::new(grid_x, grid_z)
            })
    }
}

impl Default for CityAggregator {
    fn default() -> Self {
        Self::new(AggregatorConfig::default())
    }
}
