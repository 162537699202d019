use serde::{Deserialize, Serialize};

use super::config::{CityVisualConfig, TierStyle};
use super::types::BuildingState;

// Arc apex above the straight roof-to-roof line, as a fraction of ground span.
const TRAFFIC_ARC_RISE: f32 = 0.25;
const TRAFFIC_PARTICLES_PER_RATE: f32 = 4.0;
const MAX_TRAFFIC_PARTICLES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthTier {
    Healthy,
    Degraded,
    Critical,
}

impl HealthTier {
    pub fn label(self) -> &'static str {
        match self {
            HealthTier::Healthy => "healthy",
            HealthTier::Degraded => "degraded",
            HealthTier::Critical => "critical",
        }
    }

    /// Higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            HealthTier::Healthy => 0,
            HealthTier::Degraded => 1,
            HealthTier::Critical => 2,
        }
    }
}

/// Axis-aligned box drawn around a hovered building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HighlightVolume {
    pub center: [f32; 3],
    pub size: [f32; 3],
}

/// Everything the renderer needs to draw one building.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BuildingVisual {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub tier: HealthTier,
    pub style: TierStyle,
    pub active: bool,
}

/// Roof-to-roof arc that traffic particles travel along.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficRoute {
    pub from: [f32; 3],
    pub to: [f32; 3],
    pub rise: f32,
}

impl TrafficRoute {
    /// `phase` wraps, so 0.0 and 1.0 are both the source roof.
    pub fn point_at(&self, phase: f32) -> [f32; 3] {
        let t = phase.rem_euclid(1.0);
        let lerp = |from: f32, to: f32| from + (to - from) * t;
        let lift = 4.0 * self.rise * t * (1.0 - t);
        [
            lerp(self.from[0], self.to[0]),
            lerp(self.from[1], self.to[1]) + lift,
            lerp(self.from[2], self.to[2]),
        ]
    }
}

/// Pure mapping from metrics to geometry. No state, no clock, no randomness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryMapper {
    config: CityVisualConfig,
}

impl GeometryMapper {
    pub fn new(config: CityVisualConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CityVisualConfig {
        &self.config
    }

    pub fn visual_height(&self, height: f32) -> f32 {
        let load = height.min(self.config.max_visual_load);
        self.config.base_height + load * self.config.height_scale
    }

    /// Centered vertically so the base of the box sits on the ground plane.
    pub fn world_position(&self, state: &BuildingState) -> [f32; 3] {
        let height = self.visual_height(state.current_height);
        [state.grid_x, height / 2.0, state.grid_z]
    }

    /// Boundary values fall into the less severe tier; NaN is critical.
    pub fn health_tier(&self, health: f32) -> HealthTier {
        if health > self.config.healthy_threshold {
            HealthTier::Healthy
        } else if health > self.config.critical_threshold {
            HealthTier::Degraded
        } else {
            HealthTier::Critical
        }
    }

    pub fn tier_style(&self, tier: HealthTier) -> TierStyle {
        match tier {
            HealthTier::Healthy => self.config.palette.healthy,
            HealthTier::Degraded => self.config.palette.degraded,
            HealthTier::Critical => self.config.palette.critical,
        }
    }

    pub fn health_color(&self, health: f32) -> TierStyle {
        self.tier_style(self.health_tier(health))
    }

    pub fn highlight_volume(&self, state: &BuildingState) -> HighlightVolume {
        let padding = self.config.highlight_padding * 2.0;
        let height = self.visual_height(state.current_height);
        HighlightVolume {
            center: self.world_position(state),
            size: [
                self.config.footprint_width + padding,
                height + padding,
                self.config.footprint_depth + padding,
            ],
        }
    }

    pub fn building_visual(&self, state: &BuildingState) -> BuildingVisual {
        let tier = self.health_tier(state.current_health);
        let style = if state.active {
            self.tier_style(tier)
        } else {
            self.config.palette.inactive
        };
        BuildingVisual {
            position: self.world_position(state),
            scale: [
                self.config.footprint_width,
                self.visual_height(state.current_height),
                self.config.footprint_depth,
            ],
            tier,
            style,
            active: state.active,
        }
    }
}

impl GeometryMapper {
    pub fn traffic_route(&self, source: &BuildingState, target: &BuildingState) -> TrafficRoute {
        let roof = |state: &BuildingState| {
            [
                state.grid_x,
                self.visual_height(state.current_height),
                state.grid_z,
            ]
        };
        let from = roof(source);
        let to = roof(target);
        let span = ((to[0] - from[0]).powi(2) + (to[2] - from[2]).powi(2)).sqrt();
        TrafficRoute {
            from,
            to,
            rise: span * TRAFFIC_ARC_RISE,
        }
    }

    /// Particles in flight on a link. Any positive rate shows at least one.
    pub fn traffic_particles(&self, rate: f32) -> usize {
        if rate.is_nan() || rate <= 0.0 {
            return 0;
        }
        let scaled = (rate.min(MAX_TRAFFIC_PARTICLES as f32) * TRAFFIC_PARTICLES_PER_RATE).ceil();
        (scaled as usize).clamp(1, MAX_TRAFFIC_PARTICLES)
    }
}

impl Default for GeometryMapper {
    fn default() -> Self {
        Self::new(CityVisualConfig::default())
    }
}
