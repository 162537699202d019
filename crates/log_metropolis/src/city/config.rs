use super::types::Rgb;

const DEFAULT_BASE_HEIGHT: f32 = 0.5;
const DEFAULT_HEIGHT_SCALE: f32 = 4.0;
const DEFAULT_FOOTPRINT_WIDTH: f32 = 1.5;
const DEFAULT_FOOTPRINT_DEPTH: f32 = 1.5;
const DEFAULT_HIGHLIGHT_PADDING: f32 = 0.15;
const DEFAULT_MAX_VISUAL_LOAD: f32 = 25.0;
const DEFAULT_HEALTHY_THRESHOLD: f32 = 0.6;
const DEFAULT_CRITICAL_THRESHOLD: f32 = 0.3;
const DEFAULT_GRID_SPACING: f32 = 3.0;

const HEALTHY_COLOR: u32 = 0x00ff88;
const DEGRADED_COLOR: u32 = 0xffaa00;
const CRITICAL_COLOR: u32 = 0xff4444;
const INACTIVE_COLOR: u32 = 0x3a3f4b;
const HIGHLIGHT_COLOR: u32 = 0x00ffff;

const HEALTHY_GLOW: f32 = 0.4;
const DEGRADED_GLOW: f32 = 0.9;
const CRITICAL_GLOW: f32 = 1.6;
const INACTIVE_GLOW: f32 = 0.0;

/// Display color and emissive strength for one health tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierStyle {
    pub color: Rgb,
    pub glow: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierPalette {
    pub healthy: TierStyle,
    pub degraded: TierStyle,
    pub critical: TierStyle,
    pub inactive: TierStyle,
}

impl Default for TierPalette {
    fn default() -> Self {
        Self {
            healthy: TierStyle {
                color: Rgb::from_hex(HEALTHY_COLOR),
                glow: HEALTHY_GLOW,
            },
            degraded: TierStyle {
                color: Rgb::from_hex(DEGRADED_COLOR),
                glow: DEGRADED_GLOW,
            },
            critical: TierStyle {
                color: Rgb::from_hex(CRITICAL_COLOR),
                glow: CRITICAL_GLOW,
            },
            inactive: TierStyle {
                color: Rgb::from_hex(INACTIVE_COLOR),
                glow: INACTIVE_GLOW,
            },
        }
    }
}

/// Constants of the metric-to-geometry mapping. Fixed once the viewer starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CityVisualConfig {
    pub base_height: f32,
    pub height_scale: f32,
    pub footprint_width: f32,
    pub footprint_depth: f32,
    pub highlight_padding: f32,
    pub max_visual_load: f32,
    pub healthy_threshold: f32,
    pub critical_threshold: f32,
    pub grid_spacing: f32,
    pub palette: TierPalette,
    pub highlight_color: Rgb,
}

impl Default for CityVisualConfig {
    fn default() -> Self {
        Self {
            base_height: DEFAULT_BASE_HEIGHT,
            height_scale: DEFAULT_HEIGHT_SCALE,
            footprint_width: DEFAULT_FOOTPRINT_WIDTH,
            footprint_depth: DEFAULT_FOOTPRINT_DEPTH,
            highlight_padding: DEFAULT_HIGHLIGHT_PADDING,
            max_visual_load: DEFAULT_MAX_VISUAL_LOAD,
            healthy_threshold: DEFAULT_HEALTHY_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            grid_spacing: DEFAULT_GRID_SPACING,
            palette: TierPalette::default(),
            highlight_color: Rgb::from_hex(HIGHLIGHT_COLOR),
        }
    }
}

pub fn resolve_city_visual_config() -> CityVisualConfig {
    load_city_visual_config_from(|key| std::env::var(key).ok())
}

pub fn load_city_visual_config_from<F>(lookup: F) -> CityVisualConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = CityVisualConfig::default();
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_BASE_HEIGHT") {
        if value.is_finite() && value >= 0.0 {
            config.base_height = value;
        }
    }
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_HEIGHT_SCALE") {
        if value.is_finite() && value >= 0.0 {
            config.height_scale = value;
        }
    }
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_FOOTPRINT_WIDTH") {
        if value.is_finite() && value > 0.0 {
            config.footprint_width = value;
        }
    }
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_FOOTPRINT_DEPTH") {
        if value.is_finite() && value > 0.0 {
            config.footprint_depth = value;
        }
    }
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_HIGHLIGHT_PADDING") {
        if value.is_finite() && value >= 0.0 {
            config.highlight_padding = value;
        }
    }
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_MAX_VISUAL_LOAD") {
        if value.is_finite() && value > 0.0 {
            config.max_visual_load = value;
        }
    }
    if let Some(value) = parse_f32(&lookup, "LOG_METROPOLIS_GRID_SPACING") {
        if value.is_finite() && value > 0.0 {
            config.grid_spacing = value;
        }
    }

    let healthy = parse_f32(&lookup, "LOG_METROPOLIS_HEALTHY_THRESHOLD")
        .filter(|value| (0.0..=1.0).contains(value))
        .unwrap_or(config.healthy_threshold);
    let critical = parse_f32(&lookup, "LOG_METROPOLIS_CRITICAL_THRESHOLD")
        .filter(|value| (0.0..=1.0).contains(value))
        .unwrap_or(config.critical_threshold);
    // Overrides that would invert the tiers are discarded as a pair.
    if critical < healthy {
        config.healthy_threshold = healthy;
        config.critical_threshold = critical;
    } else {
        tracing::warn!(
            target: "log_metropolis::config",
            healthy,
            critical,
            "tier_thresholds.rejected=inverted"
        );
    }

    config
}

fn parse_f32<F>(lookup: &F, key: &str) -> Option<f32>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<f32>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                target: "log_metropolis::config",
                key,
                value = %raw,
                "override.ignored=unparsable"
            );
            None
        }
    }
}
