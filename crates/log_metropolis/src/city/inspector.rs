use super::config::TierStyle;
use super::geometry::{GeometryMapper, HealthTier};
use super::interaction::close_inspector;
use super::store::CityStore;

/// Derived contents of the selection inspector.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectorView {
    pub id: String,
    pub found: bool,
    pub active: bool,
    pub health_label: String,
    pub health_fill: f32,
    pub load_label: String,
    pub load_fill: f32,
    pub tier: HealthTier,
    pub style: TierStyle,
    pub position_label: String,
}

impl InspectorView {
    /// `None` when nothing is selected; the overlay then renders nothing at all.
    ///
    /// A selection whose building is unknown still renders, with zeroed
    /// metrics and `found == false`.
    pub fn from_store(store: &CityStore, mapper: &GeometryMapper) -> Option<Self> {
        let id = store.selected_id()?;
        let building = store.get_building_state(id);

        let health = building.map(|b| b.current_health).unwrap_or(0.0);
        let height = building.map(|b| b.current_height).unwrap_or(0.0);
        let (grid_x, grid_z) = building.map(|b| (b.grid_x, b.grid_z)).unwrap_or((0.0, 0.0));
        let tier = mapper.health_tier(health);

        Some(Self {
            id: id.to_string(),
            found: building.is_some(),
            active: building.map(|b| b.active).unwrap_or(false),
            health_label: percent_label(health),
            health_fill: health.clamp(0.0, 1.0),
            load_label: percent_label(height),
            load_fill: height.clamp(0.0, 1.0),
            tier,
            style: mapper.tier_style(tier),
            position_label: format!("X: {grid_x:.1}, Z: {grid_z:.1}"),
        })
    }

    pub fn status_label(&self) -> &'static str {
        if !self.found {
            "unknown"
        } else if !self.active {
            "inactive"
        } else {
            self.tier.label()
        }
    }
}

/// The "Hovering" badge in the top corner of the HUD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverTooltip {
    pub id: String,
}

impl HoverTooltip {
    pub fn from_store(store: &CityStore) -> Option<Self> {
        store.hovered_id().map(|id| Self { id: id.to_string() })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorAction {
    Close,
}

impl InspectorAction {
    pub fn apply(self, store: &mut CityStore) -> bool {
        match self {
            InspectorAction::Close => close_inspector(store),
        }
    }
}

fn percent_label(value: f32) -> String {
    format!("{:.1}%", value * 100.0)
}
