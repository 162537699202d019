use serde::{Deserialize, Serialize};

/// Latest known metrics for one monitored service, rendered as a building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingState {
    pub id: String,
    pub grid_x: f32,
    pub grid_z: f32,
    pub current_health: f32,
    pub current_height: f32,
    pub active: bool,
    pub revision: u64,
}

impl BuildingState {
    pub(crate) fn new(id: impl Into<String>, grid_x: f32, grid_z: f32) -> Self {
        Self {
            id: id.into(),
            grid_x,
            grid_z,
            current_health: 1.0,
            current_height: 0.0,
            active: true,
            revision: 0,
        }
    }
}

/// Hover and selection are weak references: they hold an id, never a record,
/// and are resolved through the store on every use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionState {
    pub hovered_id: Option<String>,
    pub selected_id: Option<String>,
}

/// One inbound sample from the external feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub id: String,
    pub health: f32,
    pub height: f32,
}

/// Result of one `update_metrics` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsOutcome {
    pub created: bool,
    pub clamped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    BuildingCreated {
        id: String,
    },
    BuildingUpdated {
        id: String,
    },
    BuildingDeactivated {
        id: String,
    },
    HoverChanged {
        previous: Option<String>,
        current: Option<String>,
    },
    SelectionChanged {
        previous: Option<String>,
        current: Option<String>,
    },
    TrafficChanged,
}

impl StoreEvent {
    /// Id whose derived geometry is stale after this event, if any.
    pub fn building_id(&self) -> Option<&str> {
        match self {
            StoreEvent::BuildingCreated { id }
            | StoreEvent::BuildingUpdated { id }
            | StoreEvent::BuildingDeactivated { id } => Some(id.as_str()),
            StoreEvent::HoverChanged { .. }
            | StoreEvent::SelectionChanged { .. }
            | StoreEvent::TrafficChanged => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn to_hex_string(self) -> String {
        let channel = |value: f32| (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        format!(
            "#{:02x}{:02x}{:02x}",
            channel(self.r),
            channel(self.g),
            channel(self.b)
        )
    }
}
