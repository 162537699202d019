mod config;
mod frame_sync;
mod geometry;
mod inbox;
mod inspector;
mod interaction;
mod layout;
mod store;
mod types;

pub use config::{
    load_city_visual_config_from, resolve_city_visual_config, CityVisualConfig, TierPalette,
    TierStyle,
};
pub use frame_sync::{
    sync_highlight, FrameSynchronizer, HighlightCommand, HighlightHandle, HighlightVisual,
};
pub use geometry::{BuildingVisual, GeometryMapper, HealthTier, HighlightVolume, TrafficRoute};
pub use inbox::{InboxMessage, MetricsInbox, MetricsSender};
pub use inspector::{HoverTooltip, InspectorAction, InspectorView};
pub use interaction::{close_inspector, route, PointerEvent, PointerTracker};
pub use layout::{spiral_cell, GridLayout};
pub use store::{CityState, CityStore, DirtyTracker, SubscriptionId};
pub use types::{BuildingState, InteractionState, MetricsOutcome, MetricsUpdate, Rgb, StoreEvent};
