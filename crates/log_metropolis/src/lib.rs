pub mod city;
pub mod feed;

pub use city::{
    close_inspector, load_city_visual_config_from, resolve_city_visual_config, route,
    spiral_cell, sync_highlight, BuildingState, BuildingVisual, CityState, CityStore,
    CityVisualConfig, DirtyTracker, FrameSynchronizer, GeometryMapper, GridLayout, HealthTier,
    HighlightCommand, HighlightHandle, HighlightVolume, HighlightVisual, HoverTooltip,
    InboxMessage, InspectorAction, InspectorView, InteractionState, MetricsInbox, MetricsOutcome,
    MetricsSender, MetricsUpdate, PointerEvent, PointerTracker, Rgb, StoreEvent, SubscriptionId,
    TierPalette, TierStyle, TrafficRoute,
};

pub use feed::{
    load_feed_server_config_from, write_json_line, AggregatorConfig, BuildingSnapshot,
    CityAggregator, CitySnapshot, DemoTraffic, EventType, FeedError, FeedRequest, FeedResponse,
    FeedServer, FeedServerConfig, FeedServerHandle, LogEvent, Severity, TrafficLink,
    FEED_PROTOCOL_VERSION,
};
