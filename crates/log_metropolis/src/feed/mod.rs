mod aggregator;
mod demo;
mod protocol;
mod server;

pub use aggregator::{AggregatorConfig, CityAggregator};
pub use demo::DemoTraffic;
pub use protocol::{
    write_json_line, BuildingSnapshot, CitySnapshot, EventType, FeedRequest, FeedResponse,
    LogEvent, Severity, TrafficLink, FEED_PROTOCOL_VERSION,
};
pub use server::{load_feed_server_config_from, FeedServer, FeedServerConfig, FeedServerHandle};

#[derive(Debug)]
pub enum FeedError {
    Io(String),
    Serde(String),
    Protocol(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Io(message) => write!(f, "io error: {message}"),
            FeedError::Serde(message) => write!(f, "serde error: {message}"),
            FeedError::Protocol(message) => write!(f, "protocol error: {message}"),
        }
    }
}

impl std::error::Error for FeedError {}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Serde(err.to_string())
    }
}
