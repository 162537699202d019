use std::io::Write;

use serde::{Deserialize, Serialize};

use super::FeedError;

pub const FEED_PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    #[default]
    Traffic,
    Error,
    Heartbeat,
}

fn unknown_service() -> String {
    "unknown".to_string()
}

/// One raw log line as emitted by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(alias = "source_service")]
    pub service_name: String,
    #[serde(default = "unknown_service")]
    pub target_service: String,
    pub timestamp: f64,
    #[serde(default)]
    pub metric_value: f64,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub payload: String,
}

impl LogEvent {
    pub fn traffic(service: impl Into<String>, timestamp: f64) -> Self {
        Self {
            service_name: service.into(),
            target_service: unknown_service(),
            timestamp,
            metric_value: 0.0,
            event_type: EventType::Traffic,
            severity: Severity::Info,
            payload: String::new(),
        }
    }

    pub fn error(service: impl Into<String>, timestamp: f64) -> Self {
        Self {
            event_type: EventType::Error,
            severity: Severity::Error,
            ..Self::traffic(service, timestamp)
        }
    }

    /// Either an error event or any event logged at error severity.
    pub fn is_error(&self) -> bool {
        self.event_type == EventType::Error || self.severity == Severity::Error
    }

    pub fn has_target(&self) -> bool {
        !self.target_service.is_empty() && self.target_service != "unknown"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingSnapshot {
    pub id: String,
    pub grid_x: f32,
    pub grid_z: f32,
    pub health: f32,
    pub height: f32,
    pub active: bool,
}

/// Calls from one service to another, smoothed over recent ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLink {
    pub source: String,
    pub target: String,
    /// Same scale as building load: 1.0 is the reference event count per tick.
    pub rate: f32,
}

/// All known services after one aggregation tick, ordered by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitySnapshot {
    pub tick: u64,
    pub buildings: Vec<BuildingSnapshot>,
    /// Ordered by source then target. Older servers omit the field.
    #[serde(default)]
    pub links: Vec<TrafficLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRequest {
    Hello { client: String, version: u32 },
    Subscribe,
    RequestSnapshot,
    Ingest { events: Vec<LogEvent> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedResponse {
    HelloAck { server: String, version: u32 },
    Snapshot { snapshot: CitySnapshot },
    IngestAck { accepted: usize },
    Error { message: String },
}

/// Writes one newline-terminated JSON message and flushes.
pub fn write_json_line<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), FeedError> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
