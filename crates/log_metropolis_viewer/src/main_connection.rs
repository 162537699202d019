use std::io::{BufRead, BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log_metropolis::{
    write_json_line, CityAggregator, DemoTraffic, FeedRequest, FeedResponse, MetricsSender,
    FEED_PROTOCOL_VERSION,
};

use super::*;

/// Connection progress reported by the feed thread.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum FeedEvent {
    Connected { server: String },
    Snapshot { tick: u64 },
    Error(String),
}

#[derive(Default)]
pub(super) struct FeedReconnectRuntime {
    attempt: u32,
    next_retry_at_secs: Option<f64>,
    last_error_signature: Option<String>,
}

impl FeedReconnectRuntime {
    fn reset(&mut self) {
        self.attempt = 0;
        self.next_retry_at_secs = None;
        self.last_error_signature = None;
    }
}

pub(super) fn reconnect_backoff_secs(attempt: u32) -> f64 {
    let exponential = 2_f64.powi(attempt.saturating_sub(1).min(4) as i32);
    (RECONNECT_BACKOFF_BASE_SECS * exponential).min(RECONNECT_BACKOFF_MAX_SECS)
}

pub(super) fn reconnectable_error_signature(message: &str) -> Option<String> {
    let normalized = message.trim().to_ascii_lowercase();
    if normalized.is_empty() || normalized.starts_with("unsupported protocol version") {
        return None;
    }

    for (needle, signature) in [
        ("connection refused", "connection_refused"),
        ("timed out", "timed_out"),
        ("connection reset", "connection_reset"),
        ("broken pipe", "broken_pipe"),
        ("disconnected", "disconnected"),
        ("feed receiver poisoned", "receiver_poisoned"),
    ] {
        if normalized.contains(needle) {
            return Some(signature.to_string());
        }
    }
    None
}

pub(super) fn friendly_connection_error(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return "connection error".to_string();
    }

    let lowered = trimmed.to_ascii_lowercase();
    if lowered.contains("connection refused") {
        return "feed server unreachable, retrying...".to_string();
    }
    if lowered.contains("timed out") {
        return "connection timed out, retrying...".to_string();
    }
    if lowered.contains("connection reset") || lowered.contains("broken pipe") {
        return "connection interrupted, retrying...".to_string();
    }
    if lowered.contains("disconnected") {
        return "feed disconnected, retrying...".to_string();
    }
    trimmed.to_string()
}

pub(super) fn feed_client_from_addr(addr: String, sender: MetricsSender) -> FeedClient {
    FeedClient {
        rx: Mutex::new(spawn_feed_client(addr, sender)),
    }
}

pub(super) fn setup_startup_state(
    mut commands: Commands,
    offline: Res<OfflineConfig>,
    config: Res<ViewerConfig>,
    city: Res<CityWorld>,
) {
    if offline.offline {
        spawn_local_demo_feed(
            city.inbox.sender(),
            Duration::from_millis(LOCAL_DEMO_TICK_MS),
        );
        commands.insert_resource(ViewerState {
            status: ConnectionStatus::LocalDemo,
            ..ViewerState::default()
        });
    } else {
        commands.insert_resource(feed_client_from_addr(
            config.addr.clone(),
            city.inbox.sender(),
        ));
        commands.insert_resource(ViewerState::default());
    }
}

pub(super) fn spawn_feed_client(addr: String, sender: MetricsSender) -> Receiver<FeedEvent> {
    let (tx, rx) = mpsc::channel::<FeedEvent>();

    thread::spawn(move || match TcpStream::connect(&addr) {
        Ok(stream) => {
            if let Err(err) = run_connection(stream, &sender, &tx) {
                let _ = tx.send(FeedEvent::Error(err));
            }
        }
        Err(err) => {
            let _ = tx.send(FeedEvent::Error(err.to_string()));
        }
    });

    rx
}

fn run_connection(
    stream: TcpStream,
    sender: &MetricsSender,
    tx: &Sender<FeedEvent>,
) -> Result<(), String> {
    stream.set_nodelay(true).map_err(|err| err.to_string())?;
    let reader_stream = stream.try_clone().map_err(|err| err.to_string())?;
    let mut writer = BufWriter::new(stream);

    for request in [
        FeedRequest::Hello {
            client: "log_metropolis_viewer".to_string(),
            version: FEED_PROTOCOL_VERSION,
        },
        FeedRequest::Subscribe,
    ] {
        write_json_line(&mut writer, &request).map_err(|err| err.to_string())?;
    }

    let mut reader = BufReader::new(reader_stream);
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).map_err(|err| err.to_string())?;
        if read == 0 {
            return Err("disconnected".to_string());
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = serde_json::from_str::<FeedResponse>(trimmed)
            .map_err(|err| format!("decode error: {err}"))?;
        let event = match response {
            FeedResponse::HelloAck { server, .. } => FeedEvent::Connected { server },
            FeedResponse::Snapshot { snapshot } => {
                let event = FeedEvent::Snapshot {
                    tick: snapshot.tick,
                };
                if !sender.snapshot(snapshot) {
                    return Ok(());
                }
                event
            }
            FeedResponse::IngestAck { .. } => continue,
            FeedResponse::Error { message } => return Err(message),
        };
        // A replaced client drops its receiver; this thread then retires.
        if tx.send(event).is_err() {
            return Ok(());
        }
    }
}

/// In-process aggregator fed by synthetic traffic, for running without a server.
pub(super) fn spawn_local_demo_feed(sender: MetricsSender, interval: Duration) {
    thread::spawn(move || {
        let mut aggregator = CityAggregator::default();
        let mut demo = DemoTraffic::default();
        let mut timestamp = 0.0;
        loop {
            for event in demo.next_batch(timestamp) {
                aggregator.ingest(&event);
            }
            if !sender.snapshot(aggregator.tick()) {
                break;
            }
            timestamp += interval.as_secs_f64();
            thread::sleep(interval);
        }
    });
}

pub(super) fn poll_feed_messages(
    mut state: ResMut<ViewerState>,
    client: Option<Res<FeedClient>>,
) {
    let Some(client) = client else {
        return;
    };
    let receiver = match client.rx.lock() {
        Ok(receiver) => receiver,
        Err(_) => {
            state.status = ConnectionStatus::Error("feed receiver poisoned".to_string());
            return;
        }
    };

    loop {
        match receiver.try_recv() {
            Ok(FeedEvent::Connected { server }) => {
                info!("feed connected: {server}");
                state.status = ConnectionStatus::Connected;
            }
            Ok(FeedEvent::Snapshot { tick }) => {
                if state.status == ConnectionStatus::Connecting {
                    state.status = ConnectionStatus::Connected;
                }
                state.last_tick = Some(tick);
            }
            Ok(FeedEvent::Error(message)) => {
                warn!("feed error: {message}");
                state.status = ConnectionStatus::Error(message);
            }
            Err(mpsc::TryRecvError::Empty) => break,
            Err(mpsc::TryRecvError::Disconnected) => {
                if !matches!(state.status, ConnectionStatus::Error(_)) {
                    state.status = ConnectionStatus::Error("disconnected".to_string());
                }
                break;
            }
        }
    }
}

pub(super) fn attempt_feed_reconnect(
    mut commands: Commands,
    config: Res<ViewerConfig>,
    offline: Option<Res<OfflineConfig>>,
    time: Option<Res<Time>>,
    state: Option<ResMut<ViewerState>>,
    city: Res<CityWorld>,
    mut reconnect: Local<FeedReconnectRuntime>,
) {
    if offline.as_deref().is_some_and(|cfg| cfg.offline) {
        reconnect.reset();
        return;
    }

    let Some(mut state) = state else {
        reconnect.reset();
        return;
    };

    let ConnectionStatus::Error(message) = &state.status else {
        reconnect.reset();
        return;
    };

    let Some(signature) = reconnectable_error_signature(message) else {
        reconnect.reset();
        return;
    };

    let now = time
        .as_deref()
        .map(Time::elapsed_secs_f64)
        .unwrap_or_default();
    if reconnect.last_error_signature.as_deref() != Some(signature.as_str()) {
        reconnect.attempt = 0;
        reconnect.next_retry_at_secs = Some(now);
        reconnect.last_error_signature = Some(signature);
    }

    let should_retry = reconnect
        .next_retry_at_secs
        .map(|next| now >= next)
        .unwrap_or(true);
    if !should_retry {
        return;
    }

    commands.insert_resource(feed_client_from_addr(
        config.addr.clone(),
        city.inbox.sender(),
    ));
    state.status = ConnectionStatus::Connecting;
    reconnect.attempt = reconnect.attempt.saturating_add(1);
    reconnect.next_retry_at_secs = Some(now + reconnect_backoff_secs(reconnect.attempt));
}
