use std::io::{BufRead, BufReader, BufWriter, ErrorKind};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use super::aggregator::{AggregatorConfig, CityAggregator};
use super::demo::DemoTraffic;
use super::protocol::{
    write_json_line, CitySnapshot, FeedRequest, FeedResponse, LogEvent, FEED_PROTOCOL_VERSION,
};
use super::FeedError;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:5020";
const DEFAULT_TICK_INTERVAL_MS: u64 = 100;
const MAX_TICK_INTERVAL_MS: u64 = 10_000;
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);
// Snapshots queued for a session that has not written the previous ones are
// dropped past this depth.
const SESSION_QUEUE_CAPACITY: usize = 8;
const SERVER_NAME: &str = "log_metropolis";

#[derive(Debug, Clone)]
pub struct FeedServerConfig {
    pub bind_addr: String,
    pub tick_interval: Duration,
    pub aggregator: AggregatorConfig,
    /// Feed synthetic traffic into the aggregator on every tick.
    pub demo: bool,
}

impl FeedServerConfig {
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            aggregator: AggregatorConfig::default(),
            demo: false,
        }
    }

    pub fn with_bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_demo(mut self, demo: bool) -> Self {
        self.demo = demo;
        self
    }
}

impl Default for FeedServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

pub fn load_feed_server_config_from<F>(lookup: F) -> FeedServerConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = FeedServerConfig::new();

    if let Some(addr) = lookup("LOG_METROPOLIS_FEED_ADDR") {
        let addr = addr.trim();
        if !addr.is_empty() {
            config.bind_addr = addr.to_string();
        }
    }
    if let Some(millis) = parse_value::<u64, _>(&lookup, "LOG_METROPOLIS_TICK_MS") {
        if (1..=MAX_TICK_INTERVAL_MS).contains(&millis) {
            config.tick_interval = Duration::from_millis(millis);
        }
    }
    if let Some(raw) = lookup("LOG_METROPOLIS_DEMO") {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.demo = true,
            "0" | "false" | "no" | "off" => config.demo = false,
            _ => tracing::warn!(
                target: "log_metropolis::config",
                key = "LOG_METROPOLIS_DEMO",
                value = %raw,
                "override.ignored=unparsable"
            ),
        }
    }
    if let Some(ticks) = parse_value::<u32, _>(&lookup, "LOG_METROPOLIS_STALE_TICKS") {
        if ticks > 0 {
            config.aggregator.stale_after_ticks = ticks;
        }
    }
    if let Some(weight) = parse_value::<f32, _>(&lookup, "LOG_METROPOLIS_HEALTH_SMOOTHING") {
        if weight > 0.0 && weight <= 1.0 {
            config.aggregator.health_smoothing = weight;
        }
    }
    if let Some(events) = parse_value::<f32, _>(&lookup, "LOG_METROPOLIS_LOAD_REFERENCE") {
        if events.is_finite() && events > 0.0 {
            config.aggregator.load_reference_events = events;
        }
    }

    config
}

fn parse_value<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
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

enum SessionInput {
    Request(FeedRequest),
    Malformed(String),
    Snapshot(CitySnapshot),
    Closed,
}

struct FeedShared {
    aggregator: Mutex<CityAggregator>,
    demo: Mutex<Option<DemoTraffic>>,
    latest: Mutex<CitySnapshot>,
    subscribers: Mutex<Vec<mpsc::SyncSender<SessionInput>>>,
    started: Instant,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl FeedShared {
    fn ingest(&self, events: &[LogEvent]) -> usize {
        let mut aggregator = lock(&self.aggregator);
        events.iter().filter(|event| aggregator.ingest(event)).count()
    }

    fn tick(&self) -> CitySnapshot {
        let timestamp = self.started.elapsed().as_secs_f64();
        let snapshot = {
            let mut aggregator = lock(&self.aggregator);
            if let Some(demo) = lock(&self.demo).as_mut() {
                for event in demo.next_batch(timestamp) {
                    aggregator.ingest(&event);
                }
            }
            aggregator.tick()
        };
        *lock(&self.latest) = snapshot.clone();
        self.broadcast(&snapshot);
        snapshot
    }

    fn broadcast(&self, snapshot: &CitySnapshot) {
        let mut subscribers = lock(&self.subscribers);
        let before = subscribers.len();
        let mut lagging = 0_usize;
        subscribers.retain(|tx| {
            match tx.try_send(SessionInput::Snapshot(snapshot.clone())) {
                Ok(()) => true,
                Err(mpsc::TrySendError::Full(_)) => {
                    lagging += 1;
                    true
                }
                Err(mpsc::TrySendError::Disconnected(_)) => false,
            }
        });
        if lagging > 0 {
            tracing::debug!(
                target: "log_metropolis::feed",
                lagging,
                tick = snapshot.tick,
                "snapshot.skipped"
            );
        }
        let dropped = before - subscribers.len();
        if dropped > 0 {
            tracing::debug!(
                target: "log_metropolis::feed",
                dropped,
                remaining = subscribers.len(),
                "subscribers.pruned"
            );
        }
    }

    fn latest(&self) -> CitySnapshot {
        lock(&self.latest).clone()
    }
}

/// Aggregates pushed log events and streams one city snapshot per tick to
/// every subscribed connection.
pub struct FeedServer {
    config: FeedServerConfig,
    shared: Arc<FeedShared>,
}

impl FeedServer {
    pub fn new(config: FeedServerConfig) -> Self {
        let demo = config.demo.then(DemoTraffic::default);
        let shared = FeedShared {
            aggregator: Mutex::new(CityAggregator::new(config.aggregator)),
            demo: Mutex::new(demo),
            latest: Mutex::new(CitySnapshot::default()),
            subscribers: Mutex::new(Vec::new()),
            started: Instant::now(),
        };
        Self {
            config,
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &FeedServerConfig {
        &self.config
    }

    /// Feeds events straight into the aggregator. Returns how many were accepted.
    pub fn ingest(&self, events: &[LogEvent]) -> usize {
        self.shared.ingest(events)
    }

    /// Runs one aggregation tick and broadcasts the result.
    pub fn tick_once(&self) -> CitySnapshot {
        self.shared.tick()
    }

    pub fn latest_snapshot(&self) -> CitySnapshot {
        self.shared.latest()
    }

    /// Binds and serves on the calling thread until the listener fails.
    pub fn run(&self) -> Result<(), FeedError> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        tracing::info!(
            target: "log_metropolis::feed",
            addr = %self.config.bind_addr,
            demo = self.config.demo,
            "feed.listening"
        );
        let stop = AtomicBool::new(false);
        serve_listener(&self.shared, &listener, self.config.tick_interval, &stop)
    }

    /// Binds and serves on a background thread.
    pub fn spawn(self) -> Result<FeedServerHandle, FeedError> {
        let listener = TcpListener::bind(&self.config.bind_addr)?;
        let local_addr = listener.local_addr()?;
        tracing::info!(
            target: "log_metropolis::feed",
            addr = %local_addr,
            demo = self.config.demo,
            "feed.listening"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let shared = Arc::clone(&self.shared);
        let tick_interval = self.config.tick_interval;
        let thread = thread::spawn(move || {
            if let Err(err) = serve_listener(&shared, &listener, tick_interval, &thread_stop) {
                tracing::error!(target: "log_metropolis::feed", error = %err, "feed.stopped");
            }
        });

        Ok(FeedServerHandle {
            local_addr,
            stop,
            thread: Some(thread),
        })
    }
}

/// Stops the background server when dropped.
pub struct FeedServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FeedServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FeedServerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn serve_listener(
    shared: &Arc<FeedShared>,
    listener: &TcpListener,
    tick_interval: Duration,
    stop: &AtomicBool,
) -> Result<(), FeedError> {
    listener.set_nonblocking(true)?;
    let mut last_tick = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let shared = Arc::clone(shared);
                thread::spawn(move || {
                    tracing::info!(target: "log_metropolis::feed", %peer, "connection.opened");
                    if let Err(err) = serve_stream(&shared, stream) {
                        tracing::warn!(
                            target: "log_metropolis::feed",
                            %peer,
                            error = %err,
                            "connection.failed"
                        );
                    }
                    tracing::info!(target: "log_metropolis::feed", %peer, "connection.closed");
                });
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {}
            Err(err) => return Err(err.into()),
        }

        if last_tick.elapsed() >= tick_interval {
            shared.tick();
            last_tick = Instant::now();
        } else {
            thread::sleep(ACCEPT_POLL_INTERVAL.min(tick_interval));
        }
    }
    Ok(())
}

fn serve_stream(shared: &FeedShared, stream: TcpStream) -> Result<(), FeedError> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let control = stream.try_clone()?;
    let result = run_session(shared, stream);
    // Unblocks the reader thread and tells the peer the session is over.
    let _ = control.shutdown(Shutdown::Both);
    result
}

fn run_session(shared: &FeedShared, stream: TcpStream) -> Result<(), FeedError> {
    let reader_stream = stream.try_clone()?;
    let mut writer = BufWriter::new(stream);
    let (tx, rx) = mpsc::sync_channel(SESSION_QUEUE_CAPACITY);

    let reader_tx = tx.clone();
    thread::spawn(move || read_requests(reader_stream, reader_tx));

    let mut subscribed = false;
    loop {
        let input = match rx.recv() {
            Ok(input) => input,
            Err(_) => break,
        };
        match input {
            SessionInput::Request(request) => {
                if !handle_request(shared, request, &tx, &mut subscribed, &mut writer)? {
                    break;
                }
            }
            SessionInput::Malformed(message) => {
                write_json_line(&mut writer, &FeedResponse::Error { message })?;
            }
            SessionInput::Snapshot(snapshot) => {
                write_json_line(&mut writer, &FeedResponse::Snapshot { snapshot })?;
            }
            SessionInput::Closed => break,
        }
    }
    Ok(())
}

fn handle_request(
    shared: &FeedShared,
    request: FeedRequest,
    tx: &mpsc::SyncSender<SessionInput>,
    subscribed: &mut bool,
    writer: &mut BufWriter<TcpStream>,
) -> Result<bool, FeedError> {
    match request {
        FeedRequest::Hello { client, version } => {
            if version != FEED_PROTOCOL_VERSION {
                let message = format!(
                    "unsupported protocol version {version}, expected {FEED_PROTOCOL_VERSION}"
                );
                tracing::warn!(target: "log_metropolis::feed", %client, version, "hello.rejected");
                write_json_line(writer, &FeedResponse::Error { message })?;
                return Ok(false);
            }
            tracing::debug!(target: "log_metropolis::feed", %client, "hello.accepted");
            write_json_line(
                writer,
                &FeedResponse::HelloAck {
                    server: SERVER_NAME.to_string(),
                    version: FEED_PROTOCOL_VERSION,
                },
            )?;
        }
        FeedRequest::Subscribe => {
            if !*subscribed {
                lock(&shared.subscribers).push(tx.clone());
                *subscribed = true;
            }
            write_json_line(
                writer,
                &FeedResponse::Snapshot {
                    snapshot: shared.latest(),
                },
            )?;
        }
        FeedRequest::RequestSnapshot => {
            write_json_line(
                writer,
                &FeedResponse::Snapshot {
                    snapshot: shared.latest(),
                },
            )?;
        }
        FeedRequest::Ingest { events } => {
            let accepted = shared.ingest(&events);
            write_json_line(writer, &FeedResponse::IngestAck { accepted })?;
        }
    }
    Ok(true)
}

fn read_requests(stream: TcpStream, tx: mpsc::SyncSender<SessionInput>) {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let input = match serde_json::from_str::<FeedRequest>(trimmed) {
                    Ok(request) => SessionInput::Request(request),
                    Err(err) => SessionInput::Malformed(format!("malformed request: {err}")),
                };
                if tx.send(input).is_err() {
                    return;
                }
            }
            Err(_) => break,
        }
    }
    let _ = tx.send(SessionInput::Closed);
}
