use super::protocol::{EventType, LogEvent, Severity};

const DEFAULT_SERVICES: &[&str] = &[
    "api-gateway",
    "auth-service",
    "billing",
    "catalog",
    "checkout",
    "inventory",
    "notifications",
    "search",
    "user-db",
];

/// Deterministic synthetic traffic for running the feed without a producer.
///
/// Each service gets a steady base rate with a slow triangular swell, and a
/// rotating service goes through an error burst every few hundred ticks.
#[derive(Debug, Clone)]
pub struct DemoTraffic {
    services: Vec<String>,
    tick: u64,
}

impl DemoTraffic {
    pub fn new<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            services: services.into_iter().map(Into::into).collect(),
            tick: 0,
        }
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn next_batch(&mut self, timestamp: f64) -> Vec<LogEvent> {
        let tick = self.tick;
        self.tick += 1;

        let count = self.services.len() as u64;
        if count == 0 {
            return Vec::new();
        }
        let burst_target = (tick / 300) % count;
        let in_burst = tick % 300 < 60;

        let mut batch = Vec::new();
        for (index, service) in self.services.iter().enumerate() {
            let index = index as u64;
            let phase = (tick + index * 37) % 200;
            let swell = if phase < 100 { phase } else { 200 - phase };
            let rate = 2 + index % 4 + swell / 10;
            let downstream = &self.services[((index + 1) % count) as usize];

            for sample in 0..rate {
                let mut event = LogEvent::traffic(service.clone(), timestamp);
                event.target_service = downstream.clone();
                event.metric_value = (20 + (tick + sample) % 80) as f64;

                let failing = if in_burst && index == burst_target {
                    sample % 2 == 0
                } else {
                    (tick + index + sample) % 97 == 0
                };
                if failing {
                    event.event_type = EventType::Error;
                    event.severity = Severity::Error;
                    event.payload = "upstream timeout".to_string();
                }
                batch.push(event);
            }

            if tick % 10 == index % 10 {
                let mut heartbeat = LogEvent::traffic(service.clone(), timestamp);
                heartbeat.event_type = EventType::Heartbeat;
                batch.push(heartbeat);
            }
        }
        batch
    }
}

impl Default for DemoTraffic {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICES.iter().copied())
    }
}
