use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;

use crate::feed::CitySnapshot;

use super::store::CityStore;
use super::types::MetricsUpdate;

#[derive(Debug, Clone, PartialEq)]
pub enum InboxMessage {
    Metrics(MetricsUpdate),
    Snapshot(CitySnapshot),
}

/// Producer half of the inbox. `send` enqueues and returns immediately.
#[derive(Debug, Clone)]
pub struct MetricsSender {
    tx: Sender<InboxMessage>,
}

impl MetricsSender {
    /// Returns `false` once the inbox has been dropped.
    pub fn update_metrics(&self, id: impl Into<String>, health: f32, height: f32) -> bool {
        self.send(InboxMessage::Metrics(MetricsUpdate {
            id: id.into(),
            health,
            height,
        }))
    }

    pub fn snapshot(&self, snapshot: CitySnapshot) -> bool {
        self.send(InboxMessage::Snapshot(snapshot))
    }

    pub fn send(&self, message: InboxMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Queue between an external metrics source and the store.
///
/// Producers may run on any thread; the owner of the store drains the queue
/// once per tick on its own thread.
#[derive(Debug)]
pub struct MetricsInbox {
    tx: Sender<InboxMessage>,
    rx: Mutex<Receiver<InboxMessage>>,
}

impl MetricsInbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn sender(&self) -> MetricsSender {
        MetricsSender {
            tx: self.tx.clone(),
        }
    }

    /// Applies every queued message in arrival order. Returns how many were applied.
    pub fn drain_into(&self, store: &mut CityStore) -> usize {
        let receiver = match self.rx.lock() {
            Ok(receiver) => receiver,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut applied = 0;
        loop {
            match receiver.try_recv() {
                Ok(InboxMessage::Metrics(update)) => {
                    store.update_metrics(&update.id, update.health, update.height);
                    applied += 1;
                }
                Ok(InboxMessage::Snapshot(snapshot)) => {
                    store.apply_snapshot(&snapshot);
                    applied += 1;
                }
                // The inbox holds its own sender, so the channel never disconnects.
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        applied
    }
}

impl Default for MetricsInbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::BuildingSnapshot;
    use std::thread;

    #[test]
    fn drain_applies_messages_in_order() {
        let inbox = MetricsInbox::new();
        let sender = inbox.sender();
        assert!(sender.update_metrics("svc-a", 0.2, 1.0));
        assert!(sender.update_metrics("svc-a", 0.9, 2.0));

        let mut store = CityStore::default();
        assert_eq!(inbox.drain_into(&mut store), 2);
        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!(state.current_health, 0.9);
        assert_eq!(state.revision, 2);
        assert_eq!(inbox.drain_into(&mut store), 0);
    }

    #[test]
    fn senders_on_other_threads_never_block() {
        let inbox = MetricsInbox::new();
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let sender = inbox.sender();
                thread::spawn(move || {
                    for sample in 0..25 {
                        sender.update_metrics(format!("svc-{worker}"), 1.0, sample as f32);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread");
        }

        let mut store = CityStore::default();
        assert_eq!(inbox.drain_into(&mut store), 100);
        assert_eq!(store.len(), 4);
        for worker in 0..4 {
            let state = store
                .get_building_state(&format!("svc-{worker}"))
                .expect("worker building");
            assert_eq!(state.current_height, 24.0);
        }
    }

    #[test]
    fn snapshots_are_applied_through_the_store() {
        let inbox = MetricsInbox::new();
        inbox.sender().snapshot(CitySnapshot {
            tick: 1,
            buildings: vec![BuildingSnapshot {
                id: "api".to_string(),
                grid_x: 0.0,
                grid_z: 0.0,
                health: 0.7,
                height: 0.3,
                active: true,
            }],
            links: Vec::new(),
        });

        let mut store = CityStore::default();
        assert_eq!(inbox.drain_into(&mut store), 1);
        assert!(store.get_building_state("api").is_some());
    }

    #[test]
    fn sender_reports_dropped_inbox() {
        let inbox = MetricsInbox::new();
        let sender = inbox.sender();
        drop(inbox);
        assert!(!sender.update_metrics("svc-a", 1.0, 1.0));
    }
}
