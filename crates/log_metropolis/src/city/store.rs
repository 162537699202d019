use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use crate::feed::{CitySnapshot, TrafficLink};

use super::layout::GridLayout;
use super::types::{BuildingState, InteractionState, MetricsOutcome, StoreEvent};

type Subscriber = Box<dyn FnMut(&CityState, &StoreEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Read side of the store. Subscribers receive this after every mutation.
#[derive(Debug, Clone, Default)]
pub struct CityState {
    buildings: HashMap<String, BuildingState>,
    interaction: InteractionState,
    traffic: Vec<TrafficLink>,
}

impl CityState {
    pub fn get_building_state(&self, id: &str) -> Option<&BuildingState> {
        self.buildings.get(id)
    }

    pub fn hovered_id(&self) -> Option<&str> {
        self.interaction.hovered_id.as_deref()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.interaction.selected_id.as_deref()
    }

    pub fn hovered_building(&self) -> Option<&BuildingState> {
        self.hovered_id().and_then(|id| self.get_building_state(id))
    }

    pub fn selected_building(&self) -> Option<&BuildingState> {
        self.selected_id().and_then(|id| self.get_building_state(id))
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    /// Latest service-to-service links, as last received from the feed.
    pub fn traffic(&self) -> &[TrafficLink] {
        &self.traffic
    }

    /// All known buildings ordered by id.
    pub fn buildings(&self) -> Vec<&BuildingState> {
        let mut buildings: Vec<_> = self.buildings.values().collect();
        buildings.sort_by(|left, right| left.id.cmp(&right.id));
        buildings
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

/// Single source of truth for building metrics and hover/selection state.
///
/// Every mutation goes through this type and is announced synchronously to
/// subscribers, in registration order, before the mutating call returns.
pub struct CityStore {
    state: CityState,
    layout: GridLayout,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl CityStore {
    pub fn new(grid_spacing: f32) -> Self {
        Self {
            state: CityState::default(),
            layout: GridLayout::new(grid_spacing),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn state(&self) -> &CityState {
        &self.state
    }

    pub fn get_building_state(&self, id: &str) -> Option<&BuildingState> {
        self.state.get_building_state(id)
    }

    pub fn hovered_id(&self) -> Option<&str> {
        self.state.hovered_id()
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.state.selected_id()
    }

    pub fn hovered_building(&self) -> Option<&BuildingState> {
        self.state.hovered_building()
    }

    pub fn selected_building(&self) -> Option<&BuildingState> {
        self.state.selected_building()
    }

    pub fn buildings(&self) -> Vec<&BuildingState> {
        self.state.buildings()
    }

    pub fn traffic(&self) -> &[TrafficLink] {
        self.state.traffic()
    }

    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn subscribe<F>(&mut self, subscriber: F) -> SubscriptionId
    where
        F: FnMut(&CityState, &StoreEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    /// Replaces the hover target. Returns `false` and stays silent when unchanged.
    pub fn set_hovered(&mut self, id: Option<&str>) -> bool {
        if self.state.interaction.hovered_id.as_deref() == id {
            return false;
        }
        let current = id.map(str::to_string);
        let previous = std::mem::replace(&mut self.state.interaction.hovered_id, current.clone());
        self.notify(StoreEvent::HoverChanged { previous, current });
        true
    }

    /// Replaces the selection in a single transition. Clearing twice is a no-op.
    pub fn set_selected(&mut self, id: Option<&str>) -> bool {
        if self.state.interaction.selected_id.as_deref() == id {
            return false;
        }
        let current = id.map(str::to_string);
        let previous =
            std::mem::replace(&mut self.state.interaction.selected_id, current.clone());
        self.notify(StoreEvent::SelectionChanged { previous, current });
        true
    }

    /// Upserts a building from an external metrics sample.
    ///
    /// Out-of-range input is clamped rather than rejected, so the scene always
    /// stays renderable. Unknown ids receive the next free layout slot. A
    /// sample that matches the stored values leaves the record untouched.
    pub fn update_metrics(&mut self, id: &str, health: f32, height: f32) -> MetricsOutcome {
        self.upsert(id, None, health, height, true)
    }

    /// Initial layout pass: creates `id` at a fixed position. Known ids keep
    /// their original placement and the call returns `false`.
    pub fn place_building(&mut self, id: &str, grid_x: f32, grid_z: f32) -> bool {
        if self.state.buildings.contains_key(id) {
            return false;
        }
        self.layout.claim(grid_x, grid_z);
        self.state
            .buildings
            .insert(id.to_string(), BuildingState::new(id, grid_x, grid_z));
        self.notify(StoreEvent::BuildingCreated { id: id.to_string() });
        true
    }

    /// Retains a stale building with its inactive flag set instead of removing it.
    pub fn mark_inactive(&mut self, id: &str) -> bool {
        let Some(record) = self.state.buildings.get_mut(id) else {
            return false;
        };
        if !record.active {
            return false;
        }
        record.active = false;
        record.revision += 1;
        self.notify(StoreEvent::BuildingDeactivated { id: id.to_string() });
        true
    }

    /// Applies every building in `snapshot` with its final active flag in a
    /// single write, so subscribers never observe an intermediate state.
    pub fn apply_snapshot(&mut self, snapshot: &CitySnapshot) {
        for building in &snapshot.buildings {
            self.upsert(
                &building.id,
                Some((building.grid_x, building.grid_z)),
                building.health,
                building.height,
                building.active,
            );
        }
        if self.state.traffic != snapshot.links {
            self.state.traffic = snapshot.links.clone();
            self.notify(StoreEvent::TrafficChanged);
        }
    }

    fn upsert(
        &mut self,
        id: &str,
        position: Option<(f32, f32)>,
        health: f32,
        height: f32,
        active: bool,
    ) -> MetricsOutcome {
        let (clean_health, health_clamped) = sanitize_health(health);
        let (clean_height, height_clamped) = sanitize_height(height);
        let clamped = health_clamped || height_clamped;
        if clamped {
            tracing::warn!(
                target: "log_metropolis::store",
                id,
                health,
                height,
                clean_health,
                clean_height,
                "metrics.clamped"
            );
        }

        let created = !self.state.buildings.contains_key(id);
        if created {
            let (grid_x, grid_z) = match position {
                Some((grid_x, grid_z)) => {
                    self.layout.claim(grid_x, grid_z);
                    (grid_x, grid_z)
                }
                None => self.layout.next_position(),
            };
            tracing::debug!(
                target: "log_metropolis::store",
                id,
                grid_x,
                grid_z,
                "building.created"
            );
            self.state
                .buildings
                .insert(id.to_string(), BuildingState::new(id, grid_x, grid_z));
        }

        let Some(record) = self.state.buildings.get_mut(id) else {
            return MetricsOutcome { created, clamped };
        };
        let unchanged = record.current_health == clean_health
            && record.current_height == clean_height
            && record.active == active;
        if unchanged && !created {
            return MetricsOutcome { created, clamped };
        }
        let deactivated = record.active && !active;
        record.current_health = clean_health;
        record.current_height = clean_height;
        record.active = active;
        record.revision += 1;

        let id = id.to_string();
        let event = if created {
            StoreEvent::BuildingCreated { id }
        } else if deactivated {
            StoreEvent::BuildingDeactivated { id }
        } else {
            StoreEvent::BuildingUpdated { id }
        };
        self.notify(event);

        MetricsOutcome { created, clamped }
    }

    fn notify(&mut self, event: StoreEvent) {
        for (_, subscriber) in self.subscribers.iter_mut() {
            subscriber(&self.state, &event);
        }
    }
}

impl Default for CityStore {
    fn default() -> Self {
        Self::new(super::CityVisualConfig::default().grid_spacing)
    }
}

impl std::fmt::Debug for CityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CityStore")
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

fn sanitize_health(health: f32) -> (f32, bool) {
    if health.is_nan() {
        return (0.0, true);
    }
    let clean = health.clamp(0.0, 1.0);
    (clean, clean != health)
}

fn sanitize_height(height: f32) -> (f32, bool) {
    if height.is_nan() {
        return (0.0, true);
    }
    let clean = height.clamp(0.0, f32::MAX);
    (clean, clean != height)
}

/// Collects ids whose derived geometry must be recomputed.
///
/// This is the cold path: building meshes change only when their metrics do,
/// never on the frame timer.
#[derive(Clone)]
pub struct DirtyTracker {
    dirty: Arc<Mutex<BTreeSet<String>>>,
    subscription: SubscriptionId,
}

impl DirtyTracker {
    /// Subscribes to `store` and seeds the set with every building already known.
    pub fn attach(store: &mut CityStore) -> Self {
        let seeded: BTreeSet<String> = store
            .state
            .buildings
            .keys()
            .cloned()
            .collect();
        let dirty = Arc::new(Mutex::new(seeded));
        let sink = Arc::clone(&dirty);
        let subscription = store.subscribe(move |_, event| {
            if let Some(id) = event.building_id() {
                let mut set = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                set.insert(id.to_string());
            }
        });
        Self {
            dirty,
            subscription,
        }
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// Drains the pending ids in id order.
    pub fn take(&self) -> Vec<String> {
        let mut set = self
            .dirty
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::take(&mut *set).into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::BuildingSnapshot;

    fn recorded_events(store: &mut CityStore) -> Arc<Mutex<Vec<StoreEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |_, event| sink.lock().expect("events lock").push(event.clone()));
        events
    }

    #[test]
    fn update_metrics_creates_then_updates() {
        let mut store = CityStore::default();
        let outcome = store.update_metrics("svc-a", 0.9, 2.0);
        assert!(outcome.created);
        assert!(!outcome.clamped);

        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!(state.current_health, 0.9);
        assert_eq!(state.current_height, 2.0);
        assert_eq!(state.revision, 1);
        assert!(state.active);

        let outcome = store.update_metrics("svc-a", 0.4, 1.0);
        assert!(!outcome.created);
        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!(state.current_health, 0.4);
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn unknown_id_lookup_is_absent() {
        let store = CityStore::default();
        assert!(store.get_building_state("missing").is_none());
    }

    #[test]
    fn placement_is_fixed_after_creation() {
        let mut store = CityStore::default();
        assert!(store.place_building("svc-a", 6.0, -3.0));
        assert!(!store.place_building("svc-a", 0.0, 0.0));
        store.update_metrics("svc-a", 0.5, 1.0);

        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!((state.grid_x, state.grid_z), (6.0, -3.0));
    }

    #[test]
    fn auto_layout_assigns_distinct_slots() {
        let mut store = CityStore::new(2.0);
        store.update_metrics("a", 1.0, 0.0);
        store.update_metrics("b", 1.0, 0.0);
        store.update_metrics("c", 1.0, 0.0);

        let positions: BTreeSet<_> = store
            .buildings()
            .iter()
            .map(|b| ((b.grid_x * 10.0) as i64, (b.grid_z * 10.0) as i64))
            .collect();
        assert_eq!(positions.len(), 3);
        let a = store.get_building_state("a").expect("a");
        assert_eq!((a.grid_x, a.grid_z), (0.0, 0.0));
    }

    #[test]
    fn malformed_metrics_are_clamped_not_rejected() {
        let mut store = CityStore::default();
        let outcome = store.update_metrics("svc-a", 1.7, -4.0);
        assert!(outcome.clamped);
        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!(state.current_health, 1.0);
        assert_eq!(state.current_height, 0.0);

        store.update_metrics("svc-a", f32::NAN, f32::NAN);
        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!(state.current_health, 0.0);
        assert_eq!(state.current_height, 0.0);

        store.update_metrics("svc-a", -0.2, f32::INFINITY);
        let state = store.get_building_state("svc-a").expect("svc-a");
        assert_eq!(state.current_health, 0.0);
        assert_eq!(state.current_height, f32::MAX);
    }

    #[test]
    fn set_hovered_twice_notifies_once() {
        let mut store = CityStore::default();
        let events = recorded_events(&mut store);

        assert!(store.set_hovered(Some("svc-a")));
        assert!(!store.set_hovered(Some("svc-a")));

        let events = events.lock().expect("events lock");
        assert_eq!(
            *events,
            vec![StoreEvent::HoverChanged {
                previous: None,
                current: Some("svc-a".to_string()),
            }]
        );
    }

    #[test]
    fn selection_replacement_is_a_single_transition() {
        let mut store = CityStore::default();
        store.set_selected(Some("svc-a"));
        let events = recorded_events(&mut store);

        store.set_selected(Some("svc-b"));

        assert_eq!(store.selected_id(), Some("svc-b"));
        let events = events.lock().expect("events lock");
        assert_eq!(
            *events,
            vec![StoreEvent::SelectionChanged {
                previous: Some("svc-a".to_string()),
                current: Some("svc-b".to_string()),
            }]
        );
    }

    #[test]
    fn clearing_selection_is_idempotent() {
        let mut store = CityStore::default();
        store.set_selected(Some("svc-a"));
        assert!(store.set_selected(None));
        assert!(!store.set_selected(None));
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn dangling_references_resolve_to_absent() {
        let mut store = CityStore::default();
        store.set_hovered(Some("ghost"));
        store.set_selected(Some("ghost"));
        assert_eq!(store.hovered_id(), Some("ghost"));
        assert!(store.hovered_building().is_none());
        assert!(store.selected_building().is_none());

        store.update_metrics("ghost", 0.5, 0.5);
        assert_eq!(
            store.hovered_building().map(|b| b.id.as_str()),
            Some("ghost")
        );
    }

    #[test]
    fn subscribers_run_in_registration_order_with_post_mutation_state() {
        let mut store = CityStore::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            store.subscribe(move |state, _| {
                let health = state
                    .get_building_state("svc-a")
                    .map(|b| b.current_health)
                    .unwrap_or(-1.0);
                sink.lock().expect("order lock").push((label, health));
            });
        }

        store.update_metrics("svc-a", 0.25, 1.0);

        let order = order.lock().expect("order lock");
        assert_eq!(
            *order,
            vec![("first", 0.25), ("second", 0.25), ("third", 0.25)]
        );
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let mut store = CityStore::default();
        let count = Arc::new(Mutex::new(0_u32));
        let sink = Arc::clone(&count);
        let id = store.subscribe(move |_, _| *sink.lock().expect("count lock") += 1);

        store.set_hovered(Some("a"));
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.set_hovered(Some("b"));

        assert_eq!(*count.lock().expect("count lock"), 1);
    }

    #[test]
    fn mark_inactive_retains_record_and_update_reactivates() {
        let mut store = CityStore::default();
        store.update_metrics("svc-a", 0.8, 1.0);
        assert!(store.mark_inactive("svc-a"));
        assert!(!store.mark_inactive("svc-a"));
        assert!(!store.mark_inactive("missing"));

        let state = store.get_building_state("svc-a").expect("retained");
        assert!(!state.active);

        store.update_metrics("svc-a", 0.8, 1.0);
        assert!(store.get_building_state("svc-a").expect("svc-a").active);
    }

    #[test]
    fn apply_snapshot_places_updates_and_deactivates() {
        let mut store = CityStore::default();
        let events = recorded_events(&mut store);
        let snapshot = CitySnapshot {
            tick: 3,
            buildings: vec![
                BuildingSnapshot {
                    id: "api".to_string(),
                    grid_x: 3.0,
                    grid_z: 0.0,
                    health: 0.95,
                    height: 0.4,
                    active: true,
                },
                BuildingSnapshot {
                    id: "db".to_string(),
                    grid_x: 0.0,
                    grid_z: 3.0,
                    health: 0.2,
                    height: 0.1,
                    active: false,
                },
            ],
            links: Vec::new(),
        };

        store.apply_snapshot(&snapshot);

        let api = store.get_building_state("api").expect("api");
        assert_eq!((api.grid_x, api.grid_z), (3.0, 0.0));
        assert_eq!(api.current_health, 0.95);
        assert!(!store.get_building_state("db").expect("db").active);

        let events = events.lock().expect("events lock");
        assert_eq!(
            *events,
            vec![
                StoreEvent::BuildingCreated {
                    id: "api".to_string()
                },
                StoreEvent::BuildingCreated {
                    id: "db".to_string()
                },
            ]
        );
    }

    fn inactive_db_snapshot(tick: u64) -> CitySnapshot {
        CitySnapshot {
            tick,
            buildings: vec![BuildingSnapshot {
                id: "db".to_string(),
                grid_x: 0.0,
                grid_z: 3.0,
                health: 0.2,
                height: 0.1,
                active: false,
            }],
            links: Vec::new(),
        }
    }

    #[test]
    fn repeated_inactive_snapshot_never_shows_building_active() {
        let mut store = CityStore::default();
        store.update_metrics("db", 0.9, 0.5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |state, event| {
            let active = state.get_building_state("db").map(|b| b.active);
            sink.lock().expect("seen lock").push((event.clone(), active));
        });

        store.apply_snapshot(&inactive_db_snapshot(1));
        let revision = store.get_building_state("db").expect("db").revision;
        store.apply_snapshot(&inactive_db_snapshot(2));
        store.apply_snapshot(&inactive_db_snapshot(3));

        assert_eq!(
            store.get_building_state("db").expect("db").revision,
            revision
        );
        let seen = seen.lock().expect("seen lock");
        assert_eq!(
            *seen,
            vec![(
                StoreEvent::BuildingDeactivated {
                    id: "db".to_string()
                },
                Some(false)
            )]
        );
    }

    #[test]
    fn building_state_is_stable_until_its_own_update() {
        let mut store = CityStore::default();
        store.update_metrics("svc-a", 0.7, 1.5);
        store.update_metrics("svc-b", 0.4, 0.5);
        store.update_metrics("svc-c", 0.9, 0.2);
        let before = store.get_building_state("svc-a").cloned().expect("svc-a");

        store.set_hovered(Some("svc-a"));
        store.set_selected(Some("svc-a"));
        store.update_metrics("svc-b", 0.1, 3.0);
        store.mark_inactive("svc-c");
        store.apply_snapshot(&inactive_db_snapshot(1));
        store.set_selected(None);

        assert_eq!(store.get_building_state("svc-a"), Some(&before));

        store.update_metrics("svc-a", 0.3, 1.5);
        let after = store.get_building_state("svc-a").expect("svc-a");
        assert_ne!(after, &before);
        assert_eq!(after.current_health, 0.3);
        assert_eq!(after.revision, before.revision + 1);
    }

    #[test]
    fn identical_metrics_are_a_no_op() {
        let mut store = CityStore::default();
        store.update_metrics("svc-a", 0.6, 1.0);
        let events = recorded_events(&mut store);

        let outcome = store.update_metrics("svc-a", 0.6, 1.0);
        assert!(!outcome.created);
        assert_eq!(store.get_building_state("svc-a").expect("svc-a").revision, 1);

        store.update_metrics("svc-a", 1.4, 1.0);
        store.update_metrics("svc-a", 1.0, 1.0);

        let events = events.lock().expect("events lock");
        assert_eq!(
            *events,
            vec![StoreEvent::BuildingUpdated {
                id: "svc-a".to_string()
            }]
        );
    }

    #[test]
    fn dirty_tracker_collects_building_changes_only() {
        let mut store = CityStore::default();
        store.update_metrics("seeded", 1.0, 0.0);
        let tracker = DirtyTracker::attach(&mut store);

        store.update_metrics("b", 1.0, 0.0);
        store.update_metrics("a", 1.0, 0.0);
        store.update_metrics("a", 0.5, 0.0);
        store.set_hovered(Some("a"));

        assert_eq!(tracker.take(), vec!["a", "b", "seeded"]);
        assert!(tracker.is_empty());
        assert!(tracker.take().is_empty());
    }

    #[test]
    fn dirty_tracker_reads_through_a_poisoned_lock() {
        let mut store = CityStore::default();
        store.update_metrics("seeded", 1.0, 0.0);
        let tracker = DirtyTracker::attach(&mut store);

        let holder = tracker.clone();
        let joined = std::thread::spawn(move || {
            let _set = holder.dirty.lock().expect("dirty lock");
            panic!("panic while holding the dirty set");
        })
        .join();
        assert!(joined.is_err());
        assert!(tracker.dirty.is_poisoned());

        assert!(!tracker.is_empty());
        store.update_metrics("late", 0.5, 0.0);
        assert_eq!(tracker.take(), vec!["late", "seeded"]);
        assert!(tracker.is_empty());
    }

    #[test]
    fn traffic_links_replace_on_change_only() {
        let mut store = CityStore::default();
        let events = recorded_events(&mut store);
        let snapshot = CitySnapshot {
            tick: 1,
            buildings: Vec::new(),
            links: vec![TrafficLink {
                source: "gateway".to_string(),
                target: "auth".to_string(),
                rate: 0.25,
            }],
        };

        store.apply_snapshot(&snapshot);
        store.apply_snapshot(&snapshot);
        assert_eq!(store.traffic(), snapshot.links.as_slice());

        store.apply_snapshot(&CitySnapshot::default());
        assert!(store.traffic().is_empty());
        assert_eq!(
            *events.lock().expect("events lock"),
            vec![StoreEvent::TrafficChanged, StoreEvent::TrafficChanged]
        );
    }
}
