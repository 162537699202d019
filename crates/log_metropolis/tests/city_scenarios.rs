use std::sync::{Arc, Mutex};

use log_metropolis::{
    route, CityStore, FrameSynchronizer, GeometryMapper, HealthTier, HighlightCommand,
    HighlightHandle, InspectorView, MetricsInbox, PointerEvent, PointerTracker, StoreEvent,
};

fn recorded_events(store: &mut CityStore) -> Arc<Mutex<Vec<StoreEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    store.subscribe(move |_, event| {
        sink.lock().expect("event sink").push(event.clone());
    });
    events
}

#[test]
fn metrics_update_reads_back_with_tier() {
    let mut store = CityStore::default();
    let mapper = GeometryMapper::default();
    store.update_metrics("svc-a", 0.9, 2.0);

    let state = store.get_building_state("svc-a").expect("svc-a");
    assert_eq!(state.current_health, 0.9);
    assert_eq!(state.current_height, 2.0);
    assert_eq!(mapper.health_tier(state.current_health), HealthTier::Healthy);
    assert_eq!(mapper.health_tier(state.current_health).label(), "healthy");
}

#[test]
fn hovering_an_entity_that_never_exists_keeps_highlight_hidden() {
    let mut store = CityStore::default();
    let mut sync = FrameSynchronizer::default();
    let mut handle = HighlightHandle::default();

    route(&mut store, &PointerEvent::Enter("svc-a".to_string()));
    for _ in 0..3 {
        sync.tick(&store, &mut handle);
        assert!(!handle.visible);
    }
    assert_eq!(sync.last_command(), Some(HighlightCommand::Hide));
}

#[test]
fn highlight_appears_once_hovered_entity_arrives() {
    let mut store = CityStore::default();
    let mut sync = FrameSynchronizer::default();
    let mut handle = HighlightHandle::default();

    store.set_hovered(Some("svc-a"));
    sync.tick(&store, &mut handle);
    assert!(!handle.visible);

    store.place_building("svc-a", 3.0, 0.0);
    store.update_metrics("svc-a", 0.5, 1.0);
    assert!(sync.tick(&store, &mut handle));
    assert!(handle.visible);
    assert_eq!(handle.position[0], 3.0);
    assert_eq!(handle.position[2], 0.0);
}

#[test]
fn switching_selection_is_a_single_transition() {
    let mut store = CityStore::default();
    store.update_metrics("svc-a", 1.0, 1.0);
    store.update_metrics("svc-b", 1.0, 1.0);
    store.set_selected(Some("svc-a"));

    let events = recorded_events(&mut store);
    store.set_selected(Some("svc-b"));

    let events = events.lock().expect("events");
    assert_eq!(
        *events,
        vec![StoreEvent::SelectionChanged {
            previous: Some("svc-a".to_string()),
            current: Some("svc-b".to_string()),
        }]
    );
    assert_eq!(store.selected_id(), Some("svc-b"));
}

#[test]
fn click_on_empty_space_closes_the_inspector() {
    let mut store = CityStore::default();
    let mapper = GeometryMapper::default();
    let mut tracker = PointerTracker::default();
    store.update_metrics("svc-a", 0.8, 1.0);

    for event in tracker.update(Some("svc-a")) {
        route(&mut store, &event);
    }
    route(&mut store, &tracker.click());
    assert!(InspectorView::from_store(&store, &mapper).is_some());

    for event in tracker.update(None) {
        route(&mut store, &event);
    }
    route(&mut store, &tracker.click());
    assert_eq!(store.selected_id(), None);
    assert!(InspectorView::from_store(&store, &mapper).is_none());
}

#[test]
fn repeated_hover_notifies_once() {
    let mut store = CityStore::default();
    let events = recorded_events(&mut store);

    store.set_hovered(Some("svc-a"));
    store.set_hovered(Some("svc-a"));
    assert_eq!(events.lock().expect("events").len(), 1);
}

#[test]
fn moving_between_buildings_keeps_the_new_hover() {
    let mut store = CityStore::default();
    store.update_metrics("svc-a", 1.0, 1.0);
    store.update_metrics("svc-b", 1.0, 1.0);

    // Host delivered the enter for svc-b before the leave for svc-a.
    route(&mut store, &PointerEvent::Enter("svc-a".to_string()));
    route(&mut store, &PointerEvent::Enter("svc-b".to_string()));
    route(&mut store, &PointerEvent::Leave("svc-a".to_string()));
    assert_eq!(store.hovered_id(), Some("svc-b"));
}

#[test]
fn inbox_feeds_store_from_producer_thread() {
    let inbox = MetricsInbox::new();
    let sender = inbox.sender();
    std::thread::spawn(move || {
        sender.update_metrics("svc-a", 0.2, 3.0);
    })
    .join()
    .expect("producer");

    let mut store = CityStore::default();
    inbox.drain_into(&mut store);
    let mapper = GeometryMapper::default();
    let state = store.get_building_state("svc-a").expect("svc-a");
    assert_eq!(mapper.health_tier(state.current_health), HealthTier::Critical);
}
