use super::*;
use city_scene::{BuildingMarker, CityAssets};
use ghost_cursor::{spawn_ghost_cursor, GhostCursor};
use log_metropolis::{BuildingSnapshot, CitySnapshot, TrafficLink};
use picking::resolve_pointer;
use traffic::{TrafficAssets, TrafficParticle};

fn city_app() -> App {
    let config = CityVisualConfig::default();
    let mut meshes = Assets::<Mesh>::default();
    let mut materials = Assets::<StandardMaterial>::default();
    let assets = CityAssets::new(&config, &mut meshes, &mut materials);
    let traffic = TrafficAssets::new(config.highlight_color, &mut meshes, &mut materials);

    let mut app = App::new();
    app.insert_resource(CityWorld::new(config))
        .insert_resource(CityScene::default())
        .insert_resource(GhostCursorState::default())
        .insert_resource(TrafficScene::default())
        .insert_resource(Time::<()>::default())
        .insert_resource(assets)
        .insert_resource(traffic)
        .insert_resource(meshes)
        .insert_resource(materials);
    app
}

fn building_transforms(app: &mut App) -> Vec<(String, Transform)> {
    let world = app.world_mut();
    let mut query = world.query::<(&BuildingMarker, &Transform)>();
    let mut rows: Vec<_> = query
        .iter(world)
        .map(|(marker, transform)| (marker.id.clone(), *transform))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));
    rows
}

fn spawn_ghost(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut state: ResMut<GhostCursorState>,
) {
    spawn_ghost_cursor(
        &mut commands,
        &mut meshes,
        &mut materials,
        CityVisualConfig::default().highlight_color,
        &mut state,
    );
}

fn ghost_state(app: &mut App) -> (Transform, Visibility) {
    let world = app.world_mut();
    let mut query = world.query_filtered::<(&Transform, &Visibility), With<GhostCursor>>();
    let (transform, visibility) = query.single(world).expect("ghost cursor");
    (*transform, *visibility)
}

#[test]
fn building_entities_follow_store_without_duplicates() {
    let mut app = city_app();
    app.add_systems(Update, sync_building_entities);

    {
        let mut city = app.world_mut().resource_mut::<CityWorld>();
        city.store.update_metrics("svc-a", 0.9, 1.0);
        city.store.update_metrics("svc-b", 0.2, 0.0);
    }
    app.update();

    let rows = building_transforms(&mut app);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].0, "svc-a");
    assert_eq!(rows[0].1.scale.y, 4.5);

    app.world_mut()
        .resource_mut::<CityWorld>()
        .store
        .update_metrics("svc-a", 0.9, 2.0);
    app.update();

    let rows = building_transforms(&mut app);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1.scale.y, 8.5);
    assert_eq!(rows[0].1.translation.y, 4.25);
    assert_eq!(app.world().resource::<CityScene>().buildings.len(), 2);
}

#[test]
fn snapshots_from_the_inbox_become_buildings() {
    let mut app = city_app();
    app.add_systems(Update, (drain_metrics_inbox, sync_building_entities).chain());

    let sender = app.world().resource::<CityWorld>().inbox.sender();
    assert!(sender.snapshot(CitySnapshot {
        tick: 1,
        buildings: vec![BuildingSnapshot {
            id: "checkout".to_string(),
            grid_x: 3.0,
            grid_z: 0.0,
            health: 0.5,
            height: 0.4,
            active: true,
        }],
        links: Vec::new(),
    }));
    app.update();

    let rows = building_transforms(&mut app);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "checkout");
    assert_eq!(rows[0].1.translation.x, 3.0);
}

fn traffic_particle_xs(app: &mut App) -> Vec<f32> {
    let world = app.world_mut();
    let mut query = world.query_filtered::<&Transform, With<TrafficParticle>>();
    let mut xs: Vec<f32> = query.iter(world).map(|t| t.translation.x).collect();
    xs.sort_by(f32::total_cmp);
    xs
}

fn service(id: &str, grid_x: f32, active: bool) -> BuildingSnapshot {
    BuildingSnapshot {
        id: id.to_string(),
        grid_x,
        grid_z: 0.0,
        health: 1.0,
        height: 0.5,
        active,
    }
}

#[test]
fn traffic_particles_follow_links_between_live_buildings() {
    let mut app = city_app();
    app.add_systems(Update, (drain_metrics_inbox, sync_traffic_particles).chain());
    let sender = app.world().resource::<CityWorld>().inbox.sender();
    let link = TrafficLink {
        source: "gateway".to_string(),
        target: "auth".to_string(),
        rate: 0.5,
    };

    assert!(sender.snapshot(CitySnapshot {
        tick: 1,
        buildings: vec![service("auth", 3.0, true), service("gateway", 0.0, true)],
        links: vec![link.clone()],
    }));
    app.update();
    assert_eq!(traffic_particle_xs(&mut app), vec![0.0, 1.5]);

    app.update();
    assert_eq!(traffic_particle_xs(&mut app).len(), 2);

    assert!(sender.snapshot(CitySnapshot {
        tick: 2,
        buildings: vec![service("auth", 3.0, false), service("gateway", 0.0, true)],
        links: vec![link],
    }));
    app.update();
    assert!(traffic_particle_xs(&mut app).is_empty());
    assert!(app.world().resource::<TrafficScene>().particles.is_empty());
}

#[test]
fn ghost_cursor_hides_for_dangling_hover_and_tracks_live_one() {
    let mut app = city_app();
    app.add_systems(Startup, spawn_ghost);
    app.add_systems(Update, (drain_metrics_inbox, sync_ghost_cursor).chain());

    app.world_mut()
        .resource_mut::<CityWorld>()
        .store
        .set_hovered(Some("svc-a"));
    app.update();
    assert_eq!(ghost_state(&mut app).1, Visibility::Hidden);

    let sender = app.world().resource::<CityWorld>().inbox.sender();
    assert!(sender.update_metrics("svc-a", 0.9, 1.0));
    app.update();

    let (transform, visibility) = ghost_state(&mut app);
    assert_eq!(visibility, Visibility::Visible);
    let state = app
        .world()
        .resource::<CityWorld>()
        .store
        .get_building_state("svc-a")
        .cloned()
        .expect("svc-a");
    assert_eq!(transform.translation.x, state.grid_x);
    assert_eq!(transform.translation.z, state.grid_z);
    assert!(transform.scale.x > 1.5);

    app.world_mut()
        .resource_mut::<CityWorld>()
        .store
        .set_hovered(None);
    app.update();
    assert_eq!(ghost_state(&mut app).1, Visibility::Hidden);
}

#[test]
fn pointer_click_selects_and_empty_click_deselects() {
    let mut city = CityWorld::new(CityVisualConfig::default());
    city.store.update_metrics("svc-a", 0.8, 1.0);

    resolve_pointer(&mut city, Some("svc-a"), false);
    assert_eq!(city.store.hovered_id(), Some("svc-a"));
    assert_eq!(city.store.selected_id(), None);

    resolve_pointer(&mut city, Some("svc-a"), true);
    assert_eq!(city.store.selected_id(), Some("svc-a"));

    resolve_pointer(&mut city, None, false);
    assert_eq!(city.store.hovered_id(), None);
    assert_eq!(city.store.selected_id(), Some("svc-a"));

    resolve_pointer(&mut city, None, true);
    assert_eq!(city.store.selected_id(), None);
}

#[test]
fn decide_offline_prefers_force_online() {
    assert!(decide_offline(true, false, false));
    assert!(decide_offline(false, true, false));
    assert!(!decide_offline(true, true, true));
    assert!(!decide_offline(false, false, false));
}

#[test]
fn format_status_uses_friendly_errors() {
    assert_eq!(format_status(&ConnectionStatus::LocalDemo), "local demo");
    assert_eq!(
        format_status(&ConnectionStatus::Error(
            "Connection refused (os error 111)".to_string()
        )),
        "error: feed server unreachable, retrying..."
    );
}

#[test]
fn hex_color_splits_channels() {
    assert_eq!(hex_color(0x1a1a2e), Color::srgb_u8(0x1a, 0x1a, 0x2e));
}
