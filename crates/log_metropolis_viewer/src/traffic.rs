use std::collections::HashMap;

use bevy::prelude::*;
use log_metropolis::{Rgb, TrafficRoute};

use super::city_scene::{rgb_color, CityWorld};

const PARTICLE_RADIUS: f32 = 0.18;
const PARTICLE_GLOW: f32 = 3.0;
// Route phase per second: one roof-to-roof trip takes two seconds.
const PARTICLE_SPEED: f32 = 0.5;

type RouteKey = (String, String);

#[derive(Resource)]
pub(super) struct TrafficAssets {
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
}

impl TrafficAssets {
    pub(super) fn new(
        color: Rgb,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<StandardMaterial>,
    ) -> Self {
        let base = rgb_color(color);
        let linear = base.to_linear();
        Self {
            mesh: meshes.add(Sphere::new(PARTICLE_RADIUS)),
            material: materials.add(StandardMaterial {
                base_color: base,
                emissive: LinearRgba::new(
                    linear.red * PARTICLE_GLOW,
                    linear.green * PARTICLE_GLOW,
                    linear.blue * PARTICLE_GLOW,
                    1.0,
                ),
                unlit: true,
                ..default()
            }),
        }
    }
}

#[derive(Component)]
pub(super) struct TrafficParticle;

/// Particles currently in flight, keyed by (source, target).
#[derive(Resource, Default)]
pub(super) struct TrafficScene {
    pub(super) particles: HashMap<RouteKey, Vec<Entity>>,
    clock: f32,
}

/// Spreads `count` particles evenly along the route, all moving with `clock`.
pub(super) fn particle_phase(clock: f32, slot: usize, count: usize) -> f32 {
    if count == 0 {
        return clock.rem_euclid(1.0);
    }
    (clock + slot as f32 / count as f32).rem_euclid(1.0)
}

/// Links whose endpoints are both known and active, with their particle count.
fn live_routes(city: &CityWorld) -> HashMap<RouteKey, (TrafficRoute, usize)> {
    let mapper = city.mapper();
    let mut routes = HashMap::new();
    for link in city.store.traffic() {
        let source = city.store.get_building_state(&link.source);
        let target = city.store.get_building_state(&link.target);
        let (Some(source), Some(target)) = (source, target) else {
            continue;
        };
        if !source.active || !target.active {
            continue;
        }
        let count = mapper.traffic_particles(link.rate);
        if count == 0 {
            continue;
        }
        routes.insert(
            (link.source.clone(), link.target.clone()),
            (mapper.traffic_route(source, target), count),
        );
    }
    routes
}

/// Hot path: particles move every frame, and are spawned or despawned as the
/// store's links come and go.
pub(super) fn sync_traffic_particles(
    mut commands: Commands,
    time: Res<Time>,
    city: Res<CityWorld>,
    assets: Option<Res<TrafficAssets>>,
    mut scene: ResMut<TrafficScene>,
    mut particles: Query<&mut Transform, With<TrafficParticle>>,
) {
    let Some(assets) = assets else {
        return;
    };
    let clock = (scene.clock + time.delta_secs() * PARTICLE_SPEED).rem_euclid(1.0);
    scene.clock = clock;
    let routes = live_routes(&city);

    scene.particles.retain(|key, entities| {
        let keep = routes.get(key).map_or(0, |(_, count)| *count);
        if entities.len() > keep {
            for entity in entities.drain(keep..) {
                commands.entity(entity).despawn();
            }
        }
        !entities.is_empty()
    });

    for (key, (route, count)) in routes {
        let position =
            |slot: usize| Vec3::from_array(route.point_at(particle_phase(clock, slot, count)));
        let entities = scene.particles.entry(key.clone()).or_default();
        for (slot, &entity) in entities.iter().enumerate() {
            if let Ok(mut transform) = particles.get_mut(entity) {
                transform.translation = position(slot);
            }
        }
        while entities.len() < count {
            let slot = entities.len();
            let entity = commands
                .spawn((
                    Mesh3d(assets.mesh.clone()),
                    MeshMaterial3d(assets.material.clone()),
                    Transform::from_translation(position(slot)),
                    TrafficParticle,
                    Name::new(format!("traffic:{}->{}", key.0, key.1)),
                ))
                .id();
            entities.push(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn particles_are_spread_evenly_and_wrap() {
        assert_eq!(particle_phase(0.0, 0, 4), 0.0);
        assert_eq!(particle_phase(0.0, 2, 4), 0.5);
        assert!((particle_phase(0.9, 1, 2) - 0.4).abs() < 1e-6);
        assert_eq!(particle_phase(1.25, 0, 0), 0.25);
    }
}
