use std::collections::HashMap;

use bevy::prelude::*;
use log_metropolis::{
    BuildingVisual, CityStore, CityVisualConfig, DirtyTracker, FrameSynchronizer, GeometryMapper,
    HealthTier, MetricsInbox, PointerTracker, Rgb, TierStyle,
};

use super::camera_controls::{OrbitCamera, Viewer3dCamera};
use super::ghost_cursor::{spawn_ghost_cursor, GhostCursorState};
use super::traffic::TrafficAssets;

const GROUND_SIZE: f32 = 400.0;
const GROUND_COLOR: u32 = 0x16213e;

/// The city model as seen by the viewer: store, ingestion queue and the
/// per-frame drivers that read from it.
#[derive(Resource)]
pub(super) struct CityWorld {
    pub(super) store: CityStore,
    pub(super) inbox: MetricsInbox,
    pub(super) dirty: DirtyTracker,
    pub(super) sync: FrameSynchronizer,
    pub(super) tracker: PointerTracker,
}

impl CityWorld {
    pub(super) fn new(config: CityVisualConfig) -> Self {
        let mut store = CityStore::new(config.grid_spacing);
        let dirty = DirtyTracker::attach(&mut store);
        Self {
            store,
            inbox: MetricsInbox::new(),
            dirty,
            sync: FrameSynchronizer::new(GeometryMapper::new(config)),
            tracker: PointerTracker::default(),
        }
    }

    pub(super) fn mapper(&self) -> &GeometryMapper {
        self.sync.mapper()
    }
}

#[derive(Resource, Default)]
pub(super) struct CityScene {
    pub(super) buildings: HashMap<String, Entity>,
}

#[derive(Resource)]
pub(super) struct CityAssets {
    building_mesh: Handle<Mesh>,
    healthy: Handle<StandardMaterial>,
    degraded: Handle<StandardMaterial>,
    critical: Handle<StandardMaterial>,
    inactive: Handle<StandardMaterial>,
}

impl CityAssets {
    pub(super) fn new(
        config: &CityVisualConfig,
        meshes: &mut Assets<Mesh>,
        materials: &mut Assets<StandardMaterial>,
    ) -> Self {
        let palette = config.palette;
        Self {
            building_mesh: meshes.add(Cuboid::new(1.0, 1.0, 1.0)),
            healthy: materials.add(tier_material(palette.healthy)),
            degraded: materials.add(tier_material(palette.degraded)),
            critical: materials.add(tier_material(palette.critical)),
            inactive: materials.add(tier_material(palette.inactive)),
        }
    }

    fn material_for(&self, visual: &BuildingVisual) -> Handle<StandardMaterial> {
        if !visual.active {
            return self.inactive.clone();
        }
        match visual.tier {
            HealthTier::Healthy => self.healthy.clone(),
            HealthTier::Degraded => self.degraded.clone(),
            HealthTier::Critical => self.critical.clone(),
        }
    }
}

#[derive(Component)]
pub(super) struct BuildingMarker {
    pub(super) id: String,
}

pub(super) fn rgb_color(rgb: Rgb) -> Color {
    Color::srgb(rgb.r, rgb.g, rgb.b)
}

fn tier_material(style: TierStyle) -> StandardMaterial {
    let base = rgb_color(style.color);
    let linear = base.to_linear();
    StandardMaterial {
        base_color: base,
        emissive: LinearRgba::new(
            linear.red * style.glow,
            linear.green * style.glow,
            linear.blue * style.glow,
            1.0,
        ),
        perceptual_roughness: 0.45,
        metallic: 0.1,
        ..default()
    }
}

pub(super) fn building_transform(visual: &BuildingVisual) -> Transform {
    Transform::from_translation(Vec3::from_array(visual.position))
        .with_scale(Vec3::from_array(visual.scale))
}

pub(super) fn setup_city_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut ghost: ResMut<GhostCursorState>,
    city: Res<CityWorld>,
) {
    let config = *city.mapper().config();
    commands.insert_resource(CityAssets::new(&config, &mut meshes, &mut materials));
    commands.insert_resource(TrafficAssets::new(
        config.highlight_color,
        &mut meshes,
        &mut materials,
    ));

    let focus = Vec3::ZERO;
    let transform = Transform::from_xyz(30.0, 30.0, 30.0).looking_at(focus, Vec3::Y);
    let orbit = OrbitCamera::from_transform(&transform, focus);
    commands.spawn((
        Camera3d::default(),
        Projection::from(PerspectiveProjection {
            fov: 50_f32.to_radians(),
            near: 0.1,
            far: 1000.0,
            ..default()
        }),
        transform,
        Viewer3dCamera,
        orbit,
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 12_000.0,
            color: Color::srgb_u8(0xff, 0xf8, 0xf0),
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(10.0, 20.0, 10.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 1_800.0,
            color: Color::srgb_u8(0xaa, 0xcc, 0xff),
            ..default()
        },
        Transform::from_xyz(-8.0, 8.0, -8.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    let ground_color = super::hex_color(GROUND_COLOR);
    commands.spawn((
        Mesh3d(meshes.add(Plane3d::default().mesh().size(GROUND_SIZE, GROUND_SIZE))),
        MeshMaterial3d(materials.add(StandardMaterial {
            base_color: ground_color,
            perceptual_roughness: 0.95,
            ..default()
        })),
        Transform::IDENTITY,
        Name::new("city:ground"),
    ));

    spawn_ghost_cursor(
        &mut commands,
        &mut meshes,
        &mut materials,
        config.highlight_color,
        &mut ghost,
    );
}

pub(super) fn drain_metrics_inbox(mut city: ResMut<CityWorld>) {
    let city = city.as_mut();
    let applied = city.inbox.drain_into(&mut city.store);
    if applied > 0 {
        debug!("applied {applied} inbox messages");
    }
}

/// Cold path: touches only buildings whose metrics changed since the last run.
pub(super) fn sync_building_entities(
    mut commands: Commands,
    city: Res<CityWorld>,
    assets: Option<Res<CityAssets>>,
    mut scene: ResMut<CityScene>,
    mut buildings: Query<(&mut Transform, &mut MeshMaterial3d<StandardMaterial>), With<BuildingMarker>>,
) {
    let Some(assets) = assets else {
        return;
    };

    for id in city.dirty.take() {
        let Some(state) = city.store.get_building_state(&id) else {
            continue;
        };
        let visual = city.mapper().building_visual(state);
        let transform = building_transform(&visual);
        let material = assets.material_for(&visual);

        if let Some(&entity) = scene.buildings.get(&id) {
            if let Ok((mut current, mut current_material)) = buildings.get_mut(entity) {
                *current = transform;
                if current_material.0 != material {
                    current_material.0 = material;
                }
                continue;
            }
        }

        let entity = commands
            .spawn((
                Mesh3d(assets.building_mesh.clone()),
                MeshMaterial3d(material),
                transform,
                BuildingMarker { id: id.clone() },
                Name::new(format!("building:{id}")),
            ))
            .id();
        scene.buildings.insert(id, entity);
    }
}
