use bevy::prelude::*;
use log_metropolis::{HighlightCommand, HighlightVisual, Rgb};

use super::city_scene::CityWorld;

const GHOST_ALPHA: f32 = 0.22;
const GHOST_GLOW: f32 = 1.4;

#[derive(Component)]
pub(super) struct GhostCursor;

#[derive(Resource, Default)]
pub(super) struct GhostCursorState {
    pub(super) entity: Option<Entity>,
}

pub(super) fn spawn_ghost_cursor(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
    color: Rgb,
    state: &mut GhostCursorState,
) -> Entity {
    if let Some(entity) = state.entity {
        return entity;
    }

    let material = materials.add(StandardMaterial {
        base_color: Color::srgba(color.r, color.g, color.b, GHOST_ALPHA),
        emissive: LinearRgba::from(Color::srgb(color.r, color.g, color.b)) * GHOST_GLOW,
        unlit: true,
        alpha_mode: AlphaMode::Blend,
        ..default()
    });

    let entity = commands
        .spawn((
            Mesh3d(meshes.add(Cuboid::new(1.0, 1.0, 1.0))),
            MeshMaterial3d(material),
            Transform::IDENTITY,
            Visibility::Hidden,
            GhostCursor,
            Name::new("city:ghost_cursor"),
        ))
        .id();

    state.entity = Some(entity);
    entity
}

/// Bevy side of the highlight: copies each command onto the ghost entity.
pub(super) struct GhostCursorVisual<'a> {
    pub(super) transform: &'a mut Transform,
    pub(super) visibility: &'a mut Visibility,
}

impl HighlightVisual for GhostCursorVisual<'_> {
    fn apply(&mut self, command: &HighlightCommand) {
        match *command {
            HighlightCommand::Hide => *self.visibility = Visibility::Hidden,
            HighlightCommand::Show { position, scale } => {
                self.transform.translation = Vec3::from_array(position);
                self.transform.scale = Vec3::from_array(scale);
                *self.visibility = Visibility::Visible;
            }
        }
    }
}

/// Runs every frame, after the inbox drain, so the cursor never trails a
/// building that moved or vanished this frame.
pub(super) fn sync_ghost_cursor(
    mut city: ResMut<CityWorld>,
    state: Res<GhostCursorState>,
    mut ghosts: Query<(&mut Transform, &mut Visibility), With<GhostCursor>>,
) {
    let Some(entity) = state.entity else {
        return;
    };
    let Ok((mut transform, mut visibility)) = ghosts.get_mut(entity) else {
        return;
    };

    let city = city.as_mut();
    let mut visual = GhostCursorVisual {
        transform: transform.as_mut(),
        visibility: visibility.as_mut(),
    };
    city.sync.tick(&city.store, &mut visual);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ghost_visual_copies_show_and_hide() {
        let mut transform = Transform::IDENTITY;
        let mut visibility = Visibility::Hidden;
        let mut visual = GhostCursorVisual {
            transform: &mut transform,
            visibility: &mut visibility,
        };

        visual.apply(&HighlightCommand::Show {
            position: [3.0, 1.0, -3.0],
            scale: [1.8, 2.3, 1.8],
        });
        visual.apply(&HighlightCommand::Hide);
        assert_eq!(visibility, Visibility::Hidden);
        assert_eq!(transform.translation, Vec3::new(3.0, 1.0, -3.0));
        assert_eq!(transform.scale, Vec3::new(1.8, 2.3, 1.8));
    }
}
