use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use log_metropolis::route;

use super::camera_controls::Viewer3dCamera;
use super::city_scene::{BuildingMarker, CityWorld};

// Releases further than this from the press are camera drags, not clicks.
const CLICK_DRAG_TOLERANCE_PX: f32 = 4.0;

/// Whether egui owned the pointer on the last HUD pass.
#[derive(Resource, Default)]
pub(super) struct HudPointerState {
    pub(super) over_ui: bool,
}

#[derive(Default)]
pub(super) struct ClickTracker {
    pressed_at: Option<Vec2>,
}

impl ClickTracker {
    fn press(&mut self, cursor: Option<Vec2>) {
        self.pressed_at = cursor;
    }

    fn release(&mut self, cursor: Option<Vec2>) -> bool {
        match (self.pressed_at.take(), cursor) {
            (Some(pressed), Some(released)) => {
                pressed.distance(released) <= CLICK_DRAG_TOLERANCE_PX
            }
            _ => false,
        }
    }
}

/// Slab test against an axis-aligned box given by center and full size.
pub(super) fn ray_box_distance(ray: Ray3d, center: Vec3, size: Vec3) -> Option<f32> {
    let half = size * 0.5;
    let min = center - half;
    let max = center + half;
    let origin = ray.origin;
    let direction = *ray.direction;

    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;
    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() < f32::EPSILON {
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        let t1 = (min[axis] - o) / d;
        let t2 = (max[axis] - o) / d;
        t_near = t_near.max(t1.min(t2));
        t_far = t_far.min(t1.max(t2));
        if t_near > t_far {
            return None;
        }
    }

    if t_far < 0.0 {
        return None;
    }
    Some(t_near.max(0.0))
}

pub(super) fn nearest_hit<'a>(
    ray: Ray3d,
    candidates: impl IntoIterator<Item = (&'a str, Vec3, Vec3)>,
) -> Option<&'a str> {
    let mut best: Option<(&str, f32)> = None;
    for (id, center, size) in candidates {
        let Some(distance) = ray_box_distance(ray, center, size) else {
            continue;
        };
        if best.map(|(_, best_dist)| distance < best_dist).unwrap_or(true) {
            best = Some((id, distance));
        }
    }
    best.map(|(id, _)| id)
}

/// Feeds this frame's hit into the pointer tracker and routes what falls out.
pub(super) fn resolve_pointer(city: &mut CityWorld, hit: Option<&str>, clicked: bool) {
    for event in city.tracker.update(hit) {
        route(&mut city.store, &event);
    }
    if clicked {
        let event = city.tracker.click();
        route(&mut city.store, &event);
    }
}

pub(super) fn pick_buildings(
    buttons: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    camera_query: Query<(&Camera, &GlobalTransform), With<Viewer3dCamera>>,
    buildings: Query<(&GlobalTransform, &BuildingMarker)>,
    hud: Res<HudPointerState>,
    mut city: ResMut<CityWorld>,
    mut clicks: Local<ClickTracker>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let cursor = window.cursor_position().filter(|_| !hud.over_ui);

    if buttons.just_pressed(MouseButton::Left) {
        clicks.press(cursor);
    }
    let clicked = buttons.just_released(MouseButton::Left) && clicks.release(cursor);

    let ray = cursor.and_then(|cursor| {
        let (camera, camera_transform) = camera_query.single().ok()?;
        camera.viewport_to_world(camera_transform, cursor).ok()
    });
    let hit = ray.and_then(|ray| {
        nearest_hit(
            ray,
            buildings.iter().map(|(transform, marker)| {
                let (scale, _, translation) = transform.to_scale_rotation_translation();
                (marker.id.as_str(), translation, scale)
            }),
        )
        .map(str::to_string)
    });

    resolve_pointer(&mut city, hit.as_deref(), clicked);
}
