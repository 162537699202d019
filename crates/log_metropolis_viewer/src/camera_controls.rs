use bevy::ecs::message::MessageReader;
use bevy::input::mouse::{MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

use super::picking::HudPointerState;

pub(super) const ORBIT_MIN_RADIUS: f32 = 20.0;
pub(super) const ORBIT_MAX_RADIUS: f32 = 100.0;
// Keeps the camera from dipping below 18 degrees over the ground plane.
const ORBIT_MIN_ELEVATION: f32 = std::f32::consts::FRAC_PI_2 - std::f32::consts::PI / 2.5;
const ORBIT_MAX_ELEVATION: f32 = 1.45;
const ORBIT_ROTATE_SENSITIVITY: f32 = 0.005;
const ORBIT_PAN_SENSITIVITY: f32 = 0.0015;
const ORBIT_ZOOM_SENSITIVITY: f32 = 0.1;

#[derive(Component)]
pub(super) struct Viewer3dCamera;

/// Map-style orbit around a focus point on the ground plane.
#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub(super) struct OrbitCamera {
    pub(super) focus: Vec3,
    pub(super) radius: f32,
    pub(super) yaw: f32,
    pub(super) elevation: f32,
}

impl OrbitCamera {
    pub(super) fn from_transform(transform: &Transform, focus: Vec3) -> Self {
        let offset = transform.translation - focus;
        let radius = offset.length().clamp(ORBIT_MIN_RADIUS, ORBIT_MAX_RADIUS);
        let horizontal = Vec2::new(offset.x, offset.z).length();
        Self {
            focus,
            radius,
            yaw: offset.x.atan2(offset.z),
            elevation: offset
                .y
                .atan2(horizontal)
                .clamp(ORBIT_MIN_ELEVATION, ORBIT_MAX_ELEVATION),
        }
    }

    pub(super) fn offset(&self) -> Vec3 {
        let horizontal = self.radius * self.elevation.cos();
        Vec3::new(
            horizontal * self.yaw.sin(),
            self.radius * self.elevation.sin(),
            horizontal * self.yaw.cos(),
        )
    }

    pub(super) fn apply_to_transform(&self, transform: &mut Transform) {
        transform.translation = self.focus + self.offset();
        transform.look_at(self.focus, Vec3::Y);
    }
}

#[derive(Default)]
pub(super) struct OrbitDragState {
    last_cursor_position: Option<Vec2>,
}

pub(super) fn orbit_camera_controls(
    windows: Query<&Window, With<PrimaryWindow>>,
    buttons: Res<ButtonInput<MouseButton>>,
    hud: Option<Res<HudPointerState>>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    mut drag_state: Local<OrbitDragState>,
    mut query: Query<(&mut OrbitCamera, &mut Transform), With<Viewer3dCamera>>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let over_ui = hud.as_deref().is_some_and(|state| state.over_ui);

    let pan_drag = buttons.pressed(MouseButton::Left);
    let rotate_drag = buttons.pressed(MouseButton::Right);
    let dragging = !over_ui && (pan_drag || rotate_drag);
    let (delta, next_cursor) = drag_delta(
        drag_state.last_cursor_position,
        window.cursor_position(),
        dragging,
    );
    drag_state.last_cursor_position = next_cursor;

    let mut scroll = 0.0;
    for event in mouse_wheel.read() {
        if !over_ui {
            scroll += normalized_mouse_wheel_delta(event.unit, event.y);
        }
    }

    if delta == Vec2::ZERO && scroll == 0.0 {
        return;
    }
    let Ok((mut orbit, mut transform)) = query.single_mut() else {
        return;
    };
    if apply_orbit_input(&mut orbit, delta, scroll, rotate_drag, pan_drag && !rotate_drag) {
        orbit.apply_to_transform(&mut transform);
    }
}

fn drag_delta(
    previous: Option<Vec2>,
    current: Option<Vec2>,
    dragging: bool,
) -> (Vec2, Option<Vec2>) {
    if !dragging {
        return (Vec2::ZERO, None);
    }
    let Some(cursor) = current else {
        return (Vec2::ZERO, None);
    };
    let delta = previous.map(|last| cursor - last).unwrap_or(Vec2::ZERO);
    (delta, Some(cursor))
}

fn normalized_mouse_wheel_delta(unit: MouseScrollUnit, y: f32) -> f32 {
    match unit {
        MouseScrollUnit::Line => y,
        MouseScrollUnit::Pixel => y / MouseScrollUnit::SCROLL_UNIT_CONVERSION_FACTOR,
    }
}

/// Panning slides the focus across the ground plane; the camera height is
/// untouched.
fn apply_orbit_input(
    orbit: &mut OrbitCamera,
    delta: Vec2,
    scroll: f32,
    rotate_drag: bool,
    pan_drag: bool,
) -> bool {
    let mut changed = false;

    if rotate_drag && delta != Vec2::ZERO {
        orbit.yaw -= delta.x * ORBIT_ROTATE_SENSITIVITY;
        orbit.elevation = (orbit.elevation + delta.y * ORBIT_ROTATE_SENSITIVITY)
            .clamp(ORBIT_MIN_ELEVATION, ORBIT_MAX_ELEVATION);
        changed = true;
    }

    if pan_drag && delta != Vec2::ZERO {
        let right = Vec3::new(orbit.yaw.cos(), 0.0, -orbit.yaw.sin());
        let toward_camera = Vec3::new(orbit.yaw.sin(), 0.0, orbit.yaw.cos());
        let pan_scale = orbit.radius * ORBIT_PAN_SENSITIVITY;
        orbit.focus += (-delta.x * pan_scale) * right + (-delta.y * pan_scale) * toward_camera;
        changed = true;
    }

    if scroll != 0.0 {
        orbit.radius = (orbit.radius * (1.0 - scroll * ORBIT_ZOOM_SENSITIVITY))
            .clamp(ORBIT_MIN_RADIUS, ORBIT_MAX_RADIUS);
        changed = true;
    }

    changed
}
