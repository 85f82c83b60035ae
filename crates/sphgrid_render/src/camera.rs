use bevy::input::mouse::{AccumulatedMouseMotion, AccumulatedMouseScroll};
use bevy::prelude::*;
use sphgrid_sim::FluidSimulation;

/// Free-fly camera around the fluid
#[derive(Component)]
pub struct FlyCamera {
    pub speed: f32,
    pub sensitivity: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for FlyCamera {
    fn default() -> Self {
        Self {
            speed: 1.0,
            sensitivity: 0.003,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

/// Camera placement that frames the mesh bounds
fn framing(sim: &FluidSimulation) -> (Vec3, Vec3, f32) {
    let bounds = &sim.state().bounds;
    let center = Vec3::from(bounds.center);
    let extent = Vec3::from(bounds.half_extents).max_element();
    (center + Vec3::new(0.0, 0.5, 2.5) * extent, center, extent)
}

pub fn spawn_camera(mut commands: Commands, sim: Res<FluidSimulation>) {
    let (pos, look_at, extent) = framing(&sim);
    let transform = Transform::from_translation(pos).looking_at(look_at, Vec3::Y);
    let (yaw, pitch, _) = transform.rotation.to_euler(EulerRot::YXZ);

    commands.spawn((
        Camera3d::default(),
        IsDefaultUiCamera,
        transform,
        FlyCamera {
            speed: extent,
            yaw,
            pitch,
            ..default()
        },
    ));

    commands.spawn((
        DirectionalLight {
            illuminance: 8_000.0,
            ..default()
        },
        Transform::from_xyz(1.0, 2.0, 1.5).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.insert_resource(AmbientLight {
        color: Color::srgb(0.6, 0.7, 0.9),
        brightness: 200.0,
    });
}

/// WASD + QE to move, right mouse to look, scroll to change speed
pub fn fly_camera_system(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mouse_scroll: Res<AccumulatedMouseScroll>,
    mut query: Query<(&mut Transform, &mut FlyCamera)>,
) {
    let Ok((mut transform, mut cam)) = query.get_single_mut() else {
        return;
    };
    let dt = time.delta_secs();

    if mouse_button.pressed(MouseButton::Right) {
        let delta = mouse_motion.delta;
        cam.yaw -= delta.x * cam.sensitivity;
        cam.pitch = (cam.pitch - delta.y * cam.sensitivity).clamp(-1.5, 1.5);
    }
    transform.rotation = Quat::from_euler(EulerRot::YXZ, cam.yaw, cam.pitch, 0.0);

    let scroll = mouse_scroll.delta.y;
    if scroll != 0.0 {
        cam.speed = (cam.speed * (1.0 + scroll * 0.1)).clamp(0.01, 1000.0);
    }

    let forward = *transform.forward();
    let right = *transform.right();
    let bindings = [
        (KeyCode::KeyW, forward),
        (KeyCode::KeyS, -forward),
        (KeyCode::KeyD, right),
        (KeyCode::KeyA, -right),
        (KeyCode::KeyE, Vec3::Y),
        (KeyCode::KeyQ, -Vec3::Y),
    ];
    let velocity: Vec3 = bindings
        .iter()
        .filter(|(key, _)| keyboard.pressed(*key))
        .map(|(_, dir)| *dir)
        .sum();

    let boost = if keyboard.pressed(KeyCode::ShiftLeft) || keyboard.pressed(KeyCode::ShiftRight) {
        5.0
    } else {
        1.0
    };
    if velocity.length_squared() > 0.0 {
        transform.translation += velocity.normalize() * cam.speed * boost * dt;
    }
}

/// [O] puts the camera back in front of the mesh bounds
pub fn recenter_system(
    keyboard: Res<ButtonInput<KeyCode>>,
    sim: Res<FluidSimulation>,
    mut query: Query<(&mut Transform, &mut FlyCamera)>,
) {
    if !keyboard.just_pressed(KeyCode::KeyO) {
        return;
    }
    let Ok((mut transform, mut cam)) = query.get_single_mut() else {
        return;
    };
    let (pos, look_at, _) = framing(&sim);
    *transform = Transform::from_translation(pos).looking_at(look_at, Vec3::Y);
    let (yaw, pitch, _) = transform.rotation.to_euler(EulerRot::YXZ);
    cam.yaw = yaw;
    cam.pitch = pitch;
    info!("Camera: recentered on mesh bounds");
}
