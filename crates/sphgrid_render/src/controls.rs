use bevy::prelude::*;
use sphgrid_core::{MAX_KERNEL_SCALE, MAX_SPEED, MIN_KERNEL_SCALE, MIN_SPEED};
use sphgrid_sim::FluidSimulation;
use sphgrid_sim::requests::SimRequest;
use sphgrid_storage::PointSet;

use super::particles::ViewSettings;

/// Offset change per second while an arrow key is held, in half-extents
const SCRUB_RATE: f32 = 0.5;

const SCRUB_KEYS: [(KeyCode, usize, f32); 6] = [
    (KeyCode::ArrowRight, 0, 1.0),
    (KeyCode::ArrowLeft, 0, -1.0),
    (KeyCode::PageUp, 1, 1.0),
    (KeyCode::PageDown, 1, -1.0),
    (KeyCode::ArrowUp, 2, -1.0),
    (KeyCode::ArrowDown, 2, 1.0),
];

fn step_kernel_scale(scale: f32, step: f32) -> f32 {
    (scale + step).clamp(MIN_KERNEL_SCALE, MAX_KERNEL_SCALE)
}

/// Stored speed stays inside the range the time step is clamped to, so
/// halving and doubling always move the step.
fn scale_speed(speed: f32, factor: f32) -> f32 {
    (speed * factor).clamp(MIN_SPEED, MAX_SPEED)
}

/// Turn key presses into simulation requests
pub fn keyboard_controls(
    keyboard: Res<ButtonInput<KeyCode>>,
    sim: Res<FluidSimulation>,
    mut view: ResMut<ViewSettings>,
    mut requests: EventWriter<SimRequest>,
) {
    let settings = sim.settings();
    let shift = keyboard.pressed(KeyCode::ShiftLeft) || keyboard.pressed(KeyCode::ShiftRight);

    if keyboard.just_pressed(KeyCode::Space) {
        requests.send(SimRequest::TogglePause);
    }
    if keyboard.just_pressed(KeyCode::KeyR) {
        requests.send(SimRequest::Reset);
    }
    if keyboard.just_pressed(KeyCode::KeyN) {
        requests.send(SimRequest::InvertNormals);
    }
    if keyboard.just_pressed(KeyCode::KeyC) {
        requests.send(SimRequest::CycleParticleCount);
    }

    // [ ] kernel scale
    let kernel_step = if keyboard.just_pressed(KeyCode::BracketLeft) {
        -0.1
    } else if keyboard.just_pressed(KeyCode::BracketRight) {
        0.1
    } else {
        0.0
    };
    if kernel_step != 0.0 {
        let scale = step_kernel_scale(settings.kernel_scale, kernel_step);
        requests.send(SimRequest::SetKernelScale(scale));
    }

    // - = speed
    if keyboard.just_pressed(KeyCode::Minus) {
        requests.send(SimRequest::SetSpeed(scale_speed(settings.speed, 0.5)));
    }
    if keyboard.just_pressed(KeyCode::Equal) {
        requests.send(SimRequest::SetSpeed(scale_speed(settings.speed, 2.0)));
    }

    // , . surface threshold
    let threshold_step = if keyboard.just_pressed(KeyCode::Comma) {
        -0.01
    } else if keyboard.just_pressed(KeyCode::Period) {
        0.01
    } else {
        0.0
    };
    if threshold_step != 0.0 {
        let threshold = (settings.surface_threshold + threshold_step).max(0.0);
        requests.send(SimRequest::SetSurfaceThreshold(threshold));
        requests.send(SimRequest::MarkFieldDirty);
    }

    if keyboard.just_pressed(KeyCode::KeyV) {
        view.surface_only = !view.surface_only;
        requests.send(SimRequest::MarkFieldDirty);
    }

    if keyboard.just_pressed(KeyCode::KeyP) {
        let set = if shift { PointSet::Surface } else { PointSet::All };
        requests.send(SimRequest::Export(set));
    }
    if keyboard.just_pressed(KeyCode::F5) {
        requests.send(SimRequest::SaveSnapshot);
    }
    if keyboard.just_pressed(KeyCode::F9) {
        requests.send(SimRequest::LoadLatestSnapshot);
    }
}

/// Arrow keys and PageUp/PageDown drag the spawn point. The simulation stays
/// paused while any of them is held.
pub fn offset_scrub_controls(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    sim: Res<FluidSimulation>,
    mut requests: EventWriter<SimRequest>,
) {
    let mut offset = sim.settings().spawn_offset;
    let mut moved = false;
    for (key, axis, sign) in SCRUB_KEYS {
        if keyboard.pressed(key) {
            offset[axis] = (offset[axis] + sign * SCRUB_RATE * time.delta_secs()).clamp(-1.0, 1.0);
            moved = true;
        }
    }

    if moved {
        requests.send(SimRequest::ScrubOffset(offset));
    } else if sim.state().scrubbing && SCRUB_KEYS.iter().any(|(key, ..)| keyboard.just_released(*key)) {
        requests.send(SimRequest::EndScrub);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphgrid_core::SimConfig;

    #[test]
    fn test_kernel_keys_can_raise_default_scale() {
        let default = SimConfig::default().kernel_scale;
        assert!(step_kernel_scale(default, 0.1) > default);
        assert_eq!(step_kernel_scale(MAX_KERNEL_SCALE, 0.1), MAX_KERNEL_SCALE);
        assert_eq!(step_kernel_scale(0.05, -0.1), MIN_KERNEL_SCALE);
    }

    #[test]
    fn test_speed_recovers_after_halving_past_the_floor() {
        let mut speed = 1.0;
        for _ in 0..30 {
            speed = scale_speed(speed, 0.5);
        }
        assert_eq!(speed, MIN_SPEED);
        assert!(scale_speed(speed, 2.0) > MIN_SPEED);

        for _ in 0..30 {
            speed = scale_speed(speed, 2.0);
        }
        assert_eq!(speed, MAX_SPEED);
    }
}
