use bevy::prelude::*;
use sphgrid_sim::FluidSimulation;
use sphgrid_sim::requests::SimStatus;

use super::particles::{PreviewStats, ViewSettings};

/// Marker for the HUD text
#[derive(Component)]
pub struct HudText;

/// Marker for the status line at the bottom
#[derive(Component)]
pub struct StatusText;

pub fn spawn_hud(mut commands: Commands) {
    commands.spawn((
        Text::new("sphgrid"),
        TextFont {
            font_size: 16.0,
            ..default()
        },
        TextColor(Color::srgba(0.7, 0.9, 1.0, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            top: Val::Px(10.0),
            left: Val::Px(10.0),
            ..default()
        },
        HudText,
    ));

    commands.spawn((
        Text::new(""),
        TextFont {
            font_size: 14.0,
            ..default()
        },
        TextColor(Color::srgba(1.0, 0.9, 0.5, 0.9)),
        Node {
            position_type: PositionType::Absolute,
            bottom: Val::Px(10.0),
            left: Val::Px(10.0),
            ..default()
        },
        StatusText,
    ));
}

/// HUD frame counter for throttling
#[derive(Resource, Default)]
pub struct HudThrottle {
    pub frame: u32,
}

/// Update HUD text every 10th frame (string formatting is expensive)
pub fn update_hud(
    sim: Res<FluidSimulation>,
    stats: Res<PreviewStats>,
    view: Res<ViewSettings>,
    status: Res<SimStatus>,
    mut throttle: ResMut<HudThrottle>,
    mut hud_query: Query<&mut Text, (With<HudText>, Without<StatusText>)>,
    mut status_query: Query<&mut Text, (With<StatusText>, Without<HudText>)>,
) {
    throttle.frame = throttle.frame.wrapping_add(1);
    if throttle.frame % 10 != 0 {
        return;
    }

    if let Ok(mut text) = hud_query.get_single_mut() {
        let state = sim.state();
        let config = sim.config();
        let settings = sim.settings();
        let paused = if state.scrubbing {
            " [OFFSET]"
        } else if state.paused {
            " [PAUSED]"
        } else {
            ""
        };
        let [gx, gy, gz] = config.grid.dims;

        **text = format!(
            "sphgrid on {} | Frame: {}{}\n\
             Particles: {} | Grid: {}x{}x{}\n\
             h: {:.5} (x{:.1}) | Speed: {:.3}x | dt: {:.5}\n\
             Surface: {:.2} of rest ({} particles){}\n\
             Avg density: {:.1} | Normals: {:+.0}\n\
             \n\
             [WASD/QE] Move  [RMB+Mouse] Look  [O] Recenter\n\
             [Space] Pause  [R] Reset  [N] Invert normals  [C] Particle count\n\
             [ [ ] ] Kernel  [- =] Speed  [, .] Surface  [V] Surface only\n\
             [Arrows/PgUp/PgDn] Offset  [P] Save points  [Shift+P] Save surface\n\
             [F5] Snapshot  [F9] Load snapshot",
            sim.device_name(),
            state.frame,
            paused,
            settings.particle_count.label(),
            gx,
            gy,
            gz,
            config.smoothing_length,
            settings.kernel_scale,
            settings.speed,
            config.time_step,
            settings.surface_threshold,
            stats.surface_count,
            if view.surface_only { " [ONLY]" } else { "" },
            stats.average_density,
            config.normal_scale,
        );
    }

    if let Ok(mut text) = status_query.get_single_mut() {
        if **text != status.message {
            **text = status.message.clone();
        }
    }
}
