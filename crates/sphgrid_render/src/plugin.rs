use bevy::prelude::*;

use super::camera;
use super::controls;
use super::particles;
use super::ui;

/// Camera, particle preview, HUD and keyboard controls
pub struct SphRenderPlugin;

impl Plugin for SphRenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ui::HudThrottle>()
            .init_resource::<particles::ParticleVisuals>()
            .init_resource::<particles::ViewSettings>()
            .init_resource::<particles::PreviewStats>()
            .add_systems(Startup, (camera::spawn_camera, ui::spawn_hud))
            .add_systems(
                Update,
                (
                    camera::fly_camera_system,
                    camera::recenter_system,
                    controls::keyboard_controls,
                    controls::offset_scrub_controls,
                    particles::sync_particle_visuals,
                    particles::update_particle_visuals.after(particles::sync_particle_visuals),
                    particles::log_field_rebuilds,
                    ui::update_hud.after(particles::update_particle_visuals),
                ),
            );
    }
}
