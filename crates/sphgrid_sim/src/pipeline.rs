use bevy::prelude::*;
use bevy::render::renderer::{RenderDevice, RenderQueue};
use sphgrid_core::SimConfig;
use sphgrid_gpu::GpuDevice;

use super::error::SimError;
use super::requests::{FieldRebuildRequested, OutputDirs, SimRequest, SimStatus};
use super::simulation::FluidSimulation;

/// Bevy plugin for the simulation pipeline. Expects a [`FluidSimulation`]
/// resource to be inserted by the app.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<SimRequest>()
            .add_event::<FieldRebuildRequested>()
            .init_resource::<SimStatus>()
            .init_resource::<OutputDirs>()
            .add_systems(Startup, attach_gpu_device)
            .add_systems(Update, (apply_requests, simulation_tick).chain());
    }
}

/// Move the simulation onto the render device when there is one.
fn attach_gpu_device(
    render_device: Option<Res<RenderDevice>>,
    render_queue: Option<Res<RenderQueue>>,
    mut sim: ResMut<FluidSimulation>,
    mut status: ResMut<SimStatus>,
) {
    let (Some(device), Some(queue)) = (render_device, render_queue) else {
        info!("No render device, simulating on {}", sim.device_name());
        return;
    };
    let gpu = GpuDevice::new(device.clone(), queue.clone());
    match sim.replace_device(Box::new(gpu)) {
        Ok(()) => status.set("Simulating on GPU"),
        Err(e) => {
            warn!("GPU device rejected, staying on {}: {e}", sim.device_name());
            status.set(format!("GPU unavailable: {e}"));
        }
    }
}

fn with_settings(sim: &mut FluidSimulation, edit: impl FnOnce(&mut SimConfig)) -> Result<(), SimError> {
    let mut settings = sim.settings().clone();
    edit(&mut settings);
    sim.apply_settings(settings)
}

/// Apply queued GUI requests between frames.
fn apply_requests(
    mut requests: EventReader<SimRequest>,
    mut sim: ResMut<FluidSimulation>,
    mut status: ResMut<SimStatus>,
    dirs: Res<OutputDirs>,
) {
    for request in requests.read() {
        let result = match request {
            SimRequest::TogglePause => {
                sim.toggle_pause();
                Ok(())
            }
            SimRequest::Reset => sim.reset_particles(),
            SimRequest::InvertNormals => sim.invert_normals(),
            SimRequest::CycleParticleCount => {
                with_settings(&mut sim, |s| s.particle_count = s.particle_count.next())
            }
            SimRequest::SetKernelScale(scale) => with_settings(&mut sim, |s| s.kernel_scale = *scale),
            SimRequest::SetSpeed(speed) => with_settings(&mut sim, |s| s.speed = *speed),
            SimRequest::SetSurfaceThreshold(threshold) => {
                with_settings(&mut sim, |s| s.surface_threshold = *threshold)
            }
            SimRequest::ScrubOffset(offset) => sim.scrub_offset(*offset),
            SimRequest::EndScrub => {
                sim.end_scrub();
                Ok(())
            }
            SimRequest::Export(set) => sim.export_points(&dirs.exports, *set).map(|summary| {
                info!(
                    "Exported {} points to {}",
                    summary.vertex_count,
                    summary.path.display()
                );
                status.set(format!(
                    "Saved {} points to {}",
                    summary.vertex_count,
                    summary.path.display()
                ));
            }),
            SimRequest::SaveSnapshot => sim.save_snapshot(&dirs.snapshots).map(|path| {
                info!("Snapshot saved to {}", path.display());
                status.set(format!("Snapshot saved to {}", path.display()));
            }),
            SimRequest::LoadLatestSnapshot => sim.load_latest_snapshot(&dirs.snapshots).map(|path| {
                info!("Snapshot loaded from {}", path.display());
                status.set(format!("Loaded {}", path.display()));
            }),
            SimRequest::MarkFieldDirty => {
                sim.mark_field_dirty();
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("{request:?} failed: {e}");
            status.set(format!("{request:?} failed: {e}"));
        }
    }
}

/// Main simulation tick: one full SPH frame per app update
fn simulation_tick(
    mut sim: ResMut<FluidSimulation>,
    mut status: ResMut<SimStatus>,
    mut rebuilds: EventWriter<FieldRebuildRequested>,
) {
    match sim.advance_frame() {
        Ok(report) => {
            if report.field_rebuild {
                rebuilds.send(FieldRebuildRequested {
                    frame: report.frame,
                });
            }
        }
        Err(e) => {
            error!("Frame {} failed, pausing: {e}", sim.state().frame);
            sim.set_paused(true);
            status.set(format!("Simulation paused: {e}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphgrid_core::{MeshBounds, ParticleCount};

    fn app() -> App {
        let settings = SimConfig {
            particle_count: ParticleCount::K8,
            ..SimConfig::default()
        };
        let sim = FluidSimulation::with_cpu(settings, MeshBounds::default()).unwrap();
        let mut app = App::new();
        app.insert_resource(sim).add_plugins(SimulationPlugin);
        app
    }

    #[test]
    fn test_update_advances_one_frame() {
        let mut app = app();
        app.update();
        app.update();
        let sim = app.world().resource::<FluidSimulation>();
        assert_eq!(sim.state().frame, 2);
        assert_eq!(sim.device_name(), "cpu");
    }

    #[test]
    fn test_requests_applied_before_tick() {
        let mut app = app();
        app.world_mut().send_event(SimRequest::TogglePause);
        app.world_mut().send_event(SimRequest::SetSpeed(2.0));
        app.update();

        let sim = app.world().resource::<FluidSimulation>();
        assert!(sim.state().paused);
        assert_eq!(sim.state().frame, 0);
        assert_eq!(sim.settings().speed, 2.0);
    }

    #[test]
    fn test_failed_request_reported_and_frame_continues() {
        let mut app = app();
        let empty = std::env::temp_dir().join("sphgrid-no-snapshots-here");
        app.insert_resource(OutputDirs {
            exports: empty.clone(),
            snapshots: empty,
        });
        app.world_mut().send_event(SimRequest::LoadLatestSnapshot);
        app.update();

        let status = app.world().resource::<SimStatus>();
        assert!(status.message.contains("failed"), "{}", status.message);
        assert_eq!(app.world().resource::<FluidSimulation>().state().frame, 1);
    }
}
