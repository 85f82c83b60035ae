//! Runs the fluid on the CPU device without a window and writes the final
//! particle positions as a point file.
//!
//! Usage: `headless [output.off]`

use bevy::log::LogPlugin;
use bevy::prelude::*;
use sphgrid_core::{MeshBounds, ParticleCount, SimConfig};
use sphgrid_physics::particle::centroid;
use sphgrid_sim::pipeline::SimulationPlugin;
use sphgrid_sim::{FluidSimulation, SimError};
use sphgrid_storage::{ExportFilter, PointSet, export_to_dir, save_points};
use std::path::{Path, PathBuf};
use std::time::Instant;

const FRAMES: u32 = 200;
const REPORT_EVERY: u32 = 50;

fn main() -> Result<(), SimError> {
    let output = std::env::args().nth(1).map(PathBuf::from);

    let settings = SimConfig {
        particle_count: ParticleCount::K16,
        ..SimConfig::default()
    };
    let sim = FluidSimulation::with_cpu(settings, MeshBounds::default())?;

    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default()))
        .insert_resource(sim)
        .add_plugins(SimulationPlugin);
    app.finish();
    app.cleanup();

    let start = Instant::now();
    for frame in 1..=FRAMES {
        app.update();
        if frame % REPORT_EVERY == 0 {
            let mut sim = app.world_mut().resource_mut::<FluidSimulation>();
            let particles = sim.read_particles()?;
            let [cx, cy, cz] = centroid(&particles);
            info!(
                "frame {frame}: avg density {:.2}, centroid ({cx:.5}, {cy:.5}, {cz:.5})",
                sim.last_average_density().unwrap_or(0.0)
            );
        }
    }
    info!(
        "{FRAMES} frames in {:.2}s",
        start.elapsed().as_secs_f64()
    );

    let mut sim = app.world_mut().resource_mut::<FluidSimulation>();
    let particles = sim.read_particles()?;
    let (path, count) = match output {
        Some(path) => {
            let count = save_points(&path, &particles, ExportFilter::All)?;
            (path, count)
        }
        None => {
            let summary = export_to_dir(Path::new("exports"), PointSet::All, &particles, ExportFilter::All)?;
            (summary.path, summary.vertex_count)
        }
    };
    info!("Wrote {count} points to {}", path.display());
    Ok(())
}
