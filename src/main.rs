use bevy::prelude::*;
use sphgrid_core::{MeshBounds, SimConfig};
use sphgrid_render::SphRenderPlugin;
use sphgrid_sim::pipeline::SimulationPlugin;
use sphgrid_sim::{FluidSimulation, SimError};

fn main() -> Result<(), SimError> {
    let sim = FluidSimulation::with_cpu(SimConfig::default(), MeshBounds::default())?;

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "sphgrid - SPH fluid".into(),
                resolution: (1600.0, 900.0).into(),
                ..default()
            }),
            ..default()
        }))
        .insert_resource(ClearColor(Color::srgb(0.02, 0.02, 0.04)))
        .insert_resource(sim)
        .add_plugins(SimulationPlugin)
        .add_plugins(SphRenderPlugin)
        .run();
    Ok(())
}
