use bevy::prelude::*;
use sphgrid_core::PARTICLE_RENDER_SIZE;
use sphgrid_physics::particle::average_density;
use sphgrid_sim::FluidSimulation;
use sphgrid_sim::requests::FieldRebuildRequested;

/// Marker for particle point entities in the render world
#[derive(Component)]
pub struct ParticlePoint {
    pub index: usize,
}

/// Maximum rendered particles (subset of simulation for performance)
const MAX_RENDER_PARTICLES: usize = 20_000;

/// Shared handles and the configuration the point entities were built for
#[derive(Resource, Default)]
pub struct ParticleVisuals {
    particle_count: u32,
    mesh: Handle<Mesh>,
    interior: Handle<StandardMaterial>,
    surface: Handle<StandardMaterial>,
}

/// Visualization settings; changing them marks the field dirty
#[derive(Resource, Debug, Default)]
pub struct ViewSettings {
    /// Hide particles below the surface density
    pub surface_only: bool,
}

/// Figures from the last preview, shown in the HUD
#[derive(Resource, Debug, Default)]
pub struct PreviewStats {
    pub average_density: f32,
    pub surface_count: usize,
    pub shown: usize,
}

fn render_stride(particle_count: usize) -> usize {
    particle_count.div_ceil(MAX_RENDER_PARTICLES).max(1)
}

/// Rebuild the point entities whenever the particle count changes.
pub fn sync_particle_visuals(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut visuals: ResMut<ParticleVisuals>,
    sim: Res<FluidSimulation>,
    points: Query<Entity, With<ParticlePoint>>,
) {
    let config = sim.config();
    if visuals.particle_count == config.particle_count {
        return;
    }
    for entity in &points {
        commands.entity(entity).despawn();
    }

    let radius = PARTICLE_RENDER_SIZE * sim.state().bounds.mesh_size();
    visuals.mesh = meshes.add(Sphere::new(radius).mesh().uv(8, 6));
    visuals.interior = materials.add(StandardMaterial {
        base_color: Color::srgba(0.2, 0.4, 0.9, 0.6),
        alpha_mode: AlphaMode::Blend,
        ..default()
    });
    visuals.surface = materials.add(StandardMaterial {
        base_color: Color::srgb(0.4, 0.9, 1.0),
        emissive: LinearRgba::rgb(0.1, 0.3, 0.4),
        ..default()
    });

    let n = config.particle_count as usize;
    let stride = render_stride(n);
    for index in (0..n).step_by(stride) {
        commands.spawn((
            Mesh3d(visuals.mesh.clone()),
            MeshMaterial3d(visuals.interior.clone()),
            Transform::from_translation(Vec3::from(config.spawn_center)),
            ParticlePoint { index },
        ));
    }
    visuals.particle_count = config.particle_count;
    info!(
        "Spawned {} render particles from {} simulation particles",
        n.div_ceil(stride),
        n
    );
}

/// Move the points to the latest preview and color them by density.
pub fn update_particle_visuals(
    mut sim: ResMut<FluidSimulation>,
    visuals: Res<ParticleVisuals>,
    view: Res<ViewSettings>,
    mut stats: ResMut<PreviewStats>,
    mut query: Query<(
        &mut Transform,
        &mut Visibility,
        &mut MeshMaterial3d<StandardMaterial>,
        &ParticlePoint,
    )>,
) {
    let surface_density = sim.config().surface_density;
    let Some(preview) = sim.preview() else {
        return;
    };

    let mut surface_count = 0;
    let mut shown = 0;
    for (mut transform, mut visibility, mut material, point) in query.iter_mut() {
        let Some(p) = preview.get(point.index) else {
            continue;
        };
        transform.translation = Vec3::from(p.position);

        let on_surface = p.density >= surface_density;
        surface_count += on_surface as usize;
        let wanted = if on_surface {
            &visuals.surface
        } else {
            &visuals.interior
        };
        if material.0 != *wanted {
            material.0 = wanted.clone();
        }

        let visible = on_surface || !view.surface_only;
        shown += visible as usize;
        *visibility = if visible {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }

    stats.average_density = average_density(preview);
    stats.surface_count = surface_count;
    stats.shown = shown;
}

pub fn log_field_rebuilds(mut events: EventReader<FieldRebuildRequested>, view: Res<ViewSettings>) {
    for event in events.read() {
        debug!(
            "Field rebuilt at frame {} (surface only: {})",
            event.frame, view.surface_only
        );
    }
}
