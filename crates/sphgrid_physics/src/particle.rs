use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sphgrid_core::{GpuParticle, SimulationConfig};
use std::f32::consts::{PI, TAU};

/// Scatter `config.particle_count` particles around the spawn center.
///
/// Radius, polar and azimuth angles are drawn uniformly, so the cloud is
/// densest at the center and the fluid expands from there.
pub fn seed_particles(config: &SimulationConfig, rng: &mut impl Rng) -> Vec<GpuParticle> {
    let n = config.particle_count as usize;
    let mut particles = Vec::with_capacity(n);
    let [cx, cy, cz] = config.spawn_center;

    for _ in 0..n {
        let r = rng.gen_range(0.0..1.0f32) * config.spawn_radius;
        let theta = rng.gen_range(0.0..PI);
        let phi = rng.gen_range(0.0..TAU);

        particles.push(GpuParticle::new([
            cx + r * theta.sin() * phi.cos(),
            cy + r * theta.sin() * phi.sin(),
            cz + r * theta.cos(),
        ]));
    }

    particles
}

/// Deterministic seeding from a `u64`
pub fn seed_particles_from(config: &SimulationConfig, seed: u64) -> Vec<GpuParticle> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    seed_particles(config, &mut rng)
}

/// Mean position, accumulated in f64
pub fn centroid(particles: &[GpuParticle]) -> [f64; 3] {
    if particles.is_empty() {
        return [0.0; 3];
    }
    let mut sum = [0.0f64; 3];
    for p in particles {
        for axis in 0..3 {
            sum[axis] += p.position[axis] as f64;
        }
    }
    sum.map(|s| s / particles.len() as f64)
}

pub fn average_density(particles: &[GpuParticle]) -> f32 {
    if particles.is_empty() {
        return 0.0;
    }
    let total: f64 = particles.iter().map(|p| p.density as f64).sum();
    (total / particles.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use sphgrid_core::{MeshBounds, SimConfig};

    fn config() -> SimulationConfig {
        let bounds = MeshBounds::new([1.0, 2.0, 3.0], [10.0, 10.0, 10.0]);
        SimulationConfig::derive(&SimConfig::default(), &bounds).unwrap()
    }

    #[test]
    fn test_seed_within_spawn_sphere() {
        let config = config();
        let particles = seed_particles_from(&config, 7);
        assert_eq!(particles.len(), config.particle_count as usize);
        for p in &particles {
            let d: f32 = (0..3)
                .map(|a| (p.position[a] - config.spawn_center[a]).powi(2))
                .sum::<f32>()
                .sqrt();
            assert!(d <= config.spawn_radius * 1.0001);
            assert_eq!(p.density, 0.0);
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let config = config();
        assert_eq!(seed_particles_from(&config, 3), seed_particles_from(&config, 3));
        assert_ne!(seed_particles_from(&config, 3), seed_particles_from(&config, 4));
    }

    #[test]
    fn test_centroid_and_average_density() {
        let particles = [
            GpuParticle::with_density([0.0, 0.0, 0.0], 1.0),
            GpuParticle::with_density([2.0, 4.0, -2.0], 3.0),
        ];
        assert_eq!(centroid(&particles), [1.0, 2.0, -1.0]);
        assert_eq!(average_density(&particles), 2.0);
        assert_eq!(average_density(&[]), 0.0);
    }
}
