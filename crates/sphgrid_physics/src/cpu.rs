use sphgrid_core::{
    ComputeDevice, GpuParticle, GridConfig, GridKey, GridRange, SimParams, SimulationConfig,
    SphError, SphResult,
};

use crate::sort::SortPlan;
use crate::{hashing, indices, rearrange, sph};

/// Buffers of one configuration, replaced wholesale on reconfigure.
struct CpuBuffers {
    params: SimParams,
    grid: GridConfig,
    plan: SortPlan,
    particles: Vec<GpuParticle>,
    sorted: Vec<GpuParticle>,
    keys: Vec<GridKey>,
    scratch: Vec<GridKey>,
    ranges: Vec<GridRange>,
}

fn allocate<T: Clone + Default>(len: usize, what: &str) -> SphResult<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|e| SphError::Allocation(format!("{what} ({len} elements): {e}")))?;
    v.resize(len, T::default());
    Ok(v)
}

impl CpuBuffers {
    fn new(config: &SimulationConfig, particles: &[GpuParticle]) -> SphResult<Self> {
        if particles.len() != config.particle_count as usize {
            return Err(SphError::InvalidParticleCount(particles.len() as u32));
        }
        let plan = SortPlan::new(config.particle_count)?;
        let n = particles.len();

        let mut current = allocate(n, "particles")?;
        current.copy_from_slice(particles);

        Ok(Self {
            params: config.sim_params(),
            grid: config.grid,
            plan,
            particles: current,
            sorted: allocate(n, "sorted particles")?,
            keys: allocate(n, "grid keys")?,
            scratch: allocate(n, "sort scratch")?,
            ranges: allocate(config.grid.cell_count() as usize, "grid ranges")?,
        })
    }
}

/// Data-parallel reference device on rayon. Every pass runs to completion
/// before the call returns, so `submit` has nothing left to do.
#[derive(Default)]
pub struct CpuDevice {
    buffers: Option<CpuBuffers>,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers(&mut self) -> SphResult<&mut CpuBuffers> {
        self.buffers.as_mut().ok_or(SphError::NotConfigured)
    }

    /// Sorted keys from the last sort, for inspection in tests and tools.
    pub fn keys(&self) -> Option<&[GridKey]> {
        self.buffers.as_ref().map(|b| b.keys.as_slice())
    }

    pub fn ranges(&self) -> Option<&[GridRange]> {
        self.buffers.as_ref().map(|b| b.ranges.as_slice())
    }

    pub fn sorted_particles(&self) -> Option<&[GpuParticle]> {
        self.buffers.as_ref().map(|b| b.sorted.as_slice())
    }
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn configure(&mut self, config: &SimulationConfig, particles: &[GpuParticle]) -> SphResult<()> {
        let fresh = CpuBuffers::new(config, particles)?;
        self.buffers = Some(fresh);
        Ok(())
    }

    fn update_constants(&mut self, config: &SimulationConfig) -> SphResult<()> {
        let b = self.buffers()?;
        b.params = config.sim_params();
        Ok(())
    }

    fn hash_particles(&mut self) -> SphResult<()> {
        let b = self.buffers()?;
        hashing::hash_particles(&b.particles, &b.grid, &mut b.keys);
        Ok(())
    }

    fn sort_keys(&mut self) -> SphResult<()> {
        let b = self.buffers()?;
        b.plan.execute(&mut b.keys, &mut b.scratch)
    }

    fn build_grid_indices(&mut self) -> SphResult<()> {
        let b = self.buffers()?;
        indices::build_grid_indices(&b.keys, &mut b.ranges);
        Ok(())
    }

    fn rearrange_particles(&mut self) -> SphResult<()> {
        let b = self.buffers()?;
        rearrange::rearrange_particles(&b.keys, &b.particles, &mut b.sorted);
        Ok(())
    }

    fn evaluate_velocity(&mut self) -> SphResult<()> {
        let b = self.buffers()?;
        sph::evaluate_velocity(&b.sorted, &b.ranges, &b.grid, &b.params, &mut b.particles);
        Ok(())
    }

    fn evaluate_density(&mut self) -> SphResult<()> {
        let b = self.buffers()?;
        sph::evaluate_density(&b.sorted, &b.ranges, &b.grid, &b.params, &mut b.particles);
        Ok(())
    }

    fn submit(&mut self) -> SphResult<()> {
        self.buffers().map(|_| ())
    }

    fn read_particles(&mut self) -> SphResult<Vec<GpuParticle>> {
        Ok(self.buffers()?.particles.clone())
    }

    fn preview(&mut self) -> Option<&[GpuParticle]> {
        self.buffers.as_ref().map(|b| b.particles.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::seed_particles_from;
    use sphgrid_core::{MeshBounds, ParticleCount, SimConfig};

    fn config() -> SimulationConfig {
        let settings = SimConfig {
            particle_count: ParticleCount::K8,
            ..SimConfig::default()
        };
        SimulationConfig::derive(&settings, &MeshBounds::default()).unwrap()
    }

    #[test]
    fn test_unconfigured_device_errors() {
        let mut device = CpuDevice::new();
        assert!(matches!(device.hash_particles(), Err(SphError::NotConfigured)));
        assert!(device.preview().is_none());
    }

    #[test]
    fn test_failed_configure_keeps_previous_buffers() {
        let config = config();
        let particles = seed_particles_from(&config, 1);
        let mut device = CpuDevice::new();
        device.configure(&config, &particles).unwrap();

        let short = &particles[..100];
        assert!(device.configure(&config, short).is_err());
        assert_eq!(device.read_particles().unwrap(), particles);
    }

    #[test]
    fn test_grid_stages_agree() {
        let config = config();
        let particles = seed_particles_from(&config, 9);
        let mut device = CpuDevice::new();
        device.configure(&config, &particles).unwrap();
        device.hash_particles().unwrap();
        device.sort_keys().unwrap();
        device.build_grid_indices().unwrap();
        device.rearrange_particles().unwrap();

        let keys = device.keys().unwrap();
        assert!(keys.windows(2).all(|w| w[0].cell <= w[1].cell));
        let ranges = device.ranges().unwrap();
        for (i, key) in keys.iter().enumerate() {
            assert!(ranges[key.cell as usize].contains(i as u32));
        }
        let sorted = device.sorted_particles().unwrap();
        for (key, p) in keys.iter().zip(sorted) {
            assert_eq!(*p, particles[key.particle as usize]);
            assert_eq!(config.grid.cell_of(p.position), key.cell);
        }
    }
}
