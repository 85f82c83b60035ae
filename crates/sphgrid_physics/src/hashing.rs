use rayon::prelude::*;
use sphgrid_core::{GpuParticle, GridConfig, GridKey};

/// Write one `(cell, particle)` record per particle. Out-of-grid positions
/// land in the nearest boundary cell.
pub fn hash_particles(particles: &[GpuParticle], grid: &GridConfig, keys: &mut [GridKey]) {
    keys.par_iter_mut()
        .zip(particles.par_iter())
        .enumerate()
        .for_each(|(i, (key, p))| {
            *key = GridKey::new(grid.cell_of(p.position), i as u32);
        });
}
