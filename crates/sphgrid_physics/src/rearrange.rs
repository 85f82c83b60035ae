use rayon::prelude::*;
use sphgrid_core::{GpuParticle, GridKey};

/// `dest[j] = source[sorted_keys[j].particle]`
pub fn rearrange_particles(sorted_keys: &[GridKey], source: &[GpuParticle], dest: &mut [GpuParticle]) {
    dest.par_iter_mut()
        .zip(sorted_keys.par_iter())
        .for_each(|(d, key)| *d = source[key.particle as usize]);
}
