//! The two SPH passes over the rearranged particle buffer.
//!
//! Both passes read only `sorted` and the grid ranges and write one slot of
//! the output per particle, so they parallelise without ordering constraints.

use rayon::prelude::*;
use sphgrid_core::{GpuParticle, GridConfig, GridRange, SimParams};

use crate::kernels::{length_sq, poly6_unscaled, pressure, pressure_velocity, sub};

/// Density of sorted particle `i`, self term included.
pub fn density_at(
    i: usize,
    sorted: &[GpuParticle],
    ranges: &[GridRange],
    grid: &GridConfig,
    params: &SimParams,
) -> f32 {
    let p = sorted[i].position;
    let mut sum = 0.0f32;
    for cell in grid.neighbor_cells(grid.cell_coord(p)) {
        let range = ranges[cell as usize];
        for q in &sorted[range.start as usize..range.end as usize] {
            let r2 = length_sq(sub(p, q.position));
            sum += poly6_unscaled(r2, params.smoothing_length_sq);
        }
    }
    params.poly6_mass * sum
}

/// Pressure-driven velocity of sorted particle `i`.
pub fn velocity_at(
    i: usize,
    sorted: &[GpuParticle],
    ranges: &[GridRange],
    grid: &GridConfig,
    params: &SimParams,
) -> [f32; 3] {
    let p = sorted[i];
    let density_i = p.density.max(params.density_floor);
    let pressure_i = pressure(density_i, params);
    let mut velocity = [0.0f32; 3];

    for cell in grid.neighbor_cells(grid.cell_coord(p.position)) {
        let range = ranges[cell as usize];
        for j in range.start as usize..range.end as usize {
            if j == i {
                continue;
            }
            let q = sorted[j];
            let diff = sub(p.position, q.position);
            let density_j = q.density.max(params.density_floor);
            let dv = pressure_velocity(
                diff,
                length_sq(diff),
                density_i,
                pressure_i,
                density_j,
                pressure(density_j, params),
                params,
            );
            for axis in 0..3 {
                velocity[axis] += dv[axis];
            }
        }
    }
    velocity
}

/// Velocity/position pass: `out[j].position = sorted[j].position + v * dt`,
/// density carried over unchanged.
pub fn evaluate_velocity(
    sorted: &[GpuParticle],
    ranges: &[GridRange],
    grid: &GridConfig,
    params: &SimParams,
    out: &mut [GpuParticle],
) {
    out.par_iter_mut().enumerate().for_each(|(i, slot)| {
        let p = sorted[i];
        let v = velocity_at(i, sorted, ranges, grid, params);
        *slot = GpuParticle {
            position: std::array::from_fn(|a| p.position[a] + v[a] * params.time_step),
            density: p.density,
        };
    });
}

/// Density pass: `out[j].density` from the (pre-move) sorted positions.
pub fn evaluate_density(
    sorted: &[GpuParticle],
    ranges: &[GridRange],
    grid: &GridConfig,
    params: &SimParams,
    out: &mut [GpuParticle],
) {
    out.par_iter_mut().enumerate().for_each(|(i, slot)| {
        slot.density = density_at(i, sorted, ranges, grid, params);
    });
}
