use super::buffers::ParticleBuffers;
use super::context::GpuContext;
use bevy::render::render_resource::*;
use sphgrid_core::constants::{BITONIC_BLOCK_SIZE, TRANSPOSE_BLOCK_SIZE, WORKGROUP_SIZE};
use sphgrid_physics::sort::{SortBuffer, SortStep};

// Every stage is its own compute pass; wgpu orders the passes and inserts the
// storage barriers between them.

fn particle_workgroups(buffers: &ParticleBuffers) -> u32 {
    buffers.particle_count.div_ceil(WORKGROUP_SIZE)
}

fn particle_pass(
    encoder: &mut CommandEncoder,
    label: &'static str,
    pipeline: &ComputePipeline,
    buffers: &ParticleBuffers,
) {
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    pass.set_bind_group(0, &buffers.sim_bind_group, &[]);
    pass.dispatch_workgroups(particle_workgroups(buffers), 1, 1);
}

/// One `(cell, particle)` key per particle
pub fn encode_hash(encoder: &mut CommandEncoder, ctx: &GpuContext, buffers: &ParticleBuffers) {
    particle_pass(encoder, "build_grid_pass", &ctx.build_grid, buffers);
}

/// The whole sort network, one dispatch per plan step
pub fn encode_sort(encoder: &mut CommandEncoder, ctx: &GpuContext, buffers: &ParticleBuffers) {
    let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
        label: Some("bitonic_sort_pass"),
        timestamp_writes: None,
    });

    for (k, step) in buffers.plan.steps().iter().enumerate() {
        let offset = k as u32 * buffers.sort_stride;
        match *step {
            SortStep::Bitonic { target, .. } => {
                let bind_group = match target {
                    SortBuffer::Keys => &buffers.sort_keys_bind_group,
                    SortBuffer::Scratch => &buffers.sort_scratch_bind_group,
                };
                pass.set_pipeline(&ctx.bitonic_sort);
                pass.set_bind_group(0, bind_group, &[offset]);
                pass.dispatch_workgroups(buffers.particle_count / BITONIC_BLOCK_SIZE, 1, 1);
            }
            SortStep::Transpose { source, params } => {
                // the transpose writes into the buffer it does not read
                let bind_group = match source.other() {
                    SortBuffer::Keys => &buffers.sort_keys_bind_group,
                    SortBuffer::Scratch => &buffers.sort_scratch_bind_group,
                };
                pass.set_pipeline(&ctx.transpose);
                pass.set_bind_group(0, bind_group, &[offset]);
                pass.dispatch_workgroups(
                    params.width / TRANSPOSE_BLOCK_SIZE,
                    params.height / TRANSPOSE_BLOCK_SIZE,
                    1,
                );
            }
        }
    }
}

/// Clear the cell ranges and record each run boundary of the sorted keys
pub fn encode_grid_indices(
    encoder: &mut CommandEncoder,
    ctx: &GpuContext,
    buffers: &ParticleBuffers,
) {
    encoder.clear_buffer(&buffers.ranges, 0, None);
    particle_pass(encoder, "grid_indices_pass", &ctx.grid_indices, buffers);
}

pub fn encode_rearrange(encoder: &mut CommandEncoder, ctx: &GpuContext, buffers: &ParticleBuffers) {
    particle_pass(encoder, "rearrange_pass", &ctx.rearrange, buffers);
}

pub fn encode_velocity(encoder: &mut CommandEncoder, ctx: &GpuContext, buffers: &ParticleBuffers) {
    particle_pass(encoder, "integrate_velocity_pass", &ctx.integrate_velocity, buffers);
}

pub fn encode_density(encoder: &mut CommandEncoder, ctx: &GpuContext, buffers: &ParticleBuffers) {
    particle_pass(encoder, "evaluate_density_pass", &ctx.evaluate_density, buffers);
}

/// Copy the current particle buffer into a staging buffer
pub fn encode_particle_copy(
    encoder: &mut CommandEncoder,
    buffers: &ParticleBuffers,
    staging: &Buffer,
    size: u64,
) {
    encoder.copy_buffer_to_buffer(&buffers.particles, 0, staging, 0, size);
}
