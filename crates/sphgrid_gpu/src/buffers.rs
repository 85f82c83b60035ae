use bevy::render::render_resource::*;
use bevy::render::renderer::RenderDevice;
use sphgrid_core::{
    GpuParticle, GridKey, GridRange, SimulationConfig, SortParams, SphError, SphResult,
};
use sphgrid_physics::sort::SortPlan;

/// Staging buffer for reading particles back from GPU to CPU
pub struct ReadbackBuffer {
    pub staging: Buffer,
    pub size: u64,
}

impl ReadbackBuffer {
    pub fn new(device: &RenderDevice, label: &'static str, particle_count: usize) -> Self {
        let size = (std::mem::size_of::<GpuParticle>() * particle_count) as u64;
        Self::with_size(device, label, size)
    }

    pub fn with_size(device: &RenderDevice, label: &'static str, size: u64) -> Self {
        let staging = device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size,
            usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { staging, size }
    }
}

/// Every buffer and bind group of one particle-count configuration.
///
/// Built in full before it replaces the live set; dropping it releases the
/// device memory.
pub struct ParticleBuffers {
    pub particle_count: u32,
    pub cell_count: u32,
    /// Current particle state; hashed at frame start, rewritten by the SPH passes
    pub particles: Buffer,
    /// Particles in sorted grid order
    pub sorted: Buffer,
    pub keys: Buffer,
    /// Transposed key matrix
    pub scratch: Buffer,
    pub ranges: Buffer,
    pub params: Buffer,
    /// One `SortParams` per plan step, `sort_stride` bytes apart
    pub sort_params: Buffer,
    pub sort_stride: u32,
    pub plan: SortPlan,
    pub sim_bind_group: BindGroup,
    /// target = keys, source = scratch
    pub sort_keys_bind_group: BindGroup,
    /// target = scratch, source = keys
    pub sort_scratch_bind_group: BindGroup,
    pub readback: ReadbackBuffer,
    pub preview: ReadbackBuffer,
}

fn check_size(device: &RenderDevice, label: &str, bytes: u64) -> SphResult<()> {
    let limits = device.limits();
    let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if bytes > limit {
        return Err(SphError::Allocation(format!(
            "{label} needs {bytes} bytes, device limit is {limit}"
        )));
    }
    Ok(())
}

fn align_to(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

impl ParticleBuffers {
    pub fn new(
        device: &RenderDevice,
        layouts: (&BindGroupLayout, &BindGroupLayout),
        config: &SimulationConfig,
        particles: &[GpuParticle],
    ) -> SphResult<Self> {
        let (sim_layout, sort_layout) = layouts;
        let n = config.particle_count;
        if particles.len() != n as usize {
            return Err(SphError::InvalidParticleCount(particles.len() as u32));
        }
        let plan = SortPlan::new(n)?;
        let cell_count = config.grid.cell_count();

        let particle_bytes = (n as usize * std::mem::size_of::<GpuParticle>()) as u64;
        let key_bytes = (n as usize * std::mem::size_of::<GridKey>()) as u64;
        let range_bytes = (cell_count as usize * std::mem::size_of::<GridRange>()) as u64;
        check_size(device, "particles", particle_bytes)?;
        check_size(device, "grid keys", key_bytes)?;
        check_size(device, "grid ranges", range_bytes)?;

        let storage = BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST;
        let particle_buffer = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("particles"),
            contents: bytemuck::cast_slice(particles),
            usage: storage,
        });
        let sorted = device.create_buffer(&BufferDescriptor {
            label: Some("sorted_particles"),
            size: particle_bytes,
            usage: storage,
            mapped_at_creation: false,
        });
        let keys = device.create_buffer(&BufferDescriptor {
            label: Some("grid_keys"),
            size: key_bytes,
            usage: storage,
            mapped_at_creation: false,
        });
        let scratch = device.create_buffer(&BufferDescriptor {
            label: Some("grid_keys_scratch"),
            size: key_bytes,
            usage: storage,
            mapped_at_creation: false,
        });
        let ranges = device.create_buffer(&BufferDescriptor {
            label: Some("grid_ranges"),
            size: range_bytes,
            usage: storage,
            mapped_at_creation: false,
        });
        let params = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("sim_params"),
            contents: bytemuck::bytes_of(&config.sim_params()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        // Each step reads its constants at a dynamic offset, so one upload
        // serves the whole network inside a single submission.
        let param_size = std::mem::size_of::<SortParams>() as u32;
        let sort_stride = align_to(param_size, device.limits().min_uniform_buffer_offset_alignment);
        let mut sort_contents = vec![0u8; plan.steps().len() * sort_stride as usize];
        for (k, step) in plan.steps().iter().enumerate() {
            let at = k * sort_stride as usize;
            sort_contents[at..at + param_size as usize]
                .copy_from_slice(bytemuck::bytes_of(&step.params()));
        }
        let sort_params = device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("sort_params"),
            contents: &sort_contents,
            usage: BufferUsages::UNIFORM,
        });

        let sim_bind_group = device.create_bind_group(
            Some("sph_sim_bind_group"),
            sim_layout,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: particle_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: sorted.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: keys.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: ranges.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 4,
                    resource: params.as_entire_binding(),
                },
            ],
        );

        let sort_bind_group = |label: &'static str, target: &Buffer, source: &Buffer| {
            device.create_bind_group(
                Some(label),
                sort_layout,
                &[
                    BindGroupEntry {
                        binding: 0,
                        resource: target.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: source.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 2,
                        resource: BindingResource::Buffer(BufferBinding {
                            buffer: &sort_params,
                            offset: 0,
                            size: BufferSize::new(param_size as u64),
                        }),
                    },
                ],
            )
        };
        let sort_keys_bind_group = sort_bind_group("sort_keys_bind_group", &keys, &scratch);
        let sort_scratch_bind_group = sort_bind_group("sort_scratch_bind_group", &scratch, &keys);

        Ok(Self {
            particle_count: n,
            cell_count,
            readback: ReadbackBuffer::new(device, "particle_readback", n as usize),
            preview: ReadbackBuffer::new(device, "particle_preview", n as usize),
            particles: particle_buffer,
            sorted,
            keys,
            scratch,
            ranges,
            params,
            sort_params,
            sort_stride,
            plan,
            sim_bind_group,
            sort_keys_bind_group,
            sort_scratch_bind_group,
        })
    }
}
