use bevy::render::render_resource::*;
use bevy::render::renderer::RenderDevice;
use sphgrid_core::{SimParams, SortParams};
use std::num::NonZeroU64;

const COMMON_WGSL: &str = include_str!("../shaders/common.wgsl");

/// Pipelines and layouts for the fluid passes. Independent of the particle
/// count, so they are built once per device and survive reconfiguration.
pub struct GpuContext {
    /// particles, sorted, keys, ranges, params
    pub sim_layout: BindGroupLayout,
    /// target keys, source keys, per-step sort params (dynamic offset)
    pub sort_layout: BindGroupLayout,
    pub build_grid: ComputePipeline,
    pub bitonic_sort: ComputePipeline,
    pub transpose: ComputePipeline,
    pub grid_indices: ComputePipeline,
    pub rearrange: ComputePipeline,
    pub integrate_velocity: ComputePipeline,
    pub evaluate_density: ComputePipeline,
}

fn storage_entry(binding: u32) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, size: usize, has_dynamic_offset: bool) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility: ShaderStages::COMPUTE,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: NonZeroU64::new(size as u64),
        },
        count: None,
    }
}

fn shader(device: &RenderDevice, label: &'static str, source: String) -> ShaderModule {
    device.create_shader_module(ShaderModuleDescriptor {
        label: Some(label),
        source: ShaderSource::Wgsl(source.into()),
    })
}

/// Per-particle pass module: shared declarations followed by the pass body
fn particle_shader(device: &RenderDevice, label: &'static str, body: &str) -> ShaderModule {
    shader(device, label, format!("{COMMON_WGSL}\n{body}"))
}

fn pipeline(
    device: &RenderDevice,
    label: &'static str,
    layout: &PipelineLayout,
    module: &ShaderModule,
    entry_point: &'static str,
) -> ComputePipeline {
    device.create_compute_pipeline(&RawComputePipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

impl GpuContext {
    pub fn new(device: &RenderDevice) -> Self {
        let sim_layout = device.create_bind_group_layout(
            Some("sph_sim_layout"),
            &[
                storage_entry(0),
                storage_entry(1),
                storage_entry(2),
                storage_entry(3),
                uniform_entry(4, std::mem::size_of::<SimParams>(), false),
            ],
        );

        let sort_layout = device.create_bind_group_layout(
            Some("sph_sort_layout"),
            &[
                storage_entry(0),
                storage_entry(1),
                uniform_entry(2, std::mem::size_of::<SortParams>(), true),
            ],
        );

        let sim_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("sph_sim_pipeline_layout"),
            bind_group_layouts: &[&sim_layout],
            push_constant_ranges: &[],
        });
        let sort_pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("sph_sort_pipeline_layout"),
            bind_group_layouts: &[&sort_layout],
            push_constant_ranges: &[],
        });

        let build_grid_shader = particle_shader(
            device,
            "build_grid_shader",
            include_str!("../shaders/build_grid.wgsl"),
        );
        let grid_indices_shader = particle_shader(
            device,
            "grid_indices_shader",
            include_str!("../shaders/grid_indices.wgsl"),
        );
        let rearrange_shader = particle_shader(
            device,
            "rearrange_shader",
            include_str!("../shaders/rearrange.wgsl"),
        );
        let sph_shader = particle_shader(device, "sph_shader", include_str!("../shaders/sph.wgsl"));
        let bitonic_shader = shader(
            device,
            "bitonic_sort_shader",
            include_str!("../shaders/bitonic_sort.wgsl").to_string(),
        );
        let transpose_shader = shader(
            device,
            "transpose_shader",
            include_str!("../shaders/transpose.wgsl").to_string(),
        );

        Self {
            build_grid: pipeline(
                device,
                "build_grid_pipeline",
                &sim_pipeline_layout,
                &build_grid_shader,
                "build_grid",
            ),
            bitonic_sort: pipeline(
                device,
                "bitonic_sort_pipeline",
                &sort_pipeline_layout,
                &bitonic_shader,
                "bitonic_sort",
            ),
            transpose: pipeline(
                device,
                "transpose_pipeline",
                &sort_pipeline_layout,
                &transpose_shader,
                "transpose_keys",
            ),
            grid_indices: pipeline(
                device,
                "grid_indices_pipeline",
                &sim_pipeline_layout,
                &grid_indices_shader,
                "build_grid_indices",
            ),
            rearrange: pipeline(
                device,
                "rearrange_pipeline",
                &sim_pipeline_layout,
                &rearrange_shader,
                "rearrange_particles",
            ),
            integrate_velocity: pipeline(
                device,
                "integrate_velocity_pipeline",
                &sim_pipeline_layout,
                &sph_shader,
                "integrate_velocity",
            ),
            evaluate_density: pipeline(
                device,
                "evaluate_density_pipeline",
                &sim_pipeline_layout,
                &sph_shader,
                "evaluate_density",
            ),
            sim_layout,
            sort_layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_declarations_match_host_layout() {
        // field order of the uniform must follow the Rust struct
        let fields = [
            "grid_origin",
            "particle_count",
            "grid_dims",
            "cell_count",
            "inv_cell_size",
            "smoothing_length",
            "smoothing_length_sq",
            "poly6_mass",
            "spiky_grad_mass",
            "rest_density",
            "stiffness",
            "time_step",
            "density_floor",
            "min_distance_sq",
        ];
        let mut last = 0;
        for field in fields {
            let at = COMMON_WGSL
                .find(&format!("    {field}:"))
                .unwrap_or_else(|| panic!("{field} missing"));
            assert!(at > last, "{field} out of order");
            last = at;
        }
    }

    #[test]
    fn test_linearization_matches_host() {
        assert!(COMMON_WGSL.contains("(c.x * params.grid_dims.y + c.y) * params.grid_dims.z + c.z"));
    }
}
