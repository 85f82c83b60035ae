use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// GPU-compatible particle representation
/// Matches `struct Particle { position: vec3<f32>, density: f32 }` in WGSL (16 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct GpuParticle {
    pub position: [f32; 3],
    /// Density from the last density pass; export reads it as the surface scalar
    pub density: f32,
}

impl GpuParticle {
    pub fn new(position: [f32; 3]) -> Self {
        Self {
            position,
            density: 0.0,
        }
    }

    pub fn with_density(position: [f32; 3], density: f32) -> Self {
        Self { position, density }
    }
}

/// One record of the spatial hash: the cell a particle falls in and the
/// particle's index in the current buffer at hash time.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct GridKey {
    pub cell: u32,
    pub particle: u32,
}

impl GridKey {
    pub fn new(cell: u32, particle: u32) -> Self {
        Self { cell, particle }
    }

    /// Ordering key used by the sort network. The particle index is the low
    /// word, so two distinct records never compare equal.
    #[inline]
    pub fn sort_key(&self) -> u64 {
        ((self.cell as u64) << 32) | self.particle as u64
    }
}

/// `[start, end)` slice of the sorted key array belonging to one cell.
/// Empty cells hold `start == end`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct GridRange {
    pub start: u32,
    pub end: u32,
}

impl GridRange {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, index: u32) -> bool {
        self.start <= index && index < self.end
    }
}

/// Uniform consumed by every per-particle pass.
/// Layout mirrors `SimParams` in `common.wgsl`; vec3 fields are followed by a
/// scalar so each row fills 16 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct SimParams {
    pub grid_origin: [f32; 3],
    pub particle_count: u32,
    pub grid_dims: [u32; 3],
    pub cell_count: u32,
    pub inv_cell_size: [f32; 3],
    pub smoothing_length: f32,
    pub smoothing_length_sq: f32,
    /// `mass * 315 / (64 pi h^9)`
    pub poly6_mass: f32,
    /// `mass * 45 / (pi h^6)`
    pub spiky_grad_mass: f32,
    pub rest_density: f32,
    pub stiffness: f32,
    pub time_step: f32,
    pub density_floor: f32,
    pub min_distance_sq: f32,
}

/// Per-step constants of the sort network (`SortParams` in WGSL)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SortParams {
    pub level: u32,
    pub level_mask: u32,
    pub width: u32,
    pub height: u32,
}
