use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::constants::*;
use crate::error::{SphError, SphResult};
use crate::types::SimParams;

/// Legal particle counts. Every variant satisfies the sort network's
/// block-size contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParticleCount {
    K8,
    #[default]
    K16,
    K32,
    K64,
    K128,
    K256,
}

impl ParticleCount {
    pub const ALL: [ParticleCount; 6] = [
        Self::K8,
        Self::K16,
        Self::K32,
        Self::K64,
        Self::K128,
        Self::K256,
    ];

    pub fn len(self) -> u32 {
        match self {
            Self::K8 => 8 * 1024,
            Self::K16 => 16 * 1024,
            Self::K32 => 32 * 1024,
            Self::K64 => 64 * 1024,
            Self::K128 => 128 * 1024,
            Self::K256 => 256 * 1024,
        }
    }

    pub fn from_len(n: u32) -> SphResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.len() == n)
            .ok_or(SphError::InvalidParticleCount(n))
    }

    /// The next larger count, wrapping back to the smallest
    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|&c| c == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::K8 => "8K",
            Self::K16 => "16K",
            Self::K32 => "32K",
            Self::K64 => "64K",
            Self::K128 => "128K",
            Self::K256 => "256K",
        }
    }
}

/// Check that `n` keys can be fed to the bitonic/transpose network.
///
/// Lengths up to one block are sorted by block passes alone. Longer arrays are
/// viewed as `n / 512` rows of 512 columns; the transpose runs on whole 16x16
/// tiles and the column sort fits in one block, so the row count must lie in
/// `[16, 512]`.
pub fn validate_sort_len(n: u32) -> SphResult<()> {
    let block = BITONIC_BLOCK_SIZE;
    if n == 0 || !n.is_power_of_two() || n % block != 0 {
        return Err(SphError::InvalidParticleCount(n));
    }
    let height = n / block;
    if height > 1 && !(TRANSPOSE_BLOCK_SIZE..=block).contains(&height) {
        return Err(SphError::InvalidParticleCount(n));
    }
    Ok(())
}

/// Bounding volume of the loaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeshBounds {
    pub center: [f32; 3],
    pub half_extents: [f32; 3],
}

impl Default for MeshBounds {
    fn default() -> Self {
        Self {
            center: [0.0; 3],
            half_extents: [1.0; 3],
        }
    }
}

impl MeshBounds {
    pub fn new(center: [f32; 3], half_extents: [f32; 3]) -> Self {
        Self {
            center,
            half_extents,
        }
    }

    /// Tight bounds around a point set (e.g. mesh vertices).
    pub fn from_points(points: impl IntoIterator<Item = [f32; 3]>) -> SphResult<Self> {
        let mut min = [f32::INFINITY; 3];
        let mut max = [f32::NEG_INFINITY; 3];
        for p in points {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        if min[0] > max[0] {
            return Err(SphError::InvalidBounds("no points".into()));
        }
        let center = std::array::from_fn(|a| 0.5 * (min[a] + max[a]));
        let half_extents = std::array::from_fn(|a| 0.5 * (max[a] - min[a]));
        Ok(Self::new(center, half_extents))
    }

    pub fn validate(&self) -> SphResult<()> {
        if self.center.iter().any(|c| !c.is_finite()) {
            return Err(SphError::InvalidBounds(format!(
                "center {:?} is not finite",
                self.center
            )));
        }
        if self
            .half_extents
            .iter()
            .any(|e| !e.is_finite() || *e <= 0.0)
        {
            return Err(SphError::InvalidBounds(format!(
                "half extents {:?} must be positive",
                self.half_extents
            )));
        }
        Ok(())
    }

    /// Characteristic length: cube root of the half-extent volume
    pub fn mesh_size(&self) -> f32 {
        let [x, y, z] = self.half_extents;
        (x * y * z).cbrt()
    }

    pub fn min_corner(&self) -> [f32; 3] {
        std::array::from_fn(|a| self.center[a] - self.half_extents[a])
    }
}

/// User-facing settings. Applied between frames only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    pub particle_count: ParticleCount,
    /// Multiplier on the base smoothing length
    pub kernel_scale: f32,
    /// Multiplier on the base time step
    pub speed: f32,
    /// Surface export cutoff as a fraction of rest density
    pub surface_threshold: f32,
    /// Spawn offset in fractions of the mesh half-extents
    pub spawn_offset: [f32; 3],
    /// Flips the sign of the normal scale and reseeds
    pub inverted_normals: bool,
    /// Pressure stiffness k in `P = k (rho - rho0)`
    pub pressure_stiffness: f32,
    /// Seed for particle spawning
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            particle_count: ParticleCount::default(),
            kernel_scale: 2.0,
            speed: 1.0,
            surface_threshold: 0.05,
            spawn_offset: [0.0; 3],
            inverted_normals: false,
            pressure_stiffness: 1.0,
            seed: 42,
        }
    }
}

impl SimConfig {
    /// Whether switching from `self` to `next` needs fresh buffers and particles.
    /// Speed, surface threshold and stiffness only touch constants.
    pub fn requires_reseed(&self, next: &SimConfig) -> bool {
        self.particle_count != next.particle_count
            || self.spawn_offset != next.spawn_offset
            || self.inverted_normals != next.inverted_normals
            || self.seed != next.seed
    }

    /// Whether `next` moves the smoothing length, and with it the grid.
    /// The particles carry over.
    pub fn requires_regrid(&self, next: &SimConfig) -> bool {
        self.kernel_scale != next.kernel_scale
    }

    pub fn normal_scale(&self) -> f32 {
        if self.inverted_normals { -1.0 } else { 1.0 }
    }
}

/// Uniform grid covering the mesh bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridConfig {
    pub origin: [f32; 3],
    /// Cubic cell edge; never smaller than the smoothing length
    pub cell_size: f32,
    pub dims: [u32; 3],
}

impl GridConfig {
    pub fn new(origin: [f32; 3], cell_size: f32, dims: [u32; 3]) -> SphResult<Self> {
        if dims.iter().any(|&d| d == 0 || d > MAX_GRID_DIM) {
            let cells = dims.iter().product();
            return Err(SphError::GridTooLarge {
                cells,
                limit: MAX_GRID_DIM.pow(3),
            });
        }
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SphError::InvalidBounds(format!(
                "cell size {cell_size} must be positive"
            )));
        }
        Ok(Self {
            origin,
            cell_size,
            dims,
        })
    }

    /// Grid over `bounds` with cells at least `h` wide, so every neighbor
    /// within `h` lives in the surrounding 3x3x3 window.
    pub fn from_bounds(bounds: &MeshBounds, h: f32) -> SphResult<Self> {
        let widest = bounds.half_extents.iter().copied().fold(0.0, f32::max);
        let cell_size = h.max(2.0 * widest / MAX_GRID_DIM as f32);
        let dims = bounds
            .half_extents
            .map(|e| ((2.0 * e / cell_size).ceil() as u32).clamp(1, MAX_GRID_DIM));
        Self::new(bounds.min_corner(), cell_size, dims)
    }

    pub fn cell_count(&self) -> u32 {
        self.dims.iter().product()
    }

    pub fn inv_cell_size(&self) -> f32 {
        1.0 / self.cell_size
    }

    /// Integer cell of a position, clamped into the grid. Never fails.
    #[inline]
    pub fn cell_coord(&self, p: [f32; 3]) -> [u32; 3] {
        let inv = self.inv_cell_size();
        std::array::from_fn(|a| {
            let scaled = ((p[a] - self.origin[a]) * inv).floor();
            // NaN saturates to 0 on the cast
            scaled.clamp(0.0, (self.dims[a] - 1) as f32) as u32
        })
    }

    /// Axis-major linearization: x slowest, z fastest.
    /// `common.wgsl::cell_index` computes the same expression.
    #[inline]
    pub fn linear_index(&self, c: [u32; 3]) -> u32 {
        (c[0] * self.dims[1] + c[1]) * self.dims[2] + c[2]
    }

    #[inline]
    pub fn cell_of(&self, p: [f32; 3]) -> u32 {
        self.linear_index(self.cell_coord(p))
    }

    /// Linear indices of the 3x3x3 window around `c`, skipping cells outside
    /// the grid. Visits dx, then dy, then dz, in ascending order.
    pub fn neighbor_cells(&self, c: [u32; 3]) -> impl Iterator<Item = u32> + '_ {
        NEIGHBOR_OFFSETS.iter().filter_map(move |off| {
            let mut n = [0u32; 3];
            for a in 0..3 {
                let v = c[a] as i32 + off[a];
                if v < 0 || v >= self.dims[a] as i32 {
                    return None;
                }
                n[a] = v as u32;
            }
            Some(self.linear_index(n))
        })
    }
}

/// Offsets of the 27-cell neighborhood, same order as the WGSL loops
pub const NEIGHBOR_OFFSETS: [[i32; 3]; 27] = {
    let mut out = [[0; 3]; 27];
    let mut i = 0;
    while i < 27 {
        out[i] = [(i / 9) as i32 - 1, ((i / 3) % 3) as i32 - 1, (i % 3) as i32 - 1];
        i += 1;
    }
    out
};

/// Constants derived from the settings and mesh bounds.
/// Rebuilt on every reconfiguration, read-only inside a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub particle_count: u32,
    pub smoothing_length: f32,
    pub particle_mass: f32,
    pub rest_density: f32,
    pub pressure_stiffness: f32,
    pub time_step: f32,
    /// `315 / (64 pi h^9)`
    pub poly6_coefficient: f32,
    /// `45 / (pi h^6)`, magnitude of the spiky kernel gradient
    pub spiky_grad_coefficient: f32,
    pub density_floor: f32,
    pub min_pair_distance: f32,
    pub spawn_center: [f32; 3],
    pub spawn_radius: f32,
    /// +1 or -1. Only shown in the HUD; no pass reads it, the inversion
    /// itself happens through the reseed.
    pub normal_scale: f32,
    /// Density below which surface export drops a particle
    pub surface_density: f32,
    pub grid: GridConfig,
}

impl SimulationConfig {
    pub fn derive(settings: &SimConfig, bounds: &MeshBounds) -> SphResult<Self> {
        let n = settings.particle_count.len();
        validate_sort_len(n)?;
        bounds.validate()?;

        let mesh_size = bounds.mesh_size();
        let kernel_scale = settings
            .kernel_scale
            .clamp(MIN_KERNEL_SCALE, MAX_KERNEL_SCALE);
        let h = SMOOTHING_LENGTH_FRACTION * mesh_size * kernel_scale;
        let grid = GridConfig::from_bounds(bounds, h)?;
        let spawn_center =
            std::array::from_fn(|a| {
                bounds.center[a] + settings.spawn_offset[a].clamp(-1.0, 1.0) * bounds.half_extents[a]
            });

        let mut config = Self {
            particle_count: n,
            smoothing_length: h,
            particle_mass: PARTICLE_MASS,
            rest_density: REST_DENSITY,
            pressure_stiffness: settings.pressure_stiffness.max(0.0),
            time_step: 0.0,
            poly6_coefficient: poly6_coefficient(h),
            spiky_grad_coefficient: spiky_grad_coefficient(h),
            density_floor: DENSITY_FLOOR_FRACTION * REST_DENSITY,
            min_pair_distance: MIN_PAIR_DISTANCE_FRACTION * h,
            spawn_center,
            spawn_radius: SPAWN_RADIUS_FRACTION * mesh_size,
            normal_scale: settings.normal_scale(),
            surface_density: 0.0,
            grid,
        };
        config.apply_constants(settings);
        Ok(config)
    }

    /// Refresh the constants that may change without reseeding.
    pub fn apply_constants(&mut self, settings: &SimConfig) {
        self.time_step = MAX_TIME_STEP * settings.speed.clamp(MIN_SPEED, MAX_SPEED);
        self.surface_density = settings.surface_threshold.max(0.0) * self.rest_density;
        self.pressure_stiffness = settings.pressure_stiffness.max(0.0);
    }

    /// Replace the smoothing length and everything that depends on it.
    pub fn with_smoothing_length(mut self, h: f32) -> SphResult<Self> {
        self.smoothing_length = h;
        self.poly6_coefficient = poly6_coefficient(h);
        self.spiky_grad_coefficient = spiky_grad_coefficient(h);
        self.min_pair_distance = MIN_PAIR_DISTANCE_FRACTION * h;
        if self.grid.cell_size < h {
            return Err(SphError::InvalidBounds(format!(
                "cell size {} is smaller than smoothing length {h}",
                self.grid.cell_size
            )));
        }
        Ok(self)
    }

    /// Density of a particle with no neighbors (its own poly6(0) term)
    pub fn self_density(&self) -> f32 {
        self.particle_mass * self.poly6_coefficient * self.smoothing_length.powi(6)
    }

    pub fn sim_params(&self) -> SimParams {
        let h = self.smoothing_length;
        let inv = self.grid.inv_cell_size();
        SimParams {
            grid_origin: self.grid.origin,
            particle_count: self.particle_count,
            grid_dims: self.grid.dims,
            cell_count: self.grid.cell_count(),
            inv_cell_size: [inv; 3],
            smoothing_length: h,
            smoothing_length_sq: h * h,
            poly6_mass: self.particle_mass * self.poly6_coefficient,
            spiky_grad_mass: self.particle_mass * self.spiky_grad_coefficient,
            rest_density: self.rest_density,
            stiffness: self.pressure_stiffness,
            time_step: self.time_step,
            density_floor: self.density_floor,
            min_distance_sq: self.min_pair_distance * self.min_pair_distance,
        }
    }
}

pub fn poly6_coefficient(h: f32) -> f32 {
    315.0 / (64.0 * PI * h.powi(9))
}

pub fn spiky_grad_coefficient(h: f32) -> f32 {
    45.0 / (PI * h.powi(6))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_particle_counts_are_sortable() {
        for count in ParticleCount::ALL {
            assert!(validate_sort_len(count.len()).is_ok(), "{}", count.label());
            assert_eq!(ParticleCount::from_len(count.len()).unwrap(), count);
        }
        assert_eq!(ParticleCount::K8.next(), ParticleCount::K16);
        assert_eq!(ParticleCount::K256.next(), ParticleCount::K8);
    }

    #[test]
    fn test_invalid_sort_lengths_rejected() {
        for n in [0, 1000, 1024, 4096, 8192 + 512, 512 * 1024, 3 * 512 * 16] {
            assert!(
                matches!(validate_sort_len(n), Err(SphError::InvalidParticleCount(v)) if v == n),
                "{n} accepted"
            );
        }
        assert!(validate_sort_len(512).is_ok());
        assert!(matches!(
            ParticleCount::from_len(12_345),
            Err(SphError::InvalidParticleCount(12_345))
        ));
    }

    #[test]
    fn test_linearization_round_trip() {
        let grid = GridConfig::new([0.0; 3], 1.0, [3, 4, 5]).unwrap();
        let mut seen = vec![false; grid.cell_count() as usize];
        for x in 0..3 {
            for y in 0..4 {
                for z in 0..5 {
                    let idx = grid.linear_index([x, y, z]) as usize;
                    assert!(!seen[idx]);
                    seen[idx] = true;
                }
            }
        }
        assert!(seen.into_iter().all(|s| s));
        // z is the fastest axis
        assert_eq!(grid.linear_index([0, 0, 1]), 1);
        assert_eq!(grid.linear_index([0, 1, 0]), 5);
        assert_eq!(grid.linear_index([1, 0, 0]), 20);
    }

    #[test]
    fn test_cell_coord_clamps_out_of_bounds() {
        let grid = GridConfig::new([0.0; 3], 0.5, [4, 4, 4]).unwrap();
        assert_eq!(grid.cell_coord([0.75, 1.2, 1.99]), [1, 2, 3]);
        assert_eq!(grid.cell_coord([-10.0, 100.0, 2.0]), [0, 3, 3]);
        assert_eq!(grid.cell_coord([f32::NAN, f32::INFINITY, -f32::INFINITY]), [0, 3, 0]);
    }

    #[test]
    fn test_neighbor_window() {
        let grid = GridConfig::new([0.0; 3], 1.0, [4, 4, 4]).unwrap();
        assert_eq!(grid.neighbor_cells([1, 1, 1]).count(), 27);
        assert_eq!(grid.neighbor_cells([0, 0, 0]).count(), 8);
        assert_eq!(grid.neighbor_cells([0, 2, 3]).count(), 12);
        let first: Vec<u32> = grid.neighbor_cells([1, 1, 1]).take(2).collect();
        assert_eq!(first, vec![grid.linear_index([0, 0, 0]), grid.linear_index([0, 0, 1])]);
    }

    #[test]
    fn test_derive_defaults() {
        let config = SimulationConfig::derive(&SimConfig::default(), &MeshBounds::default()).unwrap();
        assert_eq!(config.particle_count, 16 * 1024);
        assert!((config.smoothing_length - 0.024).abs() < 1e-6);
        assert!(config.grid.cell_size >= config.smoothing_length);
        assert_eq!(config.grid.dims, [32, 32, 32]);
        assert!((config.time_step - MAX_TIME_STEP).abs() < 1e-9);
        assert!((config.surface_density - 50.0).abs() < 1e-3);
        assert_eq!(config.normal_scale, 1.0);
    }

    #[test]
    fn test_derive_rejects_degenerate_bounds() {
        let flat = MeshBounds::new([0.0; 3], [1.0, 0.0, 1.0]);
        assert!(matches!(
            SimulationConfig::derive(&SimConfig::default(), &flat),
            Err(SphError::InvalidBounds(_))
        ));
    }

    #[test]
    fn test_spawn_offset_moves_center() {
        let settings = SimConfig {
            spawn_offset: [0.5, -1.0, 3.0],
            inverted_normals: true,
            ..SimConfig::default()
        };
        let bounds = MeshBounds::new([1.0, 1.0, 1.0], [2.0, 2.0, 2.0]);
        let config = SimulationConfig::derive(&settings, &bounds).unwrap();
        assert_eq!(config.spawn_center, [2.0, -1.0, 3.0]);
        assert_eq!(config.normal_scale, -1.0);
    }

    #[test]
    fn test_self_density_matches_poly6_at_zero() {
        let config = SimulationConfig::derive(&SimConfig::default(), &MeshBounds::default()).unwrap();
        let h = config.smoothing_length;
        let expected = config.particle_mass * 315.0 / (64.0 * PI * h.powi(3));
        assert!((config.self_density() - expected).abs() / expected < 1e-4);
    }

    #[test]
    fn test_reseed_only_for_structural_changes() {
        let base = SimConfig::default();
        let faster = SimConfig { speed: 3.0, surface_threshold: 0.2, ..base.clone() };
        assert!(!base.requires_reseed(&faster));
        let bigger = SimConfig { particle_count: ParticleCount::K64, ..base.clone() };
        assert!(base.requires_reseed(&bigger));
        assert!(!base.requires_regrid(&bigger));
    }

    #[test]
    fn test_kernel_scale_regrids_without_reseed() {
        let base = SimConfig::default();
        let wider = SimConfig { kernel_scale: 4.0, ..base.clone() };
        assert!(!base.requires_reseed(&wider));
        assert!(base.requires_regrid(&wider));

        let bounds = MeshBounds::default();
        let narrow = SimulationConfig::derive(&base, &bounds).unwrap();
        let wide = SimulationConfig::derive(&wider, &bounds).unwrap();
        assert!((wide.smoothing_length - 2.0 * narrow.smoothing_length).abs() < 1e-6);
        assert!(wide.grid.cell_size >= wide.smoothing_length);
        assert_eq!(wide.spawn_center, narrow.spawn_center);
    }

    #[test]
    fn test_kernel_scale_clamped_to_slider_range() {
        let bounds = MeshBounds::default();
        let huge = SimConfig { kernel_scale: 50.0, ..SimConfig::default() };
        let config = SimulationConfig::derive(&huge, &bounds).unwrap();
        let expected = SMOOTHING_LENGTH_FRACTION * bounds.mesh_size() * MAX_KERNEL_SCALE;
        assert!((config.smoothing_length - expected).abs() < 1e-6);
        assert!(MAX_KERNEL_SCALE > SimConfig::default().kernel_scale);
    }

    #[test]
    fn test_bounds_from_points() {
        let b = MeshBounds::from_points([[0.0, 0.0, 0.0], [2.0, 4.0, -2.0]]).unwrap();
        assert_eq!(b.center, [1.0, 2.0, -1.0]);
        assert_eq!(b.half_extents, [1.0, 2.0, 1.0]);
        assert!(MeshBounds::from_points(std::iter::empty()).is_err());
    }
}
