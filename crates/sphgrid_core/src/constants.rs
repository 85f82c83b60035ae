// Simulation constants.
// Lengths are expressed relative to the loaded mesh: the cube root of the
// product of its half-extents is the "mesh size" every length scales with.

/// Elements sorted per workgroup by the bitonic block pass
pub const BITONIC_BLOCK_SIZE: u32 = 512;

/// Side of the square tile used by the matrix transpose pass
pub const TRANSPOSE_BLOCK_SIZE: u32 = 16;

/// Workgroup size for the per-particle compute passes
pub const WORKGROUP_SIZE: u32 = 256;

/// Largest number of cells along one grid axis
pub const MAX_GRID_DIM: u32 = 32;

/// Smoothing length as a fraction of mesh size, before the kernel scale
pub const SMOOTHING_LENGTH_FRACTION: f32 = 0.012;

/// Initial spawn radius as a fraction of mesh size
pub const SPAWN_RADIUS_FRACTION: f32 = 0.01;

/// Mass of a single particle
pub const PARTICLE_MASS: f32 = 0.0002;

/// Rest density of the fluid
pub const REST_DENSITY: f32 = 1000.0;

/// Time step at speed 1.0
pub const MAX_TIME_STEP: f32 = 0.0075;

/// Speed multiplier bounds
pub const MIN_SPEED: f32 = 0.001;
pub const MAX_SPEED: f32 = 10.0;

/// Kernel scale bounds (GUI slider range)
pub const MIN_KERNEL_SCALE: f32 = 0.001;
pub const MAX_KERNEL_SCALE: f32 = 5.0;

/// Density floor as a fraction of rest density; keeps pressure terms finite
pub const DENSITY_FLOOR_FRACTION: f32 = 1e-3;

/// Particle pairs closer than this fraction of h exert no pressure
pub const MIN_PAIR_DISTANCE_FRACTION: f32 = 1e-4;

/// Radius a particle is drawn with, relative to mesh size
pub const PARTICLE_RENDER_SIZE: f32 = 0.0125;

/// Header token of exported point files
pub const POINT_FILE_HEADER: &str = "COFF";
