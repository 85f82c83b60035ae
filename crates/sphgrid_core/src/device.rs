use crate::config::SimulationConfig;
use crate::error::SphResult;
use crate::types::GpuParticle;

/// Stages of one simulation frame, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimStage {
    #[default]
    Idle,
    Hashing,
    Sorting,
    IndexBuilding,
    Rearranging,
    Evaluating,
}

impl SimStage {
    /// Fixed successor; the cycle never branches on data.
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::Hashing,
            Self::Hashing => Self::Sorting,
            Self::Sorting => Self::IndexBuilding,
            Self::IndexBuilding => Self::Rearranging,
            Self::Rearranging => Self::Evaluating,
            Self::Evaluating => Self::Idle,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Hashing => "hashing",
            Self::Sorting => "sorting",
            Self::IndexBuilding => "index building",
            Self::Rearranging => "rearranging",
            Self::Evaluating => "evaluating",
        }
    }
}

/// A backend that owns the particle, key and range buffers and runs the
/// frame passes over them.
///
/// Pass methods may only record work; `submit` guarantees every recorded pass
/// has been handed to the device in order, with each pass complete before the
/// next one reads its output.
pub trait ComputeDevice: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a fresh buffer set for `config` initialised with `particles`.
    /// On error the previously configured set stays live.
    fn configure(&mut self, config: &SimulationConfig, particles: &[GpuParticle]) -> SphResult<()>;

    /// Push constants that change without reallocation (speed, stiffness).
    fn update_constants(&mut self, config: &SimulationConfig) -> SphResult<()>;

    fn hash_particles(&mut self) -> SphResult<()>;
    fn sort_keys(&mut self) -> SphResult<()>;
    fn build_grid_indices(&mut self) -> SphResult<()>;
    fn rearrange_particles(&mut self) -> SphResult<()>;
    fn evaluate_velocity(&mut self) -> SphResult<()>;
    fn evaluate_density(&mut self) -> SphResult<()>;

    fn submit(&mut self) -> SphResult<()>;

    /// Drain all submitted work and copy the current particle buffer to the
    /// host. Blocks the calling thread.
    fn read_particles(&mut self) -> SphResult<Vec<GpuParticle>>;

    /// Most recent particle state available without stalling, if any.
    fn preview(&mut self) -> Option<&[GpuParticle]>;
}
