pub mod error;
pub mod pipeline;
pub mod requests;
pub mod simulation;

pub use error::SimError;
pub use simulation::{FluidSimulation, FrameReport, SimulationState};
