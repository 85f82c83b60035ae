pub mod config;
pub mod constants;
pub mod device;
pub mod error;
pub mod types;

pub use config::*;
pub use constants::*;
pub use device::*;
pub use error::*;
pub use types::*;
