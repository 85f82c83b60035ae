//! WGSL compute backend on Bevy's render device.

pub mod buffers;
pub mod context;
pub mod device;
pub mod dispatch;

pub use device::GpuDevice;
