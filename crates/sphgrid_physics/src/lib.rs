//! CPU side of the fluid pipeline: kernel math, the spatial hash passes and a
//! rayon-backed `ComputeDevice` that runs the same network as the GPU.

pub mod cpu;
pub mod hashing;
pub mod indices;
pub mod kernels;
pub mod particle;
pub mod rearrange;
pub mod sort;
pub mod sph;

pub use cpu::CpuDevice;
