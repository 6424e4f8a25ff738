//! GPU device management.
//!
//! This module creates the wgpu Instance/Adapter/Device/Queue used by the
//! wgpu shader backend. No window or surface is involved.

mod gpu;
mod init;

pub use gpu::Gpu;
pub use init::GpuInit;
