//! Lumen engine crate.
//!
//! Loads vertex/fragment shader pairs into linked programs and sets their
//! scalar uniforms, on a CPU-only backend or on a wgpu device.

pub mod device;
pub mod logging;
pub mod shader;
