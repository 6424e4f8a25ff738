//! Shader program loading.
//!
//! [`ShaderProgram`] reads a vertex and a fragment source, compiles both,
//! links them and keeps the result behind a [`ShaderBackend`]. Every failure
//! is logged and collected in a [`BuildReport`]; construction itself never
//! fails.
//!
//! Two backends ship with the crate:
//! - [`HeadlessBackend`]: CPU only, validates and reflects with naga
//! - [`WgpuBackend`]: builds wgpu render pipelines on a [`crate::device::Gpu`]

mod backend;
mod handle;
mod headless;
mod kind;
mod program;
mod reflect;
mod report;
mod source;
mod wgpu_backend;

pub use backend::{ShaderBackend, UniformValue};
pub use handle::{ProgramId, StageId, UniformSlot};
pub use headless::HeadlessBackend;
pub use kind::{DiagnosticTag, StageKind};
pub use program::{ActiveProgram, ShaderConfig, ShaderProgram};
pub use reflect::{
    InterfaceVar, IoType, LinkedInterface, ResourceSlot, ScalarType, StageReflection,
    UniformTable, UniformVar, compile_stage, link_stages,
};
pub use report::{BuildError, BuildReport, BuildStatus, Diagnostic};
pub use source::{SourceError, SourceLanguage, read_stage_source};
pub use wgpu_backend::WgpuBackend;
