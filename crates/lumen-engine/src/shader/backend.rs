use std::fmt;

use super::kind::StageKind;
use super::reflect::ScalarType;

/// Value accepted by the scalar uniform setters.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
}

impl From<bool> for UniformValue {
    fn from(v: bool) -> Self {
        UniformValue::Bool(v)
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        UniformValue::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}

/// Graphics API capabilities the program loader is built on.
///
/// The call surface mirrors a classic shader-object API: stages are created,
/// given source and compiled one at a time; a program collects stages and is
/// linked; a single context-wide "current program" slot decides where
/// uniform writes land.
///
/// Implementations are single-threaded and must be driven from the thread that
/// owns the underlying context.
pub trait ShaderBackend {
    type Stage: Copy + Eq + fmt::Debug;
    type Program: Copy + Eq + fmt::Debug;
    type Location: Copy + fmt::Debug;

    fn create_stage(&mut self, kind: StageKind) -> Self::Stage;
    fn set_source(&mut self, stage: Self::Stage, source: &str);
    fn compile(&mut self, stage: Self::Stage);
    fn compile_status(&self, stage: Self::Stage) -> bool;
    /// Compile log, at most `max_len` bytes.
    fn compile_log(&self, stage: Self::Stage, max_len: usize) -> String;
    fn delete_stage(&mut self, stage: Self::Stage);

    fn create_program(&mut self) -> Self::Program;
    fn attach(&mut self, program: Self::Program, stage: Self::Stage);
    fn link(&mut self, program: Self::Program);
    fn link_status(&self, program: Self::Program) -> bool;
    /// Link log, at most `max_len` bytes.
    fn link_log(&self, program: Self::Program, max_len: usize) -> String;
    fn delete_program(&mut self, program: Self::Program);

    /// Writes the current-program slot. `None` clears it.
    fn use_program(&mut self, program: Option<Self::Program>);
    fn current_program(&self) -> Option<Self::Program>;

    /// Resolves a uniform by name in `program`'s linked uniform table.
    fn uniform_location(&self, program: Self::Program, name: &str) -> Option<Self::Location>;
    /// Declared scalar type of the uniform at `location` in `program`.
    fn uniform_type(&self, program: Self::Program, location: Self::Location) -> Option<ScalarType>;
    /// Writes `value` at `location` of the *current* program.
    fn set_uniform(&mut self, location: Self::Location, value: UniformValue);
}

/// Converts `value` into the representation stored for a `ty` uniform.
///
/// Integers and booleans interchange with `bool` uniforms, booleans also
/// widen to `i32`/`u32` (0/1) and `f32` (0.0/1.0). Any other pairing is
/// rejected.
pub(crate) fn coerce(value: UniformValue, ty: ScalarType) -> Option<UniformValue> {
    match (value, ty) {
        (UniformValue::Float(_), ScalarType::F32) => Some(value),
        (UniformValue::Int(_), ScalarType::I32) => Some(value),
        (UniformValue::Int(v), ScalarType::Bool) => Some(UniformValue::Bool(v != 0)),
        (UniformValue::Bool(_), ScalarType::Bool) => Some(value),
        (UniformValue::Bool(b), ScalarType::I32 | ScalarType::U32) => {
            Some(UniformValue::Int(i32::from(b)))
        }
        (UniformValue::Bool(b), ScalarType::F32) => {
            Some(UniformValue::Float(if b { 1.0 } else { 0.0 }))
        }
        _ => None,
    }
}

/// Cuts `log` down to at most `max_len` bytes without splitting a character.
pub(crate) fn truncate_log(log: &str, max_len: usize) -> String {
    if log.len() <= max_len {
        return log.to_string();
    }
    let mut end = max_len;
    while !log.is_char_boundary(end) {
        end -= 1;
    }
    log[..end].to_string()
}
