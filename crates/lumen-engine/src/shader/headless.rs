//! CPU-only shader backend.
//!
//! Compiles and links through [`reflect`](super::reflect) without touching a GPU,
//! and keeps uniform values in plain memory. It behaves like a real context for
//! everything the loader can observe (status flags, logs, current program,
//! uniform resolution), which makes it the backend of choice for tooling and
//! tests.

use std::collections::HashMap;

use super::backend::{ShaderBackend, UniformValue, coerce, truncate_log};
use super::handle::{HandleAllocator, ProgramId, StageId, UniformSlot, select_stages};
use super::kind::StageKind;
use super::reflect::{self, LinkedInterface, ScalarType, StageReflection};

struct StageObject {
    kind: StageKind,
    source: String,
    compiled: Option<Result<StageReflection, String>>,
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<StageId>,
    linked: Option<Result<LinkedInterface, String>>,
    values: Vec<Option<UniformValue>>,
}

/// In-memory [`ShaderBackend`].
pub struct HeadlessBackend {
    ids: HandleAllocator,
    stages: HashMap<StageId, StageObject>,
    programs: HashMap<ProgramId, ProgramObject>,
    current: Option<ProgramId>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self {
            ids: HandleAllocator::default(),
            stages: HashMap::new(),
            programs: HashMap::new(),
            current: None,
        }
    }

    /// Number of stage objects that have not been deleted.
    pub fn live_stages(&self) -> usize {
        self.stages.len()
    }

    /// Number of program objects that have not been deleted.
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Last value written to uniform `name` of `program`, if any.
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let obj = self.programs.get(&program)?;
        let Some(Ok(linked)) = &obj.linked else { return None };
        let index = linked.uniforms.index_of(name)?;
        obj.values.get(index).copied().flatten()
    }

    /// Linked interface of `program`, when it linked.
    pub fn linked_interface(&self, program: ProgramId) -> Option<&LinkedInterface> {
        match &self.programs.get(&program)?.linked {
            Some(Ok(linked)) => Some(linked),
            _ => None,
        }
    }

    fn link_program(&self, obj: &ProgramObject) -> Result<LinkedInterface, String> {
        let (vertex, fragment) = select_stages(&obj.attached, |id| {
            self.stages.get(&id).map(|s| (s.kind, s.compiled.as_ref()))
        })?;
        reflect::link_stages(vertex, fragment)
    }
}

impl ShaderBackend for HeadlessBackend {
    type Stage = StageId;
    type Program = ProgramId;
    type Location = UniformSlot;

    fn create_stage(&mut self, kind: StageKind) -> StageId {
        let id = self.ids.stage();
        self.stages.insert(
            id,
            StageObject {
                kind,
                source: String::new(),
                compiled: None,
            },
        );
        id
    }

    fn set_source(&mut self, stage: StageId, source: &str) {
        if let Some(obj) = self.stages.get_mut(&stage) {
            obj.source = source.to_string();
        }
    }

    fn compile(&mut self, stage: StageId) {
        if let Some(obj) = self.stages.get_mut(&stage) {
            obj.compiled = Some(reflect::compile_stage(obj.kind, &obj.source));
        }
    }

    fn compile_status(&self, stage: StageId) -> bool {
        matches!(
            self.stages.get(&stage).and_then(|s| s.compiled.as_ref()),
            Some(Ok(_))
        )
    }

    fn compile_log(&self, stage: StageId, max_len: usize) -> String {
        match self.stages.get(&stage).and_then(|s| s.compiled.as_ref()) {
            Some(Err(log)) => truncate_log(log, max_len),
            _ => String::new(),
        }
    }

    fn delete_stage(&mut self, stage: StageId) {
        self.stages.remove(&stage);
    }

    fn create_program(&mut self) -> ProgramId {
        let id = self.ids.program();
        self.programs.insert(id, ProgramObject::default());
        id
    }

    fn attach(&mut self, program: ProgramId, stage: StageId) {
        if !self.stages.contains_key(&stage) {
            return;
        }
        if let Some(obj) = self.programs.get_mut(&program) {
            if !obj.attached.contains(&stage) {
                obj.attached.push(stage);
            }
        }
    }

    fn link(&mut self, program: ProgramId) {
        let Some(obj) = self.programs.get(&program) else { return };
        let result = self.link_program(obj);

        if let Some(obj) = self.programs.get_mut(&program) {
            obj.values = match &result {
                Ok(linked) => vec![None; linked.uniforms.len()],
                Err(_) => Vec::new(),
            };
            obj.linked = Some(result);
        }
    }

    fn link_status(&self, program: ProgramId) -> bool {
        matches!(
            self.programs.get(&program).and_then(|p| p.linked.as_ref()),
            Some(Ok(_))
        )
    }

    fn link_log(&self, program: ProgramId, max_len: usize) -> String {
        match self.programs.get(&program).and_then(|p| p.linked.as_ref()) {
            Some(Err(log)) => truncate_log(log, max_len),
            _ => String::new(),
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.current == Some(program) {
            self.current = None;
        }
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.current = program;
    }

    fn current_program(&self) -> Option<ProgramId> {
        self.current
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformSlot> {
        let linked = self.linked_interface(program)?;
        UniformSlot::from_index(linked.uniforms.index_of(name)?)
    }

    fn uniform_type(&self, program: ProgramId, location: UniformSlot) -> Option<ScalarType> {
        let linked = self.linked_interface(program)?;
        linked.uniforms.get(location.index()).map(|u| u.ty)
    }

    fn set_uniform(&mut self, location: UniformSlot, value: UniformValue) {
        let Some(current) = self.current else { return };
        let Some(obj) = self.programs.get_mut(&current) else { return };
        let Some(Ok(linked)) = &obj.linked else { return };

        let index = location.index();
        let Some(var) = linked.uniforms.get(index) else { return };

        match coerce(value, var.ty) {
            Some(stored) => obj.values[index] = Some(stored),
            None => log::warn!(
                "uniform `{}` is {}; ignoring incompatible value {value:?}",
                var.name,
                var.ty
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = r#"
@vertex
fn main(@location(0) pos: vec2<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(pos, 0.0, 1.0);
}
"#;

    const FS: &str = r#"
@group(0) @binding(0) var<uniform> alpha: f32;
@group(0) @binding(1) var<uniform> mode: i32;

@fragment
fn main() -> @location(0) vec4<f32> {
    if (mode == 1) {
        return vec4<f32>(0.0, 0.0, 0.0, alpha);
    }
    return vec4<f32>(1.0, 1.0, 1.0, alpha);
}
"#;

    fn compiled(gl: &mut HeadlessBackend, kind: StageKind, src: &str) -> StageId {
        let s = gl.create_stage(kind);
        gl.set_source(s, src);
        gl.compile(s);
        s
    }

    fn linked_program(gl: &mut HeadlessBackend) -> ProgramId {
        let vs = compiled(gl, StageKind::Vertex, VS);
        let fs = compiled(gl, StageKind::Fragment, FS);
        let p = gl.create_program();
        gl.attach(p, vs);
        gl.attach(p, fs);
        gl.link(p);
        gl.delete_stage(vs);
        gl.delete_stage(fs);
        p
    }

    // ── stages ────────────────────────────────────────────────────────────

    #[test]
    fn compile_failure_exposes_bounded_log() {
        let mut gl = HeadlessBackend::new();
        let s = compiled(&mut gl, StageKind::Vertex, "@vertex fn main( {");
        assert!(!gl.compile_status(s));

        let full = gl.compile_log(s, usize::MAX);
        assert!(!full.is_empty());
        let short = gl.compile_log(s, 8);
        assert!(short.len() <= 8);
        assert!(full.starts_with(&short));
    }

    #[test]
    fn uncompiled_stage_reports_no_status() {
        let mut gl = HeadlessBackend::new();
        let s = gl.create_stage(StageKind::Fragment);
        assert!(!gl.compile_status(s));
        assert!(gl.compile_log(s, 1024).is_empty());
    }

    #[test]
    fn deleted_stages_are_released() {
        let mut gl = HeadlessBackend::new();
        let _ = linked_program(&mut gl);
        assert_eq!(gl.live_stages(), 0);
    }

    // ── link ──────────────────────────────────────────────────────────────

    #[test]
    fn valid_pair_links_with_empty_log() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);
        assert!(gl.link_status(p));
        assert!(gl.link_log(p, 1024).is_empty());
    }

    #[test]
    fn link_with_failed_stage_mentions_that_stage() {
        let mut gl = HeadlessBackend::new();
        let vs = compiled(&mut gl, StageKind::Vertex, "not a shader");
        let fs = compiled(&mut gl, StageKind::Fragment, FS);
        let p = gl.create_program();
        gl.attach(p, vs);
        gl.attach(p, fs);
        gl.link(p);

        assert!(!gl.link_status(p));
        assert!(gl.link_log(p, 1024).contains("VERTEX stage was not successfully compiled"));
    }

    #[test]
    fn link_without_fragment_stage_fails() {
        let mut gl = HeadlessBackend::new();
        let vs = compiled(&mut gl, StageKind::Vertex, VS);
        let p = gl.create_program();
        gl.attach(p, vs);
        gl.link(p);
        assert!(gl.link_log(p, 1024).contains("no FRAGMENT stage"));
    }

    // ── current program ───────────────────────────────────────────────────

    #[test]
    fn deleting_current_program_clears_slot() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);
        gl.use_program(Some(p));
        gl.delete_program(p);
        assert_eq!(gl.current_program(), None);
        assert_eq!(gl.live_programs(), 0);
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    #[test]
    fn set_uniform_writes_to_current_program() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);
        gl.use_program(Some(p));

        let loc = gl.uniform_location(p, "alpha").unwrap();
        gl.set_uniform(loc, UniformValue::Float(0.25));
        assert_eq!(gl.uniform_value(p, "alpha"), Some(UniformValue::Float(0.25)));
    }

    #[test]
    fn set_uniform_without_current_program_is_noop() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);

        let loc = gl.uniform_location(p, "alpha").unwrap();
        gl.set_uniform(loc, UniformValue::Float(0.25));
        assert_eq!(gl.uniform_value(p, "alpha"), None);
    }

    #[test]
    fn set_uniform_lands_in_whichever_program_is_current() {
        let mut gl = HeadlessBackend::new();
        let a = linked_program(&mut gl);
        let b = linked_program(&mut gl);

        // Location resolved on `a`, but `b` is current.
        let loc = gl.uniform_location(a, "alpha").unwrap();
        gl.use_program(Some(b));
        gl.set_uniform(loc, UniformValue::Float(0.5));

        assert_eq!(gl.uniform_value(a, "alpha"), None);
        assert_eq!(gl.uniform_value(b, "alpha"), Some(UniformValue::Float(0.5)));
    }

    #[test]
    fn incompatible_value_is_ignored() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);
        gl.use_program(Some(p));

        let loc = gl.uniform_location(p, "alpha").unwrap();
        gl.set_uniform(loc, UniformValue::Int(3));
        assert_eq!(gl.uniform_value(p, "alpha"), None);
    }

    #[test]
    fn bool_is_stored_as_int_for_integer_uniforms() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);
        gl.use_program(Some(p));

        let loc = gl.uniform_location(p, "mode").unwrap();
        gl.set_uniform(loc, UniformValue::Bool(true));
        assert_eq!(gl.uniform_value(p, "mode"), Some(UniformValue::Int(1)));
    }

    #[test]
    fn uniform_type_reports_declared_scalar() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);

        let alpha = gl.uniform_location(p, "alpha").unwrap();
        let mode = gl.uniform_location(p, "mode").unwrap();
        assert_eq!(gl.uniform_type(p, alpha), Some(ScalarType::F32));
        assert_eq!(gl.uniform_type(p, mode), Some(ScalarType::I32));
    }

    #[test]
    fn unknown_uniform_has_no_location() {
        let mut gl = HeadlessBackend::new();
        let p = linked_program(&mut gl);
        assert!(gl.uniform_location(p, "missingName").is_none());
    }
}
