use std::path::Path;

use super::backend::{ShaderBackend, UniformValue};
use super::kind::StageKind;
use super::report::{BuildReport, BuildStatus, Diagnostic};
use super::source::read_stage_source;

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct ShaderConfig {
    /// Upper bound, in bytes, on each compile or link log fetched from the backend.
    pub info_log_limit: usize,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self { info_log_limit: 1024 }
    }
}

/// A vertex + fragment program built through a [`ShaderBackend`].
///
/// Construction never fails: every problem is recorded in the [`BuildReport`]
/// and logged at error level, and the caller decides what to do about it.
/// The program handle is exclusively owned; release it with [`delete`].
///
/// [`delete`]: ShaderProgram::delete
pub struct ShaderProgram<B: ShaderBackend> {
    handle: Option<B::Program>,
    report: BuildReport,
}

impl<B: ShaderBackend> ShaderProgram<B> {
    /// Reads both stage sources from disk and builds the program.
    ///
    /// If either file cannot be read nothing is compiled, no program object is
    /// created and the result is not usable.
    pub fn from_files(
        backend: &mut B,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
        config: &ShaderConfig,
    ) -> Self {
        let vertex = read_stage_source(StageKind::Vertex, vertex_path.as_ref());
        let fragment = read_stage_source(StageKind::Fragment, fragment_path.as_ref());

        match (vertex, fragment) {
            (Ok(vertex), Ok(fragment)) => Self::from_sources(backend, &vertex, &fragment, config),
            (vertex, fragment) => {
                let diagnostics: Vec<Diagnostic> = [vertex.err(), fragment.err()]
                    .iter()
                    .flatten()
                    .map(Diagnostic::from)
                    .collect();
                for d in &diagnostics {
                    d.emit();
                }
                Self {
                    handle: None,
                    report: BuildReport::new(BuildStatus::SourceUnavailable, diagnostics),
                }
            }
        }
    }

    /// Builds the program from in-memory stage sources.
    ///
    /// A stage that fails to compile is still attached and linking is still
    /// attempted, so a failed stage is normally followed by a `PROGRAM`
    /// diagnostic. Both stage objects are deleted before returning.
    pub fn from_sources(
        backend: &mut B,
        vertex_src: &str,
        fragment_src: &str,
        config: &ShaderConfig,
    ) -> Self {
        let mut diagnostics = Vec::new();

        let vertex = compile_stage(backend, StageKind::Vertex, vertex_src, config, &mut diagnostics);
        let fragment =
            compile_stage(backend, StageKind::Fragment, fragment_src, config, &mut diagnostics);

        let program = backend.create_program();
        backend.attach(program, vertex);
        backend.attach(program, fragment);
        backend.link(program);

        let linked = backend.link_status(program);
        if !linked {
            let d = Diagnostic::Link {
                log: backend.link_log(program, config.info_log_limit),
            };
            d.emit();
            diagnostics.push(d);
        }

        backend.delete_stage(vertex);
        backend.delete_stage(fragment);

        let status = if linked {
            log::debug!("linked shader program {program:?}");
            BuildStatus::Linked
        } else {
            BuildStatus::LinkFailed
        };

        Self {
            handle: Some(program),
            report: BuildReport::new(status, diagnostics),
        }
    }

    /// Backend handle; `None` when the sources could not be read.
    pub fn handle(&self) -> Option<B::Program> {
        self.handle
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// True when the program linked and can be drawn with.
    pub fn is_usable(&self) -> bool {
        self.handle.is_some() && self.report.is_linked()
    }

    /// Makes this the backend's current program.
    pub fn activate(&self, backend: &mut B) {
        if let Some(program) = self.handle {
            backend.use_program(Some(program));
        }
    }

    /// Activates the program until the returned guard is dropped, then
    /// restores whatever program was current before.
    pub fn bind<'b>(&self, backend: &'b mut B) -> ActiveProgram<'b, B> {
        let previous = backend.current_program();
        self.activate(backend);
        ActiveProgram {
            backend,
            program: self.handle,
            previous,
        }
    }

    /// Sets uniform `name` on the *current* program.
    ///
    /// The location is looked up on this program but the write goes to
    /// whichever program is current; activate this one first. Unknown names
    /// are ignored.
    pub fn set_uniform(&self, backend: &mut B, name: &str, value: impl Into<UniformValue>) {
        write_uniform(backend, self.handle, name, value.into());
    }

    pub fn set_bool(&self, backend: &mut B, name: &str, value: bool) {
        self.set_uniform(backend, name, value);
    }

    pub fn set_int(&self, backend: &mut B, name: &str, value: i32) {
        self.set_uniform(backend, name, value);
    }

    pub fn set_float(&self, backend: &mut B, name: &str, value: f32) {
        self.set_uniform(backend, name, value);
    }

    /// Releases the program object.
    pub fn delete(self, backend: &mut B) {
        if let Some(program) = self.handle {
            backend.delete_program(program);
        }
    }
}

/// Scoped activation returned by [`ShaderProgram::bind`].
///
/// Uniform writes through the guard always land in its own program.
pub struct ActiveProgram<'b, B: ShaderBackend> {
    backend: &'b mut B,
    program: Option<B::Program>,
    previous: Option<B::Program>,
}

impl<B: ShaderBackend> ActiveProgram<'_, B> {
    /// The backend, for issuing draws while the program is bound.
    pub fn backend(&mut self) -> &mut B {
        self.backend
    }

    pub fn set_uniform(&mut self, name: &str, value: impl Into<UniformValue>) {
        write_uniform(self.backend, self.program, name, value.into());
    }

    pub fn set_bool(&mut self, name: &str, value: bool) {
        self.set_uniform(name, value);
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set_uniform(name, value);
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set_uniform(name, value);
    }
}

impl<B: ShaderBackend> Drop for ActiveProgram<'_, B> {
    fn drop(&mut self) {
        self.backend.use_program(self.previous);
    }
}

fn compile_stage<B: ShaderBackend>(
    backend: &mut B,
    kind: StageKind,
    source: &str,
    config: &ShaderConfig,
    diagnostics: &mut Vec<Diagnostic>,
) -> B::Stage {
    let stage = backend.create_stage(kind);
    backend.set_source(stage, source);
    backend.compile(stage);

    if !backend.compile_status(stage) {
        let d = Diagnostic::Compile {
            stage: kind,
            log: backend.compile_log(stage, config.info_log_limit),
        };
        d.emit();
        diagnostics.push(d);
    }

    stage
}

fn write_uniform<B: ShaderBackend>(
    backend: &mut B,
    program: Option<B::Program>,
    name: &str,
    value: UniformValue,
) {
    let Some(program) = program else { return };
    match backend.uniform_location(program, name) {
        Some(location) => backend.set_uniform(location, value),
        None => log::trace!("uniform `{name}` not found in program {program:?}"),
    }
}
