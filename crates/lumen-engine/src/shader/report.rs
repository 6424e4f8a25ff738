use std::fmt;
use std::path::PathBuf;

use super::kind::{DiagnosticTag, StageKind};
use super::source::SourceError;

/// One problem reported while building a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The stage source could not be read; nothing was compiled.
    SourceRead {
        stage: StageKind,
        path: PathBuf,
        message: String,
    },
    /// The backend rejected a stage; `log` is the (bounded) compile log.
    Compile { stage: StageKind, log: String },
    /// Linking failed; `log` is the (bounded) link log.
    Link { log: String },
}

impl Diagnostic {
    pub fn tag(&self) -> DiagnosticTag {
        match self {
            Diagnostic::SourceRead { stage, .. } | Diagnostic::Compile { stage, .. } => stage.tag(),
            Diagnostic::Link { .. } => DiagnosticTag::Program,
        }
    }

    /// Backend log or I/O reason, without the tag.
    pub fn message(&self) -> &str {
        match self {
            Diagnostic::SourceRead { message, .. } => message,
            Diagnostic::Compile { log, .. } | Diagnostic::Link { log } => log,
        }
    }

    /// Emits the diagnostic through the `log` facade.
    pub(crate) fn emit(&self) {
        log::error!("{self}");
    }
}

impl From<&SourceError> for Diagnostic {
    fn from(err: &SourceError) -> Self {
        Diagnostic::SourceRead {
            stage: err.stage,
            path: err.path.clone(),
            message: err.source.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SourceRead { stage, path, message } => write!(
                f,
                "failed to read {stage} shader source `{}`: {message}",
                path.display()
            ),
            Diagnostic::Compile { stage, log } => {
                write!(f, "shader compilation error of type {stage}:\n{}", log.trim_end())
            }
            Diagnostic::Link { log } => write!(
                f,
                "program linking error of type {}:\n{}",
                DiagnosticTag::Program,
                log.trim_end()
            ),
        }
    }
}

/// Overall outcome of a build.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BuildStatus {
    /// The program linked; it is safe to draw with.
    Linked,
    /// A program object exists but linking failed (usually after a compile error).
    LinkFailed,
    /// At least one source file could not be read; no program object exists.
    SourceUnavailable,
}

/// Everything the loader observed while building one program.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    status: BuildStatus,
    diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub(crate) fn new(status: BuildStatus, diagnostics: Vec<Diagnostic>) -> Self {
        Self { status, diagnostics }
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn is_linked(&self) -> bool {
        self.status == BuildStatus::Linked
    }

    /// Diagnostics in the order they were emitted.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics carrying `tag`.
    pub fn tagged(&self, tag: DiagnosticTag) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.tag() == tag)
    }

    pub fn has_compile_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::Compile { .. }))
    }

    /// Turns anything short of a linked program into an error.
    pub fn into_result(self) -> Result<(), BuildError> {
        match self.status {
            BuildStatus::Linked => Ok(()),
            status => Err(BuildError {
                status,
                diagnostics: self.diagnostics,
            }),
        }
    }
}

/// A build that did not produce a linked program, for callers that treat that as fatal.
#[derive(Debug, Clone, thiserror::Error)]
#[error("shader program build failed ({status:?}){}", render_list(.diagnostics))]
pub struct BuildError {
    pub status: BuildStatus,
    pub diagnostics: Vec<Diagnostic>,
}

fn render_list(diagnostics: &[Diagnostic]) -> String {
    diagnostics.iter().map(|d| format!("\n{d}")).collect()
}
