use std::fmt;

/// Pipeline stage a source file is compiled for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum StageKind {
    Vertex,
    Fragment,
}

impl StageKind {
    /// Matching `naga` stage, used when parsing GLSL and selecting entry points.
    pub(crate) fn naga_stage(self) -> naga::ShaderStage {
        match self {
            StageKind::Vertex => naga::ShaderStage::Vertex,
            StageKind::Fragment => naga::ShaderStage::Fragment,
        }
    }

    pub fn tag(self) -> DiagnosticTag {
        match self {
            StageKind::Vertex => DiagnosticTag::Vertex,
            StageKind::Fragment => DiagnosticTag::Fragment,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.tag(), f)
    }
}

/// Tag attached to every loader diagnostic.
///
/// Stage tags come from [`StageKind::tag`]; `Program` covers link-time output.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum DiagnosticTag {
    Vertex,
    Fragment,
    Program,
}

impl DiagnosticTag {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticTag::Vertex => "VERTEX",
            DiagnosticTag::Fragment => "FRAGMENT",
            DiagnosticTag::Program => "PROGRAM",
        }
    }
}

impl fmt::Display for DiagnosticTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
