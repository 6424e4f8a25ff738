use std::io;
use std::path::{Path, PathBuf};

use super::kind::StageKind;

/// Failure to load one stage's source text from disk.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {stage} shader source `{}`: {source}", path.display())]
pub struct SourceError {
    pub stage: StageKind,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Reads the complete source text for `stage` from `path`.
pub fn read_stage_source(stage: StageKind, path: &Path) -> Result<String, SourceError> {
    std::fs::read_to_string(path).map_err(|source| SourceError {
        stage,
        path: path.to_path_buf(),
        source,
    })
}

/// Shading language of a stage source.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SourceLanguage {
    Wgsl,
    Glsl,
}

impl SourceLanguage {
    /// Sniffs the language from the text itself.
    ///
    /// GLSL must open with a `#version` directive; whitespace, `//` comments
    /// and `/* */` comments before it are skipped. Anything else is treated as
    /// WGSL.
    pub fn detect(source: &str) -> Self {
        if skip_leading_trivia(source).starts_with("#version") {
            SourceLanguage::Glsl
        } else {
            SourceLanguage::Wgsl
        }
    }
}

/// Strips leading whitespace and comments. An unterminated block comment
/// swallows the rest of the text.
fn skip_leading_trivia(mut rest: &str) -> &str {
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("//") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            return rest;
        }
    }
}
