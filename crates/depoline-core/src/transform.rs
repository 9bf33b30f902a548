//! Source record transformation interface

use std::path::Path;

use crate::model::{Payload, RecordDescriptor};

/// Output of a successful transformation.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub payload: Payload,
    pub descriptor: RecordDescriptor,
}

#[derive(Debug)]
pub enum TransformError {
    Io(std::io::Error),
    /// Source could not be parsed.
    Parse(String),
    /// Parsed, but lacks a field the destination requires.
    Missing(&'static str),
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO: {e}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Missing(field) => write!(f, "missing required field: {field}"),
        }
    }
}

impl std::error::Error for TransformError {}

impl From<std::io::Error> for TransformError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Pure `source file -> payload` conversion. Never retried.
pub trait Transformer: Send + Sync {
    /// Glob pattern (relative to the source directory) selecting source files.
    fn source_pattern(&self) -> &str;

    fn transform(&self, source: &Path) -> Result<Transformed, TransformError>;
}
