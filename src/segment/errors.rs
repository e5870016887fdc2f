use crate::ast::ParseError;
use crate::project::ProjectError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    /// Markers are already present; the caller must remove them first.
    #[error("segment markers already present in {path}")]
    LabelExisted { path: PathBuf },

    #[error("label {label} not found in source")]
    LabelNotFound { label: usize },

    #[error("boundary declaration {kind} has no source position")]
    MissingPosition { kind: &'static str },

    #[error("failed to parse source: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to rewrite file: {0}")]
    Write(#[from] ProjectError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
