use crate::ast::Position;
use thiserror::Error;

/// Divergence in tree shape or an exact-value attribute. Always fatal to the
/// candidate edit, never to the process.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralMismatch {
    #[error("node kinds diverge: {left} != {right} at {}", fmt_pos(.position))]
    Kind {
        left: &'static str,
        right: &'static str,
        position: Option<Position>,
    },

    #[error("trees have different node counts: {left} != {right}")]
    Length { left: usize, right: usize },

    #[error("{kind} {attribute} diverge: {left} != {right} at {}", fmt_pos(.position))]
    Attribute {
        kind: &'static str,
        attribute: &'static str,
        left: String,
        right: String,
        position: Option<Position>,
    },

    #[error("{kind} reference segments diverge in count: \"{left}\" != \"{right}\" at {}", fmt_pos(.position))]
    SequenceLength {
        kind: &'static str,
        left: String,
        right: String,
        position: Option<Position>,
    },
}

fn fmt_pos(position: &Option<Position>) -> String {
    match position {
        Some(p) => p.to_string(),
        None => "<unknown>".to_string(),
    }
}

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("structural mismatch: {0}")]
    Structural(#[from] StructuralMismatch),

    /// An identifier-bearing node lacks a source position. This signals a
    /// parser invariant break and must stop the current file's processing.
    #[error("identifier position missing for {kind} `{name}`")]
    MissingPosition { kind: &'static str, name: String },

    /// A recorded position does not reproduce the identifier it claims to
    /// locate. Position bookkeeping is wrong; continuing would mislocate a
    /// rename.
    #[error("position {line}:{column} does not reproduce `{name}` (found `{found}`)")]
    PositionIntegrity {
        name: String,
        line: usize,
        column: usize,
        found: String,
    },
}

impl CompareError {
    /// Whether the error rejects only the candidate edit (structural) rather
    /// than indicating an internal invariant failure.
    pub fn is_structural(&self) -> bool {
        matches!(self, CompareError::Structural(_))
    }
}
