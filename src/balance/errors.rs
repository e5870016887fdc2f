use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("no unbalanced closing brace found")]
    NoUnbalancedBrace,

    #[error("opening brace follows an unmatched closing brace")]
    MalformedNesting,

    #[error("unterminated documentation comment starting at byte {start}")]
    UnterminatedComment { start: usize },

    #[error("indentation level {level} cannot absorb {braces} closing braces at step {step}")]
    InvalidIndentation {
        level: usize,
        braces: usize,
        step: usize,
    },
}
