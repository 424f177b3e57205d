use thiserror::Error;

/// Errors raised while lexing or parsing template source.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unclosed `{tag}` tag starting at byte {offset}")]
    UnclosedTag { tag: &'static str, offset: usize },

    #[error("invalid for syntax: {0}")]
    InvalidFor(String),

    #[error("invalid set syntax: {0}")]
    InvalidSet(String),

    #[error("unknown control block: {0}")]
    UnknownBlock(String),

    #[error("unclosed {0} block")]
    UnclosedBlock(&'static str),

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("invalid slice: {0}")]
    InvalidSlice(String),
}

/// Raised by an explicit `raise_exception` directive reached during rendering.
///
/// Displays as the bare message so callers can surface it verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

/// Any failure of a render call. There is never partial output alongside it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub type Result<T, E = TemplateError> = std::result::Result<T, E>;
