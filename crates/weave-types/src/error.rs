use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("expected {expected} for field `{field}`")]
    UnexpectedShape { field: String, expected: &'static str },
}
