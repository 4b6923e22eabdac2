/// Errors raised while building queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// A raw filter, sort or update was not a JSON object.
    #[error("expected a document, got {0}")]
    NotADocument(String),

    /// A raw update used no update operator.
    #[error("update document has no operator: {0}")]
    MissingOperator(String),
}

/// Convenience alias for query building.
pub type QueryResult<T> = Result<T, QueryError>;
