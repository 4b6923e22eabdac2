use weave_store::StoreError;
use weave_types::TypeError;

/// Errors raised while fetching linked documents.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A stored reference or fetched record held a malformed identifier.
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
