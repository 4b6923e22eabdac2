use weave_link::LinkError;
use weave_schema::SchemaError;
use weave_store::StoreError;
use weave_types::{DocumentId, TypeError};

/// Errors raised while propagating writes and deletes.
#[derive(Debug, thiserror::Error)]
pub enum PropagateError {
    /// A replace or delete was requested for a document without identifier.
    #[error("{model} has no identifier")]
    MissingIdentifier { model: String },

    /// The document to replace or delete does not exist.
    #[error("{model} {id} not found")]
    DocumentNotFound { model: String, id: DocumentId },

    /// The stored revision is not the one the writer last saw.
    #[error("revision conflict on {model} {id}")]
    RevisionConflict { model: String, id: DocumentId },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias for propagation.
pub type PropagateResult<T> = Result<T, PropagateError>;
