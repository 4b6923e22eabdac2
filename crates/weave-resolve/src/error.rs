use weave_link::LinkError;
use weave_schema::SchemaError;
use weave_store::StoreError;
use weave_types::{DocumentId, TypeError};

/// Errors raised while resolving links.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A single back-link matched more than one document.
    #[error("back-link {field} of {id:?} matched {found} documents")]
    BackLinkCardinality {
        field: String,
        id: Option<DocumentId>,
        found: usize,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias for resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
