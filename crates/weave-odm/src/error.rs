use weave_link::LinkError;
use weave_propagate::PropagateError;
use weave_query::QueryError;
use weave_resolve::ResolveError;
use weave_schema::{SchemaError, ValidationError};
use weave_state::StateError;
use weave_store::StoreError;
use weave_types::{DocumentId, TypeError};

/// Errors surfaced by the object-document mapper.
///
/// Conditions a caller is expected to handle get their own variant, no
/// matter which layer raised them.
#[derive(Debug, thiserror::Error)]
pub enum OdmError {
    #[error("model {0} is not registered")]
    UnknownModel(String),

    #[error("{model} has no identifier")]
    MissingIdentifier { model: String },

    #[error("{model} {id} not found")]
    DocumentNotFound { model: String, id: DocumentId },

    /// The stored revision moved on since the document was loaded.
    #[error("revision conflict on {model} {id}")]
    RevisionConflict { model: String, id: DocumentId },

    #[error("{model}.{field} holds a linked document that has not been saved")]
    LinkedDocumentNotSaved { model: String, field: String },

    /// A back-link whose original field is not a forward link.
    #[error("back-link {model}.{field}: {target}.{original_field} is not a link field")]
    BackLinkIntegrity {
        model: String,
        field: String,
        target: String,
        original_field: String,
    },

    #[error("back-link {field} of {id:?} matched {found} documents")]
    BackLinkCardinality {
        field: String,
        id: Option<DocumentId>,
        found: usize,
    },

    #[error("state management is turned off for {model}: {feature}")]
    StateManagementDisabled { model: String, feature: &'static str },

    #[error("no state was saved for this {model}")]
    StateNotSaved { model: String },

    /// Local edits could not be replayed onto the stored document.
    #[error("cannot apply local change at `{path}`")]
    ApplyChanges { path: String },

    #[error(transparent)]
    Validation(ValidationError),

    /// Some documents passed to `replace_many` do not exist.
    #[error("{missing} of {requested} documents to replace do not exist")]
    ReplaceError { requested: usize, missing: usize },

    /// A bulk writer only queues operations for one model.
    #[error("bulk writer holds {expected} operations, cannot queue {found}")]
    BulkModelMismatch { expected: String, found: String },

    #[error("not supported with a bulk writer: {0}")]
    BulkUnsupported(&'static str),

    #[error(transparent)]
    Schema(SchemaError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Convenience alias for mapper operations.
pub type OdmResult<T> = Result<T, OdmError>;

impl From<SchemaError> for OdmError {
    fn from(error: SchemaError) -> Self {
        match error {
            SchemaError::UnknownModel(model) => Self::UnknownModel(model),
            SchemaError::LinkedDocumentNotSaved { model, field } => {
                Self::LinkedDocumentNotSaved { model, field }
            }
            SchemaError::BackLinkIntegrity {
                model,
                field,
                target,
                original_field,
            } => Self::BackLinkIntegrity {
                model,
                field,
                target,
                original_field,
            },
            SchemaError::Validation(e) => Self::Validation(e),
            SchemaError::Store(e) => Self::Store(e),
            SchemaError::Type(e) => Self::Type(e),
            other => Self::Schema(other),
        }
    }
}

impl From<LinkError> for OdmError {
    fn from(error: LinkError) -> Self {
        match error {
            LinkError::Store(e) => Self::Store(e),
            LinkError::Type(e) => Self::Type(e),
        }
    }
}

impl From<ResolveError> for OdmError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::BackLinkCardinality { field, id, found } => {
                Self::BackLinkCardinality { field, id, found }
            }
            ResolveError::Schema(e) => e.into(),
            ResolveError::Link(e) => e.into(),
            ResolveError::Store(e) => Self::Store(e),
            ResolveError::Type(e) => Self::Type(e),
        }
    }
}

impl From<PropagateError> for OdmError {
    fn from(error: PropagateError) -> Self {
        match error {
            PropagateError::MissingIdentifier { model } => Self::MissingIdentifier { model },
            PropagateError::DocumentNotFound { model, id } => Self::DocumentNotFound { model, id },
            PropagateError::RevisionConflict { model, id } => Self::RevisionConflict { model, id },
            PropagateError::Schema(e) => e.into(),
            PropagateError::Link(e) => e.into(),
            PropagateError::Store(e) => Self::Store(e),
            PropagateError::Type(e) => Self::Type(e),
        }
    }
}

impl From<StateError> for OdmError {
    fn from(error: StateError) -> Self {
        match error {
            StateError::StateManagementDisabled { model, feature } => {
                Self::StateManagementDisabled { model, feature }
            }
            StateError::StateNotSaved { model } => Self::StateNotSaved { model },
            StateError::ApplyChanges { path } => Self::ApplyChanges { path },
        }
    }
}
