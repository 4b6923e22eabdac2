use weave_store::StoreError;
use weave_types::TypeError;

use crate::encoder::ValidationError;

/// Errors raised while building the registry or encoding records.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Two models were registered under the same name.
    #[error("model registered twice: {0}")]
    DuplicateModel(String),

    /// A model name that the registry does not know.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// A relation field points at a model that was never registered.
    #[error("{model}.{field} links to unregistered model {target}")]
    UnknownTarget {
        model: String,
        field: String,
        target: String,
    },

    /// A field name that the model does not declare.
    #[error("{model} has no field {field}")]
    UnknownField { model: String, field: String },

    /// A back-link whose original field is not a forward link on the
    /// target model.
    #[error("back-link {model}.{field}: {target}.{original_field} is not a link field")]
    BackLinkIntegrity {
        model: String,
        field: String,
        target: String,
        original_field: String,
    },

    /// A linked document must be persisted before its referrer can be
    /// encoded with a reference to it.
    #[error("{model}.{field} holds a linked document that has not been saved")]
    LinkedDocumentNotSaved { model: String, field: String },

    /// A field codec rejected a value.
    #[error("codec {codec} failed on {field}: {message}")]
    Codec {
        codec: &'static str,
        field: String,
        message: String,
    },

    /// A record could not be turned into a typed document.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A typed document could not be turned into a record.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;
