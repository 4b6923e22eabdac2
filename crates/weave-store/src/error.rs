use weave_types::TypeError;

/// Errors from document store operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// A unique index (including `_id`) rejected the write.
    #[error("duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    /// The filter document could not be interpreted.
    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    /// The update document could not be interpreted or applied.
    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    /// An aggregation stage or expression could not be interpreted.
    #[error("invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// The session is unknown to this store.
    #[error("unknown session {0}")]
    UnknownSession(u64),

    /// Transaction started twice, or committed/aborted without one.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A record held malformed identifiers.
    #[error("malformed record: {0}")]
    MalformedRecord(#[from] TypeError),

    /// An internal lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl StoreError {
    /// Returns `true` if the error concerns one document of a
    /// multi-document write and the remaining documents can still be
    /// attempted. Every other error aborts the whole call.
    pub fn is_document_level(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. } | Self::MalformedRecord(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_document_errors_are_collected() {
        let duplicate = StoreError::DuplicateKey {
            collection: "doors".into(),
            key: "_id".into(),
        };
        assert!(duplicate.is_document_level());
        let malformed = StoreError::MalformedRecord(TypeError::InvalidId("x".into()));
        assert!(malformed.is_document_level());
        assert_eq!(malformed.clone(), malformed);
        assert!(!StoreError::UnknownSession(7).is_document_level());
        assert!(!StoreError::LockPoisoned.is_document_level());
        assert!(!StoreError::InvalidUpdate("$bogus".into()).is_document_level());
    }
}
