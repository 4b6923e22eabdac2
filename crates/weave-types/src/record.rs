//! The raw record representation exchanged with the document store.

use std::fmt;

use serde_json::Value;

use crate::error::TypeError;
use crate::id::{DocumentId, RevisionId};

/// A document in its store-native form.
pub type Record = serde_json::Map<String, Value>;

/// Field holding the document identifier.
pub const ID_FIELD: &str = "_id";

/// Field holding the revision token of revisioned documents.
pub const REVISION_FIELD: &str = "revision_id";

/// Read the identifier of a record. A missing or null `_id` means the
/// document has not been persisted yet.
pub fn record_id(record: &Record) -> Result<Option<DocumentId>, TypeError> {
    match record.get(ID_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => DocumentId::from_value(value).map(Some),
    }
}

/// Read the revision token of a record, if any.
pub fn record_revision(record: &Record) -> Result<Option<RevisionId>, TypeError> {
    match record.get(REVISION_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => RevisionId::from_value(value).map(Some),
    }
}

/// Address of a loaded document: its collection and identifier.
///
/// Used as the key of visited sets and of the resolution arena.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub collection: String,
    pub id: DocumentId,
}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: DocumentId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }
}

impl fmt::Debug for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id.short_id())
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
