use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use weave_types::{DocumentId, Record, RevisionId};

use crate::model::ModelSchema;

/// Identity and tracking state carried by every typed document.
///
/// Embed it with `#[serde(flatten)]`: the identifier and revision token
/// travel with the record, the snapshots never do.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<RevisionId>,

    /// Stored form captured after the last load or save.
    #[serde(skip)]
    pub saved_state: Option<Record>,

    /// Stored form captured before the last save.
    #[serde(skip)]
    pub previous_state: Option<Record>,
}

impl DocumentMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata of a document that is already persisted under `id`.
    pub fn with_id(id: DocumentId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    /// Returns `true` until the document has been assigned an identifier.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}

/// Access to a document's identity and tracking state.
pub trait Identifiable {
    fn meta(&self) -> &DocumentMeta;

    fn meta_mut(&mut self) -> &mut DocumentMeta;

    fn id(&self) -> Option<DocumentId> {
        self.meta().id
    }

    fn revision(&self) -> Option<RevisionId> {
        self.meta().revision_id
    }
}

/// A typed document model bound to a collection.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Door {
///     #[serde(flatten)]
///     meta: DocumentMeta,
///     t: i64,
/// }
///
/// impl Document for Door {
///     const MODEL: &'static str = "Door";
///     fn schema() -> ModelSchema {
///         SchemaBuilder::new(Self::MODEL).field("t").build()
///     }
/// }
/// ```
pub trait Document: Identifiable + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Registry name of the model.
    const MODEL: &'static str;

    /// Field layout and settings of the model.
    fn schema() -> ModelSchema;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Plain {
        #[serde(flatten)]
        meta: DocumentMeta,
        n: i64,
    }

    #[test]
    fn new_meta_serializes_to_nothing() {
        let value = serde_json::to_value(Plain { meta: DocumentMeta::new(), n: 1 }).unwrap();
        assert_eq!(value, json!({"n": 1}));
    }

    #[test]
    fn meta_reads_identity_from_record() {
        let id = DocumentId::new();
        let revision = RevisionId::new();
        let plain: Plain = serde_json::from_value(json!({
            "_id": id.to_value(),
            "revision_id": revision.to_value(),
            "n": 2
        }))
        .unwrap();
        assert_eq!(plain.meta.id, Some(id));
        assert_eq!(plain.meta.revision_id, Some(revision));
        assert!(plain.meta.saved_state.is_none());
        assert!(!plain.meta.is_new());
    }
}
