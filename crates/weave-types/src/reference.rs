//! Stored form of a link.
//!
//! A link is persisted as `{"$ref": <collection>, "$id": <id>}`. The
//! collection may be omitted by callers that only know the identifier; the
//! encoder fills it in from the schema before anything reaches the store.

use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::id::DocumentId;

/// Key naming the target collection of a reference.
pub const REF_COLLECTION: &str = "$ref";

/// Key holding the target identifier of a reference.
pub const REF_ID: &str = "$id";

/// A reference to a document in another (or the same) collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DbRef {
    pub collection: String,
    pub id: DocumentId,
}

impl DbRef {
    pub fn new(collection: impl Into<String>, id: DocumentId) -> Self {
        Self {
            collection: collection.into(),
            id,
        }
    }

    /// Returns `true` if `value` has the shape of a stored reference: an
    /// object holding `$id` and nothing besides an optional `$ref`.
    pub fn is_ref(value: &Value) -> bool {
        match value {
            Value::Object(map) => {
                map.contains_key(REF_ID)
                    && map.keys().all(|k| k == REF_ID || k == REF_COLLECTION)
            }
            _ => false,
        }
    }

    /// Parse a reference, using `default_collection` when `$ref` is absent.
    pub fn parse(value: &Value, default_collection: &str) -> Result<Self, TypeError> {
        let map = value
            .as_object()
            .filter(|_| Self::is_ref(value))
            .ok_or_else(|| TypeError::InvalidReference(value.to_string()))?;
        let id = DocumentId::from_value(&map[REF_ID])?;
        let collection = match map.get(REF_COLLECTION) {
            Some(Value::String(c)) => c.clone(),
            None => default_collection.to_string(),
            Some(other) => return Err(TypeError::InvalidReference(other.to_string())),
        };
        Ok(Self { collection, id })
    }

    /// The stored form of this reference.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(REF_COLLECTION.into(), Value::String(self.collection.clone()));
        map.insert(REF_ID.into(), self.id.to_value());
        Value::Object(map)
    }
}
