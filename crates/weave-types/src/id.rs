use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TypeError;

/// Unique identifier for a stored document (UUID v7 for time-ordering).
///
/// Identifiers are generated client-side so that a document can be
/// referenced by others before its own record has been written.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(uuid::Uuid);

impl DocumentId {
    /// Generate a new time-ordered document ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }

    /// The identifier as it appears inside a record.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }

    /// Parse an identifier out of a record value.
    pub fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::String(s) => s.parse(),
            other => Err(TypeError::InvalidId(other.to_string())),
        }
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for DocumentId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidId(format!("{s}: {e}")))
    }
}

impl fmt::Debug for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentId({})", self.short_id())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        id.to_value()
    }
}

/// Opaque revision token, regenerated on every successful write of a
/// revisioned document.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(uuid::Uuid);

impl RevisionId {
    /// Generate a fresh revision token.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The token as it appears inside a record.
    pub fn to_value(&self) -> Value {
        Value::String(self.0.to_string())
    }

    /// Parse a token out of a record value.
    pub fn from_value(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map(Self)
                .map_err(|e| TypeError::InvalidId(format!("{s}: {e}"))),
            other => Err(TypeError::InvalidId(other.to_string())),
        }
    }
}

impl Default for RevisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", &self.0.to_string()[..8])
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<RevisionId> for Value {
    fn from(revision: RevisionId) -> Self {
        revision.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        assert_ne!(DocumentId::new(), DocumentId::new());
        assert_ne!(RevisionId::new(), RevisionId::new());
    }

    #[test]
    fn ids_are_time_ordered() {
        let first = DocumentId::new();
        let second = DocumentId::new();
        assert!(first < second);
    }

    #[test]
    fn value_roundtrip() {
        let id = DocumentId::new();
        let value = id.to_value();
        assert!(value.is_string());
        assert_eq!(DocumentId::from_value(&value).unwrap(), id);
    }

    #[test]
    fn serde_form_matches_record_form() {
        let id = DocumentId::new();
        assert_eq!(serde_json::to_value(id).unwrap(), id.to_value());
        let rev = RevisionId::new();
        assert_eq!(serde_json::to_value(rev).unwrap(), rev.to_value());
    }

    #[test]
    fn from_value_rejects_non_strings() {
        assert!(DocumentId::from_value(&Value::from(42)).is_err());
        assert!(DocumentId::from_value(&Value::from("not-a-uuid")).is_err());
        assert!(RevisionId::from_value(&Value::Null).is_err());
    }

    #[test]
    fn short_id_is_eight_chars() {
        assert_eq!(DocumentId::new().short_id().len(), 8);
    }
}
