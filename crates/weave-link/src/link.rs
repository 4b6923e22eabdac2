use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use weave_schema::{is_unfetched, unfetched, Document, Identifiable};
use weave_types::{DbRef, DocumentId, REF_ID};

/// A reference to a `T` document, either unresolved or resolved.
///
/// Serializes to `{"$id": <id>}` while unresolved and to the embedded
/// document once resolved; the encoder turns both into a stored reference.
#[derive(Clone, Debug, PartialEq)]
pub enum Link<T> {
    Ref(DocumentId),
    Fetched(Box<T>),
}

/// Build an unresolved link to `id` without touching the store.
pub fn link_from_id<T: Document>(id: DocumentId) -> Link<T> {
    Link::Ref(id)
}

impl<T> Link<T> {
    pub fn from_document(document: T) -> Self {
        Self::Fetched(Box::new(document))
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    pub fn as_fetched(&self) -> Option<&T> {
        match self {
            Self::Fetched(doc) => Some(doc),
            Self::Ref(_) => None,
        }
    }

    pub fn as_fetched_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Fetched(doc) => Some(doc),
            Self::Ref(_) => None,
        }
    }

    pub fn into_fetched(self) -> Option<T> {
        match self {
            Self::Fetched(doc) => Some(*doc),
            Self::Ref(_) => None,
        }
    }
}

impl<T: Identifiable> Link<T> {
    /// Identifier of the target. `None` for an embedded document that has
    /// not been saved yet.
    pub fn id(&self) -> Option<DocumentId> {
        match self {
            Self::Ref(id) => Some(*id),
            Self::Fetched(doc) => doc.id(),
        }
    }

    /// The stored reference for this link, given the target collection.
    pub fn to_ref(&self, collection: &str) -> Option<DbRef> {
        self.id().map(|id| DbRef::new(collection, id))
    }
}

impl<T> From<T> for Link<T>
where
    T: Document,
{
    fn from(document: T) -> Self {
        Self::from_document(document)
    }
}

impl<T: Serialize> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Ref(id) => json!({ REF_ID: id.to_value() }).serialize(serializer),
            Self::Fetched(doc) => doc.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if DbRef::is_ref(&value) {
            let id = DocumentId::from_value(&value[REF_ID]).map_err(D::Error::custom)?;
            return Ok(Self::Ref(id));
        }
        match value {
            Value::Object(_) => serde_json::from_value(value)
                .map(|doc| Self::Fetched(Box::new(doc)))
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected a link, got {other}"))),
        }
    }
}

/// The single document whose forward link points at this one.
#[derive(Clone, Debug, PartialEq)]
pub enum BackLink<T> {
    /// Not resolved on this load.
    Unfetched,
    /// Resolved, and no document links here.
    Missing,
    Fetched(Box<T>),
}

impl<T> Default for BackLink<T> {
    fn default() -> Self {
        Self::Unfetched
    }
}

impl<T> BackLink<T> {
    pub fn is_fetched(&self) -> bool {
        !matches!(self, Self::Unfetched)
    }

    pub fn as_fetched(&self) -> Option<&T> {
        match self {
            Self::Fetched(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_fetched_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Fetched(doc) => Some(doc),
            _ => None,
        }
    }
}

impl<T: Serialize> Serialize for BackLink<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unfetched => unfetched().serialize(serializer),
            Self::Missing => serializer.serialize_none(),
            Self::Fetched(doc) => doc.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for BackLink<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null => Ok(Self::Missing),
            v if is_unfetched(&v) => Ok(Self::Unfetched),
            v @ Value::Object(_) => serde_json::from_value(v)
                .map(|doc| Self::Fetched(Box::new(doc)))
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected a back-link, got {other}"))),
        }
    }
}

/// Every document whose forward link points at this one.
#[derive(Clone, Debug, PartialEq)]
pub enum BackLinks<T> {
    Unfetched,
    Fetched(Vec<T>),
}

impl<T> Default for BackLinks<T> {
    fn default() -> Self {
        Self::Unfetched
    }
}

impl<T> BackLinks<T> {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }

    /// The resolved documents; empty while unresolved.
    pub fn as_slice(&self) -> &[T] {
        match self {
            Self::Fetched(docs) => docs,
            Self::Unfetched => &[],
        }
    }

    pub fn as_fetched_mut(&mut self) -> Option<&mut Vec<T>> {
        match self {
            Self::Fetched(docs) => Some(docs),
            Self::Unfetched => None,
        }
    }
}

impl<T: Serialize> Serialize for BackLinks<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unfetched => unfetched().serialize(serializer),
            Self::Fetched(docs) => docs.serialize(serializer),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for BackLinks<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            v if is_unfetched(&v) => Ok(Self::Unfetched),
            Value::Null => Ok(Self::Fetched(Vec::new())),
            v @ Value::Array(_) => serde_json::from_value(v)
                .map(Self::Fetched)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected back-links, got {other}"))),
        }
    }
}
