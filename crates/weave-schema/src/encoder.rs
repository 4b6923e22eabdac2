//! Conversion between typed documents and stored records.
//!
//! Encoding for storage keeps only references in link fields, drops
//! back-link fields, honours `keep_nulls` and runs field codecs. Decoding
//! reverses the codecs and marks back-link fields that were not resolved, so
//! that typed documents can tell "not fetched" apart from "no match".

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use weave_types::{DbRef, Record, ID_FIELD};

use crate::error::{SchemaError, SchemaResult};
use crate::model::{FieldKind, FieldSchema, ModelSchema};
use crate::registry::Registry;

/// Key of the object standing in for a back-link that was not resolved.
pub const UNFETCHED_MARKER: &str = "$unfetched";

/// Why one field failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// Field name, or empty when the cause is not tied to one field.
    pub field: String,
    pub message: String,
}

/// A record could not be constructed into a typed document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub model: String,
    pub causes: Vec<FieldError>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation of {} failed:", self.model)?;
        for cause in &self.causes {
            if cause.field.is_empty() {
                write!(f, " {};", cause.message)?;
            } else {
                write!(f, " {}: {};", cause.field, cause.message)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Causes attached to `field`.
    pub fn for_field<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.causes.iter().filter(move |c| c.field == field)
    }
}

/// Serialize a typed value into a record.
pub fn to_record<T: Serialize>(value: &T) -> SchemaResult<Record> {
    match serde_json::to_value(value) {
        Ok(Value::Object(record)) => Ok(record),
        Ok(other) => Err(SchemaError::Serialization(format!(
            "document must serialize to an object, got {other}"
        ))),
        Err(e) => Err(SchemaError::Serialization(e.to_string())),
    }
}

/// Returns `true` if `value` is the stand-in for an unresolved back-link.
pub fn is_unfetched(value: &Value) -> bool {
    value.as_object().is_some_and(|m| m.contains_key(UNFETCHED_MARKER))
}

/// The stand-in for an unresolved back-link.
pub fn unfetched() -> Value {
    json!({ UNFETCHED_MARKER: true })
}

/// Encodes and decodes records against the registry's schemas.
#[derive(Clone, Copy, Debug)]
pub struct Encoder<'a> {
    registry: &'a Registry,
}

impl<'a> Encoder<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Encode `record` of `model` into the form written to the store.
    ///
    /// Fails with [`SchemaError::LinkedDocumentNotSaved`] if a link field
    /// embeds a document without an identifier.
    pub fn encode(&self, model: &ModelSchema, record: &Record) -> SchemaResult<Record> {
        let mut out = record.clone();
        for field in &model.fields {
            match &field.kind {
                FieldKind::BackLink { .. } | FieldKind::BackLinkList { .. } => {
                    out.remove(&field.name);
                }
                FieldKind::Link { target } => {
                    if let Some(value) = out.get_mut(&field.name) {
                        let collection = self.registry.collection_of(target)?;
                        *value = encode_link(model, field, collection, value)?;
                    }
                }
                FieldKind::LinkList { target } => {
                    if let Some(value) = out.get_mut(&field.name) {
                        let collection = self.registry.collection_of(target)?;
                        *value = match &*value {
                            Value::Array(items) => Value::Array(
                                items
                                    .iter()
                                    .map(|item| encode_link(model, field, collection, item))
                                    .collect::<SchemaResult<Vec<_>>>()?,
                            ),
                            Value::Null => Value::Null,
                            _ => return Err(shape_error(field, "a list of links")),
                        };
                    }
                }
                FieldKind::Plain => {
                    if let (Some(codec), Some(value)) = (&field.codec, out.get_mut(&field.name)) {
                        *value = codec.encode(value).map_err(|message| SchemaError::Codec {
                            codec: codec.name(),
                            field: field.name.clone(),
                            message,
                        })?;
                    }
                }
            }
        }
        if !model.settings.keep_nulls {
            out.retain(|_, v| !v.is_null());
        }
        Ok(out)
    }

    /// Reverse the field codecs of `model` and mark unresolved back-links.
    pub fn decode(&self, model: &ModelSchema, record: &Record) -> SchemaResult<Record> {
        let mut out = record.clone();
        for field in &model.fields {
            match &field.kind {
                FieldKind::BackLink { .. } | FieldKind::BackLinkList { .. } => {
                    out.entry(field.name.clone()).or_insert_with(unfetched);
                }
                FieldKind::Plain => {
                    if let (Some(codec), Some(value)) = (&field.codec, out.get_mut(&field.name)) {
                        *value = codec.decode(value).map_err(|message| SchemaError::Codec {
                            codec: codec.name(),
                            field: field.name.clone(),
                            message,
                        })?;
                    }
                }
                FieldKind::Link { .. } | FieldKind::LinkList { .. } => {}
            }
        }
        Ok(out)
    }

    /// [`decode`](Self::decode) `record` and every document joined into its
    /// relation fields, each against its own model.
    pub fn decode_tree(&self, model: &ModelSchema, record: &Record) -> SchemaResult<Record> {
        let mut out = self.decode(model, record)?;
        for field in model.relation_fields() {
            let Some(target) = field.kind.target() else {
                continue;
            };
            let target = self.registry.model(target)?;
            match out.get_mut(&field.name) {
                Some(Value::Array(items)) => {
                    for item in items.iter_mut() {
                        self.decode_embedded(target, item)?;
                    }
                }
                Some(single) => self.decode_embedded(target, single)?,
                None => {}
            }
        }
        Ok(out)
    }

    fn decode_embedded(&self, model: &ModelSchema, value: &mut Value) -> SchemaResult<()> {
        if DbRef::is_ref(value) || is_unfetched(value) {
            return Ok(());
        }
        if let Value::Object(embedded) = value {
            *embedded = self.decode_tree(model, embedded)?;
        }
        Ok(())
    }

    /// Check required fields and the shape of relation fields.
    pub fn validate(&self, model: &ModelSchema, record: &Record) -> Result<(), ValidationError> {
        let mut causes = Vec::new();
        for field in &model.fields {
            let value = record.get(&field.name);
            if field.required && value.map_or(true, Value::is_null) {
                causes.push(FieldError {
                    field: field.name.clone(),
                    message: "field required".into(),
                });
                continue;
            }
            let Some(value) = value else { continue };
            let ok = match &field.kind {
                FieldKind::Plain => true,
                FieldKind::Link { .. } => is_link_value(value),
                FieldKind::LinkList { .. } => match value {
                    Value::Array(items) => items.iter().all(|i| !i.is_null() && is_link_value(i)),
                    Value::Null => true,
                    _ => false,
                },
                FieldKind::BackLink { .. } => value.is_object() || value.is_null(),
                FieldKind::BackLinkList { .. } => value.is_array() || is_unfetched(value),
            };
            if !ok {
                causes.push(FieldError {
                    field: field.name.clone(),
                    message: format!("unexpected value for a {}: {value}", kind_label(&field.kind)),
                });
            }
        }
        if causes.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                model: model.name.clone(),
                causes,
            })
        }
    }

    /// Validate, decode and deserialize a stored record, with whatever was
    /// joined into it, into a typed document.
    pub fn construct<T: DeserializeOwned>(&self, model: &ModelSchema, record: &Record) -> SchemaResult<T> {
        self.validate(model, record)?;
        let decoded = self.decode_tree(model, record)?;
        self.rebuild(model, decoded)
    }

    /// Deserialize a record that is already in typed form.
    pub fn rebuild<T: DeserializeOwned>(&self, model: &ModelSchema, record: Record) -> SchemaResult<T> {
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            SchemaError::Validation(ValidationError {
                model: model.name.clone(),
                causes: vec![serde_cause(&e)],
            })
        })
    }
}

fn encode_link(model: &ModelSchema, field: &FieldSchema, collection: &str, value: &Value) -> SchemaResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        v if DbRef::is_ref(v) => Ok(DbRef::parse(v, collection)?.to_value()),
        Value::Object(embedded) => match embedded.get(ID_FIELD) {
            Some(id) if !id.is_null() => {
                let id = weave_types::DocumentId::from_value(id)?;
                Ok(DbRef::new(collection, id).to_value())
            }
            _ => Err(SchemaError::LinkedDocumentNotSaved {
                model: model.name.clone(),
                field: field.name.clone(),
            }),
        },
        _ => Err(shape_error(field, "a link")),
    }
}

fn is_link_value(value: &Value) -> bool {
    value.is_null() || value.is_object()
}

fn kind_label(kind: &FieldKind) -> &'static str {
    match kind {
        FieldKind::Plain => "field",
        FieldKind::Link { .. } => "link",
        FieldKind::LinkList { .. } => "list of links",
        FieldKind::BackLink { .. } => "back-link",
        FieldKind::BackLinkList { .. } => "list of back-links",
    }
}

fn shape_error(field: &FieldSchema, expected: &'static str) -> SchemaError {
    SchemaError::Type(weave_types::TypeError::UnexpectedShape {
        field: field.name.clone(),
        expected,
    })
}

/// Map a deserialization failure to a field cause where serde names one.
fn serde_cause(error: &serde_json::Error) -> FieldError {
    let message = error.to_string();
    let field = ["missing field `", "unknown field `"]
        .iter()
        .find_map(|prefix| {
            let rest = message.split(prefix).nth(1)?;
            rest.split('`').next().map(str::to_string)
        })
        .unwrap_or_default();
    FieldError { field, message }
}
