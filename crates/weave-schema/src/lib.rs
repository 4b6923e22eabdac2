//! Model schemas, the settings registry and the record encoder.
//!
//! Every document model is described once by an explicit [`ModelSchema`]:
//! its collection settings and, for every field, whether it is plain data,
//! a forward link, a list of links, or a back-link computed from a forward
//! link declared on another model. The resolution and propagation engines
//! consult these descriptors instead of inspecting values at runtime.
//!
//! # Key Types
//!
//! - [`SchemaBuilder`] / [`ModelSchema`] / [`FieldKind`] -- per-model descriptors
//! - [`Settings`] -- collection name, revision and state-tracking switches, nesting limits
//! - [`Registry`] / [`RegistryBuilder`] -- validated, read-only set of models
//! - [`Document`] / [`Identifiable`] / [`DocumentMeta`] -- typed document capabilities
//! - [`Encoder`] -- typed value to stored record and back, field codecs, validation

pub mod codec;
pub mod document;
pub mod encoder;
pub mod error;
pub mod model;
pub mod registry;
pub mod settings;

pub use codec::{FieldCodec, TimestampMillis};
pub use document::{Document, DocumentMeta, Identifiable};
pub use encoder::{is_unfetched, to_record, unfetched, Encoder, FieldError, ValidationError, UNFETCHED_MARKER};
pub use error::{SchemaError, SchemaResult};
pub use model::{FieldKind, FieldSchema, ModelSchema, SchemaBuilder};
pub use registry::{Registry, RegistryBuilder};
pub use settings::Settings;
