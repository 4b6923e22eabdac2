//! Foundation types for weave.
//!
//! Every other weave crate depends on `weave-types`. It defines the
//! identity of a stored document, the revision token used for optimistic
//! concurrency, and the raw record representation exchanged with the
//! document store.
//!
//! # Key Types
//!
//! - [`DocumentId`] -- UUID v7 document identifier, assigned client-side
//! - [`RevisionId`] -- opaque token regenerated on every successful write
//! - [`Record`] -- the store-native representation of a document
//! - [`DbRef`] -- stored form of a link: target collection + identifier
//! - [`DocKey`] -- `(collection, id)` pair addressing a loaded document

pub mod error;
pub mod id;
pub mod record;
pub mod reference;

pub use error::TypeError;
pub use id::{DocumentId, RevisionId};
pub use record::{record_id, record_revision, DocKey, Record, ID_FIELD, REVISION_FIELD};
pub use reference::{DbRef, REF_COLLECTION, REF_ID};
