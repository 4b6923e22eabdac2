//! Object-document mapper for weave.
//!
//! [`Odm`] ties a [`DocumentStore`](weave_store::DocumentStore) to a
//! [`Registry`] of models and hands out typed [`Collection`]s. Through a
//! collection, documents are inserted, replaced, saved, partially updated
//! and deleted; links between them are resolved on load or on demand, and
//! writes and deletes can cascade along them.
//!
//! # Key Types
//!
//! - [`Odm`] -- store + registry handle, sessions and transactions
//! - [`Collection`] -- per-model writes, link fetching, change tracking
//! - [`FindMany`] -- lazy queries, optionally joining linked documents in
//! - [`BulkWriter`] -- queued writes sent as one `bulk_write`
//! - [`WriteOptions`] / [`DeleteOptions`] -- link rules, revision checks, sessions
//!
//! # Example
//!
//! ```ignore
//! let odm = Odm::init(store, Registry::builder().register::<Door>().register::<House>().build()?)?;
//! let houses = odm.collection::<House>()?;
//! let mut house = House::new(Link::from(Door::new(10)));
//! houses.insert(&mut house, WriteOptions::new().with_link_rule(WriteRule::Write))?;
//! let tall = houses.find(field("door.height").gt(5)).fetch_links(true).to_list()?;
//! ```

pub mod bulk;
pub mod collection;
pub mod error;
pub mod find;
pub mod odm;
pub mod options;
pub mod traits;

pub use bulk::BulkWriter;
pub use collection::Collection;
pub use error::{OdmError, OdmResult};
pub use find::FindMany;
pub use odm::Odm;
pub use options::{DeleteOptions, MergeStrategy, WriteOptions};
pub use traits::{Aggregatable, Findable};

pub use weave_link::{link_from_id, BackLink, BackLinks, Link};
pub use weave_propagate::{DeleteRule, WriteRule};
pub use weave_query::{and, field, nor, or, Expr, Filter, Sort, Update};
pub use weave_schema::{
    Document, DocumentMeta, Identifiable, ModelSchema, Registry, SchemaBuilder, Settings,
};
pub use weave_state::{StateChange, StateDiff};
pub use weave_store::{InMemoryDocumentStore, Session};
pub use weave_types::{DocumentId, RevisionId};

#[cfg(test)]
mod tests;
