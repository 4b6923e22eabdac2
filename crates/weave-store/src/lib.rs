//! Document store contract for weave.
//!
//! The object-document mapper never talks to a database directly; it goes
//! through the narrow [`DocumentStore`] trait defined here: find, aggregate,
//! insert, replace, update, delete and bulk writes over collections of
//! [`Record`]s, plus sessions and transactions.
//!
//! # Storage Backends
//!
//! - [`InMemoryDocumentStore`] -- `HashMap`-based store for tests and embedding.
//!   It understands a practical subset of a document query language: filters
//!   (`$eq`, `$in`, `$exists`, `$or`, ...), update operators (`$set`, `$inc`,
//!   ...) and aggregation stages (`$match`, `$lookup`, `$unwind`, `$set`, ...).
//!
//! # Design Rules
//!
//! 1. Every call is synchronous and completes before returning.
//! 2. `_id` is unique per collection; other unique indexes are opt-in.
//! 3. Per-document failures inside multi-document writes are reported in the
//!    result, not as an `Err`, so that applied writes stay observable.
//! 4. A session handle is threaded explicitly; the store never opens one.
//!
//! [`Record`]: weave_types::Record

pub mod error;
pub mod filter;
pub mod memory;
pub mod options;
pub mod pipeline;
pub mod results;
pub mod session;
pub mod traits;
pub mod update;
pub mod write;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryDocumentStore, StoreCall};
pub use options::{FindOptions, IndexModel, SortDirection};
pub use results::{
    BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult, WriteFailure,
};
pub use session::{Session, SessionId, Transaction};
pub use traits::DocumentStore;
pub use write::WriteModel;
