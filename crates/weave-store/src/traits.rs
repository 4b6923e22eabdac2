use serde_json::Value;
use weave_types::Record;

use crate::error::StoreResult;
use crate::options::{FindOptions, IndexModel};
use crate::results::{BulkWriteResult, DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
use crate::session::Session;
use crate::write::WriteModel;

/// A document store: collections of records addressed by `_id`.
///
/// All implementations must satisfy these invariants:
/// - `_id` is unique within a collection; a second insert of the same `_id`
///   fails with `DuplicateKey`.
/// - Filters, updates and pipelines use the document query language
///   understood by the store; the mapper only emits the subset documented on
///   [`InMemoryDocumentStore`](crate::InMemoryDocumentStore).
/// - A `$lookup` whose local field holds several keys emits the joined
///   documents in local-key order.
/// - Multi-document writes report per-document failures in their result and
///   keep the writes that succeeded. Errors that are not about one document
///   (bad session, malformed update, poisoned lock) fail the whole call.
/// - Every operation given a session runs inside that session's transaction
///   when one is active.
pub trait DocumentStore: Send + Sync {
    /// Find every record of `collection` matching `filter`.
    fn find(
        &self,
        collection: &str,
        filter: &Record,
        options: &FindOptions,
        session: Option<&Session>,
    ) -> StoreResult<Vec<Record>>;

    /// Find the first record matching `filter`.
    ///
    /// Returns `Ok(None)` if nothing matches.
    fn find_one(
        &self,
        collection: &str,
        filter: &Record,
        session: Option<&Session>,
    ) -> StoreResult<Option<Record>> {
        let options = FindOptions::new().with_limit(1);
        Ok(self
            .find(collection, filter, &options, session)?
            .into_iter()
            .next())
    }

    /// Count the records matching `filter`.
    fn count(&self, collection: &str, filter: &Record, session: Option<&Session>) -> StoreResult<u64> {
        Ok(self.find(collection, filter, &FindOptions::new(), session)?.len() as u64)
    }

    /// Run an aggregation pipeline over `collection`.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        session: Option<&Session>,
    ) -> StoreResult<Vec<Record>>;

    /// Insert a record. The record must carry its `_id`.
    fn insert_one(
        &self,
        collection: &str,
        document: Record,
        session: Option<&Session>,
    ) -> StoreResult<InsertOneResult>;

    /// Insert several records, continuing past per-document failures.
    ///
    /// Errors that are not tied to one document (see
    /// [`StoreError::is_document_level`](crate::StoreError::is_document_level))
    /// abort the call.
    fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Record>,
        session: Option<&Session>,
    ) -> StoreResult<InsertManyResult> {
        let mut result = InsertManyResult::default();
        for (index, document) in documents.into_iter().enumerate() {
            match self.insert_one(collection, document, session) {
                Ok(inserted) => result.inserted_ids.push(inserted.inserted_id),
                Err(error) if error.is_document_level() => {
                    result.failures.push(crate::WriteFailure { index, error })
                }
                Err(error) => return Err(error),
            }
        }
        Ok(result)
    }

    /// Replace the first record matching `filter`, keeping its `_id`.
    fn replace_one(
        &self,
        collection: &str,
        filter: &Record,
        replacement: Record,
        upsert: bool,
        session: Option<&Session>,
    ) -> StoreResult<UpdateResult>;

    /// Apply an update document to the first record matching `filter`.
    fn update_one(
        &self,
        collection: &str,
        filter: &Record,
        update: &Record,
        upsert: bool,
        session: Option<&Session>,
    ) -> StoreResult<UpdateResult>;

    /// Apply an update document to every record matching `filter`.
    fn update_many(
        &self,
        collection: &str,
        filter: &Record,
        update: &Record,
        session: Option<&Session>,
    ) -> StoreResult<UpdateResult>;

    /// Delete the first record matching `filter`.
    fn delete_one(&self, collection: &str, filter: &Record, session: Option<&Session>)
        -> StoreResult<DeleteResult>;

    /// Delete every record matching `filter`.
    fn delete_many(&self, collection: &str, filter: &Record, session: Option<&Session>)
        -> StoreResult<DeleteResult>;

    /// Execute a batch of write operations against one collection.
    ///
    /// With `ordered`, execution stops at the first failure; otherwise every
    /// operation is attempted. Either way, per-document failures are
    /// reported in the result; any other error aborts the call.
    fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<WriteModel>,
        ordered: bool,
        session: Option<&Session>,
    ) -> StoreResult<BulkWriteResult> {
        apply_bulk(self, collection, operations, ordered, session)
    }

    /// Create an index on `collection`. Creating an existing index is a no-op.
    fn create_index(&self, collection: &str, index: &IndexModel) -> StoreResult<()>;

    /// Open a new session.
    fn start_session(&self) -> StoreResult<Session>;

    /// Begin a transaction on `session`.
    fn start_transaction(&self, session: &Session) -> StoreResult<()>;

    /// Commit the active transaction of `session`.
    fn commit_transaction(&self, session: &Session) -> StoreResult<()>;

    /// Abort the active transaction of `session`, undoing its writes.
    fn abort_transaction(&self, session: &Session) -> StoreResult<()>;
}

/// Execute `operations` one by one through the single-document methods of
/// `store`. This is the default [`DocumentStore::bulk_write`].
pub fn apply_bulk<S: DocumentStore + ?Sized>(
    store: &S,
    collection: &str,
    operations: Vec<WriteModel>,
    ordered: bool,
    session: Option<&Session>,
) -> StoreResult<BulkWriteResult> {
    let mut result = BulkWriteResult::default();
    for (index, operation) in operations.into_iter().enumerate() {
        let outcome = match operation {
            WriteModel::InsertOne { document } => store
                .insert_one(collection, document, session)
                .map(|_| result.inserted += 1),
            WriteModel::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => store
                .replace_one(collection, &filter, replacement, upsert, session)
                .map(|r| absorb_update(&mut result, r)),
            WriteModel::UpdateOne {
                filter,
                update,
                upsert,
            } => store
                .update_one(collection, &filter, &update, upsert, session)
                .map(|r| absorb_update(&mut result, r)),
            WriteModel::UpdateMany { filter, update } => store
                .update_many(collection, &filter, &update, session)
                .map(|r| absorb_update(&mut result, r)),
            WriteModel::DeleteOne { filter } => store
                .delete_one(collection, &filter, session)
                .map(|r| result.deleted += r.deleted),
            WriteModel::DeleteMany { filter } => store
                .delete_many(collection, &filter, session)
                .map(|r| result.deleted += r.deleted),
        };
        if let Err(error) = outcome {
            if !error.is_document_level() {
                return Err(error);
            }
            result.failures.push(crate::WriteFailure { index, error });
            if ordered {
                break;
            }
        }
    }
    Ok(result)
}

fn absorb_update(result: &mut BulkWriteResult, update: UpdateResult) {
    result.matched += update.matched;
    result.modified += update.modified;
    if let Some(id) = update.upserted_id {
        result.upserted_ids.push(id);
    }
}
