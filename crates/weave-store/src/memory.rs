use std::collections::HashMap;
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use tracing::{debug, trace};
use weave_types::{record_id, DocumentId, Record, TypeError, ID_FIELD};

use crate::error::{StoreError, StoreResult};
use crate::filter::{matches, values_equal};
use crate::options::{FindOptions, IndexModel, SortDirection};
use crate::pipeline::{project, run_pipeline, sort_records};
use crate::results::{DeleteResult, InsertOneResult, UpdateResult};
use crate::session::{Session, SessionId};
use crate::traits::{apply_bulk, DocumentStore};
use crate::update::{apply_update, get_path};
use crate::write::WriteModel;
use crate::BulkWriteResult;

/// One call made against an [`InMemoryDocumentStore`].
///
/// The store keeps a log of these so that callers can assert how many round
/// trips an operation took.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: &'static str,
    pub collection: String,
}

#[derive(Clone, Debug, Default)]
struct CollectionData {
    records: Vec<Record>,
    indexes: Vec<IndexModel>,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, CollectionData>,
    /// Open sessions, with the snapshot taken when their transaction began.
    sessions: HashMap<SessionId, Option<HashMap<String, CollectionData>>>,
    next_session: u64,
}

/// In-memory, HashMap-based document store.
///
/// Intended for tests and embedding. Records live in insertion order per
/// collection behind a `RwLock`; they are cloned on read and write.
/// Transactions snapshot every collection when they begin and restore the
/// snapshot on abort, so writes made outside the transaction while it is
/// open are lost on abort.
pub struct InMemoryDocumentStore {
    state: RwLock<State>,
    calls: Mutex<Vec<StoreCall>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of records in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.read()
            .map(|s| s.collections.get(collection).map_or(0, |c| c.records.len()))
            .unwrap_or(0)
    }

    /// Returns `true` if `collection` holds no records.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Every record of `collection`, in insertion order.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.read()
            .map(|s| {
                s.collections
                    .get(collection)
                    .map(|c| c.records.clone())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Names of the indexes declared on `collection`.
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.read()
            .map(|s| {
                s.collections
                    .get(collection)
                    .map(|c| c.indexes.iter().map(|i| i.name.clone()).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    /// Remove every collection.
    pub fn clear(&self) {
        if let Ok(mut state) = self.state.write() {
            state.collections.clear();
        }
    }

    /// The calls made so far, oldest first.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Forget the recorded calls.
    pub fn reset_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Number of recorded calls of `operation` against `collection`.
    pub fn count_calls(&self, operation: &str, collection: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == operation && c.collection == collection)
            .count()
    }

    /// Number of recorded `find` calls against `collection`.
    pub fn find_calls(&self, collection: &str) -> usize {
        self.count_calls("find", collection)
    }

    fn record_call(&self, operation: &'static str, collection: &str) {
        trace!(operation, collection, "store call");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(StoreCall {
                operation,
                collection: collection.to_string(),
            });
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn check_session(state: &State, session: Option<&Session>) -> StoreResult<()> {
        match session {
            Some(s) if !state.sessions.contains_key(&s.id()) => {
                Err(StoreError::UnknownSession(s.id().0))
            }
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let collections = self.read().map(|s| s.collections.len()).unwrap_or(0);
        f.debug_struct("InMemoryDocumentStore")
            .field("collections", &collections)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Collection helpers
// ---------------------------------------------------------------------------

fn require_id(doc: &Record) -> StoreResult<DocumentId> {
    record_id(doc)?.ok_or_else(|| TypeError::InvalidId("record has no _id".into()).into())
}

fn index_key(doc: &Record, index: &IndexModel) -> Vec<Value> {
    index
        .keys
        .iter()
        .map(|(field, _)| get_path(doc, field).cloned().unwrap_or(Value::Null))
        .collect()
}

impl CollectionData {
    fn position(&self, filter: &Record) -> StoreResult<Option<usize>> {
        for (index, record) in self.records.iter().enumerate() {
            if matches(record, filter)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Reject `candidate` if it collides with a record other than the one at
    /// `skip` on `_id` or on any unique index.
    fn check_unique(&self, name: &str, candidate: &Record, skip: Option<usize>) -> StoreResult<()> {
        let id = candidate.get(ID_FIELD).cloned().unwrap_or(Value::Null);
        let unique: Vec<&IndexModel> = self.indexes.iter().filter(|i| i.unique).collect();
        for (index, record) in self.records.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if record.get(ID_FIELD).is_some_and(|other| values_equal(other, &id)) {
                return Err(StoreError::DuplicateKey {
                    collection: name.to_string(),
                    key: format!("_id: {id}"),
                });
            }
            for model in &unique {
                let key = index_key(candidate, model);
                let other = index_key(record, model);
                if key.iter().zip(&other).all(|(a, b)| values_equal(a, b)) {
                    return Err(StoreError::DuplicateKey {
                        collection: name.to_string(),
                        key: format!("{}: {}", model.name, Value::Array(key)),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, doc: Record) -> StoreResult<DocumentId> {
        let id = require_id(&doc)?;
        self.check_unique(name, &doc, None)?;
        self.records.push(doc);
        Ok(id)
    }
}

/// Seed an upserted record from the plain equality conditions of `filter`.
fn upsert_seed(filter: &Record) -> Record {
    filter
        .iter()
        .filter(|(key, value)| {
            !key.starts_with('$')
                && !key.contains('.')
                && !matches!(value, Value::Object(m) if m.keys().any(|k| k.starts_with('$')))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl DocumentStore for InMemoryDocumentStore {
    fn find(
        &self,
        collection: &str,
        filter: &Record,
        options: &FindOptions,
        session: Option<&Session>,
    ) -> StoreResult<Vec<Record>> {
        self.record_call("find", collection);
        let state = self.read()?;
        Self::check_session(&state, session)?;
        let mut found = Vec::new();
        if let Some(data) = state.collections.get(collection) {
            for record in &data.records {
                if matches(record, filter)? {
                    found.push(record.clone());
                }
            }
        }
        drop(state);

        if !options.sort.is_empty() {
            let keys: Vec<(String, bool)> = options
                .sort
                .iter()
                .map(|(field, direction)| (field.clone(), *direction == SortDirection::Ascending))
                .collect();
            sort_records(&mut found, &keys);
        }
        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        let page = found.into_iter().skip(skip).take(limit);
        match &options.projection {
            Some(projection) => page.map(|doc| project(&doc, projection)).collect(),
            None => Ok(page.collect()),
        }
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        session: Option<&Session>,
    ) -> StoreResult<Vec<Record>> {
        self.record_call("aggregate", collection);
        let state = self.read()?;
        Self::check_session(&state, session)?;
        let source = |name: &str| {
            state
                .collections
                .get(name)
                .map(|c| c.records.clone())
                .unwrap_or_default()
        };
        let docs = source(collection);
        debug!(collection, stages = pipeline.len(), "aggregate");
        run_pipeline(docs, pipeline, &source)
    }

    fn insert_one(
        &self,
        collection: &str,
        document: Record,
        session: Option<&Session>,
    ) -> StoreResult<InsertOneResult> {
        self.record_call("insert_one", collection);
        let mut state = self.write()?;
        Self::check_session(&state, session)?;
        let data = state.collections.entry(collection.to_string()).or_default();
        let inserted_id = data.insert(collection, document)?;
        debug!(collection, id = %inserted_id, "inserted record");
        Ok(InsertOneResult { inserted_id })
    }

    fn replace_one(
        &self,
        collection: &str,
        filter: &Record,
        mut replacement: Record,
        upsert: bool,
        session: Option<&Session>,
    ) -> StoreResult<UpdateResult> {
        self.record_call("replace_one", collection);
        let mut state = self.write()?;
        Self::check_session(&state, session)?;
        let data = state.collections.entry(collection.to_string()).or_default();

        match data.position(filter)? {
            Some(index) => {
                let existing_id = data.records[index].get(ID_FIELD).cloned().unwrap_or(Value::Null);
                match replacement.get(ID_FIELD) {
                    Some(id) if !values_equal(id, &existing_id) => {
                        return Err(StoreError::InvalidUpdate("_id is immutable".into()))
                    }
                    _ => {
                        replacement.insert(ID_FIELD.into(), existing_id);
                    }
                }
                data.check_unique(collection, &replacement, Some(index))?;
                let modified = data.records[index] != replacement;
                data.records[index] = replacement;
                debug!(collection, modified, "replaced record");
                Ok(UpdateResult {
                    matched: 1,
                    modified: u64::from(modified),
                    upserted_id: None,
                })
            }
            None if upsert => {
                let mut doc = upsert_seed(filter);
                doc.retain(|k, _| k == ID_FIELD);
                doc.extend(replacement);
                let id = data.insert(collection, doc)?;
                debug!(collection, id = %id, "upserted record");
                Ok(UpdateResult {
                    matched: 0,
                    modified: 0,
                    upserted_id: Some(id),
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    fn update_one(
        &self,
        collection: &str,
        filter: &Record,
        update: &Record,
        upsert: bool,
        session: Option<&Session>,
    ) -> StoreResult<UpdateResult> {
        self.record_call("update_one", collection);
        let mut state = self.write()?;
        Self::check_session(&state, session)?;
        let data = state.collections.entry(collection.to_string()).or_default();

        match data.position(filter)? {
            Some(index) => {
                let mut updated = data.records[index].clone();
                let modified = apply_update(&mut updated, update)?;
                if modified {
                    data.check_unique(collection, &updated, Some(index))?;
                    data.records[index] = updated;
                }
                Ok(UpdateResult {
                    matched: 1,
                    modified: u64::from(modified),
                    upserted_id: None,
                })
            }
            None if upsert => {
                let mut doc = upsert_seed(filter);
                apply_update(&mut doc, update)?;
                if !doc.contains_key(ID_FIELD) {
                    doc.insert(ID_FIELD.into(), DocumentId::new().to_value());
                }
                let id = data.insert(collection, doc)?;
                debug!(collection, id = %id, "upserted record");
                Ok(UpdateResult {
                    matched: 0,
                    modified: 0,
                    upserted_id: Some(id),
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    fn update_many(
        &self,
        collection: &str,
        filter: &Record,
        update: &Record,
        session: Option<&Session>,
    ) -> StoreResult<UpdateResult> {
        self.record_call("update_many", collection);
        let mut state = self.write()?;
        Self::check_session(&state, session)?;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };
        let mut result = UpdateResult::default();
        for index in 0..data.records.len() {
            if !matches(&data.records[index], filter)? {
                continue;
            }
            result.matched += 1;
            let mut updated = data.records[index].clone();
            if apply_update(&mut updated, update)? {
                data.check_unique(collection, &updated, Some(index))?;
                data.records[index] = updated;
                result.modified += 1;
            }
        }
        debug!(collection, matched = result.matched, modified = result.modified, "updated records");
        Ok(result)
    }

    fn delete_one(
        &self,
        collection: &str,
        filter: &Record,
        session: Option<&Session>,
    ) -> StoreResult<DeleteResult> {
        self.record_call("delete_one", collection);
        let mut state = self.write()?;
        Self::check_session(&state, session)?;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        match data.position(filter)? {
            Some(index) => {
                data.records.remove(index);
                debug!(collection, "deleted record");
                Ok(DeleteResult { deleted: 1 })
            }
            None => Ok(DeleteResult::default()),
        }
    }

    fn delete_many(
        &self,
        collection: &str,
        filter: &Record,
        session: Option<&Session>,
    ) -> StoreResult<DeleteResult> {
        self.record_call("delete_many", collection);
        let mut state = self.write()?;
        Self::check_session(&state, session)?;
        let Some(data) = state.collections.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };
        let mut doomed = Vec::new();
        for (index, record) in data.records.iter().enumerate() {
            if matches(record, filter)? {
                doomed.push(index);
            }
        }
        for index in doomed.iter().rev() {
            data.records.remove(*index);
        }
        let deleted = doomed.len() as u64;
        debug!(collection, deleted, "deleted records");
        Ok(DeleteResult { deleted })
    }

    fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<WriteModel>,
        ordered: bool,
        session: Option<&Session>,
    ) -> StoreResult<BulkWriteResult> {
        self.record_call("bulk_write", collection);
        debug!(collection, operations = operations.len(), ordered, "bulk write");
        apply_bulk(self, collection, operations, ordered, session)
    }

    fn create_index(&self, collection: &str, index: &IndexModel) -> StoreResult<()> {
        self.record_call("create_index", collection);
        let mut state = self.write()?;
        let data = state.collections.entry(collection.to_string()).or_default();
        if data.indexes.iter().any(|i| i.name == index.name) {
            return Ok(());
        }
        if index.unique {
            let keys: Vec<Vec<Value>> = data.records.iter().map(|r| index_key(r, index)).collect();
            for (i, key) in keys.iter().enumerate() {
                let clash = keys[..i]
                    .iter()
                    .any(|other| key.iter().zip(other).all(|(a, b)| values_equal(a, b)));
                if clash {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        key: format!("{}: {}", index.name, Value::Array(key.clone())),
                    });
                }
            }
        }
        debug!(collection, index = %index.name, unique = index.unique, "created index");
        data.indexes.push(index.clone());
        Ok(())
    }

    fn start_session(&self) -> StoreResult<Session> {
        let mut state = self.write()?;
        state.next_session += 1;
        let id = SessionId(state.next_session);
        state.sessions.insert(id, None);
        Ok(Session::new(id))
    }

    fn start_transaction(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.write()?;
        let snapshot = state.collections.clone();
        match state.sessions.get_mut(&session.id()) {
            None => Err(StoreError::UnknownSession(session.id().0)),
            Some(Some(_)) => Err(StoreError::Transaction(format!(
                "{} already has an active transaction",
                session.id()
            ))),
            Some(slot) => {
                *slot = Some(snapshot);
                debug!(session = %session.id(), "transaction started");
                Ok(())
            }
        }
    }

    fn commit_transaction(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.sessions.get_mut(&session.id()) {
            None => Err(StoreError::UnknownSession(session.id().0)),
            Some(slot) => match slot.take() {
                Some(_) => {
                    debug!(session = %session.id(), "transaction committed");
                    Ok(())
                }
                None => Err(StoreError::Transaction(format!(
                    "{} has no active transaction",
                    session.id()
                ))),
            },
        }
    }

    fn abort_transaction(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.write()?;
        let snapshot = match state.sessions.get_mut(&session.id()) {
            None => return Err(StoreError::UnknownSession(session.id().0)),
            Some(slot) => slot.take(),
        };
        match snapshot {
            Some(collections) => {
                state.collections = collections;
                debug!(session = %session.id(), "transaction aborted");
                Ok(())
            }
            None => Err(StoreError::Transaction(format!(
                "{} has no active transaction",
                session.id()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Transaction;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn doc(id: DocumentId, extra: Value) -> Record {
        let mut r = record(extra);
        r.insert(ID_FIELD.into(), id.to_value());
        r
    }

    fn by_id(id: DocumentId) -> Record {
        record(json!({ "_id": id.to_value() }))
    }

    // ----------------------------------------------------------------
    // Insert / find
    // ----------------------------------------------------------------

    #[test]
    fn insert_and_find() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        store.insert_one("doors", doc(id, json!({"t": 10})), None).unwrap();

        let found = store.find_one("doors", &by_id(id), None).unwrap().unwrap();
        assert_eq!(found["t"], json!(10));
        assert_eq!(store.len("doors"), 1);
    }

    #[test]
    fn insert_duplicate_id_fails() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        store.insert_one("doors", doc(id, json!({})), None).unwrap();
        let err = store.insert_one("doors", doc(id, json!({})), None).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn insert_without_id_fails() {
        let store = InMemoryDocumentStore::new();
        let err = store.insert_one("doors", record(json!({"t": 1})), None).unwrap_err();
        assert!(matches!(err, StoreError::MalformedRecord(_)));
    }

    #[test]
    fn find_sorts_skips_and_limits() {
        let store = InMemoryDocumentStore::new();
        for n in [3, 1, 2, 5, 4] {
            store.insert_one("n", doc(DocumentId::new(), json!({"n": n})), None).unwrap();
        }
        let options = FindOptions::new()
            .with_sort("n", SortDirection::Descending)
            .with_skip(1)
            .with_limit(2);
        let found = store.find("n", &Record::new(), &options, None).unwrap();
        let ns: Vec<_> = found.iter().map(|d| d["n"].clone()).collect();
        assert_eq!(ns, vec![json!(4), json!(3)]);
    }

    #[test]
    fn find_applies_projection() {
        let store = InMemoryDocumentStore::new();
        store
            .insert_one("n", doc(DocumentId::new(), json!({"a": 1, "b": 2})), None)
            .unwrap();
        let options = FindOptions::new().with_projection(record(json!({"a": 1, "_id": 0})));
        let found = store.find("n", &Record::new(), &options, None).unwrap();
        assert_eq!(found[0], record(json!({"a": 1})));
    }

    #[test]
    fn count_matches_filter() {
        let store = InMemoryDocumentStore::new();
        for n in 0..4 {
            store.insert_one("n", doc(DocumentId::new(), json!({"n": n})), None).unwrap();
        }
        let filter = record(json!({"n": {"$gte": 2}}));
        assert_eq!(store.count("n", &filter, None).unwrap(), 2);
    }

    // ----------------------------------------------------------------
    // Replace / update / delete
    // ----------------------------------------------------------------

    #[test]
    fn replace_keeps_id_and_reports_modification() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        store.insert_one("doors", doc(id, json!({"t": 1})), None).unwrap();

        let result = store
            .replace_one("doors", &by_id(id), record(json!({"t": 2})), false, None)
            .unwrap();
        assert_eq!(result.matched, 1);
        assert_eq!(result.modified, 1);
        let found = store.find_one("doors", &by_id(id), None).unwrap().unwrap();
        assert_eq!(found["t"], json!(2));
        assert_eq!(found[ID_FIELD], id.to_value());
    }

    #[test]
    fn replace_without_match_and_upsert_inserts() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        let none = store
            .replace_one("doors", &by_id(id), record(json!({"t": 2})), false, None)
            .unwrap();
        assert_eq!(none.matched, 0);
        assert!(store.is_empty("doors"));

        let upserted = store
            .replace_one("doors", &by_id(id), record(json!({"t": 2})), true, None)
            .unwrap();
        assert_eq!(upserted.upserted_id, Some(id));
        assert_eq!(store.len("doors"), 1);
    }

    #[test]
    fn upsert_colliding_with_existing_id_is_duplicate_key() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        store.insert_one("doors", doc(id, json!({"rev": "a"})), None).unwrap();
        let filter = record(json!({"_id": id.to_value(), "rev": "stale"}));
        let err = store
            .replace_one("doors", &filter, record(json!({"rev": "b"})), true, None)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[test]
    fn update_one_and_many() {
        let store = InMemoryDocumentStore::new();
        let a = DocumentId::new();
        store.insert_one("n", doc(a, json!({"n": 1, "g": 0})), None).unwrap();
        store.insert_one("n", doc(DocumentId::new(), json!({"n": 2, "g": 1})), None).unwrap();
        store.insert_one("n", doc(DocumentId::new(), json!({"n": 3, "g": 1})), None).unwrap();

        let one = store
            .update_one("n", &by_id(a), &record(json!({"$inc": {"n": 10}})), false, None)
            .unwrap();
        assert_eq!(one.modified, 1);

        let many = store
            .update_many("n", &record(json!({"g": 1})), &record(json!({"$set": {"n": 0}})), None)
            .unwrap();
        assert_eq!(many.matched, 2);
        assert_eq!(store.count("n", &record(json!({"n": 0})), None).unwrap(), 2);
        assert_eq!(store.count("n", &record(json!({"n": 11})), None).unwrap(), 1);
    }

    #[test]
    fn delete_one_and_many() {
        let store = InMemoryDocumentStore::new();
        for g in [0, 1, 1] {
            store.insert_one("n", doc(DocumentId::new(), json!({"g": g})), None).unwrap();
        }
        let one = store.delete_one("n", &record(json!({"g": 1})), None).unwrap();
        assert_eq!(one.deleted, 1);
        let many = store.delete_many("n", &Record::new(), None).unwrap();
        assert_eq!(many.deleted, 2);
        assert!(store.is_empty("n"));
    }

    // ----------------------------------------------------------------
    // Indexes
    // ----------------------------------------------------------------

    #[test]
    fn unique_index_rejects_duplicates() {
        let store = InMemoryDocumentStore::new();
        store
            .create_index("users", &IndexModel::ascending("email").unique())
            .unwrap();
        store
            .insert_one("users", doc(DocumentId::new(), json!({"email": "a@x"})), None)
            .unwrap();
        let err = store
            .insert_one("users", doc(DocumentId::new(), json!({"email": "a@x"})), None)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(store.index_names("users"), vec!["email_1".to_string()]);
    }

    #[test]
    fn create_index_is_idempotent() {
        let store = InMemoryDocumentStore::new();
        let index = IndexModel::ascending("email");
        store.create_index("users", &index).unwrap();
        store.create_index("users", &index).unwrap();
        assert_eq!(store.index_names("users").len(), 1);
    }

    // ----------------------------------------------------------------
    // Bulk writes
    // ----------------------------------------------------------------

    #[test]
    fn unordered_bulk_write_reports_failures_and_keeps_the_rest() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        let ops = vec![
            WriteModel::InsertOne { document: doc(id, json!({})) },
            WriteModel::InsertOne { document: doc(id, json!({})) },
            WriteModel::InsertOne { document: doc(DocumentId::new(), json!({})) },
        ];
        let result = store.bulk_write("n", ops, false, None).unwrap();
        assert_eq!(result.inserted, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].index, 1);
        assert_eq!(store.count_calls("bulk_write", "n"), 1);
    }

    #[test]
    fn ordered_bulk_write_stops_at_first_failure() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        let ops = vec![
            WriteModel::InsertOne { document: doc(id, json!({})) },
            WriteModel::InsertOne { document: doc(id, json!({})) },
            WriteModel::InsertOne { document: doc(DocumentId::new(), json!({})) },
        ];
        let result = store.bulk_write("n", ops, true, None).unwrap();
        assert_eq!(result.inserted, 1);
        assert!(!result.is_complete());
        assert_eq!(store.len("n"), 1);
    }

    #[test]
    fn bulk_write_aborts_on_store_wide_errors() {
        let store = InMemoryDocumentStore::new();
        let stray = Session::new(SessionId(42));
        let ops = vec![
            WriteModel::InsertOne { document: doc(DocumentId::new(), json!({})) },
            WriteModel::InsertOne { document: doc(DocumentId::new(), json!({})) },
        ];
        let err = store.bulk_write("n", ops, false, Some(&stray)).unwrap_err();
        assert_eq!(err, StoreError::UnknownSession(42));
        assert!(store.is_empty("n"));
    }

    #[test]
    fn insert_many_collects_duplicates_but_aborts_on_bad_session() {
        let store = InMemoryDocumentStore::new();
        let id = DocumentId::new();
        let docs = vec![doc(id, json!({})), doc(id, json!({})), doc(DocumentId::new(), json!({}))];
        let result = store.insert_many("n", docs, None).unwrap();
        assert_eq!(result.inserted_ids.len(), 2);
        assert_eq!(result.failures[0].index, 1);

        let stray = Session::new(SessionId(42));
        let docs = vec![doc(DocumentId::new(), json!({}))];
        let err = store.insert_many("m", docs, Some(&stray)).unwrap_err();
        assert_eq!(err, StoreError::UnknownSession(42));
        assert!(store.is_empty("m"));
    }

    // ----------------------------------------------------------------
    // Aggregation
    // ----------------------------------------------------------------

    #[test]
    fn aggregate_joins_collections() {
        let store = InMemoryDocumentStore::new();
        let door = DocumentId::new();
        let house = DocumentId::new();
        store.insert_one("doors", doc(door, json!({"t": 5})), None).unwrap();
        store
            .insert_one(
                "houses",
                doc(house, json!({"door": {"$ref": "doors", "$id": door.to_value()}})),
                None,
            )
            .unwrap();
        let pipeline = vec![
            json!({"$lookup": {"from": "doors", "localField": "door.$id",
                               "foreignField": "_id", "as": "_door"}}),
            json!({"$unwind": {"path": "$_door", "preserveNullAndEmptyArrays": true}}),
            json!({"$set": {"door": {"$ifNull": ["$_door", "$door"]}}}),
            json!({"$unset": "_door"}),
        ];
        let out = store.aggregate("houses", &pipeline, None).unwrap();
        assert_eq!(out[0]["door"]["t"], json!(5));
    }

    // ----------------------------------------------------------------
    // Sessions and transactions
    // ----------------------------------------------------------------

    #[test]
    fn aborted_transaction_restores_state() {
        let store = InMemoryDocumentStore::new();
        let session = store.start_session().unwrap();
        let tx = Transaction::begin(&store, &session).unwrap();
        store
            .insert_one("n", doc(DocumentId::new(), json!({})), Some(tx.session()))
            .unwrap();
        tx.abort().unwrap();
        assert!(store.is_empty("n"));
    }

    #[test]
    fn dropped_transaction_aborts() {
        let store = InMemoryDocumentStore::new();
        let session = store.start_session().unwrap();
        {
            let tx = Transaction::begin(&store, &session).unwrap();
            store
                .insert_one("n", doc(DocumentId::new(), json!({})), Some(tx.session()))
                .unwrap();
        }
        assert!(store.is_empty("n"));
    }

    #[test]
    fn committed_transaction_keeps_writes() {
        let store = InMemoryDocumentStore::new();
        let session = store.start_session().unwrap();
        let tx = Transaction::begin(&store, &session).unwrap();
        store
            .insert_one("n", doc(DocumentId::new(), json!({})), Some(tx.session()))
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(store.len("n"), 1);
        assert!(store.commit_transaction(&session).is_err());
    }

    #[test]
    fn unknown_session_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let stray = Session::new(SessionId(42));
        let err = store.find("n", &Record::new(), &FindOptions::new(), Some(&stray)).unwrap_err();
        assert_eq!(err, StoreError::UnknownSession(42));
    }

    #[test]
    fn calls_are_recorded() {
        let store = InMemoryDocumentStore::new();
        store.find("a", &Record::new(), &FindOptions::new(), None).unwrap();
        store.find("a", &Record::new(), &FindOptions::new(), None).unwrap();
        store.find("b", &Record::new(), &FindOptions::new(), None).unwrap();
        assert_eq!(store.find_calls("a"), 2);
        assert_eq!(store.find_calls("b"), 1);
        store.reset_calls();
        assert!(store.calls().is_empty());
    }
}
