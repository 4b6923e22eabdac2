use weave_types::DocumentId;

/// Outcome of a single insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InsertOneResult {
    pub inserted_id: DocumentId,
}

/// A per-document failure inside a multi-document write.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteFailure {
    /// Position of the failed document or operation in the request.
    pub index: usize,
    pub error: crate::StoreError,
}

/// Outcome of an `insert_many`: the identifiers that made it plus the
/// failures that did not.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InsertManyResult {
    pub inserted_ids: Vec<DocumentId>,
    pub failures: Vec<WriteFailure>,
}

impl InsertManyResult {
    /// Returns `true` if every document was inserted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of a replace or update.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<DocumentId>,
}

/// Outcome of a delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted: u64,
}

/// Aggregated outcome of a bulk write.
///
/// Failed operations are listed in `failures`; everything counted in the
/// other fields was applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub deleted: u64,
    pub upserted_ids: Vec<DocumentId>,
    pub failures: Vec<WriteFailure>,
}

impl BulkWriteResult {
    /// Returns `true` if every operation succeeded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of operations that were applied.
    pub fn applied(&self) -> u64 {
        self.inserted + self.matched + self.deleted + self.upserted_ids.len() as u64
    }
}
