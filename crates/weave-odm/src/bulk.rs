//! Queued multi-document writes.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use weave_store::{BulkWriteResult, DocumentStore, Session, WriteModel};

use crate::error::{OdmError, OdmResult};

/// Collects write operations for one model and sends them to the store in
/// a single `bulk_write`.
///
/// Identifiers and revisions are assigned when an operation is queued, so
/// queued documents can be linked to before the commit.
pub struct BulkWriter {
    store: Arc<dyn DocumentStore>,
    target: Option<(String, String)>,
    operations: Vec<WriteModel>,
    ordered: bool,
}

impl BulkWriter {
    pub(crate) fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            target: None,
            operations: Vec::new(),
            ordered: true,
        }
    }

    /// Stop at the first failing operation (the default), or attempt them
    /// all.
    pub fn ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Model the queued operations belong to.
    pub fn model(&self) -> Option<&str> {
        self.target.as_ref().map(|(model, _)| model.as_str())
    }

    pub fn operations(&self) -> &[WriteModel] {
        &self.operations
    }

    /// Queue `operation` against `model`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::BulkModelMismatch`] if operations of another
    /// model are already queued.
    pub fn enqueue(&mut self, model: &str, collection: &str, operation: WriteModel) -> OdmResult<()> {
        match &self.target {
            Some((expected, _)) if expected != model => {
                return Err(OdmError::BulkModelMismatch {
                    expected: expected.clone(),
                    found: model.to_string(),
                })
            }
            Some(_) => {}
            None => self.target = Some((model.to_string(), collection.to_string())),
        }
        debug!(model, operation = operation.name(), queued = self.operations.len() + 1, "operation queued");
        self.operations.push(operation);
        Ok(())
    }

    /// Send the queued operations as one `bulk_write`.
    ///
    /// Per-operation failures are reported in the result. An empty writer
    /// does not call the store. If the store rejects the whole batch the
    /// queue is kept and the commit can be retried.
    pub fn commit(&mut self, session: Option<&Session>) -> OdmResult<BulkWriteResult> {
        let Some((model, collection)) = &self.target else {
            return Ok(BulkWriteResult::default());
        };
        let result = self
            .store
            .bulk_write(collection, self.operations.clone(), self.ordered, session)?;
        info!(
            model = %model,
            operations = self.operations.len(),
            applied = result.applied(),
            failed = result.failures.len(),
            "bulk write committed"
        );
        self.target = None;
        self.operations.clear();
        Ok(result)
    }
}

impl fmt::Debug for BulkWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkWriter")
            .field("model", &self.model())
            .field("operations", &self.operations.len())
            .field("ordered", &self.ordered)
            .finish()
    }
}
