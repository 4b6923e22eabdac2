//! Depth-first write and delete propagation.
//!
//! # Invariants
//!
//! - Each `(model, id)` is written or deleted at most once per top-level
//!   call; the caller supplies a fresh [`Visited`] set for every call.
//! - Writes are pre-order: identifiers are assigned to the root before its
//!   targets are saved, and the root is written last, with references only.
//! - Under [`WriteRule::DoNothing`] no other document is touched, and an
//!   embedded target without identifier fails the call before any write.
//! - A revisioned write carries its check in the filter, so a stale writer
//!   changes nothing.

use serde_json::Value;
use tracing::debug;
use weave_link::{refs_in, LinkFetcher};
use weave_schema::{is_unfetched, Encoder, FieldKind, ModelSchema, Registry};
use weave_state::{is_revision_checked, next_revision, revision_filter};
use weave_store::{DocumentStore, Session, StoreError, WriteModel};
use weave_types::{
    record_id, record_revision, DbRef, DocumentId, Record, RevisionId, ID_FIELD, REVISION_FIELD,
};

use crate::error::{PropagateError, PropagateResult};
use crate::rules::{DeleteRule, Visited, WriteOp, WriteRequest, WriteRule};

/// Result of a propagated write.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    /// The document was written; this is its stored form.
    Written(Record),
    /// The document had already been written during this call.
    AlreadyVisited,
}

impl WriteOutcome {
    /// The stored form, if the document was written.
    pub fn stored(self) -> Option<Record> {
        match self {
            Self::Written(stored) => Some(stored),
            Self::AlreadyVisited => None,
        }
    }
}

/// A root write ready to be sent to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedWrite {
    pub collection: String,
    pub id: DocumentId,
    pub op: WriteOp,
    /// Identifier filter, pinned to the recorded revision when checked.
    pub filter: Record,
    /// The encoded document, carrying its new revision.
    pub stored: Record,
    pub revision: Option<RevisionId>,
}

impl PreparedWrite {
    /// The write as a bulk operation.
    pub fn to_write_model(&self) -> WriteModel {
        match self.op {
            WriteOp::Insert => WriteModel::InsertOne {
                document: self.stored.clone(),
            },
            WriteOp::Replace | WriteOp::Save => WriteModel::ReplaceOne {
                filter: self.filter.clone(),
                replacement: self.stored.clone(),
                upsert: self.op == WriteOp::Save,
            },
        }
    }

    /// Record the new revision on the in-memory document and return the
    /// stored form.
    pub fn commit(self, record: &mut Record) -> Record {
        if let Some(revision) = self.revision {
            record.insert(REVISION_FIELD.into(), revision.to_value());
        }
        self.stored
    }
}

/// Cascades writes and deletes through relation fields.
pub struct Propagator<'a> {
    store: &'a dyn DocumentStore,
    registry: &'a Registry,
}

impl<'a> Propagator<'a> {
    pub fn new(store: &'a dyn DocumentStore, registry: &'a Registry) -> Self {
        Self { store, registry }
    }

    /// Write `record` of `model` and, under [`WriteRule::Write`], the
    /// documents it embeds.
    ///
    /// `record` is updated in place: new documents in the graph receive
    /// their identifiers, revisioned ones their new revision.
    pub fn write(
        &self,
        model: &str,
        record: &mut Record,
        request: WriteRequest,
        visited: &mut Visited,
        session: Option<&Session>,
    ) -> PropagateResult<WriteOutcome> {
        let Some(prepared) = self.prepare(model, record, request, visited, session)? else {
            return Ok(WriteOutcome::AlreadyVisited);
        };
        let schema = self.registry.model(model)?;
        self.store_write(schema, &prepared, session)?;
        debug!(model = %schema.name, id = %prepared.id, op = prepared.op.name(), "document written");
        Ok(WriteOutcome::Written(prepared.commit(record)))
    }

    /// Everything [`write`](Self::write) does short of writing the root:
    /// assign its identifier, propagate to embedded targets and encode it.
    ///
    /// Returns `None` if the root was already visited.
    pub fn prepare(
        &self,
        model: &str,
        record: &mut Record,
        request: WriteRequest,
        visited: &mut Visited,
        session: Option<&Session>,
    ) -> PropagateResult<Option<PreparedWrite>> {
        let schema = self.registry.model(model)?;

        let id = match record_id(record)? {
            Some(id) => id,
            None if request.op == WriteOp::Replace => {
                return Err(PropagateError::MissingIdentifier {
                    model: schema.name.clone(),
                })
            }
            None => {
                let id = DocumentId::new();
                record.insert(ID_FIELD.into(), id.to_value());
                id
            }
        };
        if !visited.insert((schema.name.clone(), id)) {
            return Ok(None);
        }

        if request.rule == WriteRule::Write {
            self.write_links(schema, record, request.for_child(), visited, session)?;
        }

        let encoder = Encoder::new(self.registry);
        if schema.settings.validate_on_save {
            encoder.validate(schema, record).map_err(weave_schema::SchemaError::from)?;
        }
        let mut stored = encoder.encode(schema, record)?;

        let recorded = record_revision(record)?;
        let revision = schema.settings.use_revision.then(next_revision);
        if let Some(revision) = revision {
            stored.insert(REVISION_FIELD.into(), revision.to_value());
        }
        let filter = revision_filter(id, recorded, request.ignore_revision || !schema.settings.use_revision);

        Ok(Some(PreparedWrite {
            collection: schema.collection().to_string(),
            id,
            op: request.op,
            filter,
            stored,
            revision,
        }))
    }

    /// Save the documents embedded in the relation fields of `record`.
    pub fn write_links(
        &self,
        schema: &ModelSchema,
        record: &mut Record,
        request: WriteRequest,
        visited: &mut Visited,
        session: Option<&Session>,
    ) -> PropagateResult<()> {
        for field in schema.relation_fields() {
            let Some(target) = field.kind.target() else {
                continue;
            };
            let Some(value) = record.get_mut(&field.name) else {
                continue;
            };
            match value {
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        if let Some(embedded) = embedded_mut(item) {
                            self.write(target, embedded, request, visited, session)?;
                        }
                    }
                }
                single => {
                    if let Some(embedded) = embedded_mut(single) {
                        self.write(target, embedded, request, visited, session)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn store_write(
        &self,
        schema: &ModelSchema,
        prepared: &PreparedWrite,
        session: Option<&Session>,
    ) -> PropagateResult<()> {
        let collection = schema.collection();
        let id = prepared.id;
        let filter = &prepared.filter;
        let stored = prepared.stored.clone();
        match prepared.op {
            WriteOp::Insert => {
                self.store.insert_one(collection, stored, session)?;
            }
            WriteOp::Replace => {
                let result = self.store.replace_one(collection, filter, stored, false, session)?;
                if result.matched == 0 {
                    let exists = self.store.count(collection, &by_id(id), session)? > 0;
                    return Err(if exists {
                        PropagateError::RevisionConflict {
                            model: schema.name.clone(),
                            id,
                        }
                    } else {
                        PropagateError::DocumentNotFound {
                            model: schema.name.clone(),
                            id,
                        }
                    });
                }
            }
            WriteOp::Save => match self.store.replace_one(collection, filter, stored, true, session) {
                Ok(_) => {}
                Err(StoreError::DuplicateKey { .. }) if is_revision_checked(filter) => {
                    return Err(PropagateError::RevisionConflict {
                        model: schema.name.clone(),
                        id,
                    })
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    /// Delete `record` of `model` and, under [`DeleteRule::DeleteLinks`],
    /// its forward-link targets. Returns the number of documents deleted.
    ///
    /// The root must exist; targets that are already gone are skipped.
    pub fn delete(
        &self,
        model: &str,
        record: &Record,
        rule: DeleteRule,
        visited: &mut Visited,
        session: Option<&Session>,
    ) -> PropagateResult<u64> {
        let schema = self.registry.model(model)?;
        let id = record_id(record)?.ok_or_else(|| PropagateError::MissingIdentifier {
            model: schema.name.clone(),
        })?;
        let deleted = self.delete_node(schema, id, record, rule, visited, session)?;
        if deleted == 0 {
            return Err(PropagateError::DocumentNotFound {
                model: schema.name.clone(),
                id,
            });
        }
        Ok(deleted)
    }

    fn delete_node(
        &self,
        schema: &ModelSchema,
        id: DocumentId,
        record: &Record,
        rule: DeleteRule,
        visited: &mut Visited,
        session: Option<&Session>,
    ) -> PropagateResult<u64> {
        if !visited.insert((schema.name.clone(), id)) {
            return Ok(0);
        }
        let result = self.store.delete_one(schema.collection(), &by_id(id), session)?;
        if result.deleted == 0 {
            debug!(model = %schema.name, id = %id, "already deleted");
            return Ok(0);
        }
        debug!(model = %schema.name, id = %id, "document deleted");

        let mut deleted = result.deleted;
        if rule == DeleteRule::DeleteLinks {
            for field in schema.link_fields() {
                let (FieldKind::Link { target } | FieldKind::LinkList { target }) = &field.kind else {
                    continue;
                };
                let Some(value) = record.get(&field.name) else {
                    continue;
                };
                deleted += self.delete_targets(target, value, rule, visited, session)?;
            }
        }
        Ok(deleted)
    }

    fn delete_targets(
        &self,
        target: &str,
        value: &Value,
        rule: DeleteRule,
        visited: &mut Visited,
        session: Option<&Session>,
    ) -> PropagateResult<u64> {
        let schema = self.registry.model(target)?;
        let items: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            single => vec![single],
        };

        let mut deleted = 0;
        let mut unresolved: Vec<DbRef> = Vec::new();
        for item in items {
            match item {
                v if DbRef::is_ref(v) => unresolved.extend(refs_in(v, schema.collection())),
                Value::Object(embedded) => {
                    if let Some(id) = record_id(embedded)? {
                        deleted += self.delete_node(schema, id, embedded, rule, visited, session)?;
                    }
                }
                _ => {}
            }
        }
        unresolved.retain(|r| !visited.contains(&(schema.name.clone(), r.id)));
        if unresolved.is_empty() {
            return Ok(deleted);
        }

        let loaded = LinkFetcher::new(self.store).fetch_list(&unresolved, session)?;
        for (reference, found) in unresolved.iter().zip(loaded) {
            match found {
                Some(found) => {
                    deleted += self.delete_node(schema, reference.id, &found, rule, visited, session)?;
                }
                None => debug!(model = %schema.name, id = %reference.id, "link target missing, skipped"),
            }
        }
        Ok(deleted)
    }
}

/// The embedded document held by a relation value: an object that is
/// neither a stored reference nor the unfetched marker.
fn embedded_mut(value: &mut Value) -> Option<&mut Record> {
    if DbRef::is_ref(value) || is_unfetched(value) {
        return None;
    }
    value.as_object_mut()
}

fn by_id(id: DocumentId) -> Record {
    let mut filter = Record::new();
    filter.insert(ID_FIELD.into(), id.to_value());
    filter
}
