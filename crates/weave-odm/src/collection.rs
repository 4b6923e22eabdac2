//! Typed access to the documents of one model.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};
use weave_link::{Link, LinkFetcher};
use weave_propagate::{DeleteRule, Propagator, Visited, WriteOp, WriteRequest, WriteRule};
use weave_query::Update;
use weave_resolve::{DepthOptions, LinkPlan, Resolver};
use weave_schema::{is_unfetched, to_record, Document, Encoder, FieldKind, Identifiable, ModelSchema};
use weave_state::{apply_changes, next_revision, revision_filter, StateDiff, Tracker};
use weave_store::{DeleteResult, InsertManyResult, Session, WriteModel};
use weave_types::{DbRef, DocumentId, Record, ID_FIELD, REVISION_FIELD};

use crate::error::{OdmError, OdmResult};
use crate::odm::Odm;
use crate::options::{DeleteOptions, MergeStrategy, WriteOptions};

/// Typed handle to the collection of `T`, obtained from
/// [`Odm::collection`].
pub struct Collection<T> {
    odm: Odm,
    schema: Arc<ModelSchema>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            odm: self.odm.clone(),
            schema: Arc::clone(&self.schema),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("model", &self.schema.name)
            .field("collection", &self.schema.collection())
            .finish()
    }
}

impl<T: Document> Collection<T> {
    pub(crate) fn new(odm: Odm, schema: Arc<ModelSchema>) -> Self {
        Self {
            odm,
            schema,
            _marker: PhantomData,
        }
    }

    /// Name of the underlying store collection.
    pub fn name(&self) -> &str {
        self.schema.collection()
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn odm(&self) -> &Odm {
        &self.odm
    }

    // ---- Document writes ----

    /// Insert `doc` as a new document. An identifier is assigned if it has
    /// none.
    pub fn insert(&self, doc: &mut T, options: WriteOptions<'_>) -> OdmResult<()> {
        self.write(doc, WriteOp::Insert, options)
    }

    /// Replace the stored document with `doc`.
    ///
    /// # Errors
    ///
    /// - [`OdmError::MissingIdentifier`] if `doc` was never saved.
    /// - [`OdmError::DocumentNotFound`] if no document has its identifier.
    /// - [`OdmError::RevisionConflict`] if the stored revision moved on.
    pub fn replace(&self, doc: &mut T, options: WriteOptions<'_>) -> OdmResult<()> {
        self.write(doc, WriteOp::Replace, options)
    }

    /// Insert `doc` or replace the stored document with the same identifier.
    pub fn save(&self, doc: &mut T, options: WriteOptions<'_>) -> OdmResult<()> {
        self.write(doc, WriteOp::Save, options)
    }

    fn write(&self, doc: &mut T, op: WriteOp, options: WriteOptions<'_>) -> OdmResult<()> {
        let mut record = to_record(doc)?;
        let request = WriteRequest::new(op)
            .with_rule(options.link_rule)
            .ignoring_revision(options.ignore_revision);
        let propagator = self.propagator();
        let mut visited = Visited::new();
        let track = match options.bulk {
            None => {
                propagator.write(T::MODEL, &mut record, request, &mut visited, options.session)?;
                true
            }
            Some(bulk) => {
                if let Some(prepared) =
                    propagator.prepare(T::MODEL, &mut record, request, &mut visited, options.session)?
                {
                    bulk.enqueue(T::MODEL, &prepared.collection, prepared.to_write_model())?;
                    prepared.commit(&mut record);
                }
                false
            }
        };
        self.absorb(doc, record)?;
        if track {
            self.track(doc)?;
        }
        Ok(())
    }

    /// Save only what changed since the last load or save.
    ///
    /// Returns `false` without touching the store if nothing changed.
    /// Requires state management on the model.
    pub fn save_changes(&self, doc: &mut T, options: WriteOptions<'_>) -> OdmResult<bool> {
        if !self.is_changed(doc)? {
            debug!(model = T::MODEL, "no changes to save");
            return Ok(false);
        }
        if options.link_rule == WriteRule::Write {
            let mut record = to_record(doc)?;
            let request = WriteRequest::new(WriteOp::Save)
                .with_rule(WriteRule::Write)
                .ignoring_revision(options.ignore_revision);
            let mut visited = Visited::new();
            if let Some(id) = doc.id() {
                visited.insert((self.schema.name.clone(), id));
            }
            self.propagator()
                .write_links(&self.schema, &mut record, request.for_child(), &mut visited, options.session)?;
            self.absorb(doc, record)?;
        }
        let diff = self.get_changes(doc)?;
        debug!(model = T::MODEL, changed = diff.len(), "saving changes");
        self.apply_update(doc, Update::from_diff(&diff).render(), options, false)?;
        Ok(true)
    }

    /// Apply `update` to the stored document, then reload `doc` from it.
    pub fn update(&self, doc: &mut T, update: Update, options: WriteOptions<'_>) -> OdmResult<()> {
        self.apply_update(doc, update.render(), options, true)
    }

    fn apply_update(
        &self,
        doc: &mut T,
        mut update: Record,
        options: WriteOptions<'_>,
        reload: bool,
    ) -> OdmResult<()> {
        let id = self.require_id(doc)?;
        let use_revision = self.schema.settings.use_revision;
        let revision = use_revision.then(next_revision);
        if let Some(revision) = revision {
            let set = update.entry("$set").or_insert_with(|| json!({}));
            if let Value::Object(set) = set {
                set.insert(REVISION_FIELD.into(), revision.to_value());
            }
        }
        let filter = revision_filter(id, doc.revision(), options.ignore_revision || !use_revision);

        if let Some(bulk) = options.bulk {
            bulk.enqueue(
                T::MODEL,
                self.name(),
                WriteModel::UpdateOne {
                    filter,
                    update,
                    upsert: false,
                },
            )?;
            if revision.is_some() {
                doc.meta_mut().revision_id = revision;
            }
            return Ok(());
        }

        let store = self.odm.store();
        let result = store.update_one(self.name(), &filter, &update, false, options.session)?;
        if result.matched == 0 {
            return Err(self.missing_or_conflict(id, options.session)?);
        }

        if reload {
            let record = store
                .find_one(self.name(), &by_id(id), options.session)?
                .ok_or_else(|| self.not_found(id))?;
            let meta = doc.meta().clone();
            let mut fresh: T = self.encoder().construct(&self.schema, &record)?;
            fresh.meta_mut().saved_state = meta.saved_state;
            fresh.meta_mut().previous_state = meta.previous_state;
            *doc = fresh;
        } else if revision.is_some() {
            doc.meta_mut().revision_id = revision;
        }
        self.track(doc)?;
        debug!(model = T::MODEL, id = %id, "document updated");
        Ok(())
    }

    /// Delete `doc` and, under [`DeleteRule::DeleteLinks`], the documents it
    /// links to. Returns the number of documents deleted; a queued delete
    /// reports zero.
    pub fn delete(&self, doc: &T, options: DeleteOptions<'_>) -> OdmResult<u64> {
        let id = self.require_id(doc)?;
        if let Some(bulk) = options.bulk {
            if options.link_rule == DeleteRule::DeleteLinks {
                return Err(OdmError::BulkUnsupported("deleting linked documents"));
            }
            bulk.enqueue(T::MODEL, self.name(), WriteModel::DeleteOne { filter: by_id(id) })?;
            return Ok(0);
        }
        let record = to_record(doc)?;
        let deleted = self.propagator().delete(
            T::MODEL,
            &record,
            options.link_rule,
            &mut Visited::new(),
            options.session,
        )?;
        debug!(model = T::MODEL, id = %id, deleted, "document deleted");
        Ok(deleted)
    }

    // ---- Links ----

    /// Resolve one relation field of `doc`, one level deep.
    pub fn fetch_link(&self, doc: &mut T, field: &str, session: Option<&Session>) -> OdmResult<()> {
        let mut record = to_record(doc)?;
        let before = record.clone();
        self.resolver().fetch_link(T::MODEL, &mut record, field, session)?;
        self.decode_fetched(&before, &mut record)?;
        self.absorb(doc, record)
    }

    /// Resolve every relation field of `doc`, one level deep.
    pub fn fetch_all_links(&self, doc: &mut T, session: Option<&Session>) -> OdmResult<()> {
        let mut record = to_record(doc)?;
        let before = record.clone();
        self.resolver().fetch_all_links(T::MODEL, &mut record, session)?;
        self.decode_fetched(&before, &mut record)?;
        self.absorb(doc, record)
    }

    /// Load the document `link` points at. With `nested`, the loaded
    /// document's own links are resolved one level deep.
    ///
    /// Returns `Ok(None)` for a dangling link.
    pub fn fetch(&self, link: &Link<T>, nested: bool, session: Option<&Session>) -> OdmResult<Option<T>> {
        let id = link.id().ok_or_else(|| OdmError::MissingIdentifier {
            model: T::MODEL.to_string(),
        })?;
        let reference = DbRef::new(self.name(), id);
        let Some(mut record) = LinkFetcher::new(self.odm.store()).fetch(&reference, session)? else {
            return Ok(None);
        };
        if nested {
            let plan = self.nested_plan()?;
            self.resolver().resolve(&mut record, &plan, session)?;
        }
        self.load(record).map(Some)
    }

    /// Load the documents `links` point at, in order, with one query.
    /// Dangling links are left out.
    pub fn fetch_list(&self, links: &[Link<T>], nested: bool, session: Option<&Session>) -> OdmResult<Vec<T>> {
        let references = links
            .iter()
            .map(|link| link.to_ref(self.name()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| OdmError::MissingIdentifier {
                model: T::MODEL.to_string(),
            })?;
        let mut records: Vec<Record> = LinkFetcher::new(self.odm.store())
            .fetch_list(&references, session)?
            .into_iter()
            .flatten()
            .collect();
        if nested {
            let plan = self.nested_plan()?;
            self.resolver().resolve_many(&mut records, &plan, session)?;
        }
        records.into_iter().map(|record| self.load(record)).collect()
    }

    /// Load document `id`, resolving its links to the model's default depth
    /// when `fetch_links` is set.
    pub fn get_in(&self, id: DocumentId, fetch_links: bool, session: Option<&Session>) -> OdmResult<Option<T>> {
        let Some(mut record) = self.odm.store().find_one(self.name(), &by_id(id), session)? else {
            return Ok(None);
        };
        if fetch_links {
            let plan = LinkPlan::build(self.odm.registry(), T::MODEL, &DepthOptions::new())?;
            self.resolver().resolve(&mut record, &plan, session)?;
        }
        self.load(record).map(Some)
    }

    fn nested_plan(&self) -> OdmResult<LinkPlan> {
        Ok(LinkPlan::build(
            self.odm.registry(),
            T::MODEL,
            &DepthOptions::new().with_depth(1),
        )?)
    }

    // ---- State ----

    /// Returns `true` if `doc` differs from its saved state.
    pub fn is_changed(&self, doc: &T) -> OdmResult<bool> {
        let current = self.stored_form(doc)?;
        Ok(self.tracker().is_changed(doc.meta(), &current)?)
    }

    /// The changes of `doc` since its saved state.
    pub fn get_changes(&self, doc: &T) -> OdmResult<StateDiff> {
        let current = self.stored_form(doc)?;
        Ok(self.tracker().changes(doc.meta(), &current)?)
    }

    /// The changes made by the last save of `doc`.
    pub fn previous_changes(&self, doc: &T) -> OdmResult<StateDiff> {
        Ok(self.tracker().previous_changes(doc.meta())?)
    }

    /// Returns `true` if the last save of `doc` changed anything.
    pub fn has_changed(&self, doc: &T) -> OdmResult<bool> {
        Ok(self.tracker().has_changed(doc.meta())?)
    }

    /// Restore `doc` to its saved state.
    pub fn rollback(&self, doc: &mut T) -> OdmResult<()> {
        let saved = self.tracker().rollback(doc.meta())?;
        let mut restored: T = self.encoder().construct(&self.schema, &saved)?;
        let meta = doc.meta_mut();
        restored.meta_mut().saved_state = meta.saved_state.take();
        restored.meta_mut().previous_state = meta.previous_state.take();
        *doc = restored;
        Ok(())
    }

    /// Reload `doc` from the store and merge it with local edits.
    ///
    /// With [`MergeStrategy::Remote`] the stored document replaces `doc`.
    /// With [`MergeStrategy::Local`] the changes of `doc` since its saved
    /// state are replayed onto the stored document and stay pending. Linked
    /// documents already fetched into `doc` are kept where the merged
    /// document still references them.
    ///
    /// # Errors
    ///
    /// - [`OdmError::DocumentNotFound`] if the stored document is gone.
    /// - [`OdmError::ApplyChanges`] if a local edit reaches through a value
    ///   that is no longer an object in the stored document.
    /// - [`OdmError::StateManagementDisabled`] / [`OdmError::StateNotSaved`]
    ///   for [`MergeStrategy::Local`] without a saved state.
    pub fn sync(&self, doc: &mut T, strategy: MergeStrategy, session: Option<&Session>) -> OdmResult<()> {
        let id = self.require_id(doc)?;
        let local_changes = match strategy {
            MergeStrategy::Remote => None,
            MergeStrategy::Local => Some(self.get_changes(doc)?),
        };
        let stored = self
            .odm
            .store()
            .find_one(self.name(), &by_id(id), session)?
            .ok_or_else(|| self.not_found(id))?;
        let remote: T = self.encoder().construct(&self.schema, &stored)?;
        let remote_state = self.stored_form(&remote)?;

        let mut merged = remote_state.clone();
        if let Some(changes) = &local_changes {
            apply_changes(&mut merged, changes)?;
        }
        let encoder = self.encoder();
        encoder.validate(&self.schema, &merged).map_err(OdmError::Validation)?;
        let mut typed = encoder.decode_tree(&self.schema, &merged)?;

        // A link holding unsaved documents never matches the stored one.
        let local_typed = to_record(doc)?;
        let local_stored = self.stored_form(doc).ok();
        for field in self.schema.relation_fields() {
            let unchanged = field.kind.is_back_link()
                || local_stored.as_ref().and_then(|l| l.get(&field.name)) == merged.get(&field.name);
            if !unchanged {
                continue;
            }
            match local_typed.get(&field.name) {
                Some(value) => typed.insert(field.name.clone(), value.clone()),
                None => typed.remove(&field.name),
            };
        }

        let mut fresh: T = encoder.rebuild(&self.schema, typed)?;
        let meta = doc.meta_mut();
        fresh.meta_mut().saved_state = meta.saved_state.take();
        fresh.meta_mut().previous_state = meta.previous_state.take();
        self.tracker().save_state(fresh.meta_mut(), &remote_state);
        *doc = fresh;
        debug!(
            model = T::MODEL,
            id = %id,
            strategy = ?strategy,
            replayed = local_changes.as_ref().map_or(0, StateDiff::len),
            "document synced"
        );
        Ok(())
    }

    // ---- Collection-wide ----

    /// Insert every document of `docs`, assigning identifiers first.
    ///
    /// Failed inserts are reported in the result; the others stay written.
    pub fn insert_many(&self, docs: &mut [T], options: WriteOptions<'_>) -> OdmResult<InsertManyResult> {
        let propagator = self.propagator();
        let request = WriteRequest::new(WriteOp::Insert).with_rule(options.link_rule);
        let mut records = Vec::with_capacity(docs.len());
        let mut stored = Vec::with_capacity(docs.len());
        for doc in docs.iter() {
            let mut record = to_record(doc)?;
            let mut visited = Visited::new();
            if let Some(prepared) =
                propagator.prepare(T::MODEL, &mut record, request, &mut visited, options.session)?
            {
                stored.push(prepared.commit(&mut record));
            }
            records.push(record);
        }

        let queued = options.bulk.is_some();
        let result = match options.bulk {
            Some(bulk) => {
                for document in stored {
                    bulk.enqueue(T::MODEL, self.name(), WriteModel::InsertOne { document })?;
                }
                InsertManyResult::default()
            }
            None => self.odm.store().insert_many(self.name(), stored, options.session)?,
        };

        for (index, (doc, record)) in docs.iter_mut().zip(records).enumerate() {
            self.absorb(doc, record)?;
            if !queued && !result.failures.iter().any(|f| f.index == index) {
                self.track(doc)?;
            }
        }
        info!(model = T::MODEL, inserted = result.inserted_ids.len(), failed = result.failures.len(), "insert_many");
        Ok(result)
    }

    /// Replace every document of `docs`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::ReplaceError`] before writing anything if some
    /// of them are not stored.
    pub fn replace_many(&self, docs: &mut [T], mut options: WriteOptions<'_>) -> OdmResult<()> {
        let ids = docs
            .iter()
            .map(Identifiable::id)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| OdmError::MissingIdentifier {
                model: T::MODEL.to_string(),
            })?;
        let values: Vec<Value> = ids.iter().map(DocumentId::to_value).collect();
        let filter = record_of(json!({ ID_FIELD: { "$in": values } }));
        let found = self.odm.store().count(self.name(), &filter, options.session)? as usize;
        if found < ids.len() {
            return Err(OdmError::ReplaceError {
                requested: ids.len(),
                missing: ids.len() - found,
            });
        }
        for doc in docs.iter_mut() {
            self.replace(doc, options.reborrow())?;
        }
        Ok(())
    }

    /// Delete every document of the collection.
    pub fn delete_all(&self, session: Option<&Session>) -> OdmResult<DeleteResult> {
        let result = self.odm.store().delete_many(self.name(), &Record::new(), session)?;
        info!(model = T::MODEL, deleted = result.deleted, "collection cleared");
        Ok(result)
    }

    // ---- Loading ----

    /// Turn a stored record, with whatever was joined into it, into a
    /// typed document and capture its state.
    pub(crate) fn load(&self, record: Record) -> OdmResult<T> {
        let mut doc: T = self.encoder().construct(&self.schema, &record)?;
        self.track(&mut doc)?;
        Ok(doc)
    }

    /// The form `doc` has in the store.
    fn stored_form(&self, doc: &T) -> OdmResult<Record> {
        Ok(self.encoder().encode(&self.schema, &to_record(doc)?)?)
    }

    fn track(&self, doc: &mut T) -> OdmResult<()> {
        let tracker = self.tracker();
        if tracker.is_enabled() {
            let stored = self.stored_form(doc)?;
            tracker.save_state(doc.meta_mut(), &stored);
        }
        Ok(())
    }

    /// Replace `doc` with the typed form in `record`, keeping its snapshots.
    fn absorb(&self, doc: &mut T, record: Record) -> OdmResult<()> {
        let mut rebuilt: T = self.encoder().rebuild(&self.schema, record)?;
        let meta = doc.meta_mut();
        rebuilt.meta_mut().saved_state = meta.saved_state.take();
        rebuilt.meta_mut().previous_state = meta.previous_state.take();
        *doc = rebuilt;
        Ok(())
    }

    /// Decode the documents a resolve just joined into `after`. Positions
    /// equal to `before` were already typed and are left alone.
    fn decode_fetched(&self, before: &Record, after: &mut Record) -> OdmResult<()> {
        let registry = self.odm.registry();
        let encoder = self.encoder();
        for field in self.schema.relation_fields() {
            let Some(target) = field.kind.target() else {
                continue;
            };
            let target = registry.model(target)?;
            let old = before.get(&field.name);
            let Some(new) = after.get_mut(&field.name) else {
                continue;
            };
            if old == Some(&*new) {
                continue;
            }
            match (&field.kind, new) {
                (FieldKind::LinkList { .. }, Value::Array(items)) => {
                    let old_items = old.and_then(Value::as_array);
                    for (index, item) in items.iter_mut().enumerate() {
                        if old_items.and_then(|o| o.get(index)) == Some(&*item) {
                            continue;
                        }
                        decode_value(&encoder, target, item)?;
                    }
                }
                (_, Value::Array(items)) => {
                    for item in items.iter_mut() {
                        decode_value(&encoder, target, item)?;
                    }
                }
                (_, single) => decode_value(&encoder, target, single)?,
            }
        }
        Ok(())
    }

    // ---- Helpers ----

    fn encoder(&self) -> Encoder<'_> {
        Encoder::new(self.odm.registry())
    }

    fn tracker(&self) -> Tracker<'_> {
        Tracker::new(&self.schema)
    }

    fn propagator(&self) -> Propagator<'_> {
        Propagator::new(self.odm.store(), self.odm.registry())
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver::new(self.odm.store(), self.odm.registry())
    }

    fn require_id(&self, doc: &T) -> OdmResult<DocumentId> {
        doc.id().ok_or_else(|| OdmError::MissingIdentifier {
            model: T::MODEL.to_string(),
        })
    }

    fn not_found(&self, id: DocumentId) -> OdmError {
        OdmError::DocumentNotFound {
            model: T::MODEL.to_string(),
            id,
        }
    }

    /// Tell a revision conflict from a missing document after a write
    /// matched nothing.
    fn missing_or_conflict(&self, id: DocumentId, session: Option<&Session>) -> OdmResult<OdmError> {
        let exists = self.odm.store().count(self.name(), &by_id(id), session)? > 0;
        Ok(if exists {
            OdmError::RevisionConflict {
                model: T::MODEL.to_string(),
                id,
            }
        } else {
            self.not_found(id)
        })
    }
}

fn decode_value(encoder: &Encoder<'_>, model: &ModelSchema, value: &mut Value) -> OdmResult<()> {
    if DbRef::is_ref(value) || is_unfetched(value) {
        return Ok(());
    }
    if let Value::Object(embedded) = value {
        *embedded = encoder.decode_tree(model, embedded)?;
    }
    Ok(())
}

pub(crate) fn by_id(id: DocumentId) -> Record {
    let mut filter = Record::new();
    filter.insert(ID_FIELD.into(), id.to_value());
    filter
}

pub(crate) fn record_of(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        _ => Record::new(),
    }
}
