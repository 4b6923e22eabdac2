//! Secondary-fetch strategy: resolving records already held in memory.
//!
//! # Invariants
//!
//! - Within one call each referenced record is read from the store at most
//!   once; later occurrences are served from the [`Arena`].
//! - Link-list references are loaded with one `find` per target collection
//!   and keep their order.
//! - A dangling reference stays in its stored form.
//! - An absent or null link list resolves to `[]`.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, trace};
use weave_link::{refs_in, LinkFetcher};
use weave_schema::{FieldKind, Registry};
use weave_store::{DocumentStore, Session};
use weave_types::{record_id, DbRef, DocKey, DocumentId, Record};

use crate::error::{ResolveError, ResolveResult};
use crate::plan::{DepthOptions, LinkNode, LinkPlan};

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Records loaded during one resolve call, keyed by collection and id.
///
/// Lookups that found nothing are remembered too, so a dangling reference
/// costs one round trip no matter how often it appears. Back-link owners
/// are kept per (owner collection, field, target id).
#[derive(Debug, Default)]
pub struct Arena {
    loaded: HashMap<DocKey, Option<Record>>,
    owners: HashMap<(String, String, DocumentId), Vec<Record>>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if the key was never looked up, `Some(None)` if it dangles.
    pub fn get(&self, key: &DocKey) -> Option<Option<&Record>> {
        self.loaded.get(key).map(Option::as_ref)
    }

    pub fn contains(&self, key: &DocKey) -> bool {
        self.loaded.contains_key(key)
    }

    pub fn insert(&mut self, key: DocKey, record: Option<Record>) {
        self.loaded.insert(key, record);
    }

    /// Number of keys looked up so far.
    pub fn len(&self) -> usize {
        self.loaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    fn owners(&self, collection: &str, field: &str, id: DocumentId) -> Option<&Vec<Record>> {
        self.owners.get(&(collection.to_string(), field.to_string(), id))
    }

    fn insert_owners(&mut self, collection: &str, field: &str, id: DocumentId, owners: Vec<Record>) {
        for owner in &owners {
            if let Ok(Some(owner_id)) = record_id(owner) {
                self.loaded
                    .insert(DocKey::new(collection.to_string(), owner_id), Some(owner.clone()));
            }
        }
        self.owners.insert((collection.to_string(), field.to_string(), id), owners);
    }
}

fn key_of(reference: &DbRef) -> DocKey {
    DocKey::new(reference.collection.clone(), reference.id)
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves links of in-memory records by querying the store.
pub struct Resolver<'a> {
    store: &'a dyn DocumentStore,
    registry: &'a Registry,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn DocumentStore, registry: &'a Registry) -> Self {
        Self { store, registry }
    }

    /// Resolve `record` in place according to `plan`.
    pub fn resolve(
        &self,
        record: &mut Record,
        plan: &LinkPlan,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        self.resolve_many(std::slice::from_mut(record), plan, session)
    }

    /// Resolve several records sharing one arena. Top-level forward links
    /// and back-links of all records are prefetched together.
    pub fn resolve_many(
        &self,
        records: &mut [Record],
        plan: &LinkPlan,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        if plan.is_empty() {
            return Ok(());
        }
        let mut arena = Arena::new();
        self.prefetch(records, &plan.nodes, &mut arena, session)?;
        for record in records.iter_mut() {
            self.resolve_nodes(record, &plan.nodes, &mut arena, session)?;
        }
        debug!(model = %plan.model, records = records.len(), loaded = arena.len(), "resolved links");
        Ok(())
    }

    /// Resolve one relation field of `record`, one level deep.
    pub fn fetch_link(
        &self,
        model: &str,
        record: &mut Record,
        field: &str,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let plan = LinkPlan::for_field(self.registry, model, field, 1)?;
        self.resolve(record, &plan, session)
    }

    /// Resolve every relation field of `record`, one level deep.
    pub fn fetch_all_links(
        &self,
        model: &str,
        record: &mut Record,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let plan = LinkPlan::build(self.registry, model, &DepthOptions::new().with_depth(1))?;
        self.resolve(record, &plan, session)
    }

    /// Load every not-yet-seen forward reference under `nodes` in one
    /// batch per collection, and the owners of every back-link node in one
    /// query per node.
    fn prefetch(
        &self,
        records: &[Record],
        nodes: &[LinkNode],
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let mut wanted: Vec<DbRef> = Vec::new();
        for node in nodes {
            match &node.kind {
                FieldKind::Link { .. } | FieldKind::LinkList { .. } => {
                    for record in records {
                        if let Some(value) = record.get(&node.field) {
                            wanted.extend(refs_in(value, &node.target_collection));
                        }
                    }
                }
                FieldKind::BackLink { original_field, .. }
                | FieldKind::BackLinkList { original_field, .. } => {
                    self.prefetch_owners(records, node, original_field, arena, session)?
                }
                FieldKind::Plain => {}
            }
        }
        self.load_batch(wanted, arena, session)
    }

    fn prefetch_owners(
        &self,
        records: &[Record],
        node: &LinkNode,
        original_field: &str,
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let mut ids = Vec::new();
        for record in records {
            if let Some(id) = record_id(record)? {
                if arena.owners(&node.target_collection, original_field, id).is_none() && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        if ids.is_empty() {
            return Ok(());
        }
        let mut grouped = LinkFetcher::new(self.store).back_links_many(
            &node.target_collection,
            original_field,
            &ids,
            session,
        )?;
        for id in ids {
            let owners = grouped.remove(&id).unwrap_or_default();
            arena.insert_owners(&node.target_collection, original_field, id, owners);
        }
        Ok(())
    }

    fn load_batch(
        &self,
        references: Vec<DbRef>,
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let missing: Vec<DbRef> = references
            .into_iter()
            .filter(|r| !arena.contains(&key_of(r)))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let loaded = LinkFetcher::new(self.store).fetch_list(&missing, session)?;
        for (reference, record) in missing.iter().zip(loaded) {
            arena.insert(key_of(reference), record);
        }
        Ok(())
    }

    fn load(
        &self,
        reference: &DbRef,
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<Option<Record>> {
        let key = key_of(reference);
        if let Some(found) = arena.get(&key) {
            trace!(key = %key, "arena hit");
            return Ok(found.cloned());
        }
        let found = LinkFetcher::new(self.store).fetch(reference, session)?;
        arena.insert(key, found.clone());
        Ok(found)
    }

    fn resolve_nodes(
        &self,
        record: &mut Record,
        nodes: &[LinkNode],
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        for node in nodes {
            match &node.kind {
                FieldKind::Link { .. } => self.resolve_link(record, node, arena, session)?,
                FieldKind::LinkList { .. } => self.resolve_list(record, node, arena, session)?,
                FieldKind::BackLink { original_field, .. }
                | FieldKind::BackLinkList { original_field, .. } => {
                    self.resolve_back_link(record, node, original_field, arena, session)?
                }
                FieldKind::Plain => {}
            }
        }
        Ok(())
    }

    fn resolve_link(
        &self,
        record: &mut Record,
        node: &LinkNode,
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let Some(value) = record.get_mut(&node.field) else {
            return Ok(());
        };
        if DbRef::is_ref(value) {
            let reference = DbRef::parse(value, &node.target_collection)?;
            if let Some(mut target) = self.load(&reference, arena, session)? {
                self.prefetch(std::slice::from_ref(&target), &node.children, arena, session)?;
                self.resolve_nodes(&mut target, &node.children, arena, session)?;
                *value = Value::Object(target);
            }
        } else if let Value::Object(embedded) = value {
            self.resolve_nodes(embedded, &node.children, arena, session)?;
        }
        Ok(())
    }

    fn resolve_list(
        &self,
        record: &mut Record,
        node: &LinkNode,
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let items = match record.remove(&node.field) {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                record.insert(node.field.clone(), other);
                return Ok(());
            }
        };
        let references = refs_in(&Value::Array(items.clone()), &node.target_collection);
        self.load_batch(references, arena, session)?;

        let mut resolved = Vec::with_capacity(items.len());
        let mut loaded = Vec::new();
        for item in items {
            if DbRef::is_ref(&item) {
                let reference = DbRef::parse(&item, &node.target_collection)?;
                match self.load(&reference, arena, session)? {
                    Some(target) => {
                        loaded.push(resolved.len());
                        resolved.push(Value::Object(target));
                    }
                    None => resolved.push(item),
                }
            } else {
                if item.is_object() {
                    loaded.push(resolved.len());
                }
                resolved.push(item);
            }
        }

        if !node.children.is_empty() {
            let mut targets: Vec<Record> = loaded
                .iter()
                .filter_map(|&i| resolved[i].as_object().cloned())
                .collect();
            self.prefetch(&targets, &node.children, arena, session)?;
            for target in targets.iter_mut() {
                self.resolve_nodes(target, &node.children, arena, session)?;
            }
            for (&index, target) in loaded.iter().zip(targets) {
                resolved[index] = Value::Object(target);
            }
        }
        record.insert(node.field.clone(), Value::Array(resolved));
        Ok(())
    }

    fn resolve_back_link(
        &self,
        record: &mut Record,
        node: &LinkNode,
        original_field: &str,
        arena: &mut Arena,
        session: Option<&Session>,
    ) -> ResolveResult<()> {
        let Some(id) = record_id(record)? else {
            // Nothing can link to a document that was never stored.
            let empty = if node.is_list() { Value::Array(Vec::new()) } else { Value::Null };
            record.insert(node.field.clone(), empty);
            return Ok(());
        };
        if arena.owners(&node.target_collection, original_field, id).is_none() {
            let found = LinkFetcher::new(self.store).back_links(&node.target_collection, original_field, id, session)?;
            arena.insert_owners(&node.target_collection, original_field, id, found);
        }
        let mut owners = arena
            .owners(&node.target_collection, original_field, id)
            .cloned()
            .unwrap_or_default();
        self.prefetch(&owners, &node.children, arena, session)?;
        for owner in owners.iter_mut() {
            self.resolve_nodes(owner, &node.children, arena, session)?;
        }

        let value = if node.is_list() {
            Value::Array(owners.into_iter().map(Value::Object).collect())
        } else {
            match owners.len() {
                0 => Value::Null,
                1 => owners.pop().map(Value::Object).unwrap_or(Value::Null),
                found => {
                    return Err(ResolveError::BackLinkCardinality {
                        field: node.field.clone(),
                        id: Some(id),
                        found,
                    })
                }
            }
        };
        record.insert(node.field.clone(), value);
        Ok(())
    }
}
