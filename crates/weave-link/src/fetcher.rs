use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::debug;
use weave_store::{DocumentStore, FindOptions, Session};
use weave_types::{record_id, DbRef, DocumentId, Record, ID_FIELD, REF_ID};

use crate::error::LinkResult;

/// Stored references held by a link field value: one for a single link,
/// one per reference element for a list. Embedded documents and nulls are
/// skipped.
pub fn refs_in(value: &Value, default_collection: &str) -> Vec<DbRef> {
    let single = |v: &Value| {
        DbRef::is_ref(v)
            .then(|| DbRef::parse(v, default_collection).ok())
            .flatten()
    };
    match value {
        Value::Array(items) => items.iter().filter_map(single).collect(),
        other => single(other).into_iter().collect(),
    }
}

/// Loads linked records from the store.
pub struct LinkFetcher<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> LinkFetcher<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Load the record `reference` points at.
    ///
    /// Returns `Ok(None)` for a dangling reference.
    pub fn fetch(&self, reference: &DbRef, session: Option<&Session>) -> LinkResult<Option<Record>> {
        let filter = by_id(reference.id);
        let found = self.store.find_one(&reference.collection, &filter, session)?;
        if found.is_none() {
            debug!(collection = %reference.collection, id = %reference.id, "dangling reference");
        }
        Ok(found)
    }

    /// Load every record of `references`, positionally.
    ///
    /// Issues exactly one `find` per distinct collection; dangling
    /// references yield `None` in their slot.
    pub fn fetch_list(
        &self,
        references: &[DbRef],
        session: Option<&Session>,
    ) -> LinkResult<Vec<Option<Record>>> {
        let mut groups: Vec<(&str, Vec<DocumentId>)> = Vec::new();
        for reference in references {
            match groups.iter_mut().find(|(c, _)| *c == reference.collection) {
                Some((_, ids)) => {
                    if !ids.contains(&reference.id) {
                        ids.push(reference.id);
                    }
                }
                None => groups.push((&reference.collection, vec![reference.id])),
            }
        }

        let mut loaded: HashMap<(&str, DocumentId), Record> = HashMap::new();
        for (collection, ids) in &groups {
            let values: Vec<Value> = ids.iter().map(DocumentId::to_value).collect();
            let filter = record_of(json!({ ID_FIELD: { "$in": values } }));
            let records = self.store.find(collection, &filter, &FindOptions::new(), session)?;
            debug!(collection = %collection, requested = ids.len(), found = records.len(), "fetched link batch");
            for record in records {
                if let Some(id) = record_id(&record)? {
                    loaded.insert((*collection, id), record);
                }
            }
        }

        Ok(references
            .iter()
            .map(|r| loaded.get(&(r.collection.as_str(), r.id)).cloned())
            .collect())
    }

    /// Records of `owner_collection` whose `original_field` links to `id`.
    pub fn back_links(
        &self,
        owner_collection: &str,
        original_field: &str,
        id: DocumentId,
        session: Option<&Session>,
    ) -> LinkResult<Vec<Record>> {
        let mut filter = Record::new();
        filter.insert(format!("{original_field}.{REF_ID}"), id.to_value());
        let found = self.store.find(owner_collection, &filter, &FindOptions::new(), session)?;
        debug!(collection = %owner_collection, field = %original_field, id = %id, found = found.len(), "back-link lookup");
        Ok(found)
    }

    /// [`back_links`](Self::back_links) for many targets in one query,
    /// grouped by the target each record links to.
    pub fn back_links_many(
        &self,
        owner_collection: &str,
        original_field: &str,
        ids: &[DocumentId],
        session: Option<&Session>,
    ) -> LinkResult<HashMap<DocumentId, Vec<Record>>> {
        let mut grouped: HashMap<DocumentId, Vec<Record>> = HashMap::new();
        if ids.is_empty() {
            return Ok(grouped);
        }
        let values: Vec<Value> = ids.iter().map(DocumentId::to_value).collect();
        let mut filter = Record::new();
        filter.insert(format!("{original_field}.{REF_ID}"), json!({ "$in": values }));
        let found = self.store.find(owner_collection, &filter, &FindOptions::new(), session)?;
        for record in found {
            let targets = record
                .get(original_field)
                .map(|v| refs_in(v, owner_collection))
                .unwrap_or_default();
            for target in targets.iter().filter(|t| ids.contains(&t.id)) {
                grouped.entry(target.id).or_default().push(record.clone());
            }
        }
        Ok(grouped)
    }
}

fn by_id(id: DocumentId) -> Record {
    let mut filter = Record::new();
    filter.insert(ID_FIELD.into(), id.to_value());
    filter
}

fn record_of(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}
