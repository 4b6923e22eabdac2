//! Lazy multi-document queries.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use weave_query::{Expr, Filter, Sort, Update};
use weave_resolve::{build_pipeline, collapse_back_links, DepthOptions, LinkPlan};
use weave_schema::Document;
use weave_store::{DeleteResult, FindOptions, Session, UpdateResult, WriteModel};
use weave_types::{record_id, Record, ID_FIELD};

use crate::bulk::BulkWriter;
use crate::collection::{record_of, Collection};
use crate::error::{OdmError, OdmResult};

/// A query over the collection of `T`. Nothing runs until one of the
/// executing methods is called.
///
/// With [`fetch_links`](Self::fetch_links) the query runs as an
/// aggregation that joins linked documents in, and filters may reach into
/// them (`field("door.height").gt(5)`).
pub struct FindMany<'a, T> {
    collection: &'a Collection<T>,
    filter: Filter,
    sort: Sort,
    skip: Option<usize>,
    limit: Option<usize>,
    fetch_links: bool,
    depth: DepthOptions,
    session: Option<&'a Session>,
}

impl<T> Clone for FindMany<'_, T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection,
            filter: self.filter.clone(),
            sort: self.sort.clone(),
            skip: self.skip,
            limit: self.limit,
            fetch_links: self.fetch_links,
            depth: self.depth.clone(),
            session: self.session,
        }
    }
}

impl<'a, T: Document> FindMany<'a, T> {
    pub(crate) fn new(collection: &'a Collection<T>, filter: Filter) -> Self {
        Self {
            collection,
            filter,
            sort: Sort::new(),
            skip: None,
            limit: None,
            fetch_links: false,
            depth: DepthOptions::new(),
            session: None,
        }
    }

    /// Narrow the query with another condition.
    pub fn filter(mut self, expr: Expr) -> Self {
        self.filter.push(expr);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = self.sort.then(sort);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Join linked documents into the results.
    pub fn fetch_links(mut self, fetch: bool) -> Self {
        self.fetch_links = fetch;
        self
    }

    /// How many link hops to follow. Defaults to the model's
    /// `max_nesting_depth`.
    pub fn nesting_depth(mut self, depth: u32) -> Self {
        self.depth = self.depth.with_depth(depth);
        self
    }

    /// Depth for one relation field of the queried model.
    pub fn nesting_depths_per_field(mut self, field: impl Into<String>, depth: u32) -> Self {
        self.depth = self.depth.with_field_depth(field, depth);
        self
    }

    pub fn session(mut self, session: &'a Session) -> Self {
        self.session = Some(session);
        self
    }

    fn plan(&self) -> OdmResult<LinkPlan> {
        Ok(LinkPlan::build(
            self.collection.odm().registry(),
            T::MODEL,
            &self.depth,
        )?)
    }

    fn paging_stages(&self) -> Vec<Value> {
        let mut stages = Vec::new();
        if let Some(stage) = self.sort.to_stage() {
            stages.push(stage);
        }
        if let Some(skip) = self.skip {
            stages.push(json!({ "$skip": skip }));
        }
        if let Some(limit) = self.limit {
            stages.push(json!({ "$limit": limit }));
        }
        stages
    }

    /// The aggregation pipeline this query runs, followed by `extra`.
    ///
    /// Without `fetch_links` the pipeline is a plain `$match` with paging.
    pub fn pipeline(&self, extra: &[Value]) -> OdmResult<Vec<Value>> {
        let mut tail = self.paging_stages();
        tail.extend_from_slice(extra);
        if self.fetch_links {
            let plan = self.plan()?;
            return Ok(build_pipeline(&plan, &self.filter.render(true), &tail));
        }
        let mut stages = Vec::with_capacity(tail.len() + 1);
        if !self.filter.is_empty() {
            stages.push(json!({ "$match": self.filter.render(false) }));
        }
        stages.extend(tail);
        Ok(stages)
    }

    // ---- Execution ----

    /// Run the query and load every matching document.
    pub fn to_list(&self) -> OdmResult<Vec<T>> {
        let store = self.collection.odm().store();
        let records = if self.fetch_links {
            let plan = self.plan()?;
            let pipeline = build_pipeline(&plan, &self.filter.render(true), &self.paging_stages());
            let mut records = store.aggregate(self.collection.name(), &pipeline, self.session)?;
            collapse_back_links(&mut records, &plan.nodes)?;
            records
        } else {
            let options = FindOptions {
                skip: self.skip,
                limit: self.limit,
                ..FindOptions::new()
            };
            let options = self.sort.apply(options);
            store.find(
                self.collection.name(),
                &self.filter.render(false),
                &options,
                self.session,
            )?
        };
        debug!(model = T::MODEL, found = records.len(), fetch_links = self.fetch_links, "query ran");
        records.into_iter().map(|record| self.collection.load(record)).collect()
    }

    /// Run the query for its first document.
    pub fn first(&self) -> OdmResult<Option<T>> {
        Ok(self.clone().limit(1).to_list()?.into_iter().next())
    }

    /// Number of matching documents, ignoring skip and limit.
    pub fn count(&self) -> OdmResult<u64> {
        let store = self.collection.odm().store();
        if self.fetch_links && !self.filter.is_empty() {
            let plan = self.plan()?;
            let pipeline = build_pipeline(
                &plan,
                &self.filter.render(true),
                &[json!({ "$count": "count" })],
            );
            let rows = store.aggregate(self.collection.name(), &pipeline, self.session)?;
            return Ok(rows
                .first()
                .and_then(|row| row.get("count"))
                .and_then(Value::as_u64)
                .unwrap_or(0));
        }
        Ok(store.count(self.collection.name(), &self.filter.render(false), self.session)?)
    }

    /// Apply `update` to every matching document.
    pub fn update(&self, update: Update) -> OdmResult<UpdateResult> {
        let filter = self.write_filter()?;
        let result = self.collection.odm().store().update_many(
            self.collection.name(),
            &filter,
            &update.render(),
            self.session,
        )?;
        debug!(model = T::MODEL, matched = result.matched, modified = result.modified, "update_many");
        Ok(result)
    }

    /// Queue `update` of every matching document on `bulk`.
    pub fn update_in(&self, update: Update, bulk: &mut BulkWriter) -> OdmResult<()> {
        let filter = self.write_filter()?;
        bulk.enqueue(
            T::MODEL,
            self.collection.name(),
            WriteModel::UpdateMany {
                filter,
                update: update.render(),
            },
        )
    }

    /// Delete every matching document.
    pub fn delete(&self) -> OdmResult<DeleteResult> {
        let filter = self.write_filter()?;
        let result = self
            .collection
            .odm()
            .store()
            .delete_many(self.collection.name(), &filter, self.session)?;
        debug!(model = T::MODEL, deleted = result.deleted, "delete_many");
        Ok(result)
    }

    /// Queue deletion of every matching document on `bulk`.
    pub fn delete_in(&self, bulk: &mut BulkWriter) -> OdmResult<()> {
        let filter = self.write_filter()?;
        bulk.enqueue(T::MODEL, self.collection.name(), WriteModel::DeleteMany { filter })
    }

    /// Run `stages` after this query's own stages and return raw records.
    pub fn aggregate(&self, stages: &[Value]) -> OdmResult<Vec<Record>> {
        let pipeline = self.pipeline(stages)?;
        Ok(self
            .collection
            .odm()
            .store()
            .aggregate(self.collection.name(), &pipeline, self.session)?)
    }

    /// [`aggregate`](Self::aggregate) into a projection type.
    pub fn aggregate_as<P: DeserializeOwned>(&self, stages: &[Value]) -> OdmResult<Vec<P>> {
        self.aggregate(stages)?
            .into_iter()
            .map(|record| {
                serde_json::from_value(Value::Object(record)).map_err(|e| {
                    OdmError::Schema(weave_schema::SchemaError::Serialization(e.to_string()))
                })
            })
            .collect()
    }

    /// Filter for multi-document writes. A filter that reaches into linked
    /// documents is first resolved to the matching identifiers.
    fn write_filter(&self) -> OdmResult<Record> {
        if !self.fetch_links || self.filter.is_empty() {
            return Ok(self.filter.render(false));
        }
        let rows = self.aggregate(&[json!({ "$project": { ID_FIELD: 1 } })])?;
        let ids = rows
            .iter()
            .filter_map(|row| record_id(row).transpose())
            .map(|id| id.map(|id| id.to_value()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(record_of(json!({ ID_FIELD: { "$in": ids } })))
    }
}
