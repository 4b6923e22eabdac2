//! Query capabilities of typed collections.

use serde_json::Value;
use weave_query::Filter;
use weave_schema::Document;
use weave_types::{DocumentId, Record};

use crate::collection::Collection;
use crate::error::OdmResult;
use crate::find::FindMany;

/// Reading documents of `T`.
pub trait Findable<T: Document> {
    /// Documents matching `filter`.
    fn find(&self, filter: impl Into<Filter>) -> FindMany<'_, T>;

    /// Like [`find`](Self::find), limited to one result; run it with
    /// [`FindMany::first`].
    fn find_one(&self, filter: impl Into<Filter>) -> FindMany<'_, T> {
        self.find(filter).limit(1)
    }

    /// Every document of the collection.
    fn all(&self) -> FindMany<'_, T> {
        self.find(Filter::new())
    }

    /// Document `id`, with its links resolved when `fetch_links` is set.
    fn get(&self, id: DocumentId, fetch_links: bool) -> OdmResult<Option<T>>;

    /// Number of documents in the collection.
    fn count(&self) -> OdmResult<u64> {
        self.all().count()
    }
}

/// Running raw aggregation pipelines.
pub trait Aggregatable {
    fn aggregate(&self, pipeline: &[Value]) -> OdmResult<Vec<Record>>;
}

impl<T: Document> Findable<T> for Collection<T> {
    fn find(&self, filter: impl Into<Filter>) -> FindMany<'_, T> {
        FindMany::new(self, filter.into())
    }

    fn get(&self, id: DocumentId, fetch_links: bool) -> OdmResult<Option<T>> {
        self.get_in(id, fetch_links, None)
    }
}

impl<T: Document> Aggregatable for Collection<T> {
    fn aggregate(&self, pipeline: &[Value]) -> OdmResult<Vec<Record>> {
        Ok(self.odm().store().aggregate(self.name(), pipeline, None)?)
    }
}
