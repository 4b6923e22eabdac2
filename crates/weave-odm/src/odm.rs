use std::fmt;
use std::sync::Arc;

use tracing::info;
use weave_schema::{Document, Registry};
use weave_store::{DocumentStore, Session, Transaction};

use crate::bulk::BulkWriter;
use crate::collection::Collection;
use crate::error::OdmResult;

/// Entry point: a document store together with the model registry.
///
/// Cheap to clone; clones share the store and the registry.
#[derive(Clone)]
pub struct Odm {
    store: Arc<dyn DocumentStore>,
    registry: Arc<Registry>,
}

impl Odm {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Registry) -> Self {
        Self {
            store,
            registry: Arc::new(registry),
        }
    }

    /// Create the mapper and the indexes declared by the registry.
    pub fn init(store: Arc<dyn DocumentStore>, registry: Registry) -> OdmResult<Self> {
        registry.init(store.as_ref())?;
        info!(models = registry.models().count(), "odm initialised");
        Ok(Self::new(store, registry))
    }

    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Typed handle to the collection of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::UnknownModel`] if `T` was not registered.
    pub fn collection<T: Document>(&self) -> OdmResult<Collection<T>> {
        let schema = self.registry.model_arc(T::MODEL)?;
        Ok(Collection::new(self.clone(), schema))
    }

    /// A writer that queues operations for one model.
    pub fn bulk_writer(&self) -> BulkWriter {
        BulkWriter::new(Arc::clone(&self.store))
    }

    pub fn start_session(&self) -> OdmResult<Session> {
        Ok(self.store.start_session()?)
    }

    /// Run `f` inside a transaction on a new session. The transaction
    /// commits if `f` succeeds and aborts otherwise.
    pub fn transaction<R>(&self, f: impl FnOnce(&Session) -> OdmResult<R>) -> OdmResult<R> {
        let session = self.start_session()?;
        let transaction = Transaction::begin(self.store(), &session)?;
        match f(transaction.session()) {
            Ok(value) => {
                transaction.commit()?;
                Ok(value)
            }
            Err(error) => {
                transaction.abort()?;
                Err(error)
            }
        }
    }
}

impl fmt::Debug for Odm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Odm")
            .field("models", &self.registry.models().map(|m| m.name.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

