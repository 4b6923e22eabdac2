//! Sessions and scoped transactions.

use std::fmt;

use tracing::warn;

use crate::error::StoreResult;
use crate::traits::DocumentStore;

/// Identifier of a store session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A session handle obtained from [`DocumentStore::start_session`].
///
/// The handle is passed explicitly to every call that should run inside it.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }
}

/// A transaction scoped to a session.
///
/// Dropping the guard without calling [`commit`](Transaction::commit) aborts
/// the transaction, so every exit path releases it.
pub struct Transaction<'a> {
    store: &'a dyn DocumentStore,
    session: &'a Session,
    finished: bool,
}

impl<'a> Transaction<'a> {
    /// Start a transaction on `session`.
    pub fn begin(store: &'a dyn DocumentStore, session: &'a Session) -> StoreResult<Self> {
        store.start_transaction(session)?;
        Ok(Self {
            store,
            session,
            finished: false,
        })
    }

    /// The session every operation of this transaction must be given.
    pub fn session(&self) -> &'a Session {
        self.session
    }

    /// Make the transaction's writes durable.
    pub fn commit(mut self) -> StoreResult<()> {
        self.finished = true;
        self.store.commit_transaction(self.session)
    }

    /// Roll back every write made inside the transaction.
    pub fn abort(mut self) -> StoreResult<()> {
        self.finished = true;
        self.store.abort_transaction(self.session)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.store.abort_transaction(self.session) {
            warn!(session = %self.session.id(), error = %e, "failed to abort dropped transaction");
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("session", &self.session.id())
            .field("finished", &self.finished)
            .finish()
    }
}
