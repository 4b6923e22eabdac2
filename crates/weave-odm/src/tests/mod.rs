//! End-to-end scenarios against the in-memory store.

use std::sync::Arc;

use weave_schema::Registry;
use weave_store::InMemoryDocumentStore;

use crate::Odm;

mod models;
mod queries;
mod state;

use models::{Account, Author, Book, Door, House, Node, Window};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn registry() -> Registry {
    Registry::builder()
        .register::<Window>()
        .register::<Door>()
        .register::<House>()
        .register::<Node>()
        .register::<Account>()
        .register::<Author>()
        .register::<Book>()
        .build()
        .unwrap()
}

/// A fresh store and a mapper over it.
fn setup() -> (Arc<InMemoryDocumentStore>, Odm) {
    init_tracing();
    let store = Arc::new(InMemoryDocumentStore::new());
    let odm = Odm::init(store.clone(), registry()).unwrap();
    (store, odm)
}
