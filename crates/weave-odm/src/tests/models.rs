//! Models shared by the scenario tests.

use serde::{Deserialize, Serialize};
use weave_schema::{Document, DocumentMeta, Identifiable, ModelSchema, SchemaBuilder, Settings, TimestampMillis};
use weave_types::DocumentId;

use crate::{BackLink, BackLinks, Link};

macro_rules! identifiable {
    ($($model:ty),* $(,)?) => {
        $(
            impl Identifiable for $model {
                fn meta(&self) -> &DocumentMeta {
                    &self.meta
                }
                fn meta_mut(&mut self) -> &mut DocumentMeta {
                    &mut self.meta
                }
            }
        )*
    };
}

identifiable!(Window, Door, House, Node, Account, Author, Book);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub x: i64,
}

impl Window {
    pub fn new(x: i64) -> Self {
        Self {
            meta: DocumentMeta::new(),
            x,
        }
    }
}

impl Document for Window {
    const MODEL: &'static str = "Window";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .field("x")
            .settings(Settings::default().with_collection("windows"))
            .build()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Door {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub height: i64,
    #[serde(default)]
    pub house: BackLink<House>,
}

impl Door {
    pub fn new(height: i64) -> Self {
        Self {
            meta: DocumentMeta::new(),
            height,
            house: BackLink::Unfetched,
        }
    }
}

impl Document for Door {
    const MODEL: &'static str = "Door";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .field("height")
            .back_link::<House>("house", "door")
            .settings(Settings::default().with_collection("doors"))
            .build()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct House {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    pub door: Link<Door>,
    #[serde(default)]
    pub windows: Vec<Link<Window>>,
    #[serde(default)]
    pub built_at: Option<String>,
}

impl House {
    pub fn new(name: &str, door: impl Into<Link<Door>>) -> Self {
        Self {
            meta: DocumentMeta::new(),
            name: name.to_string(),
            door: door.into(),
            windows: Vec::new(),
            built_at: None,
        }
    }

    pub fn door(&self) -> &Door {
        self.door.as_fetched().expect("door not fetched")
    }
}

impl Document for House {
    const MODEL: &'static str = "House";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .field("name")
            .link::<Door>("door")
            .link_list::<Window>("windows")
            .codec("built_at", TimestampMillis)
            .settings(Settings::default().with_collection("houses").with_revision())
            .build()
    }
}

/// Self-referencing chain with a back-link to the previous node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    #[serde(default)]
    pub next: Option<Link<Node>>,
    #[serde(default)]
    pub prev: BackLink<Node>,
}

impl Node {
    pub fn new(name: &str) -> Self {
        Self {
            meta: DocumentMeta::new(),
            name: name.to_string(),
            next: None,
            prev: BackLink::Unfetched,
        }
    }

    pub fn next_node(&self) -> Option<&Node> {
        self.next.as_ref().and_then(Link::as_fetched)
    }
}

impl Document for Node {
    const MODEL: &'static str = "Node";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .field("name")
            .link::<Node>("next")
            .back_link::<Node>("prev", "next")
            .settings(Settings::default().with_collection("nodes").with_max_nesting_depth(2))
            .build()
    }
}

/// State-managed, revisioned model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub owner: String,
    pub balance: i64,
    #[serde(default)]
    pub profile: serde_json::Value,
}

impl Account {
    pub fn new(owner: &str, balance: i64) -> Self {
        Self {
            meta: DocumentMeta::new(),
            owner: owner.to_string(),
            balance,
            profile: serde_json::json!({"tier": "basic", "flags": {"beta": false}}),
        }
    }
}

impl Document for Account {
    const MODEL: &'static str = "Account";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .required("owner")
            .field("balance")
            .field("profile")
            .settings(
                Settings::default()
                    .with_collection("accounts")
                    .with_revision()
                    .with_state_management()
                    .with_save_previous(),
            )
            .build()
    }
}

/// Back-link lists and links pointing both ways.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    #[serde(default)]
    pub favourite: Option<Link<Book>>,
    #[serde(default)]
    pub books: BackLinks<Book>,
}

impl Author {
    pub fn new(name: &str) -> Self {
        Self {
            meta: DocumentMeta::new(),
            name: name.to_string(),
            favourite: None,
            books: BackLinks::Unfetched,
        }
    }
}

impl Document for Author {
    const MODEL: &'static str = "Author";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .field("name")
            .link::<Book>("favourite")
            .back_link_list::<Book>("books", "author")
            .settings(Settings::default().with_collection("authors"))
            .build()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Book {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub title: String,
    pub author: Link<Author>,
}

impl Book {
    pub fn new(title: &str, author: impl Into<Link<Author>>) -> Self {
        Self {
            meta: DocumentMeta::new(),
            title: title.to_string(),
            author: author.into(),
        }
    }
}

impl Document for Book {
    const MODEL: &'static str = "Book";
    fn schema() -> ModelSchema {
        SchemaBuilder::new(Self::MODEL)
            .field("title")
            .link::<Author>("author")
            .settings(Settings::default().with_collection("books"))
            .build()
    }
}

/// A reference to `id` that was never loaded.
pub fn link_to<T: Document>(id: DocumentId) -> Link<T> {
    crate::link_from_id(id)
}
