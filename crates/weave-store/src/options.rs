use serde::{Deserialize, Serialize};
use weave_types::Record;

/// Sort direction for sorts and index keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// The numeric form used inside query documents (`1` / `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// Options accepted by [`DocumentStore::find`](crate::DocumentStore::find).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    /// Inclusion/exclusion projection, as in a `$project` stage.
    pub projection: Option<Record>,
    /// Sort keys applied in order.
    pub sort: Vec<(String, SortDirection)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    pub fn with_projection(mut self, projection: Record) -> Self {
        self.projection = Some(projection);
        self
    }
}

/// An index declared on a collection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexModel {
    pub name: String,
    pub keys: Vec<(String, SortDirection)>,
    pub unique: bool,
}

impl IndexModel {
    /// A single-field ascending index named `<field>_1`.
    pub fn ascending(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: format!("{field}_1"),
            keys: vec![(field, SortDirection::Ascending)],
            unique: false,
        }
    }

    /// Mark the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}
