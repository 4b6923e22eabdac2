use std::collections::HashSet;

use weave_types::DocumentId;

/// What happens to embedded relation targets when a document is written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteRule {
    /// Write the document alone.
    #[default]
    DoNothing,
    /// Save embedded targets first, recursively.
    Write,
}

/// What happens to linked documents when a document is deleted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteRule {
    /// Delete the document alone.
    #[default]
    DoNothing,
    /// Delete forward-link targets too, recursively.
    DeleteLinks,
}

/// The store write issued for a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Create; fails if the identifier is taken.
    Insert,
    /// Overwrite an existing document.
    Replace,
    /// Overwrite, or create if missing.
    Save,
}

impl WriteOp {
    pub fn name(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Save => "save",
        }
    }
}

/// One propagated write: the root operation and how to treat its graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteRequest {
    pub op: WriteOp,
    pub rule: WriteRule,
    pub ignore_revision: bool,
}

impl WriteRequest {
    pub fn new(op: WriteOp) -> Self {
        Self {
            op,
            rule: WriteRule::DoNothing,
            ignore_revision: false,
        }
    }

    pub fn with_rule(mut self, rule: WriteRule) -> Self {
        self.rule = rule;
        self
    }

    pub fn ignoring_revision(mut self, ignore: bool) -> Self {
        self.ignore_revision = ignore;
        self
    }

    /// The request issued for embedded targets: a save under the same
    /// rule and revision policy.
    pub fn for_child(self) -> Self {
        Self {
            op: WriteOp::Save,
            ..self
        }
    }
}

/// Documents already handled by the current top-level call, by model and
/// identifier.
pub type Visited = HashSet<(String, DocumentId)>;
