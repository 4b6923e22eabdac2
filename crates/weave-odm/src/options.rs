use weave_propagate::{DeleteRule, WriteRule};
use weave_store::Session;

use crate::bulk::BulkWriter;

/// Options of a document write.
#[derive(Debug, Default)]
pub struct WriteOptions<'a> {
    pub link_rule: WriteRule,
    /// Write even if the stored revision moved on.
    pub ignore_revision: bool,
    pub session: Option<&'a Session>,
    /// Queue the write instead of executing it.
    pub bulk: Option<&'a mut BulkWriter>,
}

impl<'a> WriteOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link_rule(mut self, rule: WriteRule) -> Self {
        self.link_rule = rule;
        self
    }

    pub fn ignoring_revision(mut self) -> Self {
        self.ignore_revision = true;
        self
    }

    pub fn with_session(mut self, session: &'a Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_bulk(mut self, bulk: &'a mut BulkWriter) -> Self {
        self.bulk = Some(bulk);
        self
    }

    /// Options for one write out of several sharing these.
    pub fn reborrow(&mut self) -> WriteOptions<'_> {
        WriteOptions {
            link_rule: self.link_rule,
            ignore_revision: self.ignore_revision,
            session: self.session,
            bulk: self.bulk.as_deref_mut(),
        }
    }
}

/// Options of a document delete.
#[derive(Debug, Default)]
pub struct DeleteOptions<'a> {
    pub link_rule: DeleteRule,
    pub session: Option<&'a Session>,
    pub bulk: Option<&'a mut BulkWriter>,
}

impl<'a> DeleteOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_link_rule(mut self, rule: DeleteRule) -> Self {
        self.link_rule = rule;
        self
    }

    pub fn with_session(mut self, session: &'a Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_bulk(mut self, bulk: &'a mut BulkWriter) -> Self {
        self.bulk = Some(bulk);
        self
    }
}

/// Which side wins when a document is synced with its stored version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Take the stored document, dropping local edits.
    #[default]
    Remote,
    /// Take the stored document, then replay local edits on top of it.
    Local,
}
