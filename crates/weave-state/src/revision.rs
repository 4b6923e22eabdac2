//! Optimistic concurrency.
//!
//! A revisioned write carries the revision the writer last saw in its
//! filter and the freshly generated revision in its body, so the check and
//! the commit of the new token happen in one store call.

use weave_types::{DocumentId, Record, RevisionId, ID_FIELD, REVISION_FIELD};

/// A fresh revision token for the next write.
pub fn next_revision() -> RevisionId {
    RevisionId::new()
}

/// Filter selecting document `id`, and only at revision `recorded` unless
/// `ignore` is set or no revision was recorded.
pub fn revision_filter(id: DocumentId, recorded: Option<RevisionId>, ignore: bool) -> Record {
    let mut filter = Record::new();
    filter.insert(ID_FIELD.into(), id.to_value());
    if let Some(revision) = recorded.filter(|_| !ignore) {
        filter.insert(REVISION_FIELD.into(), revision.to_value());
    }
    filter
}

/// Returns `true` if `filter` pins a revision.
pub fn is_revision_checked(filter: &Record) -> bool {
    filter.contains_key(REVISION_FIELD)
}
