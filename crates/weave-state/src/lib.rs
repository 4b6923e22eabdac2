//! Change tracking for weave documents.
//!
//! A document whose model enables state management carries a snapshot of
//! its stored form, captured after every load and successful save. Diffing
//! the current stored form against that snapshot yields the minimal update
//! document for a partial save.
//!
//! # Key Types
//!
//! - [`StateDiff`] / [`StateChange`] -- changed dotted paths between two records
//! - [`apply_changes`] -- replay a diff onto another record
//! - [`Tracker`] -- per-model policy: capture, diff, previous changes, rollback
//! - [`revision_filter`] -- the filter that makes a write conditional on a revision

pub mod diff;
pub mod error;
pub mod revision;
pub mod tracker;

pub use diff::{apply_changes, capture, diff_states, Snapshot, StateChange, StateDiff};
pub use error::{StateError, StateResult};
pub use revision::{is_revision_checked, next_revision, revision_filter};
pub use tracker::Tracker;
