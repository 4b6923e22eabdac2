//! Write and delete propagation.
//!
//! Saving a document can cascade into the documents it embeds through
//! relation fields, and deleting one can cascade into the documents it
//! links to. [`Propagator`] walks those graphs depth-first, keeping a
//! [`Visited`] set per top-level call so that cyclic graphs terminate.
//!
//! # Rules
//!
//! - [`WriteRule::DoNothing`] -- only the root is written; embedded targets
//!   must already carry identifiers.
//! - [`WriteRule::Write`] -- embedded link and back-link targets are saved
//!   before the root, new ones get identifiers first.
//! - [`DeleteRule::DeleteLinks`] -- after the root is deleted, forward-link
//!   targets are deleted too, recursively.

pub mod error;
pub mod propagator;
pub mod rules;

pub use error::{PropagateError, PropagateResult};
pub use propagator::{PreparedWrite, Propagator, WriteOutcome};
pub use rules::{DeleteRule, Visited, WriteOp, WriteRequest, WriteRule};
