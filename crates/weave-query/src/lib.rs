//! Query builders for weave.
//!
//! Filters are built from field paths (`field("door.height").gt(5)`) and
//! rendered to filter documents only when the query runs, because a
//! link's identifier lives at `<field>.$id` in the stored reference but at
//! `<field>._id` once the link has been joined in.
//!
//! # Key Types
//!
//! - [`FieldPath`] / [`Expr`] / [`Filter`] -- comparisons and their combinations
//! - [`Sort`] -- ordered sort keys
//! - [`Update`] -- `$set`, `$unset`, `$inc` and `$push` update documents

pub mod error;
pub mod expr;
pub mod sort;
pub mod update;

pub use error::{QueryError, QueryResult};
pub use expr::{and, field, nor, or, CmpOp, Expr, FieldPath, Filter};
pub use sort::Sort;
pub use update::Update;
