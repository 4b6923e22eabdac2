//! Link resolution.
//!
//! A resolve request is planned once: [`LinkPlan`] walks the registry from
//! the queried model and produces a finite tree of relation fields to
//! resolve, bounded by the requested nesting depth and, where the model
//! graph loops back on itself, by a cycle depth. The plan is then executed
//! by one of two strategies:
//!
//! - **Pipeline** -- [`build_pipeline`] turns the plan into `$lookup` joins
//!   that run inside the store; [`collapse_back_links`] finishes single
//!   back-links afterwards.
//! - **Secondary fetch** -- [`Resolver`] resolves records that are already
//!   in memory, loading each referenced record at most once per call
//!   through an [`Arena`].
//!
//! Either way, references below the plan's frontier stay unresolved and a
//! dangling single reference stays a reference.

pub mod error;
pub mod pipeline;
pub mod plan;
pub mod resolver;

pub use error::{ResolveError, ResolveResult};
pub use pipeline::{build_pipeline, collapse_back_links, link_stages};
pub use plan::{DepthOptions, LinkNode, LinkPlan, DEFAULT_CYCLE_DEPTH};
pub use resolver::{Arena, Resolver};
