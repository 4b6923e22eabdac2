//! Links between documents.
//!
//! A [`Link`] is a stored reference to another document; once resolved it
//! holds that document in place of the reference. A [`BackLink`] (or
//! [`BackLinks`] for lists) is never stored: it is the set of documents of
//! another model whose forward link points here, discovered by a reverse
//! query.
//!
//! [`LinkFetcher`] loads referenced records from the store. Lists of
//! references are fetched with one query per distinct target collection.

pub mod error;
pub mod fetcher;
pub mod link;

pub use error::{LinkError, LinkResult};
pub use fetcher::{refs_in, LinkFetcher};
pub use link::{link_from_id, BackLink, BackLinks, Link};
