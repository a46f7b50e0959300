//! chatdocs-query
//!
//! Builds the search-backend query documents: a permission filter shared by
//! every query, an exhaustive "fetch all permitted" scan, a metadata-only scan
//! and the hybrid lexical + nearest-neighbour ranked query.

pub mod builder;
pub mod filter;

pub use builder::{build_fetch_all, build_metadata_only, build_ranked};
pub use filter::{permission_filter, RESOLUTION_FIELD};
