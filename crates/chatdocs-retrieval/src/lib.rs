//! chatdocs-retrieval
//!
//! Turns raw search hits into ordered, deduplicated chunks and groups
//! citations for display. [`Retriever`] is the entry point used by hosts:
//! `retrieve_for_question` for question answering and
//! `retrieve_all_permitted` for whole-document summarization.

pub mod citations;
pub mod context;
pub mod elbow;
pub mod mapper;
pub mod merge;
pub mod order;
pub mod retriever;

pub use citations::{group_by_file, group_citations_by_file, CitationGroup, CitesFile};
pub use context::format_context;
pub use elbow::filter_by_elbow;
pub use mapper::{hit_to_chunk, map_hits, MalformedHit};
pub use merge::merge_by_tokens;
pub use order::{order_around_best, order_by_distance, order_fetch_all, Ordered};
pub use retriever::{Retrieved, Retriever};
