//! chatdocs-search
//!
//! Search backend adapters: an Elasticsearch/OpenSearch HTTP client (`elastic`)
//! with its error type (`error`), a host-selected retry wrapper (`retry`) and
//! an in-process backend that evaluates query documents directly (`memory`).

pub mod elastic;
pub mod error;
pub mod memory;
pub mod retry;

pub use elastic::ElasticBackend;
pub use error::BackendError;
pub use memory::InMemoryBackend;
pub use retry::Retrying;
