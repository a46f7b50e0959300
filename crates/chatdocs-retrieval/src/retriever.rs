use tracing::{debug, info};

use chatdocs_core::config::{ResolutionSettings, RetrievalSettings};
use chatdocs_core::error::{Error, Result};
use chatdocs_core::traits::{EmbeddingProvider, SearchBackend};
use chatdocs_core::types::{Chunk, ChunkResolution, Citation, Query, QueryDoc, RawHit, RetrievalParams};
use chatdocs_query::{build_fetch_all, build_metadata_only, build_ranked};

use crate::elbow::filter_by_elbow;
use crate::mapper::{map_hits, map_metadata_hits};
use crate::order::{order_around_best, order_fetch_all, Ordered};

/// Ordered chunks plus counts of what was dropped on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Retrieved {
    pub chunks: Vec<Chunk>,
    /// Hits that could not be mapped to a chunk.
    pub skipped_hits: usize,
    /// Chunks lacking `source_uri` or `index`.
    pub skipped_chunks: usize,
}

impl Retrieved {
    fn new(ordered: Ordered, skipped_hits: usize) -> Self {
        Self { chunks: ordered.chunks, skipped_hits, skipped_chunks: ordered.skipped }
    }

    pub fn into_chunks(self) -> Vec<Chunk> {
        self.chunks
    }

    pub fn citations(&self) -> Vec<Citation> {
        self.chunks.iter().filter_map(Citation::from_chunk).collect()
    }
}

/// Query building, backend execution, hit mapping and ordering for one index.
pub struct Retriever<B: SearchBackend> {
    backend: B,
    index_name: String,
    embedding_field: String,
    resolutions: ResolutionSettings,
}

impl<B: SearchBackend> Retriever<B> {
    pub fn new(backend: B, index_name: impl Into<String>, embedding_field: impl Into<String>) -> Self {
        Self {
            backend,
            index_name: index_name.into(),
            embedding_field: embedding_field.into(),
            resolutions: ResolutionSettings::any(),
        }
    }

    pub fn from_settings(backend: B, settings: &RetrievalSettings) -> Self {
        Self::new(backend, settings.index_name.clone(), settings.embedding_field.clone())
            .with_resolutions(settings.resolution)
    }

    /// Per-operation chunk resolutions used when a query names none.
    pub fn with_resolutions(mut self, resolutions: ResolutionSettings) -> Self {
        self.resolutions = resolutions;
        self
    }

    /// Every chunk the user may read, in reading order. Used for whole-file
    /// summarization.
    pub fn retrieve_all_permitted(&self, query: &Query) -> Result<Retrieved> {
        let doc = build_fetch_all(&resolved(query, self.resolutions.fetch_all))?;
        let hits = self.run(&doc)?;
        let (chunks, skipped_hits) = map_hits(&hits);
        let retrieved = Retrieved::new(order_fetch_all(chunks), skipped_hits);
        info!(
            user = %query.requesting_user_id,
            chunks = retrieved.chunks.len(),
            skipped_hits,
            skipped_chunks = retrieved.skipped_chunks,
            "retrieved all permitted chunks"
        );
        Ok(retrieved)
    }

    /// The best chunks for `query.question`, ordered outward from the best
    /// hit so neighbouring text stays together.
    pub fn retrieve_for_question(
        &self,
        query: &Query,
        params: &RetrievalParams,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Retrieved> {
        let doc = build_ranked(embedder, params, &self.embedding_field, &resolved(query, self.resolutions.ranked))?;
        let hits = self.run(&doc)?;
        let (mut chunks, skipped_hits) = map_hits(&hits);
        chunks.truncate(params.size);
        if params.elbow_filter_enabled {
            let before = chunks.len();
            chunks = filter_by_elbow(chunks);
            debug!(before, after = chunks.len(), "applied elbow filter");
        }
        let retrieved = Retrieved::new(order_around_best(chunks), skipped_hits);
        info!(
            user = %query.requesting_user_id,
            chunks = retrieved.chunks.len(),
            skipped_hits,
            skipped_chunks = retrieved.skipped_chunks,
            "retrieved chunks for question"
        );
        Ok(retrieved)
    }

    /// Permitted chunks without their text, in reading order.
    pub fn retrieve_metadata(&self, query: &Query) -> Result<Retrieved> {
        let doc = build_metadata_only(&resolved(query, self.resolutions.metadata))?;
        let hits = self.run(&doc)?;
        let (chunks, skipped_hits) = map_metadata_hits(&hits);
        Ok(Retrieved::new(order_fetch_all(chunks), skipped_hits))
    }

    fn run(&self, doc: &QueryDoc) -> Result<Vec<RawHit>> {
        let hits = self.backend.execute(&self.index_name, doc).map_err(Error::backend)?;
        debug!(index = %self.index_name, kind = ?doc.kind, hits = hits.len(), "backend returned");
        Ok(hits)
    }
}

fn resolved(query: &Query, default: Option<ChunkResolution>) -> Query {
    Query { chunk_resolution: query.chunk_resolution.or(default), ..query.clone() }
}
