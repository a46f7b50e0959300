use crate::types::{QueryDoc, RawHit};

/// Converts text into fixed-length vectors. Deterministic for identical input
/// and model.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `http:text-embedding-3-large`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("provider returned no embedding"))
    }
}

/// Executes query documents against a named index.
pub trait SearchBackend: Send + Sync {
    /// Size-limited ranked search, best hit first.
    fn search(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>>;

    /// Every matching document, unranked.
    fn scan(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>>;

    fn execute(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>> {
        match query.kind {
            crate::types::QueryKind::Ranked => self.search(index, query),
            crate::types::QueryKind::Scan => self.scan(index, query),
        }
    }
}

impl<B: SearchBackend + ?Sized> SearchBackend for Box<B> {
    fn search(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>> {
        (**self).search(index, query)
    }

    fn scan(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>> {
        (**self).scan(index, query)
    }
}

impl<B: SearchBackend + ?Sized> SearchBackend for &B {
    fn search(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>> {
        (**self).search(index, query)
    }

    fn scan(&self, index: &str, query: &QueryDoc) -> anyhow::Result<Vec<RawHit>> {
        (**self).scan(index, query)
    }
}
