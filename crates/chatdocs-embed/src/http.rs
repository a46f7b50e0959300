use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;

use chatdocs_core::config::EmbeddingSettings;
use chatdocs_core::traits::EmbeddingProvider;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    client: Client,
    settings: EmbeddingSettings,
    id: String,
}

impl HttpEmbedder {
    pub fn new(settings: EmbeddingSettings) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_millis(settings.timeout_ms)).build()?;
        let id = format!("http:{}", settings.model);
        Ok(Self { client, settings, id })
    }
}

impl EmbeddingProvider for HttpEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.settings.dimensions }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}{}", self.settings.api_base.trim_end_matches('/'), self.settings.path);
        let body = serde_json::json!({
            "model": self.settings.model,
            "input": texts,
            "dimensions": self.settings.dimensions,
        });
        let mut request = self.client.post(&url).json(&body);
        if !self.settings.api_key.is_empty() {
            request = request.bearer_auth(&self.settings.api_key);
        }
        let response: EmbeddingResponse = request.send()?.error_for_status()?.json()?;
        let vectors = response.into_vectors();
        if vectors.len() != texts.len() {
            return Err(anyhow!("expected {} embeddings, got {}", texts.len(), vectors.len()));
        }
        debug!(count = vectors.len(), "embedded batch");
        Ok(vectors)
    }
}

/// Body of an OpenAI-compatible embeddings response.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    /// Vectors in request order. Items without an `index` keep their position.
    fn into_vectors(self) -> Vec<Vec<f32>> {
        let mut items: Vec<(usize, Vec<f32>)> = self
            .data
            .into_iter()
            .enumerate()
            .map(|(position, item)| (item.index.unwrap_or(position), item.embedding))
            .collect();
        items.sort_by_key(|(index, _)| *index);
        items.into_iter().map(|(_, vector)| vector).collect()
    }
}
