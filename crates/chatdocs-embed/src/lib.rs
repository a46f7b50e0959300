//! Embedding providers.
//!
//! Respects `APP_USE_FAKE_EMBEDDINGS=1` to switch to the [`FakeEmbedder`] for
//! fast and deterministic outputs in tests and development.

mod fake;
mod http;

use anyhow::Result;
use tracing::info;

use chatdocs_core::config::{EmbeddingProviderKind, EmbeddingSettings};
use chatdocs_core::traits::EmbeddingProvider;

pub use fake::FakeEmbedder;
pub use http::HttpEmbedder;

pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn EmbeddingProvider>> {
    let use_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if use_fake || settings.provider == EmbeddingProviderKind::Fake {
        info!(dim = settings.dimensions, "using fake embedder");
        return Ok(Box::new(FakeEmbedder::new(settings.dimensions)));
    }
    info!(model = %settings.model, api_base = %settings.api_base, "using http embedder");
    Ok(Box::new(HttpEmbedder::new(settings.clone())?))
}
