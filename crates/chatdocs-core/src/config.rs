//! Layered configuration loader and typed settings.
//!
//! Uses Figment to merge built-in defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (`__` separates nested keys, e.g.
//! `APP_SEARCH__URL`). The directory holding the TOML files defaults to the
//! working directory and can be moved with `APP_CONFIG_DIR`.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::{ChunkResolution, RetrievalParams};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let dir = env::var("APP_CONFIG_DIR").map(expand_path).unwrap_or_else(|_| PathBuf::from("."));
        Self::load_from(&dir)
    }

    pub fn load_from(dir: &Path) -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(dir, &env_name)
    }

    pub fn load_for_env(dir: &Path, env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name: env_name.to_string() };
        config.settings()?;
        Ok(config)
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extract and validate the typed settings.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        validate_for_env(&settings, &self.env_name)?;
        Ok(settings)
    }
}

fn validate_for_env(settings: &Settings, env: &str) -> Result<(), Error> {
    let retrieval = &settings.retrieval;
    if retrieval.index_name.trim().is_empty() {
        return Err(Error::InvalidConfig("retrieval.index_name must not be empty".into()));
    }
    if retrieval.embedding_field.trim().is_empty() {
        return Err(Error::InvalidConfig("retrieval.embedding_field must not be empty".into()));
    }
    let params = &retrieval.params;
    if params.size == 0 {
        return Err(Error::InvalidConfig("retrieval.params.size must be positive".into()));
    }
    if params.num_candidates == 0 {
        return Err(Error::InvalidConfig("retrieval.params.num_candidates must be positive".into()));
    }
    for (name, value) in [
        ("match_boost", params.match_boost),
        ("knn_boost", params.knn_boost),
        ("similarity_threshold", params.similarity_threshold),
    ] {
        if !value.is_finite() {
            return Err(Error::InvalidConfig(format!("retrieval.params.{name} must be finite")));
        }
    }
    if settings.embedding.provider == EmbeddingProviderKind::Http && settings.embedding.api_base.trim().is_empty() {
        return Err(Error::InvalidConfig("embedding.api_base is required for the http provider".into()));
    }
    match env {
        "prod" | "production" if settings.embedding.provider == EmbeddingProviderKind::Fake => {
            Err(Error::InvalidConfig("the fake embedding provider is not allowed in production".into()))
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
    pub scroll_page_size: usize,
    pub scroll_keep_alive: String,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            timeout_ms: 30_000,
            scroll_page_size: 1000,
            scroll_keep_alive: "2m".to_string(),
            max_retries: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Http,
    #[default]
    Fake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    pub api_base: String,
    pub path: String,
    pub model: String,
    pub api_key: String,
    pub dimensions: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            api_base: String::new(),
            path: "/embeddings".to_string(),
            model: "text-embedding-3-large".to_string(),
            api_key: String::new(),
            dimensions: 1024,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub index_name: String,
    pub embedding_field: String,
    pub params: RetrievalParams,
    /// Token ceiling per merged block when summarizing; unbounded when unset.
    pub summary_max_tokens: Option<usize>,
    pub resolution: ResolutionSettings,
}

/// Chunk resolution applied per operation when the query names none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionSettings {
    pub ranked: Option<ChunkResolution>,
    pub fetch_all: Option<ChunkResolution>,
    pub metadata: Option<ChunkResolution>,
}

impl ResolutionSettings {
    /// No resolution filter for any operation.
    pub fn any() -> Self {
        Self { ranked: None, fetch_all: None, metadata: None }
    }
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            ranked: Some(ChunkResolution::Normal),
            fetch_all: Some(ChunkResolution::Largest),
            metadata: Some(ChunkResolution::Largest),
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            index_name: "chunks".to_string(),
            embedding_field: "embedding".to_string(),
            params: RetrievalParams::default(),
            summary_max_tokens: None,
            resolution: ResolutionSettings::default(),
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
