//! Domain types shared by the query builder, the search adapters and the
//! retrieval pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

pub type Metadata = serde_json::Map<String, Value>;

/// A span of text retrieved from a source file.
///
/// - `id`: backend document id, when the hit carried one
/// - `text`: the chunk content
/// - `source_uri`: identifier of the owning file
/// - `index`: position within the owning file, unique per `(source_uri, index)`
/// - `metadata`: auxiliary fields (page number, token count, ...) with any
///   embedding vector removed
/// - `score`: backend relevance score, higher is better
///
/// `source_uri` and `index` are optional because legacy payloads may lack
/// them; such chunks are dropped by the orderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub source_uri: Option<String>,
    #[serde(default)]
    pub index: Option<u64>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source_uri: impl Into<String>, index: u64) -> Self {
        Self {
            id: None,
            text: text.into(),
            source_uri: Some(source_uri.into()),
            index: Some(index),
            metadata: Metadata::new(),
            score: None,
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    /// `(source_uri, index)`, or `None` when either is missing.
    pub fn ordering_key(&self) -> Option<(&str, u64)> {
        Some((self.source_uri.as_deref()?, self.index?))
    }

    /// Page numbers from `metadata.page_number`, which may be a single
    /// integer or a list of integers.
    pub fn page_numbers(&self) -> Vec<u32> {
        match self.metadata.get("page_number") {
            Some(Value::Array(items)) => items.iter().filter_map(as_page).collect(),
            Some(v) => as_page(v).into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn token_count(&self) -> Option<usize> {
        self.metadata
            .get("token_count")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    }
}

fn as_page(v: &Value) -> Option<u32> {
    v.as_u64().and_then(|n| u32::try_from(n).ok())
}

/// Granularity a file was chunked at. Each file is indexed at several
/// resolutions; queries pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkResolution {
    Smallest,
    Small,
    Normal,
    Large,
    Largest,
}

impl ChunkResolution {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Smallest => "smallest",
            Self::Small => "small",
            Self::Normal => "normal",
            Self::Large => "large",
            Self::Largest => "largest",
        }
    }
}

/// A retrieval request.
///
/// An empty `allowed_file_ids` means no file restriction, not "match nothing".
/// `chunk_resolution` left unset falls back to the retriever's default for
/// the operation; when that is unset too, every resolution matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub question: String,
    pub requesting_user_id: String,
    #[serde(default)]
    pub allowed_file_ids: BTreeSet<String>,
    #[serde(default)]
    pub chunk_resolution: Option<ChunkResolution>,
}

impl Query {
    pub fn new(requesting_user_id: impl Into<String>) -> Self {
        Self { requesting_user_id: requesting_user_id.into(), ..Self::default() }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    pub fn with_allowed_files<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_file_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chunk_resolution(mut self, resolution: ChunkResolution) -> Self {
        self.chunk_resolution = Some(resolution);
        self
    }
}

/// Relevance tuning for the hybrid lexical + vector query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalParams {
    /// Maximum number of hits returned.
    pub size: usize,
    /// Candidate pool for the nearest-neighbour clause.
    pub num_candidates: usize,
    pub match_boost: f32,
    pub knn_boost: f32,
    /// Nearest-neighbour candidates below this similarity are excluded.
    pub similarity_threshold: f32,
    /// Truncate ranked hits at the elbow of their score curve.
    pub elbow_filter_enabled: bool,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            size: 30,
            num_candidates: 10,
            match_boost: 1.0,
            knn_boost: 1.0,
            similarity_threshold: 0.0,
            elbow_filter_enabled: false,
        }
    }
}

/// A reference from an AI-authored chat message to a source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub file_id: String,
    pub text: String,
    #[serde(default)]
    pub chunk_index: Option<u64>,
    #[serde(default)]
    pub page_numbers: Vec<u32>,
}

impl Citation {
    pub fn new(file_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { file_id: file_id.into(), text: text.into(), chunk_index: None, page_numbers: Vec::new() }
    }

    pub fn from_chunk(chunk: &Chunk) -> Option<Self> {
        let (file_id, index) = chunk.ordering_key()?;
        Some(Self {
            file_id: file_id.to_string(),
            text: chunk.text.clone(),
            chunk_index: Some(index),
            page_numbers: chunk.page_numbers(),
        })
    }
}

/// How a backend should execute a [`QueryDoc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Return every matching document, unranked, paging as needed.
    Scan,
    /// Return at most the body's `size` documents, best first.
    Ranked,
}

/// A structured search request in the backend's query DSL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDoc {
    pub kind: QueryKind,
    pub body: Value,
}

/// One raw hit as returned by the search backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(rename = "_score", default)]
    pub score: Option<f64>,
    #[serde(rename = "_source", default)]
    pub source: Value,
}
