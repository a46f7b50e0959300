//! Raw hit to [`Chunk`] mapping.
//!
//! Two payload layouts exist: the legacy one keeps `index`, the owner and the
//! source file at the top level of `_source`, the current one nests them under
//! `_source.metadata`. Nested values win when usable; top-level values are a
//! fallback.
//! The legacy fallback can go once stored chunks are migrated to the nested
//! layout.

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use chatdocs_core::types::{Chunk, Metadata, RawHit};

/// Keys that may identify the owning file, in resolution order.
pub const SOURCE_KEYS: [&str; 4] = ["parent_file_uuid", "uri", "file_name", "parent_doc_uuid"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedHit {
    pub id: Option<String>,
    pub reason: &'static str,
}

impl fmt::Display for MalformedHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed hit {}: {}", self.id.as_deref().unwrap_or("<no id>"), self.reason)
    }
}

impl std::error::Error for MalformedHit {}

/// Map one hit. Only a missing text field is fatal for the hit; every other
/// field is optional.
pub fn hit_to_chunk(hit: &RawHit) -> Result<Chunk, MalformedHit> {
    map(hit, true)
}

/// Map hits in order, skipping and logging malformed ones. Returns the chunks
/// and the number of skipped hits.
pub fn map_hits(hits: &[RawHit]) -> (Vec<Chunk>, usize) {
    map_all(hits, true)
}

/// Like [`map_hits`] for payloads fetched without text.
pub fn map_metadata_hits(hits: &[RawHit]) -> (Vec<Chunk>, usize) {
    map_all(hits, false)
}

fn map_all(hits: &[RawHit], require_text: bool) -> (Vec<Chunk>, usize) {
    let mut chunks = Vec::with_capacity(hits.len());
    let mut skipped = 0;
    for hit in hits {
        match map(hit, require_text) {
            Ok(chunk) => chunks.push(chunk),
            Err(e) => {
                warn!(id = ?e.id, reason = e.reason, "skipping malformed hit");
                skipped += 1;
            }
        }
    }
    (chunks, skipped)
}

fn map(hit: &RawHit, require_text: bool) -> Result<Chunk, MalformedHit> {
    let malformed = |reason| MalformedHit { id: hit.id.clone(), reason };
    let top = hit.source.as_object().ok_or_else(|| malformed("_source is not an object"))?;
    let nested = top.get("metadata").and_then(Value::as_object);

    let text = match top.get("text") {
        Some(Value::String(text)) => text.clone(),
        _ if require_text => return Err(malformed("missing text")),
        _ => String::new(),
    };
    let index = field(top, nested, "index", as_index);
    let source_uri = SOURCE_KEYS.iter().find_map(|key| field(top, nested, key, as_identifier));

    let mut metadata = Metadata::new();
    for (key, value) in top {
        if key != "text" && key != "metadata" && !is_embedding(key) {
            metadata.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in nested.into_iter().flatten() {
        if !is_embedding(key) && !value.is_null() {
            metadata.insert(key.clone(), value.clone());
        }
    }

    Ok(Chunk { id: hit.id.clone(), text, source_uri, index, metadata, score: hit.score })
}

/// The nested value when it parses, else the top-level one.
fn field<T>(
    top: &Map<String, Value>,
    nested: Option<&Map<String, Value>>,
    key: &str,
    parse: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    nested.and_then(|m| m.get(key)).and_then(&parse).or_else(|| top.get(key).and_then(&parse))
}

fn as_index(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn is_embedding(key: &str) -> bool {
    key.ends_with("embedding")
}
