use serde_json::Value;

use chatdocs_core::types::Chunk;

/// Rough token estimate for chunks ingested without a `token_count`.
pub fn estimate_tokens(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    (word_count as f32 / 0.75) as usize
}

fn tokens(chunk: &Chunk) -> usize {
    chunk.token_count().unwrap_or_else(|| estimate_tokens(&chunk.text))
}

/// Concatenate neighbouring chunks of the same file while the combined token
/// count stays within `max_tokens` (unbounded when `None`). Input is expected
/// in reading order, e.g. from `order_fetch_all`.
pub fn merge_by_tokens(chunks: Vec<Chunk>, max_tokens: Option<usize>) -> Vec<Chunk> {
    let budget = max_tokens.unwrap_or(usize::MAX);
    let mut merged: Vec<Chunk> = Vec::new();
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if last.source_uri == chunk.source_uri && tokens(last).saturating_add(tokens(&chunk)) <= budget => {
                combine(last, chunk)
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

fn combine(into: &mut Chunk, next: Chunk) {
    let total = tokens(into).saturating_add(tokens(&next));
    let mut pages = into.page_numbers();
    pages.extend(next.page_numbers());
    pages.sort_unstable();
    pages.dedup();

    if !into.text.is_empty() && !next.text.is_empty() {
        into.text.push('\n');
    }
    into.text.push_str(&next.text);
    into.metadata.insert("token_count".into(), Value::from(total));
    if pages.is_empty() {
        into.metadata.remove("page_number");
    } else {
        into.metadata.insert("page_number".into(), Value::from(pages));
    }
    into.score = match (into.score, next.score) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };
}
