//! Deterministic chunk ordering.
//!
//! Both orderings drop chunks missing `source_uri` or `index` (counted in
//! [`Ordered::skipped`]) and keep only the first occurrence of each
//! `(source_uri, index)` pair.
//!
//! Files are ranked by first appearance in the input. Within a file, chunks
//! follow their index. Flattening that order gives every chunk a synthetic
//! position `0..n`, which the distance ordering measures against.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use chatdocs_core::types::Chunk;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ordered {
    pub chunks: Vec<Chunk>,
    pub skipped: usize,
}

/// Reading order: `(first_seen_file_rank, index)` ascending.
pub fn order_fetch_all(chunks: Vec<Chunk>) -> Ordered {
    let (mut keyed, skipped) = keyed(chunks);
    keyed.sort_by_key(|(rank, index, _)| (*rank, *index));
    Ordered { chunks: keyed.into_iter().map(|(_, _, c)| c).collect(), skipped }
}

/// Ascending `|position - center|` over synthetic positions, ties broken by
/// the smaller position.
pub fn order_by_distance(chunks: Vec<Chunk>, center: usize) -> Ordered {
    let Ordered { chunks, skipped } = order_fetch_all(chunks);
    Ordered { chunks: sort_by_distance(chunks, center), skipped }
}

/// Distance ordering centred on the best hit, i.e. the first orderable chunk
/// of the input (backends return ranked hits best first).
pub fn order_around_best(chunks: Vec<Chunk>) -> Ordered {
    let best = chunks
        .iter()
        .find_map(|c| c.ordering_key().map(|(uri, index)| (uri.to_string(), index)));
    let Ordered { chunks, skipped } = order_fetch_all(chunks);
    let Some((best_uri, best_index)) = best else {
        return Ordered { chunks, skipped };
    };
    let center = chunks
        .iter()
        .position(|c| c.ordering_key() == Some((best_uri.as_str(), best_index)))
        .unwrap_or(0);
    debug!(center, candidates = chunks.len(), "ordering around best hit");
    Ordered { chunks: sort_by_distance(chunks, center), skipped }
}

fn sort_by_distance(chunks: Vec<Chunk>, center: usize) -> Vec<Chunk> {
    let mut positioned: Vec<(usize, Chunk)> = chunks.into_iter().enumerate().collect();
    positioned.sort_by_key(|(position, _)| (position.abs_diff(center), *position));
    positioned.into_iter().map(|(_, c)| c).collect()
}

fn keyed(chunks: Vec<Chunk>) -> (Vec<(usize, u64, Chunk)>, usize) {
    let mut file_rank: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<(String, u64)> = HashSet::new();
    let mut keyed = Vec::with_capacity(chunks.len());
    let mut skipped = 0;

    for chunk in chunks {
        let Some((uri, index)) = chunk.ordering_key() else {
            warn!(id = ?chunk.id, "chunk lacks source_uri or index, excluded from ordering");
            skipped += 1;
            continue;
        };
        let uri = uri.to_string();
        if !seen.insert((uri.clone(), index)) {
            debug!(%uri, index, "dropping duplicate chunk");
            continue;
        }
        let next_rank = file_rank.len();
        let rank = *file_rank.entry(uri).or_insert(next_rank);
        keyed.push((rank, index, chunk));
    }
    (keyed, skipped)
}
