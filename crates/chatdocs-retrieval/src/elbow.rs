//! Score-curve cutoff for ranked hits.
//!
//! Scores are normalized to the unit square; the elbow is the point lying
//! furthest below the straight line from the first to the last point. Hits
//! from the elbow onwards are dropped.

use chatdocs_core::types::Chunk;

const FLAT: f64 = 1e-9;

/// Number of leading items to keep, or `None` when no elbow exists.
pub fn elbow_cutoff(scores: &[f64]) -> Option<usize> {
    let n = scores.len();
    if n < 3 {
        return None;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    if !(max - min).is_finite() || max - min <= FLAT {
        return None;
    }

    let last = (n - 1) as f64;
    let (elbow, gap) = scores
        .iter()
        .enumerate()
        .map(|(i, s)| (i, (1.0 - i as f64 / last) - (s - min) / (max - min)))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    (gap > FLAT).then_some(elbow.max(1))
}

/// Truncate chunks at the elbow of their score curve. Chunks pass through
/// unchanged when any score is missing or no elbow exists.
pub fn filter_by_elbow(mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let Some(scores) = chunks.iter().map(|c| c.score).collect::<Option<Vec<f64>>>() else {
        return chunks;
    };
    if let Some(keep) = elbow_cutoff(&scores) {
        chunks.truncate(keep);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steep_drop_keeps_the_head() {
        assert_eq!(elbow_cutoff(&[10.0, 2.0, 1.5, 1.2, 1.0]), Some(1));
        assert_eq!(elbow_cutoff(&[9.0, 8.8, 8.5, 1.0, 0.9, 0.8]), Some(3));
    }

    #[test]
    fn flat_short_or_linear_curves_have_no_elbow() {
        assert_eq!(elbow_cutoff(&[1.0, 1.0, 1.0]), None);
        assert_eq!(elbow_cutoff(&[3.0, 1.0]), None);
        assert_eq!(elbow_cutoff(&[4.0, 3.0, 2.0, 1.0]), None);
    }

    #[test]
    fn missing_scores_disable_the_filter() {
        let chunks = vec![
            Chunk::new("a", "f", 0).with_score(10.0),
            Chunk::new("b", "f", 1),
            Chunk::new("c", "f", 2).with_score(1.0),
        ];
        assert_eq!(filter_by_elbow(chunks).len(), 3);
    }
}
