//! In-process backend that evaluates the query DSL emitted by
//! `chatdocs-query` against documents held in memory.
//!
//! Supported: `bool` (`must`, `filter`, `should` with `minimum_should_match`,
//! `must_not`), `term`, `terms`, `match_all`, `match` (token overlap scoring),
//! `knn` (cosine similarity, `num_candidates`, `similarity` floor, own
//! `filter`), `size` and `_source.excludes` wildcards. `.keyword` suffixes on
//! field paths are ignored.
//!
//! A `knn` clause's `similarity` floor only bounds that clause: a document
//! below the floor earns no vector score but can still match through a
//! sibling `should` clause, as in Elasticsearch.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use serde_json::Value;

use chatdocs_core::traits::SearchBackend;
use chatdocs_core::types::{QueryDoc, RawHit};

const DEFAULT_SIZE: usize = 10;

#[derive(Debug, Clone)]
struct Stored {
    id: String,
    source: Value,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    indexes: HashMap<String, Vec<Stored>>,
}

impl InMemoryBackend {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, index: &str, id: impl Into<String>, source: Value) {
        self.indexes.entry(index.to_string()).or_default().push(Stored { id: id.into(), source });
    }

    pub fn len(&self, index: &str) -> usize {
        self.indexes.get(index).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, index: &str) -> bool {
        self.len(index) == 0
    }

    fn docs(&self, index: &str) -> Result<&[Stored]> {
        self.indexes
            .get(index)
            .map(Vec::as_slice)
            .ok_or_else(|| anyhow!("index_not_found_exception: no such index [{index}]"))
    }

    fn evaluate(&self, index: &str, body: &Value) -> Result<Vec<(usize, f64)>> {
        let docs = self.docs(index)?;
        let query = body.get("query").unwrap_or(&Value::Null);
        let bool_q = query.get("bool");
        let filter = bool_q.and_then(|b| b.get("filter"));
        let must = bool_q.and_then(|b| b.get("must"));
        let should: &[Value] = bool_q
            .and_then(|b| b.get("should"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let candidates: Vec<usize> = (0..docs.len())
            .filter(|&i| all_match(filter, &docs[i].source) && all_match(must, &docs[i].source))
            .collect();
        if should.is_empty() {
            return Ok(candidates.into_iter().map(|i| (i, 1.0)).collect());
        }

        // Scored clauses (`match`, `knn`) add their score; other clauses add 1.
        let mut scores: HashMap<usize, (f64, usize)> = HashMap::new();
        let mut add = |i: usize, score: f64| {
            let entry = scores.entry(i).or_default();
            entry.0 += score;
            entry.1 += 1;
        };
        for clause in should {
            if let Some(spec) = clause.get("match") {
                for (i, score) in match_scores(spec, docs, &candidates) {
                    add(i, score);
                }
            } else if let Some(spec) = clause.get("knn") {
                for (i, score) in knn_scores(spec, docs, &candidates)? {
                    add(i, score);
                }
            } else {
                for &i in &candidates {
                    if clause_matches(clause, &docs[i].source) {
                        add(i, 1.0);
                    }
                }
            }
        }

        // With a `filter` or `must` present, `should` clauses are optional
        // unless `minimum_should_match` says otherwise.
        let default_minimum = usize::from(filter.is_none() && must.is_none());
        let minimum = bool_q
            .and_then(|b| b.get("minimum_should_match"))
            .and_then(Value::as_u64)
            .map_or(default_minimum, |n| n as usize);
        let scores: Vec<(usize, f64)> = candidates
            .iter()
            .filter_map(|i| {
                let (score, matched) = scores.get(i).copied().unwrap_or_default();
                (matched >= minimum).then_some((*i, score))
            })
            .collect();

        let mut hits = scores;
        hits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(hits)
    }

    fn to_hits(&self, index: &str, body: &Value, matched: Vec<(usize, f64)>, scored: bool) -> Result<Vec<RawHit>> {
        let docs = self.docs(index)?;
        let excludes: Vec<&str> = body
            .pointer("/_source/excludes")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        Ok(matched
            .into_iter()
            .map(|(i, score)| {
                let mut source = docs[i].source.clone();
                strip_excluded(&mut source, "", &excludes);
                RawHit { id: Some(docs[i].id.clone()), score: scored.then_some(score), source }
            })
            .collect())
    }
}

impl SearchBackend for InMemoryBackend {
    fn search(&self, index: &str, query: &QueryDoc) -> Result<Vec<RawHit>> {
        let size = query
            .body
            .get("size")
            .and_then(Value::as_u64)
            .map_or(DEFAULT_SIZE, |n| n as usize);
        let mut matched = self.evaluate(index, &query.body)?;
        matched.truncate(size);
        self.to_hits(index, &query.body, matched, true)
    }

    fn scan(&self, index: &str, query: &QueryDoc) -> Result<Vec<RawHit>> {
        let mut matched = self.evaluate(index, &query.body)?;
        matched.sort_by_key(|(i, _)| *i);
        self.to_hits(index, &query.body, matched, false)
    }
}

fn knn_scores(spec: &Value, docs: &[Stored], candidates: &[usize]) -> Result<Vec<(usize, f64)>> {
    let field = spec.get("field").and_then(Value::as_str).ok_or_else(|| anyhow!("knn clause needs a field"))?;
    let query_vector: Vec<f64> = spec
        .get("query_vector")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("knn clause needs a query_vector"))?
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    let num_candidates = spec.get("num_candidates").and_then(Value::as_u64).map_or(DEFAULT_SIZE, |n| n as usize);
    let boost = spec.get("boost").and_then(Value::as_f64).unwrap_or(1.0);
    let floor = spec.get("similarity").and_then(Value::as_f64);
    let filter = spec.get("filter");

    let mut selected = Vec::new();
    for &i in candidates {
        if !all_match(filter, &docs[i].source) {
            continue;
        }
        let Some(vector) = lookup(&docs[i].source, field).into_iter().next().and_then(Value::as_array) else {
            continue;
        };
        let vector: Vec<f64> = vector.iter().filter_map(Value::as_f64).collect();
        if vector.len() != query_vector.len() {
            continue;
        }
        let similarity = cosine(&query_vector, &vector);
        if floor.map_or(true, |f| similarity >= f) {
            selected.push((i, similarity));
        }
    }

    selected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    selected.truncate(num_candidates);
    for entry in &mut selected {
        entry.1 *= boost;
    }
    Ok(selected)
}

fn match_scores(spec: &Value, docs: &[Stored], candidates: &[usize]) -> Vec<(usize, f64)> {
    let Some((field, params)) = spec.as_object().and_then(|m| m.iter().next()) else {
        return Vec::new();
    };
    let (text, boost) = match params {
        Value::String(s) => (s.as_str(), 1.0),
        other => (
            other.get("query").and_then(Value::as_str).unwrap_or_default(),
            other.get("boost").and_then(Value::as_f64).unwrap_or(1.0),
        ),
    };
    let terms: HashSet<String> = tokens(text).collect();
    if terms.is_empty() {
        return Vec::new();
    }

    candidates
        .iter()
        .filter_map(|&i| {
            let body = lookup(&docs[i].source, field).into_iter().filter_map(Value::as_str).collect::<Vec<_>>().join(" ");
            let doc_terms: HashSet<String> = tokens(&body).collect();
            let hits = terms.iter().filter(|t| doc_terms.contains(*t)).count();
            (hits > 0).then(|| (i, boost * hits as f64 / terms.len() as f64))
        })
        .collect()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).map(str::to_lowercase)
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// A clause list (array) or a single clause; absent means "match".
fn all_match(clauses: Option<&Value>, source: &Value) -> bool {
    match clauses {
        None | Some(Value::Null) => true,
        Some(Value::Array(items)) => items.iter().all(|c| clause_matches(c, source)),
        Some(clause) => clause_matches(clause, source),
    }
}

fn clause_matches(clause: &Value, source: &Value) -> bool {
    let Some(obj) = clause.as_object() else { return false };
    obj.iter().all(|(kind, spec)| match kind.as_str() {
        "match_all" => true,
        "bool" => bool_matches(spec, source),
        "term" => spec.as_object().is_some_and(|fields| {
            fields.iter().all(|(field, expected)| {
                let expected = expected.get("value").unwrap_or(expected);
                lookup(source, field).into_iter().any(|v| same(v, expected))
            })
        }),
        "terms" => spec.as_object().is_some_and(|fields| {
            fields.iter().all(|(field, expected)| {
                expected.as_array().is_some_and(|options| {
                    lookup(source, field).into_iter().any(|v| options.iter().any(|o| same(v, o)))
                })
            })
        }),
        _ => false,
    })
}

fn bool_matches(spec: &Value, source: &Value) -> bool {
    if !all_match(spec.get("must"), source) || !all_match(spec.get("filter"), source) {
        return false;
    }
    if let Some(must_not) = spec.get("must_not") {
        let items = match must_not {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            single => vec![single],
        };
        if items.into_iter().any(|c| clause_matches(c, source)) {
            return false;
        }
    }
    let should: Vec<&Value> = match spec.get("should") {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
        None => Vec::new(),
    };
    if should.is_empty() {
        return true;
    }
    let minimum = spec.get("minimum_should_match").and_then(Value::as_u64).unwrap_or(1) as usize;
    should.into_iter().filter(|c| clause_matches(c, source)).count() >= minimum
}

/// Values at a dotted path; arrays at the leaf are flattened.
fn lookup<'a>(source: &'a Value, path: &str) -> Vec<&'a Value> {
    let path = path.strip_suffix(".keyword").unwrap_or(path);
    let mut current = source;
    for part in path.split('.') {
        match current.get(part) {
            Some(next) => current = next,
            None => return Vec::new(),
        }
    }
    match current {
        Value::Array(items) if !items.iter().all(Value::is_number) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn same(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::String(a), Value::Number(b)) | (Value::Number(b), Value::String(a)) => *a == b.to_string(),
        _ => false,
    }
}

fn wildcard(pattern: &str, path: &str) -> bool {
    match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
        (Some(suffix), _) => path.ends_with(suffix),
        (None, Some(prefix)) => path.starts_with(prefix),
        (None, None) => path == pattern,
    }
}

fn strip_excluded(value: &mut Value, prefix: &str, excludes: &[&str]) {
    if excludes.is_empty() {
        return;
    }
    if let Value::Object(map) = value {
        map.retain(|key, _| {
            let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
            !excludes.iter().any(|p| wildcard(p, &path))
        });
        for (key, child) in map.iter_mut() {
            let path = if prefix.is_empty() { key.clone() } else { format!("{prefix}.{key}") };
            strip_excluded(child, &path, excludes);
        }
    }
}
