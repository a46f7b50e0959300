use serde_json::json;

use chatdocs_core::config::RetrievalSettings;
use chatdocs_core::error::Error;
use chatdocs_core::traits::EmbeddingProvider;
use chatdocs_core::types::{ChunkResolution, Query, RetrievalParams};
use chatdocs_embed::FakeEmbedder;
use chatdocs_retrieval::{group_citations_by_file, merge_by_tokens, Retriever};
use chatdocs_search::InMemoryBackend;

const INDEX: &str = "chunks";

struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn model_id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 8 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("model endpoint timed out"))
    }
}

fn seeded(embedder: &FakeEmbedder) -> InMemoryBackend {
    let mut backend = InMemoryBackend::new();
    let rows = [
        ("alice", "f1", 1, 2, "budget line items for travel"),
        ("alice", "f1", 0, 1, "quarterly budget report overview"),
        ("alice", "f2", 0, 1, "holiday rota for december"),
        ("bob", "f3", 0, 1, "budget secrets of bob"),
        ("alice", "f1", 2, 3, "closing remarks on the budget"),
    ];
    for (n, (owner, file, index, page, text)) in rows.into_iter().enumerate() {
        backend.insert(
            INDEX,
            format!("c{n}"),
            json!({
                "text": text,
                "embedding": embedder.embed(text).unwrap(),
                "metadata": {
                    "creator_user_uuid": owner,
                    "parent_file_uuid": file,
                    "index": index,
                    "page_number": page,
                    "token_count": 5,
                },
            }),
        );
    }
    backend
}

fn retriever(embedder: &FakeEmbedder) -> Retriever<InMemoryBackend> {
    Retriever::new(seeded(embedder), INDEX, "embedding")
}

#[test]
fn fetch_all_returns_permitted_chunks_in_reading_order() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);

    let retrieved = retriever.retrieve_all_permitted(&Query::new("alice")).unwrap();
    let keys: Vec<(&str, u64)> = retrieved.chunks.iter().filter_map(|c| c.ordering_key()).collect();
    assert_eq!(keys, vec![("f1", 0), ("f1", 1), ("f1", 2), ("f2", 0)]);
    assert_eq!(retrieved.skipped_hits, 0);
    assert_eq!(retrieved.skipped_chunks, 0);
    assert!(retrieved.chunks.iter().all(|c| c.metadata.get("embedding").is_none()));
}

#[test]
fn allow_list_narrows_fetch_all() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);

    let query = Query::new("alice").with_allowed_files(["f2", "f3"]);
    let retrieved = retriever.retrieve_all_permitted(&query).unwrap();
    let files: Vec<_> = retrieved.chunks.iter().filter_map(|c| c.source_uri.as_deref()).collect();
    assert_eq!(files, vec!["f2"], "bob's f3 stays hidden even when listed");
}

#[test]
fn retrieval_is_idempotent() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let query = Query::new("alice").with_question("budget report");
    let params = RetrievalParams::default();

    let first = retriever.retrieve_for_question(&query, &params, &embedder).unwrap();
    let second = retriever.retrieve_for_question(&query, &params, &embedder).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        retriever.retrieve_all_permitted(&query).unwrap(),
        retriever.retrieve_all_permitted(&query).unwrap()
    );
}

#[test]
fn question_retrieval_starts_at_the_best_hit_and_respects_ownership() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let query = Query::new("alice").with_question("quarterly budget report overview");

    let retrieved = retriever.retrieve_for_question(&query, &RetrievalParams::default(), &embedder).unwrap();
    assert!(!retrieved.chunks.is_empty());
    assert_eq!(retrieved.chunks[0].ordering_key(), Some(("f1", 0)));
    assert!(retrieved.chunks.iter().all(|c| c.source_uri.as_deref() != Some("f3")));
}

#[test]
fn size_caps_question_results() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let query = Query::new("alice").with_question("budget");
    let params = RetrievalParams { size: 2, ..RetrievalParams::default() };

    let retrieved = retriever.retrieve_for_question(&query, &params, &embedder).unwrap();
    assert!(retrieved.chunks.len() <= 2);
}

#[test]
fn unreachable_similarity_threshold_yields_no_chunks() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let query = Query::new("alice").with_question("zebra migration");
    let params = RetrievalParams { similarity_threshold: 1.01, ..RetrievalParams::default() };

    let retrieved = retriever.retrieve_for_question(&query, &params, &embedder).unwrap();
    assert!(retrieved.chunks.is_empty());
}

#[test]
fn lexical_matches_survive_the_similarity_threshold() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let query = Query::new("alice").with_question("holiday rota");
    let params = RetrievalParams { similarity_threshold: 1.01, ..RetrievalParams::default() };

    let retrieved = retriever.retrieve_for_question(&query, &params, &embedder).unwrap();
    let keys: Vec<_> = retrieved.chunks.iter().filter_map(|c| c.ordering_key()).collect();
    assert_eq!(keys, vec![("f2", 0)]);
}

#[test]
fn settings_pick_a_chunk_resolution_per_operation() {
    let embedder = FakeEmbedder::new(64);
    let mut backend = InMemoryBackend::new();
    for (n, (resolution, text)) in [("normal", "budget detail"), ("largest", "budget overview")].into_iter().enumerate() {
        backend.insert(
            INDEX,
            format!("c{n}"),
            json!({
                "text": text,
                "embedding": embedder.embed(text).unwrap(),
                "metadata": { "creator_user_uuid": "u", "parent_file_uuid": "f", "index": n, "chunk_resolution": resolution },
            }),
        );
    }
    let retriever = Retriever::from_settings(backend, &RetrievalSettings::default());

    let all = retriever.retrieve_all_permitted(&Query::new("u")).unwrap();
    assert_eq!(all.chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(), vec!["budget overview"]);

    let ranked = retriever
        .retrieve_for_question(&Query::new("u").with_question("budget"), &RetrievalParams::default(), &embedder)
        .unwrap();
    assert_eq!(ranked.chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(), vec!["budget detail"]);

    let explicit = Query::new("u").with_chunk_resolution(ChunkResolution::Normal);
    assert_eq!(retriever.retrieve_all_permitted(&explicit).unwrap().chunks.len(), 1);
    assert_eq!(retriever.retrieve_all_permitted(&explicit).unwrap().chunks[0].text, "budget detail");
}

#[test]
fn elbow_filter_never_empties_a_non_empty_result() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let query = Query::new("alice").with_question("budget");
    let params = RetrievalParams { elbow_filter_enabled: true, ..RetrievalParams::default() };

    let retrieved = retriever.retrieve_for_question(&query, &params, &embedder).unwrap();
    assert!(!retrieved.chunks.is_empty());
}

#[test]
fn invalid_requests_fail_before_the_backend() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);
    let params = RetrievalParams::default();

    let err = retriever.retrieve_all_permitted(&Query::new("")).unwrap_err();
    assert!(matches!(err, Error::PermissionFilter(_)));

    let err = retriever.retrieve_for_question(&Query::new("alice"), &params, &embedder).unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));

    let query = Query::new("alice").with_question("budget");
    let err = retriever.retrieve_for_question(&query, &params, &FailingEmbedder).unwrap_err();
    assert!(matches!(err, Error::EmbeddingUnavailable(ref msg) if msg.contains("timed out")));
}

#[test]
fn backend_failures_surface_as_unavailable() {
    let embedder = FakeEmbedder::new(64);
    let retriever = Retriever::new(seeded(&embedder), "missing-index", "embedding");

    let err = retriever.retrieve_all_permitted(&Query::new("alice")).unwrap_err();
    assert!(matches!(err, Error::BackendUnavailable(_)));
    assert_eq!(err.user_message(), "retrieval failed, try again");
}

#[test]
fn skipped_hits_and_chunks_are_counted() {
    let mut backend = InMemoryBackend::new();
    backend.insert(INDEX, "good", json!({ "text": "a", "metadata": { "creator_user_uuid": "u", "parent_file_uuid": "f", "index": 0 } }));
    backend.insert(INDEX, "no-text", json!({ "metadata": { "creator_user_uuid": "u", "parent_file_uuid": "f", "index": 1 } }));
    backend.insert(INDEX, "no-index", json!({ "text": "c", "metadata": { "creator_user_uuid": "u", "parent_file_uuid": "f" } }));
    let retriever = Retriever::new(backend, INDEX, "embedding");

    let retrieved = retriever.retrieve_all_permitted(&Query::new("u")).unwrap();
    assert_eq!(retrieved.chunks.len(), 1);
    assert_eq!(retrieved.skipped_hits, 1);
    assert_eq!(retrieved.skipped_chunks, 1);

    let metadata = retriever.retrieve_metadata(&Query::new("u")).unwrap();
    assert_eq!(metadata.chunks.len(), 2);
    assert!(metadata.chunks.iter().all(|c| c.text.is_empty()));
}

#[test]
fn summarization_flow_merges_and_cites() {
    let embedder = FakeEmbedder::new(64);
    let retriever = retriever(&embedder);

    let retrieved = retriever.retrieve_all_permitted(&Query::new("alice")).unwrap();
    let groups = group_citations_by_file(retrieved.citations());
    assert_eq!(groups.iter().map(|g| g.file_id.as_str()).collect::<Vec<_>>(), vec!["f1", "f2"]);
    assert_eq!(groups[0].citations.len(), 3);

    let merged = merge_by_tokens(retrieved.into_chunks(), Some(10));
    assert_eq!(merged.len(), 3);
    assert_eq!(merged[0].page_numbers(), vec![1, 2]);
    assert_eq!(merged[1].ordering_key(), Some(("f1", 2)));
}
