use serde_json::{json, Value};

use chatdocs_core::error::Error;
use chatdocs_core::traits::EmbeddingProvider;
use chatdocs_core::types::{ChunkResolution, Query, QueryKind, RetrievalParams};
use chatdocs_embed::FakeEmbedder;
use chatdocs_query::{build_fetch_all, build_metadata_only, build_ranked, permission_filter, RESOLUTION_FIELD};

struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn model_id(&self) -> &str { "failing" }
    fn dim(&self) -> usize { 4 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("connection refused"))
    }
}

fn filter_of(body: &Value) -> &Vec<Value> {
    body["query"]["bool"]["filter"].as_array().expect("filter array")
}

#[test]
fn empty_allow_list_adds_no_file_restriction() {
    let doc = build_fetch_all(&Query::new("user-1")).expect("query");
    let filter = filter_of(&doc.body);

    assert_eq!(doc.kind, QueryKind::Scan);
    assert_eq!(filter.len(), 1, "only the owner clause");
    assert!(!doc.body.to_string().contains("parent_file_uuid"));
    assert!(!doc.body.to_string().contains("chunk_resolution"));
}

#[test]
fn chunk_resolution_adds_a_term_clause() {
    let query = Query::new("user-1").with_allowed_files(["f1"]).with_chunk_resolution(ChunkResolution::Largest);
    let filter = permission_filter(&query).expect("filter");

    assert_eq!(filter.len(), 3);
    assert_eq!(filter[2], json!({ "term": { RESOLUTION_FIELD: "largest" } }));

    let doc = build_metadata_only(&query).expect("query");
    assert_eq!(filter_of(&doc.body).last(), Some(&json!({ "term": { "metadata.chunk_resolution.keyword": "largest" } })));
}

#[test]
fn owner_clause_checks_both_layouts() {
    let filter = permission_filter(&Query::new("user-1")).expect("filter");
    assert_eq!(
        filter[0],
        json!({ "bool": { "should": [
            { "term": { "metadata.creator_user_uuid.keyword": "user-1" } },
            { "term": { "creator_user_uuid.keyword": "user-1" } },
        ], "minimum_should_match": 1 } })
    );
}

#[test]
fn allow_list_restricts_files_in_both_layouts() {
    let query = Query::new("user-1").with_allowed_files(["f2", "f1"]);
    let doc = build_fetch_all(&query).expect("query");
    let filter = filter_of(&doc.body);

    assert_eq!(filter.len(), 2);
    assert_eq!(
        filter[1],
        json!({ "bool": { "should": [
            { "terms": { "metadata.parent_file_uuid.keyword": ["f1", "f2"] } },
            { "terms": { "parent_file_uuid.keyword": ["f1", "f2"] } },
        ], "minimum_should_match": 1 } })
    );
}

#[test]
fn fetch_all_excludes_embeddings_and_metadata_only_excludes_text() {
    let all = build_fetch_all(&Query::new("u")).unwrap();
    assert_eq!(all.body["_source"]["excludes"], json!(["*embedding"]));
    assert!(all.body.get("size").is_none(), "scan queries are not truncated");

    let meta = build_metadata_only(&Query::new("u")).unwrap();
    assert_eq!(meta.body["_source"]["excludes"], json!(["*embedding", "text"]));
}

#[test]
fn missing_user_is_rejected_before_anything_else() {
    for user in ["", "   ", " padded "] {
        let err = build_fetch_all(&Query::new(user)).unwrap_err();
        assert!(matches!(err, Error::PermissionFilter(_)), "user {user:?} gave {err:?}");
    }

    // The embedder would fail too, but the permission check comes first.
    let err = build_ranked(&FailingEmbedder, &RetrievalParams::default(), "embedding", &Query::new("").with_question("q"))
        .unwrap_err();
    assert!(matches!(err, Error::PermissionFilter(_)));
}

#[test]
fn ranked_query_combines_match_and_knn() {
    let embedder = FakeEmbedder::new(8);
    let params = RetrievalParams {
        size: 3,
        num_candidates: 50,
        match_boost: 1.0,
        knn_boost: 2.0,
        similarity_threshold: 0.25,
        elbow_filter_enabled: false,
    };
    let query = Query::new("user-1").with_question("tax policy").with_allowed_files(["f1"]);
    let doc = build_ranked(&embedder, &params, "embedding", &query).expect("query");
    let body = &doc.body;

    assert_eq!(doc.kind, QueryKind::Ranked);
    assert_eq!(body["size"], 3);

    let should = body["query"]["bool"]["should"].as_array().unwrap();
    assert_eq!(should[0]["match"]["text"]["query"], "tax policy");
    assert_eq!(should[0]["match"]["text"]["boost"], 1.0);

    let knn = &should[1]["knn"];
    assert_eq!(knn["field"], "embedding");
    assert_eq!(knn["num_candidates"], 50);
    assert_eq!(knn["boost"], 2.0);
    assert_eq!(knn["similarity"], 0.25);
    assert_eq!(knn["query_vector"].as_array().unwrap().len(), 8);
    assert_eq!(&knn["filter"], &body["query"]["bool"]["filter"], "both clauses share one filter");
    assert_eq!(body["query"]["bool"]["minimum_should_match"], 1, "a filter-only match is not a hit");
}

#[test]
fn ranked_query_needs_a_question() {
    let err = build_ranked(&FakeEmbedder::new(8), &RetrievalParams::default(), "embedding", &Query::new("u"))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidQuery(_)));
}

#[test]
fn embedding_failure_propagates() {
    let query = Query::new("user-1").with_question("anything");
    let err = build_ranked(&FailingEmbedder, &RetrievalParams::default(), "embedding", &query).unwrap_err();
    match err {
        Error::EmbeddingUnavailable(msg) => assert!(msg.contains("connection refused")),
        other => panic!("unexpected error: {other:?}"),
    }
}
