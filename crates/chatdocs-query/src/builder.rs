use serde_json::json;
use tracing::debug;

use chatdocs_core::error::{Error, Result};
use chatdocs_core::traits::EmbeddingProvider;
use chatdocs_core::types::{Query, QueryDoc, QueryKind, RetrievalParams};

use crate::filter::permission_filter;

/// Field holding the chunk text.
pub const TEXT_FIELD: &str = "text";
/// `_source` pattern matching any embedding vector field.
pub const EMBEDDING_EXCLUDE: &str = "*embedding";

/// Every chunk the user may see, unranked. Embedding vectors are excluded
/// from the payload.
pub fn build_fetch_all(query: &Query) -> Result<QueryDoc> {
    let filter = permission_filter(query)?;
    debug!(files = query.allowed_file_ids.len(), "building fetch-all query");
    Ok(QueryDoc {
        kind: QueryKind::Scan,
        body: json!({
            "_source": { "excludes": [EMBEDDING_EXCLUDE] },
            "query": { "bool": { "must": { "match_all": {} }, "filter": filter } },
        }),
    })
}

/// Like [`build_fetch_all`] but without chunk text either, for listing which
/// permitted chunks exist.
pub fn build_metadata_only(query: &Query) -> Result<QueryDoc> {
    let filter = permission_filter(query)?;
    Ok(QueryDoc {
        kind: QueryKind::Scan,
        body: json!({
            "_source": { "excludes": [EMBEDDING_EXCLUDE, TEXT_FIELD] },
            "query": { "bool": { "must": { "match_all": {} }, "filter": filter } },
        }),
    })
}

/// Hybrid lexical + nearest-neighbour query over `field_name`, capped at
/// `params.size` hits. Both clauses share the permission filter and at least
/// one of them must match. `similarity_threshold` bounds the vector clause
/// only: a lexical match below it is still returned.
///
/// The permission filter is validated before the embedding call, so a bad
/// user id never reaches the provider.
pub fn build_ranked(
    embedder: &dyn EmbeddingProvider,
    params: &RetrievalParams,
    field_name: &str,
    query: &Query,
) -> Result<QueryDoc> {
    let filter = permission_filter(query)?;
    if query.question.trim().is_empty() {
        return Err(Error::InvalidQuery("ranked retrieval needs a non-empty question".into()));
    }

    let vector = embedder.embed(&query.question).map_err(Error::embedding)?;
    if vector.is_empty() {
        return Err(Error::EmbeddingUnavailable(format!("{} returned an empty vector", embedder.model_id())));
    }
    debug!(model = embedder.model_id(), dim = vector.len(), size = params.size, "building ranked query");

    Ok(QueryDoc {
        kind: QueryKind::Ranked,
        body: json!({
            "size": params.size,
            "_source": { "excludes": [EMBEDDING_EXCLUDE] },
            "query": {
                "bool": {
                    "should": [
                        {
                            "match": {
                                TEXT_FIELD: {
                                    "query": query.question,
                                    "boost": params.match_boost,
                                }
                            }
                        },
                        {
                            "knn": {
                                "field": field_name,
                                "query_vector": vector,
                                "num_candidates": params.num_candidates,
                                "filter": filter,
                                "boost": params.knn_boost,
                                "similarity": params.similarity_threshold,
                            }
                        },
                    ],
                    "minimum_should_match": 1,
                    "filter": filter,
                }
            },
        }),
    })
}
