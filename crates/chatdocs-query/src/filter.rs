use serde_json::{json, Value};

use chatdocs_core::error::{Error, Result};
use chatdocs_core::types::Query;

/// Owner field in the current (nested) and legacy (top-level) layouts.
pub const OWNER_FIELDS: [&str; 2] = ["metadata.creator_user_uuid.keyword", "creator_user_uuid.keyword"];
/// Source-file field in the current (nested) and legacy (top-level) layouts.
pub const FILE_FIELDS: [&str; 2] = ["metadata.parent_file_uuid.keyword", "parent_file_uuid.keyword"];
/// Chunk resolution field; only the nested layout carries it.
pub const RESOLUTION_FIELD: &str = "metadata.chunk_resolution.keyword";

/// Filter clauses restricting results to the requesting user's files and,
/// when `allowed_file_ids` is non-empty, to those files only. A set
/// `chunk_resolution` adds a term on the resolution field.
///
/// An empty allow-list adds no file clause at all.
pub fn permission_filter(query: &Query) -> Result<Vec<Value>> {
    let user_id = query.requesting_user_id.trim();
    if user_id.is_empty() {
        return Err(Error::PermissionFilter("requesting_user_id is missing".into()));
    }
    if user_id.len() != query.requesting_user_id.len() {
        return Err(Error::PermissionFilter("requesting_user_id has surrounding whitespace".into()));
    }

    let owner = OWNER_FIELDS.iter().map(|field| json!({ "term": { *field: user_id } })).collect::<Vec<_>>();
    let mut filter = vec![json!({ "bool": { "should": owner, "minimum_should_match": 1 } })];

    if !query.allowed_file_ids.is_empty() {
        let ids: Vec<&str> = query.allowed_file_ids.iter().map(String::as_str).collect();
        let files = FILE_FIELDS.iter().map(|field| json!({ "terms": { *field: ids } })).collect::<Vec<_>>();
        filter.push(json!({ "bool": { "should": files, "minimum_should_match": 1 } }));
    }
    if let Some(resolution) = query.chunk_resolution {
        filter.push(json!({ "term": { RESOLUTION_FIELD: resolution.as_str() } }));
    }
    Ok(filter)
}
