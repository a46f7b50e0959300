use std::time::Duration;

use anyhow::Result;
use reqwest::blocking::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use chatdocs_core::config::SearchSettings;
use chatdocs_core::traits::SearchBackend;
use chatdocs_core::types::{QueryDoc, RawHit};

use crate::error::BackendError;

/// HTTP adapter for Elasticsearch / OpenSearch.
///
/// Ranked queries go through `_search`; scans page with the scroll API and
/// keep every page, including the first.
pub struct ElasticBackend {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    scroll_page_size: usize,
    scroll_keep_alive: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

impl ElasticBackend {
    pub fn new(settings: &SearchSettings) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_millis(settings.timeout_ms)).build()?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            username: settings.username.clone(),
            password: settings.password.clone(),
            scroll_page_size: settings.scroll_page_size.max(1),
            scroll_keep_alive: settings.scroll_keep_alive.clone(),
        })
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }

    fn post(&self, url: &str, body: &Value) -> Result<SearchResponse> {
        let response = self
            .authed(self.client.post(url))
            .json(body)
            .send()
            .map_err(BackendError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(BackendError::Status { status: status.as_u16(), body }.into());
        }
        Ok(response.json()?)
    }

    fn clear_scroll(&self, scroll_id: &str) {
        let url = format!("{}/_search/scroll", self.base_url);
        let result = self
            .authed(self.client.delete(&url))
            .json(&json!({ "scroll_id": scroll_id }))
            .send()
            .and_then(|r| r.error_for_status());
        if let Err(e) = result {
            warn!(error = %e, "failed to clear scroll context");
        }
    }
}

impl SearchBackend for ElasticBackend {
    fn search(&self, index: &str, query: &QueryDoc) -> Result<Vec<RawHit>> {
        let url = format!("{}/{}/_search", self.base_url, index);
        let hits = self.post(&url, &query.body)?.hits.hits;
        debug!(index, hits = hits.len(), "ranked search");
        Ok(hits)
    }

    fn scan(&self, index: &str, query: &QueryDoc) -> Result<Vec<RawHit>> {
        let url = format!("{}/{}/_search?scroll={}", self.base_url, index, self.scroll_keep_alive);
        let mut body = query.body.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("size".into(), json!(self.scroll_page_size));
        }
        let first = self.post(&url, &body)?;
        let scroll_url = format!("{}/_search/scroll", self.base_url);
        let results = drain_scroll(
            first,
            |scroll_id| self.post(&scroll_url, &json!({ "scroll": self.scroll_keep_alive, "scroll_id": scroll_id })),
            |scroll_id| self.clear_scroll(scroll_id),
        )?;

        debug!(index, hits = results.len(), "scan complete");
        Ok(results)
    }
}

/// Collect every page of a scroll opened by `first`, fetching the next page
/// with `next_page` until one comes back empty. `clear` gets the last scroll
/// id whether or not paging succeeded.
fn drain_scroll(
    first: SearchResponse,
    mut next_page: impl FnMut(&str) -> Result<SearchResponse>,
    clear: impl FnOnce(&str),
) -> Result<Vec<RawHit>> {
    let mut results = first.hits.hits;
    let Some(mut scroll_id) = first.scroll_id else {
        return Ok(results);
    };

    let outcome = loop {
        let page = match next_page(&scroll_id) {
            Ok(page) => page,
            Err(e) => break Err(e),
        };
        if let Some(next) = page.scroll_id {
            scroll_id = next;
        }
        if page.hits.hits.is_empty() {
            break Ok(());
        }
        results.extend(page.hits.hits);
    };
    clear(&scroll_id);
    outcome.map(|()| results)
}
