use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use chatdocs_core::config::SearchSettings;
use chatdocs_core::traits::SearchBackend;
use chatdocs_core::types::{QueryDoc, RawHit};

use crate::error::is_transient;

/// Wraps a backend with bounded exponential backoff. Only transient
/// [`BackendError`](crate::error::BackendError)s are retried. The retrieval
/// core never retries on its own; hosts opt in by wrapping their backend.
pub struct Retrying<B> {
    inner: B,
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl<B: SearchBackend> Retrying<B> {
    pub fn new(inner: B, max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self { inner, max_retries, initial_backoff, max_backoff }
    }

    pub fn from_settings(inner: B, settings: &SearchSettings) -> Self {
        Self::new(
            inner,
            settings.max_retries,
            Duration::from_millis(settings.initial_backoff_ms),
            Duration::from_millis(settings.max_backoff_ms),
        )
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    fn with_retries<T>(&self, op: &str, mut call: impl FnMut() -> Result<T>) -> Result<T> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    attempt += 1;
                    debug!(op, attempt, max = self.max_retries, error = %e, "search backend call failed, retrying after {:?}", backoff);
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(e) if attempt == 0 => return Err(e),
                Err(e) => return Err(e.context(format!("{op} failed after {attempt} retries"))),
            }
        }
    }
}

impl<B: SearchBackend> SearchBackend for Retrying<B> {
    fn search(&self, index: &str, query: &QueryDoc) -> Result<Vec<RawHit>> {
        self.with_retries("search", || self.inner.search(index, query))
    }

    fn scan(&self, index: &str, query: &QueryDoc) -> Result<Vec<RawHit>> {
        self.with_retries("scan", || self.inner.scan(index, query))
    }
}
