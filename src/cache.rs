//! Short-lived cache of rendered pages, keyed per entity and request.
//!
//! Sits in front of a [`PageSource`]; the pipeline itself never touches it.
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::{RequestParams, ResultPage};
use crate::table::PageSource;

/// Longest TTL honoured; larger settings are capped.
const MAX_TTL_SECONDS: u64 = 7 * 24 * 3600;

#[derive(Debug, Clone)]
struct Entry {
    page: ResultPage,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ResponseCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_seconds.min(MAX_TTL_SECONDS) as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// `datatable_{entity}_{request}`. `draw` is left out so a repeated
    /// request hits regardless of the client's counter.
    pub fn key(entity: &str, request: &RequestParams) -> String {
        let mut normalized = request.clone();
        normalized.draw = 0;
        let fingerprint = serde_json::to_string(&normalized).unwrap_or_default();
        format!("datatable_{entity}_{fingerprint}")
    }

    pub async fn get(&self, key: &str) -> Option<ResultPage> {
        self.get_at(key, Utc::now()).await
    }

    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<ResultPage> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.page.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: String, page: ResultPage) {
        self.put_at(key, page, Utc::now()).await
    }

    /// Store a page. Entries already expired at `now` are swept first, so
    /// keys that are never requested again do not pile up.
    pub async fn put_at(&self, key: String, page: ResultPage, now: DateTime<Utc>) {
        let entry = Entry {
            page,
            expires_at: now + self.ttl,
        };
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        if entries.len() < before {
            debug!(swept = before - entries.len(), "expired datatable pages dropped");
        }
        entries.insert(key, entry);
    }

    /// Drop every cached page of one entity, e.g. after a write.
    pub async fn invalidate_entity(&self, entity: &str) -> usize {
        // Fingerprints are JSON objects, so the brace keeps `customers` from
        // matching `customers_archive`.
        let prefix = format!("datatable_{entity}_{{");
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(&prefix));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

/// A [`PageSource`] answered from the cache when possible. Degraded pages
/// are passed through but never stored.
pub struct CachedTable {
    inner: Arc<dyn PageSource>,
    cache: Arc<ResponseCache>,
}

impl CachedTable {
    pub fn new(inner: Arc<dyn PageSource>, cache: Arc<ResponseCache>) -> Self {
        Self { inner, cache }
    }
}

#[async_trait]
impl PageSource for CachedTable {
    fn entity(&self) -> &str {
        self.inner.entity()
    }

    async fn page(&self, request: &RequestParams) -> ResultPage {
        let key = ResponseCache::key(self.entity(), request);
        if let Some(mut page) = self.cache.get(&key).await {
            debug!(entity = self.entity(), "datatable cache hit");
            page.draw = request.draw;
            return page;
        }
        let page = self.inner.page(request).await;
        if !page.is_degraded() {
            self.cache.put(key, page.clone()).await;
        }
        page
    }
}
