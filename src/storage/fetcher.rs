use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::page_cache::LocalPageCache;
use super::traits::PageSource;
use crate::model::PassKind;
use crate::util::http_client::{HttpClient, PageAttempt};

/// 在线抓取：有限次重试 + 线性退避，只接受 `200` 且 `text/html` 的响应
///
/// 配置了缓存时先查缓存，成功抓取后写回缓存。
pub struct HttpPageFetcher {
    client: HttpClient,
    cache: Option<Arc<LocalPageCache>>,
}

impl HttpPageFetcher {
    pub fn new(client: HttpClient) -> Self {
        Self { client, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<LocalPageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn cached(&self, url: &str) -> Option<String> {
        self.cache.as_ref()?.fetch(url).await
    }

    async fn write_through(&self, url: &str, html: &str) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(url, html).await {
                warn!(event = "fetch.cache_write_failed", url = %url, error = %e);
            }
        }
    }

    async fn fetch_remote(&self, url: &str) -> Option<String> {
        let policy = self.client.retry_policy();
        let max_attempts = policy.attempts();

        for attempt in 1..=max_attempts {
            match self.client.get_page(url).await {
                PageAttempt::Html(html) => {
                    info!(event = "fetch.ok", url = %url, bytes = html.len(), attempt);
                    self.write_through(url, &html).await;
                    tokio::time::sleep(policy.politeness_delay()).await;
                    return Some(html);
                }
                PageAttempt::Rejected(reason) => {
                    debug!(event = "fetch.rejected", url = %url, reason = %reason);
                    return None;
                }
                PageAttempt::Retryable(reason) => {
                    warn!(event = "fetch.retryable", url = %url, attempt, max_attempts, reason = %reason);
                }
            }
            if attempt < max_attempts {
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }

        warn!(event = "fetch.gave_up", url = %url, max_attempts);
        None
    }
}

#[async_trait]
impl PageSource for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }
        if let Some(html) = self.cached(url).await {
            return Some(html);
        }
        self.fetch_remote(url).await
    }

    fn pass_kind(&self) -> PassKind {
        PassKind::Rule
    }
}
