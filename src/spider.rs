//! The crawl orchestrator
//!
//! `Spider` composes the session manager, extractor registry, proxy pool,
//! retry machine, cache and stats into `crawl` and `crawl_batch`. A crawl
//! always comes back as a `CrawlResult`: terminal failures (retries
//! exhausted, proxy pool dead) are encoded in the result, never thrown past
//! this boundary, so one URL's total failure can never abort a batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::aggregate;
use crate::browser::{Navigation, SessionManager};
use crate::cache::CacheManager;
use crate::concurrency::ConcurrencyController;
use crate::config::{ConfigDocument, ExtractionConfig, LlmConfig, SpiderConfig};
use crate::error::{SpiderError, SpiderResult};
use crate::extract::{enabled_extractors, run_extractor};
use crate::llm::LlmEnhancer;
use crate::proxy::ProxyManager;
use crate::result::{CrawlResult, ExtractionOutcome, ExtractorKind, LlmOutcome, NavMetadata};
use crate::retry::{RetryManager, RetryPolicy};
use crate::stats::StatsCollector;

struct SpiderInner {
    spider_config: SpiderConfig,
    extraction_config: ExtractionConfig,
    sessions: SessionManager,
    cache: CacheManager,
    proxies: ProxyManager,
    retry_policy: RetryPolicy,
    stats: StatsCollector,
    llm: Option<LlmEnhancer>,
}

#[derive(Clone)]
pub struct Spider {
    inner: Arc<SpiderInner>,
}

impl Spider {
    pub fn new(
        spider_config: SpiderConfig,
        extraction_config: ExtractionConfig,
        llm_config: Option<LlmConfig>,
    ) -> Self {
        let sessions = SessionManager::new(spider_config.clone());
        let cache = CacheManager::new(Duration::from_secs(spider_config.cache_ttl_secs));
        let proxies = ProxyManager::new(
            &spider_config.proxies,
            spider_config.proxy_failure_threshold,
            spider_config.proxy_reset_on_exhaustion,
        );
        let retry_policy = RetryPolicy::new(
            spider_config.max_retries,
            spider_config.retry_base_delay_ms,
        );

        Self {
            inner: Arc::new(SpiderInner {
                sessions,
                cache,
                proxies,
                retry_policy,
                stats: StatsCollector::new(),
                llm: llm_config.map(LlmEnhancer::new),
                spider_config,
                extraction_config,
            }),
        }
    }

    pub fn from_document(doc: &ConfigDocument) -> Self {
        Self::new(
            doc.spider_config.clone(),
            doc.extraction_config.clone(),
            doc.llm_config.clone(),
        )
    }

    pub fn stats(&self) -> &StatsCollector {
        &self.inner.stats
    }

    /// Crawl one URL with the spider's own extraction config.
    pub async fn crawl(&self, url: &str) -> CrawlResult {
        let config = self.inner.extraction_config.clone();
        self.crawl_with_config(url, &config).await
    }

    /// Crawl one URL with a task-specific extraction config.
    pub async fn crawl_with_config(&self, url: &str, config: &ExtractionConfig) -> CrawlResult {
        let inner = &self.inner;
        let fingerprint = CacheManager::fingerprint(url, config);

        if inner.spider_config.cache_enabled {
            if let Some(cached) = inner.cache.lookup(&fingerprint) {
                debug!(url, "cache hit");
                inner.stats.record_cache_hit();
                return cached;
            }
        }

        inner.stats.record_crawl_started();
        let crawl_started = Instant::now();

        let retry = RetryManager::new(inner.retry_policy);
        let (attempt_result, attempts) = retry
            .run(|attempt| self.attempt_crawl(url, config, attempt))
            .await;
        inner.stats.record_retries(attempts);

        let result = match attempt_result {
            Ok((nav, proxy, outcomes)) => {
                let llm = self.enhance(&outcomes).await;
                let nav_meta = NavMetadata {
                    final_url: nav.final_url,
                    redirected: nav.redirected,
                    nav_duration_ms: nav.duration.as_millis() as u64,
                    proxy,
                    attempts,
                };
                for outcome in &outcomes {
                    inner.stats.record_extractor(
                        outcome.extractor,
                        outcome.success,
                        Duration::from_millis(outcome.duration_ms),
                    );
                }
                aggregate::merge(
                    url,
                    nav_meta,
                    outcomes,
                    inner.spider_config.success_policy,
                    llm,
                )
            }
            Err(e) => {
                warn!(url, error = %e, "crawl failed terminally");
                CrawlResult::failure(url, e.to_string(), attempts)
            }
        };

        if inner.spider_config.cache_enabled && result.error.is_none() {
            inner.cache.store(fingerprint, result.clone());
        }
        inner
            .stats
            .record_crawl_finished(url, result.overall_success, crawl_started.elapsed());
        info!(
            url,
            success = result.overall_success,
            extractors = result.derived.successful_extractors.len(),
            "crawl finished"
        );
        result
    }

    /// Crawl many URLs under the admission gate. Returns one result per
    /// input URL that ran, keyed by URL; individual failures are ordinary
    /// failed results inside the map.
    pub async fn crawl_batch(
        &self,
        urls: &[String],
        max_concurrent: usize,
    ) -> HashMap<String, CrawlResult> {
        let controller = ConcurrencyController::new(max_concurrent);
        self.crawl_batch_with_controller(urls, &controller).await
    }

    /// Batch crawl under a caller-owned admission gate. Holding the
    /// controller lets an external shutdown signal stop admitting new tasks
    /// (`controller.shutdown()`) while in-flight crawls drain.
    pub async fn crawl_batch_with_controller(
        &self,
        urls: &[String],
        controller: &ConcurrencyController,
    ) -> HashMap<String, CrawlResult> {
        info!(
            count = urls.len(),
            max_concurrent = controller.max_concurrent(),
            "starting batch crawl"
        );

        let results = controller
            .run_all(urls.to_vec(), |url| {
                let spider = self.clone();
                async move { spider.crawl(&url).await }
            })
            .await;

        let ok = results.values().filter(|r| r.overall_success).count();
        info!(ok, total = results.len(), "batch crawl finished");
        results
    }

    /// Shut down every browser instance. The spider stays usable; the next
    /// crawl relaunches on demand.
    pub async fn shutdown(&self) {
        self.inner.sessions.shutdown().await;
    }

    /// One navigation attempt: pick a proxy, open an isolated page, navigate
    /// and run the enabled extractors over it. The page closes on every exit
    /// path.
    async fn attempt_crawl(
        &self,
        url: &str,
        config: &ExtractionConfig,
        attempt: u32,
    ) -> SpiderResult<(Navigation, Option<String>, Vec<ExtractionOutcome>)> {
        let inner = &self.inner;
        debug!(url, attempt, "navigation attempt");

        let proxy = if inner.proxies.is_empty() {
            None
        } else {
            Some(inner.proxies.select()?.endpoint)
        };

        let page = match inner.sessions.open_page(proxy.as_deref()).await {
            Ok(page) => page,
            Err(e) => {
                self.report_proxy(&proxy, false);
                return Err(e);
            }
        };

        let nav = match inner.sessions.navigate(&page, url).await {
            Ok(nav) => nav,
            Err(e) => {
                self.report_proxy(&proxy, false);
                inner.sessions.close_page(page).await;
                return Err(e);
            }
        };
        self.report_proxy(&proxy, true);

        // Extractors run sequentially over the shared page; the adapter
        // guarantees a failing or hung one surfaces only inside its own
        // outcome.
        let deadline = Duration::from_millis(inner.spider_config.timeout_ms);
        let mut outcomes = Vec::new();
        for extractor in enabled_extractors(config) {
            outcomes.push(run_extractor(extractor, &page, config, deadline).await);
        }

        inner.sessions.close_page(page).await;
        Ok((nav, proxy, outcomes))
    }

    fn report_proxy(&self, proxy: &Option<String>, success: bool) {
        if let Some(endpoint) = proxy {
            self.inner.proxies.report(endpoint, success);
        }
    }

    /// Run the optional LLM pass over the extracted text. Failures degrade
    /// the result; they never fail the crawl.
    async fn enhance(&self, outcomes: &[ExtractionOutcome]) -> Option<LlmOutcome> {
        let enhancer = self.inner.llm.as_ref()?;

        let text = outcomes
            .iter()
            .find(|o| o.extractor == ExtractorKind::Text && o.success)
            .and_then(|o| o.data.get("content"))
            .and_then(|c| c.as_str())?;

        let started = Instant::now();
        let outcome = match enhancer.enhance(text).await {
            Ok(data) => LlmOutcome {
                success: true,
                data: Some(data),
                error: None,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => {
                warn!(error = %e, "LLM enhancement failed, returning non-enhanced result");
                LlmOutcome {
                    success: false,
                    data: None,
                    error: Some(e.to_string()),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        };
        self.inner.stats.record_llm(outcome.success);
        Some(outcome)
    }
}

/// One-shot crawl with default configuration; backs the `quick` CLI command.
pub async fn quick_crawl(url: &str) -> SpiderResult<CrawlResult> {
    url::Url::parse(url).map_err(|e| SpiderError::Config(format!("invalid url {url}: {e}")))?;
    let spider = Spider::new(SpiderConfig::default(), ExtractionConfig::default(), None);
    let result = spider.crawl(url).await;
    spider.shutdown().await;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spider_is_cheaply_cloneable() {
        let spider = Spider::new(SpiderConfig::default(), ExtractionConfig::default(), None);
        let clone = spider.clone();
        assert!(Arc::ptr_eq(&spider.inner, &clone.inner));
    }

    #[tokio::test]
    async fn cached_result_short_circuits_navigation() {
        let spider = Spider::new(SpiderConfig::default(), ExtractionConfig::default(), None);
        let config = spider.inner.extraction_config.clone();
        let url = "https://cached.example/page";
        let fingerprint = CacheManager::fingerprint(url, &config);

        // Seed the cache with a pre-built result; the crawl must return it
        // without touching the browser (which would fail in this test env).
        let mut seeded = CrawlResult::failure(url, "seed".into(), 1);
        seeded.error = None;
        seeded.overall_success = true;
        spider.inner.cache.store(fingerprint, seeded);

        let result = spider.crawl(url).await;
        assert!(result.overall_success);
        assert_eq!(
            spider
                .stats()
                .cache_hits
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
        // no crawl was started for a cache hit
        assert_eq!(
            spider
                .stats()
                .crawls_started
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn quick_crawl_rejects_invalid_urls() {
        assert!(matches!(
            quick_crawl("not a url").await,
            Err(SpiderError::Config(_))
        ));
    }
}
