//! Browser session management
//!
//! One manager owns every Chrome instance the orchestrator uses. Instances
//! are lazy-launched and keyed by proxy endpoint, since a proxy binding is a
//! launch-time property of the Chrome process; crawls through the same
//! endpoint share a process and each crawl gets its own fresh page, so no
//! page state crosses between concurrent tasks.
//!
//! Every access health-checks the cached instance over CDP and transparently
//! relaunches a crashed one.
//!
//! Locking: `tokio::sync::Mutex`, NOT a sync lock; launch and health check
//! await CDP calls while holding the map.

use chromiumoxide::page::Page;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::browser::launch::launch_browser;
use crate::browser::wrapper::BrowserWrapper;
use crate::config::SpiderConfig;
use crate::error::{NavigationError, SpiderError, SpiderResult};

/// Init script applied to each fresh page before navigation, masking the
/// usual headless-automation fingerprints.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
    });

    window.chrome = {
        runtime: {},
    };

    Object.defineProperty(navigator, 'plugins', {
        get: () => [1, 2, 3, 4, 5],
    });

    Object.defineProperty(navigator, 'languages', {
        get: () => ['en-US', 'en'],
    });
"#;

/// What navigation learned about the page, before any extractor runs.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub final_url: String,
    pub redirected: bool,
    pub duration: Duration,
}

pub struct SessionManager {
    config: SpiderConfig,
    browsers: Mutex<HashMap<String, BrowserWrapper>>,
}

impl SessionManager {
    pub fn new(config: SpiderConfig) -> Self {
        Self {
            config,
            browsers: Mutex::new(HashMap::new()),
        }
    }

    /// Open a fresh page routed through `proxy` (or direct). Launches or
    /// recovers the backing browser as needed and applies the stealth init
    /// script on the blank page, before any navigation happens.
    pub async fn open_page(&self, proxy: Option<&str>) -> SpiderResult<Page> {
        let key = proxy.unwrap_or("").to_string();
        let mut browsers = self.browsers.lock().await;

        // Health check: a cached browser may have crashed since last use
        let crashed = match browsers.get(&key) {
            Some(wrapper) => wrapper.browser().version().await.is_err(),
            None => false,
        };
        if crashed {
            warn!(proxy = %key, "browser health check failed, relaunching");
            if let Some(mut dead) = browsers.remove(&key) {
                let _ = dead.browser_mut().close().await;
                let _ = dead.browser_mut().wait().await;
            }
        }

        if !browsers.contains_key(&key) {
            info!(proxy = proxy.unwrap_or("direct"), "launching browser");
            let (browser, handler, user_data_dir) = launch_browser(&self.config, proxy)
                .await
                .map_err(|e| SpiderError::Session(e.to_string()))?;
            browsers.insert(key.clone(), BrowserWrapper::new(browser, handler, user_data_dir));
        }

        let wrapper = browsers
            .get(&key)
            .ok_or_else(|| SpiderError::Session("browser disappeared after launch".into()))?;

        let page = wrapper
            .browser()
            .new_page("about:blank")
            .await
            .map_err(|e| SpiderError::Session(format!("failed to create page: {e}")))?;
        drop(browsers);

        // Stealth must land on the blank page, before the target URL loads
        if self.config.stealth {
            if let Err(e) = page.evaluate(STEALTH_SCRIPT).await {
                warn!("stealth script injection failed: {e}");
            }
        }

        Ok(page)
    }

    /// Navigate `page` to `url` under the configured timeout, after the
    /// configured random delay. Classifies failures into the retryable
    /// navigation taxonomy.
    pub async fn navigate(&self, page: &Page, url: &str) -> SpiderResult<Navigation> {
        if self.config.random_delay {
            let delay = jittered_delay(self.config.min_delay_ms, self.config.max_delay_ms);
            debug!(?delay, "pre-navigation delay");
            tokio::time::sleep(delay).await;
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let started = Instant::now();

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| NavigationError::Timeout(self.config.timeout_ms))?
            .map_err(|e| classify_cdp_error(&e.to_string()))?;

        page.wait_for_navigation()
            .await
            .map_err(|e| classify_cdp_error(&e.to_string()))?;

        if let Some(selector) = &self.config.wait_for_selector {
            wait_for_element(page, selector, timeout).await?;
        }

        let final_url = page
            .url()
            .await
            .map_err(|e| SpiderError::Session(format!("failed to read page url: {e}")))?
            .unwrap_or_else(|| url.to_string());

        Ok(Navigation {
            redirected: final_url != url,
            final_url,
            duration: started.elapsed(),
        })
    }

    /// Close a page once its crawl is done. Best effort: a page that is
    /// already gone is not an error.
    pub async fn close_page(&self, page: Page) {
        if let Err(e) = page.close().await {
            debug!("failed to close page: {e}");
        }
    }

    /// Shut down every browser instance. Called once when the spider is done.
    pub async fn shutdown(&self) {
        let mut browsers = self.browsers.lock().await;
        for (key, wrapper) in browsers.drain() {
            info!(proxy = %key, "shutting down browser");
            wrapper.shutdown().await;
        }
    }
}

/// Poll for an element with exponential backoff. SPAs render elements well
/// after the load event fires, so a single query is not enough.
async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> SpiderResult<()> {
    let start = Instant::now();
    let mut poll_interval = Duration::from_millis(100);
    let max_interval = Duration::from_secs(1);

    loop {
        if page.find_element(selector).await.is_ok() {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(NavigationError::Timeout(timeout.as_millis() as u64).into());
        }
        tokio::time::sleep(poll_interval).await;
        poll_interval = (poll_interval * 2).min(max_interval);
    }
}

fn jittered_delay(min_ms: u64, max_ms: u64) -> Duration {
    use rand::Rng;

    if max_ms <= min_ms {
        return Duration::from_millis(min_ms);
    }
    Duration::from_millis(rand::rng().random_range(min_ms..=max_ms))
}

/// Map a CDP error string onto the navigation taxonomy. Chrome reports
/// blocked/refused loads with distinct net error codes.
fn classify_cdp_error(message: &str) -> SpiderError {
    let lower = message.to_lowercase();
    if lower.contains("err_blocked") || lower.contains("access denied") {
        NavigationError::Blocked(message.to_string()).into()
    } else if lower.contains("timeout") || lower.contains("timed out") {
        NavigationError::Timeout(0).into()
    } else {
        NavigationError::Network(message.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cdp_errors_classify_into_taxonomy() {
        assert!(matches!(
            classify_cdp_error("net::ERR_BLOCKED_BY_CLIENT"),
            SpiderError::Navigation(NavigationError::Blocked(_))
        ));
        assert!(matches!(
            classify_cdp_error("Navigation timed out"),
            SpiderError::Navigation(NavigationError::Timeout(_))
        ));
        assert!(matches!(
            classify_cdp_error("net::ERR_CONNECTION_RESET"),
            SpiderError::Navigation(NavigationError::Network(_))
        ));
    }

    #[test]
    fn delay_stays_within_configured_bounds() {
        for _ in 0..50 {
            let delay = jittered_delay(100, 200).as_millis() as u64;
            assert!((100..=200).contains(&delay));
        }
        assert_eq!(jittered_delay(300, 300).as_millis(), 300);
    }
}
