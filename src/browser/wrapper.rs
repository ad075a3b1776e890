//! Browser process lifecycle
//!
//! Wraps a chromiumoxide `Browser` together with its CDP event-handler task
//! and the temporary profile directory. The handler MUST be aborted when the
//! browser goes away or it runs indefinitely; the profile directory must be
//! removed only after the Chrome process has fully exited, or locked files
//! survive on some platforms.

use chromiumoxide::browser::Browser;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    pub(crate) fn browser_mut(&mut self) -> &mut Browser {
        &mut self.browser
    }

    /// Close the Chrome process and wait for it to exit, then remove the
    /// profile directory. Teardown must not fail the crawl, so errors are
    /// logged and swallowed.
    pub(crate) async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("failed to close browser cleanly: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!("failed to wait for browser exit: {e}");
        }
        self.cleanup_profile_dir();
    }

    /// Blocking removal; may run from Drop context where async is
    /// unavailable.
    fn cleanup_profile_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "failed to remove profile dir {}: {e}; manual cleanup may be required",
                    path.display()
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        if self.user_data_dir.is_some() {
            info!("browser wrapper dropped without explicit shutdown; cleaning profile dir");
            self.cleanup_profile_dir();
        }
    }
}
