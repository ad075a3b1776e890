//! Bounded fan-out for batch crawls
//!
//! A counting admission gate: at most `max_concurrent` tasks are outstanding
//! at any instant, each further task starts only when a permit frees up.
//! Results come back keyed by input URL, so callers are insulated from
//! completion order. `shutdown` closes the gate: queued tasks are refused and
//! report as absent, in-flight tasks drain normally, and no waiter can
//! deadlock on a permit that will never arrive.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct ConcurrencyController {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyController {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop admitting new tasks. Tasks already holding a permit finish
    /// normally; tasks still queued on the gate return without running.
    pub fn shutdown(&self) {
        self.semaphore.close();
    }

    /// Fan `work` out over `urls` under the admission gate. One entry per
    /// input URL that actually ran; a URL whose task was refused admission
    /// (shutdown) or panicked is absent from the map, never a deadlock.
    pub async fn run_all<T, F, Fut>(&self, urls: Vec<String>, work: F) -> HashMap<String, T>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut join_set = JoinSet::new();

        for url in urls {
            let semaphore = Arc::clone(&self.semaphore);
            let task = work(url.clone());
            join_set.spawn(async move {
                // Admission gate: hold the permit for the task's whole life.
                let permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None, // gate closed during shutdown
                };
                let output = task.await;
                drop(permit);
                Some((url, output))
            });
        }

        let mut results = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some((url, output))) => {
                    results.insert(url, output);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("crawl task panicked: {e}");
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn bound_is_never_exceeded() {
        let controller = ConcurrencyController::new(4);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let high_water = Arc::new(AtomicUsize::new(0));

        let urls: Vec<String> = (0..32).map(|i| format!("https://example.com/{i}")).collect();

        let results = controller
            .run_all(urls.clone(), |url| {
                let in_flight = Arc::clone(&in_flight);
                let high_water = Arc::clone(&high_water);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    high_water.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    url
                }
            })
            .await;

        assert_eq!(results.len(), 32);
        assert!(
            high_water.load(Ordering::SeqCst) <= 4,
            "admission gate exceeded: {}",
            high_water.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn results_are_keyed_by_input_url() {
        let controller = ConcurrencyController::new(2);
        let urls = vec![
            "https://a.example".to_string(),
            "https://b.example".to_string(),
            "https://c.example".to_string(),
        ];

        let results = controller
            .run_all(urls.clone(), |url| async move { url.len() })
            .await;

        for url in &urls {
            assert_eq!(results[url], url.len());
        }
    }

    #[tokio::test]
    async fn zero_bound_is_clamped_to_one() {
        let controller = ConcurrencyController::new(0);
        assert_eq!(controller.max_concurrent(), 1);
        let results = controller
            .run_all(vec!["https://a.example".into()], |_| async { 1 })
            .await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_refuses_queued_tasks_without_deadlock() {
        let controller = ConcurrencyController::new(1);
        let started = Arc::new(AtomicUsize::new(0));

        let ctl = controller.clone();
        let urls: Vec<String> = (0..8).map(|i| format!("https://example.com/{i}")).collect();
        let started_inner = Arc::clone(&started);

        let handle = tokio::spawn(async move {
            ctl.run_all(urls, move |url| {
                let started = Arc::clone(&started_inner);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    url
                }
            })
            .await
        });

        // Let the first task get its permit, then close the gate.
        tokio::time::sleep(Duration::from_millis(10)).await;
        controller.shutdown();

        let results = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("batch must not deadlock after shutdown")
            .unwrap();

        assert!(results.len() < 8, "shutdown should refuse queued tasks");
        assert_eq!(results.len(), started.load(Ordering::SeqCst));
    }
}
