//! End-to-end crawls against a real Chrome instance.
//!
//! These tests launch a browser and hit the network, so they are ignored by
//! default. Run them explicitly on a machine with Chrome available:
//!
//! ```sh
//! cargo test --test live_browser -- --ignored
//! ```

use pagesift::{ExtractionConfig, ExtractorKind, Spider, SpiderConfig};

fn test_spider_config() -> SpiderConfig {
    SpiderConfig {
        // keep live runs quick: no pre-navigation delay, short retry backoff
        random_delay: false,
        retry_base_delay_ms: 100,
        timeout_ms: 15_000,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore]
async fn crawls_text_and_links_from_a_live_page() {
    let extraction = ExtractionConfig {
        extract_text: true,
        extract_links: true,
        ..Default::default()
    };
    let spider = Spider::new(test_spider_config(), extraction, None);

    let result = spider.crawl("https://example.com").await;
    spider.shutdown().await;

    assert!(result.overall_success, "error: {:?}", result.error);
    let text = result.outcome(ExtractorKind::Text).expect("text outcome");
    assert!(text.success);
    assert!(result.derived.word_count > 0);

    let links = result.outcome(ExtractorKind::Links).expect("links outcome");
    assert!(links.success);
    // images were disabled, so no outcome may exist for them
    assert!(!result.has_outcome(ExtractorKind::Images));
    assert_eq!(result.derived.total_images, 0);
}

#[tokio::test]
#[ignore]
async fn exhausted_navigation_retries_produce_a_terminal_failure() {
    let config = SpiderConfig {
        // non-routable address so every attempt times out
        timeout_ms: 2_000,
        max_retries: 3,
        random_delay: false,
        retry_base_delay_ms: 50,
        ..Default::default()
    };
    let spider = Spider::new(config, ExtractionConfig::default(), None);

    let result = spider.crawl("http://10.255.255.1/never").await;
    spider.shutdown().await;

    assert!(!result.overall_success);
    assert!(result.outcomes.is_empty(), "no extractor may have run");
    assert_eq!(result.nav.attempts, 3);
    assert!(result.error.is_some());
}

#[tokio::test]
#[ignore]
async fn second_crawl_of_same_url_hits_the_cache() {
    let spider = Spider::new(test_spider_config(), ExtractionConfig::default(), None);

    let first = spider.crawl("https://example.com").await;
    let second = spider.crawl("https://example.com").await;
    spider.shutdown().await;

    assert!(first.overall_success);
    // identical timestamp proves the second result came from the cache
    assert_eq!(first.timestamp, second.timestamp);
    assert_eq!(
        spider
            .stats()
            .cache_hits
            .load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}
