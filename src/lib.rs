//! Configuration-driven web content extraction
//!
//! Renders pages through headless Chrome via chromiumoxide, runs the enabled
//! extractor plugins over each rendered page, and assembles the outcomes
//! into one typed crawl result, optionally post-processed by an LLM for
//! schema-constrained extraction.
//!
//! ```rust,ignore
//! use pagesift::{ExtractionConfig, Spider, SpiderConfig};
//!
//! # async fn run() {
//! let spider = Spider::new(
//!     SpiderConfig::default(),
//!     ExtractionConfig { extract_links: true, ..Default::default() },
//!     None,
//! );
//! let result = spider.crawl("https://example.com").await;
//! println!("{} links", result.derived.total_links);
//! spider.shutdown().await;
//! # }
//! ```

pub mod aggregate;
pub mod browser;
pub mod cache;
pub mod concurrency;
pub mod config;
pub mod error;
pub mod extract;
pub mod llm;
pub mod proxy;
pub mod result;
pub mod retry;
pub mod spider;
pub mod stats;

pub use cache::CacheManager;
pub use concurrency::ConcurrencyController;
pub use config::{ConfigDocument, CrawlTask, ExtractionConfig, LlmConfig, SpiderConfig, SuccessPolicy};
pub use error::{ErrorClass, LlmError, NavigationError, SpiderError, SpiderResult};
pub use proxy::{ProxyManager, ProxyRecord};
pub use result::{CrawlResult, DerivedStats, ExtractionOutcome, ExtractorKind, LlmOutcome, NavMetadata};
pub use retry::{RetryManager, RetryPolicy, RetryState};
pub use spider::{quick_crawl, Spider};
pub use stats::StatsCollector;
