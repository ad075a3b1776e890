//! Extractor plugins
//!
//! Each extractor turns the rendered page into one typed slice of the crawl
//! result. The orchestrator treats them uniformly through the `Extractor`
//! trait and the static registry; the closed variant set is {text, links,
//! images, structured, forms}.
//!
//! Failure isolation is enforced at the adapter boundary: `run_extractor`
//! converts any internal failure into a failed `ExtractionOutcome`, so one
//! broken extractor can never corrupt or block a sibling running against the
//! same page. Extractors only read the page (additional DOM queries are
//! fine); they never navigate away or mutate state the siblings can see.

mod forms;
mod images;
mod links;
mod structured;
mod text;

pub use forms::FormExtractor;
pub use images::ImageExtractor;
pub use links::LinkExtractor;
pub use structured::StructuredExtractor;
pub use text::TextExtractor;

use async_trait::async_trait;
use chromiumoxide::page::Page;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::config::ExtractionConfig;
use crate::error::SpiderResult;
use crate::result::{ExtractionOutcome, ExtractorKind};

#[async_trait]
pub trait Extractor: Send + Sync {
    fn kind(&self) -> ExtractorKind;

    /// Produce this extractor's data slice from the shared page snapshot.
    async fn extract(
        &self,
        page: &Page,
        config: &ExtractionConfig,
    ) -> SpiderResult<serde_json::Value>;
}

/// The static registry: every variant, in result order.
static REGISTRY: [&(dyn Extractor); 5] = [
    &TextExtractor,
    &LinkExtractor,
    &ImageExtractor,
    &StructuredExtractor,
    &FormExtractor,
];

/// Extractors enabled by `config`, in registry order.
pub fn enabled_extractors(config: &ExtractionConfig) -> Vec<&'static dyn Extractor> {
    REGISTRY
        .iter()
        .copied()
        .filter(|e| match e.kind() {
            ExtractorKind::Text => config.extract_text,
            ExtractorKind::Links => config.extract_links,
            ExtractorKind::Images => config.extract_images,
            ExtractorKind::Structured => config.extract_structured,
            ExtractorKind::Forms => config.extract_forms,
        })
        .collect()
}

/// Run one extractor with failure isolation, timing and a deadline. Errors
/// and timeouts surface only inside the outcome; a hung DOM query cancels
/// this extractor, not the crawl.
pub async fn run_extractor(
    extractor: &dyn Extractor,
    page: &Page,
    config: &ExtractionConfig,
    deadline: Duration,
) -> ExtractionOutcome {
    let kind = extractor.kind();
    let started = Instant::now();
    match tokio::time::timeout(deadline, extractor.extract(page, config)).await {
        Ok(Ok(data)) => ExtractionOutcome::ok(kind, data, started.elapsed()),
        Ok(Err(e)) => {
            warn!(extractor = %kind, error = %e, "extractor failed");
            ExtractionOutcome::failed(kind, e.to_string(), started.elapsed())
        }
        Err(_) => {
            warn!(extractor = %kind, ?deadline, "extractor timed out");
            ExtractionOutcome::failed(
                kind,
                format!("timed out after {}ms", deadline.as_millis()),
                started.elapsed(),
            )
        }
    }
}

/// Evaluate a JS expression on the page and deserialize the JSON result.
pub(crate) async fn eval_json(page: &Page, script: &str) -> SpiderResult<serde_json::Value> {
    let result = page
        .evaluate(script)
        .await
        .map_err(|e| crate::error::SpiderError::Extractor(format!("page evaluation failed: {e}")))?;
    result
        .into_value::<serde_json::Value>()
        .map_err(|e| crate::error::SpiderError::Extractor(format!("unexpected result shape: {e}")))
}
