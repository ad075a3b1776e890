//! Result aggregation
//!
//! Pure merge of per-extractor outcomes plus navigation metadata into one
//! `CrawlResult`. Derived counts come strictly from the outcomes present; a
//! disabled or absent extractor contributes zero, not an error. Apart from
//! the timestamp, identical inputs always produce identical output.

use chrono::Utc;
use std::collections::BTreeMap;

use crate::config::SuccessPolicy;
use crate::result::{
    CrawlResult, DerivedStats, ExtractionOutcome, ExtractorKind, LlmOutcome, NavMetadata,
};

pub fn merge(
    url: &str,
    nav: NavMetadata,
    outcomes: Vec<ExtractionOutcome>,
    policy: SuccessPolicy,
    llm: Option<LlmOutcome>,
) -> CrawlResult {
    let outcomes: BTreeMap<ExtractorKind, ExtractionOutcome> = outcomes
        .into_iter()
        .map(|outcome| (outcome.extractor, outcome))
        .collect();

    let derived = derive_stats(&outcomes);

    // merge() only runs after a successful navigation; the policy decides
    // whether extractor failures demote the crawl.
    let overall_success = match policy {
        SuccessPolicy::Navigation => true,
        SuccessPolicy::AllExtractors => outcomes.values().all(|o| o.success),
    };

    CrawlResult {
        url: url.to_string(),
        timestamp: Utc::now(),
        overall_success,
        outcomes,
        derived,
        nav,
        llm,
        error: None,
    }
}

fn derive_stats(outcomes: &BTreeMap<ExtractorKind, ExtractionOutcome>) -> DerivedStats {
    let mut stats = DerivedStats::default();

    for outcome in outcomes.values() {
        if outcome.success {
            stats.successful_extractors.push(outcome.extractor.name().to_string());
        } else {
            stats.failed_extractors.push(outcome.extractor.name().to_string());
        }
    }

    if let Some(text) = successful_data(outcomes, ExtractorKind::Text) {
        if let Some(content) = text.get("content").and_then(|c| c.as_str()) {
            stats.word_count = content.split_whitespace().count();
            stats.content_length = content.chars().count();
        }
    }

    if let Some(links) = successful_data(outcomes, ExtractorKind::Links) {
        stats.total_links = count_of(links, "total_links");
        stats.internal_links = count_of(links, "internal_links");
        stats.external_links = count_of(links, "external_links");
    }

    if let Some(images) = successful_data(outcomes, ExtractorKind::Images) {
        stats.total_images = count_of(images, "total_images");
    }

    if let Some(forms) = successful_data(outcomes, ExtractorKind::Forms) {
        stats.total_forms = count_of(forms, "total_forms");
    }

    stats
}

fn successful_data<'a>(
    outcomes: &'a BTreeMap<ExtractorKind, ExtractionOutcome>,
    kind: ExtractorKind,
) -> Option<&'a serde_json::Value> {
    outcomes
        .get(&kind)
        .filter(|outcome| outcome.success)
        .map(|outcome| &outcome.data)
}

fn count_of(data: &serde_json::Value, field: &str) -> usize {
    data.get(field).and_then(|v| v.as_u64()).unwrap_or(0) as usize
}
