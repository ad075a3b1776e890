//! Typed configuration for the orchestrator
//!
//! All knobs live in one YAML document with four sections: `spider_config`
//! (browser/session), `extraction_config` (per-extractor flags and filters),
//! `llm_config` (optional provider settings) and `tasks`. Every field has a
//! serde default so a minimal document stays minimal. Validation runs once at
//! load; afterwards the typed value is treated as trusted and never
//! re-checked downstream.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{SpiderError, SpiderResult};

/// Policy for computing `overall_success` on a crawl result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// Navigation succeeded. Extractor failures degrade but do not fail.
    #[default]
    Navigation,
    /// Navigation succeeded AND every enabled extractor succeeded.
    AllExtractors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiderConfig {
    /// Run Chrome in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Navigation timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// CSS selector to wait for after navigation, if any
    #[serde(default)]
    pub wait_for_selector: Option<String>,

    /// Mask automation fingerprints (launch args + init script)
    #[serde(default = "default_stealth")]
    pub stealth: bool,

    /// Sleep a random interval before each navigation
    #[serde(default = "default_random_delay")]
    pub random_delay: bool,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total navigation attempts per crawl (first try included)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for the geometric retry backoff
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default)]
    pub user_agent: Option<String>,

    /// Proxy endpoints, e.g. "http://10.0.0.1:3128". Empty list disables
    /// proxying entirely.
    #[serde(default)]
    pub proxies: Vec<String>,

    /// Consecutive failures before an endpoint is marked unhealthy
    #[serde(default = "default_proxy_failure_threshold")]
    pub proxy_failure_threshold: u32,

    /// When every endpoint is unhealthy: true = reset all records once
    /// (soft recovery), false = surface ProxyExhausted
    #[serde(default = "default_proxy_reset_on_exhaustion")]
    pub proxy_reset_on_exhaustion: bool,

    #[serde(default)]
    pub success_policy: SuccessPolicy,

    #[serde(default = "default_cache_enabled")]
    pub cache_enabled: bool,

    /// Time-to-live for cached crawl results, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_extract_text")]
    pub extract_text: bool,

    #[serde(default)]
    pub extract_links: bool,

    #[serde(default)]
    pub extract_images: bool,

    #[serde(default)]
    pub extract_structured: bool,

    #[serde(default)]
    pub extract_forms: bool,

    /// Restrict text extraction to these selectors; empty means whole body
    #[serde(default)]
    pub content_selectors: Vec<String>,

    /// Drop text found under these selectors
    #[serde(default)]
    pub exclude_selectors: Vec<String>,

    #[serde(default = "default_true")]
    pub include_internal_links: bool,

    #[serde(default = "default_true")]
    pub include_external_links: bool,

    /// Regex patterns; a link matching any of them is dropped
    #[serde(default)]
    pub link_filters: Vec<String>,

    #[serde(default)]
    pub max_links: Option<usize>,

    #[serde(default)]
    pub min_image_width: u32,

    #[serde(default)]
    pub min_image_height: u32,

    /// Accepted image extensions; empty means all
    #[serde(default = "default_image_formats")]
    pub image_formats: Vec<String>,

    #[serde(default)]
    pub max_images: Option<usize>,

    #[serde(default = "default_true")]
    pub deduplicate: bool,

    #[serde(default = "default_true")]
    pub normalize_whitespace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    /// OpenAI-compatible chat completions base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Name of the environment variable holding the API key. The key itself
    /// is never stored in the document.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_temperature")]
    pub temperature: f64,

    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u64,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Instruction prepended to the page text when asking for extraction
    #[serde(default)]
    pub extraction_prompt: Option<String>,

    /// JSON schema the model output must conform to
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
}

/// One crawl task from the `tasks` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    pub url: String,

    #[serde(default)]
    pub name: Option<String>,

    /// Per-task extraction overrides; fields not set fall back to the
    /// document-level extraction_config
    #[serde(default)]
    pub options: Option<ExtractionConfig>,
}

/// The full configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigDocument {
    #[serde(default)]
    pub spider_config: SpiderConfig,

    #[serde(default)]
    pub extraction_config: ExtractionConfig,

    #[serde(default)]
    pub llm_config: Option<LlmConfig>,

    #[serde(default)]
    pub tasks: Vec<CrawlTask>,
}

fn default_headless() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_stealth() -> bool {
    true
}
fn default_random_delay() -> bool {
    true
}
fn default_min_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    2_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_proxy_failure_threshold() -> u32 {
    3
}
fn default_proxy_reset_on_exhaustion() -> bool {
    true
}
fn default_cache_enabled() -> bool {
    true
}
fn default_cache_ttl_secs() -> u64 {
    3_600
}
fn default_extract_text() -> bool {
    true
}
fn default_true() -> bool {
    true
}
fn default_image_formats() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "webp", "svg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_llm_temperature() -> f64 {
    0.1
}
fn default_llm_max_tokens() -> u64 {
    2_000
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            timeout_ms: default_timeout_ms(),
            wait_for_selector: None,
            stealth: default_stealth(),
            random_delay: default_random_delay(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            user_agent: None,
            proxies: Vec::new(),
            proxy_failure_threshold: default_proxy_failure_threshold(),
            proxy_reset_on_exhaustion: default_proxy_reset_on_exhaustion(),
            success_policy: SuccessPolicy::default(),
            cache_enabled: default_cache_enabled(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extract_text: default_extract_text(),
            extract_links: false,
            extract_images: false,
            extract_structured: false,
            extract_forms: false,
            content_selectors: Vec::new(),
            exclude_selectors: Vec::new(),
            include_internal_links: true,
            include_external_links: true,
            link_filters: Vec::new(),
            max_links: None,
            min_image_width: 0,
            min_image_height: 0,
            image_formats: default_image_formats(),
            max_images: None,
            deduplicate: true,
            normalize_whitespace: true,
        }
    }
}

impl ConfigDocument {
    /// Load and validate a YAML config document.
    pub fn load(path: &Path) -> SpiderResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| SpiderError::Config(format!("cannot read {}: {e}", path.display())))?;
        let doc: ConfigDocument = serde_yaml::from_str(&contents)
            .map_err(|e| SpiderError::Config(format!("invalid config: {e}")))?;
        doc.validate()?;
        Ok(doc)
    }

    /// One-shot validation. After this passes, the rest of the system treats
    /// the document as trusted.
    pub fn validate(&self) -> SpiderResult<()> {
        let sc = &self.spider_config;
        if sc.max_retries == 0 {
            return Err(SpiderError::Config("max_retries must be at least 1".into()));
        }
        if sc.min_delay_ms > sc.max_delay_ms {
            return Err(SpiderError::Config(format!(
                "min_delay_ms ({}) exceeds max_delay_ms ({})",
                sc.min_delay_ms, sc.max_delay_ms
            )));
        }
        if sc.proxy_failure_threshold == 0 {
            return Err(SpiderError::Config(
                "proxy_failure_threshold must be at least 1".into(),
            ));
        }
        for proxy in &sc.proxies {
            url::Url::parse(proxy)
                .map_err(|e| SpiderError::Config(format!("invalid proxy endpoint {proxy}: {e}")))?;
        }
        for pattern in &self.extraction_config.link_filters {
            validate_filter_pattern(pattern)?;
        }
        for task in &self.tasks {
            url::Url::parse(&task.url)
                .map_err(|e| SpiderError::Config(format!("invalid task url {}: {e}", task.url)))?;
            if let Some(options) = &task.options {
                for pattern in &options.link_filters {
                    validate_filter_pattern(pattern)?;
                }
            }
        }
        if let Some(llm) = &self.llm_config {
            if llm.api_key_env.is_empty() {
                return Err(SpiderError::Config("llm_config.api_key_env is empty".into()));
            }
            url::Url::parse(&llm.base_url)
                .map_err(|e| SpiderError::Config(format!("invalid llm base_url: {e}")))?;
        }
        Ok(())
    }

    /// Skeleton document for `pagesift init <template>`.
    pub fn template(kind: &str) -> SpiderResult<String> {
        let doc = match kind {
            "basic" => ConfigDocument {
                tasks: vec![CrawlTask {
                    url: "https://example.com".into(),
                    name: Some("example".into()),
                    options: None,
                }],
                ..Default::default()
            },
            "full" => ConfigDocument {
                extraction_config: ExtractionConfig {
                    extract_links: true,
                    extract_images: true,
                    extract_structured: true,
                    extract_forms: true,
                    ..Default::default()
                },
                tasks: vec![CrawlTask {
                    url: "https://example.com".into(),
                    name: Some("example".into()),
                    options: None,
                }],
                ..Default::default()
            },
            "llm" => ConfigDocument {
                llm_config: Some(LlmConfig {
                    provider: default_llm_provider(),
                    model: default_llm_model(),
                    base_url: default_llm_base_url(),
                    api_key_env: default_api_key_env(),
                    temperature: default_llm_temperature(),
                    max_tokens: default_llm_max_tokens(),
                    timeout_secs: default_llm_timeout_secs(),
                    extraction_prompt: Some("Extract the main article fields.".into()),
                    output_schema: None,
                }),
                tasks: vec![CrawlTask {
                    url: "https://example.com".into(),
                    name: Some("example".into()),
                    options: None,
                }],
                ..Default::default()
            },
            other => {
                return Err(SpiderError::Config(format!(
                    "unknown template '{other}' (expected basic, full or llm)"
                )))
            }
        };
        serde_yaml::to_string(&doc).map_err(|e| SpiderError::Config(e.to_string()))
    }

    /// Extractors enabled by this document's extraction config.
    pub fn enabled_extractors(&self) -> Vec<&'static str> {
        self.extraction_config.enabled()
    }
}

impl ExtractionConfig {
    pub fn enabled(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.extract_text {
            names.push("text");
        }
        if self.extract_links {
            names.push("links");
        }
        if self.extract_images {
            names.push("images");
        }
        if self.extract_structured {
            names.push("structured");
        }
        if self.extract_forms {
            names.push("forms");
        }
        names
    }
}

fn validate_filter_pattern(pattern: &str) -> SpiderResult<()> {
    // Filters are matched as plain substrings; reject the empty pattern which
    // would drop every link.
    if pattern.is_empty() {
        return Err(SpiderError::Config("empty link filter pattern".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_uses_defaults() {
        let doc: ConfigDocument = serde_yaml::from_str("tasks: []").unwrap();
        assert!(doc.spider_config.headless);
        assert_eq!(doc.spider_config.timeout_ms, 30_000);
        assert_eq!(doc.spider_config.max_retries, 3);
        assert!(doc.extraction_config.extract_text);
        assert!(!doc.extraction_config.extract_links);
        assert!(doc.llm_config.is_none());
        doc.validate().unwrap();
    }

    #[test]
    fn rejects_zero_retries() {
        let doc: ConfigDocument =
            serde_yaml::from_str("spider_config:\n  max_retries: 0\n").unwrap();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn rejects_inverted_delay_bounds() {
        let doc: ConfigDocument =
            serde_yaml::from_str("spider_config:\n  min_delay_ms: 5000\n  max_delay_ms: 100\n")
                .unwrap();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn rejects_bad_proxy_endpoint() {
        let doc: ConfigDocument =
            serde_yaml::from_str("spider_config:\n  proxies: [\"not a url\"]\n").unwrap();
        assert!(doc.validate().is_err());
    }

    #[test]
    fn templates_round_trip() {
        for kind in ["basic", "full", "llm"] {
            let yaml = ConfigDocument::template(kind).unwrap();
            let doc: ConfigDocument = serde_yaml::from_str(&yaml).unwrap();
            doc.validate().unwrap();
        }
        assert!(ConfigDocument::template("nope").is_err());
    }

    #[test]
    fn enabled_extractor_list_follows_flags() {
        let config = ExtractionConfig {
            extract_links: true,
            extract_text: false,
            ..Default::default()
        };
        assert_eq!(config.enabled(), vec!["links"]);
    }
}
