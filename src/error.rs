//! Error taxonomy for the crawl pipeline
//!
//! Every failure a crawl can hit maps onto one of these variants, and each
//! variant carries a fixed retry classification. Extractor and LLM failures
//! are captured into the result structure by the orchestrator and never
//! propagate across component boundaries.

use thiserror::Error;

/// Navigation failures, the main retryable class.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("navigation timed out after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("navigation blocked: {0}")]
    Blocked(String),
}

/// LLM post-processing failures. These degrade the result, never the crawl.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("response did not match output schema: {0}")]
    SchemaMismatch(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpiderError {
    #[error(transparent)]
    Navigation(#[from] NavigationError),

    #[error("extractor failure: {0}")]
    Extractor(String),

    #[error("no healthy proxy endpoint available")]
    ProxyExhausted,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("browser session error: {0}")]
    Session(String),
}

/// Retry classification consumed by the retry state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

impl SpiderError {
    /// Navigation and proxy failures are the only classes eligible for retry.
    /// Configuration and schema errors propagate immediately without
    /// consuming an attempt.
    pub fn class(&self) -> ErrorClass {
        match self {
            SpiderError::Navigation(_) => ErrorClass::Retryable,
            SpiderError::ProxyExhausted => ErrorClass::Retryable,
            SpiderError::Session(_) => ErrorClass::Retryable,
            SpiderError::Extractor(_) => ErrorClass::Fatal,
            SpiderError::Llm(_) => ErrorClass::Fatal,
            SpiderError::Config(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

pub type SpiderResult<T> = Result<T, SpiderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_errors_are_retryable() {
        assert!(SpiderError::Navigation(NavigationError::Timeout(30000)).is_retryable());
        assert!(SpiderError::Navigation(NavigationError::Network("reset".into())).is_retryable());
        assert!(SpiderError::ProxyExhausted.is_retryable());
    }

    #[test]
    fn config_and_llm_errors_are_fatal() {
        assert!(!SpiderError::Config("bad selector".into()).is_retryable());
        assert!(!SpiderError::Llm(LlmError::SchemaMismatch("missing field".into())).is_retryable());
        assert!(!SpiderError::Extractor("selector miss".into()).is_retryable());
    }
}
