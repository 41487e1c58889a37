//! Catalog extraction for the peek.tg gift search page.

mod browser;
mod catalog;
mod selectors;

pub use browser::BrowserSession;
pub use catalog::{CatalogExtractor, ExtractorConfig};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{SearchCriteria, SearchResult};

/// Failure classification for extraction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorCode {
    BrowserInit,
    SearchFailed,
    LinkExtractionFailed,
}

impl ExtractionErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrowserInit => "BROWSER_INIT",
            Self::SearchFailed => "SEARCH_FAILED",
            Self::LinkExtractionFailed => "LINK_EXTRACTION_FAILED",
        }
    }
}

/// Error from a single extraction attempt.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct ExtractionError {
    pub code: ExtractionErrorCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ExtractionError {
    pub fn new(code: ExtractionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn search(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorCode::SearchFailed, message)
    }
}

/// A backend that can turn filter criteria into a count observation.
///
/// The production implementation drives a headless browser; tests substitute
/// scripted fakes.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run one search and extract the matching-gift count and item summaries.
    async fn search(&self, criteria: &SearchCriteria) -> Result<SearchResult, ExtractionError>;

    /// Fetch a deep link to the most recently listed matching gift.
    ///
    /// Only called once a change is confirmed; `Ok(None)` means the link could
    /// not be determined, which callers treat as "no link".
    async fn latest_gift_link(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<Option<String>, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_code_and_message() {
        let err = ExtractionError::search("search button not found");
        assert_eq!(
            err.to_string(),
            "SEARCH_FAILED: search button not found"
        );
        assert_eq!(err.code, ExtractionErrorCode::SearchFailed);
    }
}
