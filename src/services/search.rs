//! Reliability-checked search over the raw extractor.
//!
//! A single scraped read is not trusted: the page sometimes renders an empty
//! state, serves stale DOM, or a selector misses. A count observation is only
//! accepted when it is both plausible against history and, if it differs from
//! the baseline, reproducible in a second delayed read.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::models::{SearchCriteria, SearchResult, Subscription};
use crate::repository::{DieselError, HistoryRepository};
use crate::scrapers::{ExtractionError, SearchBackend};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("database error: {0}")]
    Database(#[from] DieselError),
}

/// Tunables for retries, plausibility and confirmation.
#[derive(Debug, Clone)]
pub struct ReliabilityConfig {
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub confirm_delay: Duration,
    pub confirm_tolerance: i64,
    pub max_reasonable_count: i64,
    pub jump_ratio: i64,
}

impl From<&Settings> for ReliabilityConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            retry_attempts: settings.retry_attempts,
            retry_delay: settings.retry_delay,
            confirm_delay: settings.confirm_delay,
            confirm_tolerance: settings.confirm_tolerance,
            max_reasonable_count: settings.max_reasonable_count,
            jump_ratio: settings.jump_ratio,
        }
    }
}

/// Outcome of one subscription check.
#[derive(Debug, Clone)]
pub struct ChangeOutcome {
    pub changed: bool,
    pub old_count: i64,
    pub new_count: i64,
    pub result: SearchResult,
}

/// Extractor wrapper providing retries and history-backed change detection.
pub struct SearchService {
    backend: Arc<dyn SearchBackend>,
    history: HistoryRepository,
    config: ReliabilityConfig,
}

impl SearchService {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        history: HistoryRepository,
        config: ReliabilityConfig,
    ) -> Self {
        Self {
            backend,
            history,
            config,
        }
    }

    /// Run one search, retrying up to the configured attempt count and
    /// surfacing the last error if every attempt fails.
    pub async fn search_with_retry(
        &self,
        criteria: &SearchCriteria,
    ) -> Result<SearchResult, ExtractionError> {
        let attempts = self.config.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("Search attempt {}/{}", attempt, attempts);
            match self.backend.search(criteria).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    warn!("Search attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ExtractionError::search("all search attempts exhausted")))
    }

    pub async fn search_for_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<SearchResult, ExtractionError> {
        self.search_with_retry(&SearchCriteria::from(subscription))
            .await
    }

    /// Deep link to the latest matching gift; only fetched on confirmed
    /// changes, so no retry wrapping.
    pub async fn latest_gift_link(
        &self,
        subscription: &Subscription,
    ) -> Result<Option<String>, ExtractionError> {
        self.backend
            .latest_gift_link(&SearchCriteria::from(subscription))
            .await
    }

    /// Check one subscription against its baseline.
    ///
    /// Exactly one history row is appended per accepted read; implausible and
    /// unconfirmed reads leave history untouched so the old baseline stands
    /// for the next cycle.
    pub async fn check_subscription_change(
        &self,
        subscription: &Subscription,
    ) -> Result<ChangeOutcome, CheckError> {
        let baseline = self
            .history
            .latest_for(subscription.id)
            .await?
            .map(|record| record.count)
            .unwrap_or(0);

        let result = self.search_for_subscription(subscription).await?;
        let new_count = result.count;

        if !self.is_plausible(baseline, &result) {
            warn!(
                "Implausible read for subscription {}: count={}, items={}; keeping baseline {}",
                subscription.id,
                new_count,
                result.items.len(),
                baseline
            );
            return Ok(ChangeOutcome {
                changed: false,
                old_count: baseline,
                new_count: baseline,
                result,
            });
        }

        let changed = new_count != baseline;
        if changed && !self.confirm_with_second_read(subscription, new_count).await {
            warn!(
                "Change {} -> {} for subscription {} not confirmed; keeping baseline",
                baseline, new_count, subscription.id
            );
            return Ok(ChangeOutcome {
                changed: false,
                old_count: baseline,
                new_count: baseline,
                result,
            });
        }

        self.history
            .append(subscription.id, new_count, changed)
            .await?;

        Ok(ChangeOutcome {
            changed,
            old_count: baseline,
            new_count,
            result,
        })
    }

    /// Filter out reads that are internally inconsistent or implausibly large
    /// relative to history.
    fn is_plausible(&self, baseline: i64, result: &SearchResult) -> bool {
        let count = result.count;
        let items = result.items.len();

        // A zero count alongside rendered cards means the counter missed.
        if count == 0 && items > 0 {
            return false;
        }
        // A positive count with no cards means the cards missed.
        if count > 0 && items == 0 {
            return false;
        }
        // Garbage values.
        if count < 0 || count > self.config.max_reasonable_count {
            return false;
        }
        // A jump of two orders of magnitude is a scraping artifact, not a
        // market event.
        if baseline > 0 && count >= baseline.saturating_mul(self.config.jump_ratio) {
            return false;
        }

        true
    }

    /// Repeat the search once after a stabilization delay; jitter within the
    /// tolerance counts as confirmed, a failed second read does not.
    async fn confirm_with_second_read(
        &self,
        subscription: &Subscription,
        first_count: i64,
    ) -> bool {
        tokio::time::sleep(self.config.confirm_delay).await;

        match self.search_for_subscription(subscription).await {
            Ok(second) => {
                let confirmed =
                    (second.count - first_count).abs() <= self.config.confirm_tolerance;
                if !confirmed {
                    debug!(
                        "Confirmation read disagrees: {} vs {}",
                        second.count, first_count
                    );
                }
                confirmed
            }
            Err(e) => {
                warn!("Confirmation read failed: {}", e);
                false
            }
        }
    }
}
