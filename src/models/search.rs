//! Search input and extraction result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Filter criteria for a catalog search. Pure extractor input, derived from a
/// subscription and carrying no identity of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub gift_name: String,
    pub model: Option<String>,
    pub background: Option<String>,
    pub pattern: Option<String>,
}

impl SearchCriteria {
    pub fn new(gift_name: impl Into<String>) -> Self {
        Self {
            gift_name: gift_name.into(),
            model: None,
            background: None,
            pattern: None,
        }
    }
}

/// Best-effort summary of a single gift card on the results page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftItem {
    pub id: String,
    pub name: String,
    pub image_url: Option<String>,
    pub rarity: Option<String>,
}

/// One extraction outcome. Produced fresh on every search; only its count
/// (and a derived changed flag) is ever persisted.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub count: i64,
    pub items: Vec<GiftItem>,
    pub criteria: SearchCriteria,
    pub timestamp: DateTime<Utc>,
}

impl SearchResult {
    pub fn new(count: i64, items: Vec<GiftItem>, criteria: SearchCriteria) -> Self {
        Self {
            count,
            items,
            criteria,
            timestamp: Utc::now(),
        }
    }
}

/// Process-wide extractor counters. Written only by the extractor itself,
/// read via snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractorStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_request_at: Option<DateTime<Utc>>,
}

impl ExtractorStats {
    /// Fold one request outcome into the counters, keeping a running average
    /// of response time over successful requests.
    pub fn record(&mut self, success: bool, elapsed_ms: u64) {
        if success {
            self.successful_requests += 1;
            let total =
                self.average_response_ms * (self.successful_requests - 1) as f64 + elapsed_ms as f64;
            self.average_response_ms = total / self.successful_requests as f64;
        } else {
            self.failed_requests += 1;
        }
        self.last_request_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_running_average_over_successes() {
        let mut stats = ExtractorStats::default();
        stats.total_requests = 3;
        stats.record(true, 100);
        stats.record(true, 300);
        stats.record(false, 5000);

        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 1);
        assert!((stats.average_response_ms - 200.0).abs() < f64::EPSILON);
        assert!(stats.last_request_at.is_some());
    }

    #[test]
    fn stats_serialization_skips_empty_timestamp() {
        let stats = ExtractorStats::default();
        let json = serde_json::to_string(&stats).unwrap();
        assert!(!json.contains("last_request_at"));
        assert!(json.contains("total_requests"));
    }
}
