//! Gift subscription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::SearchCriteria;

/// A user's saved filter criteria, monitored for count changes.
///
/// The gift name is the only required filter; model, background and pattern
/// narrow the search when present. Inactive subscriptions are kept in storage
/// but skipped by monitoring cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    /// Telegram chat id of the subscriber.
    pub user_id: i64,
    pub gift_name: String,
    pub model: Option<String>,
    pub background: Option<String>,
    pub pattern: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Short human-readable label for logs and CLI output.
    pub fn label(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({})", self.gift_name, model),
            None => self.gift_name.clone(),
        }
    }
}

impl From<&Subscription> for SearchCriteria {
    fn from(sub: &Subscription) -> Self {
        SearchCriteria {
            gift_name: sub.gift_name.clone(),
            model: sub.model.clone(),
            background: sub.background.clone(),
            pattern: sub.pattern.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(model: Option<&str>) -> Subscription {
        Subscription {
            id: 1,
            user_id: 42,
            gift_name: "Plush Pepe".to_string(),
            model: model.map(|s| s.to_string()),
            background: Some("Midnight".to_string()),
            pattern: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn criteria_from_subscription_copies_all_filters() {
        let sub = subscription(Some("Golden"));
        let criteria = SearchCriteria::from(&sub);
        assert_eq!(criteria.gift_name, "Plush Pepe");
        assert_eq!(criteria.model.as_deref(), Some("Golden"));
        assert_eq!(criteria.background.as_deref(), Some("Midnight"));
        assert_eq!(criteria.pattern, None);
    }

    #[test]
    fn label_includes_model_when_present() {
        assert_eq!(subscription(None).label(), "Plush Pepe");
        assert_eq!(subscription(Some("Golden")).label(), "Plush Pepe (Golden)");
    }
}
