//! Database row records and conversions into domain models.

use diesel::prelude::*;

use super::parse_datetime;
use crate::models::{HistoryRecord, Subscription};
use crate::schema::{monitoring_history, subscriptions};

/// Row record for the subscriptions table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionRecord {
    pub id: i64,
    pub user_id: i64,
    pub gift_name: String,
    pub model: Option<String>,
    pub background: Option<String>,
    pub pattern: Option<String>,
    pub is_active: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SubscriptionRecord> for Subscription {
    fn from(record: SubscriptionRecord) -> Self {
        Subscription {
            id: record.id,
            user_id: record.user_id,
            gift_name: record.gift_name,
            model: record.model,
            background: record.background,
            pattern: record.pattern,
            is_active: record.is_active != 0,
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

/// Row record for the monitoring_history table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = monitoring_history)]
pub struct HistoryRow {
    pub id: i64,
    pub subscription_id: i64,
    pub count: i64,
    pub checked_at: String,
    pub has_changed: i32,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        HistoryRecord {
            id: row.id,
            subscription_id: row.subscription_id,
            count: row.count,
            checked_at: parse_datetime(&row.checked_at),
            changed: row.has_changed != 0,
        }
    }
}
