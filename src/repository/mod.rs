//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking over
//! an async SQLite connection.

pub mod history;
pub mod migrations;
mod models;
pub mod pool;
pub mod subscription;

pub use history::HistoryRepository;
pub use pool::{AsyncSqlitePool, DieselError};
pub use subscription::SubscriptionRepository;

use chrono::{DateTime, Utc};

/// Parse a datetime string from the database.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
