//! Embedded schema migrations.
//!
//! The schema is small enough that idempotent DDL applied at startup covers
//! it; every statement is IF NOT EXISTS so re-running is safe.

use diesel_async::SimpleAsyncConnection;

use super::pool::{AsyncSqlitePool, DieselError};

const SCHEMA_DDL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS subscriptions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    gift_name TEXT NOT NULL,
    model TEXT,
    background TEXT,
    pattern TEXT,
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS monitoring_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    subscription_id INTEGER NOT NULL,
    count INTEGER NOT NULL,
    checked_at TEXT NOT NULL,
    has_changed INTEGER NOT NULL DEFAULT 0,
    FOREIGN KEY (subscription_id) REFERENCES subscriptions (id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_user_id
    ON subscriptions(user_id);
CREATE INDEX IF NOT EXISTS idx_subscriptions_active
    ON subscriptions(is_active);
CREATE INDEX IF NOT EXISTS idx_history_subscription_checked
    ON monitoring_history(subscription_id, checked_at);
"#;

/// Apply the schema to the database behind the pool.
pub async fn run(pool: &AsyncSqlitePool) -> Result<(), DieselError> {
    let mut conn = pool.get().await?;
    conn.batch_execute(SCHEMA_DDL).await?;
    Ok(())
}
