//! Monitoring history repository.
//!
//! The history table is an append-only observation log. The latest row per
//! subscription is the baseline the change detector compares against.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::HistoryRow;
use super::pool::{AsyncSqlitePool, DieselError};
use crate::models::HistoryRecord;
use crate::schema::monitoring_history;

#[derive(Clone)]
pub struct HistoryRepository {
    pool: AsyncSqlitePool,
}

impl HistoryRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Append one accepted observation and return the stored row.
    pub async fn append(
        &self,
        subscription_id: i64,
        count: i64,
        changed: bool,
    ) -> Result<HistoryRecord, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::insert_into(monitoring_history::table)
            .values((
                monitoring_history::subscription_id.eq(subscription_id),
                monitoring_history::count.eq(count),
                monitoring_history::checked_at.eq(&now),
                monitoring_history::has_changed.eq(if changed { 1 } else { 0 }),
            ))
            .execute(&mut conn)
            .await?;

        let row = monitoring_history::table
            .filter(monitoring_history::subscription_id.eq(subscription_id))
            .order(monitoring_history::id.desc())
            .first::<HistoryRow>(&mut conn)
            .await?;

        Ok(HistoryRecord::from(row))
    }

    /// Latest accepted observation for a subscription, if any.
    pub async fn latest_for(
        &self,
        subscription_id: i64,
    ) -> Result<Option<HistoryRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        monitoring_history::table
            .filter(monitoring_history::subscription_id.eq(subscription_id))
            .order((
                monitoring_history::checked_at.desc(),
                monitoring_history::id.desc(),
            ))
            .first::<HistoryRow>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(HistoryRecord::from))
    }

    /// Most recent observations for a subscription, newest first.
    pub async fn recent_for(
        &self,
        subscription_id: i64,
        limit: i64,
    ) -> Result<Vec<HistoryRecord>, DieselError> {
        let mut conn = self.pool.get().await?;

        monitoring_history::table
            .filter(monitoring_history::subscription_id.eq(subscription_id))
            .order((
                monitoring_history::checked_at.desc(),
                monitoring_history::id.desc(),
            ))
            .limit(limit)
            .load::<HistoryRow>(&mut conn)
            .await
            .map(|rows| rows.into_iter().map(HistoryRecord::from).collect())
    }

    /// Retention sweep: delete observations older than the cutoff. Returns the
    /// number of rows removed.
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<usize, DieselError> {
        let mut conn = self.pool.get().await?;
        let cutoff = cutoff.to_rfc3339();

        diesel::delete(
            monitoring_history::table.filter(monitoring_history::checked_at.lt(cutoff)),
        )
        .execute(&mut conn)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use crate::repository::subscription::{NewSubscription, SubscriptionRepository};
    use tempfile::tempdir;

    async fn setup() -> (SubscriptionRepository, HistoryRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        migrations::run(&pool).await.unwrap();
        (
            SubscriptionRepository::new(pool.clone()),
            HistoryRepository::new(pool),
            dir,
        )
    }

    async fn create_subscription(subs: &SubscriptionRepository) -> i64 {
        subs.create(NewSubscription {
            user_id: 7,
            gift_name: "Plush Pepe".to_string(),
            model: None,
            background: None,
            pattern: None,
        })
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_append_and_latest_round_trip() {
        let (subs, history, _dir) = setup().await;
        let sub_id = create_subscription(&subs).await;

        assert!(history.latest_for(sub_id).await.unwrap().is_none());

        let written = history.append(sub_id, 7, true).await.unwrap();
        assert_eq!(written.count, 7);
        assert!(written.changed);

        let latest = history.latest_for(sub_id).await.unwrap().unwrap();
        assert_eq!(latest.count, 7);
        assert!(latest.changed);
        assert_eq!(latest.subscription_id, sub_id);
    }

    #[tokio::test]
    async fn test_latest_tracks_newest_row() {
        let (subs, history, _dir) = setup().await;
        let sub_id = create_subscription(&subs).await;

        history.append(sub_id, 5, false).await.unwrap();
        history.append(sub_id, 9, true).await.unwrap();
        history.append(sub_id, 9, false).await.unwrap();

        let latest = history.latest_for(sub_id).await.unwrap().unwrap();
        assert_eq!(latest.count, 9);
        assert!(!latest.changed);

        let recent = history.recent_for(sub_id, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].count, 9);
    }

    #[tokio::test]
    async fn test_prune_before_removes_old_rows() {
        let (subs, history, _dir) = setup().await;
        let sub_id = create_subscription(&subs).await;

        history.append(sub_id, 3, false).await.unwrap();

        // Nothing is older than a cutoff in the past.
        let removed = history
            .prune_before(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        // A future cutoff sweeps the row we just wrote.
        let removed = history
            .prune_before(Utc::now() + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(history.latest_for(sub_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cascade_delete_with_subscription() {
        let (subs, history, _dir) = setup().await;
        let sub_id = create_subscription(&subs).await;

        history.append(sub_id, 4, false).await.unwrap();
        subs.delete(sub_id).await.unwrap();

        assert!(history.latest_for(sub_id).await.unwrap().is_none());
    }
}
