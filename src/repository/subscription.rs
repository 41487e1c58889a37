//! Subscription repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::SubscriptionRecord;
use super::pool::{AsyncSqlitePool, DieselError};
use crate::models::Subscription;
use crate::schema::subscriptions;

/// Fields for creating a new subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: i64,
    pub gift_name: String,
    pub model: Option<String>,
    pub background: Option<String>,
    pub pattern: Option<String>,
}

/// Diesel-based subscription repository.
#[derive(Clone)]
pub struct SubscriptionRepository {
    pool: AsyncSqlitePool,
}

impl SubscriptionRepository {
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new active subscription and return it.
    pub async fn create(&self, new: NewSubscription) -> Result<Subscription, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        diesel::insert_into(subscriptions::table)
            .values((
                subscriptions::user_id.eq(new.user_id),
                subscriptions::gift_name.eq(&new.gift_name),
                subscriptions::model.eq(&new.model),
                subscriptions::background.eq(&new.background),
                subscriptions::pattern.eq(&new.pattern),
                subscriptions::is_active.eq(1),
                subscriptions::created_at.eq(&now),
                subscriptions::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        let record = subscriptions::table
            .order(subscriptions::id.desc())
            .first::<SubscriptionRecord>(&mut conn)
            .await?;

        Ok(Subscription::from(record))
    }

    /// Get a subscription by ID.
    pub async fn get(&self, id: i64) -> Result<Option<Subscription>, DieselError> {
        let mut conn = self.pool.get().await?;

        subscriptions::table
            .find(id)
            .first::<SubscriptionRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Subscription::from))
    }

    /// Get all active subscriptions, oldest first.
    pub async fn list_active(&self) -> Result<Vec<Subscription>, DieselError> {
        let mut conn = self.pool.get().await?;

        subscriptions::table
            .filter(subscriptions::is_active.eq(1))
            .order(subscriptions::id.asc())
            .load::<SubscriptionRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(Subscription::from).collect())
    }

    /// Get all subscriptions belonging to a user.
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Subscription>, DieselError> {
        let mut conn = self.pool.get().await?;

        subscriptions::table
            .filter(subscriptions::user_id.eq(user_id))
            .order(subscriptions::id.asc())
            .load::<SubscriptionRecord>(&mut conn)
            .await
            .map(|records| records.into_iter().map(Subscription::from).collect())
    }

    /// Enable or disable a subscription.
    pub async fn set_active(&self, id: i64, active: bool) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now().to_rfc3339();

        let rows = diesel::update(subscriptions::table.find(id))
            .set((
                subscriptions::is_active.eq(if active { 1 } else { 0 }),
                subscriptions::updated_at.eq(&now),
            ))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    /// Delete a subscription. History rows go with it via FK cascade.
    pub async fn delete(&self, id: i64) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        let rows = diesel::delete(subscriptions::table.find(id))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use tempfile::tempdir;

    async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        migrations::run(&pool).await.unwrap();
        (pool, dir)
    }

    fn new_subscription(user_id: i64, gift_name: &str) -> NewSubscription {
        NewSubscription {
            user_id,
            gift_name: gift_name.to_string(),
            model: None,
            background: None,
            pattern: None,
        }
    }

    #[tokio::test]
    async fn test_subscription_crud() {
        let (pool, _dir) = setup_test_db().await;
        let repo = SubscriptionRepository::new(pool);

        let created = repo
            .create(NewSubscription {
                model: Some("Golden".to_string()),
                ..new_subscription(42, "Plush Pepe")
            })
            .await
            .unwrap();
        assert!(created.is_active);
        assert_eq!(created.gift_name, "Plush Pepe");

        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.user_id, 42);
        assert_eq!(fetched.model.as_deref(), Some("Golden"));

        assert!(repo.set_active(created.id, false).await.unwrap());
        assert!(!repo.get(created.id).await.unwrap().unwrap().is_active);

        assert!(repo.delete(created.id).await.unwrap());
        assert!(repo.get(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_active_skips_disabled() {
        let (pool, _dir) = setup_test_db().await;
        let repo = SubscriptionRepository::new(pool);

        let first = repo.create(new_subscription(1, "Lol Pop")).await.unwrap();
        let second = repo.create(new_subscription(1, "Desk Calendar")).await.unwrap();
        repo.set_active(second.id, false).await.unwrap();

        let active = repo.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);

        let all = repo.list_by_user(1).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_subscription_updates_return_false() {
        let (pool, _dir) = setup_test_db().await;
        let repo = SubscriptionRepository::new(pool);

        assert!(!repo.set_active(999, true).await.unwrap());
        assert!(!repo.delete(999).await.unwrap());
    }
}
