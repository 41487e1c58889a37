//! Monitoring scheduler.
//!
//! Drives full check cycles over all active subscriptions on a recurring
//! timer. A cycle tolerates individual subscription and notification
//! failures; only failing to load the subscription list fails the cycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::notify;
use super::search::{ChangeOutcome, SearchService};
use crate::config::Settings;
use crate::models::{MonitoringStats, Subscription};
use crate::repository::{HistoryRepository, SubscriptionRepository};
use crate::schedule::{Schedule, ScheduleError};
use crate::telegram::Messenger;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub schedule: Schedule,
    /// Delay between subscription checks within a cycle.
    pub check_delay: Duration,
    /// Delay between outbound notifications.
    pub notify_delay: Duration,
    /// History rows older than this are pruned after successful cycles.
    pub history_retention: chrono::Duration,
}

impl MonitorConfig {
    pub fn from_settings(settings: &Settings, schedule: Schedule) -> Self {
        Self {
            schedule,
            check_delay: settings.check_delay,
            notify_delay: Duration::from_millis(1_000),
            history_retention: chrono::Duration::days(settings.history_retention_days),
        }
    }
}

struct Runner {
    shutdown: watch::Sender<bool>,
}

/// Recurring monitoring scheduler over the reliability-checked search
/// service.
pub struct MonitorService {
    subscriptions: SubscriptionRepository,
    history: HistoryRepository,
    search: Arc<SearchService>,
    messenger: Arc<dyn Messenger>,
    check_delay: Duration,
    notify_delay: Duration,
    history_retention: chrono::Duration,
    schedule: StdMutex<Schedule>,
    stats: StdMutex<MonitoringStats>,
    /// Live stats displays: chat id -> message id being edited in place.
    displays: StdMutex<HashMap<i64, i64>>,
    /// Held for the duration of a cycle; a tick firing mid-cycle is skipped
    /// instead of overlapping.
    cycle_lock: tokio::sync::Mutex<()>,
    runner: StdMutex<Option<Runner>>,
}

impl MonitorService {
    pub fn new(
        subscriptions: SubscriptionRepository,
        history: HistoryRepository,
        search: Arc<SearchService>,
        messenger: Arc<dyn Messenger>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            subscriptions,
            history,
            search,
            messenger,
            check_delay: config.check_delay,
            notify_delay: config.notify_delay,
            history_retention: config.history_retention,
            schedule: StdMutex::new(config.schedule),
            stats: StdMutex::new(MonitoringStats::default()),
            displays: StdMutex::new(HashMap::new()),
            cycle_lock: tokio::sync::Mutex::new(()),
            runner: StdMutex::new(None),
        }
    }

    /// Start the recurring timer. Idempotent while running.
    pub fn start(self: Arc<Self>) {
        let mut runner = lock(&self.runner);
        if runner.is_some() {
            warn!("Monitoring already running");
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let service = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                let period = service.current_schedule().period();
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        service.run_cycle().await;
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        *runner = Some(Runner {
            shutdown: shutdown_tx,
        });
        lock(&self.stats).is_running = true;
        info!("Monitoring started ({})", self.current_schedule());
    }

    /// Cancel the recurring timer. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        let runner = lock(&self.runner).take();
        match runner {
            Some(runner) => {
                let _ = runner.shutdown.send(true);
                lock(&self.stats).is_running = false;
                lock(&self.displays).clear();
                info!("Monitoring stopped");
            }
            None => debug!("Monitoring not running"),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.runner).is_some()
    }

    /// Snapshot of the cycle counters.
    pub fn stats(&self) -> MonitoringStats {
        lock(&self.stats).clone()
    }

    /// Replace the schedule; takes effect on the next tick.
    pub fn update_schedule(&self, expression: &str) -> Result<(), ScheduleError> {
        let schedule = Schedule::parse(expression)?;
        *lock(&self.schedule) = schedule;
        info!("Monitoring schedule updated ({})", schedule);
        Ok(())
    }

    pub fn current_schedule(&self) -> Schedule {
        *lock(&self.schedule)
    }

    /// Register a message to keep edited with fresh stats after each cycle.
    pub fn register_stats_display(&self, user_id: i64, message_id: i64) {
        lock(&self.displays).insert(user_id, message_id);
    }

    pub fn unregister_stats_display(&self, user_id: i64) {
        lock(&self.displays).remove(&user_id);
    }

    /// Run one cycle immediately, outside the timer.
    pub async fn run_cycle_now(&self) {
        self.run_cycle().await;
    }

    async fn run_cycle(&self) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            warn!("Previous monitoring cycle still running, skipping this tick");
            return;
        };

        info!("Starting monitoring cycle");
        {
            let mut stats = lock(&self.stats);
            stats.total_checks += 1;
            stats.last_check = Some(Utc::now());
        }

        let subscriptions = match self.subscriptions.list_active().await {
            Ok(subs) => subs,
            Err(e) => {
                error!("Failed to load active subscriptions: {}", e);
                lock(&self.stats).failed_checks += 1;
                return;
            }
        };

        if subscriptions.is_empty() {
            debug!("No active subscriptions to monitor");
            lock(&self.stats).successful_checks += 1;
            self.push_stats_displays().await;
            return;
        }

        info!("Checking {} active subscriptions", subscriptions.len());
        let outcomes = self.check_all(&subscriptions).await;
        let changed: Vec<(Subscription, ChangeOutcome)> =
            outcomes.into_iter().filter(|(_, o)| o.changed).collect();

        self.dispatch_notifications(&changed).await;

        lock(&self.stats).successful_checks += 1;
        info!(
            "Monitoring cycle complete: {} of {} subscriptions changed",
            changed.len(),
            subscriptions.len()
        );

        self.push_stats_displays().await;
        self.prune_history().await;
    }

    /// Check every subscription sequentially. A failed check never aborts the
    /// cycle; the inter-check delay keeps the scrape rate polite.
    async fn check_all(
        &self,
        subscriptions: &[Subscription],
    ) -> Vec<(Subscription, ChangeOutcome)> {
        let mut outcomes = Vec::with_capacity(subscriptions.len());

        for subscription in subscriptions {
            debug!(
                "Checking subscription {} ({})",
                subscription.id,
                subscription.label()
            );
            match self.search.check_subscription_change(subscription).await {
                Ok(outcome) => {
                    if outcome.changed {
                        info!(
                            "Change detected: {} - {} -> {}",
                            subscription.label(),
                            outcome.old_count,
                            outcome.new_count
                        );
                        lock(&self.stats).total_changes += 1;
                    }
                    outcomes.push((subscription.clone(), outcome));
                }
                Err(e) => {
                    error!("Check failed for subscription {}: {}", subscription.id, e);
                }
            }
            tokio::time::sleep(self.check_delay).await;
        }

        outcomes
    }

    async fn dispatch_notifications(&self, changed: &[(Subscription, ChangeOutcome)]) {
        if changed.is_empty() {
            debug!("No changes to notify");
            return;
        }

        info!("Dispatching {} change notifications", changed.len());
        let mut sent = 0usize;
        let mut failed = 0usize;

        for (subscription, outcome) in changed {
            // The deep link is only worth a browser round trip once a change
            // is confirmed; failures degrade to a link-less notification.
            let gift_link = match self.search.latest_gift_link(subscription).await {
                Ok(link) => link,
                Err(e) => {
                    warn!(
                        "Could not fetch gift link for subscription {}: {}",
                        subscription.id, e
                    );
                    None
                }
            };

            let text = notify::format_change_notification(
                subscription,
                outcome.old_count,
                outcome.new_count,
                gift_link.as_deref(),
            );

            match self.messenger.send_message(subscription.user_id, &text).await {
                Ok(_) => sent += 1,
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Another bot instance holds the session, skipping notification for subscription {}",
                        subscription.id
                    );
                }
                Err(e) => {
                    failed += 1;
                    error!(
                        "Notification for subscription {} failed: {}",
                        subscription.id, e
                    );
                }
            }
            tokio::time::sleep(self.notify_delay).await;
        }

        info!("Notifications dispatched: {} sent, {} failed", sent, failed);
    }

    /// Push fresh stats into registered displays, dropping any display that
    /// can no longer be edited.
    async fn push_stats_displays(&self) {
        let displays: Vec<(i64, i64)> = lock(&self.displays)
            .iter()
            .map(|(user, message)| (*user, *message))
            .collect();
        if displays.is_empty() {
            return;
        }

        let text = notify::format_stats(&self.stats());
        for (user_id, message_id) in displays {
            if let Err(e) = self
                .messenger
                .edit_message(user_id, message_id, &text)
                .await
            {
                warn!("Dropping stats display for user {}: {}", user_id, e);
                lock(&self.displays).remove(&user_id);
            }
        }
    }

    async fn prune_history(&self) {
        let cutoff = Utc::now() - self.history_retention;
        match self.history.prune_before(cutoff).await {
            Ok(0) => {}
            Ok(removed) => debug!("Pruned {} old history rows", removed),
            Err(e) => warn!("History retention sweep failed: {}", e),
        }
    }
}

/// Poison-proof lock helper; these mutexes only guard plain data.
fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchResult;
    use crate::repository::migrations;
    use crate::repository::subscription::NewSubscription;
    use crate::repository::AsyncSqlitePool;
    use crate::scrapers::ExtractionError;
    use crate::services::search::ReliabilityConfig;
    use crate::services::testing::{result_with_items, RecordingMessenger, ScriptedBackend};
    use tempfile::tempdir;

    fn reliability() -> ReliabilityConfig {
        ReliabilityConfig {
            retry_attempts: 1,
            retry_delay: Duration::ZERO,
            confirm_delay: Duration::ZERO,
            confirm_tolerance: 1,
            max_reasonable_count: 1_000_000,
            jump_ratio: 100,
        }
    }

    fn monitor_config() -> MonitorConfig {
        MonitorConfig {
            schedule: Schedule::parse("*/15 * * * *").unwrap(),
            check_delay: Duration::ZERO,
            notify_delay: Duration::ZERO,
            history_retention: chrono::Duration::days(30),
        }
    }

    struct Fixture {
        monitor: Arc<MonitorService>,
        messenger: Arc<RecordingMessenger>,
        subscriptions: SubscriptionRepository,
        history: HistoryRepository,
        _dir: tempfile::TempDir,
    }

    async fn fixture_with(
        responses: Vec<Result<SearchResult, ExtractionError>>,
        backend_delay: Duration,
        messenger: RecordingMessenger,
    ) -> Fixture {
        let dir = tempdir().unwrap();
        let pool = AsyncSqlitePool::from_path(&dir.path().join("test.db"));
        migrations::run(&pool).await.unwrap();

        let subscriptions = SubscriptionRepository::new(pool.clone());
        let history = HistoryRepository::new(pool);

        let mut backend = ScriptedBackend::new(responses);
        backend.delay = backend_delay;
        let search = Arc::new(SearchService::new(
            Arc::new(backend),
            history.clone(),
            reliability(),
        ));

        let messenger = Arc::new(messenger);
        let monitor = Arc::new(MonitorService::new(
            subscriptions.clone(),
            history.clone(),
            search,
            messenger.clone(),
            monitor_config(),
        ));

        Fixture {
            monitor,
            messenger,
            subscriptions,
            history,
            _dir: dir,
        }
    }

    async fn fixture(responses: Vec<Result<SearchResult, ExtractionError>>) -> Fixture {
        fixture_with(responses, Duration::ZERO, RecordingMessenger::default()).await
    }

    async fn add_subscription(fx: &Fixture, user_id: i64, gift_name: &str) -> Subscription {
        fx.subscriptions
            .create(NewSubscription {
                user_id,
                gift_name: gift_name.to_string(),
                model: None,
                background: None,
                pattern: None,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn confirmed_change_notifies_and_persists() {
        // First read 9, confirmation read 9.
        let fx = fixture(vec![
            Ok(result_with_items(9, 5)),
            Ok(result_with_items(9, 5)),
        ])
        .await;
        let sub = add_subscription(&fx, 42, "Plush Pepe").await;
        fx.history.append(sub.id, 5, false).await.unwrap();

        fx.monitor.run_cycle_now().await;

        let sent = fx.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
        assert!(sent[0].1.contains("*5* → *9*"));
        assert!(sent[0].1.contains("t.me/nft/"));

        let latest = fx.history.latest_for(sub.id).await.unwrap().unwrap();
        assert_eq!(latest.count, 9);
        assert!(latest.changed);

        let stats = fx.monitor.stats();
        assert_eq!(stats.total_checks, 1);
        assert_eq!(stats.successful_checks, 1);
        assert_eq!(stats.total_changes, 1);
        assert!(stats.last_check.is_some());
    }

    #[tokio::test]
    async fn implausible_jump_sends_nothing_and_keeps_baseline() {
        let fx = fixture(vec![Ok(result_with_items(500, 5))]).await;
        let sub = add_subscription(&fx, 42, "Plush Pepe").await;
        fx.history.append(sub.id, 5, false).await.unwrap();

        fx.monitor.run_cycle_now().await;

        assert!(fx.messenger.sent.lock().unwrap().is_empty());
        let latest = fx.history.latest_for(sub.id).await.unwrap().unwrap();
        assert_eq!(latest.count, 5);

        let stats = fx.monitor.stats();
        assert_eq!(stats.successful_checks, 1);
        assert_eq!(stats.total_changes, 0);
    }

    #[tokio::test]
    async fn failed_subscription_does_not_abort_cycle() {
        // sub1: 3 confirmed; sub2: extractor error; sub3: 7 confirmed.
        let fx = fixture(vec![
            Ok(result_with_items(3, 3)),
            Ok(result_with_items(3, 3)),
            Err(ExtractionError::search("selector miss")),
            Ok(result_with_items(7, 7)),
            Ok(result_with_items(7, 7)),
        ])
        .await;
        let _sub1 = add_subscription(&fx, 1, "Lol Pop").await;
        let sub2 = add_subscription(&fx, 2, "Desk Calendar").await;
        let sub3 = add_subscription(&fx, 3, "Plush Pepe").await;

        fx.monitor.run_cycle_now().await;

        // The third subscription was still processed and notified.
        let sent = fx.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().any(|(chat, _)| *chat == 3));

        let latest = fx.history.latest_for(sub3.id).await.unwrap().unwrap();
        assert_eq!(latest.count, 7);
        assert!(fx.history.latest_for(sub2.id).await.unwrap().is_none());

        let stats = fx.monitor.stats();
        assert_eq!(stats.successful_checks, 1);
        assert_eq!(stats.total_changes, 2);
    }

    #[tokio::test]
    async fn conflict_dispatch_is_skipped_not_fatal() {
        let messenger = RecordingMessenger {
            conflict_chats: vec![1],
            ..Default::default()
        };
        let fx = fixture_with(
            vec![
                Ok(result_with_items(3, 3)),
                Ok(result_with_items(3, 3)),
                Ok(result_with_items(7, 7)),
                Ok(result_with_items(7, 7)),
            ],
            Duration::ZERO,
            messenger,
        )
        .await;
        add_subscription(&fx, 1, "Lol Pop").await;
        add_subscription(&fx, 2, "Plush Pepe").await;

        fx.monitor.run_cycle_now().await;

        // Chat 1 conflicts and is skipped; chat 2 still gets its message.
        let sent = fx.messenger.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
        assert_eq!(fx.monitor.stats().successful_checks, 1);
    }

    #[tokio::test]
    async fn empty_subscription_list_is_a_successful_cycle() {
        let fx = fixture(vec![]).await;

        fx.monitor.run_cycle_now().await;

        let stats = fx.monitor.stats();
        assert_eq!(stats.total_checks, 1);
        assert_eq!(stats.successful_checks, 1);
        assert_eq!(stats.failed_checks, 0);
    }

    #[tokio::test]
    async fn stats_snapshot_is_idempotent_between_cycles() {
        let fx = fixture(vec![Ok(result_with_items(0, 0))]).await;
        add_subscription(&fx, 1, "Lol Pop").await;

        fx.monitor.run_cycle_now().await;
        let first = fx.monitor.stats();
        let second = fx.monitor.stats();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn overlapping_cycles_are_skipped() {
        let fx = fixture_with(
            vec![
                Ok(result_with_items(0, 0)),
                Ok(result_with_items(0, 0)),
            ],
            Duration::from_millis(100),
            RecordingMessenger::default(),
        )
        .await;
        add_subscription(&fx, 1, "Lol Pop").await;

        tokio::join!(fx.monitor.run_cycle_now(), fx.monitor.run_cycle_now());

        // The second invocation found a cycle in flight and skipped.
        assert_eq!(fx.monitor.stats().total_checks, 1);
    }

    #[tokio::test]
    async fn failing_stats_display_is_dropped() {
        let messenger = RecordingMessenger {
            failing_edit_chats: vec![9],
            ..Default::default()
        };
        let fx = fixture_with(
            vec![Ok(result_with_items(0, 0)), Ok(result_with_items(0, 0))],
            Duration::ZERO,
            messenger,
        )
        .await;
        add_subscription(&fx, 1, "Lol Pop").await;

        fx.monitor.register_stats_display(8, 100);
        fx.monitor.register_stats_display(9, 200);

        fx.monitor.run_cycle_now().await;
        fx.monitor.run_cycle_now().await;

        // User 8 got both pushes, user 9 was dropped after the first failure.
        let edited = fx.messenger.edited.lock().unwrap();
        assert_eq!(edited.iter().filter(|(chat, _, _)| *chat == 8).count(), 2);
        assert!(edited.iter().all(|(chat, _, _)| *chat != 9));
    }

    #[tokio::test]
    async fn update_schedule_validates_expressions() {
        let fx = fixture(vec![]).await;

        assert!(fx.monitor.update_schedule("*/5 * * * *").is_ok());
        assert_eq!(
            fx.monitor.current_schedule().period(),
            Duration::from_secs(300)
        );
        assert!(fx.monitor.update_schedule("not a schedule").is_err());
        // The bad expression left the previous schedule in place.
        assert_eq!(
            fx.monitor.current_schedule().period(),
            Duration::from_secs(300)
        );
    }

    #[tokio::test]
    async fn start_and_stop_toggle_running_state() {
        let fx = fixture(vec![]).await;

        assert!(!fx.monitor.is_running());
        fx.monitor.clone().start();
        assert!(fx.monitor.is_running());
        assert!(fx.monitor.stats().is_running);

        // Second start is a no-op.
        fx.monitor.clone().start();
        assert!(fx.monitor.is_running());

        fx.monitor.stop();
        assert!(!fx.monitor.is_running());
        assert!(!fx.monitor.stats().is_running);
    }
}
