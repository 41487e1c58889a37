//! Configuration management for giftwatch.
//!
//! Settings come from the environment (optionally via a `.env` file loaded in
//! `main`), with defaults matching the public peek.tg catalog.

use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "giftwatch.db";

/// Default catalog search page.
pub const DEFAULT_BASE_URL: &str = "https://peek.tg/search";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database URL (overrides data_dir/giftwatch.db if set).
    pub database_url: Option<String>,
    /// Catalog search page URL.
    pub base_url: String,
    /// Per-request page timeout.
    pub request_timeout: Duration,
    /// Extractor retry attempts per search.
    pub retry_attempts: u32,
    /// Delay between extractor retries.
    pub retry_delay: Duration,
    /// Run the browser headless.
    pub headless: bool,
    /// User agent presented by the browser.
    pub user_agent: String,
    /// Monitoring schedule expression (cron-style, see `schedule`).
    pub schedule: String,
    /// Delay between subscription checks within a cycle.
    pub check_delay: Duration,
    /// Stabilization delay before the confirmation read.
    pub confirm_delay: Duration,
    /// Count jitter tolerated between first and confirmation read.
    pub confirm_tolerance: i64,
    /// Upper bound on a believable gift count.
    pub max_reasonable_count: i64,
    /// Reads at or above baseline x ratio are treated as scraping artifacts.
    pub jump_ratio: i64,
    /// History rows older than this many days are pruned after cycles.
    pub history_retention_days: i64,
    /// Telegram bot token for notifications (required to dispatch).
    pub telegram_bot_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            database_url: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_millis(30_000),
            retry_attempts: 3,
            retry_delay: Duration::from_millis(2_000),
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            schedule: "*/15 * * * *".to_string(),
            check_delay: Duration::from_millis(1_000),
            confirm_delay: Duration::from_millis(1_500),
            confirm_tolerance: 1,
            max_reasonable_count: 1_000_000,
            jump_ratio: 100,
            history_retention_days: 30,
            telegram_bot_token: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment on top of the defaults.
    pub fn load() -> Self {
        let mut settings = Self::default();

        if let Some(dir) = env_string("GIFTWATCH_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        settings.database_url = env_string("DATABASE_URL");
        if let Some(url) = env_string("GIFTWATCH_BASE_URL") {
            settings.base_url = url;
        }
        if let Some(ms) = env_parsed("GIFTWATCH_TIMEOUT_MS") {
            settings.request_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parsed("GIFTWATCH_RETRY_ATTEMPTS") {
            settings.retry_attempts = attempts;
        }
        if let Some(ms) = env_parsed("GIFTWATCH_RETRY_DELAY_MS") {
            settings.retry_delay = Duration::from_millis(ms);
        }
        settings.headless = env_string("GIFTWATCH_HEADLESS").as_deref() != Some("false");
        if let Some(ua) = env_string("GIFTWATCH_USER_AGENT") {
            settings.user_agent = ua;
        }
        if let Some(expr) = env_string("GIFTWATCH_SCHEDULE") {
            settings.schedule = expr;
        }
        if let Some(ms) = env_parsed("GIFTWATCH_CHECK_DELAY_MS") {
            settings.check_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parsed("GIFTWATCH_CONFIRM_DELAY_MS") {
            settings.confirm_delay = Duration::from_millis(ms);
        }
        if let Some(tolerance) = env_parsed("GIFTWATCH_CONFIRM_TOLERANCE") {
            settings.confirm_tolerance = tolerance;
        }
        if let Some(max) = env_parsed("GIFTWATCH_MAX_COUNT") {
            settings.max_reasonable_count = max;
        }
        if let Some(ratio) = env_parsed("GIFTWATCH_JUMP_RATIO") {
            settings.jump_ratio = ratio;
        }
        if let Some(days) = env_parsed("GIFTWATCH_HISTORY_RETENTION_DAYS") {
            settings.history_retention_days = days;
        }
        settings.telegram_bot_token = env_string("TELEGRAM_BOT_TOKEN");

        settings
    }

    /// Get the database URL, constructing from the data dir if not set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            let path = self.data_dir.join(DEFAULT_DATABASE_FILENAME);
            format!("sqlite:{}", path.display())
        }
    }

    /// Get the full path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DEFAULT_DATABASE_FILENAME)
    }

    /// Check if the database appears to be initialized.
    pub fn database_exists(&self) -> bool {
        if self.database_url.is_some() {
            true
        } else {
            self.database_path().exists()
        }
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    match env_string(key) {
        Some(raw) => match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={}", key, raw);
                None
            }
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.base_url, "https://peek.tg/search");
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_delay, Duration::from_millis(2_000));
        assert_eq!(settings.confirm_tolerance, 1);
        assert_eq!(settings.jump_ratio, 100);
        assert_eq!(settings.max_reasonable_count, 1_000_000);
        assert!(settings.headless);
    }

    #[test]
    fn database_url_built_from_data_dir() {
        let settings = Settings {
            data_dir: PathBuf::from("/tmp/gw"),
            ..Default::default()
        };
        assert_eq!(settings.database_url(), "sqlite:/tmp/gw/giftwatch.db");
    }

    #[test]
    fn explicit_database_url_wins() {
        let settings = Settings {
            database_url: Some("sqlite:/elsewhere/db.sqlite".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.database_url(), "sqlite:/elsewhere/db.sqlite");
        assert!(settings.database_exists());
    }
}
