//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use console::style;

use crate::config::Settings;
use crate::models::SearchCriteria;
use crate::repository::subscription::NewSubscription;
use crate::repository::{migrations, AsyncSqlitePool, HistoryRepository, SubscriptionRepository};
use crate::schedule::Schedule;
use crate::scrapers::{CatalogExtractor, ExtractorConfig, SearchBackend};
use crate::services::{MonitorConfig, MonitorService, ReliabilityConfig, SearchService};
use crate::telegram::{Messenger, TelegramClient};

#[derive(Parser)]
#[command(name = "giftwatch")]
#[command(about = "Telegram gift catalog monitoring and notification service")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true, env = "GIFTWATCH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Run the monitoring scheduler until interrupted
    Watch,

    /// Run a single monitoring cycle immediately
    Check,

    /// Run an ad-hoc catalog search
    Search {
        /// Gift name to search for
        gift_name: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        background: Option<String>,
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Fetch the deep link of the most recently listed matching gift
    Link {
        /// Gift name to search for
        gift_name: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        background: Option<String>,
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Manage subscriptions
    Sub {
        #[command(subcommand)]
        command: SubCommands,
    },

    /// Show recent monitoring history for a subscription
    History {
        subscription_id: i64,
        /// Number of rows to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum SubCommands {
    /// Add a subscription for a user
    Add {
        /// Telegram chat id to notify
        user_id: i64,
        /// Gift name to monitor
        gift_name: String,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        background: Option<String>,
        #[arg(long)]
        pattern: Option<String>,
    },
    /// List subscriptions for a user
    List { user_id: i64 },
    /// Re-enable a disabled subscription
    Enable { id: i64 },
    /// Disable a subscription without deleting its history
    Disable { id: i64 },
    /// Remove a subscription and its history
    Remove { id: i64 },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Watch => cmd_watch(&settings).await,
        Commands::Check => cmd_check(&settings).await,
        Commands::Search {
            gift_name,
            model,
            background,
            pattern,
        } => {
            let criteria = SearchCriteria {
                gift_name,
                model,
                background,
                pattern,
            };
            cmd_search(&settings, criteria).await
        }
        Commands::Link {
            gift_name,
            model,
            background,
            pattern,
        } => {
            let criteria = SearchCriteria {
                gift_name,
                model,
                background,
                pattern,
            };
            cmd_link(&settings, criteria).await
        }
        Commands::Sub { command } => cmd_sub(&settings, command).await,
        Commands::History {
            subscription_id,
            limit,
        } => cmd_history(&settings, subscription_id, limit).await,
    }
}

async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings
        .ensure_directories()
        .context("Failed to create data directory")?;

    let pool = AsyncSqlitePool::new(&settings.database_url());
    migrations::run(&pool)
        .await
        .context("Failed to apply database schema")?;

    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        settings.database_url()
    );
    Ok(())
}

/// Open the database, refusing politely when init has not been run.
fn open_pool(settings: &Settings) -> anyhow::Result<AsyncSqlitePool> {
    if !settings.database_exists() {
        bail!(
            "Database not found at {}. Run 'giftwatch init' first.",
            settings.database_path().display()
        );
    }
    Ok(AsyncSqlitePool::new(&settings.database_url()))
}

fn build_extractor(settings: &Settings) -> Arc<CatalogExtractor> {
    Arc::new(CatalogExtractor::new(ExtractorConfig::from(settings)))
}

fn build_messenger(settings: &Settings) -> anyhow::Result<Arc<dyn Messenger>> {
    let token = settings
        .telegram_bot_token
        .as_deref()
        .context("TELEGRAM_BOT_TOKEN is not set; notifications cannot be dispatched")?;
    Ok(Arc::new(TelegramClient::new(token)?))
}

fn build_monitor(
    settings: &Settings,
    pool: AsyncSqlitePool,
    extractor: Arc<CatalogExtractor>,
) -> anyhow::Result<Arc<MonitorService>> {
    let schedule = Schedule::parse(&settings.schedule)
        .with_context(|| format!("Invalid GIFTWATCH_SCHEDULE '{}'", settings.schedule))?;

    let backend: Arc<dyn SearchBackend> = extractor;
    let history = HistoryRepository::new(pool.clone());
    let search = Arc::new(SearchService::new(
        backend,
        history.clone(),
        ReliabilityConfig::from(settings),
    ));

    Ok(Arc::new(MonitorService::new(
        SubscriptionRepository::new(pool),
        history,
        search,
        build_messenger(settings)?,
        MonitorConfig::from_settings(settings, schedule),
    )))
}

async fn cmd_watch(settings: &Settings) -> anyhow::Result<()> {
    let pool = open_pool(settings)?;
    let extractor = build_extractor(settings);
    let monitor = build_monitor(settings, pool, extractor.clone())?;

    monitor.clone().start();
    println!(
        "{} Monitoring started ({}), press Ctrl-C to stop",
        style("→").cyan(),
        monitor.current_schedule()
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    println!("\n{} Stopping...", style("→").dim());
    monitor.stop();
    extractor.shutdown().await;

    let stats = monitor.stats();
    println!(
        "{} {} cycles run, {} changes detected",
        style("✓").green(),
        stats.total_checks,
        stats.total_changes
    );
    Ok(())
}

async fn cmd_check(settings: &Settings) -> anyhow::Result<()> {
    let pool = open_pool(settings)?;
    let extractor = build_extractor(settings);
    let monitor = build_monitor(settings, pool, extractor.clone())?;

    monitor.run_cycle_now().await;
    extractor.shutdown().await;

    let stats = monitor.stats();
    if stats.failed_checks > 0 {
        println!("{} Cycle failed", style("✗").red());
    } else {
        println!(
            "{} Cycle complete, {} changes detected",
            style("✓").green(),
            stats.total_changes
        );
    }
    Ok(())
}

async fn cmd_search(settings: &Settings, criteria: SearchCriteria) -> anyhow::Result<()> {
    let extractor = build_extractor(settings);
    let service = search_only_service(settings, &extractor)?;

    let result = service.search_with_retry(&criteria).await?;
    let stats = extractor.stats();
    extractor.shutdown().await;

    println!(
        "{} Found {} gifts matching {}",
        style("✓").green(),
        style(result.count).bold(),
        criteria.gift_name
    );
    for item in &result.items {
        let rarity = item
            .rarity
            .as_deref()
            .map(|r| format!(" ({})", r))
            .unwrap_or_default();
        println!("  - {}{}", item.name, rarity);
    }
    println!(
        "{} {} request(s), {:.0}ms average",
        style("→").dim(),
        stats.total_requests,
        stats.average_response_ms
    );
    Ok(())
}

async fn cmd_link(settings: &Settings, criteria: SearchCriteria) -> anyhow::Result<()> {
    let extractor = build_extractor(settings);

    let link = extractor.latest_gift_link(&criteria).await?;
    extractor.shutdown().await;

    match link {
        Some(link) => println!("{} {}", style("✓").green(), link),
        None => println!("{} No gift link found", style("!").yellow()),
    }
    Ok(())
}

/// A search service without storage side effects, for ad-hoc commands.
///
/// The history repository still needs a database; ad-hoc searches never write
/// to it, so an in-memory one keeps `search` usable before `init`.
fn search_only_service(
    settings: &Settings,
    extractor: &Arc<CatalogExtractor>,
) -> anyhow::Result<SearchService> {
    let backend: Arc<dyn SearchBackend> = extractor.clone();
    let pool = AsyncSqlitePool::new(":memory:");
    Ok(SearchService::new(
        backend,
        HistoryRepository::new(pool),
        ReliabilityConfig::from(settings),
    ))
}

async fn cmd_sub(settings: &Settings, command: SubCommands) -> anyhow::Result<()> {
    let pool = open_pool(settings)?;
    let repo = SubscriptionRepository::new(pool);

    match command {
        SubCommands::Add {
            user_id,
            gift_name,
            model,
            background,
            pattern,
        } => {
            let subscription = repo
                .create(NewSubscription {
                    user_id,
                    gift_name,
                    model,
                    background,
                    pattern,
                })
                .await?;
            println!(
                "{} Subscription {} added: {}",
                style("✓").green(),
                subscription.id,
                subscription.label()
            );
        }
        SubCommands::List { user_id } => {
            let subscriptions = repo.list_by_user(user_id).await?;
            if subscriptions.is_empty() {
                println!("{} No subscriptions for user {}", style("!").yellow(), user_id);
            }
            for sub in subscriptions {
                let status = if sub.is_active {
                    style("active").green()
                } else {
                    style("disabled").dim()
                };
                let mut filters = Vec::new();
                if let Some(ref model) = sub.model {
                    filters.push(format!("model={}", model));
                }
                if let Some(ref background) = sub.background {
                    filters.push(format!("background={}", background));
                }
                if let Some(ref pattern) = sub.pattern {
                    filters.push(format!("pattern={}", pattern));
                }
                let filters = if filters.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", filters.join(", "))
                };
                println!("  {} {} {}{}", sub.id, status, sub.gift_name, filters);
            }
        }
        SubCommands::Enable { id } => {
            if repo.set_active(id, true).await? {
                println!("{} Subscription {} enabled", style("✓").green(), id);
            } else {
                bail!("Subscription {} not found", id);
            }
        }
        SubCommands::Disable { id } => {
            if repo.set_active(id, false).await? {
                println!("{} Subscription {} disabled", style("✓").green(), id);
            } else {
                bail!("Subscription {} not found", id);
            }
        }
        SubCommands::Remove { id } => {
            if repo.delete(id).await? {
                println!("{} Subscription {} removed", style("✓").green(), id);
            } else {
                bail!("Subscription {} not found", id);
            }
        }
    }
    Ok(())
}

async fn cmd_history(
    settings: &Settings,
    subscription_id: i64,
    limit: i64,
) -> anyhow::Result<()> {
    let pool = open_pool(settings)?;
    let repo = HistoryRepository::new(pool);

    let records = repo.recent_for(subscription_id, limit).await?;
    if records.is_empty() {
        println!(
            "{} No history for subscription {}",
            style("!").yellow(),
            subscription_id
        );
        return Ok(());
    }

    for record in records {
        let marker = if record.changed {
            style("changed").yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {}  count={:<8} {}",
            record.checked_at.format("%Y-%m-%d %H:%M:%S"),
            record.count,
            marker
        );
    }
    Ok(())
}
