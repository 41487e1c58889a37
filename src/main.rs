//! giftwatch - Telegram gift catalog monitoring service.
//!
//! Watches the peek.tg gift catalog for count changes on user-defined filter
//! subscriptions and notifies subscribers over Telegram.

mod cli;
mod config;
mod models;
mod repository;
mod schedule;
mod schema;
mod scrapers;
mod services;
mod telegram;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "giftwatch=info"
    } else {
        "giftwatch=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}
