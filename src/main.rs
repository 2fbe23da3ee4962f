use clap::Parser;
use pokemon_tcg_crawler::{
    notify::{Channel, LogChannel, Notifier, TelegramChannel},
    pokemon::{TcgCrawler, TcgData},
    run_crawler, CrawlSettings, CrawlerError, HttpFetcher, StatsSnapshot,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

const SPIDER_NAME: &str = "tcg";

/// Crawls the Pokémon TCG card database into a SQLite file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Number of search result pages to walk
    #[arg(long, env = "TCG_PAGES", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..))]
    pages: u32,

    /// SQLite file the cards are written to
    #[arg(long, env = "TCG_DATABASE", default_value = "tcg.db")]
    database: String,

    /// Prefix of the table names
    #[arg(long, default_value = SPIDER_NAME)]
    table_prefix: String,

    /// Maximum requests in flight
    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Minimum delay between two requests, in milliseconds
    #[arg(long, default_value_t = 200)]
    delay_ms: u64,

    /// Seconds between periodic notifications, 0 disables them
    #[arg(long, default_value_t = 600)]
    tick_secs: u64,

    /// Item count below which the run is reported as failed
    #[arg(long, default_value_t = 1)]
    min_items: u64,

    /// Error count above which the run is reported as failed
    #[arg(long, default_value_t = 0)]
    max_errors: u64,

    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Chat ids, comma separated
    #[arg(long, env = "TELEGRAM_RECIPIENTS", value_delimiter = ',')]
    telegram_recipients: Vec<String>,

    #[arg(long, default_value = concat!("pokemon-tcg-crawler/", env!("CARGO_PKG_VERSION")))]
    user_agent: String,
}

async fn crawl<C: Channel + Sync>(cli: &Cli, channel: C) -> Result<StatsSnapshot, CrawlerError> {
    let storage = TcgData::new(&cli.database, &cli.table_prefix).await?;
    let fetcher = HttpFetcher::new(&cli.user_agent, Duration::from_millis(cli.delay_ms))?;
    let notifier = Notifier::new(SPIDER_NAME, channel, cli.min_items, cli.max_errors);
    let settings = CrawlSettings {
        concurrency: cli.concurrency,
        tick: (cli.tick_secs > 0).then(|| Duration::from_secs(cli.tick_secs)),
    };

    run_crawler(
        TcgCrawler::new(cli.pages),
        fetcher,
        storage,
        notifier,
        settings,
    )
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let cli = Cli::parse();
    info!(
        "Crawling {} pages into {} (prefix {})",
        cli.pages, cli.database, cli.table_prefix
    );

    let stats = match cli.telegram_token.clone() {
        Some(token) if !cli.telegram_recipients.is_empty() => {
            let channel = TelegramChannel::new(token, cli.telegram_recipients.clone());
            crawl(&cli, channel).await?
        }
        _ => {
            warn!("Telegram is not configured, notifications are only logged");
            crawl(&cli, LogChannel).await?
        }
    };

    info!(
        "Done: {} items, {} errors, {} requests",
        stats.items, stats.errors, stats.requests
    );
    Ok(())
}
