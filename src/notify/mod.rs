//! Run lifecycle notifications.
//!
//! The crawl driver calls [`RunObserver`] directly when the run starts, on
//! every periodic tick and when it finishes. [`Notifier`] checks the run
//! against its monitors, renders one of the two named templates and hands
//! the text to a [`Channel`].

mod telegram;
mod template;

pub use telegram::TelegramChannel;
pub use template::{Template, DEFAULT_TEMPLATE, PERIODIC_TEMPLATE};

use crate::{CrawlerError, StatsSnapshot};
use chrono::Utc;
use itertools::Itertools;
use tracing::info;

#[async_trait::async_trait]
pub trait RunObserver {
    async fn on_start(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError>;
    async fn on_finish(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError>;
    async fn on_tick(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError>;
}

#[async_trait::async_trait]
impl<'a, T: RunObserver + Sync> RunObserver for &'a T {
    async fn on_start(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
        (**self).on_start(stats).await
    }

    async fn on_finish(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
        (**self).on_finish(stats).await
    }

    async fn on_tick(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
        (**self).on_tick(stats).await
    }
}

/// Where rendered messages go.
#[async_trait::async_trait]
pub trait Channel {
    async fn send(&self, text: &str) -> Result<(), CrawlerError>;
}

#[async_trait::async_trait]
impl<'a, T: Channel + Sync> Channel for &'a T {
    async fn send(&self, text: &str) -> Result<(), CrawlerError> {
        (**self).send(text).await
    }
}

/// Logs messages instead of sending them anywhere.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait::async_trait]
impl Channel for LogChannel {
    async fn send(&self, text: &str) -> Result<(), CrawlerError> {
        info!("Notification:\n{}", text);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitor {
    /// Passes when at least `min` items were scraped.
    ItemCount { min: u64 },
    /// Passes when at most `max` requests failed.
    ErrorCount { max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorResult {
    pub monitor: Monitor,
    pub passed: bool,
}

impl Monitor {
    pub fn name(&self) -> &'static str {
        match self {
            Monitor::ItemCount { .. } => "ItemCountMonitor",
            Monitor::ErrorCount { .. } => "ErrorCountMonitor",
        }
    }

    pub fn check(&self, stats: &StatsSnapshot) -> MonitorResult {
        let passed = match *self {
            Monitor::ItemCount { min } => stats.items >= min,
            Monitor::ErrorCount { max } => stats.errors <= max,
        };
        MonitorResult {
            monitor: *self,
            passed,
        }
    }
}

impl MonitorResult {
    fn line(&self, stats: &StatsSnapshot) -> String {
        let mark = if self.passed { "✔" } else { "✘" };
        let detail = match self.monitor {
            Monitor::ItemCount { min } => format!("{} items, expected at least {}", stats.items, min),
            Monitor::ErrorCount { max } => {
                format!("{} errors, expected at most {}", stats.errors, max)
            }
        };
        format!("{} {}: {}", mark, self.monitor.name(), detail)
    }
}

/// Renders lifecycle messages for one crawl and sends them to `channel`.
pub struct Notifier<C> {
    spider: String,
    channel: C,
    min_items: u64,
    max_errors: u64,
}

impl<C: Channel + Sync> Notifier<C> {
    pub fn new(spider: &str, channel: C, min_items: u64, max_errors: u64) -> Self {
        Self {
            spider: spider.to_string(),
            channel,
            min_items,
            max_errors,
        }
    }

    fn finish_monitors(&self) -> [Monitor; 2] {
        [
            Monitor::ItemCount {
                min: self.min_items,
            },
            Monitor::ErrorCount {
                max: self.max_errors,
            },
        ]
    }

    fn periodic_monitors(&self) -> [Monitor; 1] {
        [Monitor::ErrorCount {
            max: self.max_errors,
        }]
    }

    pub fn start_message(&self, stats: &StatsSnapshot) -> Result<String, CrawlerError> {
        DEFAULT_TEMPLATE.render(&[
            ("icon", "🚀".to_string()),
            ("spider", self.spider.clone()),
            ("event", "started".to_string()),
            (
                "time",
                stats.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
            ("details", String::new()),
        ])
    }

    pub fn finish_message(&self, stats: &StatsSnapshot) -> Result<String, CrawlerError> {
        let results = self
            .finish_monitors()
            .iter()
            .map(|m| m.check(stats))
            .collect::<Vec<_>>();
        let passed = results.iter().all(|r| r.passed);

        let mut details = format!(
            "Items: {}\nErrors: {}\nRequests: {}\nElapsed: {}",
            stats.items,
            stats.errors,
            stats.requests,
            stats.formatted_elapsed()
        );
        for result in &results {
            details.push('\n');
            details.push_str(&result.line(stats));
        }

        DEFAULT_TEMPLATE.render(&[
            ("icon", if passed { "✅" } else { "❌" }.to_string()),
            ("spider", self.spider.clone()),
            ("event", "finished".to_string()),
            ("time", Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            ("details", details),
        ])
    }

    pub fn periodic_message(&self, stats: &StatsSnapshot) -> Result<String, CrawlerError> {
        let results = self
            .periodic_monitors()
            .iter()
            .map(|m| m.check(stats))
            .collect::<Vec<_>>();
        let passed = results.iter().all(|r| r.passed);

        PERIODIC_TEMPLATE.render(&[
            ("icon", if passed { "⏳" } else { "⚠️" }.to_string()),
            ("spider", self.spider.clone()),
            ("elapsed", stats.formatted_elapsed()),
            ("error_count", stats.errors.to_string()),
            (
                "monitors",
                results.iter().map(|r| r.line(stats)).join("\n"),
            ),
        ])
    }
}

#[async_trait::async_trait]
impl<C: Channel + Sync> RunObserver for Notifier<C> {
    async fn on_start(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
        let text = self.start_message(stats)?;
        self.channel.send(&text).await
    }

    async fn on_finish(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
        let text = self.finish_message(stats)?;
        self.channel.send(&text).await
    }

    async fn on_tick(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
        let text = self.periodic_message(stats)?;
        self.channel.send(&text).await
    }
}
