//! Run statistics shared between the crawl driver and the run observers.

use chrono::{DateTime, Utc};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

#[derive(Debug)]
pub struct RunStats {
    started_at: DateTime<Utc>,
    started: Instant,
    requests: AtomicU64,
    items: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`RunStats`], handed to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub requests: u64,
    pub items: u64,
    pub errors: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            requests: AtomicU64::new(0),
            items: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn increment_requests(&self) -> u64 {
        self.requests.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn increment_items(&self) -> u64 {
        self.items.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn increment_errors(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            elapsed: self.started.elapsed(),
            requests: self.requests.load(Ordering::SeqCst),
            items: self.items.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
        }
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsSnapshot {
    /// Elapsed time rounded down to whole seconds, e.g. `1h 02m 05s`.
    pub fn formatted_elapsed(&self) -> String {
        let secs = self.elapsed.as_secs();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            format!("{}h {:02}m {:02}s", h, m, s)
        } else if m > 0 {
            format!("{}m {:02}s", m, s)
        } else {
            format!("{}s", s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_counters() {
        let stats = RunStats::new();
        assert_eq!(stats.increment_items(), 1);
        assert_eq!(stats.increment_items(), 2);
        stats.increment_errors();
        stats.increment_requests();

        let snapshot = stats.snapshot();
        assert_eq!(
            (snapshot.requests, snapshot.items, snapshot.errors),
            (1, 2, 1)
        );
    }

    #[test]
    fn test_formatted_elapsed() {
        let mut snapshot = RunStats::new().snapshot();
        snapshot.elapsed = Duration::from_secs(3725);
        assert_eq!(snapshot.formatted_elapsed(), "1h 02m 05s");
        snapshot.elapsed = Duration::from_secs(65);
        assert_eq!(snapshot.formatted_elapsed(), "1m 05s");
        snapshot.elapsed = Duration::from_millis(900);
        assert_eq!(snapshot.formatted_elapsed(), "0s");
    }
}
