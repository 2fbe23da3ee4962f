use scraper::Html;
use std::{
    collections::{HashSet, VecDeque},
    fmt::Debug,
    sync::Arc,
};
use tokio::{
    task::{JoinError, JoinSet},
    time::{self, Duration, Interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use url::Url;

pub mod fetch;
pub mod notify;
pub mod pokemon;
pub mod stats;

mod data;
mod error;
mod utils;

pub use data::Table;
pub use error::CrawlerError;
pub use fetch::{Fetch, HttpFetcher, Page};
pub use notify::RunObserver;
pub use stats::{RunStats, StatsSnapshot};

/// A scraped record handed to [`Storage`].
pub trait Item {
    /// An incomplete item is still stored, but its url is also recorded as warned.
    fn is_incomplete(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<K> {
    pub url: Url,
    pub kind: K,
}

impl<K> Request<K> {
    pub fn new(url: Url, kind: K) -> Self {
        Self { url, kind }
    }
}

#[derive(Debug, PartialEq)]
pub enum CrawlerResult<K, D> {
    Links(Vec<Request<K>>),
    Document(D),
}

pub trait Crawler {
    /// Routes a fetched page to the right parsing rule.
    type Kind: Copy + Debug + Send + Sync + 'static;
    type Document: Item + Send + 'static;

    fn start_requests(&self) -> Vec<Request<Self::Kind>>;

    /// `url` is the url the page was actually served from, used to resolve relative links.
    fn crawl(
        &self,
        kind: Self::Kind,
        url: &Url,
        doc: &Html,
    ) -> CrawlerResult<Self::Kind, Self::Document>;
}

#[async_trait::async_trait]
pub trait Storage {
    type Record: Item + Send;

    async fn results_count(&self) -> Result<u32, CrawlerError>;
    async fn results_insert<I: AsRef<str> + Send>(
        &self,
        item: (I, Self::Record),
    ) -> Result<(), CrawlerError>;

    async fn warned_insert<I: AsRef<str> + Send>(&self, item: I) -> Result<(), CrawlerError>;
}

#[async_trait::async_trait]
impl<'a, T: Storage + Sync> Storage for &'a T {
    type Record = T::Record;

    async fn results_count(&self) -> Result<u32, CrawlerError> {
        (**self).results_count().await
    }

    async fn results_insert<I: AsRef<str> + Send>(
        &self,
        item: (I, Self::Record),
    ) -> Result<(), CrawlerError> {
        (**self).results_insert(item).await
    }

    async fn warned_insert<I: AsRef<str> + Send>(&self, item: I) -> Result<(), CrawlerError> {
        (**self).warned_insert(item).await
    }
}

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Maximum number of requests in flight.
    pub concurrency: usize,
    /// Period of `on_tick` notifications, `None` disables them.
    pub tick: Option<Duration>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            tick: Some(Duration::from_secs(600)),
        }
    }
}

type Handled<K, D> = (Request<K>, Result<CrawlerResult<K, D>, CrawlerError>);

enum Event<K, D> {
    Joined(Option<Result<Handled<K, D>, JoinError>>),
    Tick,
}

/// Runs a crawl to completion and returns the final statistics.
///
/// Failed requests are counted and logged, never fatal. Storage failures abort
/// the run.
pub async fn run_crawler<C, F, S, O>(
    crawler: C,
    fetcher: F,
    storage: S,
    observer: O,
    settings: CrawlSettings,
) -> Result<StatsSnapshot, CrawlerError>
where
    C: Crawler + Send + Sync + 'static,
    F: Fetch + Send + Sync + 'static,
    S: Storage<Record = C::Document>,
    O: RunObserver,
{
    let crawler = Arc::new(crawler);
    let fetcher = Arc::new(fetcher);
    let stats = RunStats::new();

    if let Err(e) = observer.on_start(&stats.snapshot()).await {
        warn!("Start notification failed: {}", e);
    }

    let mut queue: VecDeque<Request<C::Kind>> = crawler.start_requests().into();
    let mut seen: HashSet<Url> = HashSet::new();
    let mut in_flight = JoinSet::new();
    let mut ticker = settings.tick.map(|period| {
        let mut interval = time::interval_at(time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });
    let concurrency = settings.concurrency.max(1);

    info!("Initial queue length: {}", queue.len());

    loop {
        while in_flight.len() < concurrency {
            let Some(request) = queue.pop_front() else {
                break;
            };
            if !seen.insert(request.url.clone()) {
                debug!("Skip already scheduled {}", request.url);
                continue;
            }
            stats.increment_requests();
            in_flight.spawn(handle(request, crawler.clone(), fetcher.clone()));
        }

        if in_flight.is_empty() {
            break;
        }

        let event = tokio::select! {
            joined = in_flight.join_next() => Event::Joined(joined),
            _ = next_tick(&mut ticker) => Event::Tick,
        };

        match event {
            Event::Joined(None) => {}
            Event::Joined(Some(Ok((request, Ok(result))))) => match result {
                CrawlerResult::Links(links) => {
                    debug!("{} yielded {} links", request.url, links.len());
                    queue.extend(links);
                }
                CrawlerResult::Document(record) => {
                    let url = request.url.as_str();
                    if record.is_incomplete() {
                        warn!("Incomplete record extracted: {}", url);
                        storage.warned_insert(url).await?;
                    }
                    storage.results_insert((url, record)).await?;
                    let n = stats.increment_items();
                    info!("[{}] Insert Result {}", n, url);
                }
            },
            Event::Joined(Some(Ok((request, Err(e))))) => {
                stats.increment_errors();
                error!("Request {} failed: {}", request.url, e);
            }
            Event::Joined(Some(Err(e))) => {
                stats.increment_errors();
                error!("Request task failed: {}", e);
            }
            Event::Tick => {
                if let Err(e) = observer.on_tick(&stats.snapshot()).await {
                    warn!("Periodic notification failed: {}", e);
                }
            }
        }
    }

    let snapshot = stats.snapshot();
    info!(
        "Crawl finished: {} requests, {} items, {} errors in {:?}",
        snapshot.requests, snapshot.items, snapshot.errors, snapshot.elapsed
    );
    if let Err(e) = observer.on_finish(&snapshot).await {
        warn!("Finish notification failed: {}", e);
    }

    Ok(snapshot)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}

async fn handle<C, F>(
    request: Request<C::Kind>,
    crawler: Arc<C>,
    fetcher: Arc<F>,
) -> Handled<C::Kind, C::Document>
where
    C: Crawler + Send + Sync,
    F: Fetch + Send + Sync,
{
    debug!("Visit {}", request.url);
    let result = match fetcher.fetch(&request.url).await {
        Ok(page) => {
            let doc = Html::parse_document(&page.body);
            Ok(crawler.crawl(request.kind, &page.url, &doc))
        }
        Err(e) => Err(e),
    };
    (request, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pokemon::{CardRecord, TcgCrawler};
    use pretty_assertions::assert_eq;
    use std::{collections::HashMap, sync::Mutex};

    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, String>,
    }

    impl StaticFetcher {
        fn with(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }
    }

    #[async_trait::async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(&self, url: &Url) -> Result<Page, CrawlerError> {
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(Page {
                    url: url.clone(),
                    body: body.clone(),
                }),
                None => Err(CrawlerError::StatusError {
                    url: url.to_string(),
                    status: reqwest::StatusCode::NOT_FOUND,
                }),
            }
        }
    }

    /// Answers like [`StaticFetcher`] after a fixed delay.
    struct SlowFetcher {
        inner: StaticFetcher,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Fetch for SlowFetcher {
        async fn fetch(&self, url: &Url) -> Result<Page, CrawlerError> {
            time::sleep(self.delay).await;
            self.inner.fetch(url).await
        }
    }

    #[derive(Default)]
    struct MemoryStorage {
        results: Mutex<Vec<(String, CardRecord)>>,
        warned: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Storage for MemoryStorage {
        type Record = CardRecord;

        async fn results_count(&self) -> Result<u32, CrawlerError> {
            Ok(self.results.lock().unwrap().len() as u32)
        }

        async fn results_insert<I: AsRef<str> + Send>(
            &self,
            (url, record): (I, CardRecord),
        ) -> Result<(), CrawlerError> {
            self.results
                .lock()
                .unwrap()
                .push((url.as_ref().to_string(), record));
            Ok(())
        }

        async fn warned_insert<I: AsRef<str> + Send>(&self, item: I) -> Result<(), CrawlerError> {
            self.warned.lock().unwrap().push(item.as_ref().to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl RunObserver for RecordingObserver {
        async fn on_start(&self, _stats: &StatsSnapshot) -> Result<(), CrawlerError> {
            self.events.lock().unwrap().push("start".to_string());
            Ok(())
        }

        async fn on_finish(&self, stats: &StatsSnapshot) -> Result<(), CrawlerError> {
            self.events
                .lock()
                .unwrap()
                .push(format!("finish {} {}", stats.items, stats.errors));
            Ok(())
        }

        async fn on_tick(&self, _stats: &StatsSnapshot) -> Result<(), CrawlerError> {
            self.events.lock().unwrap().push("tick".to_string());
            Ok(())
        }
    }

    const LISTING: &str = r#"<html><body><ul id="cardResults">
        <li><a href="/us/pokemon-tcg/pokemon-cards/dp-series/dp1/1/">one</a></li>
        <li><a href="/us/pokemon-tcg/pokemon-cards/dp-series/dp1/2/">two</a></li>
        <li><a href="/us/pokemon-tcg/pokemon-cards/dp-series/dp1/404/">gone</a></li>
    </ul></body></html>"#;

    #[tokio::test]
    async fn test_run_crawler_counts_items_and_errors() {
        let crawler = TcgCrawler::new(2);
        let card = "https://www.pokemon.com/us/pokemon-tcg/pokemon-cards/dp-series/dp1";
        let fetcher = StaticFetcher::default()
            .with(crawler.listing_url(1).as_str(), LISTING)
            .with(crawler.listing_url(2).as_str(), LISTING)
            .with(
                &format!("{}/1/", card),
                "<html><body><h1>Bulbasaur</h1></body></html>",
            )
            .with(&format!("{}/2/", card), "<html><body></body></html>");
        let storage = MemoryStorage::default();
        let observer = RecordingObserver::default();
        let settings = CrawlSettings {
            concurrency: 2,
            tick: None,
        };

        let stats = run_crawler(crawler, fetcher, &storage, &observer, settings)
            .await
            .expect("crawl failed");

        // two listings plus three distinct card urls, the second listing repeats them
        assert_eq!(stats.requests, 5);
        assert_eq!(stats.items, 2);
        assert_eq!(stats.errors, 1);

        let mut titles = storage
            .results
            .lock()
            .unwrap()
            .iter()
            .map(|(_, record)| record.title.clone())
            .collect::<Vec<_>>();
        titles.sort();
        assert_eq!(titles, vec![None, Some("Bulbasaur".to_string())]);
        assert_eq!(
            *storage.warned.lock().unwrap(),
            vec![format!("{}/2/", card)]
        );
        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["start".to_string(), "finish 2 1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_run_crawler_with_no_results() {
        let crawler = TcgCrawler::new(3);
        let fetcher = StaticFetcher::default()
            .with(crawler.listing_url(1).as_str(), "<html></html>")
            .with(crawler.listing_url(2).as_str(), "<html></html>")
            .with(crawler.listing_url(3).as_str(), "<html></html>");
        let storage = MemoryStorage::default();
        let observer = RecordingObserver::default();

        let stats = run_crawler(
            crawler,
            fetcher,
            &storage,
            &observer,
            CrawlSettings::default(),
        )
        .await
        .expect("crawl failed");

        assert_eq!(stats.requests, 3);
        assert_eq!(stats.items, 0);
        assert_eq!(stats.errors, 0);
        assert_eq!(storage.results_count().await.unwrap(), 0);
    }

    fn slow_listings(crawler: &TcgCrawler) -> SlowFetcher {
        SlowFetcher {
            inner: StaticFetcher::default()
                .with(crawler.listing_url(1).as_str(), "<html></html>")
                .with(crawler.listing_url(2).as_str(), "<html></html>"),
            delay: Duration::from_millis(250),
        }
    }

    #[tokio::test]
    async fn test_run_crawler_ticks_while_running() {
        let crawler = TcgCrawler::new(2);
        let fetcher = slow_listings(&crawler);
        let storage = MemoryStorage::default();
        let observer = RecordingObserver::default();
        let settings = CrawlSettings {
            concurrency: 1,
            tick: Some(Duration::from_millis(100)),
        };

        let stats = run_crawler(crawler, fetcher, &storage, &observer, settings)
            .await
            .expect("crawl failed");
        assert_eq!(stats.requests, 2);

        let events = observer.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("start"));
        assert_eq!(events.last().map(String::as_str), Some("finish 0 0"));
        let ticks = events[1..events.len() - 1]
            .iter()
            .filter(|e| e.as_str() == "tick")
            .count();
        assert!(ticks >= 1, "no tick in {:?}", events);
        assert_eq!(ticks, events.len() - 2);
    }

    #[tokio::test]
    async fn test_run_crawler_without_tick() {
        let crawler = TcgCrawler::new(2);
        let fetcher = slow_listings(&crawler);
        let storage = MemoryStorage::default();
        let observer = RecordingObserver::default();
        let settings = CrawlSettings {
            concurrency: 1,
            tick: None,
        };

        run_crawler(crawler, fetcher, &storage, &observer, settings)
            .await
            .expect("crawl failed");

        assert_eq!(
            *observer.events.lock().unwrap(),
            vec!["start".to_string(), "finish 0 0".to_string()]
        );
    }
}
