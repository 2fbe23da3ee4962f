use crate::CrawlerError;
use tokio::{
    sync::Mutex,
    time::{Duration, Instant},
};
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct Page {
    /// Url the body was served from, after redirects.
    pub url: Url,
    pub body: String,
}

#[async_trait::async_trait]
pub trait Fetch {
    async fn fetch(&self, url: &Url) -> Result<Page, CrawlerError>;
}

/// reqwest client that spaces request starts at least `delay` apart.
pub struct HttpFetcher {
    client: reqwest::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, delay: Duration) -> Result<Self, CrawlerError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            delay,
            last_request: Mutex::new(None),
        })
    }

    async fn wait_turn(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let since = last.elapsed();
            if since < self.delay {
                tokio::time::sleep(self.delay - since).await;
            }
        }
        last_request.replace(Instant::now());
    }
}

#[async_trait::async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Page, CrawlerError> {
        self.wait_turn().await;

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlerError::StatusError {
                url: url.to_string(),
                status,
            });
        }

        let url = response.url().clone();
        let body = response.text().await?;
        debug!("Fetched {} ({} bytes)", url, body.len());
        Ok(Page { url, body })
    }
}
