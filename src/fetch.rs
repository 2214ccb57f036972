use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;

use crate::error::FetchError;

pub const EVENTS_URL: &str = "https://ccbb.com.br/rio-de-janeiro/programacao/";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw response of one GET, before the status is checked.
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchedPage {
    /// Body of a 2xx response; any other status becomes a `FetchError`.
    pub fn into_body(self) -> Result<Vec<u8>, FetchError> {
        if (200..300).contains(&self.status) {
            Ok(self.body)
        } else {
            Err(FetchError::Status {
                status: self.status,
                url: self.url,
            })
        }
    }
}

pub trait Fetch {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<FetchedPage, FetchError>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        info!("Fetching events page: {}", url);
        let start = Instant::now();
        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        info!(
            "Fetched {} bytes (status {}) in {}ms",
            body.len(),
            status,
            start.elapsed().as_millis()
        );
        Ok(FetchedPage {
            url: url.to_string(),
            status,
            body,
        })
    }
}
