//! Polite, single-flight page fetching.
//!
//! The fetcher is split in two layers:
//! - [`PageSource`]: the transport that turns a URL into bytes. [`HttpSource`]
//!   is the production implementation built on `reqwest`.
//! - [`RateLimitedFetcher`]: wraps a source and enforces a minimum interval
//!   between any two requests issued through it.
//!
//! # Rate Limiting
//!
//! Before each request:
//! ```text
//! delay = min_interval - (now - last_fetch)
//! ```
//! If `delay` is positive the fetcher sleeps for it. `last_fetch` is set to
//! the moment the request is issued, not when it completes. Timing uses
//! `tokio::time::Instant`, so tests can pause the clock.
//!
//! Fetching takes `&mut self`, so a single fetcher never has two requests in
//! flight.

use std::error::Error;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument, warn};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("news_corpus/", env!("CARGO_PKG_VERSION"));

/// Transport that retrieves the body of a URL.
///
/// Implementors return an error for transport failures and non-success
/// responses; [`RateLimitedFetcher`] turns those into `None`.
pub trait PageSource {
    /// Retrieve the body at `url`.
    async fn get(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>>;
}

/// [`PageSource`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    /// Build a client with the crate user agent and an optional timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Option<Duration>) -> Result<Self, Box<dyn Error>> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

impl PageSource for HttpSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Fetcher enforcing a minimum delay between consecutive requests.
#[derive(Debug)]
pub struct RateLimitedFetcher<S> {
    source: S,
    min_interval: Duration,
    last_fetch: Option<Instant>,
    issued: u64,
}

impl<S: PageSource> RateLimitedFetcher<S> {
    pub fn new(source: S, min_interval: Duration) -> Self {
        Self {
            source,
            min_interval,
            last_fetch: None,
            issued: 0,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Number of requests issued so far.
    pub fn fetches_issued(&self) -> u64 {
        self.issued
    }

    /// Fetch `url`, waiting first if the previous request was too recent.
    ///
    /// Returns `None` on any transport error or non-success response.
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch(&mut self, url: &str) -> Option<Vec<u8>> {
        if let Some(last) = self.last_fetch {
            let since = last.elapsed();
            if since < self.min_interval {
                let delay = self.min_interval - since;
                debug!(?delay, "Waiting before next fetch");
                sleep(delay).await;
            }
        }

        self.last_fetch = Some(Instant::now());
        self.issued += 1;

        match self.source.get(url).await {
            Ok(body) => {
                debug!(bytes = body.len(), "Fetched page");
                Some(body)
            }
            Err(e) => {
                warn!(%url, error = %e, "Fetch failed");
                None
            }
        }
    }
}
