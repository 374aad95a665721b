//! Crawl orchestration.
//!
//! [`Corpus`] ties the pieces together:
//!
//! 1. **Discovery**: sitemap and RSS pollers propose article URLs
//! 2. **Indexing**: new URLs are appended to the [`DocumentIndex`]
//! 3. **Priming**: every indexed URL missing from the cache is fetched
//!    through the rate-limited fetcher and stored under its URL key
//! 4. **Access**: [`Corpus::get_document`] parses a cached page on demand
//!
//! Per-document failures (a fetch that fails, a page that will not parse,
//! a placeholder page) are logged and surface as `None`; they never abort
//! a crawl. Only opening a corpus can fail outright.
//!
//! One corpus instance owns its directory. Two processes crawling into the
//! same root can overwrite each other's index.

use crate::cache::PersistentCache;
use crate::config::CorpusConfig;
use crate::discovery::rss::RssPoller;
use crate::discovery::sitemap::SitemapPoller;
use crate::fetcher::{HttpSource, PageSource, RateLimitedFetcher};
use crate::index::DocumentIndex;
use crate::models::{Document, DocumentRef};
use crate::parser::{ArticleExtractor, HtmlArticleParser};
use crate::utils::{format_eta, is_sentinel, truncate_for_log, url_key};
use itertools::Itertools;
use std::error::Error;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// What to do in one [`Corpus::update`] call.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Log progress and ETA while priming.
    pub verbose: bool,
    /// Read one feed and fetch one document only.
    pub testing: bool,
    /// Index exactly these URLs instead of running discovery.
    pub urls: Option<Vec<String>>,
}

/// Outcome of [`Corpus::prime_cache`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrimeReport {
    /// Uncached documents selected for priming.
    pub missing: usize,
    /// Documents fetched and stored.
    pub fetched: usize,
    /// Documents whose fetch failed or returned a placeholder page.
    pub failed: usize,
}

/// Outcome of [`Corpus::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Distinct candidate URLs from discovery (or the explicit list).
    pub discovered: usize,
    /// URLs newly appended to the index.
    pub added: usize,
    /// Index size after the update.
    pub total: usize,
    pub prime: PrimeReport,
}

/// A local corpus of articles from one news site.
#[derive(Debug)]
pub struct Corpus<S = HttpSource, P = HtmlArticleParser> {
    config: CorpusConfig,
    cache: PersistentCache,
    index: DocumentIndex,
    fetcher: RateLimitedFetcher<S>,
    sitemap: SitemapPoller,
    rss: RssPoller,
    parser: P,
}

impl Corpus<HttpSource, HtmlArticleParser> {
    /// Open (or create) the corpus under `config.root`, fetching over HTTP.
    ///
    /// # Errors
    ///
    /// Fails if the corpus directories cannot be created, the stored index
    /// is unreadable, or the HTTP client cannot be built.
    pub async fn open(config: CorpusConfig) -> Result<Self, Box<dyn Error>> {
        let source = HttpSource::new(config.request_timeout)?;
        Self::with_parts(config, source, HtmlArticleParser).await
    }
}

impl<S: PageSource, P: ArticleExtractor> Corpus<S, P> {
    /// Open the corpus with a custom page source and extractor.
    #[instrument(level = "info", skip_all, fields(root = %config.root.display()))]
    pub async fn with_parts(config: CorpusConfig, source: S, parser: P) -> Result<Self, Box<dyn Error>> {
        let cache = PersistentCache::open(config.cache_dir()).await?;
        let sitemap = SitemapPoller::new(&config);
        sitemap.ensure_dirs().await?;
        let rss = RssPoller::new(&config.site)?;
        let index = DocumentIndex::load(cache.clone()).await?;
        let fetcher = RateLimitedFetcher::new(source, config.fetch_interval);

        info!(
            documents = index.len(),
            interval = ?config.fetch_interval,
            expiration = %config.expiration,
            "Corpus opened"
        );
        Ok(Self {
            config,
            cache,
            index,
            fetcher,
            sitemap,
            rss,
            parser,
        })
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    /// Number of indexed documents.
    pub fn total_documents(&self) -> usize {
        self.index.len()
    }

    /// Every indexed URL, in id order.
    pub fn all_uris(&self) -> &[String] {
        self.index.all()
    }

    /// Requests issued by this instance so far.
    pub fn fetches_issued(&self) -> u64 {
        self.fetcher.fetches_issued()
    }

    /// Whether the page of document `id` is in the cache.
    pub async fn is_cached(&self, id: usize) -> bool {
        match self.index.get(id) {
            Some(url) => self.cache.exists(&url_key(url)).await,
            None => false,
        }
    }

    /// Discover new articles, index them, then prime the cache.
    #[instrument(level = "info", skip_all, fields(verbose = options.verbose, testing = options.testing))]
    pub async fn update(&mut self, options: UpdateOptions) -> UpdateReport {
        let started = Instant::now();

        let candidates: Vec<String> = match options.urls {
            Some(urls) => {
                info!(count = urls.len(), "Indexing explicitly requested URLs");
                urls.into_iter().unique().collect()
            }
            None => {
                let from_sitemap = self.sitemap.poll(&mut self.fetcher, &self.cache).await;
                let from_rss = self.rss.poll(&mut self.fetcher, options.testing).await;
                info!(
                    sitemap = from_sitemap.len(),
                    rss = from_rss.len(),
                    "Discovery finished"
                );
                from_sitemap.into_iter().chain(from_rss).unique().collect()
            }
        };

        let added = self.index.merge(&candidates).await;
        info!(
            candidates = candidates.len(),
            added,
            total = self.index.len(),
            "Merged discovered URLs into index"
        );

        let prime = self.prime_cache(options.verbose, options.testing).await;
        let report = UpdateReport {
            discovered: candidates.len(),
            added,
            total: self.index.len(),
            prime,
        };
        info!(elapsed = ?started.elapsed(), ?report, "Update complete");
        report
    }

    /// Fetch and cache every indexed document that is not cached yet.
    #[instrument(level = "info", skip(self))]
    pub async fn prime_cache(&mut self, verbose: bool, testing: bool) -> PrimeReport {
        let mut pending = Vec::new();
        for (id, url) in self.index.all().iter().enumerate() {
            if !self.cache.exists(&url_key(url)).await {
                pending.push((id, url.clone()));
            }
        }
        if testing {
            pending.truncate(1);
        }

        let mut report = PrimeReport {
            missing: pending.len(),
            ..PrimeReport::default()
        };
        if pending.is_empty() {
            info!("Cache already primed");
            return report;
        }
        info!(missing = pending.len(), "Priming cache");

        let interval = self.fetcher.min_interval();
        for (done, (id, url)) in pending.iter().enumerate() {
            let remaining = pending.len() - done;
            let eta = format_eta(interval * remaining as u32);
            if verbose {
                info!(remaining, eta = %eta, %url, "Documents remaining");
            } else {
                debug!(remaining, eta = %eta, %url, "Documents remaining");
            }

            match self.fetch_and_store(url).await {
                Some(_) => report.fetched += 1,
                None => {
                    warn!(id, %url, "Could not prime document; will retry on next update");
                    report.failed += 1;
                }
            }
        }
        info!(fetched = report.fetched, failed = report.failed, "Priming finished");
        report
    }

    /// Parsed document by id or URL.
    ///
    /// Unknown URLs are added to the index. Returns `None` when the page
    /// cannot be fetched, is a placeholder page, or cannot be parsed.
    #[instrument(level = "info", skip_all)]
    pub async fn get_document(&mut self, doc: impl Into<DocumentRef>) -> Option<Document> {
        let doc = doc.into();
        debug!(%doc, "Loading document");
        let (_, url, html) = self.load_raw(&doc).await?;
        match self.parser.extract(&html, &url) {
            Ok(document) => Some(document),
            Err(e) => {
                error!(
                    %url,
                    error = %e,
                    page_preview = %truncate_for_log(&String::from_utf8_lossy(&html), 200),
                    "Failed to parse document"
                );
                None
            }
        }
    }

    /// Raw cached HTML by id or URL, fetching it if needed.
    pub async fn raw_document(&mut self, doc: impl Into<DocumentRef>) -> Option<Vec<u8>> {
        let doc = doc.into();
        self.load_raw(&doc).await.map(|(_, _, html)| html)
    }

    async fn load_raw(&mut self, doc: &DocumentRef) -> Option<(usize, String, Vec<u8>)> {
        let (id, url) = match doc {
            DocumentRef::Id(id) => match self.index.get(*id) {
                Some(url) => (*id, url.to_string()),
                None => {
                    warn!(id, total = self.index.len(), "No document with this id");
                    return None;
                }
            },
            DocumentRef::Uri(url) => (self.index.get_or_assign(url).await, url.clone()),
        };

        let key = url_key(&url);
        let cached = match self.cache.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(%url, error = %e, "Cache read failed; treating as miss");
                None
            }
        };

        let html = match cached {
            Some(html) => html,
            None => self.fetch_and_store(&url).await?,
        };

        if is_sentinel(&html) {
            info!(id, %url, "Page is a placeholder; treating as unavailable");
            return None;
        }
        Some((id, url, html))
    }

    /// Fetch a page and cache it. Placeholder pages count as failed fetches
    /// and are not cached, so the next update asks for them again.
    async fn fetch_and_store(&mut self, url: &str) -> Option<Vec<u8>> {
        let html = self.fetcher.fetch(url).await?;
        if is_sentinel(&html) {
            info!(%url, "Fetched a placeholder page; not caching it");
            return None;
        }
        if let Err(e) = self
            .cache
            .set(&url_key(url), &html, self.config.expiration)
            .await
        {
            error!(%url, error = %e, "Failed to cache fetched page");
        }
        Some(html)
    }
}
