//! News sitemap discovery.
//!
//! Each poll cycle:
//!
//! 1. Downloads the sitemap, unless the last download recorded in the cache
//!    is more recent than the cooldown. A download is written to
//!    `sitenews/new/<epochSeconds>.sitemap_news.xml`, with a `-<n>` suffix
//!    when that name is already used in `new/` or `old/`.
//! 2. Processes every snapshot waiting in `sitenews/new/`: every
//!    `<url><loc>` in the sitemap namespace is extracted, falling back to a
//!    regex scan for `<loc>` spans when structured parsing finds nothing.
//! 3. Moves each processed snapshot to `sitenews/old/`, even if it could not
//!    be parsed, so no file is processed twice.
//!
//! A broken snapshot is logged and skipped; the remaining files are still
//! processed.

use super::{ArticleFilter, append_escaped_text};
use crate::cache::{LAST_SITEMAP_FETCH_KEY, PersistentCache};
use crate::config::{CorpusConfig, Expiration};
use crate::fetcher::{PageSource, RateLimitedFetcher};
use chrono::Utc;
use once_cell::sync::Lazy;
use quick_xml::NsReader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

/// File name suffix of sitemap snapshots.
pub const SNAPSHOT_SUFFIX: &str = ".sitemap_news.xml";

/// Namespace of `<urlset>`, `<url>` and `<loc>` in a sitemap.
pub const SITEMAP_NS: &[u8] = b"http://www.sitemaps.org/schemas/sitemap/0.9";

static LOC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").unwrap());

/// Polls the news sitemap and turns snapshots into article URLs.
#[derive(Debug, Clone)]
pub struct SitemapPoller {
    sitemap_url: String,
    cooldown: Duration,
    new_dir: PathBuf,
    old_dir: PathBuf,
    filter: ArticleFilter,
}

impl SitemapPoller {
    pub fn new(config: &CorpusConfig) -> Self {
        Self {
            sitemap_url: config.site.sitemap_url.clone(),
            cooldown: config.sitemap_cooldown,
            new_dir: config.sitenews_new_dir(),
            old_dir: config.sitenews_old_dir(),
            filter: ArticleFilter::from_profile(&config.site),
        }
    }

    /// Create the `new` and `old` snapshot directories.
    pub async fn ensure_dirs(&self) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(&self.new_dir).await?;
        fs::create_dir_all(&self.old_dir).await?;
        Ok(())
    }

    /// Run one poll cycle and return the sorted distinct article URLs found.
    #[instrument(level = "info", skip_all, fields(sitemap = %self.sitemap_url))]
    pub async fn poll<S: PageSource>(
        &self,
        fetcher: &mut RateLimitedFetcher<S>,
        cache: &PersistentCache,
    ) -> Vec<String> {
        if self.cooldown_elapsed(cache).await {
            if let Err(e) = self.download(fetcher, cache).await {
                error!(error = %e, "Failed to store sitemap snapshot");
            }
        } else {
            info!(cooldown = ?self.cooldown, "Sitemap fetched recently; processing pending snapshots only");
        }

        let snapshots = match self.pending_snapshots().await {
            Ok(files) => files,
            Err(e) => {
                error!(dir = %self.new_dir.display(), error = %e, "Cannot list sitemap snapshots");
                return Vec::new();
            }
        };

        let mut found = HashSet::new();
        for snapshot in &snapshots {
            match fs::read(snapshot).await {
                Ok(xml) => {
                    let urls = extract_urls(&xml);
                    let before = found.len();
                    found.extend(urls.into_iter().filter(|u| self.filter.accepts(u)));
                    debug!(file = %snapshot.display(), new = found.len() - before, "Processed snapshot");
                }
                Err(e) => warn!(file = %snapshot.display(), error = %e, "Cannot read snapshot"),
            }
            if let Err(e) = self.archive(snapshot).await {
                error!(file = %snapshot.display(), error = %e, "Cannot archive snapshot");
            }
        }

        let mut urls: Vec<String> = found.into_iter().collect();
        urls.sort();
        info!(
            snapshots = snapshots.len(),
            count = urls.len(),
            "Sitemap discovery complete"
        );
        urls
    }

    async fn cooldown_elapsed(&self, cache: &PersistentCache) -> bool {
        let last = match cache.get(LAST_SITEMAP_FETCH_KEY).await {
            Ok(Some(raw)) => String::from_utf8_lossy(&raw).trim().parse::<i64>().ok(),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Cannot read last sitemap fetch time");
                None
            }
        };
        match last {
            Some(last) => Utc::now().timestamp() - last >= self.cooldown.as_secs() as i64,
            None => true,
        }
    }

    async fn download<S: PageSource>(
        &self,
        fetcher: &mut RateLimitedFetcher<S>,
        cache: &PersistentCache,
    ) -> Result<(), Box<dyn Error>> {
        let Some(body) = fetcher.fetch(&self.sitemap_url).await else {
            warn!("Sitemap download failed");
            return Ok(());
        };
        let now = Utc::now().timestamp();
        let dirs = [self.new_dir.as_path(), self.old_dir.as_path()];
        let name = unused_snapshot_name(&now.to_string(), &dirs).await;
        let path = self.new_dir.join(name);
        fs::write(&path, &body).await?;
        cache
            .set(LAST_SITEMAP_FETCH_KEY, now.to_string().as_bytes(), Expiration::Never)
            .await?;
        info!(file = %path.display(), bytes = body.len(), "Stored sitemap snapshot");
        Ok(())
    }

    async fn pending_snapshots(&self) -> Result<Vec<PathBuf>, Box<dyn Error>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.new_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SNAPSHOT_SUFFIX));
            if is_snapshot && entry.file_type().await?.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn archive(&self, snapshot: &Path) -> Result<(), Box<dyn Error>> {
        let name = snapshot
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("snapshot path {} has no file name", snapshot.display()))?;
        let stem = name.strip_suffix(SNAPSHOT_SUFFIX).unwrap_or(name);
        let target = unused_snapshot_name(stem, &[self.old_dir.as_path()]).await;
        fs::rename(snapshot, self.old_dir.join(target)).await?;
        Ok(())
    }
}

/// `<stem>.sitemap_news.xml`, or `<stem>-<n>.sitemap_news.xml` with the
/// smallest `n` that is free in every one of `dirs`.
async fn unused_snapshot_name(stem: &str, dirs: &[&Path]) -> String {
    let mut n = 0u32;
    loop {
        let name = match n {
            0 => format!("{stem}{SNAPSHOT_SUFFIX}"),
            n => format!("{stem}-{n}{SNAPSHOT_SUFFIX}"),
        };
        let mut taken = false;
        for dir in dirs {
            if fs::try_exists(dir.join(&name)).await.unwrap_or(false) {
                taken = true;
                break;
            }
        }
        if !taken {
            return name;
        }
        n += 1;
    }
}

/// Extract every `<loc>` of a sitemap document.
///
/// Uses namespace-aware parsing first. If that fails or finds nothing, a
/// permissive regex scan is used instead.
pub fn extract_urls(xml: &[u8]) -> Vec<String> {
    match parse_sitemap(xml) {
        Ok(urls) if !urls.is_empty() => return urls,
        Ok(_) => info!("Structured sitemap parse found no URLs; using regex fallback"),
        Err(e) => info!(error = %e, "Structured sitemap parse failed; using regex fallback"),
    }
    scan_locs(&String::from_utf8_lossy(xml))
}

fn parse_sitemap(xml: &[u8]) -> Result<Vec<String>, Box<dyn Error>> {
    let mut reader = NsReader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut urls = Vec::new();
    let mut in_url = false;
    // Escaped text of the `<loc>` being read.
    let mut loc: Option<String> = None;

    loop {
        match reader.read_resolved_event_into(&mut buf)? {
            (ResolveResult::Bound(Namespace(ns)), Event::Start(e)) if ns == SITEMAP_NS => {
                match e.local_name().as_ref() {
                    b"url" => in_url = true,
                    b"loc" if in_url => loc = Some(String::new()),
                    _ => {}
                }
            }
            (_, event @ (Event::Text(_) | Event::CData(_) | Event::GeneralRef(_))) => {
                if let Some(acc) = loc.as_mut() {
                    append_escaped_text(acc, &event)?;
                }
            }
            (_, Event::End(e)) => match e.local_name().as_ref() {
                b"loc" => {
                    if let Some(raw) = loc.take() {
                        let value = unescape(&raw)?;
                        let value = value.trim();
                        if !value.is_empty() {
                            urls.push(value.to_string());
                        }
                    }
                }
                b"url" => in_url = false,
                _ => {}
            },
            (_, Event::Eof) => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(urls)
}

fn scan_locs(text: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| {
            unescape(m.as_str())
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| m.as_str().to_string())
        })
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticSource;

    const SITEMAP_URL: &str = "https://www.voanews.com/sitemap_news.xml";

    fn sitemap(ns: &str, locs: &[&str]) -> String {
        let mut xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="{ns}" xmlns:news="http://www.google.com/schemas/sitemap-news/0.9">"#
        );
        for loc in locs {
            xml.push_str(&format!(
                "<url><loc>{loc}</loc><news:news><news:title>T</news:title></news:news></url>\n"
            ));
        }
        xml.push_str("</urlset>");
        xml
    }

    async fn setup(source: StaticSource) -> (tempfile::TempDir, SitemapPoller, RateLimitedFetcher<StaticSource>, PersistentCache) {
        let tmp = tempfile::tempdir().unwrap();
        let config = CorpusConfig::new(tmp.path());
        let poller = SitemapPoller::new(&config);
        poller.ensure_dirs().await.unwrap();
        let cache = PersistentCache::open(config.cache_dir()).await.unwrap();
        let fetcher = RateLimitedFetcher::new(source, Duration::ZERO);
        (tmp, poller, fetcher, cache)
    }

    #[test]
    fn test_structured_parse() {
        let xml = sitemap(
            "http://www.sitemaps.org/schemas/sitemap/0.9",
            &[
                "https://www.voanews.com/a/a/1.html",
                "https://www.voanews.com/a/b/2.html?x=1&amp;y=2",
            ],
        );
        let urls = parse_sitemap(xml.as_bytes()).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://www.voanews.com/a/a/1.html",
                "https://www.voanews.com/a/b/2.html?x=1&y=2",
            ]
        );
    }

    #[test]
    fn test_namespace_mismatch_falls_back_to_regex() {
        let xml = sitemap(
            "http://www.sitemaps.org/schemas/sitemap/0.8",
            &["https://www.voanews.com/a/c/3.html"],
        );
        assert!(parse_sitemap(xml.as_bytes()).unwrap().is_empty());
        assert_eq!(
            extract_urls(xml.as_bytes()),
            vec!["https://www.voanews.com/a/c/3.html"]
        );
    }

    #[test]
    fn test_malformed_xml_falls_back_to_regex() {
        let xml = "<urlset><url><loc> https://www.voanews.com/a/d/4.html </loc></url><url><loc>";
        assert_eq!(
            extract_urls(xml.as_bytes()),
            vec!["https://www.voanews.com/a/d/4.html"]
        );
    }

    #[tokio::test]
    async fn test_poll_downloads_filters_and_archives() {
        let xml = sitemap(
            "http://www.sitemaps.org/schemas/sitemap/0.9",
            &[
                "https://www.voanews.com/a/b/2.html",
                "https://www.voanews.com/a/a/1.html",
                "https://www.voanews.com/a/a/1.html",
                "https://www.voanews.com/news/index.html",
            ],
        );
        let source = StaticSource::new().with_page(SITEMAP_URL, xml);
        let (tmp, poller, mut fetcher, cache) = setup(source).await;

        let urls = poller.poll(&mut fetcher, &cache).await;
        assert_eq!(
            urls,
            vec![
                "https://www.voanews.com/a/a/1.html",
                "https://www.voanews.com/a/b/2.html",
            ]
        );

        let new_dir = tmp.path().join("sitenews/new");
        let old_dir = tmp.path().join("sitenews/old");
        assert_eq!(std::fs::read_dir(&new_dir).unwrap().count(), 0);
        let archived: Vec<_> = std::fs::read_dir(&old_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].ends_with(SNAPSHOT_SUFFIX));
        assert!(cache.exists(LAST_SITEMAP_FETCH_KEY).await);
    }

    #[tokio::test]
    async fn test_cooldown_skips_download_but_processes_pending() {
        let source = StaticSource::new().with_page(SITEMAP_URL, sitemap(
            "http://www.sitemaps.org/schemas/sitemap/0.9",
            &["https://www.voanews.com/a/a/1.html"],
        ));
        let requests = source.requests();
        let (tmp, poller, mut fetcher, cache) = setup(source).await;

        let first = poller.poll(&mut fetcher, &cache).await;
        assert_eq!(first.len(), 1);

        // A snapshot dropped in by hand is picked up without a new download.
        let pending = sitemap(
            "http://www.sitemaps.org/schemas/sitemap/0.9",
            &["https://www.voanews.com/a/z/9.html"],
        );
        std::fs::write(tmp.path().join("sitenews/new/1.sitemap_news.xml"), pending).unwrap();

        let second = poller.poll(&mut fetcher, &cache).await;
        assert_eq!(second, vec!["https://www.voanews.com/a/z/9.html"]);
        assert_eq!(requests.lock().unwrap().len(), 1);

        // Nothing is reprocessed once archived.
        let third = poller.poll(&mut fetcher, &cache).await;
        assert!(third.is_empty());
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_broken_snapshot_is_archived_and_others_processed() {
        let (tmp, poller, mut fetcher, cache) = setup(StaticSource::new()).await;
        cache
            .set(LAST_SITEMAP_FETCH_KEY, Utc::now().timestamp().to_string().as_bytes(), Expiration::Never)
            .await
            .unwrap();

        let new_dir = tmp.path().join("sitenews/new");
        std::fs::write(new_dir.join("1.sitemap_news.xml"), b"\xff\xfe not xml at all").unwrap();
        std::fs::write(
            new_dir.join("2.sitemap_news.xml"),
            sitemap(
                "http://www.sitemaps.org/schemas/sitemap/0.9",
                &["https://www.voanews.com/a/e/5.html"],
            ),
        )
        .unwrap();
        std::fs::write(new_dir.join("notes.txt"), b"ignored").unwrap();

        let urls = poller.poll(&mut fetcher, &cache).await;
        assert_eq!(urls, vec!["https://www.voanews.com/a/e/5.html"]);
        assert!(tmp.path().join("sitenews/old/1.sitemap_news.xml").exists());
        assert!(tmp.path().join("sitenews/old/2.sitemap_news.xml").exists());
        assert!(new_dir.join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_downloads_in_the_same_second_keep_both_snapshots() {
        let source = StaticSource::new().with_page(SITEMAP_URL, sitemap(
            "http://www.sitemaps.org/schemas/sitemap/0.9",
            &["https://www.voanews.com/a/a/1.html"],
        ));
        let tmp = tempfile::tempdir().unwrap();
        let mut config = CorpusConfig::new(tmp.path());
        config.sitemap_cooldown = Duration::ZERO;
        let poller = SitemapPoller::new(&config);
        poller.ensure_dirs().await.unwrap();
        let cache = PersistentCache::open(config.cache_dir()).await.unwrap();
        let mut fetcher = RateLimitedFetcher::new(source, Duration::ZERO);

        poller.poll(&mut fetcher, &cache).await;
        poller.poll(&mut fetcher, &cache).await;

        let archived = std::fs::read_dir(tmp.path().join("sitenews/old")).unwrap().count();
        assert_eq!(archived, 2);
        assert_eq!(fetcher.fetches_issued(), 2);
    }

    #[tokio::test]
    async fn test_archive_does_not_overwrite_existing_snapshot() {
        let (tmp, poller, mut fetcher, cache) = setup(StaticSource::new()).await;
        cache
            .set(LAST_SITEMAP_FETCH_KEY, Utc::now().timestamp().to_string().as_bytes(), Expiration::Never)
            .await
            .unwrap();
        let old_dir = tmp.path().join("sitenews/old");
        std::fs::write(old_dir.join("100.sitemap_news.xml"), b"earlier").unwrap();
        std::fs::write(
            tmp.path().join("sitenews/new/100.sitemap_news.xml"),
            sitemap(
                "http://www.sitemaps.org/schemas/sitemap/0.9",
                &["https://www.voanews.com/a/b/2.html"],
            ),
        )
        .unwrap();

        let urls = poller.poll(&mut fetcher, &cache).await;
        assert_eq!(urls, vec!["https://www.voanews.com/a/b/2.html"]);
        assert_eq!(std::fs::read(old_dir.join("100.sitemap_news.xml")).unwrap(), b"earlier");
        assert!(old_dir.join("100-1.sitemap_news.xml").exists());
    }

    #[tokio::test]
    async fn test_failed_download_does_not_start_cooldown() {
        let (_tmp, poller, mut fetcher, cache) = setup(StaticSource::new()).await;
        assert!(poller.poll(&mut fetcher, &cache).await.is_empty());
        assert!(!cache.exists(LAST_SITEMAP_FETCH_KEY).await);
    }
}
