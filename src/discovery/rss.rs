//! RSS feed discovery.
//!
//! The site publishes a page listing its RSS feeds. Feed URLs are pulled out
//! of that page with a regex matching the site's feed naming convention.
//! This is simple and will break if the page layout changes a lot.
//! Each feed is then fetched and every `<item><link>` is normalized
//! (redirect wrappers unwrapped, tracking query stripped) and filtered to
//! article URLs.
//!
//! # Failure Policy
//!
//! A feed that cannot be fetched is skipped. A feed that cannot be parsed
//! abandons the whole cycle and yields no URLs. Sitemap discovery is more
//! tolerant (one bad snapshot does not affect the others).

use super::{ArticleFilter, LinkNormalizer, append_escaped_text};
use crate::config::SiteProfile;
use crate::fetcher::{PageSource, RateLimitedFetcher};
use itertools::Itertools;
use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use regex::Regex;
use std::collections::HashSet;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};

/// Discovers article URLs through the site's RSS feeds.
#[derive(Debug, Clone)]
pub struct RssPoller {
    listing_url: String,
    feed_re: Regex,
    normalizer: LinkNormalizer,
    filter: ArticleFilter,
}

impl RssPoller {
    /// # Errors
    ///
    /// Fails if one of the profile's patterns is not a valid regex.
    pub fn new(site: &SiteProfile) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            listing_url: site.feed_listing_url.clone(),
            feed_re: Regex::new(&site.feed_pattern)?,
            normalizer: LinkNormalizer::from_profile(site)?,
            filter: ArticleFilter::from_profile(site),
        })
    }

    /// Run one discovery cycle and return the sorted distinct article URLs.
    ///
    /// In testing mode only the first listed feed is read.
    #[instrument(level = "info", skip_all, fields(listing = %self.listing_url, testing = testing))]
    pub async fn poll<S: PageSource>(
        &self,
        fetcher: &mut RateLimitedFetcher<S>,
        testing: bool,
    ) -> Vec<String> {
        let Some(listing) = fetcher.fetch(&self.listing_url).await else {
            warn!("Feed listing unavailable; no RSS discovery this cycle");
            return Vec::new();
        };

        let mut feeds = self.feed_urls(&String::from_utf8_lossy(&listing));
        if testing {
            feeds.truncate(1);
        }
        info!(feeds = feeds.len(), "Found RSS feeds");

        let mut found = HashSet::new();
        for feed in &feeds {
            let Some(body) = fetcher.fetch(feed).await else {
                warn!(%feed, "Feed unavailable; skipping");
                continue;
            };
            match parse_item_links(&body) {
                Ok(links) => {
                    let before = found.len();
                    found.extend(
                        links
                            .iter()
                            .map(|link| self.normalizer.normalize(link))
                            .filter(|url| self.filter.accepts(url)),
                    );
                    debug!(%feed, items = links.len(), new = found.len() - before, "Read feed");
                }
                Err(e) => {
                    error!(%feed, error = %e, "Feed parse failed; abandoning RSS discovery for this cycle");
                    return Vec::new();
                }
            }
        }

        let mut urls: Vec<String> = found.into_iter().collect();
        urls.sort();
        info!(count = urls.len(), "RSS discovery complete");
        urls
    }

    /// Feed URLs mentioned on the listing page, in first-seen order.
    pub fn feed_urls(&self, page: &str) -> Vec<String> {
        self.feed_re
            .find_iter(page)
            .map(|m| m.as_str().to_string())
            .unique()
            .collect()
    }
}

/// Every `<item><link>` of an RSS document.
///
/// # Errors
///
/// Fails on malformed XML or when the document has no `<rss>`, `<rdf:RDF>`
/// or `<channel>` element.
pub fn parse_item_links(xml: &[u8]) -> Result<Vec<String>, Box<dyn Error>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut links = Vec::new();
    let mut is_feed = false;
    let mut in_item = false;
    // Escaped text of the `<link>` being read.
    let mut link: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"rss" | b"rdf:RDF" | b"channel" => is_feed = true,
                b"item" => in_item = true,
                b"link" if in_item => link = Some(String::new()),
                _ => {}
            },
            event @ (Event::Text(_) | Event::CData(_) | Event::GeneralRef(_)) => {
                if let Some(acc) = link.as_mut() {
                    append_escaped_text(acc, &event)?;
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"link" => {
                    if let Some(raw) = link.take() {
                        let value = unescape(&raw)?;
                        let value = value.trim();
                        if !value.is_empty() {
                            links.push(value.to_string());
                        }
                    }
                }
                b"item" => in_item = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !is_feed {
        return Err("document is not an RSS feed".into());
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StaticSource;
    use std::time::Duration;

    const LISTING: &str = "https://www.voanews.com/rssfeeds";

    fn listing_page(feeds: &[&str]) -> String {
        let mut page = String::from("<html><body><ul>");
        for feed in feeds {
            page.push_str(&format!(r#"<li><a href="{feed}">{feed}</a></li>"#));
        }
        page.push_str("</ul></body></html>");
        page
    }

    fn feed(links: &[&str]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Feed</title><link>https://www.voanews.com/home/index.html</link>"#,
        );
        for link in links {
            xml.push_str(&format!("<item><title>T</title><link>{link}</link></item>"));
        }
        xml.push_str("</channel></rss>");
        xml
    }

    fn poller() -> RssPoller {
        RssPoller::new(&SiteProfile::default()).unwrap()
    }

    #[test]
    fn test_feed_urls_deduplicated_in_order() {
        let page = listing_page(&[
            "https://www.voanews.com/api/znews",
            "https://www.voanews.com/api/zsport",
            "https://www.voanews.com/api/znews",
        ]);
        assert_eq!(
            poller().feed_urls(&page),
            vec![
                "https://www.voanews.com/api/znews",
                "https://www.voanews.com/api/zsport",
            ]
        );
    }

    #[test]
    fn test_parse_item_links_skips_channel_link() {
        let xml = feed(&[
            "https://www.voanews.com/a/a/1.html?utm_source=rss&amp;utm_campaign=news",
        ]);
        assert_eq!(
            parse_item_links(xml.as_bytes()).unwrap(),
            vec!["https://www.voanews.com/a/a/1.html?utm_source=rss&utm_campaign=news"]
        );
    }

    #[test]
    fn test_parse_item_links_rejects_non_feeds() {
        assert!(parse_item_links(b"<html><body><p>oops</p></body></html>").is_err());
        assert!(parse_item_links(b"<rss><channel><item></link></item></channel></rss>").is_err());
    }

    #[tokio::test]
    async fn test_poll_normalizes_filters_and_dedups() {
        let news = "https://www.voanews.com/api/znews";
        let sport = "https://www.voanews.com/api/zsport";
        let source = StaticSource::new()
            .with_page(LISTING, listing_page(&[news, sport]))
            .with_page(
                news,
                feed(&[
                    "https://www.voanews.com/a/b/2.html?utm_source=rss&amp;utm_medium=feed",
                    "https://www.voanews.com/a/a/1.html",
                    "https://www.voanews.com/video/news/video-9/v.html",
                ]),
            )
            .with_page(
                sport,
                feed(&["https://www.voanews.com/a/a/1.html?utm_campaign=news"]),
            );
        let mut fetcher = RateLimitedFetcher::new(source, Duration::ZERO);

        let urls = poller().poll(&mut fetcher, false).await;
        assert_eq!(
            urls,
            vec![
                "https://www.voanews.com/a/a/1.html",
                "https://www.voanews.com/a/b/2.html",
            ]
        );
    }

    #[tokio::test]
    async fn test_testing_mode_reads_one_feed() {
        let news = "https://www.voanews.com/api/znews";
        let sport = "https://www.voanews.com/api/zsport";
        let source = StaticSource::new()
            .with_page(LISTING, listing_page(&[news, sport]))
            .with_page(news, feed(&["https://www.voanews.com/a/a/1.html"]))
            .with_page(sport, feed(&["https://www.voanews.com/a/b/2.html"]));
        let requests = source.requests();
        let mut fetcher = RateLimitedFetcher::new(source, Duration::ZERO);

        let urls = poller().poll(&mut fetcher, true).await;
        assert_eq!(urls, vec!["https://www.voanews.com/a/a/1.html"]);
        assert_eq!(*requests.lock().unwrap(), vec![LISTING.to_string(), news.to_string()]);
    }

    #[tokio::test]
    async fn test_parse_failure_abandons_cycle() {
        let good = "https://www.voanews.com/api/znews";
        let bad = "https://www.voanews.com/api/zbroken";
        let later = "https://www.voanews.com/api/zsport";
        let source = StaticSource::new()
            .with_page(LISTING, listing_page(&[good, bad, later]))
            .with_page(good, feed(&["https://www.voanews.com/a/a/1.html"]))
            .with_page(bad, "<html>Service unavailable</html>")
            .with_page(later, feed(&["https://www.voanews.com/a/b/2.html"]));
        let requests = source.requests();
        let mut fetcher = RateLimitedFetcher::new(source, Duration::ZERO);

        assert!(poller().poll(&mut fetcher, false).await.is_empty());
        assert!(!requests.lock().unwrap().contains(&later.to_string()));
    }

    #[tokio::test]
    async fn test_missing_feed_is_skipped() {
        let missing = "https://www.voanews.com/api/zgone";
        let news = "https://www.voanews.com/api/znews";
        let source = StaticSource::new()
            .with_page(LISTING, listing_page(&[missing, news]))
            .with_page(news, feed(&["https://www.voanews.com/a/a/1.html"]));
        let mut fetcher = RateLimitedFetcher::new(source, Duration::ZERO);

        assert_eq!(
            poller().poll(&mut fetcher, false).await,
            vec!["https://www.voanews.com/a/a/1.html"]
        );
    }
}
