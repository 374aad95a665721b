//! Article URL discovery.
//!
//! Two independent producers of candidate article URLs feed the corpus:
//!
//! | Path | Module | Source | Failure policy |
//! |------|--------|--------|----------------|
//! | Sitemap | [`sitemap`] | news sitemap snapshots on disk | per file: log and continue |
//! | RSS | [`rss`] | feeds listed on the site's RSS page | per cycle: first parse error empties the result |
//!
//! Both filter candidates through the same [`ArticleFilter`] and return a
//! sorted, de-duplicated list.

use crate::config::SiteProfile;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use regex::Regex;
use std::error::Error;

pub mod rss;
pub mod sitemap;

/// Decides whether a URL looks like an article page.
#[derive(Debug, Clone)]
pub struct ArticleFilter {
    marker: String,
    extension: String,
}

impl ArticleFilter {
    pub fn new(marker: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            extension: extension.into(),
        }
    }

    pub fn from_profile(site: &SiteProfile) -> Self {
        Self::new(&site.article_marker, &site.article_extension)
    }

    /// True for `http(s)` URLs containing the article marker and ending in
    /// the article extension.
    pub fn accepts(&self, url: &str) -> bool {
        (url.starts_with("http://") || url.starts_with("https://"))
            && url.contains(&self.marker)
            && url.ends_with(&self.extension)
    }
}

/// Cleans up links taken from RSS items.
#[derive(Debug, Clone)]
pub struct LinkNormalizer {
    redirect: Regex,
    tracking: Regex,
    extension: String,
}

impl LinkNormalizer {
    /// # Errors
    ///
    /// Fails if either pattern is not a valid regex.
    pub fn new(
        redirect_pattern: &str,
        tracking_pattern: &str,
        extension: impl Into<String>,
    ) -> Result<Self, Box<dyn Error>> {
        Ok(Self {
            redirect: Regex::new(redirect_pattern)?,
            tracking: Regex::new(tracking_pattern)?,
            extension: extension.into(),
        })
    }

    pub fn from_profile(site: &SiteProfile) -> Result<Self, Box<dyn Error>> {
        Self::new(
            &site.redirect_pattern,
            &site.tracking_pattern,
            &site.article_extension,
        )
    }

    /// Unwrap a percent-encoded redirect target, then drop the query.
    ///
    /// When the path ends in the article extension the whole query (and any
    /// fragment) goes. Otherwise only a trailing tracking query is removed.
    pub fn normalize(&self, link: &str) -> String {
        let link = link.trim();
        let unwrapped = self
            .redirect
            .captures(link)
            .and_then(|caps| caps.get(1))
            .and_then(|target| urlencoding::decode(target.as_str()).ok())
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|| link.to_string());
        if let Some((path, _)) = unwrapped.split_once(['?', '#'])
            && path.ends_with(&self.extension)
        {
            return path.to_string();
        }
        self.tracking.replace(&unwrapped, "").into_owned()
    }
}

/// Append the text carried by a text-like XML event to `acc`.
///
/// `acc` holds still-escaped XML text: entity references are re-emitted as
/// `&name;` and CDATA is escaped, so the caller unescapes once at the end.
pub(crate) fn append_escaped_text(acc: &mut String, event: &Event<'_>) -> Result<(), Box<dyn Error>> {
    match event {
        Event::Text(t) => acc.push_str(&t.decode()?),
        Event::CData(t) => {
            let text = t.decode()?;
            acc.push_str(&escape(&*text));
        }
        Event::GeneralRef(r) => {
            acc.push('&');
            acc.push_str(&r.decode()?);
            acc.push(';');
        }
        _ => {}
    }
    Ok(())
}
