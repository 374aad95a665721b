//! Corpus configuration and the profile of the crawled site.
//!
//! [`CorpusConfig`] carries everything the crawl engine needs: where the
//! corpus lives on disk, how politely to fetch, and how long cached pages
//! stay valid. [`SiteProfile`] captures the site-specific conventions used by
//! URL discovery (sitemap location, feed naming, article URL shape).

use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable consulted when no corpus root is given explicitly.
pub const CORPUS_ROOT_ENV: &str = "NEWS_CORPUS_ROOT";

/// Default minimum delay between two fetches.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(30);

/// Default minimum delay between two sitemap downloads.
pub const DEFAULT_SITEMAP_COOLDOWN: Duration = Duration::from_secs(10 * 60);

/// How long a cache entry stays valid after it is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    /// Keep the entry until it is deleted externally.
    #[default]
    Never,
    /// Treat the entry as absent once this much time has passed.
    After(Duration),
}

impl FromStr for Expiration {
    type Err = String;

    /// Parse `never` or a number followed by `s`, `m`, `h` or `d`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("never") {
            return Ok(Expiration::Never);
        }
        let split = s
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("missing unit in expiration '{s}' (use s, m, h or d)"))?;
        let (digits, unit) = s.split_at(split);
        let n: u64 = digits
            .parse()
            .map_err(|_| format!("invalid number in expiration '{s}'"))?;
        let secs = match unit {
            "s" => n,
            "m" => n * 60,
            "h" => n * 3_600,
            "d" => n * 86_400,
            other => return Err(format!("unknown expiration unit '{other}'")),
        };
        Ok(Expiration::After(Duration::from_secs(secs)))
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiration::Never => write!(f, "never"),
            Expiration::After(d) => write!(f, "{}s", d.as_secs()),
        }
    }
}

/// Site-specific conventions for discovering article URLs.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// The news sitemap polled by the sitemap path.
    pub sitemap_url: String,
    /// The page listing the site's RSS feeds.
    pub feed_listing_url: String,
    /// Regex matching feed URLs inside the feed-listing page.
    pub feed_pattern: String,
    /// Substring every article URL contains.
    pub article_marker: String,
    /// Suffix every article URL ends with.
    pub article_extension: String,
    /// Regex capturing a percent-encoded target URL inside a redirect wrapper.
    pub redirect_pattern: String,
    /// Regex matching a trailing tracking query on links that do not end in
    /// the article extension. Queries after the extension are always dropped.
    pub tracking_pattern: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            sitemap_url: "https://www.voanews.com/sitemap_news.xml".to_string(),
            feed_listing_url: "https://www.voanews.com/rssfeeds".to_string(),
            feed_pattern: r"https?://www\.voanews\.com/api/[A-Za-z0-9_$\-]+".to_string(),
            article_marker: "/a/".to_string(),
            article_extension: ".html".to_string(),
            redirect_pattern: r"^https?://[^?#]+[?&](?:url|u|link)=(https?%3[Aa]%2[Ff]%2[Ff][^&#]+)"
                .to_string(),
            tracking_pattern: r"[?&](?:utm_[a-z]+|src|ref)=[^#]*$".to_string(),
        }
    }
}

/// Settings for one corpus instance.
#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Directory holding `cache/` and `sitenews/`.
    pub root: PathBuf,
    /// Site conventions used by discovery.
    pub site: SiteProfile,
    /// Expiration attached to cached article pages.
    pub expiration: Expiration,
    /// Minimum delay between two fetches.
    pub fetch_interval: Duration,
    /// Minimum delay between two sitemap downloads.
    pub sitemap_cooldown: Duration,
    /// Optional per-request timeout for the HTTP client.
    pub request_timeout: Option<Duration>,
}

impl CorpusConfig {
    /// Build a config with defaults for everything but the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            site: SiteProfile::default(),
            expiration: Expiration::Never,
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            sitemap_cooldown: DEFAULT_SITEMAP_COOLDOWN,
            request_timeout: None,
        }
    }

    /// Build a config from an explicit root, falling back to
    /// [`CORPUS_ROOT_ENV`].
    ///
    /// # Errors
    ///
    /// Fails when neither an explicit root nor the environment variable is
    /// set.
    pub fn from_root_or_env(root: Option<PathBuf>) -> Result<Self, Box<dyn Error>> {
        let root = match root {
            Some(root) => root,
            None => match std::env::var_os(CORPUS_ROOT_ENV) {
                Some(v) if !v.is_empty() => PathBuf::from(v),
                _ => {
                    return Err(format!(
                        "no corpus root given; pass --corpus-root or set {CORPUS_ROOT_ENV}"
                    )
                    .into());
                }
            },
        };
        Ok(Self::new(root))
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn sitenews_new_dir(&self) -> PathBuf {
        self.root.join("sitenews").join("new")
    }

    pub fn sitenews_old_dir(&self) -> PathBuf {
        self.root.join("sitenews").join("old")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
