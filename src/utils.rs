//! Small helpers shared by the crawl engine.
//!
//! This module provides:
//! - Cache-key derivation from article URLs
//! - Human-readable ETA formatting for priming progress
//! - Sentinel ("placeholder page") detection
//! - String truncation for logging
//! - Owner-only directory creation for the corpus state

use sha2::{Digest, Sha256};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, instrument};

/// Phrases that mark a page as "no real article" regardless of HTTP status.
pub const SENTINEL_MARKERS: &[&str] = &[
    "This page is in the process of being created",
    "The page you requested could not be found",
    "Sorry, this page is currently unavailable",
];

/// Derive the cache key for an article URL.
///
/// The key is the first 128 bits of the SHA-256 digest of the URL, rendered
/// as 32 lowercase hex characters. It is bounded in length and filesystem
/// safe no matter how long the URL is.
///
/// # Examples
///
/// ```
/// use news_corpus::utils::url_key;
///
/// let key = url_key("https://www.voanews.com/a/story/7000001.html");
/// assert_eq!(key.len(), 32);
/// assert_eq!(key, url_key("https://www.voanews.com/a/story/7000001.html"));
/// ```
pub fn url_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    hex::encode(&digest[..16])
}

/// Whether a page body contains one of the [`SENTINEL_MARKERS`].
pub fn is_sentinel(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    SENTINEL_MARKERS.iter().any(|marker| text.contains(marker))
}

const UNITS: &[(&str, u64)] = &[
    ("decade", 315_576_000),
    ("year", 31_557_600),
    ("month", 2_629_800),
    ("week", 604_800),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// Format a duration using the largest whole time unit it reaches.
///
/// # Examples
///
/// ```
/// use news_corpus::utils::format_eta;
/// use std::time::Duration;
///
/// assert_eq!(format_eta(Duration::from_secs(90)), "1 minute");
/// assert_eq!(format_eta(Duration::from_secs(3 * 3600)), "3 hours");
/// assert_eq!(format_eta(Duration::ZERO), "0 seconds");
/// ```
pub fn format_eta(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (unit, size) = UNITS
        .iter()
        .copied()
        .find(|(_, size)| secs >= *size)
        .unwrap_or(("second", 1));
    let count = secs / size;
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` bytes (backing off to a character
/// boundary) with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Create a directory (and parents) readable only by the owner.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or its permissions
/// cannot be restricted.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_private_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await?;
    }
    debug!("Directory ready");
    Ok(())
}
