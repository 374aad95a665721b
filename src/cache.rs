//! Durable key/value cache on disk.
//!
//! Every entry is one file under the cache root, named by its key. Article
//! pages are keyed by [`crate::utils::url_key`]; control records use fixed
//! names such as [`INDEX_KEY`] and [`LAST_SITEMAP_FETCH_KEY`].
//!
//! # Layout
//!
//! ```text
//! cache/
//! ├── urlIndex
//! ├── lastFetchTime
//! ├── 3f1c…e2            # raw article HTML
//! └── 3f1c…e2.expires    # only for entries written with an expiration
//! ```
//!
//! A cache directory belongs to exactly one corpus instance at a time. There
//! is no locking: two processes sharing a directory race on `urlIndex` and
//! the last writer wins.

use crate::config::Expiration;
use crate::utils::ensure_private_dir;
use chrono::Utc;
use std::error::Error;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

/// Key holding the serialized document index.
pub const INDEX_KEY: &str = "urlIndex";

/// Key holding the epoch seconds of the last sitemap download.
pub const LAST_SITEMAP_FETCH_KEY: &str = "lastFetchTime";

const EXPIRES_SUFFIX: &str = ".expires";

/// File-backed cache rooted at one directory.
#[derive(Debug, Clone)]
pub struct PersistentCache {
    root: PathBuf,
}

impl PersistentCache {
    /// Open the cache, creating its root with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Fails if the root directory cannot be created.
    #[instrument(level = "info", skip_all, fields(root = %root.as_ref().display()))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let root = root.as_ref().to_path_buf();
        ensure_private_dir(&root)
            .await
            .map_err(|e| format!("cannot create cache directory {}: {e}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read an entry. Missing and expired entries read as `None`.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Box<dyn Error>> {
        let path = self.entry_path(key)?;
        if self.expired(key).await? {
            self.remove(key).await?;
            return Ok(None);
        }
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write an entry, replacing any previous value and expiration.
    pub async fn set(
        &self,
        key: &str,
        value: &[u8],
        expiration: Expiration,
    ) -> Result<(), Box<dyn Error>> {
        let path = self.entry_path(key)?;
        let tmp = self.root.join(format!("{key}.tmp"));
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;

        let expires_path = self.root.join(format!("{key}{EXPIRES_SUFFIX}"));
        match expiration {
            Expiration::Never => match fs::remove_file(&expires_path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
            Expiration::After(ttl) => {
                let at = Utc::now().timestamp() + ttl.as_secs() as i64;
                fs::write(&expires_path, at.to_string()).await?;
            }
        }
        debug!(key, bytes = value.len(), %expiration, "Cached entry");
        Ok(())
    }

    /// Whether a live (present and unexpired) entry exists for `key`.
    pub async fn exists(&self, key: &str) -> bool {
        let Ok(path) = self.entry_path(key) else {
            return false;
        };
        if self.expired(key).await.unwrap_or(false) {
            return false;
        }
        fs::try_exists(&path).await.unwrap_or(false)
    }

    /// Delete an entry and its expiration record if present.
    pub async fn remove(&self, key: &str) -> Result<(), Box<dyn Error>> {
        let path = self.entry_path(key)?;
        let expires_path = self.root.join(format!("{key}{EXPIRES_SUFFIX}"));
        for p in [path, expires_path] {
            match fs::remove_file(&p).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn expired(&self, key: &str) -> Result<bool, Box<dyn Error>> {
        let expires_path = self.root.join(format!("{key}{EXPIRES_SUFFIX}"));
        let raw = match fs::read_to_string(&expires_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let at: i64 = raw.trim().parse()?;
        Ok(Utc::now().timestamp() >= at)
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, Box<dyn Error>> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(format!("invalid cache key '{key}'").into());
        }
        Ok(self.root.join(key))
    }
}
