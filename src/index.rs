//! Ordered, de-duplicated mapping between document ids and source URLs.
//!
//! A document's id is its position in the index. Positions are only ever
//! assigned by appending, so an id stays valid for as long as the corpus
//! directory lives. The whole index is stored as a JSON array under
//! [`INDEX_KEY`] and rewritten after every mutation.

use crate::cache::{INDEX_KEY, PersistentCache};
use crate::config::Expiration;
use std::collections::HashMap;
use std::error::Error;
use tracing::{debug, error, info, instrument};

/// In-memory copy of the URL index, persisted through the cache.
#[derive(Debug)]
pub struct DocumentIndex {
    cache: PersistentCache,
    urls: Vec<String>,
    positions: HashMap<String, usize>,
}

impl DocumentIndex {
    /// Load the index from the cache, starting empty if none is stored.
    ///
    /// # Errors
    ///
    /// Fails if the stored index cannot be read or is not a JSON array of
    /// strings.
    #[instrument(level = "info", skip_all)]
    pub async fn load(cache: PersistentCache) -> Result<Self, Box<dyn Error>> {
        let urls: Vec<String> = match cache.get(INDEX_KEY).await? {
            Some(raw) => serde_json::from_slice(&raw)
                .map_err(|e| format!("corrupt document index in {}: {e}", cache.root().display()))?,
            None => Vec::new(),
        };

        let mut index = Self {
            cache,
            urls: Vec::with_capacity(urls.len()),
            positions: HashMap::with_capacity(urls.len()),
        };
        for url in urls {
            index.append_if_new(url);
        }
        info!(documents = index.len(), "Loaded document index");
        Ok(index)
    }

    /// URL of document `id`.
    pub fn get(&self, id: usize) -> Option<&str> {
        self.urls.get(id).map(String::as_str)
    }

    /// Id of `url` if it is indexed.
    pub fn position(&self, url: &str) -> Option<usize> {
        self.positions.get(url).copied()
    }

    /// Id of `url`, appending it first if it has not been seen.
    pub async fn get_or_assign(&mut self, url: &str) -> usize {
        if let Some(id) = self.position(url) {
            return id;
        }
        let id = self.append_if_new(url.to_string());
        debug!(id, %url, "Assigned document id");
        self.persist_logged().await;
        id
    }

    /// Append every unseen URL in order and persist once. Returns how many
    /// were added.
    pub async fn merge<I>(&mut self, urls: I) -> usize
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let before = self.urls.len();
        for url in urls {
            let url = url.as_ref();
            if !self.positions.contains_key(url) {
                self.append_if_new(url.to_string());
            }
        }
        let added = self.urls.len() - before;
        if added > 0 {
            self.persist_logged().await;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    /// Every indexed URL, in id order.
    pub fn all(&self) -> &[String] {
        &self.urls
    }

    /// Write the full index to the cache.
    pub async fn persist(&self) -> Result<(), Box<dyn Error>> {
        let blob = serde_json::to_vec(&self.urls)?;
        self.cache.set(INDEX_KEY, &blob, Expiration::Never).await
    }

    // The in-memory index stays authoritative when a write fails; the next
    // mutation rewrites the whole blob.
    async fn persist_logged(&self) {
        if let Err(e) = self.persist().await {
            error!(documents = self.len(), error = %e, "Failed to persist document index");
        }
    }

    fn append_if_new(&mut self, url: String) -> usize {
        if let Some(id) = self.positions.get(&url) {
            return *id;
        }
        let id = self.urls.len();
        self.positions.insert(url.clone(), id);
        self.urls.push(url);
        id
    }
}
