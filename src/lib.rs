//! # News Corpus
//!
//! Builds a local research corpus of articles from one news site.
//!
//! Article URLs are discovered from the site's news sitemap and its RSS
//! feeds, given stable numeric ids in a persistent index, and fetched at a
//! polite rate into an on-disk cache. Parsed [`Document`]s are produced from
//! the cached HTML on demand.
//!
//! ## Architecture
//!
//! 1. **Discovery** ([`discovery`]): sitemap snapshots and RSS feeds propose
//!    article URLs
//! 2. **Indexing** ([`index`]): new URLs are appended, existing ids never move
//! 3. **Fetching** ([`fetcher`]): one request at a time, spaced by a minimum
//!    interval
//! 4. **Caching** ([`cache`]): raw pages stored under a hash of their URL
//! 5. **Parsing** ([`parser`]): selector-based field extraction
//!
//! [`Corpus`] drives all of the above.
//!
//! ## Usage
//!
//! ```no_run
//! use news_corpus::{Corpus, CorpusConfig, UpdateOptions};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut corpus = Corpus::open(CorpusConfig::new("./corpus")).await?;
//! corpus.update(UpdateOptions::default()).await;
//! if let Some(doc) = corpus.get_document(0usize).await {
//!     println!("{}", doc.title_text());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod corpus;
pub mod discovery;
pub mod fetcher;
pub mod index;
pub mod models;
pub mod outputs;
pub mod parser;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use config::{CorpusConfig, Expiration, SiteProfile};
pub use corpus::{Corpus, PrimeReport, UpdateOptions, UpdateReport};
pub use models::{Document, DocumentRef};
