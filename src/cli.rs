//! Command-line interface definitions for the news corpus crawler.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Corpus-wide options are global and may also come from environment
//! variables.

use clap::{Parser, Subcommand};
use news_corpus::config::{CorpusConfig, Expiration};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Command-line arguments for the news corpus crawler.
///
/// # Examples
///
/// ```sh
/// # Discover new articles and fetch everything not cached yet
/// news_corpus --corpus-root ./corpus update --verbose
///
/// # Index two specific articles only
/// news_corpus update --url https://www.voanews.com/a/senate-passes-budget/7531234.html \
///     --url https://www.voanews.com/a/storm-hits-coast/7531301.html
///
/// # Print document 12 as JSON
/// NEWS_CORPUS_ROOT=./corpus news_corpus show 12
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding the cache and sitemap snapshots
    #[arg(long, global = true, env = "NEWS_CORPUS_ROOT")]
    pub corpus_root: Option<PathBuf>,

    /// News sitemap to poll
    #[arg(long, global = true, env = "NEWS_CORPUS_SITEMAP_URL")]
    pub sitemap_url: Option<Url>,

    /// Page listing the site's RSS feeds
    #[arg(long, global = true)]
    pub feed_listing_url: Option<Url>,

    /// Lifetime of cached pages: never, or a number with s, m, h or d
    #[arg(long, global = true, default_value = "never")]
    pub expiration: Expiration,

    /// Minimum seconds between two requests
    #[arg(long, global = true, env = "NEWS_CORPUS_FETCH_DELAY", default_value_t = 30)]
    pub fetch_delay_secs: u64,

    /// Minimum seconds between two sitemap downloads
    #[arg(long, global = true, default_value_t = 600)]
    pub sitemap_cooldown_secs: u64,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover new articles, index them and fetch uncached pages
    Update {
        /// Log progress and ETA for every fetch
        #[arg(short, long)]
        verbose: bool,

        /// Read one feed and fetch one document only
        #[arg(long)]
        testing: bool,

        /// Index these URLs instead of running discovery (repeatable)
        #[arg(long = "url")]
        urls: Vec<Url>,
    },

    /// Print one parsed document as JSON
    Show {
        /// Document id or article URL
        document: String,
    },

    /// Print document and cache counts
    Stats,

    /// Print every indexed URL with its id
    Uris,

    /// Write each parsable document to <OUTPUT_DIR>/<id>.json
    Export {
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Export at most this many documents
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

impl Cli {
    /// Build the corpus configuration from the global options.
    ///
    /// # Errors
    ///
    /// Fails when no corpus root was given.
    pub fn corpus_config(&self) -> Result<CorpusConfig, Box<dyn Error>> {
        let mut config = CorpusConfig::from_root_or_env(self.corpus_root.clone())?;
        if let Some(url) = &self.sitemap_url {
            config.site.sitemap_url = url.to_string();
        }
        if let Some(url) = &self.feed_listing_url {
            config.site.feed_listing_url = url.to_string();
        }
        config.expiration = self.expiration;
        config.fetch_interval = Duration::from_secs(self.fetch_delay_secs);
        config.sitemap_cooldown = Duration::from_secs(self.sitemap_cooldown_secs);
        config.request_timeout = self.timeout_secs.map(Duration::from_secs);
        Ok(config)
    }
}
