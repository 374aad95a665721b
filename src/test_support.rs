//! In-memory page sources for tests.

use crate::fetcher::PageSource;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Serves fixed bodies by URL and records every request.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    pages: HashMap<String, Vec<u8>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.to_string(), body.into());
        self
    }

    /// Shared view of the URLs requested so far, in order.
    pub fn requests(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.requests)
    }
}

impl PageSource for StaticSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>, Box<dyn Error>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| format!("404 for {url}").into())
    }
}

/// A minimal article page in the VOA layout the default parser understands.
pub fn article_html(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<title>{title}</title>
<meta property="og:title" content="{title}">
<meta name="description" content="A short description. It has two sentences.">
<meta name="keywords" content="News,Politics,news">
</head>
<body>
<div class="col-title"><h1 class="title pg-title">{title}</h1></div>
<div class="published"><span class="date"><time pubdate="pubdate" datetime="2024-03-01T10:15:00+00:00">March 01, 2024 10:15 AM</time></span></div>
<div id="article-content" class="content-floated-wrap">
<div class="wsw"><p>{body}</p></div>
</div>
<div class="media-block-wrap"><p>Related: unrelated teaser</p></div>
</body>
</html>"#
    )
}
