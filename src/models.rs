//! Data models handed out by the corpus.
//!
//! - [`Document`]: the structured view of one cached article page
//! - [`DocumentRef`]: how callers name a document (by id or by URL)

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Structured fields extracted from an article page.
///
/// Documents are built from the cached HTML on every access and are never
/// stored themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Headline sentences (usually one).
    pub title: Vec<String>,
    /// Body text, one sentence per entry.
    pub body: Vec<String>,
    /// Standfirst/description sentences.
    pub description: Vec<String>,
    /// Sorted, case-insensitively de-duplicated categories.
    pub categories: Vec<String>,
    /// Publication time, if the page states one.
    pub date: Option<DateTime<FixedOffset>>,
    /// URL the page was fetched from.
    pub uri: String,
}

impl Document {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Title sentences joined with spaces.
    pub fn title_text(&self) -> String {
        self.title.join(" ")
    }

    /// Body sentences joined with spaces.
    pub fn body_text(&self) -> String {
        self.body.join(" ")
    }
}

/// A document named by index position or by source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    Id(usize),
    Uri(String),
}

impl FromStr for DocumentRef {
    type Err = Infallible;

    /// Plain non-negative integers are ids; anything else is a URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(id) => DocumentRef::Id(id),
            Err(_) => DocumentRef::Uri(s.to_string()),
        })
    }
}

impl From<usize> for DocumentRef {
    fn from(id: usize) -> Self {
        DocumentRef::Id(id)
    }
}

impl From<&str> for DocumentRef {
    fn from(uri: &str) -> Self {
        DocumentRef::Uri(uri.to_string())
    }
}

impl From<String> for DocumentRef {
    fn from(uri: String) -> Self {
        DocumentRef::Uri(uri)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRef::Id(id) => write!(f, "#{id}"),
            DocumentRef::Uri(uri) => write!(f, "{uri}"),
        }
    }
}
