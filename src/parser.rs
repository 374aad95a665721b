//! Field extraction from raw article HTML.
//!
//! The corpus only depends on the narrow [`ArticleExtractor`] trait.
//! [`HtmlArticleParser`] is the default implementation: a set of CSS
//! selector fallback chains tuned to the site's article layout. Each field is
//! taken from the first selector in its chain that yields something. A
//! missing field degrades to empty/absent instead of failing the page.

use crate::models::Document;
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use itertools::Itertools;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use tracing::{debug, instrument};
use unicode_segmentation::UnicodeSegmentation;

/// Turns raw page bytes into a [`Document`].
pub trait ArticleExtractor {
    /// Extract the fields of the page at `uri`.
    fn extract(&self, html: &[u8], uri: &str) -> Result<Document, Box<dyn Error>>;
}

const TITLE_META: &[(&str, &str)] = &[
    (r#"meta[property="og:title"]"#, "content"),
    (r#"meta[name="twitter:title"]"#, "content"),
];
const TITLE_TEXT: &[&str] = &["h1.pg-title", "h1.title", "article h1", "h1", "title"];

const DESCRIPTION_META: &[(&str, &str)] = &[
    (r#"meta[name="description"]"#, "content"),
    (r#"meta[property="og:description"]"#, "content"),
];

const BODY_TEXT: &[&str] = &[
    "#article-content div.wsw p",
    "div.wsw p",
    r#"div[itemprop="articleBody"] p"#,
    "article p",
    "p",
];

const CATEGORY_META: &[(&str, &str)] = &[
    (r#"meta[name="keywords"]"#, "content"),
    (r#"meta[name="news_keywords"]"#, "content"),
    (r#"meta[property="article:section"]"#, "content"),
    (r#"meta[property="article:tag"]"#, "content"),
];

const DATE_META: &[(&str, &str)] = &[
    (r#"meta[property="article:published_time"]"#, "content"),
    (r#"meta[itemprop="datePublished"]"#, "content"),
    (r#"meta[name="date"]"#, "content"),
    ("div.published time[datetime]", "datetime"),
    ("time[datetime]", "datetime"),
];

/// Selector-based extractor for VOA article pages.
///
/// Generic `article`/`p` fallbacks keep it usable on other layouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlArticleParser;

impl ArticleExtractor for HtmlArticleParser {
    #[instrument(level = "debug", skip(self, html), fields(bytes = html.len()))]
    fn extract(&self, html: &[u8], uri: &str) -> Result<Document, Box<dyn Error>> {
        let text = String::from_utf8_lossy(html);
        if text.trim().is_empty() {
            return Err(format!("empty page for {uri}").into());
        }
        let page = Html::parse_document(&text);

        let title = first_attr(&page, TITLE_META)
            .or_else(|| first_text(&page, TITLE_TEXT))
            .map(|t| sentences(&t))
            .unwrap_or_default();

        let description = first_attr(&page, DESCRIPTION_META)
            .map(|d| sentences(&d))
            .unwrap_or_default();

        let body = BODY_TEXT
            .iter()
            .filter_map(|css| Selector::parse(css).ok())
            .map(|sel| {
                page.select(&sel)
                    .map(element_text)
                    .filter(|p| !p.is_empty())
                    .flat_map(|p| sentences(&p))
                    .collect::<Vec<_>>()
            })
            .find(|sentences| !sentences.is_empty())
            .unwrap_or_default();

        let categories = categories(&page);
        let date = all_attrs(&page, DATE_META).find_map(|raw| parse_date(&raw));

        debug!(
            title = title.len(),
            body = body.len(),
            categories = categories.len(),
            dated = date.is_some(),
            "Extracted article fields"
        );

        Ok(Document {
            title,
            body,
            description,
            categories,
            date,
            uri: uri.to_string(),
        })
    }
}

/// Split text into trimmed, non-empty sentences.
pub fn sentences(text: &str) -> Vec<String> {
    let normalized = text.split_whitespace().join(" ");
    normalized
        .unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a publication date in one of the formats seen on article pages.
///
/// Accepts RFC 3339, RFC 2822 and naive `YYYY-MM-DDTHH:MM:SS` (read as UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .or_else(|| {
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|naive| naive.and_utc().fixed_offset())
        })
}

fn categories(page: &Html) -> Vec<String> {
    all_attrs(page, CATEGORY_META)
        .flat_map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unique_by(|c| c.to_lowercase())
        .sorted_by_key(|c| c.to_lowercase())
        .collect()
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ").split_whitespace().join(" ")
}

fn first_text(page: &Html, chain: &[&str]) -> Option<String> {
    chain
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| {
            page.select(&sel)
                .map(element_text)
                .find(|t| !t.is_empty())
        })
}

fn first_attr(page: &Html, chain: &[(&str, &str)]) -> Option<String> {
    all_attrs(page, chain).next()
}

/// Non-empty attribute values for every selector in `chain`, in chain order.
fn all_attrs<'a>(
    page: &'a Html,
    chain: &'a [(&'a str, &'a str)],
) -> impl Iterator<Item = String> + 'a {
    chain.iter().flat_map(move |(css, attr)| {
        let values: Vec<String> = match Selector::parse(css) {
            Ok(sel) => page
                .select(&sel)
                .filter_map(|el| el.value().attr(attr))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
            Err(_) => Vec::new(),
        };
        values
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::article_html;

    const URI: &str = "https://www.voanews.com/a/a/1.html";

    #[test]
    fn test_extracts_all_fields() {
        let html = article_html(
            "Storm hits coast",
            "Winds reached 90mph overnight. Thousands lost power! Crews are working.",
        );
        let doc = HtmlArticleParser.extract(html.as_bytes(), URI).unwrap();

        assert_eq!(doc.title, vec!["Storm hits coast"]);
        assert_eq!(
            doc.body,
            vec![
                "Winds reached 90mph overnight.",
                "Thousands lost power!",
                "Crews are working.",
            ]
        );
        assert_eq!(
            doc.description,
            vec!["A short description.", "It has two sentences."]
        );
        assert_eq!(doc.categories, vec!["News", "Politics"]);
        assert_eq!(
            doc.date.unwrap().to_rfc3339(),
            "2024-03-01T10:15:00+00:00"
        );
        assert_eq!(doc.uri, URI);
    }

    #[test]
    fn test_falls_back_through_selector_chains() {
        let html = r#"<html><head><title>Fallback title</title></head>
<body><article><p>First   line.</p><p></p><p>Second line.</p></article>
<time datetime="Fri, 01 Mar 2024 10:15:00 +0000">1 March</time></body></html>"#;
        let doc = HtmlArticleParser.extract(html.as_bytes(), URI).unwrap();

        assert_eq!(doc.title, vec!["Fallback title"]);
        assert_eq!(doc.body, vec!["First line.", "Second line."]);
        assert!(doc.description.is_empty());
        assert!(doc.categories.is_empty());
        assert!(doc.date.is_some());
    }

    #[test]
    fn test_voa_headline_preferred_over_page_title() {
        let html = r#"<html><head><title>Storm hits coast | Voice of America - English</title></head>
<body><h1 class="title pg-title">Storm hits coast</h1>
<div class="wsw"><p>Winds rose.</p></div><p>Share this story.</p></body></html>"#;
        let doc = HtmlArticleParser.extract(html.as_bytes(), URI).unwrap();
        assert_eq!(doc.title, vec!["Storm hits coast"]);
        assert_eq!(doc.body, vec!["Winds rose."]);
    }

    #[test]
    fn test_malformed_markup_degrades_gracefully() {
        let doc = HtmlArticleParser
            .extract(b"<html><body><div><p>Unclosed paragraph", URI)
            .unwrap();
        assert!(doc.title.is_empty());
        assert_eq!(doc.body, vec!["Unclosed paragraph"]);
        assert!(doc.date.is_none());
    }

    #[test]
    fn test_empty_page_is_an_error() {
        assert!(HtmlArticleParser.extract(b"   ", URI).is_err());
    }

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-03-01T10:15:00+01:00").is_some());
        assert!(parse_date("Fri, 01 Mar 2024 10:15:00 GMT").is_some());
        assert_eq!(
            parse_date("2024-03-01T10:15:00").unwrap().to_rfc3339(),
            "2024-03-01T10:15:00+00:00"
        );
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_categories_case_insensitive_dedup() {
        let html = r#"<html><head>
<meta name="keywords" content="royals, News ,news,">
<meta property="article:section" content="Royals">
<meta property="article:tag" content="Crime">
</head><body></body></html>"#;
        let doc = HtmlArticleParser.extract(html.as_bytes(), URI).unwrap();
        assert_eq!(doc.categories, vec!["Crime", "News", "royals"]);
    }
}
