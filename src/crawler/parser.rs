//! HTML parser for extracting page metadata
//!
//! This module turns a fetched HTML body into what the crawl needs:
//! - Page title
//! - Plain text for the search index
//! - Raw anchor targets for the link normalizer

use crate::url::anchor_hrefs;
use scraper::{ElementRef, Html, Selector};

/// Elements whose text never reaches the search index
const NON_CONTENT_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Visible text with whitespace collapsed
    pub plain_text: String,

    /// Raw `href` values of every anchor, unresolved
    pub hrefs: Vec<String>,
}

/// Parses HTML content and extracts title, plain text and anchors
///
/// Parsing is lenient: malformed markup still yields whatever the HTML5
/// parser recovers.
///
/// # Example
///
/// ```
/// use sla_crawler::crawler::parse_html;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let parsed = parse_html(html);
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.hrefs, vec!["/page".to_string()]);
/// ```
pub fn parse_html(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: extract_title(&document),
        plain_text: extract_plain_text(&document),
        hrefs: anchor_hrefs(&document),
    }
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Collects the text of `<body>` (or the whole document when there is none)
fn extract_plain_text(document: &Html) -> String {
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut words: Vec<&str> = Vec::new();
    for node in body.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ElementRef::wrap(ancestor)
                .map(|el| NON_CONTENT_ELEMENTS.contains(&el.value().name()))
                .unwrap_or(false)
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}
