//! Web scraping module for content extraction.
//!
//! Uses reqwest for fetching and scraper for HTML parsing. Extraction never
//! fails: a page without readable content yields empty text and the caller
//! decides what is too short to summarise.

use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// User-Agent string identifying this scraper
const USER_AGENT: &str = concat!(
    "pagegist/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/cladam/pagegist)"
);

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Content containers tried in order before falling back to `<body>`.
pub const CONTENT_SELECTORS: [&str; 8] = [
    "article",
    "main",
    "[role=\"main\"]",
    ".article-content",
    ".post-content",
    ".entry-content",
    ".content",
    "#content",
];

/// Elements whose text never reaches the output.
const STRIPPED_ELEMENTS: &str = "script, style, noscript, template, nav, header, footer, aside, \
.nav, .header, .footer, .sidebar, .ad, .advertisement";

/// A container is accepted only if it yields more than this many characters.
pub const MIN_CONTENT_LENGTH: usize = 100;

/// Extracted text is cut to this many characters.
pub const MAX_TEXT_LENGTH: usize = 5000;

const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure", "h1",
    "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section", "table",
    "tr", "ul",
];

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("failed to fetch URL: {0}")]
    FetchError(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    HttpStatus(u16),
    #[error("failed to read file: {0}")]
    ReadError(#[from] std::io::Error),
}

/// Readable text pulled out of a page
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Page title
    pub title: Option<String>,
    /// Main text content, at most [`MAX_TEXT_LENGTH`] characters
    pub text: String,
    /// Number of characters in `text`
    pub char_count: usize,
}

/// Create a configured HTTP client for scraping
fn create_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
}

/// Fetch the raw HTML of a URL
pub async fn fetch_html(url: &str) -> Result<String, ScraperError> {
    let client = create_client()?;

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus(status.as_u16()));
    }

    let html = response.text().await?;
    tracing::debug!(url, bytes = html.len(), "fetched page");
    Ok(html)
}

/// Read HTML from a local file
pub fn read_html(path: &Path) -> Result<String, ScraperError> {
    Ok(std::fs::read_to_string(path)?)
}

/// Parse HTML source and extract its readable text
pub fn extract_html(html: &str) -> Extraction {
    extract(&Html::parse_document(html))
}

/// Extract the title and main text of a parsed document
pub fn extract(document: &Html) -> Extraction {
    let strip = Selector::parse(STRIPPED_ELEMENTS).unwrap();

    let text = select_content(document, &strip);
    let text: String = text.chars().take(MAX_TEXT_LENGTH).collect();
    let char_count = text.chars().count();

    Extraction {
        title: extract_title(document),
        text,
        char_count,
    }
}

/// Pick the first content container with enough text, else the whole body
fn select_content(document: &Html, strip: &Selector) -> String {
    for selector_str in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector_str) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = visible_text(element, strip);
            if text.chars().count() > MIN_CONTENT_LENGTH {
                tracing::debug!(selector = selector_str, "content container matched");
                return text;
            }
        }
    }

    let body_selector = Selector::parse("body").unwrap();
    let body = document
        .select(&body_selector)
        .next()
        .unwrap_or_else(|| document.root_element());
    tracing::debug!("no content container matched, using body");
    visible_text(body, strip)
}

/// Extract the page title from <title> or <h1>
fn extract_title(document: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).unwrap();
        let element = document.select(&selector).next()?;
        let title = element.text().collect::<Vec<_>>().join(" ");
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        (!title.is_empty()).then_some(title)
    })
}

/// Render an element's text roughly the way a browser's `innerText` would,
/// skipping any descendant matched by `strip`.
fn visible_text(element: ElementRef<'_>, strip: &Selector) -> String {
    let mut raw = String::new();
    collect_text(element, strip, &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, strip: &Selector, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                if strip.matches(&child_ref) {
                    continue;
                }
                let name = el.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_ref, strip, out);
                if block {
                    out.push('\n');
                } else if matches!(name, "td" | "th") {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}
