//! CSS selector cascades for Flipkart's markup variants

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::price::parse_price;
use super::types::ExtractionError;

/// Price containers seen across layout revisions, most specific first
pub const PRICE_SELECTORS: &[&str] = &[
    "div.Nx9bqj.CxhGGd",
    "div.Nx9bqj",
    "div._30jeq3._16Jk6d",
    "div._30jeq3",
    "div._25b18c ._30jeq3",
    "[itemprop='price']",
    "div.price",
    ".price",
];

/// Product title elements, most specific first
pub const TITLE_SELECTORS: &[&str] = &[
    "span.VU-ZEz",
    "span.B_NuCI",
    "h1.yhB1nd",
    "h1._6EBuvT",
    "h1 span",
    "h1",
];

/// Price from the first selector whose element parses to a positive number
///
/// A matched element whose text cannot be parsed does not stop the cascade;
/// its error is returned only if no later selector succeeds.
pub fn selector_price(document: &Html) -> Result<Option<f64>, ExtractionError> {
    let mut format_error = None;

    for css in PRICE_SELECTORS {
        let Some(element) = first_match(document, css) else {
            continue;
        };

        // Microdata carries the machine-readable value in `content`
        let text = element
            .value()
            .attr("content")
            .map(str::to_string)
            .unwrap_or_else(|| element_text(&element));

        match parse_price(&text) {
            Ok(price) if price > 0.0 => {
                debug!("Price {} matched selector {}", price, css);
                return Ok(Some(price));
            }
            Ok(_) => debug!("Non-positive price under {}, trying next selector", css),
            Err(e) => {
                debug!("Unparseable price under {}: {}", css, e);
                format_error.get_or_insert(e);
            }
        }
    }

    match format_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Title from the first selector with non-empty text
pub fn selector_title(document: &Html) -> Option<String> {
    TITLE_SELECTORS.iter().find_map(|css| {
        let text = element_text(&first_match(document, css)?);
        (!text.is_empty()).then_some(text)
    })
}

/// `og:title` meta tag
pub fn og_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[property='og:title']").ok()?;
    document
        .select(&selector)
        .filter_map(|e| e.value().attr("content"))
        .map(collapse_whitespace)
        .find(|s| !s.is_empty())
}

/// Document `<title>`, with the marketplace suffix removed
pub fn document_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let raw = element_text(&document.select(&selector).next()?);
    let title = raw
        .split(" | Flipkart")
        .next()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    (!title.is_empty()).then_some(title)
}

fn first_match<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
