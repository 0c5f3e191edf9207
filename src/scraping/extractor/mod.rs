//! Price extraction from product pages
//!
//! Price and title are each resolved through an ordered list of strategies.
//! Every strategy is a plain function over the parsed document; the first one
//! to produce a usable value wins.
//!
//! Price order: embedded JSON-LD offers, then the CSS selector cascade.
//! Title order: selector cascade, `og:title`, JSON-LD product name, `<title>`.

mod price;
mod selectors;
mod structured;
mod types;

pub use price::parse_price;
pub use types::{ExtractionError, Observation};

use chrono::Utc;
use scraper::Html;
use tracing::debug;

/// Price lookup over a parsed document
///
/// `Ok(None)` means nothing applicable was found; `Err` means a candidate was
/// found but its text was not a valid price.
pub type PriceStrategy = fn(&Html) -> Result<Option<f64>, ExtractionError>;

/// Title lookup over a parsed document
pub type TitleStrategy = fn(&Html) -> Option<String>;

/// Price and title extractor
pub struct PriceExtractor {
    price_strategies: Vec<(&'static str, PriceStrategy)>,
    title_strategies: Vec<(&'static str, TitleStrategy)>,
}

impl Default for PriceExtractor {
    fn default() -> Self {
        Self {
            price_strategies: vec![
                ("json-ld", structured::json_ld_price as PriceStrategy),
                ("selectors", selectors::selector_price as PriceStrategy),
            ],
            title_strategies: vec![
                ("selectors", selectors::selector_title as TitleStrategy),
                ("og:title", selectors::og_title as TitleStrategy),
                ("json-ld", structured::json_ld_name as TitleStrategy),
                ("document-title", selectors::document_title as TitleStrategy),
            ],
        }
    }
}

impl PriceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn page content into an observation
    pub fn extract(&self, body: &str, attempt_count: u32) -> Result<Observation, ExtractionError> {
        let document = Html::parse_document(body);

        let price = self.extract_price(&document)?;
        let title = self
            .title_strategies
            .iter()
            .find_map(|(name, strategy)| {
                let title = strategy(&document)?;
                debug!("Title found via {}", name);
                Some(title)
            })
            .ok_or(ExtractionError::NoTitleFound)?;

        Ok(Observation {
            title,
            price,
            observed_at: Utc::now(),
            attempt_count: attempt_count.max(1),
        })
    }

    fn extract_price(&self, document: &Html) -> Result<f64, ExtractionError> {
        let mut first_error = None;

        for (name, strategy) in &self.price_strategies {
            match strategy(document) {
                Ok(Some(price)) if price > 0.0 => {
                    debug!("Price {} found via {}", price, name);
                    return Ok(price);
                }
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or(ExtractionError::NoPriceFound))
    }
}
