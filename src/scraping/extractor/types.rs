//! Types produced by the price extractor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One successful price + title reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub title: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
    /// Cycle attempts it took to obtain this reading, including the successful one
    pub attempt_count: u32,
}

/// Why a page could not be turned into an observation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("no price found on page")]
    NoPriceFound,

    #[error("no product title found on page")]
    NoTitleFound,

    #[error("invalid price format: {0:?}")]
    InvalidPriceFormat(String),
}

impl ExtractionError {
    /// Short reason tag used in logs and status output
    pub fn reason(&self) -> &'static str {
        match self {
            ExtractionError::NoPriceFound => "no_price_found",
            ExtractionError::NoTitleFound => "no_title_found",
            ExtractionError::InvalidPriceFormat(_) => "invalid_price_format",
        }
    }
}
