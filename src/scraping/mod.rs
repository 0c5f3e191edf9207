//! Product page scraping
//!
//! - `PageFetcher`: HTTP GET with randomized identity, transport retry and
//!   soft-block detection
//! - `PriceExtractor`: structured-data and selector cascades over the page

pub mod extractor;
pub mod fetcher;

pub use extractor::{ExtractionError, Observation, PriceExtractor};
pub use fetcher::{FetchConfig, FetchedPage, PageFetch, PageFetcher, TransportError, TransportErrorKind};

/// Canonical prefixes a tracked product URL may start with
pub const PRODUCT_URL_PREFIXES: &[&str] = &[
    "https://www.flipkart.com/",
    "https://flipkart.com/",
    "https://dl.flipkart.com/",
];
