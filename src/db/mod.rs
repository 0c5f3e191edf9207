//! Persistence layer

pub mod sqlite;

use crate::error::Result;
use sqlite::models::{NewPriceRecord, PriceHistoryRecord};

/// Append-only store of price observations
///
/// Implementations must serialize appends so the delta against the previous
/// record for the same URL is computed from a consistent view.
pub trait HistoryStore: Send + Sync {
    /// Append an observation, returning the stored record with its delta
    fn append(&self, record: &NewPriceRecord) -> Result<PriceHistoryRecord>;

    /// Most recent records first
    fn query(&self, limit: usize) -> Result<Vec<PriceHistoryRecord>>;

    /// Most recent records for one product URL
    fn query_for_url(&self, url: &str, limit: usize) -> Result<Vec<PriceHistoryRecord>>;
}
