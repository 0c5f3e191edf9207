//! SQLite database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistoryRecord {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub price: f64,
    /// RFC 3339 UTC observation time
    pub timestamp: String,
    pub threshold_price: f64,
    /// Difference from the previous record for the same URL (0 for the first)
    pub price_change: f64,
}

/// Observation about to be appended
#[derive(Debug, Clone)]
pub struct NewPriceRecord {
    pub url: String,
    pub title: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
    pub threshold_price: f64,
}

/// Polling and transport tuning (single settings row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub poll_interval_secs: u64,
    pub backoff_cap_secs: u64,
    pub max_consecutive_failures: u32,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_transport_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            backoff_cap_secs: 300,
            max_consecutive_failures: 5,
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            max_transport_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Partial tracker configuration update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackerConfigUpdate {
    pub poll_interval_secs: Option<u64>,
    pub backoff_cap_secs: Option<u64>,
    pub max_consecutive_failures: Option<u32>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub max_transport_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}
