//! HTTP API request and response types
//!
//! Browser forms and scripts often send numbers as strings (and Telegram chat
//! ids as numbers), so a few fields accept either representation.

use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Custom Deserializers
// ============================================================================

/// Deserialize a value that can be either a number or a string representation of a number
fn deserialize_flexible_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleFloat {
        Float(f64),
        Int(i64),
        Str(String),
    }

    match FlexibleFloat::deserialize(deserializer)? {
        FlexibleFloat::Float(f) => Ok(f),
        FlexibleFloat::Int(i) => Ok(i as f64),
        FlexibleFloat::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number: {:?}", s))),
    }
}

/// Deserialize an identifier sent either as a string or as an integer
fn deserialize_flexible_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum FlexibleString {
        Str(String),
        Int(i64),
    }

    match FlexibleString::deserialize(deserializer)? {
        FlexibleString::Str(s) => Ok(s),
        FlexibleString::Int(i) => Ok(i.to_string()),
    }
}

// ============================================================================
// Common Types
// ============================================================================

/// Standard API response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success_with_message(message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn success_with_data(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

/// Empty data type for responses without data
#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

// ============================================================================
// Request Types
// ============================================================================

/// Start tracking request - POST /api/start_tracking
#[derive(Debug, Clone, Deserialize)]
pub struct StartTrackingRequest {
    #[serde(default)]
    pub url: String,
    #[serde(deserialize_with = "deserialize_flexible_f64")]
    pub threshold_price: f64,
    #[serde(
        default,
        alias = "telegram_token",
        deserialize_with = "deserialize_flexible_string"
    )]
    pub notification_token: String,
    #[serde(
        default,
        alias = "telegram_chat_id",
        deserialize_with = "deserialize_flexible_string"
    )]
    pub notification_chat_id: String,
}

/// Price history query - GET /api/price_history
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub url: Option<String>,
}

pub const DEFAULT_HISTORY_LIMIT: usize = 50;
pub const MAX_HISTORY_LIMIT: usize = 1000;

impl HistoryQuery {
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}
