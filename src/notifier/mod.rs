//! Price alert delivery
//!
//! The tracker only depends on the `Notifier` trait. Delivery failures are
//! reported as `false` and never surface as errors to the polling loop.

mod telegram;

pub use telegram::{format_price_alert, TelegramNotifier};

use crate::scraping::Observation;
use async_trait::async_trait;
use std::fmt;

/// Where alerts for the current tracking session go
#[derive(Clone, PartialEq, Eq)]
pub struct NotificationTarget {
    pub token: String,
    pub chat_id: String,
}

impl NotificationTarget {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            chat_id: chat_id.into(),
        }
    }
}

// Keep bot tokens out of logs
impl fmt::Debug for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationTarget")
            .field("token", &mask_token(&self.token))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

fn mask_token(token: &str) -> String {
    if token.len() <= 12 || !token.is_ascii() {
        "*".repeat(token.len())
    } else {
        format!("{}...{}", &token[..6], &token[token.len() - 4..])
    }
}

/// Threshold-crossing alert channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert; `false` when delivery failed
    async fn send_price_alert(
        &self,
        target: &NotificationTarget,
        product_url: &str,
        observation: &Observation,
        threshold_price: f64,
    ) -> bool;
}
