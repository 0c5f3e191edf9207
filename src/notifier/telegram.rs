//! Telegram Bot API notifier

use super::{NotificationTarget, Notifier};
use crate::error::Result;
use crate::scraping::Observation;
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends alerts through `sendMessage` with HTML formatting
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    description: Option<String>,
}

impl TelegramNotifier {
    pub fn new() -> Result<Self> {
        Self::with_api_base(TELEGRAM_API_BASE)
    }

    /// Point the notifier at a different Bot API host
    pub fn with_api_base(api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    async fn send_message(&self, target: &NotificationTarget, text: &str) -> std::result::Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, target.token);
        let request = SendMessageRequest {
            chat_id: &target.chat_id,
            text,
            parse_mode: "HTML",
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e.without_url()))?;

        let status = response.status();
        let result: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| format!("unexpected response ({}): {}", status, e.without_url()))?;

        if result.ok {
            Ok(())
        } else {
            Err(result
                .description
                .unwrap_or_else(|| format!("rejected with status {}", status)))
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_price_alert(
        &self,
        target: &NotificationTarget,
        product_url: &str,
        observation: &Observation,
        threshold_price: f64,
    ) -> bool {
        let text = format_price_alert(product_url, observation, threshold_price);

        match self.send_message(target, &text).await {
            Ok(()) => {
                info!(
                    "Price alert sent to chat {}: {} <= {}",
                    target.chat_id, observation.price, threshold_price
                );
                true
            }
            Err(e) => {
                error!("Failed to send Telegram message: {}", e);
                false
            }
        }
    }
}

/// Render the alert body in Telegram's HTML subset
pub fn format_price_alert(product_url: &str, observation: &Observation, threshold_price: f64) -> String {
    format!(
        "🔔 <b>Price Alert!</b>\n\n\
         Product: {}\n\
         Current Price: ₹{:.2}\n\
         Threshold Price: ₹{:.2}\n\
         Time: {}\n\n\
         🔗 <a href=\"{}\">View Product</a>",
        escape_html(&observation.title),
        observation.price,
        threshold_price,
        observation
            .observed_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        escape_html(product_url),
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_alert_format() {
        let observation = Observation {
            title: "Tom & Jerry <Deluxe>".to_string(),
            price: 899.0,
            observed_at: Utc.with_ymd_and_hms(2025, 8, 12, 17, 22, 20).unwrap(),
            attempt_count: 1,
        };

        let text = format_price_alert(
            "https://www.flipkart.com/x/p/itm?pid=1&lid=2",
            &observation,
            999.0,
        );

        assert!(text.starts_with("🔔 <b>Price Alert!</b>"));
        assert!(text.contains("Product: Tom &amp; Jerry &lt;Deluxe&gt;"));
        assert!(text.contains("Current Price: ₹899.00"));
        assert!(text.contains("Threshold Price: ₹999.00"));
        assert!(text.contains("Time: 2025-08-12T17:22:20Z"));
        assert!(text.contains("href=\"https://www.flipkart.com/x/p/itm?pid=1&amp;lid=2\""));
    }
}
