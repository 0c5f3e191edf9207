//! Page fetcher for the tracked product page
//!
//! One logical fetch is a single HTTP GET with a randomized browser identity.
//! Beneath it sits a small transport-level retry loop for flaky gateways and
//! connection resets. Successful responses are scanned for anti-bot markers so
//! the caller can tell a soft block apart from a real product page.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT,
};
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::sqlite::TrackerConfig;
use crate::error::Result;

/// Realistic desktop and mobile browser identities
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.2478.51",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36",
];

/// Statuses retried inside a single logical request
const RETRY_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Case-insensitive phrases that mark an anti-automation interstitial
const SOFT_BLOCK_MARKERS: &[&str] = &[
    "captcha",
    "access denied",
    "rate limit",
    "too many requests",
    "unusual traffic",
    "are you a human",
];

/// Transport failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connection,
    HttpStatus(u16),
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Connection => write!(f, "connection"),
            TransportErrorKind::HttpStatus(code) => write!(f, "http status {}", code),
            TransportErrorKind::Other => write!(f, "transport"),
        }
    }
}

/// A logical fetch that failed after transport retries were exhausted
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            TransportErrorKind::Connection
        } else if let Some(status) = err.status() {
            TransportErrorKind::HttpStatus(status.as_u16())
        } else {
            TransportErrorKind::Other
        };
        Self::new(kind, err.to_string())
    }

    /// Whether the transport layer should try again
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            TransportErrorKind::Connection => true,
            TransportErrorKind::HttpStatus(code) => RETRY_STATUSES.contains(&code),
            TransportErrorKind::Timeout | TransportErrorKind::Other => false,
        }
    }
}

/// A page returned with a successful HTTP status
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status_code: u16,
    pub body: String,
    pub content_length: usize,
    /// Marker phrase found in the body, if the page looks like a soft block
    pub soft_block: Option<&'static str>,
}

/// Source of product pages
#[async_trait]
pub trait PageFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, TransportError>;
}

/// Configuration for the page fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout, bounds slow page reads
    pub read_timeout: Duration,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Delay before the first retry, doubled for each further retry
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

impl From<&TrackerConfig> for FetchConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            max_retries: config.max_transport_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }
}

/// HTTP page fetcher backed by reqwest
pub struct PageFetcher {
    client: Client,
    config: FetchConfig,
}

impl PageFetcher {
    /// Create a new fetcher
    pub fn new(config: FetchConfig) -> Result<Self> {
        // gzip/brotli features make reqwest advertise Accept-Encoding and
        // decode the body transparently
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    /// Build the request headers with a freshly drawn user agent
    pub fn build_headers() -> HeaderMap {
        let user_agent = USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0]);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(user_agent));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
        headers
    }

    /// Delay before retry number `retry` (0-based)
    fn retry_delay(&self, retry: u32) -> Duration {
        self.config.retry_backoff.saturating_mul(1u32 << retry.min(16))
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<FetchedPage, TransportError> {
        let response = self
            .client
            .get(url)
            .headers(Self::build_headers())
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::new(
                TransportErrorKind::HttpStatus(status.as_u16()),
                status_message(status),
            ));
        }

        let body = response.text().await.map_err(TransportError::from_reqwest)?;
        let soft_block = detect_soft_block(&body);

        Ok(FetchedPage {
            status_code: status.as_u16(),
            content_length: body.len(),
            body,
            soft_block,
        })
    }
}

#[async_trait]
impl PageFetch for PageFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, TransportError> {
        let mut retry = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(page) => {
                    debug!(
                        "Fetched {} ({} bytes, status {})",
                        url, page.content_length, page.status_code
                    );
                    return Ok(page);
                }
                Err(err) if err.is_retryable() && retry < self.config.max_retries => {
                    let delay = self.retry_delay(retry);
                    warn!(
                        "Transport retry {}/{} for {} in {:?}: {}",
                        retry + 1,
                        self.config.max_retries,
                        url,
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn status_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("server responded {} {}", status.as_u16(), reason),
        None => format!("server responded {}", status.as_u16()),
    }
}

/// Find the first soft-block marker in a response body
pub fn detect_soft_block(body: &str) -> Option<&'static str> {
    let lowered = body.to_lowercase();
    SOFT_BLOCK_MARKERS
        .iter()
        .copied()
        .find(|marker| lowered.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_soft_block() {
        assert_eq!(
            detect_soft_block("<title>Please solve this CAPTCHA</title>"),
            Some("captcha")
        );
        assert_eq!(
            detect_soft_block("<h1>Access Denied</h1>"),
            Some("access denied")
        );
        assert_eq!(detect_soft_block("<div class=\"price\">₹999</div>"), None);
    }

    #[test]
    fn test_headers_use_known_user_agent() {
        for _ in 0..20 {
            let headers = PageFetcher::build_headers();
            let ua = headers.get(USER_AGENT).unwrap().to_str().unwrap();
            assert!(USER_AGENTS.contains(&ua));
            assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
            assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
            assert!(headers.contains_key(ACCEPT));
            assert!(headers.contains_key(ACCEPT_LANGUAGE));
        }
    }

    #[test]
    fn test_retryable_classification() {
        let err = |kind| TransportError::new(kind, "x");
        assert!(err(TransportErrorKind::HttpStatus(503)).is_retryable());
        assert!(err(TransportErrorKind::HttpStatus(429)).is_retryable());
        assert!(!err(TransportErrorKind::HttpStatus(404)).is_retryable());
        assert!(err(TransportErrorKind::Connection).is_retryable());
        assert!(!err(TransportErrorKind::Timeout).is_retryable());
    }

    #[test]
    fn test_retry_delay_grows() {
        let fetcher = PageFetcher::new(FetchConfig {
            retry_backoff: Duration::from_millis(100),
            ..FetchConfig::default()
        })
        .unwrap();
        assert_eq!(fetcher.retry_delay(0), Duration::from_millis(100));
        assert_eq!(fetcher.retry_delay(1), Duration::from_millis(200));
        assert_eq!(fetcher.retry_delay(2), Duration::from_millis(400));
    }
}
