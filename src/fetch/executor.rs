//! HTTP fetch executor
//!
//! This module performs one timed fetch against a supplier site and
//! classifies the outcome:
//! - Building HTTP clients with an honest user agent string
//! - Request URL construction (scheme prepend, price-path override)
//! - Timeout and transport error classification
//! - Delegation to the extraction engine on a successful response
//!
//! Certificate validation relaxation is request-scoped: two clients are
//! built at construction and the relaxed one is chosen per source, so the
//! setting can never leak into concurrent or subsequent calls.

use crate::config::{ScraperConfig, UserAgentConfig};
use crate::extract::{extract_price, in_plausible_band};
use crate::fetch::retry::RetryConfig;
use crate::storage::{PriceSourceType, SourceRecord};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

/// Hours a scraped price remains valid
pub const PRICE_VALIDITY_HOURS: i64 = 24;

/// Classified scrape failure
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("no price matched the extraction rule")]
    PriceNotFound,

    #[error("price {0} outside the plausible band")]
    OutOfRange(f64),

    #[error("invalid source URL: {0}")]
    InvalidUrl(String),
}

impl ScrapeError {
    /// Whether retrying the fetch could plausibly help
    ///
    /// Transport failures and 5xx responses are transient; 4xx responses
    /// and extraction failures signal a problem repetition will not fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) | Self::Body(_) => true,
            Self::HttpStatus(code) => *code >= 500,
            Self::PriceNotFound | Self::OutOfRange(_) | Self::InvalidUrl(_) => false,
        }
    }
}

/// A successfully scraped price with its validity window
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub price: f64,
    pub source_type: PriceSourceType,
    pub scraped_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of one scrape (single attempt or full retry sequence)
#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub result: Result<PriceQuote, ScrapeError>,
    pub elapsed: Duration,
    pub retries_used: u32,
}

impl ScrapeOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Builds the request URL for a source
///
/// Prepends an https scheme when the stored URL has none, and overrides
/// the path component when the rule carries a custom price path.
pub fn build_request_url(source: &SourceRecord) -> Result<Url, ScrapeError> {
    let raw = if source.url.contains("://") {
        source.url.clone()
    } else {
        format!("https://{}", source.url)
    };

    let mut url =
        Url::parse(&raw).map_err(|e| ScrapeError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if let Some(path) = &source.rule.price_path {
        url.set_path(path);
    }

    Ok(url)
}

/// Fetches supplier pages and turns them into classified scrape outcomes
pub struct PriceFetcher {
    /// Client with full certificate validation
    strict: Client,

    /// Client accepting invalid certificates, used only for sources whose
    /// rule sets `ignore_ssl`
    relaxed: Client,

    timeout_secs: u64,
    retry: RetryConfig,
}

impl PriceFetcher {
    /// Creates a fetcher from configuration
    ///
    /// # Arguments
    ///
    /// * `scraper` - Timeout and retry configuration
    /// * `user_agent` - Identification sent with every request
    pub fn new(
        scraper: &ScraperConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, reqwest::Error> {
        // Format: ScraperName/Version (+ContactURL; ContactEmail)
        let ua = format!(
            "{}/{} (+{}; {})",
            user_agent.scraper_name,
            user_agent.scraper_version,
            user_agent.contact_url,
            user_agent.contact_email
        );

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));

        let builder = || {
            Client::builder()
                .user_agent(ua.clone())
                .default_headers(headers.clone())
                .timeout(Duration::from_secs(scraper.request_timeout_secs))
                .connect_timeout(Duration::from_secs(scraper.request_timeout_secs))
                .gzip(true)
                .brotli(true)
        };

        let strict = builder().build()?;
        let relaxed = builder().danger_accept_invalid_certs(true).build()?;

        Ok(Self {
            strict,
            relaxed,
            timeout_secs: scraper.request_timeout_secs,
            retry: RetryConfig {
                max_retries: scraper.max_retries,
                retry_delay: Duration::from_millis(scraper.retry_delay_ms),
            },
        })
    }

    pub(crate) fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Performs a single timed fetch attempt
    pub async fn fetch_once(&self, source: &SourceRecord) -> ScrapeOutcome {
        let started = Instant::now();
        let result = self.fetch_inner(source).await;

        if let Err(e) = &result {
            tracing::debug!("Fetch attempt for {} failed: {}", source.name, e);
        }

        ScrapeOutcome {
            result,
            elapsed: started.elapsed(),
            retries_used: 0,
        }
    }

    async fn fetch_inner(&self, source: &SourceRecord) -> Result<PriceQuote, ScrapeError> {
        let url = build_request_url(source)?;

        let client = if source.rule.ignore_ssl {
            tracing::debug!("Relaxed certificate validation for {}", source.name);
            &self.relaxed
        } else {
            &self.strict
        };

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapeError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::Body(e.to_string()))?;

        let price = extract_price(&body, &source.rule).ok_or(ScrapeError::PriceNotFound)?;

        // The engine already filters range; re-check in case the rule
        // config changes underneath us
        if !in_plausible_band(price) {
            return Err(ScrapeError::OutOfRange(price));
        }

        let scraped_at = Utc::now();
        Ok(PriceQuote {
            price,
            source_type: if source.rule.displayable {
                PriceSourceType::Scraped
            } else {
                PriceSourceType::MarketSignal
            },
            scraped_at,
            expires_at: scraped_at + ChronoDuration::hours(PRICE_VALIDITY_HOURS),
        })
    }

    fn classify_transport(&self, e: reqwest::Error) -> ScrapeError {
        if e.is_timeout() {
            ScrapeError::Timeout(self.timeout_secs)
        } else {
            ScrapeError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractionRule;
    use crate::storage::SourceStatus;

    fn test_source(url: &str) -> SourceRecord {
        SourceRecord {
            id: 1,
            name: "test".to_string(),
            url: url.to_string(),
            status: SourceStatus::Active,
            consecutive_failures: 0,
            cooldown_until: None,
            rule: ExtractionRule::default(),
        }
    }

    #[test]
    fn test_build_url_prepends_scheme() {
        let url = build_request_url(&test_source("fuel.example.com")).unwrap();
        assert_eq!(url.as_str(), "https://fuel.example.com/");
    }

    #[test]
    fn test_build_url_keeps_existing_scheme() {
        let url = build_request_url(&test_source("http://fuel.example.com/today")).unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.path(), "/today");
    }

    #[test]
    fn test_build_url_applies_price_path() {
        let mut source = test_source("https://fuel.example.com/home");
        source.rule.price_path = Some("/current-prices".to_string());

        let url = build_request_url(&source).unwrap();
        assert_eq!(url.path(), "/current-prices");
        assert_eq!(url.host_str(), Some("fuel.example.com"));
    }

    #[test]
    fn test_build_url_rejects_garbage() {
        assert!(build_request_url(&test_source("http://")).is_err());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ScrapeError::Timeout(10).is_retryable());
        assert!(ScrapeError::Network("reset".to_string()).is_retryable());
        assert!(ScrapeError::HttpStatus(500).is_retryable());
        assert!(ScrapeError::HttpStatus(503).is_retryable());

        assert!(!ScrapeError::HttpStatus(403).is_retryable());
        assert!(!ScrapeError::HttpStatus(404).is_retryable());
        assert!(!ScrapeError::PriceNotFound.is_retryable());
        assert!(!ScrapeError::OutOfRange(9.99).is_retryable());
        assert!(!ScrapeError::InvalidUrl("nope".to_string()).is_retryable());
    }

    #[test]
    fn test_quote_validity_window() {
        let scraped_at = Utc::now();
        let quote = PriceQuote {
            price: 3.45,
            source_type: PriceSourceType::Scraped,
            scraped_at,
            expires_at: scraped_at + ChronoDuration::hours(PRICE_VALIDITY_HOURS),
        };
        assert_eq!(quote.expires_at - quote.scraped_at, ChronoDuration::hours(24));
    }
}
