//! Fetch executor for supplier pages
//!
//! This module contains the single-fetch executor with outcome
//! classification and the retry wrapper for transient failures.

mod executor;
mod retry;

pub use executor::{
    build_request_url, PriceFetcher, PriceQuote, ScrapeError, ScrapeOutcome,
    PRICE_VALIDITY_HOURS,
};
pub use retry::RetryConfig;
