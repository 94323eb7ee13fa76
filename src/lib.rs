//! Fuelwatch: distributed commodity-price scrape orchestration
//!
//! This crate periodically fetches publicly posted heating-fuel prices from
//! third-party supplier websites, spreading fetch times across a daily window
//! so outbound traffic never forms a detectable burst, and backing off
//! sources that are chronically failing.

pub mod backoff;
pub mod clock;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod notify;
pub mod schedule;
pub mod storage;

use thiserror::Error;

/// Main error type for Fuelwatch operations
///
/// Fetch-level failures are classified as [`fetch::ScrapeError`] and
/// consumed by the backoff policy rather than propagated; config loading
/// has its own [`ConfigError`]. This enum covers what the orchestration
/// layer itself can fail with.
#[derive(Debug, Error)]
pub enum FuelwatchError {
    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Scheduler is already running")]
    AlreadyRunning,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Fuelwatch operations
pub type Result<T> = std::result::Result<T, FuelwatchError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use backoff::{BackoffPolicy, ScrapeDecision};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use extract::{extract_price, ExtractionRule, PricePattern};
pub use fetch::{PriceFetcher, ScrapeError, ScrapeOutcome};
pub use schedule::{Scheduler, SchedulerMode};
pub use storage::{SourceRecord, SourceStatus};
