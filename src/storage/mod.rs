//! Storage module for sources and price observations
//!
//! This module handles all database operations for the scraper, including:
//! - Source records with their extraction rules and backoff state
//! - The rolling 30-day failure event log
//! - Persisted price observations
//!
//! Backoff fields are mutated exclusively through [`Store::update_source_backoff`],
//! which applies the whole update in a single per-source transaction.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{BackoffStats, BackoffUpdate, CounterChange, Store, StorageError, StorageResult};

use crate::extract::ExtractionRule;
use chrono::{DateTime, Utc};

/// Suppression status of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceStatus {
    /// Scraped normally
    Active,

    /// Time-boxed suppression after short-term repeated failure
    Cooldown,

    /// Long-term suppression after failures recurring across a rolling
    /// month; the automated channel is abandoned until the monthly reset
    PhoneOnly,
}

impl SourceStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cooldown => "cooldown",
            Self::PhoneOnly => "phone_only",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "cooldown" => Some(Self::Cooldown),
            "phone_only" => Some(Self::PhoneOnly),
            _ => None,
        }
    }
}

/// A scrapable source with its extraction rule and backoff state
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub status: SourceStatus,
    pub consecutive_failures: u32,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub rule: ExtractionRule,
}

/// Fields for creating a new source (business data, seeded externally)
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub url: String,
    pub rule: ExtractionRule,
}

/// Classification of where a persisted price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSourceType {
    /// Scraped from a supplier site, shown to end users
    Scraped,

    /// Internal market signal only, never surfaced to end users
    MarketSignal,
}

impl PriceSourceType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Scraped => "scraped",
            Self::MarketSignal => "market_signal",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scraped" => Some(Self::Scraped),
            "market_signal" => Some(Self::MarketSignal),
            _ => None,
        }
    }
}

/// A persisted price observation with its 24-hour validity window
#[derive(Debug, Clone)]
pub struct PriceObservation {
    pub source_id: i64,
    pub price: f64,
    pub min_volume_tier: Option<u32>,
    pub source_type: PriceSourceType,
    pub source_url: String,
    pub scraped_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
