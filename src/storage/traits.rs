//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{NewSource, PriceObservation, SourceRecord, SourceStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Source not found: {0}")]
    SourceNotFound(i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Corrupt record for source {source_id}: {message}")]
    CorruptRecord { source_id: i64, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// How a backoff update changes the consecutive-failure counter
///
/// `Increment` is applied relationally against the stored row, so a writer
/// holding a stale source snapshot cannot overwrite increments that landed
/// in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterChange {
    /// Overwrite the counter with an absolute value
    Set(u32),

    /// Add one to whatever the row currently holds
    Increment,
}

/// A backoff state change applied atomically to a single source
///
/// When `failure_at` is set, the failure event insert and the 30-day prune
/// happen inside the same transaction as the status update, so a crash can
/// never leave the counters and the event log disagreeing.
#[derive(Debug, Clone)]
pub struct BackoffUpdate {
    pub status: SourceStatus,
    pub consecutive_failures: CounterChange,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub failure_at: Option<DateTime<Utc>>,
    pub prune_before: Option<DateTime<Utc>>,
}

/// Aggregate counts of sources per suppression status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackoffStats {
    pub active: u64,
    pub cooldown: u64,
    pub phone_only: u64,
}

impl BackoffStats {
    pub fn total(&self) -> u64 {
        self.active + self.cooldown + self.phone_only
    }
}

/// Trait for storage backend implementations
///
/// Implementations must apply each `update_source_backoff` call as a single
/// per-source transaction; concurrent writes to different sources need no
/// coordination.
pub trait Store: Send {
    // ===== Sources =====

    /// Gets every source eligible for scheduling (all statuses; the backoff
    /// policy decides at fire time whether a fetch is allowed)
    fn get_scrapable_sources(&self) -> StorageResult<Vec<SourceRecord>>;

    /// Gets a source by ID
    fn get_source(&self, id: i64) -> StorageResult<SourceRecord>;

    /// Inserts a new source (business data seeding)
    fn insert_source(&mut self, source: &NewSource) -> StorageResult<i64>;

    /// Total number of sources
    fn source_count(&self) -> StorageResult<u64>;

    // ===== Backoff state =====

    /// Applies a backoff state change to one source in a single transaction
    fn update_source_backoff(&mut self, id: i64, update: &BackoffUpdate) -> StorageResult<()>;

    /// Counts failure events for a source at or after `since`
    fn count_recent_failures(&self, id: i64, since: DateTime<Utc>) -> StorageResult<u32>;

    /// Bulk-transitions every phone-only source back to active with
    /// counters cleared; returns how many sources changed
    fn reset_phone_only_sources(&mut self) -> StorageResult<u32>;

    /// Aggregate per-status source counts, read-only
    fn backoff_stats(&self) -> StorageResult<BackoffStats>;

    // ===== Price observations =====

    /// Persists a price observation; returns its row ID
    fn insert_price_observation(&mut self, obs: &PriceObservation) -> StorageResult<i64>;

    /// Most recent observation for a source, if any
    fn latest_observation(&self, source_id: i64) -> StorageResult<Option<PriceObservation>>;

    /// Total number of persisted observations
    fn observation_count(&self) -> StorageResult<u64>;
}
