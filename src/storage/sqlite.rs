//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::extract::{ExtractionRule, PricePattern};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    BackoffStats, BackoffUpdate, CounterChange, Store, StorageError, StorageResult,
};
use crate::storage::{NewSource, PriceObservation, PriceSourceType, SourceRecord, SourceStatus};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Creates a new SqliteStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

fn parse_timestamp(source_id: i64, raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRecord {
            source_id,
            message: format!("bad timestamp {:?}: {}", raw, e),
        })
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<(SourceRecord, Option<String>)> {
    let id: i64 = row.get(0)?;
    let status_raw: String = row.get(3)?;
    let cooldown_raw: Option<String> = row.get(5)?;
    let pattern_raw: String = row.get(6)?;

    let record = SourceRecord {
        id,
        name: row.get(1)?,
        url: row.get(2)?,
        status: SourceStatus::from_db_string(&status_raw).unwrap_or(SourceStatus::Active),
        consecutive_failures: row.get(4)?,
        cooldown_until: None, // filled in by the caller after timestamp parsing
        rule: ExtractionRule {
            pattern: PricePattern::from_db_string(&pattern_raw).unwrap_or(PricePattern::Direct),
            price_regex: row.get(7)?,
            target_tier: row.get::<_, Option<i64>>(8)?.map(|t| t as usize),
            price_path: row.get(9)?,
            ignore_ssl: row.get::<_, i64>(10)? != 0,
            displayable: row.get::<_, i64>(11)? != 0,
        },
    };

    Ok((record, cooldown_raw))
}

const SOURCE_COLUMNS: &str = "id, name, url, status, consecutive_failures, cooldown_until, \
     pattern, price_regex, target_tier, price_path, ignore_ssl, displayable";

impl SqliteStore {
    fn finish_source(
        &self,
        (mut record, cooldown_raw): (SourceRecord, Option<String>),
    ) -> StorageResult<SourceRecord> {
        if let Some(raw) = cooldown_raw {
            record.cooldown_until = Some(parse_timestamp(record.id, &raw)?);
        }
        Ok(record)
    }
}

impl Store for SqliteStore {
    // ===== Sources =====

    fn get_scrapable_sources(&self) -> StorageResult<Vec<SourceRecord>> {
        let sql = format!("SELECT {} FROM sources ORDER BY name", SOURCE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let rows = stmt.query_map([], row_to_source)?;

        let mut sources = Vec::new();
        for row in rows {
            sources.push(self.finish_source(row?)?);
        }
        Ok(sources)
    }

    fn get_source(&self, id: i64) -> StorageResult<SourceRecord> {
        let sql = format!("SELECT {} FROM sources WHERE id = ?1", SOURCE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;

        let raw = stmt
            .query_row(params![id], row_to_source)
            .optional()?
            .ok_or(StorageError::SourceNotFound(id))?;

        self.finish_source(raw)
    }

    fn insert_source(&mut self, source: &NewSource) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO sources (name, url, pattern, price_regex, target_tier, price_path,
                                  ignore_ssl, displayable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                source.name,
                source.url,
                source.rule.pattern.to_db_string(),
                source.rule.price_regex,
                source.rule.target_tier.map(|t| t as i64),
                source.rule.price_path,
                source.rule.ignore_ssl as i64,
                source.rule.displayable as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn source_count(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    // ===== Backoff state =====

    fn update_source_backoff(&mut self, id: i64, update: &BackoffUpdate) -> StorageResult<()> {
        let tx = self.conn.transaction()?;

        // Increments are applied against the stored value, not a caller
        // snapshot, so concurrent writers cannot lose each other's counts
        let changed = match update.consecutive_failures {
            CounterChange::Set(value) => tx.execute(
                "UPDATE sources SET status = ?1, consecutive_failures = ?2, cooldown_until = ?3
                 WHERE id = ?4",
                params![
                    update.status.to_db_string(),
                    value,
                    update.cooldown_until.map(|dt| dt.to_rfc3339()),
                    id,
                ],
            )?,
            CounterChange::Increment => tx.execute(
                "UPDATE sources
                 SET status = ?1, consecutive_failures = consecutive_failures + 1,
                     cooldown_until = ?2
                 WHERE id = ?3",
                params![
                    update.status.to_db_string(),
                    update.cooldown_until.map(|dt| dt.to_rfc3339()),
                    id,
                ],
            )?,
        };

        if changed == 0 {
            return Err(StorageError::SourceNotFound(id));
        }

        if let Some(failure_at) = update.failure_at {
            tx.execute(
                "INSERT INTO failure_events (source_id, occurred_at) VALUES (?1, ?2)",
                params![id, failure_at.to_rfc3339()],
            )?;
        }

        if let Some(prune_before) = update.prune_before {
            tx.execute(
                "DELETE FROM failure_events WHERE source_id = ?1 AND occurred_at < ?2",
                params![id, prune_before.to_rfc3339()],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn count_recent_failures(&self, id: i64, since: DateTime<Utc>) -> StorageResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM failure_events WHERE source_id = ?1 AND occurred_at >= ?2",
            params![id, since.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    fn reset_phone_only_sources(&mut self) -> StorageResult<u32> {
        let changed = self.conn.execute(
            "UPDATE sources SET status = ?1, consecutive_failures = 0, cooldown_until = NULL
             WHERE status = ?2",
            params![
                SourceStatus::Active.to_db_string(),
                SourceStatus::PhoneOnly.to_db_string(),
            ],
        )?;
        Ok(changed as u32)
    }

    fn backoff_stats(&self) -> StorageResult<BackoffStats> {
        let mut stmt = self
            .conn
            .prepare("SELECT status, COUNT(*) FROM sources GROUP BY status")?;

        let mut stats = BackoffStats::default();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (status, count) = row?;
            match SourceStatus::from_db_string(&status) {
                Some(SourceStatus::Active) => stats.active = count as u64,
                Some(SourceStatus::Cooldown) => stats.cooldown = count as u64,
                Some(SourceStatus::PhoneOnly) => stats.phone_only = count as u64,
                None => {
                    tracing::warn!("Ignoring unknown source status {:?} in stats", status);
                }
            }
        }

        Ok(stats)
    }

    // ===== Price observations =====

    fn insert_price_observation(&mut self, obs: &PriceObservation) -> StorageResult<i64> {
        self.conn.execute(
            "INSERT INTO price_observations
                (source_id, price, min_volume_tier, source_type, source_url, scraped_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                obs.source_id,
                obs.price,
                obs.min_volume_tier,
                obs.source_type.to_db_string(),
                obs.source_url,
                obs.scraped_at.to_rfc3339(),
                obs.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn latest_observation(&self, source_id: i64) -> StorageResult<Option<PriceObservation>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, price, min_volume_tier, source_type, source_url,
                    scraped_at, expires_at
             FROM price_observations WHERE source_id = ?1
             ORDER BY scraped_at DESC LIMIT 1",
        )?;

        let raw = stmt
            .query_row(params![source_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .optional()?;

        let Some((sid, price, tier, ty_raw, url, scraped_raw, expires_raw)) = raw else {
            return Ok(None);
        };

        Ok(Some(PriceObservation {
            source_id: sid,
            price,
            min_volume_tier: tier,
            source_type: PriceSourceType::from_db_string(&ty_raw).ok_or(
                StorageError::CorruptRecord {
                    source_id: sid,
                    message: format!("bad source_type {:?}", ty_raw),
                },
            )?,
            source_url: url,
            scraped_at: parse_timestamp(sid, &scraped_raw)?,
            expires_at: parse_timestamp(sid, &expires_raw)?,
        }))
    }

    fn observation_count(&self) -> StorageResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM price_observations", [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}
