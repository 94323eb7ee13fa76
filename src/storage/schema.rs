//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Fuelwatch database.

use rusqlite::Connection;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Scrapable sources: business data plus backoff state and extraction rule
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'active',
    consecutive_failures INTEGER NOT NULL DEFAULT 0,
    cooldown_until TEXT,
    pattern TEXT NOT NULL DEFAULT 'direct',
    price_regex TEXT,
    target_tier INTEGER,
    price_path TEXT,
    ignore_ssl INTEGER NOT NULL DEFAULT 0,
    displayable INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_sources_status ON sources(status);

-- Rolling failure log, pruned to the trailing 30 days on every write
CREATE TABLE IF NOT EXISTS failure_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    occurred_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_failure_events_source ON failure_events(source_id, occurred_at);

-- Persisted price observations with their 24h validity window
CREATE TABLE IF NOT EXISTS price_observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES sources(id),
    price REAL NOT NULL,
    min_volume_tier INTEGER,
    source_type TEXT NOT NULL,
    source_url TEXT NOT NULL,
    scraped_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_observations_source ON price_observations(source_id, scraped_at);
"#;

/// Initializes the database schema
///
/// Safe to call on an existing database; all statements are idempotent.
pub fn initialize_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
