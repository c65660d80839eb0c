//! SQL schema for the durable store.
//!
//! Three logical tables, matching the persistence model: an append-only
//! event log, one snapshot row per entity, and an append-only sync audit
//! log. Timestamps are stored as RFC 3339 text with fixed microsecond
//! precision so lexicographic comparison in SQL is chronological.

use crate::Result;
use crate::store::errors::StoreError;

use super::SqliteStore;

/// Current schema version. Increment on changes that require migration.
pub const SCHEMA_VERSION: i64 = 1;

/// Statements creating the schema tables and indexes.
pub const CREATE_TABLES: &[&str] = &[
    // Schema version tracking
    "CREATE TABLE IF NOT EXISTS schema_version (
        version BIGINT PRIMARY KEY
    )",
    // Append-only event log. seq preserves append order independent of
    // event timestamps; event_id is globally unique.
    "CREATE TABLE IF NOT EXISTS crdt_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id TEXT NOT NULL UNIQUE,
        entity_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        data TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        node_id TEXT NOT NULL,
        vector_clock TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_crdt_events_entity ON crdt_events (entity_id)",
    "CREATE INDEX IF NOT EXISTS idx_crdt_events_timestamp ON crdt_events (timestamp)",
    "CREATE INDEX IF NOT EXISTS idx_crdt_events_type ON crdt_events (event_type)",
    // One snapshot row per entity
    "CREATE TABLE IF NOT EXISTS crdt_snapshots (
        entity_id TEXT PRIMARY KEY NOT NULL,
        state TEXT NOT NULL,
        vector_clock TEXT NOT NULL,
        last_writer TEXT NOT NULL,
        written_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    // Append-only audit of sync rounds
    "CREATE TABLE IF NOT EXISTS crdt_sync_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        remote_node_id TEXT NOT NULL,
        direction TEXT NOT NULL,
        watermark TEXT NOT NULL,
        events_synced BIGINT NOT NULL,
        recorded_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_crdt_sync_log_remote ON crdt_sync_log (remote_node_id)",
];

/// Create the schema if needed and stamp the version row.
pub(super) async fn initialize(store: &SqliteStore) -> Result<()> {
    for statement in CREATE_TABLES {
        sqlx::query(statement)
            .execute(store.pool())
            .await
            .map_err(|e| StoreError::sql("schema creation", e))?;
    }

    let version: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version LIMIT 1")
        .fetch_optional(store.pool())
        .await
        .map_err(|e| StoreError::sql("schema version read", e))?;

    match version {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(store.pool())
                .await
                .map_err(|e| StoreError::sql("schema version write", e))?;
        }
        Some((v,)) if v == SCHEMA_VERSION => {}
        Some((v,)) => {
            return Err(StoreError::Backend {
                context: "schema version check",
                reason: format!("unsupported schema version {v}, expected {SCHEMA_VERSION}"),
            }
            .into());
        }
    }

    Ok(())
}
