//! SQLite-backed event store (requires the `sqlite` feature).

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use super::{EventStore, Snapshot, SyncDirection, SyncLogEntry, errors::StoreError};
use crate::Result;
use crate::event::{EntityValue, Event, EventKind};
use crate::vector_clock::VectorClock;

pub mod schema;

/// An [`EventStore`] persisted in a SQLite database via sqlx.
///
/// The event/snapshot pair for a single mutation commits in one SQL
/// transaction, so the log and the snapshot table can never disagree about
/// a half-applied write.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::sql("database open", e))?;
        let store = Self { pool };
        schema::initialize(&store).await?;
        Ok(store)
    }

    /// Open an in-memory database, mostly for tests.
    ///
    /// Limited to a single pooled connection: each SQLite `:memory:`
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::sql("database open", e))?;
        let store = Self { pool };
        schema::initialize(&store).await?;
        Ok(store)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Fixed-precision RFC 3339, so TEXT ordering is chronological.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| {
            StoreError::InvalidTimestamp {
                value: value.to_string(),
            }
            .into()
        })
}

fn encode_json<T: serde::Serialize>(what: &'static str, value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|source| StoreError::SerializationFailed { what, source }.into())
}

fn decode_json<T: serde::de::DeserializeOwned>(what: &'static str, value: &str) -> Result<T> {
    serde_json::from_str(value)
        .map_err(|source| StoreError::DeserializationFailed { what, source }.into())
}

type EventRow = (String, String, String, String, String, String, String);

fn event_from_row(row: EventRow) -> Result<Event> {
    let (event_id, entity_id, event_type, data, timestamp, node_id, vector_clock) = row;
    let kind: EventKind = decode_json("event type", &format!("\"{event_type}\""))?;
    Ok(Event {
        event_id,
        entity_id,
        kind,
        payload: decode_json("event payload", &data)?,
        timestamp: decode_ts(&timestamp)?,
        node_id,
        vector_clock: decode_json("vector clock", &vector_clock)?,
    })
}

const SELECT_EVENT: &str =
    "SELECT event_id, entity_id, event_type, data, timestamp, node_id, vector_clock
     FROM crdt_events";

async fn insert_event<'e, E>(executor: E, event: &Event) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO crdt_events (event_id, entity_id, event_type, data, timestamp, node_id, vector_clock)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&event.event_id)
    .bind(&event.entity_id)
    .bind(event.kind.to_string())
    .bind(encode_json("event payload", &event.payload)?)
    .bind(encode_ts(event.timestamp))
    .bind(&event.node_id)
    .bind(encode_json("vector clock", &event.vector_clock)?)
    .execute(executor)
    .await
    .map_err(|e| StoreError::sql("event append", e))?;
    Ok(())
}

async fn upsert_snapshot<'e, E>(executor: E, snapshot: &Snapshot) -> Result<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT OR REPLACE INTO crdt_snapshots
            (entity_id, state, vector_clock, last_writer, written_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&snapshot.entity_id)
    .bind(encode_json("snapshot state", &snapshot.state)?)
    .bind(encode_json("vector clock", &snapshot.vector_clock)?)
    .bind(&snapshot.last_writer)
    .bind(encode_ts(snapshot.written_at))
    .bind(encode_ts(snapshot.updated_at))
    .execute(executor)
    .await
    .map_err(|e| StoreError::sql("snapshot write", e))?;
    Ok(())
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn append(&self, event: &Event) -> Result<()> {
        insert_event(&self.pool, event).await
    }

    async fn append_with_snapshot(&self, event: &Event, snapshot: &Snapshot) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::sql("transaction begin", e))?;
        insert_event(&mut *tx, event).await?;
        upsert_snapshot(&mut *tx, snapshot).await?;
        tx.commit()
            .await
            .map_err(|e| StoreError::sql("transaction commit", e))?;
        Ok(())
    }

    async fn events_for_entity(&self, entity_id: &str) -> Result<Vec<Event>> {
        let rows: Vec<EventRow> =
            sqlx::query_as(&format!("{SELECT_EVENT} WHERE entity_id = $1 ORDER BY seq"))
                .bind(entity_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::sql("event query", e))?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<Event>> {
        let rows: Vec<EventRow> =
            sqlx::query_as(&format!("{SELECT_EVENT} WHERE timestamp > $1 ORDER BY timestamp"))
                .bind(encode_ts(since))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::sql("event query", e))?;
        rows.into_iter().map(event_from_row).collect()
    }

    async fn count_events_since(&self, since: DateTime<Utc>) -> Result<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM crdt_events WHERE timestamp > $1")
                .bind(encode_ts(since))
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::sql("event count", e))?;
        Ok(count as u64)
    }

    async fn entities_changed_since(&self, since: DateTime<Utc>) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT entity_id FROM crdt_events WHERE timestamp > $1 ORDER BY entity_id",
        )
        .bind(encode_ts(since))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::sql("entity query", e))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        upsert_snapshot(&self.pool, snapshot).await
    }

    async fn snapshot(&self, entity_id: &str) -> Result<Option<Snapshot>> {
        let row: Option<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT state, vector_clock, last_writer, written_at, updated_at
             FROM crdt_snapshots WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::sql("snapshot query", e))?;

        match row {
            None => Ok(None),
            Some((state, vector_clock, last_writer, written_at, updated_at)) => {
                let state: EntityValue = decode_json("snapshot state", &state)?;
                let vector_clock: VectorClock = decode_json("vector clock", &vector_clock)?;
                Ok(Some(Snapshot {
                    entity_id: entity_id.to_string(),
                    state,
                    vector_clock,
                    last_writer,
                    written_at: decode_ts(&written_at)?,
                    updated_at: decode_ts(&updated_at)?,
                }))
            }
        }
    }

    async fn append_sync_log(&self, entry: &SyncLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO crdt_sync_log (remote_node_id, direction, watermark, events_synced, recorded_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&entry.remote_node_id)
        .bind(entry.direction.to_string())
        .bind(encode_ts(entry.watermark))
        .bind(entry.events_synced as i64)
        .bind(encode_ts(entry.recorded_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::sql("sync log append", e))?;
        Ok(())
    }

    async fn last_sync(
        &self,
        remote_node_id: &str,
        direction: SyncDirection,
    ) -> Result<Option<SyncLogEntry>> {
        let row: Option<(String, String, i64, String)> = sqlx::query_as(
            "SELECT direction, watermark, events_synced, recorded_at
             FROM crdt_sync_log
             WHERE remote_node_id = $1 AND direction = $2
             ORDER BY seq DESC LIMIT 1",
        )
        .bind(remote_node_id)
        .bind(direction.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::sql("sync log query", e))?;

        row.map(|(direction, watermark, events_synced, recorded_at)| {
            Ok(SyncLogEntry {
                remote_node_id: remote_node_id.to_string(),
                direction: decode_json("sync direction", &format!("\"{direction}\""))?,
                watermark: decode_ts(&watermark)?,
                events_synced: events_synced as u64,
                recorded_at: decode_ts(&recorded_at)?,
            })
        })
        .transpose()
    }

    async fn sync_log(&self, remote_node_id: &str) -> Result<Vec<SyncLogEntry>> {
        let rows: Vec<(String, String, i64, String)> = sqlx::query_as(
            "SELECT direction, watermark, events_synced, recorded_at
             FROM crdt_sync_log WHERE remote_node_id = $1 ORDER BY seq",
        )
        .bind(remote_node_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::sql("sync log query", e))?;

        rows.into_iter()
            .map(|(direction, watermark, events_synced, recorded_at)| {
                Ok(SyncLogEntry {
                    remote_node_id: remote_node_id.to_string(),
                    direction: decode_json("sync direction", &format!("\"{direction}\""))?,
                    watermark: decode_ts(&watermark)?,
                    events_synced: events_synced as u64,
                    recorded_at: decode_ts(&recorded_at)?,
                })
            })
            .collect()
    }

    async fn known_remotes(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT remote_node_id FROM crdt_sync_log ORDER BY remote_node_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::sql("sync log query", e))?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
