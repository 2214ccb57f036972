use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::parser::extract::EventRecord;

pub const DB_PATH: &str = "data/ccbb_events.sqlite";

pub type EventId = i64;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

#[cfg(test)]
pub fn connect_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS events (
            id       INTEGER PRIMARY KEY,
            name     TEXT NOT NULL UNIQUE CHECK (name <> ''),
            category TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS event_details (
            id        INTEGER PRIMARY KEY,
            event_id  INTEGER NOT NULL UNIQUE REFERENCES events(id),
            date_text TEXT NOT NULL,
            location  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS event_metadata (
            id             INTEGER PRIMARY KEY,
            event_id       INTEGER NOT NULL REFERENCES events(id),
            metadata_value TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_metadata_event_value
            ON event_metadata(event_id, metadata_value);
        ",
    )
    .context("Failed to create schema")?;
    Ok(())
}

// ── Writes ──

/// Insert-if-absent for the event and its details and metadata rows.
///
/// Runs inside its own savepoint, so a failure leaves none of the three rows
/// behind. Existing rows are never updated.
pub fn upsert(conn: &Connection, record: &EventRecord) -> Result<EventId, StoreError> {
    let tag = |source: rusqlite::Error| StoreError {
        name: record.name.clone(),
        source,
    };

    conn.execute_batch("SAVEPOINT upsert_event").map_err(tag)?;
    match write_event(conn, record) {
        Ok(id) => {
            conn.execute_batch("RELEASE upsert_event").map_err(tag)?;
            Ok(id)
        }
        Err(e) => {
            if let Err(rollback) =
                conn.execute_batch("ROLLBACK TO upsert_event; RELEASE upsert_event")
            {
                warn!("Rollback of {:?} failed: {}", record.name, rollback);
            }
            Err(tag(e))
        }
    }
}

fn write_event(conn: &Connection, r: &EventRecord) -> rusqlite::Result<EventId> {
    let created = conn
        .prepare_cached("INSERT OR IGNORE INTO events (name, category) VALUES (?1, ?2)")?
        .execute(params![r.name, r.category])?;

    let id: EventId = conn
        .prepare_cached("SELECT id FROM events WHERE name = ?1")?
        .query_row(params![r.name], |row| row.get(0))?;
    if created == 0 {
        debug!("Event {:?} already stored as {}", r.name, id);
    }

    conn.prepare_cached(
        "INSERT OR IGNORE INTO event_details (event_id, date_text, location) VALUES (?1, ?2, ?3)",
    )?
    .execute(params![id, r.date_text, r.location])?;

    conn.prepare_cached(
        "INSERT OR IGNORE INTO event_metadata (event_id, metadata_value) VALUES (?1, ?2)",
    )?
    .execute(params![id, r.image_ref])?;

    Ok(id)
}

// ── Reports ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRow {
    pub name: String,
    pub date_text: String,
    pub location: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataRow {
    pub name: String,
    pub metadata_value: String,
}

const EVENT_SELECT: &str = "SELECT e.name, d.date_text, d.location, e.category
     FROM events e
     JOIN event_details d ON d.event_id = e.id";

fn query_events<P: rusqlite::Params>(
    conn: &Connection,
    tail: &str,
    params: P,
) -> Result<Vec<EventRow>> {
    let sql = format!("{}\n     {}", EVENT_SELECT, tail);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(EventRow {
                name: row.get(0)?,
                date_text: row.get(1)?,
                location: row.get(2)?,
                category: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn all_events(conn: &Connection) -> Result<Vec<EventRow>> {
    query_events(conn, "ORDER BY e.id", params![])
}

/// Ordered by the stored date text, not by a parsed date.
pub fn soonest_events(conn: &Connection, limit: usize) -> Result<Vec<EventRow>> {
    query_events(
        conn,
        "ORDER BY d.date_text ASC, e.id LIMIT ?1",
        params![limit as i64],
    )
}

pub fn events_in_location(conn: &Connection, location: &str) -> Result<Vec<EventRow>> {
    query_events(conn, "WHERE d.location = ?1 ORDER BY e.id", params![location])
}

/// Events whose category contains `term` (ASCII case-insensitive, SQL LIKE).
pub fn events_with_category(conn: &Connection, term: &str) -> Result<Vec<EventRow>> {
    query_events(
        conn,
        "WHERE e.category LIKE '%' || ?1 || '%' ORDER BY e.id",
        params![term],
    )
}

pub fn event_metadata(conn: &Connection) -> Result<Vec<MetadataRow>> {
    let mut stmt = conn.prepare(
        "SELECT e.name, m.metadata_value
         FROM events e
         JOIN event_metadata m ON m.event_id = e.id
         ORDER BY e.id, m.id",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MetadataRow {
                name: row.get(0)?,
                metadata_value: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

#[derive(Debug, Serialize)]
pub struct Counts {
    pub events: usize,
    pub details: usize,
    pub metadata: usize,
}

pub fn counts(conn: &Connection) -> Result<Counts> {
    let events: usize = conn.query_row("SELECT COUNT(*) FROM events", [], |r| r.get(0))?;
    let details: usize =
        conn.query_row("SELECT COUNT(*) FROM event_details", [], |r| r.get(0))?;
    let metadata: usize =
        conn.query_row("SELECT COUNT(*) FROM event_metadata", [], |r| r.get(0))?;
    Ok(Counts {
        events,
        details,
        metadata,
    })
}
