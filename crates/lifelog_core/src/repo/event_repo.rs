//! Event repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Upsert normalized events keyed by event id.
//! - Serve the read queries used by the planner and the workers.
//!
//! # Invariants
//! - Every list query is ordered by `ts ASC, event_id ASC`.
//! - `payload_json` always decodes back into the original record.

use crate::model::event::Event;
use crate::repo::{StoreError, StoreResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const EVENT_SELECT_SQL: &str = "SELECT
    event_id,
    ts,
    day,
    type,
    source,
    url,
    payload_json
FROM events";

const EVENT_ORDER_SQL: &str = " ORDER BY ts ASC, event_id ASC";

/// Keeps `IN (...)` lists well under SQLite's bound-parameter limit.
const ID_CHUNK_SIZE: usize = 500;

/// Repository interface for event persistence and queries.
pub trait EventRepository {
    fn upsert_event(&self, event: &Event) -> StoreResult<()>;
    fn events_for_day(&self, day: &str) -> StoreResult<Vec<Event>>;
    fn events_by_ids(&self, ids: &[&str]) -> StoreResult<Vec<Event>>;
    fn events_by_type(&self, kind: &str, day: Option<&str>) -> StoreResult<Vec<Event>>;
    fn events_for_url(&self, url: &str) -> StoreResult<Vec<Event>>;
    fn count_events(&self) -> StoreResult<u64>;
}

/// SQLite-backed event repository.
pub struct SqliteEventRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEventRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query(&self, sql: &str, bind_values: Vec<Value>) -> StoreResult<Vec<Event>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(parse_event_row(row)?);
        }
        Ok(events)
    }
}

impl EventRepository for SqliteEventRepository<'_> {
    fn upsert_event(&self, event: &Event) -> StoreResult<()> {
        let payload_json = serde_json::to_string(&event.payload).map_err(|err| {
            StoreError::InvalidData(format!("event `{}` payload: {err}", event.id))
        })?;

        self.conn.execute(
            "INSERT OR REPLACE INTO events (
                event_id,
                ts,
                day,
                type,
                source,
                url,
                payload_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                event.id.as_str(),
                event.timestamp.as_str(),
                event.day.as_str(),
                event.kind.as_str(),
                event.source.as_str(),
                event.url.as_deref(),
                payload_json,
            ],
        )?;
        Ok(())
    }

    fn events_for_day(&self, day: &str) -> StoreResult<Vec<Event>> {
        self.query(
            &format!("{EVENT_SELECT_SQL} WHERE day = ?1{EVENT_ORDER_SQL}"),
            vec![Value::Text(day.to_string())],
        )
    }

    fn events_by_ids(&self, ids: &[&str]) -> StoreResult<Vec<Event>> {
        let mut events = Vec::new();
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let bind_values = chunk
                .iter()
                .map(|id| Value::Text((*id).to_string()))
                .collect();
            events.extend(self.query(
                &format!("{EVENT_SELECT_SQL} WHERE event_id IN ({placeholders})"),
                bind_values,
            )?);
        }
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(events)
    }

    fn events_by_type(&self, kind: &str, day: Option<&str>) -> StoreResult<Vec<Event>> {
        let mut sql = format!("{EVENT_SELECT_SQL} WHERE type = ?");
        let mut bind_values = vec![Value::Text(kind.to_string())];
        if let Some(day) = day {
            sql.push_str(" AND day = ?");
            bind_values.push(Value::Text(day.to_string()));
        }
        sql.push_str(EVENT_ORDER_SQL);
        self.query(&sql, bind_values)
    }

    fn events_for_url(&self, url: &str) -> StoreResult<Vec<Event>> {
        self.query(
            &format!("{EVENT_SELECT_SQL} WHERE url = ?1{EVENT_ORDER_SQL}"),
            vec![Value::Text(url.to_string())],
        )
    }

    fn count_events(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("negative event count {count}")))
    }
}

fn parse_event_row(row: &Row<'_>) -> StoreResult<Event> {
    let id: String = row.get("event_id")?;
    let payload_text: String = row.get("payload_json")?;
    let payload = serde_json::from_str(&payload_text).map_err(|err| {
        StoreError::InvalidData(format!("undecodable payload for event `{id}`: {err}"))
    })?;

    Ok(Event {
        id,
        timestamp: row.get("ts")?,
        day: row.get("day")?,
        kind: row.get("type")?,
        source: row.get("source")?,
        url: row.get("url")?,
        payload,
    })
}
