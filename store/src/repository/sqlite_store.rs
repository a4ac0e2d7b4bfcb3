//! SQLite Record Store
//!
//! Local implementation of [`RecordStore`]. All scopes share one `records`
//! table keyed by [`Scope::key`]. Unlike the remote adapters this store has
//! transactions, so `reorder` applies all position writes or none.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::db::{DbState, SharedConnection};
use super::traits::{RecordStore, ReorderFailure};
use crate::domain::{
    DomainError, DomainResult, NewRecord, OrderedRecord, Payload, PositionUpdate, RecordChanges,
    RecordId, Scope,
};

/// SQLite implementation of the record store
pub struct SqliteRecordStore {
    pub(super) conn: SharedConnection,
}

impl SqliteRecordStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub fn from_state(state: &DbState) -> Self {
        Self::new(state.conn.clone())
    }
}

fn not_initialized() -> DomainError {
    DomainError::Internal("Database not initialized".to_string())
}

/// Record ids are integer row ids rendered as strings
fn parse_id(id: &RecordId) -> DomainResult<i64> {
    id.as_str()
        .parse()
        .map_err(|_| DomainError::NotFound(format!("Record {} not found", id)))
}

fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn fetch_all(&self, scope: &Scope) -> DomainResult<Vec<OrderedRecord>> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let mut stmt = conn.prepare(
            "SELECT id, position, payload, created_at FROM records
             WHERE scope = ? ORDER BY position, created_at, id",
        )?;

        let rows = stmt.query_map(params![scope.key()], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, position, payload, created_at) = row?;
            records.push(OrderedRecord {
                id: RecordId::new(id.to_string()),
                position,
                created_at: millis_to_datetime(created_at),
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(records)
    }

    async fn create(&self, scope: &Scope, record: &NewRecord) -> DomainResult<OrderedRecord> {
        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let now = Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO records (scope, position, payload, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            params![
                scope.key(),
                record.position,
                serde_json::to_string(&record.payload)?,
                now,
                now
            ],
        )?;

        let id = conn.last_insert_rowid();
        log::debug!("Created record {} in {} at position {}", id, scope.key(), record.position);

        Ok(OrderedRecord {
            id: RecordId::new(id.to_string()),
            position: record.position,
            created_at: millis_to_datetime(now),
            payload: record.payload.clone(),
        })
    }

    async fn update(&self, scope: &Scope, id: &RecordId, changes: &RecordChanges) -> DomainResult<()> {
        changes.validate()?;
        let row_id = parse_id(id)?;

        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        update_row(conn, &scope.key(), row_id, changes)?;
        Ok(())
    }

    async fn delete(&self, scope: &Scope, id: &RecordId) -> DomainResult<()> {
        let row_id = parse_id(id)?;

        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(not_initialized)?;

        let affected = conn.execute(
            "DELETE FROM records WHERE id = ? AND scope = ?",
            params![row_id, scope.key()],
        )?;
        if affected == 0 {
            return Err(DomainError::NotFound(format!("Record {} not found", id)));
        }
        Ok(())
    }

    async fn reorder(&self, scope: &Scope, updates: &[PositionUpdate]) -> Result<(), ReorderFailure> {
        let total = updates.len();
        let fail = |failed: Option<RecordId>, source: DomainError| ReorderFailure {
            applied: 0,
            total,
            failed,
            source,
        };

        let guard = self.conn.lock().await;
        let conn = guard.as_ref().ok_or_else(|| fail(None, not_initialized()))?;

        // Dropping the transaction without commit rolls every write back
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| fail(None, e.into()))?;

        let key = scope.key();
        for update in updates {
            let result = parse_id(&update.id)
                .and_then(|row_id| update_row(&tx, &key, row_id, &RecordChanges::position(update.position)));
            if let Err(source) = result {
                return Err(fail(Some(update.id.clone()), source));
            }
        }

        tx.commit().map_err(|e| fail(None, e.into()))?;
        Ok(())
    }
}

/// Apply `changes` to one row, merging payload fields
fn update_row(conn: &Connection, scope_key: &str, row_id: i64, changes: &RecordChanges) -> DomainResult<()> {
    if changes.is_empty() {
        return Ok(());
    }
    changes.validate()?;

    let current: Option<(i32, String)> = conn
        .query_row(
            "SELECT position, payload FROM records WHERE id = ? AND scope = ?",
            params![row_id, scope_key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let (position, payload) =
        current.ok_or_else(|| DomainError::NotFound(format!("Record {} not found", row_id)))?;

    let mut payload: Payload = serde_json::from_str(&payload)?;
    for (k, v) in &changes.fields {
        payload.insert(k.clone(), v.clone());
    }

    conn.execute(
        "UPDATE records SET position = ?, payload = ?, updated_at = ? WHERE id = ?",
        params![
            changes.position.unwrap_or(position),
            serde_json::to_string(&payload)?,
            Utc::now().timestamp_millis(),
            row_id
        ],
    )?;
    Ok(())
}
