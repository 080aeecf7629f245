// SQLite implementation - one JSON row per (collection, id)
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::{
    ChangeEvent, Document, DocumentStore, Fields, Query, StoreError, Write, SERVER_TIMESTAMP,
};
use crate::state::DbPool;

const CHANGE_FEED_CAPACITY: usize = 256;

pub struct SqliteDocumentStore {
    pool: DbPool,
    /// Last issued server timestamp, in microseconds since the epoch.
    clock: Mutex<i64>,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteDocumentStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            pool,
            clock: Mutex::new(0),
            changes,
        }
    }

    /// Strictly increasing store clock at microsecond resolution, so
    /// `createdAt` orders every write made through this store.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let mut last = self.clock.lock().unwrap_or_else(|e| e.into_inner());
        let next = now.max(*last + 1);
        *last = next;
        DateTime::<Utc>::from_timestamp_micros(next).unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let conn = self.pool.get()?;
        Ok(load(&conn, collection, id)?.map(|fields| Document::new(id, fields)))
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let conn = self.pool.get()?;

        let mut stmt = conn.prepare("SELECT id, fields FROM documents WHERE collection = ?1")?;
        let rows: Vec<(String, String)> = stmt
            .query_map(params![query.collection], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let docs = rows
            .into_iter()
            .map(|(id, json)| Ok(Document::new(id, serde_json::from_str(&json)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(query.apply(docs))
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<Vec<bool>, StoreError> {
        if writes.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.get()?;

        // Writers are serialized from here until COMMIT/ROLLBACK
        conn.execute("BEGIN IMMEDIATE", [])?;

        let now = self
            .next_timestamp()
            .to_rfc3339_opts(SecondsFormat::Micros, true);

        let result: Result<Vec<bool>, StoreError> = writes
            .iter()
            .map(|write| apply_write(&conn, write, &now))
            .collect();

        match result {
            Ok(applied) => {
                conn.execute("COMMIT", [])?;

                for (write, changed) in writes.iter().zip(&applied) {
                    if *changed {
                        // No receivers is fine
                        let _ = self.changes.send(ChangeEvent {
                            collection: write.collection().to_string(),
                            id: write.id().to_string(),
                        });
                    }
                }

                tracing::debug!(writes = writes.len(), at = %now, "Committed batch");
                Ok(applied)
            }
            Err(e) => {
                conn.execute("ROLLBACK", [])?;
                tracing::debug!("Rolled back batch: {}", e);
                Err(e)
            }
        }
    }

    fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}

fn apply_write(conn: &Connection, write: &Write, now: &str) -> Result<bool, StoreError> {
    match write {
        Write::Set {
            collection,
            id,
            fields,
        } => {
            let mut fields = fields.clone();
            resolve_timestamps(&mut fields, now);
            save(conn, collection, id, &fields)?;
            Ok(true)
        }
        Write::Merge {
            collection,
            id,
            fields,
        } => {
            let mut current = load(conn, collection, id)?.unwrap_or_default();
            merge_into(&mut current, fields, now);
            save(conn, collection, id, &current)?;
            Ok(true)
        }
        Write::Update {
            collection,
            id,
            fields,
        } => {
            let mut current = load(conn, collection, id)?.ok_or_else(|| not_found(collection, id))?;
            merge_into(&mut current, fields, now);
            save(conn, collection, id, &current)?;
            Ok(true)
        }
        Write::Create {
            collection,
            id,
            fields,
        } => {
            let mut fields = fields.clone();
            resolve_timestamps(&mut fields, now);
            let rows = conn.execute(
                "INSERT INTO documents (collection, id, fields)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(collection, id) DO NOTHING",
                params![collection, id, serde_json::to_string(&fields)?],
            )?;
            Ok(rows > 0)
        }
        Write::ArrayUnion {
            collection,
            id,
            field,
            values,
        } => {
            let mut current = load(conn, collection, id)?.ok_or_else(|| not_found(collection, id))?;

            let mut items = match current.remove(field) {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            let before = items.len();
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
            let changed = items.len() != before;
            current.insert(field.clone(), Value::Array(items));

            if changed {
                save(conn, collection, id, &current)?;
            }
            Ok(changed)
        }
        Write::Delete { collection, id } => {
            let rows = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(rows > 0)
        }
    }
}

fn load(conn: &Connection, collection: &str, id: &str) -> Result<Option<Fields>, StoreError> {
    let result: Result<String, rusqlite::Error> = conn.query_row(
        "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2",
        params![collection, id],
        |row| row.get(0),
    );

    match result {
        Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn save(conn: &Connection, collection: &str, id: &str, fields: &Fields) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO documents (collection, id, fields, updated_at)
         VALUES (?1, ?2, ?3, datetime('now'))
         ON CONFLICT(collection, id) DO UPDATE SET
           fields = excluded.fields,
           updated_at = excluded.updated_at",
        params![collection, id, serde_json::to_string(fields)?],
    )?;
    Ok(())
}

fn merge_into(current: &mut Fields, patch: &Fields, now: &str) {
    let mut patch = patch.clone();
    resolve_timestamps(&mut patch, now);
    current.extend(patch);
}

fn resolve_timestamps(fields: &mut Fields, now: &str) {
    for value in fields.values_mut() {
        if value.as_str() == Some(SERVER_TIMESTAMP) {
            *value = Value::String(now.to_string());
        }
    }
}

fn not_found(collection: &str, id: &str) -> StoreError {
    StoreError::NotFound {
        collection: collection.to_string(),
        id: id.to_string(),
    }
}
