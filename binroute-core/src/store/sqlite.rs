//! SQLite-backed [`RecordStore`].
//!
//! Records live in a single `documents` table keyed by collection and id,
//! with the body stored as JSON. The distance cache has its own table so
//! that stale entries can be removed by endpoint in one statement; unknown
//! values are stored as `NULL`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camino::Utf8Path;
use log::debug;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};

use super::{BulkWriteSummary, Collection, Document, RecordStore, StoreError, WriteOp};
use crate::{DistanceCacheEntry, Leg, NodeKey, NodeKind, Schedule};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS distance_cache (
        origin_kind TEXT NOT NULL,
        origin_id TEXT NOT NULL,
        destination_kind TEXT NOT NULL,
        destination_id TEXT NOT NULL,
        distance_m INTEGER,
        duration_s INTEGER,
        PRIMARY KEY (origin_kind, origin_id, destination_kind, destination_id)
    ) WITHOUT ROWID;
    CREATE INDEX IF NOT EXISTS distance_cache_destination
        ON distance_cache (destination_kind, destination_id);
    CREATE TABLE IF NOT EXISTS schedules (
        id TEXT PRIMARY KEY,
        body TEXT NOT NULL
    ) WITHOUT ROWID;
    CREATE TEMP TABLE IF NOT EXISTS selected_keys (
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        PRIMARY KEY (kind, id)
    ) WITHOUT ROWID;
";

/// Record store persisting to a SQLite database.
///
/// The connection is shared behind a mutex and every operation runs on
/// Tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open or create a database file and initialise its schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when the file cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Utf8Path) -> Result<Self, StoreError> {
        debug!("opening record store at {path}");
        Self::initialise(Connection::open(path.as_std_path())?)
    }

    /// Create a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] when the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::initialise(Connection::open_in_memory()?)
    }

    fn initialise(connection: Connection) -> Result<Self, StoreError> {
        connection.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection.lock().map_err(|_| StoreError::Unavailable {
                message: "sqlite connection lock poisoned".to_owned(),
            })?;
            operation(&mut guard)
        })
        .await
        .map_err(|err| StoreError::Unavailable {
            message: err.to_string(),
        })?
    }
}

enum EncodedOp {
    Insert { id: String, body: String },
    Update { id: String, body: String },
    Delete { id: String },
}

fn encode_op<D: Document>(operation: WriteOp<D>) -> Result<EncodedOp, StoreError> {
    let encode = |document: &D| {
        serde_json::to_string(document).map_err(|source| StoreError::Encode {
            collection: D::COLLECTION,
            source,
        })
    };
    Ok(match operation {
        WriteOp::Insert(document) => EncodedOp::Insert {
            id: document.id().to_owned(),
            body: encode(&document)?,
        },
        WriteOp::Update(document) => EncodedOp::Update {
            id: document.id().to_owned(),
            body: encode(&document)?,
        },
        WriteOp::Delete(id) => EncodedOp::Delete { id },
    })
}

fn apply_op(
    transaction: &Transaction<'_>,
    collection: Collection,
    operation: EncodedOp,
    summary: &mut BulkWriteSummary,
) -> Result<(), StoreError> {
    let name = collection.as_str();
    match operation {
        EncodedOp::Insert { id, body } => {
            let exists = transaction
                .query_row(
                    "SELECT 1 FROM documents WHERE collection = ?1 AND id = ?2",
                    params![name, id],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if exists {
                return Err(StoreError::DuplicateId { collection, id });
            }
            transaction.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![name, id, body],
            )?;
            summary.inserted += 1;
        }
        EncodedOp::Update { id, body } => {
            let changed = transaction.execute(
                "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
                params![name, id, body],
            )?;
            if changed == 0 {
                return Err(StoreError::MissingRecord { collection, id });
            }
            summary.updated += 1;
        }
        EncodedOp::Delete { id } => {
            summary.deleted += transaction.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![name, id],
            )?;
        }
    }
    Ok(())
}

fn select_keys(transaction: &Transaction<'_>, keys: &[NodeKey]) -> Result<(), StoreError> {
    transaction.execute("DELETE FROM temp.selected_keys", [])?;
    let mut statement =
        transaction.prepare("INSERT OR IGNORE INTO temp.selected_keys (kind, id) VALUES (?1, ?2)")?;
    for key in keys {
        statement.execute(params![key.kind.as_str(), key.id])?;
    }
    Ok(())
}

fn insert_entries(
    transaction: &Transaction<'_>,
    entries: &[DistanceCacheEntry],
) -> Result<(), StoreError> {
    let mut statement = transaction.prepare(
        "INSERT OR REPLACE INTO distance_cache
            (origin_kind, origin_id, destination_kind, destination_id, distance_m, duration_s)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for entry in entries {
        statement.execute(params![
            entry.origin.kind.as_str(),
            entry.origin.id,
            entry.destination.kind.as_str(),
            entry.destination.id,
            to_column(entry.leg.distance_m),
            to_column(entry.leg.duration_s),
        ])?;
    }
    Ok(())
}

// Saturates: no road leg comes near i64::MAX metres or seconds.
fn to_column(value: Option<u64>) -> Option<i64> {
    value.map(|v| i64::try_from(v).unwrap_or(i64::MAX))
}

fn from_column(field: &'static str, value: Option<i64>) -> Result<Option<u64>, StoreError> {
    value
        .map(|v| u64::try_from(v).map_err(|_| StoreError::OutOfRange { field, value: v }))
        .transpose()
}

fn node_kind(row: &Row<'_>, index: usize) -> rusqlite::Result<NodeKind> {
    let raw: String = row.get(index)?;
    raw.parse()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

type RawEntry = (NodeKey, NodeKey, Option<i64>, Option<i64>);

fn read_entry(row: &Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok((
        NodeKey::new(node_kind(row, 0)?, row.get::<_, String>(1)?),
        NodeKey::new(node_kind(row, 2)?, row.get::<_, String>(3)?),
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_entry(
    (origin, destination, distance, duration): RawEntry,
) -> Result<DistanceCacheEntry, StoreError> {
    Ok(DistanceCacheEntry {
        origin,
        destination,
        leg: Leg {
            distance_m: from_column("distance_m", distance)?,
            duration_s: from_column("duration_s", duration)?,
        },
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_all<D: Document>(&self) -> Result<Vec<D>, StoreError> {
        let rows = self
            .with_connection(|connection| {
                let mut statement = connection.prepare(
                    "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id",
                )?;
                let rows = statement
                    .query_map([D::COLLECTION.as_str()], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter()
            .map(|(id, body)| {
                serde_json::from_str(&body).map_err(|source| StoreError::Decode {
                    collection: D::COLLECTION,
                    id,
                    source,
                })
            })
            .collect()
    }

    async fn bulk_write<D: Document>(
        &self,
        operations: Vec<WriteOp<D>>,
    ) -> Result<BulkWriteSummary, StoreError> {
        let encoded = operations
            .into_iter()
            .map(encode_op)
            .collect::<Result<Vec<_>, _>>()?;
        let summary = self
            .with_connection(move |connection| {
                let transaction = connection.transaction()?;
                let mut summary = BulkWriteSummary::default();
                for operation in encoded {
                    apply_op(&transaction, D::COLLECTION, operation, &mut summary)?;
                }
                transaction.commit()?;
                Ok(summary)
            })
            .await?;
        debug!(
            "bulk write to {}: {} inserted, {} updated, {} deleted",
            D::COLLECTION,
            summary.inserted,
            summary.updated,
            summary.deleted
        );
        Ok(summary)
    }

    async fn delete_all<D: Document>(&self) -> Result<usize, StoreError> {
        self.with_connection(|connection| {
            Ok(connection.execute(
                "DELETE FROM documents WHERE collection = ?1",
                [D::COLLECTION.as_str()],
            )?)
        })
        .await
    }

    async fn distance_entries(
        &self,
        among: &[NodeKey],
    ) -> Result<Vec<DistanceCacheEntry>, StoreError> {
        let keys = among.to_vec();
        let raw = self
            .with_connection(move |connection| {
                let transaction = connection.transaction()?;
                select_keys(&transaction, &keys)?;
                let rows = {
                    let mut statement = transaction.prepare(
                        "SELECT d.origin_kind, d.origin_id, d.destination_kind,
                                d.destination_id, d.distance_m, d.duration_s
                         FROM distance_cache d
                         JOIN temp.selected_keys o
                           ON o.kind = d.origin_kind AND o.id = d.origin_id
                         JOIN temp.selected_keys t
                           ON t.kind = d.destination_kind AND t.id = d.destination_id",
                    )?;
                    statement
                        .query_map([], read_entry)?
                        .collect::<rusqlite::Result<Vec<_>>>()?
                };
                transaction.execute("DELETE FROM temp.selected_keys", [])?;
                transaction.commit()?;
                Ok(rows)
            })
            .await?;
        let mut entries = raw
            .into_iter()
            .map(decode_entry)
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by(|a, b| {
            (&a.origin, &a.destination).cmp(&(&b.origin, &b.destination))
        });
        Ok(entries)
    }

    async fn replace_distance_cache(
        &self,
        entries: Vec<DistanceCacheEntry>,
    ) -> Result<(), StoreError> {
        let count = entries.len();
        self.with_connection(move |connection| {
            let transaction = connection.transaction()?;
            transaction.execute("DELETE FROM distance_cache", [])?;
            insert_entries(&transaction, &entries)?;
            transaction.commit()?;
            Ok(())
        })
        .await?;
        debug!("distance cache replaced with {count} entries");
        Ok(())
    }

    async fn update_distance_cache(
        &self,
        stale: &[NodeKey],
        fresh: Vec<DistanceCacheEntry>,
    ) -> Result<usize, StoreError> {
        let keys = stale.to_vec();
        self.with_connection(move |connection| {
            let transaction = connection.transaction()?;
            select_keys(&transaction, &keys)?;
            let removed = transaction.execute(
                "DELETE FROM distance_cache
                 WHERE EXISTS (
                     SELECT 1 FROM temp.selected_keys s
                     WHERE s.kind = distance_cache.origin_kind
                       AND s.id = distance_cache.origin_id)
                    OR EXISTS (
                     SELECT 1 FROM temp.selected_keys s
                     WHERE s.kind = distance_cache.destination_kind
                       AND s.id = distance_cache.destination_id)",
                [],
            )?;
            transaction.execute("DELETE FROM temp.selected_keys", [])?;
            insert_entries(&transaction, &fresh)?;
            transaction.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        let rows = self
            .with_connection(|connection| {
                let mut statement =
                    connection.prepare("SELECT id, body FROM schedules ORDER BY id")?;
                let rows = statement
                    .query_map([], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.into_iter()
            .map(|(id, body)| {
                serde_json::from_str(&body)
                    .map_err(|source| StoreError::ScheduleCodec { id, source })
            })
            .collect()
    }

    async fn replace_schedules(&self, schedules: Vec<Schedule>) -> Result<(), StoreError> {
        let encoded = schedules
            .iter()
            .map(|schedule| {
                serde_json::to_string(schedule)
                    .map(|body| (schedule.id.clone(), body))
                    .map_err(|source| StoreError::ScheduleCodec {
                        id: schedule.id.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.with_connection(move |connection| {
            let transaction = connection.transaction()?;
            transaction.execute("DELETE FROM schedules", [])?;
            {
                let mut statement =
                    transaction.prepare("INSERT INTO schedules (id, body) VALUES (?1, ?2)")?;
                for (id, body) in &encoded {
                    statement.execute(params![id, body])?;
                }
            }
            transaction.commit()?;
            Ok(())
        })
        .await
    }
}
