//! SQLite-backed document and counter store.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use tracing::{debug, info};

use crate::document::{Document, Filter, UpsertOutcome, business_id, merge_fields};
use crate::error::StoreError;
use crate::store::{CounterStore, DocumentStore};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id INTEGER NOT NULL,
        body TEXT NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE TABLE IF NOT EXISTS counters (
        name TEXT PRIMARY KEY,
        seq INTEGER NOT NULL
    );
";

/// Document store persisted in a SQLite database.
///
/// Every operation runs on the blocking pool; multi-statement operations run in an
/// immediate transaction so concurrent processes sharing the file serialize correctly.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!(path = %path.display(), "document store opened");
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

fn parse_body(collection: &str, id: i64, body: &str) -> Result<Document, StoreError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(map) => Ok(map),
        _ => Err(StoreError::CorruptDocument {
            collection: collection.to_string(),
            id,
        }),
    }
}

fn load_matching(
    conn: &Connection,
    collection: &str,
    filter: &Filter,
) -> Result<Vec<(i64, Document)>, StoreError> {
    let rows: Vec<(i64, String)> = match filter.pinned_id() {
        Some(id) => conn
            .query_row(
                "SELECT id, body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
            .into_iter()
            .collect(),
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, body FROM documents WHERE collection = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![collection], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<_, _>>()?
        }
    };

    let mut out = Vec::new();
    for (id, body) in rows {
        let doc = parse_body(collection, id, &body)?;
        if filter.matches(&doc) {
            out.push((id, doc));
        }
    }
    Ok(out)
}

fn write_body(
    conn: &Connection,
    collection: &str,
    id: i64,
    doc: &Document,
) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
        params![collection, id, serde_json::to_string(doc)?],
    )?;
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn upsert(
        &self,
        collection: &str,
        id: i64,
        mut document: Document,
    ) -> Result<UpsertOutcome, StoreError> {
        let collection = collection.to_string();
        document.insert("id".to_string(), Value::from(id));

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                None => {
                    tx.execute(
                        "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                        params![collection, id, serde_json::to_string(&document)?],
                    )?;
                    UpsertOutcome::Inserted
                }
                Some(body) => {
                    let mut stored = parse_body(&collection, id, &body)?;
                    if merge_fields(&mut stored, &document) {
                        write_body(&tx, &collection, id, &stored)?;
                        UpsertOutcome::Updated
                    } else {
                        UpsertOutcome::Unchanged
                    }
                }
            };
            tx.commit()?;
            debug!(collection = %collection, id, ?outcome, "upserted document");
            Ok(outcome)
        })
        .await
    }

    async fn insert(&self, collection: &str, document: Document) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let id = business_id(&document).ok_or_else(|| StoreError::MissingId {
            collection: collection.clone(),
        })?;

        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection, id, serde_json::to_string(&document)?],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(StoreError::Duplicate { collection, id })
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn get(&self, collection: &str, id: i64) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(|b| parse_body(&collection, id, &b)).transpose()
        })
        .await
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.with_conn(move |conn| {
            Ok(load_matching(conn, &collection, &filter)?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect())
        })
        .await
    }

    async fn update_fields(
        &self,
        collection: &str,
        filter: &Filter,
        mut fields: Document,
    ) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        let filter = filter.clone();
        fields.remove("id");

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let matching = load_matching(&tx, &collection, &filter)?;
            for (id, mut doc) in matching.iter().cloned() {
                if merge_fields(&mut doc, &fields) {
                    write_body(&tx, &collection, id, &doc)?;
                }
            }
            tx.commit()?;
            Ok(matching.len())
        })
        .await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize, StoreError> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let matching = load_matching(&tx, &collection, &filter)?;
            for (id, _) in &matching {
                tx.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )?;
            }
            tx.commit()?;
            Ok(matching.len())
        })
        .await
    }

    async fn max_id(&self, collection: &str) -> Result<Option<i64>, StoreError> {
        let collection = collection.to_string();
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "SELECT MAX(id) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get::<_, Option<i64>>(0),
            )?)
        })
        .await
    }
}

#[async_trait]
impl CounterStore for SqliteStore {
    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let key = key.to_string();
        // Single statement: the read and the write cannot interleave with another caller.
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "INSERT INTO counters (name, seq) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET seq = seq + 1
                 RETURNING seq",
                params![key],
                |row| row.get(0),
            )?)
        })
        .await
    }

    async fn seed(&self, key: &str, floor: i64) -> Result<i64, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn.query_row(
                "INSERT INTO counters (name, seq) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET seq = MAX(seq, excluded.seq)
                 RETURNING seq",
                params![key, floor],
                |row| row.get(0),
            )?)
        })
        .await
    }

    async fn current(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT seq FROM counters WHERE name = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_upsert_insert_then_unchanged() {
        let store = SqliteStore::open_in_memory().unwrap();
        let d = doc(json!({"title": "write docs", "completed": false}));

        let first = store.upsert("tasks", 3, d.clone()).await.unwrap();
        let second = store.upsert("tasks", 3, d).await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Unchanged);
        let stored = store.get("tasks", 3).await.unwrap().unwrap();
        assert_eq!(stored["id"], 3);
    }

    #[tokio::test]
    async fn test_upsert_keeps_fields_missing_from_input() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert("tasks", 1, doc(json!({"title": "a", "schedule": "weekly"})))
            .await
            .unwrap();
        let outcome = store
            .upsert("tasks", 1, doc(json!({"title": "b"})))
            .await
            .unwrap();

        assert_eq!(outcome, UpsertOutcome::Updated);
        let stored = store.get("tasks", 1).await.unwrap().unwrap();
        assert_eq!(stored["title"], "b");
        assert_eq!(stored["schedule"], "weekly");
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert("users", doc(json!({"id": 1}))).await.unwrap();
        let err = store.insert("users", doc(json!({"id": 1}))).await;
        assert!(matches!(err, Err(StoreError::Duplicate { id: 1, .. })));
    }

    #[tokio::test]
    async fn test_update_fields_never_rewrites_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert("tasks", doc(json!({"id": 5, "title": "x"})))
            .await
            .unwrap();
        let matched = store
            .update_fields("tasks", &Filter::id(5), doc(json!({"id": 99, "title": "y"})))
            .await
            .unwrap();

        assert_eq!(matched, 1);
        assert!(store.get("tasks", 99).await.unwrap().is_none());
        assert_eq!(store.get("tasks", 5).await.unwrap().unwrap()["title"], "y");
    }

    #[tokio::test]
    async fn test_counter_starts_at_one_and_seed_only_raises() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.current("taskid").await.unwrap(), None);
        assert_eq!(store.increment("taskid").await.unwrap(), 1);
        assert_eq!(store.seed("taskid", 40).await.unwrap(), 40);
        assert_eq!(store.seed("taskid", 10).await.unwrap(), 40);
        assert_eq!(store.increment("taskid").await.unwrap(), 41);
    }

    #[tokio::test]
    async fn test_id_filter_reads_only_the_pinned_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert("tasks", doc(json!({"id": 1, "title": "a", "task_id": 4})))
            .await
            .unwrap();
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES ('tasks', 2, 'not json')",
                [],
            )
            .unwrap();
        }

        let matched = store
            .update_fields("tasks", &Filter::id(1), doc(json!({"title": "b"})))
            .await
            .unwrap();
        assert_eq!(matched, 1);
        assert_eq!(store.get("tasks", 1).await.unwrap().unwrap()["title"], "b");

        let scoped = Filter::id(1).eq("task_id", 5);
        assert_eq!(store.find("tasks", &scoped).await.unwrap(), Vec::<Document>::new());
        assert_eq!(store.delete("tasks", &Filter::id(1)).await.unwrap(), 1);
        assert_eq!(store.delete("tasks", &Filter::id(3)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_and_max_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, archived) in [(1, false), (2, true), (7, false)] {
            store
                .insert("tasks", doc(json!({"id": id, "archived": archived})))
                .await
                .unwrap();
        }
        assert_eq!(store.max_id("tasks").await.unwrap(), Some(7));

        let deleted = store
            .delete("tasks", &Filter::all().eq("archived", false))
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.max_id("tasks").await.unwrap(), Some(2));
        assert_eq!(store.max_id("users").await.unwrap(), None);
    }
}
