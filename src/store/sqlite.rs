//! SQLite project store

use super::{ProjectStore, StoredProject};
use crate::sync::extract::FieldMap;
use crate::sync::mapper::CanonicalProjectRecord;
use crate::{PipeSyncError, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Upper bound for `list_recent`
pub const MAX_LIST_LIMIT: usize = 200;

const STARTED_AT_FORMAT: &str = "%Y-%m-%d";

const UPSERT_SQL: &str = r#"
    INSERT INTO projects (
        external_id, name, status, owner_email, priority,
        estimated_hours, started_at, meta, created_at, updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
    ON CONFLICT(external_id) DO UPDATE SET
        name = excluded.name,
        status = excluded.status,
        owner_email = excluded.owner_email,
        priority = excluded.priority,
        estimated_hours = excluded.estimated_hours,
        started_at = excluded.started_at,
        meta = excluded.meta,
        updated_at = excluded.updated_at
"#;

const SELECT_COLUMNS: &str = r#"
    SELECT external_id, name, status, owner_email, priority,
           estimated_hours, started_at, meta, created_at, updated_at
    FROM projects
"#;

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub path: PathBuf,

    /// Enable WAL mode so `projects` can be read while a sync writes
    pub wal_mode: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wal_mode: true,
        }
    }
}

/// `ProjectStore` backed by a single SQLite connection
///
/// Statements run on tokio's blocking pool. Writes from concurrent
/// containers are serialized on the connection lock.
pub struct SqliteProjectStore {
    conn: Arc<Mutex<Connection>>,
    config: StoreConfig,
}

impl SqliteProjectStore {
    /// Open or create the store database
    pub fn open(config: StoreConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!(path = %config.path.display(), "Opening project store");

        let conn = Connection::open(&config.path)?;
        if config.wal_mode {
            conn.pragma_update(None, "journal_mode", "WAL")?;
        }

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store, used by tests and dry runs
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            config: StoreConfig {
                path: PathBuf::from(":memory:"),
                wal_mode: false,
            },
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock(&self.conn)
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| PipeSyncError::Store(format!("store task failed: {}", e)))?
    }

    fn init_schema(&self) -> Result<()> {
        self.lock()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                status TEXT NOT NULL,
                owner_email TEXT,
                priority TEXT,
                estimated_hours REAL,
                started_at TEXT,
                meta TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_projects_status ON projects(status);
            CREATE INDEX IF NOT EXISTS idx_projects_created_at ON projects(created_at);
            "#,
        )?;
        Ok(())
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| PipeSyncError::Store("project store lock poisoned".to_string()))
}

/// Write `records` in one transaction; returns the number of distinct rows
fn upsert_rows(
    conn: &mut Connection,
    records: &[CanonicalProjectRecord],
    synced_at: DateTime<Utc>,
) -> Result<usize> {
    let stamp = synced_at.to_rfc3339_opts(SecondsFormat::Micros, true);
    let tx = conn.transaction()?;

    let mut written = HashSet::new();
    {
        let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
        for record in records {
            let started_at = record
                .started_at
                .map(|d| d.format(STARTED_AT_FORMAT).to_string());
            stmt.execute(params![
                &record.external_id,
                &record.name,
                &record.status,
                record.owner_email.as_deref(),
                record.priority.as_deref(),
                record.estimated_hours,
                started_at,
                record.meta.to_json()?,
                &stamp,
            ])?;
            written.insert(record.external_id.as_str());
        }
    }

    tx.commit()?;
    Ok(written.len())
}

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<(StoredProject, String)> {
    let started_at: Option<String> = row.get(6)?;
    let meta: String = row.get(7)?;

    let record = CanonicalProjectRecord {
        external_id: row.get(0)?,
        name: row.get(1)?,
        status: row.get(2)?,
        owner_email: row.get(3)?,
        priority: row.get(4)?,
        estimated_hours: row.get(5)?,
        started_at: started_at
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, STARTED_AT_FORMAT).ok()),
        meta: FieldMap::new(),
    };

    Ok((
        StoredProject {
            record,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        },
        meta,
    ))
}

/// Attach the decoded `meta` payload to a loaded row
fn with_meta((mut project, meta): (StoredProject, String)) -> Result<StoredProject> {
    project.record.meta = FieldMap::from_json(&meta)?;
    Ok(project)
}

#[async_trait]
impl ProjectStore for SqliteProjectStore {
    async fn upsert_batch(
        &self,
        records: &[CanonicalProjectRecord],
        synced_at: DateTime<Utc>,
    ) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let records = records.to_vec();
        let written = self
            .with_conn(move |conn| upsert_rows(conn, &records, synced_at))
            .await?;
        tracing::debug!(rows = written, "Upserted project batch");
        Ok(written)
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<StoredProject>> {
        let limit = limit.clamp(1, MAX_LIST_LIMIT) as i64;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY created_at DESC, id DESC LIMIT ?1",
                SELECT_COLUMNS
            ))?;

            let rows = stmt.query_map([limit], row_to_project)?;
            let mut projects = Vec::new();
            for row in rows {
                projects.push(with_meta(row?)?);
            }
            Ok(projects)
        })
        .await
    }

    async fn get(&self, external_id: &str) -> Result<Option<StoredProject>> {
        let external_id = external_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    &format!("{} WHERE external_id = ?1", SELECT_COLUMNS),
                    [&external_id],
                    row_to_project,
                )
                .optional()?;
            row.map(with_meta).transpose()
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str, status: &str) -> CanonicalProjectRecord {
        let mut meta = FieldMap::new();
        meta.insert("status_fid", Some(status.to_string()));
        CanonicalProjectRecord {
            external_id: id.to_string(),
            name: format!("Project {}", id),
            status: status.to_string(),
            owner_email: Some("ana@example.com".to_string()),
            priority: None,
            estimated_hours: Some(12.5),
            started_at: NaiveDate::from_ymd_opt(2024, 3, 15),
            meta,
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_store_creation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("projects.db");

        let store = SqliteProjectStore::open(StoreConfig::new(&path)).unwrap();
        assert!(store.path().exists());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let store = SqliteProjectStore::in_memory().unwrap();
        let written = store
            .upsert_batch(&[record("1", "Doing"), record("2", "Done")], at(8))
            .await
            .unwrap();
        assert_eq!(written, 2);

        let stored = store.get("1").await.unwrap().unwrap();
        assert_eq!(stored.record, record("1", "Doing"));
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_conflict_replaces_row_and_keeps_created_at() {
        let store = SqliteProjectStore::in_memory().unwrap();
        store.upsert_batch(&[record("1", "Doing")], at(8)).await.unwrap();

        let mut updated = record("1", "Done");
        updated.owner_email = None;
        store.upsert_batch(&[updated.clone()], at(9)).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let stored = store.get("1").await.unwrap().unwrap();
        assert_eq!(stored.record, updated);
        assert!(stored.created_at.starts_with("2024-06-01T08:00:00"));
        assert!(stored.updated_at.starts_with("2024-06-01T09:00:00"));
    }

    #[tokio::test]
    async fn test_duplicate_ids_in_batch_last_wins() {
        let store = SqliteProjectStore::in_memory().unwrap();
        let written = store
            .upsert_batch(&[record("1", "Doing"), record("1", "Done")], at(8))
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("1").await.unwrap().unwrap().record.status, "Done");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_batches_all_land() {
        let store = Arc::new(SqliteProjectStore::in_memory().unwrap());

        let writes = (0..8).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let batch: Vec<_> = (0..25)
                    .map(|j| record(&format!("{}-{}", i, j), "Doing"))
                    .collect();
                store.upsert_batch(&batch, at(8)).await
            })
        });

        for written in futures::future::join_all(writes).await {
            assert_eq!(written.unwrap().unwrap(), 25);
        }
        assert_eq!(store.count().await.unwrap(), 200);
    }

    #[tokio::test]
    async fn test_empty_batch_writes_nothing() {
        let store = SqliteProjectStore::in_memory().unwrap();
        assert_eq!(store.upsert_batch(&[], at(8)).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = SqliteProjectStore::in_memory().unwrap();
        store
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON projects
                 WHEN NEW.external_id = 'bad'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = store
            .upsert_batch(&[record("1", "Doing"), record("bad", "Doing")], at(8))
            .await;
        assert!(result.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_recent_newest_first_and_clamped() {
        let store = SqliteProjectStore::in_memory().unwrap();
        store.upsert_batch(&[record("old", "Doing")], at(8)).await.unwrap();
        store.upsert_batch(&[record("new", "Doing")], at(9)).await.unwrap();

        let listed = store.list_recent(50).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|p| p.record.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);

        assert_eq!(store.list_recent(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_keeps_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("projects.db");

        {
            let store = SqliteProjectStore::open(StoreConfig::new(&path)).unwrap();
            store.upsert_batch(&[record("1", "Doing")], at(8)).await.unwrap();
        }

        let store = SqliteProjectStore::open(StoreConfig::new(&path)).unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.get("1").await.unwrap().unwrap().record.meta.value("status_fid"),
            Some("Doing")
        );
    }
}
