use crate::config::StorageConfig;
use crate::error::AppResult;
use crate::storage::VisitorStore;
use crate::types::{AggregateStats, VisitorRecord};
use async_trait::async_trait;
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::{params, Connection, OptionalExtension};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Apply performance PRAGMAs to a SQLite connection.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        PRAGMA temp_store = MEMORY;
        PRAGMA wal_autocheckpoint = 1000;
        ",
    )
}

/// Create a deadpool-sqlite connection pool for the configured database file.
pub fn create_pool(config: &StorageConfig) -> Result<Pool, deadpool_sqlite::CreatePoolError> {
    let db_path = config.path.clone();

    // Set restrictive file permissions on the database file (Unix only)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if db_path.exists() {
            if let Err(e) =
                std::fs::set_permissions(&db_path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(error = %e, "failed to set database file permissions");
            }
        }
    }

    let mut cfg = Config::new(db_path);
    cfg.pool = Some(PoolConfig::new(config.pool_size));
    cfg.create_pool(Runtime::Tokio1)
}

/// Initialize the pool: get a connection and apply pragmas + run migrations.
pub async fn init_pool(pool: &Pool) -> Result<(), Box<dyn std::error::Error>> {
    let conn = pool.get().await?;
    conn.interact(|conn| {
        apply_pragmas(conn)?;
        crate::storage::migrations::run_migrations(conn)?;
        Ok::<_, rusqlite::Error>(())
    })
    .await??;
    Ok(())
}

/// Visitor store backed by the `visitors` table.
///
/// Each write is a single statement, so the existence check of `insert` and
/// the comparison of `update_if` are atomic with the write itself.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn interact<T, F>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await?;
        let result = conn
            .interact(move |conn| {
                // Pooled connections other than the first never saw apply_pragmas
                conn.busy_timeout(BUSY_TIMEOUT)?;
                f(conn)
            })
            .await??;
        Ok(result)
    }
}

#[async_trait]
impl VisitorStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn get(&self, visitor_id: &str) -> AppResult<Option<VisitorRecord>> {
        let id = visitor_id.to_string();
        self.interact(move |conn| {
            conn.query_row(
                "SELECT visitor_id, first_seen, last_seen, visit_count
                 FROM visitors WHERE visitor_id = ?1",
                params![id],
                |row| {
                    Ok(VisitorRecord {
                        visitor_id: row.get(0)?,
                        first_seen: row.get(1)?,
                        last_seen: row.get(2)?,
                        visit_count: row.get(3)?,
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn insert(&self, record: &VisitorRecord) -> AppResult<bool> {
        let record = record.clone();
        let inserted = self
            .interact(move |conn| {
                conn.execute(
                    "INSERT INTO visitors (visitor_id, first_seen, last_seen, visit_count)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT (visitor_id) DO NOTHING",
                    params![
                        record.visitor_id,
                        record.first_seen,
                        record.last_seen,
                        record.visit_count,
                    ],
                )
            })
            .await?;
        Ok(inserted == 1)
    }

    async fn update_if(
        &self,
        expected: &VisitorRecord,
        updated: &VisitorRecord,
    ) -> AppResult<bool> {
        let expected = expected.clone();
        let updated = updated.clone();
        let changed = self
            .interact(move |conn| {
                conn.execute(
                    "UPDATE visitors SET last_seen = ?1, visit_count = ?2
                     WHERE visitor_id = ?3
                       AND first_seen = ?4
                       AND last_seen = ?5
                       AND visit_count = ?6",
                    params![
                        updated.last_seen,
                        updated.visit_count,
                        expected.visitor_id,
                        expected.first_seen,
                        expected.last_seen,
                        expected.visit_count,
                    ],
                )
            })
            .await?;
        Ok(changed == 1)
    }

    async fn stats(&self, since: i64) -> AppResult<AggregateStats> {
        self.interact(move |conn| {
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(visit_count), 0),
                        COALESCE(SUM(CASE WHEN last_seen >= ?1 THEN 1 ELSE 0 END), 0)
                 FROM visitors",
                params![since],
                |row| {
                    Ok(AggregateStats {
                        total_unique: row.get(0)?,
                        total_visits: row.get(1)?,
                        recent_window_count: row.get(2)?,
                    })
                },
            )
        })
        .await
    }

    async fn ping(&self) -> AppResult<()> {
        self.interact(|conn| conn.execute_batch("SELECT 1")).await
    }
}
