//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `CodeStore` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use study_gate_core::codegen::{normalize, CodeGenerator, CodeSpec};
use study_gate_core::domain::AccessCode;
use study_gate_core::ports::{CodeStats, CodeStore, PortError, PortResult, SeedOutcome};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Rows per multi-row INSERT while seeding; keeps each statement well under
/// SQLite's bound-parameter limit.
const INSERT_BATCH: usize = 400;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `CodeStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
    generator: CodeGenerator,
    export_path: Option<PathBuf>,
    seed_lock: Arc<Mutex<()>>,
}

impl DbAdapter {
    /// Creates a new `DbAdapter` that seeds pools of the given shape.
    pub fn new(pool: SqlitePool, spec: CodeSpec) -> Self {
        Self {
            pool,
            generator: CodeGenerator::new(spec),
            export_path: None,
            seed_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Also writes the sorted plain-text export here whenever a pool is seeded.
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = Some(path.into());
        self
    }

    /// Opens a connection pool, creating the database file if needed.
    pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(10));
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Looks up a single code without changing it.
    pub async fn get_code(&self, code: &str) -> PortResult<Option<AccessCode>> {
        let record = sqlx::query_as::<_, CodeRecord>("SELECT code, used FROM codes WHERE code = ?")
            .bind(normalize(code))
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(record.map(CodeRecord::to_domain))
    }
}

fn storage(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CodeRecord {
    code: String,
    used: bool,
}
impl CodeRecord {
    fn to_domain(self) -> AccessCode {
        AccessCode {
            value: self.code,
            used: self.used,
        }
    }
}

//=========================================================================================
// `CodeStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CodeStore for DbAdapter {
    async fn initialize(&self) -> PortResult<SeedOutcome> {
        // In-process callers queue here; other processes are held off by the
        // seed marker row, whose insert takes SQLite's write lock.
        let _guard = self.seed_lock.lock().await;
        let spec = self.generator.spec();

        let mut tx = self.pool.begin().await.map_err(storage)?;

        let claimed = sqlx::query(
            "INSERT INTO code_pool_seed (id, pool_size, seeded_at) VALUES (1, ?, ?) ON CONFLICT(id) DO NOTHING",
        )
        .bind(spec.count as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage)?
        .rows_affected()
            == 1;

        if !claimed {
            tx.rollback().await.map_err(storage)?;
            return Ok(SeedOutcome::AlreadySeeded);
        }

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM codes")
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;
        if existing > 0 {
            warn!(existing, "Code table populated without a seed marker; recording it");
            sqlx::query("UPDATE code_pool_seed SET pool_size = ? WHERE id = 1")
                .bind(existing)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            tx.commit().await.map_err(storage)?;
            return Ok(SeedOutcome::AlreadySeeded);
        }

        info!(count = spec.count, length = spec.length, "Generating access code pool...");
        let pool = self.generator.generate()?;

        for batch in pool.codes().chunks(INSERT_BATCH) {
            let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO codes (code, used) ");
            builder.push_values(batch, |mut row, code| {
                row.push_bind(code.as_str()).push_bind(false);
            });
            builder.push(" ON CONFLICT(code) DO NOTHING");
            builder.build().execute(&mut *tx).await.map_err(storage)?;
        }

        // The export is written before commit so a failed write leaves the
        // store empty and the next start tries again.
        if let Some(path) = &self.export_path {
            tokio::fs::write(path, pool.export_text())
                .await
                .map_err(|e| PortError::Storage(format!("Failed to write {}: {}", path.display(), e)))?;
            info!(path = %path.display(), "Access codes exported");
        }

        tx.commit().await.map_err(storage)?;
        info!(count = pool.len(), "Access code pool stored");
        Ok(SeedOutcome::Generated(pool.len()))
    }

    async fn redeem(&self, code: &str) -> PortResult<bool> {
        // The conditional update is the whole check-and-set: of any number of
        // concurrent callers, only one can see `used = 0` and flip it.
        let result = sqlx::query("UPDATE codes SET used = 1 WHERE code = ? AND used = 0")
            .bind(normalize(code))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 1 {
            return Ok(true);
        }

        match self.get_code(code).await? {
            Some(existing) if existing.used => {
                info!(code = %existing.value, "Refused an access code that was already used")
            }
            _ => debug!("Refused an unknown access code"),
        }
        Ok(false)
    }

    async fn stats(&self) -> PortResult<CodeStats> {
        let (total, used): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(used), 0) FROM codes")
                .fetch_one(&self.pool)
                .await
                .map_err(storage)?;
        Ok(CodeStats {
            total: total as u64,
            used: used as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store(spec: CodeSpec) -> DbAdapter {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = DbAdapter::new(pool, spec);
        store.run_migrations().await.unwrap();
        store
    }

    async fn file_store(dir: &tempfile::TempDir, spec: CodeSpec) -> DbAdapter {
        let url = format!("sqlite://{}", dir.path().join("codes.db").display());
        let store = DbAdapter::new(DbAdapter::connect(&url).await.unwrap(), spec);
        store.run_migrations().await.unwrap();
        store
    }

    async fn any_unused_code(store: &DbAdapter) -> String {
        sqlx::query_scalar("SELECT code FROM codes WHERE used = 0 LIMIT 1")
            .fetch_one(&store.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn seeds_once_and_exports_sorted_codes() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("codes.txt");
        let store = memory_store(CodeSpec::default()).await.with_export_path(&export);

        assert_eq!(store.initialize().await.unwrap(), SeedOutcome::Generated(10_000));
        assert_eq!(store.initialize().await.unwrap(), SeedOutcome::AlreadySeeded);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats, CodeStats { total: 10_000, used: 0 });

        let text = std::fs::read_to_string(&export).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 10_000);
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
        assert!(lines.iter().all(|c| CodeSpec::default().matches(c)));
    }

    #[tokio::test]
    async fn redeems_exactly_once_ignoring_case_and_whitespace() {
        let store = memory_store(CodeSpec { count: 20, length: 4 }).await;
        store.initialize().await.unwrap();
        let code = any_unused_code(&store).await;

        let messy = format!("  {}\t", code.to_lowercase());
        assert!(store.redeem(&messy).await.unwrap());
        assert!(!store.redeem(&code).await.unwrap());
        assert!(!store.redeem(&messy).await.unwrap());

        let record = store.get_code(&code).await.unwrap().unwrap();
        assert!(record.used);
        assert_eq!(store.stats().await.unwrap().used, 1);
    }

    #[tokio::test]
    async fn unknown_codes_are_rejected() {
        let store = memory_store(CodeSpec { count: 5, length: 4 }).await;
        store.initialize().await.unwrap();
        assert!(!store.redeem("").await.unwrap());
        assert!(!store.redeem("NOT-A-CODE").await.unwrap());
        assert!(store.get_code("????").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn over_capacity_leaves_store_empty() {
        let store = memory_store(CodeSpec { count: 37, length: 1 }).await;
        assert!(matches!(
            store.initialize().await,
            Err(PortError::CapacityExhausted { requested: 37, capacity: 36 })
        ));
        assert_eq!(store.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn closed_pool_is_a_storage_failure() {
        let store = memory_store(CodeSpec { count: 5, length: 4 }).await;
        store.pool.close().await;
        assert!(matches!(store.redeem("AB12").await, Err(PortError::Storage(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_redemptions_of_one_code_succeed_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = file_store(&dir, CodeSpec { count: 50, length: 4 }).await;
        store.initialize().await.unwrap();

        for _ in 0..10 {
            let code = any_unused_code(&store).await;
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = store.clone();
                    let code = code.clone();
                    tokio::spawn(async move { store.redeem(&code).await.unwrap() })
                })
                .collect();

            let mut wins = 0;
            for handle in handles {
                if handle.await.unwrap() {
                    wins += 1;
                }
            }
            assert_eq!(wins, 1, "code {code} redeemed {wins} times");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_initialization_generates_once() {
        let dir = tempfile::tempdir().unwrap();
        let first = file_store(&dir, CodeSpec { count: 500, length: 4 }).await;
        // A second adapter on the same file stands in for another process.
        let url = format!("sqlite://{}", dir.path().join("codes.db").display());
        let second = DbAdapter::new(
            DbAdapter::connect(&url).await.unwrap(),
            CodeSpec { count: 500, length: 4 },
        );

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let store = if i % 2 == 0 { first.clone() } else { second.clone() };
                tokio::spawn(async move { store.initialize().await.unwrap() })
            })
            .collect();

        let mut generated = 0;
        for handle in handles {
            if let SeedOutcome::Generated(n) = handle.await.unwrap() {
                assert_eq!(n, 500);
                generated += 1;
            }
        }
        assert_eq!(generated, 1);
        assert_eq!(first.stats().await.unwrap().total, 500);
    }
}
