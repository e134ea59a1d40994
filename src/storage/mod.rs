// src/storage/mod.rs
//! Relational persistence for scraped jobs and feed posts.
//!
//! One [`Storage`] value is constructed at startup and handed to whatever
//! needs it. SQLite is the default file engine; MySQL is supported for the
//! containerised deployment. Both go through the `sqlx` any-driver so the
//! repositories are written once.

pub mod jobs;
pub mod models;
pub mod posts;

use std::path::Path;
use std::time::Duration;

use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::ErrorKind;

pub use jobs::{JobFilter, JobRepository};
pub use models::{JobDescription, JobRecord, LinkedInPost, PostRecord};
pub use posts::PostRepository;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database unavailable after {attempts} attempts: {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("unsupported database url '{0}' (expected sqlite: or mysql:)")]
    UnsupportedEngine(String),

    #[error("{record} record is missing its {field}")]
    MissingKey {
        record: &'static str,
        field: &'static str,
    },

    #[error("failed to encode list field: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("corrupt {table} row {id}: {message}")]
    CorruptRow {
        table: &'static str,
        id: i64,
        message: String,
    },

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Database(_) | StorageError::Unavailable { .. } | StorageError::Io(_) => {
                ErrorKind::Transient
            }
            StorageError::UnsupportedEngine(_) => ErrorKind::Config,
            StorageError::MissingKey { .. }
            | StorageError::Encoding(_)
            | StorageError::CorruptRow { .. } => ErrorKind::DataShape,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, StorageError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            _ => Err(StorageError::UnsupportedEngine(url.to_string())),
        }
    }
}

/// Fixed-backoff retry used when creating the engine. Per-record saves are
/// never retried.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

impl UpsertOutcome {
    pub fn id(self) -> i64 {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => id,
        }
    }
}

/// Tally of a batch save. Each record is saved in its own transaction, so a
/// bad record only costs itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SaveReport {
    pub fn saved(&self) -> usize {
        self.inserted + self.updated
    }

    pub(crate) fn record(&mut self, result: &Result<UpsertOutcome, StorageError>) {
        match result {
            Ok(UpsertOutcome::Inserted(_)) => self.inserted += 1,
            Ok(UpsertOutcome::Updated(_)) => self.updated += 1,
            Err(e) if e.kind() == ErrorKind::DataShape => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pool: AnyPool,
    dialect: Dialect,
}

impl Storage {
    /// Connect with retries, then create the schema if needed.
    pub async fn connect(database_url: &str, retry: RetryPolicy) -> Result<Self, StorageError> {
        install_default_drivers();
        let dialect = Dialect::from_url(database_url)?;

        if dialect == Dialect::Sqlite {
            ensure_sqlite_parent(database_url).await?;
        }

        let attempts = retry.attempts.max(1);
        let mut attempt = 1;
        let pool = loop {
            match Self::try_connect(database_url).await {
                Ok(pool) => {
                    info!("Database connected on attempt {}/{}", attempt, attempts);
                    break pool;
                }
                Err(e) if attempt < attempts => {
                    error!("Database connection failed (attempt {}/{}): {}", attempt, attempts, e);
                    info!("Retrying in {:?}", retry.delay);
                    tokio::time::sleep(retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("Database connection failed after {} attempts: {}", attempts, e);
                    return Err(StorageError::Unavailable { attempts, source: e });
                }
            }
        };

        let storage = Self { pool, dialect };
        storage.migrate().await?;
        Ok(storage)
    }

    /// A private SQLite database that lives as long as the returned value.
    pub async fn in_memory() -> Result<Self, StorageError> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let storage = Self {
            pool,
            dialect: Dialect::Sqlite,
        };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn try_connect(database_url: &str) -> Result<AnyPool, sqlx::Error> {
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(pool)
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn jobs(&self) -> JobRepository<'_> {
        JobRepository::new(&self.pool)
    }

    pub fn posts(&self) -> PostRepository<'_> {
        PostRepository::new(&self.pool)
    }

    pub async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in schema(self.dialect) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database migrations completed ({:?})", self.dialect);
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn ensure_sqlite_parent(database_url: &str) -> Result<(), StorageError> {
    let Some(path) = sqlite_file_path(database_url) else {
        return Ok(());
    };
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            tokio::fs::create_dir_all(parent).await?;
            info!("Created database directory: {}", parent.display());
        }
    }
    Ok(())
}

/// File path of a SQLite URL, or `None` for in-memory databases.
fn sqlite_file_path(database_url: &str) -> Option<&str> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or_default();
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

fn schema(dialect: Dialect) -> &'static [&'static str] {
    match dialect {
        Dialect::Sqlite => &[
            r#"
            CREATE TABLE IF NOT EXISTS job_descriptions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_title TEXT NOT NULL,
                company_name TEXT NOT NULL,
                job_location TEXT NOT NULL,
                job_url TEXT NOT NULL UNIQUE,
                connections INTEGER NOT NULL DEFAULT 0,
                score INTEGER NOT NULL DEFAULT 0,
                job_description TEXT NOT NULL,
                model_response TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_job_descriptions_score ON job_descriptions(score)",
            r#"
            CREATE TABLE IF NOT EXISTS linkedin_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id TEXT NOT NULL UNIQUE,
                publisher_url TEXT,
                publish_date TEXT,
                post_text TEXT NOT NULL,
                links TEXT,
                emails TEXT,
                keyword_found TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_linkedin_posts_created ON linkedin_posts(created_at)",
        ],
        Dialect::MySql => &[
            r#"
            CREATE TABLE IF NOT EXISTS job_descriptions (
                id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                job_title TEXT NOT NULL,
                company_name TEXT NOT NULL,
                job_location TEXT NOT NULL,
                job_url VARCHAR(768) NOT NULL UNIQUE,
                connections BIGINT NOT NULL DEFAULT 0,
                score BIGINT NOT NULL DEFAULT 0,
                job_description MEDIUMTEXT NOT NULL,
                model_response MEDIUMTEXT,
                created_at VARCHAR(40) NOT NULL,
                updated_at VARCHAR(40) NOT NULL,
                INDEX idx_job_descriptions_score (score)
            ) CHARACTER SET utf8mb4
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS linkedin_posts (
                id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                post_id VARCHAR(255) NOT NULL UNIQUE,
                publisher_url TEXT,
                publish_date VARCHAR(40),
                post_text MEDIUMTEXT NOT NULL,
                links MEDIUMTEXT,
                emails TEXT,
                keyword_found TEXT,
                created_at VARCHAR(40) NOT NULL,
                updated_at VARCHAR(40) NOT NULL,
                INDEX idx_linkedin_posts_created (created_at)
            ) CHARACTER SET utf8mb4
            "#,
        ],
    }
}

/// Roll back after a failed unit of work, logging (not returning) any
/// rollback failure so the original error wins.
pub(crate) async fn rollback_quietly(tx: sqlx::Transaction<'_, sqlx::Any>) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}
