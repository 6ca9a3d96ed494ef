//! Database initialization
//!
//! Opens (or creates) the SQLite catalog, applies connection pragmas to every
//! pooled connection and creates any missing tables. Safe to call on an
//! existing database.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys must be enabled per connection, so they go in the connect
    // options rather than a one-off PRAGMA on the pool.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    // Manual migrations for databases created by older builds
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_labs_table(pool).await?;
    create_projects_table(pool).await?;
    create_datasets_table(pool).await?;
    create_runs_table(pool).await?;
    create_cameras_table(pool).await?;
    create_images_table(pool).await?;
    create_userprofiles_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_labs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created TEXT NOT NULL,
            info TEXT,
            photo TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_projects_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT 'Project1',
            created TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            lab_id INTEGER REFERENCES labs(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_datasets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS datasets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL DEFAULT 'Dataset 1',
            created TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT '',
            flag TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '{}',
            project_id INTEGER REFERENCES projects(id) ON DELETE SET NULL,
            lab_id INTEGER REFERENCES labs(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created TEXT NOT NULL,
            runtime TEXT NOT NULL,
            workday TEXT NOT NULL,
            parameters TEXT NOT NULL DEFAULT '{}',
            bad_shot INTEGER NOT NULL DEFAULT 0,
            notes TEXT NOT NULL DEFAULT '',
            lab_id INTEGER REFERENCES labs(id) ON DELETE RESTRICT,
            dataset_id INTEGER REFERENCES datasets(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tolerance-window search: runs of one lab by runtime
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_lab_runtime ON runs(lab_id, runtime)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_cameras_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cameras (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            sdk_id TEXT,
            created TEXT NOT NULL,
            magnification REAL DEFAULT 1.0,
            axis TEXT,
            pixel_size REAL DEFAULT 1.0,
            double_imaging INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            calibration_dataset_id INTEGER REFERENCES datasets(id) ON DELETE SET NULL,
            lab_id INTEGER REFERENCES labs(id) ON DELETE RESTRICT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    // (lab_id, name, created) is intentionally not UNIQUE: duplicates are
    // tolerated and resolved by the reconciliation policy.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created TEXT NOT NULL,
            notes TEXT,
            filepath TEXT,
            tags TEXT NOT NULL DEFAULT '{}',
            thumbnail TEXT,
            total_atoms REAL,
            odpath TEXT,
            atomsperpixel TEXT,
            cropi TEXT NOT NULL DEFAULT '{}',
            settings TEXT NOT NULL DEFAULT '{}',
            pixel_size REAL DEFAULT 1.0,
            atom TEXT NOT NULL DEFAULT 'Li' CHECK (atom IN ('Li', 'Na', 'K')),
            run_id INTEGER REFERENCES runs(id) ON DELETE RESTRICT,
            lab_id INTEGER REFERENCES labs(id) ON DELETE RESTRICT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_images_lab_name_created ON images(lab_id, name, created)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_run ON images(run_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_userprofiles_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS userprofiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            lab_id INTEGER REFERENCES labs(id) ON DELETE SET NULL,
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
