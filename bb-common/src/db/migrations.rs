//! Database schema migrations
//!
//! Versioned, idempotent upgrades for catalogs created by older builds.
//! Fresh databases are created with the current schema by
//! [`crate::db::init::create_schema`]; the migrations then find nothing to do
//! and only record the version.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations**
//! 2. **Always add new migrations** and bump [`CURRENT_SCHEMA_VERSION`]
//! 3. **Use ALTER TABLE** so existing rows survive

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("Migration v2 completed");
    }

    Ok(())
}

async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name = ?)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Add a column unless the table is missing or already has it.
///
/// Returns true when the column was added.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool> {
    if !table_exists(pool, table).await? {
        info!("  {} table doesn't exist yet - skipping", table);
        return Ok(false);
    }
    if has_column(pool, table, column).await? {
        info!("  {}.{} already exists - skipping", table, column);
        return Ok(false);
    }

    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition);
    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => {
            info!("  Added {}.{}", table, column);
            Ok(true)
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  {}.{} added concurrently - skipping", table, column);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Migration v1: cameras belong to a lab
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: Add lab_id column to cameras");
    add_column_if_missing(
        pool,
        "cameras",
        "lab_id",
        "INTEGER REFERENCES labs(id) ON DELETE RESTRICT",
    )
    .await?;
    Ok(())
}

/// Migration v2: runs record the lab workday
///
/// Existing runs get the calendar date of their runtime.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: Add workday column to runs");
    let added = add_column_if_missing(pool, "runs", "workday", "TEXT NOT NULL DEFAULT ''").await?;
    if added {
        let result = sqlx::query("UPDATE runs SET workday = substr(runtime, 1, 10) WHERE workday = ''")
            .execute(pool)
            .await?;
        info!("  Backfilled workday for {} runs", result.rows_affected());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    async fn create_version_table(pool: &SqlitePool) {
        sqlx::query(
            "CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)",
        )
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_get_schema_version_no_table() {
        let pool = setup_test_db().await;
        assert_eq!(get_schema_version(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_and_get_schema_version() {
        let pool = setup_test_db().await;
        create_version_table(&pool).await;

        set_schema_version(&pool, 1).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_migrations_skip_missing_tables() {
        let pool = setup_test_db().await;
        create_version_table(&pool).await;

        run_migrations(&pool).await.unwrap();
        assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_migrate_v1_adds_camera_lab() {
        let pool = setup_test_db().await;
        sqlx::query("CREATE TABLE labs (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE cameras (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();

        migrate_v1(&pool).await.unwrap();
        assert!(has_column(&pool, "cameras", "lab_id").await.unwrap());

        // Second run is a no-op
        migrate_v1(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_migrate_v2_backfills_workday() {
        let pool = setup_test_db().await;
        sqlx::query("CREATE TABLE runs (id INTEGER PRIMARY KEY, runtime TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO runs (runtime) VALUES ('2019-03-04T15:10:06.000000Z')")
            .execute(&pool)
            .await
            .unwrap();

        migrate_v2(&pool).await.unwrap();

        let workday: String = sqlx::query_scalar("SELECT workday FROM runs WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(workday, "2019-03-04");
    }
}
