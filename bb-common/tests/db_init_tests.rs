//! Integration tests for database initialization
//!
//! Covers first-run creation, reopening an existing catalog, schema version
//! tracking and the referential policies of the schema.

use bb_common::db::init::init_database;
use bb_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("breadboard.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("breadboard.db");

    let pool1 = init_database(&db_path).await.unwrap();
    sqlx::query("INSERT INTO labs (name, created) VALUES ('bec1', '2024-01-01T00:00:00.000000Z')")
        .execute(&pool1)
        .await
        .unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await.unwrap();
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labs")
        .fetch_one(&pool2)
        .await
        .unwrap();
    assert_eq!(count, 1, "existing rows must survive reopening");
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("breadboard.db")).await.unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("breadboard.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    for expected in [
        "cameras",
        "datasets",
        "images",
        "labs",
        "projects",
        "runs",
        "schema_version",
        "userprofiles",
    ] {
        assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_lab_names_unique() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("breadboard.db")).await.unwrap();

    let insert = "INSERT INTO labs (name, created) VALUES ('bec1', '2024-01-01T00:00:00.000000Z')";
    sqlx::query(insert).execute(&pool).await.unwrap();
    let err = sqlx::query(insert).execute(&pool).await.unwrap_err();

    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_unique_violation()),
        other => panic!("expected unique violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_run_with_images_cannot_be_deleted() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("breadboard.db")).await.unwrap();

    sqlx::query(
        "INSERT INTO runs (id, created, runtime, workday) VALUES (1, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z', '2024-01-01')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO images (name, created, run_id) VALUES ('shot', '2024-01-01T00:00:01.000000Z', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    let err = sqlx::query("DELETE FROM runs WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap_err();
    match err {
        sqlx::Error::Database(db_err) => assert!(db_err.is_foreign_key_violation()),
        other => panic!("expected foreign key violation, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dataset_delete_nullifies_runs() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("breadboard.db")).await.unwrap();

    sqlx::query("INSERT INTO datasets (id, name, created) VALUES (1, 'evap scan', '2024-01-01T00:00:00.000000Z')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO runs (id, created, runtime, workday, dataset_id) VALUES (1, '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z', '2024-01-01', 1)",
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM datasets WHERE id = 1")
        .execute(&pool)
        .await
        .unwrap();

    let dataset_id: Option<i64> = sqlx::query_scalar("SELECT dataset_id FROM runs WHERE id = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(dataset_id, None);
}
