//! Dataset persistence

use bb_common::db::{encode_map, Dataset, JsonMap};
use bb_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct NewDataset {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "time::now")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub flag: String,
    #[serde(default)]
    pub tags: JsonMap,
    #[serde(default)]
    pub project: Option<i64>,
    #[serde(default)]
    pub lab: Option<i64>,
}

fn default_name() -> String {
    "Dataset 1".to_string()
}

const COLUMNS: &str = "id, name, created, notes, flag, tags, project_id, lab_id";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM datasets")
        .fetch_one(pool)
        .await?)
}

pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<Dataset>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM datasets ORDER BY name, id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Dataset::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Dataset>> {
    let row = sqlx::query(&format!("SELECT {} FROM datasets WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Dataset::from_row).transpose()
}

pub async fn insert(pool: &SqlitePool, dataset: &NewDataset) -> Result<Dataset> {
    let id = sqlx::query(
        "INSERT INTO datasets (name, created, notes, flag, tags, project_id, lab_id) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&dataset.name)
    .bind(time::to_db(&dataset.created))
    .bind(&dataset.notes)
    .bind(&dataset.flag)
    .bind(encode_map(&dataset.tags))
    .bind(dataset.project)
    .bind(dataset.lab)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("dataset '{}'", dataset.name)))?
    .last_insert_rowid();
    require(get(pool, id).await?, "dataset", id)
}

pub async fn update(pool: &SqlitePool, id: i64, dataset: &NewDataset) -> Result<Dataset> {
    let affected = sqlx::query(
        "UPDATE datasets SET name = ?, created = ?, notes = ?, flag = ?, tags = ?, project_id = ?, lab_id = ? WHERE id = ?",
    )
    .bind(&dataset.name)
    .bind(time::to_db(&dataset.created))
    .bind(&dataset.notes)
    .bind(&dataset.flag)
    .bind(encode_map(&dataset.tags))
    .bind(dataset.project)
    .bind(dataset.lab)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("dataset {}", id)))?
    .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("dataset {} does not exist", id)));
    }
    require(get(pool, id).await?, "dataset", id)
}

/// Delete a dataset; member runs and calibrated cameras are detached
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM datasets WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("dataset {}", id)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("dataset {} does not exist", id)));
    }
    Ok(())
}

pub async fn run_ids(pool: &SqlitePool, id: i64) -> Result<Vec<i64>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM runs WHERE dataset_id = ? ORDER BY runtime DESC, id")
            .bind(id)
            .fetch_all(pool)
            .await?,
    )
}
