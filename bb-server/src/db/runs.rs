//! Run persistence
//!
//! A run is one execution of the experiment sequence; images are linked to
//! it by reconciliation when their capture time falls near its runtime.

use bb_common::db::{encode_map, JsonMap, Run};
use bb_common::{time, Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct NewRun {
    #[serde(default = "time::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "time::now")]
    pub runtime: DateTime<Utc>,
    /// Lab workday; the calendar date of `runtime` when omitted
    #[serde(default)]
    pub workday: Option<NaiveDate>,
    #[serde(default)]
    pub parameters: JsonMap,
    #[serde(default)]
    pub bad_shot: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub lab: Option<i64>,
    #[serde(default)]
    pub dataset: Option<i64>,
}

impl NewRun {
    fn workday(&self) -> NaiveDate {
        self.workday.unwrap_or_else(|| self.runtime.date_naive())
    }

    fn validate(&self) -> Result<()> {
        time::check_storable(&self.created)?;
        time::check_storable(&self.runtime)
    }
}

const COLUMNS: &str =
    "id, created, runtime, workday, parameters, bad_shot, notes, lab_id, dataset_id";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM runs")
        .fetch_one(pool)
        .await?)
}

/// Newest runs first
pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<Run>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM runs ORDER BY runtime DESC, id DESC LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Run::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Run>> {
    let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Run::from_row).transpose()
}

/// Runs of a lab whose runtime lies in `[start, end]`
///
/// Ordered by runtime, then id, so the first entry is the canonical match.
pub async fn find_in_window(
    pool: &SqlitePool,
    lab_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Run>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM runs WHERE lab_id = ? AND runtime BETWEEN ? AND ? ORDER BY runtime, id",
        COLUMNS
    ))
    .bind(lab_id)
    .bind(time::to_db(&start))
    .bind(time::to_db(&end))
    .fetch_all(pool)
    .await?;
    rows.iter().map(Run::from_row).collect()
}

pub async fn insert(pool: &SqlitePool, run: &NewRun) -> Result<Run> {
    run.validate()?;
    let id = sqlx::query(
        r#"
        INSERT INTO runs (created, runtime, workday, parameters, bad_shot, notes, lab_id, dataset_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(time::to_db(&run.created))
    .bind(time::to_db(&run.runtime))
    .bind(run.workday().to_string())
    .bind(encode_map(&run.parameters))
    .bind(run.bad_shot)
    .bind(&run.notes)
    .bind(run.lab)
    .bind(run.dataset)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, "run"))?
    .last_insert_rowid();
    require(get(pool, id).await?, "run", id)
}

pub async fn update(pool: &SqlitePool, id: i64, run: &NewRun) -> Result<Run> {
    run.validate()?;
    let affected = sqlx::query(
        r#"
        UPDATE runs SET created = ?, runtime = ?, workday = ?, parameters = ?, bad_shot = ?,
                        notes = ?, lab_id = ?, dataset_id = ?
        WHERE id = ?
        "#,
    )
    .bind(time::to_db(&run.created))
    .bind(time::to_db(&run.runtime))
    .bind(run.workday().to_string())
    .bind(encode_map(&run.parameters))
    .bind(run.bad_shot)
    .bind(&run.notes)
    .bind(run.lab)
    .bind(run.dataset)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("run {}", id)))?
    .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("run {} does not exist", id)));
    }
    require(get(pool, id).await?, "run", id)
}

/// Delete a run
///
/// Fails with [`Error::Conflict`] while images still reference it.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM runs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("run {}", id)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("run {} does not exist", id)));
    }
    Ok(())
}

pub async fn image_ids(pool: &SqlitePool, id: i64) -> Result<Vec<i64>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM images WHERE run_id = ? ORDER BY created, id")
            .bind(id)
            .fetch_all(pool)
            .await?,
    )
}
