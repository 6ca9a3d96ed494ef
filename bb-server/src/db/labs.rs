//! Lab persistence

use bb_common::db::Lab;
use bb_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

/// Writable lab fields
#[derive(Debug, Clone, Deserialize)]
pub struct NewLab {
    pub name: String,
    #[serde(default = "time::now")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub info: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl NewLab {
    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("lab name cannot be empty".to_string()));
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, name, created, info, photo";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM labs")
        .fetch_one(pool)
        .await?)
}

pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<Lab>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM labs ORDER BY name, id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Lab::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Lab>> {
    let row = sqlx::query(&format!("SELECT {} FROM labs WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Lab::from_row).transpose()
}

/// Look a lab up by its (unique) name
pub async fn find_by_name(pool: &SqlitePool, name: &str) -> Result<Option<Lab>> {
    let row = sqlx::query(&format!("SELECT {} FROM labs WHERE name = ?", COLUMNS))
        .bind(name)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Lab::from_row).transpose()
}

/// Like [`find_by_name`] but a missing lab is an error
pub async fn require_by_name(pool: &SqlitePool, name: &str) -> Result<Lab> {
    find_by_name(pool, name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("lab '{}' does not exist", name)))
}

pub async fn insert(pool: &SqlitePool, lab: &NewLab) -> Result<Lab> {
    lab.validate()?;
    let id = sqlx::query("INSERT INTO labs (name, created, info, photo) VALUES (?, ?, ?, ?)")
        .bind(lab.name.trim())
        .bind(time::to_db(&lab.created))
        .bind(&lab.info)
        .bind(&lab.photo)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("lab '{}'", lab.name)))?
        .last_insert_rowid();
    require(get(pool, id).await?, "lab", id)
}

pub async fn update(pool: &SqlitePool, id: i64, lab: &NewLab) -> Result<Lab> {
    lab.validate()?;
    let affected = sqlx::query("UPDATE labs SET name = ?, created = ?, info = ?, photo = ? WHERE id = ?")
        .bind(lab.name.trim())
        .bind(time::to_db(&lab.created))
        .bind(&lab.info)
        .bind(&lab.photo)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("lab '{}'", lab.name)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("lab {} does not exist", id)));
    }
    require(get(pool, id).await?, "lab", id)
}

/// Delete a lab; refused while runs, images or cameras still reference it
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM labs WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("lab {}", id)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("lab {} does not exist", id)));
    }
    Ok(())
}

/// Reverse relations shown on the lab resource
#[derive(Debug, Default)]
pub struct LabRelations {
    pub runs: Vec<i64>,
    pub projects: Vec<i64>,
    pub userprofiles: Vec<i64>,
}

pub async fn relations(pool: &SqlitePool, id: i64) -> Result<LabRelations> {
    Ok(LabRelations {
        runs: sqlx::query_scalar("SELECT id FROM runs WHERE lab_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(pool)
            .await?,
        projects: sqlx::query_scalar("SELECT id FROM projects WHERE lab_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(pool)
            .await?,
        userprofiles: sqlx::query_scalar("SELECT id FROM userprofiles WHERE lab_id = ? ORDER BY id")
            .bind(id)
            .fetch_all(pool)
            .await?,
    })
}
