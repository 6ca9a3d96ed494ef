//! Project persistence

use bb_common::db::Project;
use bb_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "time::now")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub lab: Option<i64>,
}

fn default_name() -> String {
    "Project1".to_string()
}

const COLUMNS: &str = "id, name, created, notes, lab_id";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM projects")
        .fetch_one(pool)
        .await?)
}

pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<Project>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM projects ORDER BY name, id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Project::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Project>> {
    let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Project::from_row).transpose()
}

pub async fn insert(pool: &SqlitePool, project: &NewProject) -> Result<Project> {
    let id = sqlx::query("INSERT INTO projects (name, created, notes, lab_id) VALUES (?, ?, ?, ?)")
        .bind(&project.name)
        .bind(time::to_db(&project.created))
        .bind(&project.notes)
        .bind(project.lab)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("project '{}'", project.name)))?
        .last_insert_rowid();
    require(get(pool, id).await?, "project", id)
}

pub async fn update(pool: &SqlitePool, id: i64, project: &NewProject) -> Result<Project> {
    let affected =
        sqlx::query("UPDATE projects SET name = ?, created = ?, notes = ?, lab_id = ? WHERE id = ?")
            .bind(&project.name)
            .bind(time::to_db(&project.created))
            .bind(&project.notes)
            .bind(project.lab)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| Error::from_write(e, &format!("project {}", id)))?
            .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("project {} does not exist", id)));
    }
    require(get(pool, id).await?, "project", id)
}

/// Delete a project; its datasets are kept and detached
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("project {}", id)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("project {} does not exist", id)));
    }
    Ok(())
}

pub async fn dataset_ids(pool: &SqlitePool, id: i64) -> Result<Vec<i64>> {
    Ok(
        sqlx::query_scalar("SELECT id FROM datasets WHERE project_id = ? ORDER BY name, id")
            .bind(id)
            .fetch_all(pool)
            .await?,
    )
}
