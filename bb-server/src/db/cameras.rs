//! Camera persistence

use bb_common::db::Camera;
use bb_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct NewCamera {
    pub name: String,
    #[serde(default)]
    pub sdk_id: Option<String>,
    #[serde(default = "time::now")]
    pub created: DateTime<Utc>,
    #[serde(default = "default_one")]
    pub magnification: Option<f64>,
    #[serde(default)]
    pub axis: Option<String>,
    #[serde(default = "default_one")]
    pub pixel_size: Option<f64>,
    #[serde(default)]
    pub double_imaging: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub calibration_dataset: Option<i64>,
    #[serde(default)]
    pub lab: Option<i64>,
}

fn default_one() -> Option<f64> {
    Some(1.0)
}

fn default_active() -> bool {
    true
}

const COLUMNS: &str = "id, name, sdk_id, created, magnification, axis, pixel_size, \
                       double_imaging, active, calibration_dataset_id, lab_id";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM cameras")
        .fetch_one(pool)
        .await?)
}

pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<Camera>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM cameras ORDER BY created DESC, name, id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Camera::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Camera>> {
    let row = sqlx::query(&format!("SELECT {} FROM cameras WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Camera::from_row).transpose()
}

pub async fn insert(pool: &SqlitePool, camera: &NewCamera) -> Result<Camera> {
    if camera.name.trim().is_empty() {
        return Err(Error::InvalidInput("camera name cannot be empty".to_string()));
    }
    let id = sqlx::query(
        r#"
        INSERT INTO cameras (name, sdk_id, created, magnification, axis, pixel_size,
                             double_imaging, active, calibration_dataset_id, lab_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&camera.name)
    .bind(&camera.sdk_id)
    .bind(time::to_db(&camera.created))
    .bind(camera.magnification)
    .bind(&camera.axis)
    .bind(camera.pixel_size)
    .bind(camera.double_imaging)
    .bind(camera.active)
    .bind(camera.calibration_dataset)
    .bind(camera.lab)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("camera '{}'", camera.name)))?
    .last_insert_rowid();
    require(get(pool, id).await?, "camera", id)
}

pub async fn update(pool: &SqlitePool, id: i64, camera: &NewCamera) -> Result<Camera> {
    if camera.name.trim().is_empty() {
        return Err(Error::InvalidInput("camera name cannot be empty".to_string()));
    }
    let affected = sqlx::query(
        r#"
        UPDATE cameras SET name = ?, sdk_id = ?, created = ?, magnification = ?, axis = ?,
                           pixel_size = ?, double_imaging = ?, active = ?,
                           calibration_dataset_id = ?, lab_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&camera.name)
    .bind(&camera.sdk_id)
    .bind(time::to_db(&camera.created))
    .bind(camera.magnification)
    .bind(&camera.axis)
    .bind(camera.pixel_size)
    .bind(camera.double_imaging)
    .bind(camera.active)
    .bind(camera.calibration_dataset)
    .bind(camera.lab)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("camera {}", id)))?
    .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("camera {} does not exist", id)));
    }
    require(get(pool, id).await?, "camera", id)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM cameras WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("camera {}", id)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("camera {} does not exist", id)));
    }
    Ok(())
}
