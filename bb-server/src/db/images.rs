//! Image persistence
//!
//! `(lab, name, created)` identifies a capture but is deliberately not a
//! unique index: duplicates written by older uploaders must stay readable,
//! and the reconciliation engine decides which one is canonical.

use bb_common::db::{encode_map, Atom, Image, JsonMap};
use bb_common::{time, Error, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

/// Descriptive fields an uploader may attach to an image
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageMetadata {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub tags: JsonMap,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub total_atoms: Option<f64>,
    #[serde(default)]
    pub odpath: Option<String>,
    #[serde(default)]
    pub atomsperpixel: Option<String>,
    #[serde(default)]
    pub cropi: JsonMap,
    #[serde(default)]
    pub settings: JsonMap,
    #[serde(default)]
    pub pixel_size: Option<f64>,
    #[serde(default)]
    pub atom: Atom,
}

impl ImageMetadata {
    /// Pixel size with the catalog default applied
    pub fn pixel_size(&self) -> f64 {
        self.pixel_size.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewImage {
    pub name: String,
    #[serde(default = "time::now")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub run: Option<i64>,
    #[serde(default)]
    pub lab: Option<i64>,
    #[serde(flatten)]
    pub metadata: ImageMetadata,
}

impl NewImage {
    /// A freshly captured image of a lab, not yet linked to a run
    pub fn captured(name: &str, created: DateTime<Utc>, lab_id: i64, metadata: ImageMetadata) -> Self {
        Self {
            name: name.to_string(),
            created,
            run: None,
            lab: Some(lab_id),
            metadata,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("image name cannot be empty".to_string()));
        }
        time::check_storable(&self.created)
    }
}

const COLUMNS: &str = "id, name, created, notes, filepath, tags, thumbnail, total_atoms, odpath, \
                       atomsperpixel, cropi, settings, pixel_size, atom, run_id, lab_id";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM images")
        .fetch_one(pool)
        .await?)
}

pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<Image>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM images ORDER BY created DESC, name, id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Image::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Image>> {
    let row = sqlx::query(&format!("SELECT {} FROM images WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(Image::from_row).transpose()
}

/// All images of a lab, newest first
pub async fn list_for_lab(pool: &SqlitePool, lab_id: i64) -> Result<Vec<Image>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM images WHERE lab_id = ? ORDER BY created DESC, name, id",
        COLUMNS
    ))
    .bind(lab_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Image::from_row).collect()
}

/// Images of a lab created in `[start, end]`, newest first
pub async fn list_for_lab_between(
    pool: &SqlitePool,
    lab_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<Image>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM images WHERE lab_id = ? AND created BETWEEN ? AND ? \
         ORDER BY created DESC, name, id",
        COLUMNS
    ))
    .bind(lab_id)
    .bind(time::to_db(&start))
    .bind(time::to_db(&end))
    .fetch_all(pool)
    .await?;
    rows.iter().map(Image::from_row).collect()
}

/// Images matching the capture key, lowest id first
pub async fn find_by_key(
    pool: &SqlitePool,
    lab_id: i64,
    name: &str,
    created: DateTime<Utc>,
) -> Result<Vec<Image>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM images WHERE lab_id = ? AND name = ? AND created = ? ORDER BY id",
        COLUMNS
    ))
    .bind(lab_id)
    .bind(name)
    .bind(time::to_db(&created))
    .fetch_all(pool)
    .await?;
    rows.iter().map(Image::from_row).collect()
}

/// Images of a lab whose name is one of `names`, ordered by id
pub async fn find_by_names(pool: &SqlitePool, lab_id: i64, names: &[String]) -> Result<Vec<Image>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {} FROM images WHERE lab_id = ", COLUMNS));
    qb.push_bind(lab_id);
    qb.push(" AND name IN (");
    let mut separated = qb.separated(", ");
    for name in names {
        separated.push_bind(name);
    }
    separated.push_unseparated(") ORDER BY id");

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(Image::from_row).collect()
}

pub async fn insert(pool: &SqlitePool, image: &NewImage) -> Result<Image> {
    image.validate()?;
    let meta = &image.metadata;
    let id = sqlx::query(
        r#"
        INSERT INTO images (name, created, notes, filepath, tags, thumbnail, total_atoms, odpath,
                            atomsperpixel, cropi, settings, pixel_size, atom, run_id, lab_id)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&image.name)
    .bind(time::to_db(&image.created))
    .bind(&meta.notes)
    .bind(&meta.filepath)
    .bind(encode_map(&meta.tags))
    .bind(&meta.thumbnail)
    .bind(meta.total_atoms)
    .bind(&meta.odpath)
    .bind(&meta.atomsperpixel)
    .bind(encode_map(&meta.cropi))
    .bind(encode_map(&meta.settings))
    .bind(meta.pixel_size())
    .bind(meta.atom.code())
    .bind(image.run)
    .bind(image.lab)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("image '{}'", image.name)))?
    .last_insert_rowid();
    require(get(pool, id).await?, "image", id)
}

pub async fn update(pool: &SqlitePool, id: i64, image: &NewImage) -> Result<Image> {
    image.validate()?;
    let meta = &image.metadata;
    let affected = sqlx::query(
        r#"
        UPDATE images SET name = ?, created = ?, notes = ?, filepath = ?, tags = ?, thumbnail = ?,
                          total_atoms = ?, odpath = ?, atomsperpixel = ?, cropi = ?, settings = ?,
                          pixel_size = ?, atom = ?, run_id = ?, lab_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&image.name)
    .bind(time::to_db(&image.created))
    .bind(&meta.notes)
    .bind(&meta.filepath)
    .bind(encode_map(&meta.tags))
    .bind(&meta.thumbnail)
    .bind(meta.total_atoms)
    .bind(&meta.odpath)
    .bind(&meta.atomsperpixel)
    .bind(encode_map(&meta.cropi))
    .bind(encode_map(&meta.settings))
    .bind(meta.pixel_size())
    .bind(meta.atom.code())
    .bind(image.run)
    .bind(image.lab)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| Error::from_write(e, &format!("image {}", id)))?
    .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("image {} does not exist", id)));
    }
    require(get(pool, id).await?, "image", id)
}

/// Link an image to a run
pub async fn set_run(pool: &SqlitePool, id: i64, run_id: i64) -> Result<Image> {
    let affected = sqlx::query("UPDATE images SET run_id = ? WHERE id = ?")
        .bind(run_id)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("image {}", id)))?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("image {} does not exist", id)));
    }
    require(get(pool, id).await?, "image", id)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM images WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("image {} does not exist", id)));
    }
    Ok(())
}

/// Images linked to a run, oldest first
pub async fn list_for_run(pool: &SqlitePool, run_id: i64) -> Result<Vec<Image>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM images WHERE run_id = ? ORDER BY created, id",
        COLUMNS
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(Image::from_row).collect()
}
