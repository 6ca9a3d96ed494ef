//! User profile persistence

use bb_common::db::UserProfile;
use bb_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;

use super::require;
use crate::pagination::{Pagination, PAGE_SIZE};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUserProfile {
    pub username: String,
    #[serde(default)]
    pub lab: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewUserProfile {
    fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(Error::InvalidInput("username cannot be empty".to_string()));
        }
        if self.description.as_deref().map_or(0, |d| d.chars().count()) > 300 {
            return Err(Error::InvalidInput(
                "description is limited to 300 characters".to_string(),
            ));
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, username, lab_id, description";

pub async fn count(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM userprofiles")
        .fetch_one(pool)
        .await?)
}

pub async fn list_page(pool: &SqlitePool, page: Pagination) -> Result<Vec<UserProfile>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM userprofiles ORDER BY username, id LIMIT ? OFFSET ?",
        COLUMNS
    ))
    .bind(PAGE_SIZE)
    .bind(page.offset)
    .fetch_all(pool)
    .await?;
    rows.iter().map(UserProfile::from_row).collect()
}

pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<UserProfile>> {
    let row = sqlx::query(&format!("SELECT {} FROM userprofiles WHERE id = ?", COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(UserProfile::from_row).transpose()
}

pub async fn insert(pool: &SqlitePool, profile: &NewUserProfile) -> Result<UserProfile> {
    profile.validate()?;
    let id = sqlx::query("INSERT INTO userprofiles (username, lab_id, description) VALUES (?, ?, ?)")
        .bind(profile.username.trim())
        .bind(profile.lab)
        .bind(&profile.description)
        .execute(pool)
        .await
        .map_err(|e| Error::from_write(e, &format!("user '{}'", profile.username)))?
        .last_insert_rowid();
    require(get(pool, id).await?, "userprofile", id)
}

pub async fn update(pool: &SqlitePool, id: i64, profile: &NewUserProfile) -> Result<UserProfile> {
    profile.validate()?;
    let affected =
        sqlx::query("UPDATE userprofiles SET username = ?, lab_id = ?, description = ? WHERE id = ?")
            .bind(profile.username.trim())
            .bind(profile.lab)
            .bind(&profile.description)
            .bind(id)
            .execute(pool)
            .await
            .map_err(|e| Error::from_write(e, &format!("user '{}'", profile.username)))?
            .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("userprofile {} does not exist", id)));
    }
    require(get(pool, id).await?, "userprofile", id)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> Result<()> {
    let affected = sqlx::query("DELETE FROM userprofiles WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();
    if affected == 0 {
        return Err(Error::NotFound(format!("userprofile {} does not exist", id)));
    }
    Ok(())
}
