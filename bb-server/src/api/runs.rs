//! Run endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::Value;
use tracing::info;

use super::shapes::{self, RunDetail};
use crate::db::runs::{self, NewRun};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::AppState;

/// GET /api/runs?page=N
pub async fn list_runs(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(page) = query?;
    let generation = state.cache.generation();
    let total = runs::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);

    let key = format!("runs/list/{}", pagination.page);
    if let Some(body) = state.cache.get(&key).await {
        return Ok(Json(body));
    }

    let mut results = Vec::new();
    for run in runs::list_page(&state.db, pagination).await? {
        results.push(shapes::run_list_item(&state.db, run).await?);
    }
    let body = serde_json::to_value(Page::new(total, pagination, results))?;
    state.cache.insert(key, body.clone(), generation).await;
    Ok(Json(body))
}

/// POST /api/runs
pub async fn create_run(
    State(state): State<AppState>,
    payload: Result<Json<NewRun>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RunDetail>)> {
    let Json(new) = payload?;
    let run = runs::insert(&state.db, &new).await?;
    state.cache.invalidate().await;
    info!(run_id = run.id, runtime = %run.runtime, "Run created");
    Ok((StatusCode::CREATED, Json(shapes::run_detail(&state.db, run).await?)))
}

/// GET /api/runs/:id
pub async fn get_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<RunDetail>> {
    let run = runs::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {} does not exist", id)))?;
    Ok(Json(shapes::run_detail(&state.db, run).await?))
}

/// PUT /api/runs/:id
pub async fn update_run(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewRun>, JsonRejection>,
) -> ApiResult<Json<RunDetail>> {
    let Json(new) = payload?;
    let run = runs::update(&state.db, id, &new).await?;
    state.cache.invalidate().await;
    Ok(Json(shapes::run_detail(&state.db, run).await?))
}

/// DELETE /api/runs/:id
///
/// 409 while images are still linked to the run.
pub async fn delete_run(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    runs::delete(&state.db, id).await?;
    state.cache.invalidate().await;
    info!(run_id = id, "Run deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/:id", get(get_run).put(update_run).delete(delete_run))
}
