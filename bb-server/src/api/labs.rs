//! Lab endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::info;

use super::shapes::{self, LabView};
use crate::db::labs::{self, NewLab};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::AppState;

pub async fn list_labs(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<LabView>>> {
    let Query(page) = query?;
    let total = labs::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);

    let mut results = Vec::new();
    for lab in labs::list_page(&state.db, pagination).await? {
        results.push(shapes::lab_view(&state.db, lab).await?);
    }
    Ok(Json(Page::new(total, pagination, results)))
}

pub async fn create_lab(
    State(state): State<AppState>,
    payload: Result<Json<NewLab>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LabView>)> {
    let Json(new) = payload?;
    let lab = labs::insert(&state.db, &new).await?;
    state.cache.invalidate().await;
    info!(lab = %lab.name, "Lab created");
    Ok((StatusCode::CREATED, Json(shapes::lab_view(&state.db, lab).await?)))
}

pub async fn get_lab(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<LabView>> {
    let lab = labs::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lab {} does not exist", id)))?;
    Ok(Json(shapes::lab_view(&state.db, lab).await?))
}

pub async fn update_lab(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewLab>, JsonRejection>,
) -> ApiResult<Json<LabView>> {
    let Json(new) = payload?;
    let lab = labs::update(&state.db, id, &new).await?;
    state.cache.invalidate().await;
    Ok(Json(shapes::lab_view(&state.db, lab).await?))
}

/// DELETE /api/labs/:id
///
/// 409 while the lab still owns runs, images or cameras.
pub async fn delete_lab(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    labs::delete(&state.db, id).await?;
    state.cache.invalidate().await;
    info!(lab_id = id, "Lab deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn lab_routes() -> Router<AppState> {
    Router::new()
        .route("/api/labs", get(list_labs).post(create_lab))
        .route("/api/labs/:id", get(get_lab).put(update_lab).delete(delete_lab))
}
