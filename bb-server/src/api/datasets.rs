//! Dataset endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::shapes::{self, DatasetView};
use crate::db::datasets::{self, NewDataset};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::AppState;

pub async fn list_datasets(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<DatasetView>>> {
    let Query(page) = query?;
    let total = datasets::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);

    let mut results = Vec::new();
    for dataset in datasets::list_page(&state.db, pagination).await? {
        results.push(shapes::dataset_view(&state.db, dataset).await?);
    }
    Ok(Json(Page::new(total, pagination, results)))
}

pub async fn create_dataset(
    State(state): State<AppState>,
    payload: Result<Json<NewDataset>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<DatasetView>)> {
    let Json(new) = payload?;
    let dataset = datasets::insert(&state.db, &new).await?;
    state.cache.invalidate().await;
    Ok((StatusCode::CREATED, Json(shapes::dataset_view(&state.db, dataset).await?)))
}

pub async fn get_dataset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<DatasetView>> {
    let dataset = datasets::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("dataset {} does not exist", id)))?;
    Ok(Json(shapes::dataset_view(&state.db, dataset).await?))
}

pub async fn update_dataset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewDataset>, JsonRejection>,
) -> ApiResult<Json<DatasetView>> {
    let Json(new) = payload?;
    let dataset = datasets::update(&state.db, id, &new).await?;
    state.cache.invalidate().await;
    Ok(Json(shapes::dataset_view(&state.db, dataset).await?))
}

/// DELETE /api/datasets/:id
///
/// Member runs stay, with their dataset cleared.
pub async fn delete_dataset(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    datasets::delete(&state.db, id).await?;
    state.cache.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn dataset_routes() -> Router<AppState> {
    Router::new()
        .route("/api/datasets", get(list_datasets).post(create_dataset))
        .route(
            "/api/datasets/:id",
            get(get_dataset).put(update_dataset).delete(delete_dataset),
        )
}
