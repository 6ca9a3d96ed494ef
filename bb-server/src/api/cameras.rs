//! Camera endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::shapes::CameraView;
use crate::db::cameras::{self, NewCamera};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::AppState;

pub async fn list_cameras(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<CameraView>>> {
    let Query(page) = query?;
    let total = cameras::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);
    let results = cameras::list_page(&state.db, pagination)
        .await?
        .into_iter()
        .map(CameraView::from)
        .collect();
    Ok(Json(Page::new(total, pagination, results)))
}

pub async fn create_camera(
    State(state): State<AppState>,
    payload: Result<Json<NewCamera>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CameraView>)> {
    let Json(new) = payload?;
    let camera = cameras::insert(&state.db, &new).await?;
    Ok((StatusCode::CREATED, Json(camera.into())))
}

pub async fn get_camera(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<CameraView>> {
    let camera = cameras::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("camera {} does not exist", id)))?;
    Ok(Json(camera.into()))
}

pub async fn update_camera(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewCamera>, JsonRejection>,
) -> ApiResult<Json<CameraView>> {
    let Json(new) = payload?;
    Ok(Json(cameras::update(&state.db, id, &new).await?.into()))
}

pub async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    cameras::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn camera_routes() -> Router<AppState> {
    Router::new()
        .route("/api/cameras", get(list_cameras).post(create_camera))
        .route(
            "/api/cameras/:id",
            get(get_camera).put(update_camera).delete(delete_camera),
        )
}
