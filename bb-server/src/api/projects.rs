//! Project endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::shapes::{self, ProjectView};
use crate::db::projects::{self, NewProject};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::AppState;

pub async fn list_projects(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<ProjectView>>> {
    let Query(page) = query?;
    let total = projects::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);

    let mut results = Vec::new();
    for project in projects::list_page(&state.db, pagination).await? {
        results.push(shapes::project_view(&state.db, project).await?);
    }
    Ok(Json(Page::new(total, pagination, results)))
}

pub async fn create_project(
    State(state): State<AppState>,
    payload: Result<Json<NewProject>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ProjectView>)> {
    let Json(new) = payload?;
    let project = projects::insert(&state.db, &new).await?;
    state.cache.invalidate().await;
    Ok((StatusCode::CREATED, Json(shapes::project_view(&state.db, project).await?)))
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ProjectView>> {
    let project = projects::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("project {} does not exist", id)))?;
    Ok(Json(shapes::project_view(&state.db, project).await?))
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewProject>, JsonRejection>,
) -> ApiResult<Json<ProjectView>> {
    let Json(new) = payload?;
    let project = projects::update(&state.db, id, &new).await?;
    state.cache.invalidate().await;
    Ok(Json(shapes::project_view(&state.db, project).await?))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    projects::delete(&state.db, id).await?;
    state.cache.invalidate().await;
    Ok(StatusCode::NO_CONTENT)
}

pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:id",
            get(get_project).put(update_project).delete(delete_project),
        )
}
