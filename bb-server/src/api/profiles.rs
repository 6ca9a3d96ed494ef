//! User profile endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::get,
    Json, Router,
};

use super::shapes::UserProfileView;
use crate::db::profiles::{self, NewUserProfile};
use crate::error::{ApiError, ApiResult};
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::AppState;

pub async fn list_profiles(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Page<UserProfileView>>> {
    let Query(page) = query?;
    let total = profiles::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);
    let results = profiles::list_page(&state.db, pagination)
        .await?
        .into_iter()
        .map(UserProfileView::from)
        .collect();
    Ok(Json(Page::new(total, pagination, results)))
}

pub async fn create_profile(
    State(state): State<AppState>,
    payload: Result<Json<NewUserProfile>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<UserProfileView>)> {
    let Json(new) = payload?;
    let profile = profiles::insert(&state.db, &new).await?;
    Ok((StatusCode::CREATED, Json(profile.into())))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserProfileView>> {
    let profile = profiles::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("userprofile {} does not exist", id)))?;
    Ok(Json(profile.into()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewUserProfile>, JsonRejection>,
) -> ApiResult<Json<UserProfileView>> {
    let Json(new) = payload?;
    Ok(Json(profiles::update(&state.db, id, &new).await?.into()))
}

pub async fn delete_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    profiles::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/api/userprofiles", get(list_profiles).post(create_profile))
        .route(
            "/api/userprofiles/:id",
            get(get_profile).put(update_profile).delete(delete_profile),
        )
}
