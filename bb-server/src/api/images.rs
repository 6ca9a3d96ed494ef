//! Image endpoints and the image query
//!
//! `POST /api/images` is the uploader entry point: it runs the image query,
//! which in names+created mode creates missing images and links them to
//! runs. Plain image creation goes through that path only.

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::shapes::{self, ImageListItem};
use crate::db::images::{self, NewImage};
use crate::db::labs;
use crate::error::{ApiError, ApiResult};
use crate::lookup;
use crate::pagination::{calculate_pagination, Page, PageQuery};
use crate::query::{ImageQuery, ImageRequest, QueryMode};
use crate::reconcile::CaptureBatch;
use crate::AppState;

/// Image query body, JSON or form-encoded
pub struct QueryBody(pub ImageQuery);

#[async_trait]
impl<S> FromRequest<S> for QueryBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |ct| ct.starts_with("application/json"));

        if is_json {
            let Json(query) = Json::<ImageQuery>::from_request(req, state).await?;
            Ok(QueryBody(query))
        } else {
            let Form(query) = Form::<ImageQuery>::from_request(req, state).await?;
            Ok(QueryBody(query))
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QueryResponse<T> {
    pub mode: QueryMode,
    pub count: usize,
    pub results: Vec<T>,
    pub warnings: Vec<String>,
}

impl<T> QueryResponse<T> {
    fn new(mode: QueryMode, results: Vec<T>, warnings: Vec<String>) -> Self {
        Self {
            mode,
            count: results.len(),
            results,
            warnings,
        }
    }
}

/// Cache key of a read-only query, `None` for queries that write
fn cache_key(request: &ImageRequest) -> Option<String> {
    match request {
        ImageRequest::Quick { lab } => Some(format!("images/quick/{}", lab)),
        ImageRequest::DateTimeRange { lab, start, end } => Some(format!(
            "images/range/{}/{}/{}",
            lab,
            start.timestamp_micros(),
            end.timestamp_micros()
        )),
        ImageRequest::Names { lab, names } => {
            Some(format!("images/names/{}/{}", lab, names.join(",")))
        }
        ImageRequest::NamesCreated { .. } => None,
    }
}

/// Classify and execute an image query
pub async fn run_query(state: &AppState, query: ImageQuery) -> ApiResult<Response> {
    let request = query.classify()?;
    let mode = request.mode();

    let key = cache_key(&request);
    let generation = state.cache.generation();
    if let Some(key) = &key {
        if let Some(body) = state.cache.get(key).await {
            return Ok(Json(body).into_response());
        }
    }

    let (status, body) = match request {
        ImageRequest::Quick { lab } => {
            let lab = labs::require_by_name(&state.db, &lab).await?;
            let results: Vec<ImageListItem> = images::list_for_lab(&state.db, lab.id)
                .await?
                .into_iter()
                .map(ImageListItem::from)
                .collect();
            (StatusCode::OK, serde_json::to_value(QueryResponse::new(mode, results, Vec::new()))?)
        }
        ImageRequest::DateTimeRange { lab, start, end } => {
            let lab = labs::require_by_name(&state.db, &lab).await?;
            let found = images::list_for_lab_between(&state.db, lab.id, start, end).await?;
            let results = shapes::image_details(&state.db, found).await?;
            (StatusCode::OK, serde_json::to_value(QueryResponse::new(mode, results, Vec::new()))?)
        }
        ImageRequest::Names { lab, names } => {
            let found = lookup::images_by_name(&state.db, &lab, &names).await?;
            let results = shapes::image_details(&state.db, found).await?;
            (StatusCode::OK, serde_json::to_value(QueryResponse::new(mode, results, Vec::new()))?)
        }
        ImageRequest::NamesCreated {
            lab,
            names,
            created,
            force_match,
            metadata,
        } => {
            let batch = CaptureBatch {
                lab,
                names,
                created,
                force_match,
                metadata,
            };
            let outcome = state.reconciler.reconcile(&batch).await?;
            state.cache.invalidate().await;
            let results = shapes::image_details(&state.db, outcome.images).await?;
            let status = if outcome.created > 0 {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, serde_json::to_value(QueryResponse::new(mode, results, outcome.warnings))?)
        }
    };

    if let Some(key) = key {
        state.cache.insert(key, body.clone(), generation).await;
    }
    Ok((status, Json(body)).into_response())
}

/// GET /api/images/query
pub async fn query_images(
    State(state): State<AppState>,
    query: Result<Query<ImageQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;
    run_query(&state, query).await
}

/// POST /api/images and POST /api/images/query
pub async fn post_image_query(
    State(state): State<AppState>,
    QueryBody(query): QueryBody,
) -> ApiResult<Response> {
    info!(
        lab = query.lab.as_deref().unwrap_or(""),
        "Image query received"
    );
    run_query(&state, query).await
}

/// GET /api/images?page=N
pub async fn list_images(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(page) = query?;
    let generation = state.cache.generation();
    let total = images::count(&state.db).await?;
    let pagination = calculate_pagination(total, page.page);

    let key = format!("images/list/{}", pagination.page);
    if let Some(body) = state.cache.get(&key).await {
        return Ok(Json(body));
    }

    let results: Vec<ImageListItem> = images::list_page(&state.db, pagination)
        .await?
        .into_iter()
        .map(ImageListItem::from)
        .collect();
    let body = serde_json::to_value(Page::new(total, pagination, results))?;
    state.cache.insert(key, body.clone(), generation).await;
    Ok(Json(body))
}

/// GET /api/images/:id
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<shapes::ImageDetail>> {
    let image = images::get(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("image {} does not exist", id)))?;
    Ok(Json(shapes::image_detail(&state.db, image).await?))
}

/// PUT /api/images/:id
pub async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<NewImage>, JsonRejection>,
) -> ApiResult<Json<shapes::ImageDetail>> {
    let Json(new) = payload?;
    let image = images::update(&state.db, id, &new).await?;
    state.cache.invalidate().await;
    Ok(Json(shapes::image_detail(&state.db, image).await?))
}

/// DELETE /api/images/:id
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    images::delete(&state.db, id).await?;
    state.cache.invalidate().await;
    info!(image_id = id, "Image deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub fn image_routes() -> Router<AppState> {
    Router::new()
        .route("/api/images", get(list_images).post(post_image_query))
        .route("/api/images/query", get(query_images).post(post_image_query))
        .route(
            "/api/images/:id",
            get(get_image).put(update_image).delete(delete_image),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_only_read_queries_are_cacheable() {
        let quick = ImageRequest::Quick { lab: "bec1".into() };
        assert_eq!(cache_key(&quick).as_deref(), Some("images/quick/bec1"));

        let create = ImageRequest::NamesCreated {
            lab: "bec1".into(),
            names: vec!["a".into()],
            created: vec![Utc::now()],
            force_match: false,
            metadata: Default::default(),
        };
        assert!(cache_key(&create).is_none());
    }
}
