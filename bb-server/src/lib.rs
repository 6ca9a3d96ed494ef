//! bb-server library - lab data catalog service
//!
//! Catalogs runs and images of a cold-atom experiment, reconciles uploaded
//! images with the runs they were taken during, and serves the catalog
//! over HTTP.

use axum::Router;
use bb_common::events::EventBus;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod locks;
pub mod lookup;
pub mod notify;
pub mod pagination;
pub mod query;
pub mod reconcile;

pub use error::{ApiError, ApiResult};

use cache::ListCache;
use notify::Notifier;
use reconcile::Reconciler;

/// Default capacity of the event bus
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// In-process event bus feeding `/events`
    pub event_bus: EventBus,
    pub reconciler: Arc<Reconciler>,
    pub cache: Arc<ListCache>,
    /// Service start, for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        notifier: Arc<dyn Notifier>,
        tolerance: Duration,
        cache_ttl: Duration,
    ) -> bb_common::Result<Self> {
        let reconciler = Reconciler::new(db.clone(), notifier, tolerance)?;
        Ok(Self {
            db,
            event_bus,
            reconciler: Arc::new(reconciler),
            cache: Arc::new(ListCache::new(cache_ttl)),
            startup_time: Utc::now(),
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::event_routes())
        .merge(api::image_routes())
        .merge(api::run_routes())
        .merge(api::lab_routes())
        .merge(api::project_routes())
        .merge(api::dataset_routes())
        .merge(api::camera_routes())
        .merge(api::profile_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
