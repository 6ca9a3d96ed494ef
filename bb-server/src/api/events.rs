//! Server-Sent Events stream of catalog notifications

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    /// Only stream events of this lab
    #[serde(default)]
    pub lab: Option<String>,
}

/// GET /events[?lab=NAME]
pub async fn event_stream(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let lab = filter.lab.filter(|lab| !lab.trim().is_empty());
    bb_common::sse::create_event_sse_stream(&state.event_bus, lab)
}

pub fn event_routes() -> Router<AppState> {
    Router::new().route("/events", get(event_stream))
}
