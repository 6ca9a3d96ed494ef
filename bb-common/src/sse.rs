//! Server-Sent Events (SSE) utilities
//!
//! Streams [`BreadboardEvent`]s from an [`EventBus`] to an HTTP client,
//! optionally restricted to one lab.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::events::EventBus;

/// Create an SSE stream of bus events
///
/// The stream opens with a `ConnectionStatus` event. Events for other labs
/// are skipped when `lab` is set. A lagging client loses the overflowed
/// events but stays connected.
pub fn create_event_sse_stream(
    bus: &EventBus,
    lab: Option<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(
        "New SSE client connected (lab filter: {})",
        lab.as_deref().unwrap_or("none")
    );
    let mut rx = bus.subscribe();

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(filter) = &lab {
                        if event.lab() != filter {
                            continue;
                        }
                    }
                    match serde_json::to_string(&event) {
                        Ok(data) => {
                            debug!("SSE: sending {} event", event.event_type());
                            yield Ok(Event::default().event(event.event_type()).data(data));
                        }
                        Err(e) => warn!("SSE: failed to serialize event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE: client lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
