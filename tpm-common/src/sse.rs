//! Server-Sent Events (SSE) utilities

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::EventBus;

/// Heartbeat interval for all SSE streams
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Stream the events of one practice to an SSE client
///
/// Sends an initial `ConnectionStatus` event, then every bus event visible to
/// the caller: same practice, and notifications addressed to someone else are
/// withheld. Lagged subscribers skip the dropped events and carry on.
pub fn practice_event_stream(
    bus: &EventBus,
    practice_id: Uuid,
    staff_id: Option<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = bus.subscribe();
    info!(%practice_id, ?staff_id, "New SSE client connected");

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if !event.is_visible_to(practice_id, staff_id) {
                        continue;
                    }
                    match serde_json::to_string(&event) {
                        Ok(data) => {
                            debug!(event_type = event.event_type(), "SSE: forwarding event");
                            yield Ok(Event::default().event(event.event_type()).data(data));
                        }
                        Err(e) => warn!("SSE: failed to serialize event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(%practice_id, skipped, "SSE client lagged, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
