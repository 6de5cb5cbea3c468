//! Server-Sent Events stream of session changes.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

use crate::state::{AppState, ChangeEvent};

#[derive(Debug, Serialize, PartialEq, Eq)]
struct SsePayload {
    #[serde(rename = "type")]
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    transcript_len: Option<usize>,
}

impl From<&ChangeEvent> for SsePayload {
    fn from(event: &ChangeEvent) -> Self {
        let (event_type, transcript_len) = match event {
            ChangeEvent::SessionStarted => ("session_started", None),
            ChangeEvent::StateChanged => ("state_changed", None),
            ChangeEvent::TranscriptAppended { len } => ("transcript_appended", Some(*len)),
            ChangeEvent::GateChanged => ("gate_changed", None),
        };
        SsePayload {
            event_type,
            transcript_len,
        }
    }
}

/// Sent once per connection so a client can tell whether it missed a
/// session replacement while disconnected.
#[derive(Debug, Serialize, PartialEq, Eq)]
struct ConnectedPayload {
    generation: u64,
    has_session: bool,
}

/// SSE endpoint handler.
pub async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.event_tx.subscribe();
    let connected = {
        let slot = state.slot.lock().await;
        ConnectedPayload {
            generation: slot.generation,
            has_session: slot.session.is_some(),
        }
    };
    let connected = serde_json::to_string(&connected).unwrap_or_else(|_| "{}".to_string());

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data(connected));

        loop {
            match rx.recv().await {
                Ok(change_event) => {
                    let payload = SsePayload::from(&change_event);
                    if let Ok(json) = serde_json::to_string(&payload) {
                        yield Ok(Event::default().event("change").data(json));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "SSE client lagged, some events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    break;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
