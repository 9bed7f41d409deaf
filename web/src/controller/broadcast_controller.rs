use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use log::*;
use serde::{Deserialize, Serialize};
use service::AppState;
use sse::SseFrame;

#[derive(Debug, Deserialize)]
pub struct BroadcastParams {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BroadcastResponse {
    /// How many connections the frame was queued on.
    pub delivered_to: usize,
}

/// POST a frame to every open connection.
///
/// Delivery is fire-and-forget per connection; the count only says how
/// many open connections the frame was queued on.
pub(crate) async fn broadcast(
    State(app_state): State<AppState>,
    Json(params): Json<BroadcastParams>,
) -> impl IntoResponse {
    let mut frame = SseFrame::new(params.data);
    if let Some(event) = params.event {
        frame = frame.event(event);
    }
    if let Some(id) = params.id {
        frame = frame.id(id);
    }
    if let Some(retry) = params.retry {
        frame = frame.retry(retry);
    }

    let delivered_to = app_state.sse_registry.broadcast(&frame);
    debug!("broadcast queued on {delivered_to} connection(s)");
    (StatusCode::OK, Json(BroadcastResponse { delivered_to }))
}
