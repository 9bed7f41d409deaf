use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use log::*;
use service::AppState;

use crate::error::Error;

/// GET handler that establishes a long-lived `text/event-stream` response.
///
/// All headers travel along so the SSE handler can negotiate the output
/// encoding and pick up the client's `Last-Event-ID`. A request that does
/// not accept an event stream falls back to a plain 406.
pub(crate) async fn stream(
    State(app_state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    match app_state.sse_handler.handle(&headers) {
        Ok(response) => response,
        Err(err) => {
            debug!("rejecting event-stream request: {err}");
            Error::from(err).into_response()
        }
    }
}
