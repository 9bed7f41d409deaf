use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use log::*;
use service::AppState;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::controller::{
    broadcast_controller, event_stream_controller, health_check_controller,
};

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check_controller::health_check))
        .route("/events", get(event_stream_controller::stream))
        .route("/broadcast", post(broadcast_controller::broadcast))
        .layer(cors_layer(&app_state))
        .with_state(app_state)
}

fn cors_layer(app_state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring malformed CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
