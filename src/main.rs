use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use service::{config::Config, logging::Logger, AppState};
use sse::{ConnectionCallback, ConnectionRegistry, SseConnection, SseFrame, SseHandler};

/// Application hook for new event streams: log the connect and greet the
/// client so it learns its connection id. Everything else arrives via the
/// broadcast endpoint.
struct Greeter;

#[async_trait]
impl ConnectionCallback for Greeter {
    async fn connected(&self, connection: SseConnection, last_event_id: Option<String>) {
        info!(
            "client connected: {} (last event id: {:?})",
            connection.id(),
            last_event_id
        );

        let greeting =
            SseFrame::new(format!("connected as {}", connection.id())).event("greeting");
        if let Err(err) = connection.send_frame(greeting).wait().await {
            warn!("greeting not delivered: {err}");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env_and_args();
    Logger::init_logger(config.log_level_filter);

    let registry = Arc::new(ConnectionRegistry::new());
    let handler = Arc::new(SseHandler::new(
        Arc::new(Greeter),
        Arc::clone(&registry),
        config.sse_handler_config(),
    ));
    let app_state = AppState::new(config, handler, registry);

    let addr = app_state.config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {addr}: {err}"));
    info!("Server starting... listening on {addr}");

    if let Err(err) = axum::serve(listener, web::define_routes(app_state)).await {
        error!("server exited with error: {err}");
    }
}
