use std::sync::Arc;

use sse::{ConnectionRegistry, SseHandler};

pub mod config;
pub mod logging;

pub use config::Config;

// Service-level state containing only infrastructure concerns.
// Needs to implement Clone to be able to be passed into Router as State.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sse_handler: Arc<SseHandler>,
    pub sse_registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(
        config: Config,
        sse_handler: Arc<SseHandler>,
        sse_registry: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            config,
            sse_handler,
            sse_registry,
        }
    }
}
