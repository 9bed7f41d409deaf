//! HTTP routing layer for the event-stream server.
//!
//! Controllers stay thin: the SSE endpoint hands the request straight to
//! `sse::SseHandler`, the broadcast endpoint to the connection registry.
//! Everything long-lived happens inside the `sse` crate.

pub mod controller;
pub mod error;
pub mod router;

pub use router::define_routes;
