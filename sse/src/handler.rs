//! Entry point for new event-stream requests.
//!
//! The HTTP layer hands each accepted request's headers to
//! [`SseHandler::handle`], which switches the response into streaming mode,
//! binds a connection to the response body, and invokes the application's
//! [`ConnectionCallback`] exactly once. Everything after that belongs to
//! the connection and the application.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use log::*;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::connection::{ConnectionConfig, SseConnection};
use crate::error::UpgradeError;
use crate::registry::ConnectionRegistry;
use crate::sink::{ChannelSink, DeflateSink};

/// Application hook invoked once per accepted event stream.
#[async_trait]
pub trait ConnectionCallback: Send + Sync {
    /// Called with the new connection and the client's `Last-Event-ID`
    /// header value, if it sent one. Runs on its own task; it may hold the
    /// connection for as long as it likes.
    async fn connected(&self, connection: SseConnection, last_event_id: Option<String>);
}

/// Handler-level tuning, applied to every connection it accepts.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub connection: ConnectionConfig,
    /// Capacity of the frame channel between a connection's writer task and
    /// the response body; this is how much the transport may buffer before
    /// writes start waiting.
    pub write_buffer: usize,
    /// Offer the deflate output transform to clients that advertise it.
    pub deflate: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            write_buffer: 4,
            deflate: true,
        }
    }
}

/// Accepts streaming requests and hands connections to the application.
pub struct SseHandler {
    callback: Arc<dyn ConnectionCallback>,
    registry: Arc<ConnectionRegistry>,
    config: HandlerConfig,
}

impl SseHandler {
    pub fn new(
        callback: Arc<dyn ConnectionCallback>,
        registry: Arc<ConnectionRegistry>,
        config: HandlerConfig,
    ) -> Self {
        Self {
            callback,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Accept one event-stream request.
    ///
    /// On success the returned response owns the stream: status 200,
    /// `text/event-stream`, body fed by the connection's writer task until
    /// the connection closes. On an `Err` the callback has NOT been
    /// invoked and the caller decides what to answer instead.
    pub fn handle(&self, headers: &HeaderMap) -> Result<Response, UpgradeError> {
        if !accepts_event_stream(headers) {
            let accept = header_str(headers, header::ACCEPT).unwrap_or_default();
            return Err(UpgradeError::new(accept));
        }

        let last_event_id = header_str(headers, "last-event-id").map(str::to_owned);
        let deflate = self.config.deflate && accepts_deflate(headers);

        let (tx, rx) = mpsc::channel::<Bytes>(self.config.write_buffer);
        let (connection, writer) = if deflate {
            SseConnection::open(
                DeflateSink::new(ChannelSink::new(tx)),
                last_event_id.clone(),
                self.config.connection.clone(),
            )
        } else {
            SseConnection::open(
                ChannelSink::new(tx),
                last_event_id.clone(),
                self.config.connection.clone(),
            )
        };

        debug!(
            "accepted SSE connection {} (deflate: {deflate}, last event id: {last_event_id:?})",
            connection.id()
        );
        self.registry.register(connection.clone());

        // Unregister once the writer task has released the sink.
        let registry = Arc::clone(&self.registry);
        let connection_id = connection.id().clone();
        tokio::spawn(async move {
            let _ = writer.await;
            registry.unregister(&connection_id);
        });

        // Exactly one connected() per accepted stream, on its own task so a
        // long-lived callback never delays the response headers.
        let callback = Arc::clone(&self.callback);
        let handed_off = connection.clone();
        tokio::spawn(async move {
            callback.connected(handed_off, last_event_id).await;
        });

        let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
        let mut response_headers = HeaderMap::new();
        response_headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream; charset=utf-8"),
        );
        response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if deflate {
            response_headers.insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static("deflate"),
            );
        }
        Ok((StatusCode::OK, response_headers, Body::from_stream(stream)).into_response())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// A missing `Accept` header admits everything; otherwise at least one
/// listed media range has to admit `text/event-stream`.
fn accepts_event_stream(headers: &HeaderMap) -> bool {
    match header_str(headers, header::ACCEPT) {
        None => true,
        Some(accept) => accept.split(',').any(|range| {
            let mime = range.split(';').next().unwrap_or("").trim();
            mime.eq_ignore_ascii_case("text/event-stream")
                || mime == "*/*"
                || mime.eq_ignore_ascii_case("text/*")
        }),
    }
}

fn accepts_deflate(headers: &HeaderMap) -> bool {
    match header_str(headers, header::ACCEPT_ENCODING) {
        None => false,
        Some(encodings) => encodings.split(',').any(|coding| {
            let token = coding.split(';').next().unwrap_or("").trim();
            token.eq_ignore_ascii_case("deflate")
        }),
    }
}
