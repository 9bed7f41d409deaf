//! Server-Sent Events (SSE) delivery infrastructure.
//!
//! This crate turns application-level "send this event" calls into
//! correctly framed `text/event-stream` bytes on a long-lived HTTP
//! response, surviving slow consumers, transport failure, and pluggable
//! output transforms.
//!
//! # Architecture
//!
//! - **One writer task per connection**: all queue and sink mutation is
//!   confined to a single task, which gives strict FIFO delivery and at
//!   most one outstanding write per connection with no shared locks.
//! - **Single-shot receipts**: every `send` yields a [`DeliveryReceipt`]
//!   that resolves exactly once, with the frame on success or a
//!   [`DeliveryError`] carrying it back on failure. A frame is never
//!   silently dropped.
//! - **Abstract sink**: connections write to an [`OutputSink`], not to the
//!   transport. The production sink feeds the axum response body through a
//!   bounded channel; transforms such as [`DeflateSink`] decorate the same
//!   trait without the connection knowing.
//! - **Independent connections**: a stuck or dead connection affects only
//!   itself; the registry is bookkeeping, not a synchronization point.
//!
//! # Flow
//!
//! 1. The web layer passes an accepted request to [`SseHandler::handle`]
//! 2. The handler switches the response to streaming mode, binds a
//!    [`SseConnection`] to its body, and fires the application's
//!    [`ConnectionCallback`] exactly once with the client's last event id
//! 3. The application calls `send` from any number of producers; frames
//!    reach the wire in submission order
//! 4. Transport failure or `close()` resolves every remaining receipt and
//!    ends the response body
//!
//! # Modules
//!
//! - `frame`: pure wire-format encoding
//! - `sink`: the `OutputSink` trait, channel-backed production sink, and
//!   deflate transform
//! - `connection`: per-connection queue, writer task, and public handle
//! - `handler`: request acceptance and callback dispatch
//! - `registry`: live-connection bookkeeping and broadcast fan-out
//! - `error`: sink, delivery, and upgrade error types

pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod registry;
pub mod sink;

pub use connection::{ConnectionConfig, ConnectionId, DeliveryReceipt, SseConnection};
pub use error::{DeliveryError, DeliveryErrorKind, SinkError, SinkErrorKind, UpgradeError};
pub use frame::SseFrame;
pub use handler::{ConnectionCallback, HandlerConfig, SseHandler};
pub use registry::ConnectionRegistry;
pub use sink::{ChannelSink, DeflateSink, OutputSink};
