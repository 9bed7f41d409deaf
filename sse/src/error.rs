//! Error types for the `sse` crate.
//!
//! Errors are modeled as a struct holding an error-kind enum, with the
//! original cause (if any) carried in a `source` field. Delivery failures
//! never escape `send` itself; they surface only through the submitting
//! frame's [`DeliveryReceipt`](crate::connection::DeliveryReceipt), and a
//! failed connection affects nothing beyond itself.

use std::error::Error as StdError;
use std::fmt;

use crate::frame::SseFrame;

/// Error reported by an [`OutputSink`](crate::sink::OutputSink) write.
#[derive(Debug)]
pub struct SinkError {
    pub kind: SinkErrorKind,
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

/// The kinds of failure a sink can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorKind {
    /// The receiving side is gone: the peer disconnected or the response
    /// body was dropped by the HTTP layer.
    Closed,
    /// The transport or an interposed transform reported an I/O error.
    Io,
}

impl SinkError {
    pub fn closed() -> Self {
        Self {
            kind: SinkErrorKind::Closed,
            source: None,
        }
    }

    pub fn io(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind: SinkErrorKind::Io,
            source: Some(source.into()),
        }
    }

    /// A sourceless copy of this error's kind, used when one write failure
    /// has to be reported against every frame still queued behind it.
    pub(crate) fn same_kind(&self) -> Self {
        Self {
            kind: self.kind,
            source: None,
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.source) {
            (SinkErrorKind::Closed, _) => write!(f, "sink closed"),
            (SinkErrorKind::Io, Some(source)) => write!(f, "sink write failed: {source}"),
            (SinkErrorKind::Io, None) => write!(f, "sink write failed"),
        }
    }
}

impl StdError for SinkError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Why a submitted frame was not delivered.
#[derive(Debug)]
pub enum DeliveryErrorKind {
    /// The connection was closed (or closing) before this frame reached
    /// the wire.
    ConnectionClosed,
    /// The sink failed while this frame (or an earlier one) was being
    /// written.
    WriteFailure(SinkError),
    /// The connection's pending-frame bound was reached; the frame was
    /// never queued.
    QueueFull,
}

/// A frame that could not be delivered, resolved through its
/// [`DeliveryReceipt`](crate::connection::DeliveryReceipt).
///
/// Carries the frame back exactly as it was submitted so the caller can
/// log, retry elsewhere, or drop it.
#[derive(Debug)]
pub struct DeliveryError {
    pub frame: SseFrame,
    pub kind: DeliveryErrorKind,
}

impl DeliveryError {
    pub(crate) fn new(frame: SseFrame, kind: DeliveryErrorKind) -> Self {
        Self { frame, kind }
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DeliveryErrorKind::ConnectionClosed => write!(f, "connection closed"),
            DeliveryErrorKind::WriteFailure(err) => write!(f, "frame write failed: {err}"),
            DeliveryErrorKind::QueueFull => write!(f, "connection send queue is full"),
        }
    }
}

impl StdError for DeliveryError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            DeliveryErrorKind::WriteFailure(err) => Some(err),
            _ => None,
        }
    }
}

/// The request could not be served as an event stream; the caller keeps
/// ownership of the exchange and decides the fallback.
#[derive(Debug)]
pub struct UpgradeError {
    /// The `Accept` header value that ruled out `text/event-stream`.
    pub accept: String,
}

impl UpgradeError {
    pub(crate) fn new(accept: impl Into<String>) -> Self {
        Self {
            accept: accept.into(),
        }
    }
}

impl fmt::Display for UpgradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request does not accept text/event-stream (accept: {})",
            self.accept
        )
    }
}

impl StdError for UpgradeError {}
