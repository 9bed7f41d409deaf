//! Wire-frame construction and encoding for the `text/event-stream` format.
//!
//! Encoding is a pure function of the frame: no state, no escaping, UTF-8
//! bytes out. One encoded frame is always terminated by exactly one blank
//! line.

use bytes::{BufMut, Bytes, BytesMut};

/// One server-sent event as submitted by the application.
///
/// `data` may span multiple lines; each line becomes its own `data:` field
/// on the wire. `event`, `id` and `retry` are the optional SSE fields of
/// the same names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    pub data: String,
    pub event: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl SseFrame {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            event: None,
            id: None,
            retry: None,
        }
    }

    /// Serialize a JSON payload into the data field of a typed event.
    pub fn json(
        event: impl Into<String>,
        payload: &serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::to_string(payload)?).event(event))
    }

    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Reconnection delay hint for the client, in milliseconds.
    pub fn retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// Encode this frame as wire bytes.
    ///
    /// Field order is `event`, `id`, `retry`, then one `data:` line per
    /// non-empty line of `data` (split on `\n`, a trailing `\r` stripped
    /// from each line). A `data` with no non-empty lines still yields one
    /// empty `data:` line, so every frame carries at least one field.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 64);

        if let Some(event) = &self.event {
            buf.put_slice(b"event:");
            buf.put_slice(event.as_bytes());
            buf.put_u8(b'\n');
        }
        if let Some(id) = &self.id {
            buf.put_slice(b"id:");
            buf.put_slice(id.as_bytes());
            buf.put_u8(b'\n');
        }
        if let Some(retry) = self.retry {
            buf.put_slice(b"retry:");
            buf.put_slice(retry.to_string().as_bytes());
            buf.put_u8(b'\n');
        }

        let mut wrote_data = false;
        for line in self.data.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            buf.put_slice(b"data:");
            buf.put_slice(line.as_bytes());
            buf.put_u8(b'\n');
            wrote_data = true;
        }
        if !wrote_data {
            buf.put_slice(b"data:\n");
        }

        buf.put_u8(b'\n');
        buf.freeze()
    }
}

/// Encode a comment frame (`: <text>`). Clients ignore comments; they exist
/// to keep idle connections alive and to surface transport loss early.
pub fn comment(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 3);
    buf.put_u8(b':');
    buf.put_slice(text.as_bytes());
    buf.put_slice(b"\n\n");
    buf.freeze()
}
