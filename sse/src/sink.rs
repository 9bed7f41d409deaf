//! Output sinks: the ordered, asynchronous byte destinations that encoded
//! frames are written to.
//!
//! The connection writer issues at most one `write` at a time and awaits
//! its completion before starting the next, so any sink (or transform
//! wrapping another sink) always observes whole frames in logical order
//! and never has to deal with interleaving.

use async_trait::async_trait;
use bytes::Bytes;
use flate2::{Compress, Compression, FlushCompress};
use tokio::sync::mpsc;

use crate::error::SinkError;

/// An ordered, asynchronous byte-stream destination for encoded frames.
#[async_trait]
pub trait OutputSink: Send {
    /// Write one encoded frame. Resolves once the sink has accepted the
    /// bytes; errors once the other end is gone or the transport fails.
    async fn write(&mut self, bytes: Bytes) -> Result<(), SinkError>;

    /// Whether the other end of the sink is still attached.
    fn is_open(&self) -> bool;
}

/// Sink backed by a bounded channel whose receiving half feeds the HTTP
/// response body stream.
///
/// `write` completes when the channel accepts the frame; the bounded
/// capacity is what back-pressure feels like from the writer's side. Once
/// the HTTP layer drops the body (peer disconnected, response cancelled)
/// the receiver is gone and every subsequent or waiting write fails
/// immediately, which is how transport loss reaches the connection in
/// bounded time.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    async fn write(&mut self, bytes: Bytes) -> Result<(), SinkError> {
        self.tx.send(bytes).await.map_err(|_| SinkError::closed())
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Deflate transform around another sink.
///
/// One zlib stream spans the connection's whole lifetime. Every frame is
/// compressed and sync-flushed, so the client can decode each write as it
/// arrives instead of only at end of stream. The transform knows nothing
/// about frame boundaries beyond "one write, one flush"; ordering is
/// inherited from the writer's one-write-in-flight discipline.
pub struct DeflateSink<S> {
    inner: S,
    compress: Compress,
}

impl<S: OutputSink> DeflateSink<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            compress: Compress::new(Compression::fast(), true),
        }
    }

    fn compress_frame(&mut self, bytes: &[u8]) -> Result<Bytes, SinkError> {
        let mut out = Vec::with_capacity(bytes.len() / 2 + 64);
        let start = self.compress.total_in();
        loop {
            let consumed = (self.compress.total_in() - start) as usize;
            if out.len() == out.capacity() {
                out.reserve(bytes.len() / 2 + 64);
            }
            self.compress
                .compress_vec(&bytes[consumed..], &mut out, FlushCompress::Sync)
                .map_err(SinkError::io)?;
            let consumed = (self.compress.total_in() - start) as usize;
            // The sync flush is complete once all input is taken and deflate
            // stopped short of filling the output buffer.
            if consumed == bytes.len() && out.len() < out.capacity() {
                return Ok(Bytes::from(out));
            }
        }
    }
}

#[async_trait]
impl<S: OutputSink> OutputSink for DeflateSink<S> {
    async fn write(&mut self, bytes: Bytes) -> Result<(), SinkError> {
        let compressed = self.compress_frame(&bytes)?;
        self.inner.write(compressed).await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Decompress, FlushDecompress};

    fn channel_sink(capacity: usize) -> (ChannelSink, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelSink::new(tx), rx)
    }

    /// Inflate one sync-flushed chunk of a longer zlib stream.
    fn inflate(decompress: &mut Decompress, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len() * 4 + 64);
        let start = decompress.total_in();
        loop {
            let consumed = (decompress.total_in() - start) as usize;
            if out.len() == out.capacity() {
                out.reserve(1024);
            }
            decompress
                .decompress_vec(&input[consumed..], &mut out, FlushDecompress::Sync)
                .expect("valid deflate chunk");
            let consumed = (decompress.total_in() - start) as usize;
            if consumed == input.len() && out.len() < out.capacity() {
                return out;
            }
        }
    }

    #[tokio::test]
    async fn test_channel_sink_delivers_writes_in_order() {
        let (mut sink, mut rx) = channel_sink(4);
        sink.write(Bytes::from_static(b"one")).await.expect("open");
        sink.write(Bytes::from_static(b"two")).await.expect("open");
        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"one")));
        assert_eq!(rx.recv().await, Some(Bytes::from_static(b"two")));
    }

    #[tokio::test]
    async fn test_channel_sink_fails_once_receiver_dropped() {
        let (mut sink, rx) = channel_sink(4);
        assert!(sink.is_open());
        drop(rx);
        assert!(!sink.is_open());
        let err = sink
            .write(Bytes::from_static(b"late"))
            .await
            .expect_err("receiver is gone");
        assert_eq!(err.kind, crate::error::SinkErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_deflate_sink_decodes_progressively_per_write() {
        // Scenario: a compression transform sits between the connection and
        // the wire; each frame must be decodable as soon as its write lands.
        let (inner, mut rx) = channel_sink(4);
        let mut sink = DeflateSink::new(inner);
        let mut decompress = Decompress::new(true);

        sink.write(Bytes::from_static(b"data:msg 1\n\n"))
            .await
            .expect("open");
        let chunk = rx.recv().await.expect("first compressed write");
        assert_eq!(inflate(&mut decompress, &chunk), b"data:msg 1\n\n");

        sink.write(Bytes::from_static(b"data:msg 2\n\n"))
            .await
            .expect("open");
        let chunk = rx.recv().await.expect("second compressed write");
        assert_eq!(inflate(&mut decompress, &chunk), b"data:msg 2\n\n");
    }

    #[tokio::test]
    async fn test_deflate_sink_round_trips_large_frame() {
        let (inner, mut rx) = channel_sink(4);
        let mut sink = DeflateSink::new(inner);
        let mut decompress = Decompress::new(true);

        let payload = format!("data:{}\n\n", "hello world ".repeat(10_000));
        sink.write(Bytes::from(payload.clone())).await.expect("open");
        let chunk = rx.recv().await.expect("compressed write");
        assert_eq!(inflate(&mut decompress, &chunk), payload.as_bytes());
    }

    #[tokio::test]
    async fn test_deflate_sink_reports_inner_closure() {
        let (inner, rx) = channel_sink(4);
        let mut sink = DeflateSink::new(inner);
        drop(rx);
        assert!(!sink.is_open());
        assert!(sink.write(Bytes::from_static(b"data:x\n\n")).await.is_err());
    }
}
