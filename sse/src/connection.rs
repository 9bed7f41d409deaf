//! Per-connection event delivery.
//!
//! Every accepted stream gets one [`SseConnection`] handle and one writer
//! task that exclusively owns the sink. Producers never touch the sink:
//! `send` appends to the connection's FIFO queue and returns immediately,
//! and the writer task transmits exactly one frame at a time, resolving
//! each frame's [`DeliveryReceipt`] in submission order. A failed or slow
//! connection holds no lock any other connection can contend on.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::*;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

use crate::error::{DeliveryError, DeliveryErrorKind, SinkError};
use crate::frame::{self, SseFrame};
use crate::sink::OutputSink;

/// Unique identifier for a connection (server-generated).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tuning knobs for a connection's writer task.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Emit a comment frame after this long with nothing to write. Keeps
    /// idle streams alive through proxies and surfaces peer loss on
    /// connections that would otherwise never write. `None` disables.
    pub keep_alive: Option<Duration>,
    /// Bound on frames queued behind the in-flight write; submissions over
    /// the bound resolve with `QueueFull` instead of queueing. `None`
    /// (the default) leaves the queue unbounded.
    pub max_pending: Option<usize>,
}

// Connection state, monotonic: Open -> Closing -> Closed.
const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

struct Shared {
    id: ConnectionId,
    last_event_id: Option<String>,
    state: AtomicU8,
    pending: AtomicUsize,
    max_pending: Option<usize>,
    close: Notify,
}

struct QueuedFrame {
    frame: SseFrame,
    ack: oneshot::Sender<Result<SseFrame, DeliveryError>>,
}

impl QueuedFrame {
    // The ack may be unobserved when the caller dropped its receipt; a
    // fire-and-forget send is allowed to ignore its outcome.
    fn fail(self, kind: DeliveryErrorKind) {
        let QueuedFrame { frame, ack } = self;
        let _ = ack.send(Err(DeliveryError::new(frame, kind)));
    }
}

/// Single-shot completion handle for one submitted frame.
///
/// Resolves exactly once: the frame itself on successful transmission, a
/// [`DeliveryError`] carrying it back otherwise. Dropping the receipt makes
/// the send fire-and-forget; delivery still proceeds.
#[derive(Debug)]
pub struct DeliveryReceipt {
    rx: oneshot::Receiver<Result<SseFrame, DeliveryError>>,
}

impl DeliveryReceipt {
    /// Wait for the frame's outcome.
    pub async fn wait(self) -> Result<SseFrame, DeliveryError> {
        self.rx.await.unwrap_or_else(|_| {
            // The writer task resolves every queued frame before exiting;
            // a dropped ack can only mean the task was torn down abruptly.
            Err(DeliveryError::new(
                SseFrame::default(),
                DeliveryErrorKind::ConnectionClosed,
            ))
        })
    }
}

/// Handle to one client's event stream.
///
/// Cloning is cheap; all clones refer to the same connection. `send` is
/// safe from any number of concurrent producers and never blocks.
#[derive(Clone)]
pub struct SseConnection {
    shared: Arc<Shared>,
    queue: mpsc::UnboundedSender<QueuedFrame>,
}

impl SseConnection {
    /// Bind a new connection to `sink` and spawn its writer task.
    ///
    /// The writer task owns the sink for the connection's lifetime and
    /// drops it on exit, which ends the HTTP response body. The returned
    /// join handle completes when that happens.
    pub fn open<S>(
        sink: S,
        last_event_id: Option<String>,
        config: ConnectionConfig,
    ) -> (Self, JoinHandle<()>)
    where
        S: OutputSink + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            id: ConnectionId::new(),
            last_event_id,
            state: AtomicU8::new(STATE_OPEN),
            pending: AtomicUsize::new(0),
            max_pending: config.max_pending,
            close: Notify::new(),
        });
        let task = tokio::spawn(writer_task(
            Arc::clone(&shared),
            rx,
            sink,
            config.keep_alive,
        ));
        (Self { shared, queue: tx }, task)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.shared.id
    }

    /// The `Last-Event-ID` the client presented at connect time, if any.
    pub fn last_event_id(&self) -> Option<&str> {
        self.shared.last_event_id.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.load(Ordering::Acquire) == STATE_OPEN
    }

    /// Queue `data` for delivery. Never blocks; the outcome arrives through
    /// the returned receipt.
    pub fn send(&self, data: impl Into<String>) -> DeliveryReceipt {
        self.send_frame(SseFrame::new(data))
    }

    /// Queue a fully specified frame for delivery.
    ///
    /// Frames are transmitted strictly in submission order and every
    /// submission resolves its receipt exactly once; a frame is never
    /// silently dropped.
    pub fn send_frame(&self, frame: SseFrame) -> DeliveryReceipt {
        let (ack, rx) = oneshot::channel();
        let receipt = DeliveryReceipt { rx };
        let queued = QueuedFrame { frame, ack };

        if self.shared.state.load(Ordering::Acquire) != STATE_OPEN {
            queued.fail(DeliveryErrorKind::ConnectionClosed);
            return receipt;
        }

        if let Some(limit) = self.shared.max_pending {
            let prev = self.shared.pending.fetch_add(1, Ordering::AcqRel);
            if prev >= limit {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                queued.fail(DeliveryErrorKind::QueueFull);
                return receipt;
            }
        } else {
            self.shared.pending.fetch_add(1, Ordering::AcqRel);
        }

        if let Err(rejected) = self.queue.send(queued) {
            // Writer task already gone; a send that raced the close still
            // gets its resolution here.
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            rejected.0.fail(DeliveryErrorKind::ConnectionClosed);
        }
        receipt
    }

    /// Begin closing the connection. Idempotent.
    ///
    /// An in-flight write is allowed to finish (success or failure); every
    /// frame still queued behind it resolves with `ConnectionClosed`, in
    /// order, and the sink is released.
    pub fn close(&self) {
        if self
            .shared
            .state
            .compare_exchange(
                STATE_OPEN,
                STATE_CLOSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            debug!("closing SSE connection {}", self.shared.id);
            self.shared.close.notify_one();
        }
    }
}

impl fmt::Debug for SseConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SseConnection")
            .field("id", &self.shared.id)
            .field("open", &self.is_open())
            .finish()
    }
}

enum Step {
    Close,
    Frame(QueuedFrame),
    Disconnected,
    KeepAlive,
}

async fn writer_task<S>(
    shared: Arc<Shared>,
    mut queue: mpsc::UnboundedReceiver<QueuedFrame>,
    mut sink: S,
    keep_alive: Option<Duration>,
) where
    S: OutputSink,
{
    let mut keep_alive = keep_alive.map(|period| {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer
    });

    loop {
        let step = tokio::select! {
            biased;
            _ = shared.close.notified() => Step::Close,
            queued = queue.recv() => match queued {
                Some(queued) => Step::Frame(queued),
                None => Step::Disconnected,
            },
            _ = idle_tick(&mut keep_alive) => Step::KeepAlive,
        };

        match step {
            Step::Close | Step::Disconnected => break,
            Step::Frame(queued) => {
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                let QueuedFrame { frame, ack } = queued;
                match sink.write(frame.encode()).await {
                    Ok(()) => {
                        let _ = ack.send(Ok(frame));
                        if let Some(timer) = keep_alive.as_mut() {
                            timer.reset();
                        }
                    }
                    Err(err) => {
                        warn!("write failed on SSE connection {}: {err}", shared.id);
                        let cause = err.same_kind();
                        let _ = ack.send(Err(DeliveryError::new(
                            frame,
                            DeliveryErrorKind::WriteFailure(err),
                        )));
                        drain_failed(&shared, &mut queue, cause);
                        return;
                    }
                }
            }
            Step::KeepAlive => {
                if let Err(err) = sink.write(frame::comment("keep-alive")).await {
                    debug!(
                        "keep-alive write failed on SSE connection {}: {err}",
                        shared.id
                    );
                    drain_failed(&shared, &mut queue, err);
                    return;
                }
            }
        }
    }

    // Orderly close: fail whatever is still queued, then release the sink.
    drain(&shared, &mut queue, |queued| {
        queued.fail(DeliveryErrorKind::ConnectionClosed)
    });
    debug!("SSE connection {} closed", shared.id);
}

/// Drain after a transport failure: every still-queued frame fails with the
/// same kind of sink error that killed the connection.
fn drain_failed(
    shared: &Arc<Shared>,
    queue: &mut mpsc::UnboundedReceiver<QueuedFrame>,
    cause: SinkError,
) {
    drain(shared, queue, |queued| {
        queued.fail(DeliveryErrorKind::WriteFailure(cause.same_kind()))
    });
}

/// Mark the connection closed and resolve every still-queued frame, in
/// order. Closing the queue first guarantees nothing can slip in behind
/// the drain without a resolution of its own.
fn drain<F>(shared: &Arc<Shared>, queue: &mut mpsc::UnboundedReceiver<QueuedFrame>, fail: F)
where
    F: Fn(QueuedFrame),
{
    shared.state.store(STATE_CLOSED, Ordering::Release);
    queue.close();
    while let Ok(queued) = queue.try_recv() {
        shared.pending.fetch_sub(1, Ordering::AcqRel);
        fail(queued);
    }
}

async fn idle_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SinkErrorKind;
    use crate::sink::ChannelSink;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Semaphore;

    /// Sink whose writes block on a gate, with scripted failures, so tests
    /// can hold a write in flight and observe queue behavior around it.
    struct ScriptedSink {
        written: Arc<Mutex<Vec<Bytes>>>,
        failures: Arc<Mutex<VecDeque<bool>>>,
        gate: Arc<Semaphore>,
        entered: Arc<Notify>,
    }

    struct ScriptHandle {
        written: Arc<Mutex<Vec<Bytes>>>,
        failures: Arc<Mutex<VecDeque<bool>>>,
        gate: Arc<Semaphore>,
        entered: Arc<Notify>,
    }

    fn scripted_sink() -> (ScriptedSink, ScriptHandle) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(VecDeque::new()));
        let gate = Arc::new(Semaphore::new(0));
        let entered = Arc::new(Notify::new());
        (
            ScriptedSink {
                written: Arc::clone(&written),
                failures: Arc::clone(&failures),
                gate: Arc::clone(&gate),
                entered: Arc::clone(&entered),
            },
            ScriptHandle {
                written,
                failures,
                gate,
                entered,
            },
        )
    }

    #[async_trait]
    impl OutputSink for ScriptedSink {
        async fn write(&mut self, bytes: Bytes) -> Result<(), SinkError> {
            self.entered.notify_one();
            self.gate
                .acquire()
                .await
                .expect("gate never closed")
                .forget();
            let fail = self
                .failures
                .lock()
                .expect("lock")
                .pop_front()
                .unwrap_or(false);
            if fail {
                return Err(SinkError::closed());
            }
            self.written.lock().expect("lock").push(bytes);
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    fn channel_connection(
        config: ConnectionConfig,
    ) -> (SseConnection, JoinHandle<()>, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(4);
        let (connection, task) = SseConnection::open(ChannelSink::new(tx), None, config);
        (connection, task, rx)
    }

    async fn collect(mut rx: mpsc::Receiver<Bytes>) -> Vec<u8> {
        let mut bytes = Vec::new();
        while let Some(chunk) = rx.recv().await {
            bytes.extend_from_slice(&chunk);
        }
        bytes
    }

    #[tokio::test]
    async fn test_chained_sends_then_close_produce_exact_bytes_then_eof() {
        let (connection, task, rx) = channel_connection(ConnectionConfig::default());
        let collector = tokio::spawn(collect(rx));

        // The second send happens only once the first is confirmed, the
        // close only once the second is; the stream must then end.
        connection.send("msg 1").wait().await.expect("delivered");
        connection.send("msg 2").wait().await.expect("delivered");
        connection.close();

        task.await.expect("writer task completes");
        let bytes = collector.await.expect("stream ends");
        assert_eq!(bytes, b"data:msg 1\n\ndata:msg 2\n\n");
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_frames_written_in_submission_order() {
        let (connection, task, rx) = channel_connection(ConnectionConfig::default());
        let collector = tokio::spawn(collect(rx));

        let receipts: Vec<_> = (0..5).map(|i| connection.send(format!("msg {i}"))).collect();
        for receipt in receipts {
            receipt.wait().await.expect("delivered");
        }
        connection.close();
        task.await.expect("writer task completes");

        let expected: Vec<u8> = (0..5)
            .flat_map(|i| SseFrame::new(format!("msg {i}")).encode().to_vec())
            .collect();
        assert_eq!(collector.await.expect("stream ends"), expected);
    }

    #[tokio::test]
    async fn test_concurrent_producers_keep_per_producer_order() {
        let (connection, task, rx) = channel_connection(ConnectionConfig::default());
        let collector = tokio::spawn(collect(rx));

        let producers: Vec<_> = (0..8)
            .map(|p| {
                let connection = connection.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        connection
                            .send(format!("p{p} n{i}"))
                            .wait()
                            .await
                            .expect("delivered");
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.expect("producer finishes");
        }
        connection.close();
        task.await.expect("writer task completes");

        let bytes = collector.await.expect("stream ends");
        let text = String::from_utf8(bytes).expect("utf8 frames");
        let frames: Vec<&str> = text.split("\n\n").filter(|s| !s.is_empty()).collect();
        assert_eq!(frames.len(), 8 * 25);

        // Within each producer the sequence numbers must appear in order.
        for p in 0..8 {
            let sequence: Vec<usize> = frames
                .iter()
                .filter_map(|f| f.strip_prefix(&format!("data:p{p} n")))
                .map(|n| n.parse().expect("sequence number"))
                .collect();
            assert_eq!(sequence, (0..25).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_close_waits_for_in_flight_write_and_fails_the_queue() {
        let (sink, script) = scripted_sink();
        let (connection, task) = SseConnection::open(sink, None, ConnectionConfig::default());

        let first = connection.send("in flight");
        script.entered.notified().await;
        let second = connection.send("queued");
        let third = connection.send("also queued");

        connection.close();
        assert!(!connection.is_open());
        // The in-flight write is not aborted by close.
        script.gate.add_permits(1);
        assert!(first.wait().await.is_ok());

        for receipt in [second, third] {
            let err = receipt.wait().await.expect_err("failed on close");
            assert!(matches!(err.kind, DeliveryErrorKind::ConnectionClosed));
        }
        task.await.expect("writer task completes");
        assert_eq!(script.written.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn test_write_failure_fails_in_flight_and_drains_with_same_kind() {
        let (sink, script) = scripted_sink();
        script.failures.lock().expect("lock").push_back(true);
        let (connection, task) = SseConnection::open(sink, None, ConnectionConfig::default());

        let first = connection.send("doomed");
        script.entered.notified().await;
        let second = connection.send("queued behind");
        script.gate.add_permits(1);

        let err = first.wait().await.expect_err("write failed");
        match err.kind {
            DeliveryErrorKind::WriteFailure(sink_err) => {
                assert_eq!(sink_err.kind, SinkErrorKind::Closed)
            }
            other => panic!("expected WriteFailure, got {other:?}"),
        }
        assert_eq!(err.frame.data, "doomed");

        let err = second.wait().await.expect_err("drained");
        match err.kind {
            DeliveryErrorKind::WriteFailure(sink_err) => {
                assert_eq!(sink_err.kind, SinkErrorKind::Closed)
            }
            other => panic!("expected WriteFailure, got {other:?}"),
        }

        task.await.expect("writer task completes");
        assert!(!connection.is_open());
        // No write is attempted after a failure.
        assert!(script.written.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_send_after_close_resolves_with_connection_closed() {
        let (connection, task, _rx) = channel_connection(ConnectionConfig::default());
        connection.close();
        task.await.expect("writer task completes");

        let err = connection
            .send("too late")
            .wait()
            .await
            .expect_err("closed");
        assert!(matches!(err.kind, DeliveryErrorKind::ConnectionClosed));
        assert_eq!(err.frame.data, "too late");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (connection, task, _rx) = channel_connection(ConnectionConfig::default());
        connection.close();
        connection.close();
        task.await.expect("writer task completes");
        assert!(!connection.is_open());
    }

    #[tokio::test]
    async fn test_dropped_receipt_still_delivers() {
        let (connection, task, rx) = channel_connection(ConnectionConfig::default());
        let collector = tokio::spawn(collect(rx));

        drop(connection.send("fire and forget"));
        // Confirm via a second, awaited frame that the first went first.
        connection.send("marker").wait().await.expect("delivered");
        connection.close();
        task.await.expect("writer task completes");

        let bytes = collector.await.expect("stream ends");
        assert_eq!(bytes, b"data:fire and forget\n\ndata:marker\n\n");
    }

    #[tokio::test]
    async fn test_queue_bound_rejects_overflow_with_queue_full() {
        let (sink, script) = scripted_sink();
        let config = ConnectionConfig {
            max_pending: Some(2),
            ..ConnectionConfig::default()
        };
        let (connection, task) = SseConnection::open(sink, None, config);

        let in_flight = connection.send("one");
        script.entered.notified().await;
        let queued_a = connection.send("two");
        let queued_b = connection.send("three");
        let overflow = connection.send("four");

        let err = overflow.wait().await.expect_err("queue is full");
        assert!(matches!(err.kind, DeliveryErrorKind::QueueFull));
        assert_eq!(err.frame.data, "four");

        script.gate.add_permits(3);
        assert!(in_flight.wait().await.is_ok());
        assert!(queued_a.wait().await.is_ok());
        assert!(queued_b.wait().await.is_ok());

        connection.close();
        task.await.expect("writer task completes");
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_comment_emitted_when_idle() {
        let (tx, mut rx) = mpsc::channel(4);
        let config = ConnectionConfig {
            keep_alive: Some(Duration::from_secs(15)),
            ..ConnectionConfig::default()
        };
        let (connection, task) = SseConnection::open(ChannelSink::new(tx), None, config);

        // Idle: the next thing on the wire is a comment, not a frame.
        let chunk = rx.recv().await.expect("keep-alive written");
        assert_eq!(chunk, Bytes::from_static(b":keep-alive\n\n"));

        connection
            .send("actual data")
            .wait()
            .await
            .expect("delivered");
        let chunk = rx.recv().await.expect("frame written");
        assert_eq!(chunk, Bytes::from_static(b"data:actual data\n\n"));

        connection.close();
        task.await.expect("writer task completes");
    }

    #[tokio::test]
    async fn test_last_event_id_exposed() {
        let (tx, _rx) = mpsc::channel(4);
        let (connection, task) = SseConnection::open(
            ChannelSink::new(tx),
            Some("evt-17".to_string()),
            ConnectionConfig::default(),
        );
        assert_eq!(connection.last_event_id(), Some("evt-17"));
        connection.close();
        task.await.expect("writer task completes");
    }
}
