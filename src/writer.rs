//! Dedicated writer task for outbound payloads.
//!
//! Session operations never await the transport. They queue payloads on an
//! mpsc channel and a single task owns the [`PayloadSink`] and writes them in
//! order.
//!
//! # Architecture
//!
//! ```text
//! send/subscribe ─┐
//! pinger         ─┼─► mpsc::Sender<OutboundPayload> ─► Writer Task ─► Transport
//! disconnect     ─┘
//! ```
//!
//! A [`OutboundPayload::Close`] marker flushes everything queued before it,
//! closes the transport and ends the task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LockstreamError, Result};
use crate::transport::PayloadSink;

/// Default maximum queued payloads before `try_send` refuses.
pub const DEFAULT_MAX_PENDING_PAYLOADS: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum payloads drained per wakeup.
const MAX_BATCH_SIZE: usize = 64;

/// An item queued for the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    /// One transport write.
    Data(String),
    /// Close the transport after everything queued so far.
    Close,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum queued payloads before `try_send` refuses.
    pub max_pending_payloads: usize,
    /// Channel capacity for the payload queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_payloads: DEFAULT_MAX_PENDING_PAYLOADS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing payloads to the writer task.
///
/// This is cheaply cloneable and can be shared across tasks.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundPayload>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<OutboundPayload>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Queue one payload without waiting.
    ///
    /// Returns `Err(QueueFull)` at capacity and `Err(ConnectionClosed)` once
    /// the writer task has stopped.
    pub fn try_send(&self, payload: impl Into<String>) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(LockstreamError::QueueFull);
        }
        self.enqueue(OutboundPayload::Data(payload.into()))
    }

    /// Queue several payloads that must be written back to back.
    ///
    /// The capacity check covers the whole group so a fragmented frame is
    /// never queued partially because of backpressure.
    pub fn try_send_all<'a, I>(&self, payloads: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
        I::IntoIter: ExactSizeIterator,
    {
        let payloads = payloads.into_iter();
        if self.pending.load(Ordering::Acquire) + payloads.len() > self.max_pending {
            return Err(LockstreamError::QueueFull);
        }
        for payload in payloads {
            self.enqueue(OutboundPayload::Data(payload.to_string()))?;
        }
        Ok(())
    }

    /// Ask the writer to close the transport after pending writes.
    ///
    /// Capacity limits do not apply.
    pub fn close(&self) -> Result<()> {
        self.enqueue(OutboundPayload::Close)
    }

    fn enqueue(&self, payload: OutboundPayload) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(payload).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => LockstreamError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => LockstreamError::ConnectionClosed,
            }
        })
    }

    /// Check if the queue is at capacity.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending payload count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for queueing payloads.
///
/// The JoinHandle resolves when the task ends: `Ok(())` after a
/// [`OutboundPayload::Close`] or once every handle is dropped, `Err` on the
/// first failed write.
pub fn spawn_writer_task(
    sink: Box<dyn PayloadSink>,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>) {
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_payloads);
    let task = tokio::spawn(writer_loop(rx, sink, pending));

    (handle, task)
}

/// Main writer loop - receives payloads and writes them to the transport.
async fn writer_loop(
    mut rx: mpsc::Receiver<OutboundPayload>,
    mut sink: Box<dyn PayloadSink>,
    pending: Arc<AtomicUsize>,
) -> Result<()> {
    loop {
        let first = match rx.recv().await {
            Some(p) => p,
            None => {
                // Every handle dropped, clean shutdown
                let _ = sink.close().await;
                return Ok(());
            }
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(payload) => batch.push(payload),
                Err(_) => break,
            }
        }

        let batch_size = batch.len();
        for payload in batch {
            match payload {
                OutboundPayload::Data(data) => {
                    if let Err(e) = sink.send(&data).await {
                        tracing::debug!("Transport write failed: {}", e);
                        return Err(e);
                    }
                }
                OutboundPayload::Close => {
                    pending.store(0, Ordering::Release);
                    rx.close();
                    if let Err(e) = sink.close().await {
                        tracing::debug!("Transport close failed: {}", e);
                    }
                    return Ok(());
                }
            }
        }

        pending.fetch_sub(batch_size, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BoxFuture, MemoryConnector, Endpoint, Connector};
    use std::time::Duration;

    struct FailingSink;

    impl PayloadSink for FailingSink {
        fn send<'a>(&'a mut self, _payload: &'a str) -> BoxFuture<'a, Result<()>> {
            Box::pin(async { Err(LockstreamError::ConnectionClosed) })
        }

        fn close(&mut self) -> BoxFuture<'_, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_payloads, DEFAULT_MAX_PENDING_PAYLOADS);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_writes_in_order_then_closes() {
        let (connector, mut listener) = MemoryConnector::new();
        let halves = connector.connect(&Endpoint::new("memory")).await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        let (handle, task) = spawn_writer_task(halves.sink, WriterConfig::default());
        handle.try_send("one").unwrap();
        handle.try_send_all(["two", "three"]).unwrap();
        handle.close().unwrap();

        assert_eq!(peer.recv().await.as_deref(), Some("one"));
        assert_eq!(peer.recv().await.as_deref(), Some("two"));
        assert_eq!(peer.recv().await.as_deref(), Some("three"));
        assert_eq!(peer.recv().await, None);

        assert!(task.await.unwrap().is_ok());
        assert!(handle.try_send("late").is_err());
    }

    #[tokio::test]
    async fn test_try_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<OutboundPayload>(10);
        let pending = Arc::new(AtomicUsize::new(4));
        let handle = WriterHandle::new(tx, pending, 4);

        assert!(handle.is_backpressure_active());
        assert!(matches!(handle.try_send("x"), Err(LockstreamError::QueueFull)));
        assert_eq!(handle.pending_count(), 4);
        // Close ignores the limit.
        assert!(handle.close().is_ok());
    }

    #[tokio::test]
    async fn test_try_send_all_checks_group() {
        let (tx, _rx) = mpsc::channel::<OutboundPayload>(10);
        let handle = WriterHandle::new(tx, Arc::new(AtomicUsize::new(0)), 2);

        assert!(handle.try_send_all(["a", "b", "c"]).is_err());
        assert_eq!(handle.pending_count(), 0);
        assert!(handle.try_send_all(["a", "b"]).is_ok());
        assert_eq!(handle.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_ends_task() {
        let (handle, task) = spawn_writer_task(Box::new(FailingSink), WriterConfig::default());
        handle.try_send("x").unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (connector, _listener) = MemoryConnector::new();
        let halves = connector.connect(&Endpoint::new("memory")).await;
        // Listener kept alive, so connect succeeds.
        let halves = halves.unwrap();
        let (handle, task) = spawn_writer_task(halves.sink, WriterConfig::default());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }
}
