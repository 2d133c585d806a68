//! Bounded hand-off queue between ingress and processing
//!
//! The webhook handler enqueues without blocking; a single worker task
//! dequeues and processes serially. When the queue is full the entry is
//! dropped and counted, keeping memory bounded and the HTTP layer
//! responsive under sustained overload.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::classify::RawMessageEntry;

/// Queue capacity
pub const QUEUE_CAPACITY: usize = 1000;

/// How long the worker waits for an item before re-checking shutdown
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ingress-side handle of the hand-off queue
#[derive(Debug)]
pub struct HandoffQueue {
    tx: mpsc::Sender<RawMessageEntry>,
    shutdown: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl HandoffQueue {
    /// Create a queue of the given capacity
    ///
    /// Returns the ingress handle, the receiver for the worker, and the
    /// shared shutdown flag.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RawMessageEntry>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::channel(capacity);
        let shutdown = Arc::new(AtomicBool::new(false));
        let queue = Self {
            tx,
            shutdown: shutdown.clone(),
            dropped: AtomicU64::new(0),
        };
        (queue, rx, shutdown)
    }

    /// Enqueue without blocking
    ///
    /// Returns `false` when the entry was dropped: queue full, or shutdown in
    /// progress.
    pub fn push(&self, entry: RawMessageEntry) -> bool {
        if self.shutdown.load(Ordering::Relaxed) {
            tracing::warn!(message_id = ?entry.msg_id, "enqueue rejected during shutdown");
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        match self.tx.try_send(entry) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(entry)) => {
                tracing::warn!(message_id = ?entry.msg_id, "queue full, message dropped");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(entry)) => {
                tracing::warn!(message_id = ?entry.msg_id, "queue closed, message dropped");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Number of entries dropped so far
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawn the processing worker on its own task
///
/// One entry is fully processed before the next is dequeued; classification
/// and download side effects therefore never race. The loop wakes every
/// [`POLL_INTERVAL`] to observe the shutdown flag and exits once the flag is
/// set and the queue is drained (or the channel is closed).
pub fn spawn_worker<F, Fut>(
    mut rx: mpsc::Receiver<RawMessageEntry>,
    shutdown: Arc<AtomicBool>,
    mut handle: F,
) -> JoinHandle<()>
where
    F: FnMut(RawMessageEntry) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        tracing::info!("message worker started");
        loop {
            match tokio::time::timeout(POLL_INTERVAL, rx.recv()).await {
                Ok(Some(entry)) => handle(entry).await,
                Ok(None) => break,
                Err(_) => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }
        tracing::info!("message worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::types::WrappedString;

    fn entry(id: i64) -> RawMessageEntry {
        RawMessageEntry {
            msg_id: Some(id),
            new_msg_id: None,
            from: WrappedString::default(),
            to: WrappedString::default(),
            msg_type: 1,
            content: WrappedString { string: "x".to_string() },
            push_content: String::new(),
            create_time: 0,
        }
    }

    // -- backpressure ---------------------------------------------------------

    #[tokio::test]
    async fn overflow_drops_without_blocking() {
        let (queue, mut rx, _shutdown) = HandoffQueue::new(2);

        assert!(queue.push(entry(1)));
        assert!(queue.push(entry(2)));
        assert!(!queue.push(entry(3)));
        assert_eq!(queue.dropped(), 1);

        assert_eq!(rx.recv().await.unwrap().msg_id, Some(1));
        assert_eq!(rx.recv().await.unwrap().msg_id, Some(2));
    }

    #[tokio::test]
    async fn shutdown_rejects_new_entries() {
        let (queue, _rx, shutdown) = HandoffQueue::new(2);
        shutdown.store(true, Ordering::Relaxed);
        assert!(!queue.push(entry(1)));
        assert_eq!(queue.dropped(), 1);
    }

    // -- worker ---------------------------------------------------------------

    #[tokio::test]
    async fn worker_drains_then_stops_on_shutdown() {
        let (queue, rx, shutdown) = HandoffQueue::new(10);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();

        let worker = spawn_worker(rx, shutdown.clone(), move |entry| {
            let seen_tx = seen_tx.clone();
            async move {
                let _ = seen_tx.send(entry.msg_id.unwrap_or_default());
            }
        });

        assert!(queue.push(entry(1)));
        assert!(queue.push(entry(2)));

        assert_eq!(seen_rx.recv().await, Some(1));
        assert_eq!(seen_rx.recv().await, Some(2));

        shutdown.store(true, Ordering::Relaxed);
        tokio::time::timeout(Duration::from_secs(3), worker)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
