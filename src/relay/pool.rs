//! Process-wide mapping from connection id to a bounded response channel.
//!
//! Registration is idempotent under the `DashMap`'s internal sharded locking (mirroring
//! the concurrent-map style `PendingNonceManager` uses for per-address nonces); removal
//! drops the sender, which unblocks any reader awaiting on the channel with a `None`.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::relay::middleman::ResponseQueueItem;

/// Per-connection bound on the response queue. A slow front-end consumer backpressures
/// its own response producer, never the shared upstream pipeline.
pub const RESPONSE_QUEUE_CAPACITY: usize = 64;

/// Wrap point for both connection ids and signing-service request ids, per the
/// `connection_counter_limit` configuration option.
pub const DEFAULT_CONNECTION_COUNTER_LIMIT: u64 = 1 << 32;

/// Monotonically increasing connection id generator, wrapped at `limit`.
#[derive(Debug)]
pub struct ConnectionCounter {
    next: AtomicU64,
    limit: u64,
}

impl ConnectionCounter {
    pub fn new(limit: u64) -> Self {
        ConnectionCounter {
            next: AtomicU64::new(0),
            limit,
        }
    }

    pub fn next_id(&self) -> u64 {
        let previous = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current + 1) % self.limit.max(1))
            })
            .unwrap_or(0);
        (previous + 1) % self.limit.max(1)
    }
}

/// A process-wide registry of front-end connections currently being served by the relay.
#[derive(Debug, Clone, Default)]
pub struct QueuePool {
    inner: Arc<DashMap<u64, mpsc::Sender<ResponseQueueItem>>>,
}

impl QueuePool {
    pub fn new() -> Self {
        QueuePool::default()
    }

    /// Registers `connection_id` with a fresh bounded response channel and returns the
    /// receiver half for that connection's response consumer.
    pub fn register(&self, connection_id: u64) -> mpsc::Receiver<ResponseQueueItem> {
        let (tx, rx) = mpsc::channel(RESPONSE_QUEUE_CAPACITY);
        self.inner.insert(connection_id, tx);
        rx
    }

    /// Removes `connection_id` from the pool. Any producer blocked on a full queue for
    /// this id will see the receiver drop; any consumer blocked on an empty queue sees
    /// the channel close once the sender is dropped here.
    pub fn unregister(&self, connection_id: u64) {
        self.inner.remove(&connection_id);
    }

    pub fn contains(&self, connection_id: u64) -> bool {
        self.inner.contains_key(&connection_id)
    }

    /// Enqueues `item` onto `connection_id`'s response queue. Returns `false` if the
    /// connection is no longer in the pool or its queue has been closed.
    pub async fn send(&self, connection_id: u64, item: ResponseQueueItem) -> bool {
        let sender = match self.inner.get(&connection_id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };
        sender.send(item).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_counter_wraps() {
        let counter = ConnectionCounter::new(3);
        assert_eq!(counter.next_id(), 1);
        assert_eq!(counter.next_id(), 2);
        assert_eq!(counter.next_id(), 0);
        assert_eq!(counter.next_id(), 1);
    }

    #[tokio::test]
    async fn register_then_unregister_closes_the_channel() {
        let pool = QueuePool::new();
        let mut rx = pool.register(1);
        assert!(pool.contains(1));

        pool.unregister(1);
        assert!(!pool.contains(1));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_to_unknown_connection_returns_false() {
        let pool = QueuePool::new();
        let item = ResponseQueueItem {
            payload: vec![],
            concent_request_id: 1,
            enqueued_at: crate::timestamp::UnixTimestamp(0),
        };
        assert!(!pool.send(99, item).await);
    }
}
