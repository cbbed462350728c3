//! The MiddleMan relay: four coroutine roles bridging many front-end connections to the
//! single persistent connection to the Signing Service.
//!
//! - [`request_producer`] — one per front-end connection, reads frames and enqueues them.
//! - [`request_consumer`] — single instance, dequeues requests and forwards them upstream.
//! - [`response_producer`] — single instance, reads upstream frames and routes them back.
//! - [`response_consumer`] — one per front-end connection, writes queued responses out.

use alloy_primitives::Address;
use alloy_signer::Signer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::frame::{Frame, FrameError, PayloadType};
use crate::io::{receive_frame, send_frame, ReceiveError};
use crate::relay::pool::QueuePool;
use crate::relay::tracker::{MessageTracker, MessageTrackerItem};
use crate::timestamp::UnixTimestamp;

/// Sentinel request id used for an ERROR frame reporting a structural problem with a
/// frame the relay could not even attribute to a real outbound request.
pub const REQUEST_ID_FOR_RESPONSE_FOR_INVALID_FRAME: u64 = u64::MAX;

/// One request read off a front-end connection, awaiting forwarding to the Signing Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestQueueItem {
    pub connection_id: u64,
    pub inner_request_id: u64,
    pub payload_type: PayloadType,
    pub body: Vec<u8>,
    pub enqueued_at: UnixTimestamp,
}

/// One response destined for a front-end connection's response queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseQueueItem {
    pub payload: Vec<u8>,
    pub concent_request_id: u64,
    pub enqueued_at: UnixTimestamp,
}

impl ResponseQueueItem {
    fn error(concent_request_id: u64, error: FrameError) -> Self {
        ResponseQueueItem {
            payload: vec![error.code().0],
            concent_request_id,
            enqueued_at: UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0)),
        }
    }
}

/// Shared state between the single request-consumer and response-producer instances.
///
/// The tracker's own invariant (single writer) is upheld by routing every mutation
/// through this shared handle rather than by relying on cooperative-scheduling alone,
/// since the relay may run its tasks across multiple worker threads.
#[derive(Clone)]
pub struct MiddleManState {
    pub pool: QueuePool,
    tracker: Arc<Mutex<MessageTracker>>,
    next_signing_service_request_id: Arc<std::sync::atomic::AtomicU64>,
    connection_counter_limit: u64,
    upstream_closed: Arc<AtomicBool>,
}

impl MiddleManState {
    pub fn new(connection_counter_limit: u64) -> Self {
        MiddleManState {
            pool: QueuePool::new(),
            tracker: Arc::new(Mutex::new(MessageTracker::new())),
            next_signing_service_request_id: Arc::new(std::sync::atomic::AtomicU64::new(0)),
            connection_counter_limit: connection_counter_limit.max(1),
            upstream_closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn allocate_signing_service_request_id(&self) -> u64 {
        let previous = self
            .next_signing_service_request_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current + 1) % self.connection_counter_limit)
            })
            .unwrap_or(0);
        (previous + 1) % self.connection_counter_limit
    }

    pub fn is_upstream_closed(&self) -> bool {
        self.upstream_closed.load(Ordering::SeqCst)
    }
}

/// Reads frames from one front-end connection and enqueues well-formed ones; malformed
/// frames get an ERROR response enqueued directly and do not reach the shared request queue.
pub async fn request_producer<R>(
    connection_id: u64,
    mut reader: R,
    expected_peer_address: Address,
    request_tx: mpsc::Sender<RequestQueueItem>,
    state: MiddleManState,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = receive_frame(&mut reader, expected_peer_address) => frame,
        };
        match frame {
            Ok(frame) => {
                let item = RequestQueueItem {
                    connection_id,
                    inner_request_id: frame.request_id,
                    payload_type: frame.payload_type,
                    body: frame.body,
                    enqueued_at: UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0)),
                };
                if request_tx.send(item).await.is_err() {
                    break;
                }
            }
            Err(ReceiveError::IncompleteRead) => {
                tracing::debug!(connection_id, "front-end connection closed");
                break;
            }
            Err(ReceiveError::Decode(error)) => {
                tracing::warn!(connection_id, %error, "invalid frame from front-end connection");
                let response = ResponseQueueItem::error(
                    REQUEST_ID_FOR_RESPONSE_FOR_INVALID_FRAME,
                    error,
                );
                let _ = state.pool.send(connection_id, response).await;
            }
            Err(ReceiveError::Io(error)) => {
                tracing::warn!(connection_id, %error, "I/O error reading frame");
            }
        }
    }
}

/// Single instance: dequeues requests, assigns a fresh signing-service request id, records
/// a tracker entry, and forwards the request upstream.
pub async fn request_consumer<W, S>(
    mut request_rx: mpsc::Receiver<RequestQueueItem>,
    mut upstream_writer: W,
    signer: S,
    state: MiddleManState,
) where
    W: AsyncWrite + Unpin,
    S: Signer + Sync,
{
    while let Some(item) = request_rx.recv().await {
        if !state.pool.contains(item.connection_id) {
            continue;
        }
        if state.is_upstream_closed() {
            let response =
                ResponseQueueItem::error(item.inner_request_id, FrameError::Unknown);
            let _ = state.pool.send(item.connection_id, response).await;
            continue;
        }

        let signing_service_request_id = state.allocate_signing_service_request_id();
        {
            let mut tracker = state.tracker.lock().await;
            tracker.insert(
                signing_service_request_id,
                MessageTrackerItem {
                    connection_id: item.connection_id,
                    originating_request_id: item.inner_request_id,
                    payload: item.body.clone(),
                    enqueued_at: item.enqueued_at,
                },
            );
        }

        let upstream_frame = Frame {
            payload_type: item.payload_type,
            request_id: signing_service_request_id,
            body: item.body,
        };
        if let Err(error) = send_frame(&upstream_frame, &mut upstream_writer, &signer).await {
            tracing::error!(%error, "failed to forward request upstream");
            state.upstream_closed.store(true, Ordering::SeqCst);
        }
    }
}

/// Single instance: reads upstream frames, matches them against the tracker, and routes
/// them back to the originating connection's response queue.
pub async fn response_producer<R>(
    mut upstream_reader: R,
    signing_service_address: Address,
    state: MiddleManState,
) where
    R: AsyncRead + Unpin,
{
    loop {
        match receive_frame(&mut upstream_reader, signing_service_address).await {
            Ok(frame) => {
                let request_id = frame.request_id;
                let mut tracker = state.tracker.lock().await;
                let stale = tracker.pop_stale_before(request_id);
                drop(tracker);
                for (stale_id, stale_item) in stale {
                    tracing::info!(
                        stale_id,
                        connection_id = stale_item.connection_id,
                        "dropping abandoned in-flight request"
                    );
                }

                let mut tracker = state.tracker.lock().await;
                let item = tracker.remove(request_id);
                drop(tracker);

                let Some(item) = item else {
                    continue;
                };
                if !state.pool.contains(item.connection_id) {
                    continue;
                }
                let response = ResponseQueueItem {
                    payload: frame.body,
                    concent_request_id: item.originating_request_id,
                    enqueued_at: UnixTimestamp::try_now().unwrap_or(UnixTimestamp(0)),
                };
                let _ = state.pool.send(item.connection_id, response).await;
            }
            Err(ReceiveError::IncompleteRead) => {
                tracing::error!("upstream Signing Service connection closed");
                state.upstream_closed.store(true, Ordering::SeqCst);
                let mut tracker = state.tracker.lock().await;
                let orphaned = tracker.drain_all();
                drop(tracker);
                for (_, item) in orphaned {
                    let response = ResponseQueueItem::error(
                        item.originating_request_id,
                        FrameError::Unknown,
                    );
                    let _ = state.pool.send(item.connection_id, response).await;
                }
                break;
            }
            Err(ReceiveError::Decode(error)) => {
                tracing::warn!(%error, "invalid frame from upstream");
            }
            Err(ReceiveError::Io(error)) => {
                tracing::warn!(%error, "I/O error reading from upstream");
            }
        }
    }
}

/// One per front-end connection: writes queued responses out in the order the upstream
/// answered them, stamping each with the connection's own originating request id.
pub async fn response_consumer<W, S>(
    mut response_rx: mpsc::Receiver<ResponseQueueItem>,
    mut writer: W,
    signer: S,
) where
    W: AsyncWrite + Unpin,
    S: Signer + Sync,
{
    while let Some(item) = response_rx.recv().await {
        let payload_type = if item.payload.len() == 1
            && item.concent_request_id == REQUEST_ID_FOR_RESPONSE_FOR_INVALID_FRAME
        {
            PayloadType::Error
        } else {
            PayloadType::GolemMessage
        };
        let frame = Frame {
            payload_type,
            request_id: item.concent_request_id,
            body: item.payload,
        };
        if send_frame(&frame, &mut writer, &signer).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_signer_local::PrivateKeySigner;
    use tokio::io::duplex;

    #[tokio::test]
    async fn lost_message_discard_drops_only_entries_older_than_the_matched_response() {
        let state = MiddleManState::new(1 << 16);
        state.pool.register(1);

        {
            let mut tracker = state.tracker.lock().await;
            tracker.insert(
                7,
                MessageTrackerItem {
                    connection_id: 1,
                    originating_request_id: 100,
                    payload: vec![],
                    enqueued_at: UnixTimestamp(0),
                },
            );
            tracker.insert(
                8,
                MessageTrackerItem {
                    connection_id: 1,
                    originating_request_id: 101,
                    payload: vec![],
                    enqueued_at: UnixTimestamp(0),
                },
            );
        }

        let stale = {
            let mut tracker = state.tracker.lock().await;
            let stale = tracker.pop_stale_before(8);
            tracker.remove(8);
            stale
        };
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, 7);

        let tracker = state.tracker.lock().await;
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn request_producer_reports_invalid_frame_without_ending_the_connection() {
        let state = MiddleManState::new(1 << 16);
        let mut rx = state.pool.register(1);
        let (request_tx, _request_rx) = mpsc::channel(16);
        let signer = PrivateKeySigner::random();
        let (mut client, server) = duplex(4096);

        // Write one unescaped-separator-corrupted byte sequence, then close.
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(&[0x1B]).await.unwrap();
            client.write_all(&[crate::frame::SEP_BYTE]).await.unwrap();
            drop(client);
        });

        let cancel = CancellationToken::new();
        request_producer(1, server, signer.address(), request_tx, state, cancel).await;

        let response = rx.recv().await.unwrap();
        assert_eq!(response.concent_request_id, REQUEST_ID_FOR_RESPONSE_FOR_INVALID_FRAME);
    }
}
