//! Per-connection outbound queues.
//!
//! The hub never writes to a transport. Each registered connection owns a
//! bounded queue: the hub holds the sending [`OutboundHandle`], and a writer
//! task drains the [`OutboundQueue`] into the connection's write half. A full
//! queue drops the new frame, so one slow peer cannot stall a broadcast.

use bytes::Bytes;
use huddle_transport::{ConnectionId, ConnectionWriter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default outbound queue capacity, in frames.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Outcome of handing a frame to a connection's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was queued.
    Queued,
    /// The queue was full and the frame was dropped.
    Full,
    /// The writer has gone away.
    Closed,
}

/// Create a bounded outbound queue for a connection.
#[must_use]
pub fn channel(id: ConnectionId, capacity: usize) -> (OutboundHandle, OutboundQueue) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let handle = OutboundHandle {
        id: id.clone(),
        sender,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (handle, OutboundQueue { id, receiver })
}

/// The routing reference the hub keeps for a connection.
#[derive(Debug, Clone)]
pub struct OutboundHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Bytes>,
    dropped: Arc<AtomicU64>,
}

impl OutboundHandle {
    /// The connection this handle routes to.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Queue a frame without waiting.
    pub fn deliver(&self, frame: Bytes) -> Delivery {
        match self.sender.try_send(frame) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(connection = %self.id, total_drops = dropped, "Outbound queue full, dropping frame");
                Delivery::Full
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = %self.id, "Outbound queue closed, dropping frame");
                Delivery::Closed
            }
        }
    }

    /// Number of frames dropped because the queue was full.
    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The receiving end of a connection's outbound queue.
#[derive(Debug)]
pub struct OutboundQueue {
    id: ConnectionId,
    receiver: mpsc::Receiver<Bytes>,
}

impl OutboundQueue {
    /// Wait for the next queued frame.
    ///
    /// Returns `None` once every handle has been dropped and the queue is empty.
    pub async fn next(&mut self) -> Option<Bytes> {
        self.receiver.recv().await
    }

    /// Take a queued frame if one is ready.
    pub fn try_next(&mut self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }

    /// Write queued frames until the queue closes or a send fails, then close
    /// the transport.
    ///
    /// Returns the number of frames written.
    pub async fn drain(mut self, mut writer: Box<dyn ConnectionWriter>) -> usize {
        let mut written = 0;

        while let Some(frame) = self.receiver.recv().await {
            if let Err(e) = writer.send(frame).await {
                debug!(connection = %self.id, error = %e, "Write failed, stopping writer");
                break;
            }
            written += 1;
        }

        if let Err(e) = writer.close().await {
            debug!(connection = %self.id, error = %e, "Close failed");
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_transport::memory;
    use huddle_transport::Connection;

    #[test]
    fn test_full_queue_drops_new_frames() {
        let (handle, _queue) = channel("conn-1".into(), 2);

        assert_eq!(handle.deliver(Bytes::from_static(b"1")), Delivery::Queued);
        assert_eq!(handle.deliver(Bytes::from_static(b"2")), Delivery::Queued);
        assert_eq!(handle.deliver(Bytes::from_static(b"3")), Delivery::Full);
        assert_eq!(handle.dropped_count(), 1);
    }

    #[test]
    fn test_closed_queue() {
        let (handle, queue) = channel("conn-1".into(), 2);
        drop(queue);
        assert_eq!(handle.deliver(Bytes::from_static(b"1")), Delivery::Closed);
        assert_eq!(handle.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_writes_then_closes() {
        let (conn, mut peer) = memory::pair();
        let (_reader, writer) = Box::new(conn).split();
        let (handle, queue) = channel("conn-1".into(), 8);

        handle.deliver(Bytes::from_static(b"a"));
        handle.deliver(Bytes::from_static(b"b"));
        drop(handle);

        assert_eq!(queue.drain(writer).await, 2);
        assert_eq!(&peer.recv().await.unwrap()[..], b"a");
        assert_eq!(&peer.recv().await.unwrap()[..], b"b");
        assert!(peer.recv().await.is_none());
    }
}
