//! In-process transport backed by tokio channels.
//!
//! [`pair`] returns the server side of a connection together with a
//! [`MemoryPeer`] that plays the client. Used by tests and local tooling
//! that want to drive sessions without a network stack.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::traits::{
    Connection, ConnectionId, ConnectionReader, ConnectionWriter, TransportError,
};

/// Something the peer pushed towards the server.
#[derive(Debug)]
enum PeerEvent {
    Frame(Bytes),
    Fail(String),
}

/// Something the server pushed towards the peer.
#[derive(Debug)]
enum ServerEvent {
    Frame(Bytes),
    Closed,
}

/// Create a connected server/peer pair.
#[must_use]
pub fn pair() -> (MemoryConnection, MemoryPeer) {
    pair_with_id(ConnectionId::generate())
}

/// Create a connected server/peer pair with a chosen connection ID.
#[must_use]
pub fn pair_with_id(id: impl Into<ConnectionId>) -> (MemoryConnection, MemoryPeer) {
    let (peer_tx, peer_rx) = mpsc::unbounded_channel();
    let (server_tx, server_rx) = mpsc::unbounded_channel();

    let connection = MemoryConnection {
        id: id.into(),
        inbound: peer_rx,
        outbound: server_tx,
    };
    let peer = MemoryPeer {
        tx: Some(peer_tx),
        rx: server_rx,
        closed: false,
    };
    (connection, peer)
}

/// Server side of an in-memory connection.
pub struct MemoryConnection {
    id: ConnectionId,
    inbound: mpsc::UnboundedReceiver<PeerEvent>,
    outbound: mpsc::UnboundedSender<ServerEvent>,
}

impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Box<dyn ConnectionWriter>) {
        let reader = MemoryReader {
            inbound: self.inbound,
        };
        let writer = MemoryWriter {
            outbound: self.outbound,
            closed: false,
        };
        (Box::new(reader), Box::new(writer))
    }
}

struct MemoryReader {
    inbound: mpsc::UnboundedReceiver<PeerEvent>,
}

#[async_trait]
impl ConnectionReader for MemoryReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.inbound.recv().await {
            Some(PeerEvent::Frame(data)) => Ok(Some(data)),
            Some(PeerEvent::Fail(reason)) => Err(TransportError::ReceiveFailed(reason)),
            None => Ok(None),
        }
    }
}

struct MemoryWriter {
    outbound: mpsc::UnboundedSender<ServerEvent>,
    closed: bool,
}

#[async_trait]
impl ConnectionWriter for MemoryWriter {
    async fn send(&mut self, data: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.outbound
            .send(ServerEvent::Frame(data))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        // Peer may already be gone
        let _ = self.outbound.send(ServerEvent::Closed);
        Ok(())
    }
}

/// Client side of an in-memory connection.
#[derive(Debug)]
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<PeerEvent>>,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
    closed: bool,
}

impl MemoryPeer {
    /// Send a frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if either side has closed.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        tx.send(PeerEvent::Frame(data.into()))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Send a text frame to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if either side has closed.
    pub fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send(Bytes::copy_from_slice(text.as_bytes()))
    }

    /// Make the server's next read fail with a transport error.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(PeerEvent::Fail(reason.into()));
        }
    }

    /// Close the peer side; the server reads end-of-stream.
    pub fn close(&mut self) {
        self.tx = None;
    }

    /// Receive the next frame from the server.
    ///
    /// Returns `None` once the server has closed the connection.
    pub async fn recv(&mut self) -> Option<Bytes> {
        if self.closed {
            return None;
        }
        match self.rx.recv().await {
            Some(ServerEvent::Frame(data)) => Some(data),
            Some(ServerEvent::Closed) | None => {
                self.closed = true;
                None
            }
        }
    }

    /// Receive a frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Bytes> {
        if self.closed {
            return None;
        }
        match self.rx.try_recv() {
            Ok(ServerEvent::Frame(data)) => Some(data),
            Ok(ServerEvent::Closed) | Err(mpsc::error::TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
            Err(mpsc::error::TryRecvError::Empty) => None,
        }
    }

    /// Whether the server has been observed closing the connection.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
