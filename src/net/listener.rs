use super::NetError;
use crate::torrent::InfoHash;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

/// Opaque handle to one socket owned by the reactor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl ConnectionId {
    pub(crate) fn new(raw: usize) -> Self {
        Self(raw)
    }

    pub(crate) fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Receives connection events from a reactor.
///
/// Every callback runs on the reactor's read worker, in the order the events
/// happened for a given connection: a connection's frames always precede its
/// dead notice. A panicking listener is logged and skipped.
pub trait ReactorListener: Send + Sync {
    /// A remote peer connected to us. Nothing is known about it yet.
    fn on_inbound(&self, conn: ConnectionId, addr: SocketAddr) {
        let _ = (conn, addr);
    }

    /// An outbound connection started with [`Reactor::connect`] completed.
    ///
    /// [`Reactor::connect`]: super::Reactor::connect
    fn on_connected(&self, conn: ConnectionId, addr: SocketAddr, info_hash: InfoHash) {
        let _ = (conn, addr, info_hash);
    }

    /// Complete frames assembled from the connection's byte stream, in
    /// arrival order. The batch may be empty.
    fn on_frames(&self, conn: ConnectionId, frames: Vec<Bytes>);

    /// The connection was closed and deregistered.
    fn on_dead(&self, conn: ConnectionId) {
        let _ = conn;
    }
}

/// Outgoing side of the peer connections.
pub trait Transport: Send + Sync {
    /// Queues one frame payload. Payloads sent to the same connection go out
    /// in call order.
    fn send(&self, conn: ConnectionId, payload: Bytes) -> Result<(), NetError>;

    /// Closes the connection, discarding queued writes.
    fn close(&self, conn: ConnectionId);
}
