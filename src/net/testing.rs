use super::{ConnectionId, NetError, Transport};
use crate::wire::{Handshake, Message};
use bytes::Bytes;
use parking_lot::Mutex;

/// Transport that records what would have been sent.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(ConnectionId, Bytes)>>,
    closed: Mutex<Vec<ConnectionId>>,
}

impl RecordingTransport {
    pub(crate) fn payloads(&self, conn: ConnectionId) -> Vec<Bytes> {
        self.sent
            .lock()
            .iter()
            .filter(|(c, _)| *c == conn)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub(crate) fn handshakes(&self, conn: ConnectionId) -> Vec<Handshake> {
        self.payloads(conn)
            .iter()
            .filter(|p| Handshake::is_handshake(p))
            .filter_map(|p| Handshake::decode(p).ok())
            .collect()
    }

    /// Every non-handshake payload sent to `conn`, decoded.
    pub(crate) fn messages(&self, conn: ConnectionId) -> Vec<Message> {
        self.payloads(conn)
            .into_iter()
            .filter(|p| !Handshake::is_handshake(p))
            .filter_map(|p| Message::decode(p).ok())
            .collect()
    }

    pub(crate) fn closed(&self) -> Vec<ConnectionId> {
        self.closed.lock().clone()
    }

    pub(crate) fn clear(&self) {
        self.sent.lock().clear();
        self.closed.lock().clear();
    }
}

impl Transport for RecordingTransport {
    fn send(&self, conn: ConnectionId, payload: Bytes) -> Result<(), NetError> {
        self.sent.lock().push((conn, payload));
        Ok(())
    }

    fn close(&self, conn: ConnectionId) {
        self.closed.lock().push(conn);
    }
}
