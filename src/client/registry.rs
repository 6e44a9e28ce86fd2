use super::ClientError;
use crate::net::{ConnectionId, NetError, ReactorListener, Transport};
use crate::peer::{PeerId, SharingPeer};
use crate::torrent::{InfoHash, TorrentCoordinator};
use crate::wire::{Handshake, Message};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct Association {
    addr: SocketAddr,
    /// Torrent we dialled for; inbound connections learn it from the
    /// handshake.
    info_hash: Option<InfoHash>,
    outbound: bool,
    handshake_sent: bool,
    peer: Option<Arc<SharingPeer>>,
}

impl Association {
    fn new(addr: SocketAddr, info_hash: Option<InfoHash>, outbound: bool) -> Self {
        Self {
            addr,
            info_hash,
            outbound,
            handshake_sent: false,
            peer: None,
        }
    }
}

/// Tracks which torrent and peer each connection belongs to.
///
/// A connection is associated with a peer only after a valid handshake;
/// until then every other frame on it is dropped.
pub struct ConnectionRegistry {
    peer_id: PeerId,
    torrents: Arc<DashMap<InfoHash, Arc<TorrentCoordinator>>>,
    transport: Arc<dyn Transport>,
    associations: Mutex<HashMap<ConnectionId, Association>>,
}

impl ConnectionRegistry {
    pub fn new(
        peer_id: PeerId,
        torrents: Arc<DashMap<InfoHash, Arc<TorrentCoordinator>>>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            peer_id,
            torrents,
            transport,
            associations: Mutex::new(HashMap::new()),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Connections currently known, handshaken or not.
    pub fn connection_count(&self) -> usize {
        self.associations.lock().len()
    }

    /// The peer bound to `conn`, if its handshake succeeded.
    pub fn peer_for(&self, conn: ConnectionId) -> Option<Arc<SharingPeer>> {
        self.associations
            .lock()
            .get(&conn)
            .and_then(|a| a.peer.clone())
    }

    fn send_handshake(&self, conn: ConnectionId, info_hash: InfoHash) -> Result<(), NetError> {
        let handshake = Handshake::new(*info_hash.as_bytes(), *self.peer_id.as_bytes());
        self.transport.send(conn, handshake.encode())
    }

    fn handle_frame(&self, conn: ConnectionId, frame: Bytes) -> Result<(), ClientError> {
        let peer = match self.associations.lock().get(&conn) {
            Some(association) => association.peer.clone(),
            None => {
                debug!(conn = %conn, "frame for unknown connection");
                return Ok(());
            }
        };

        if let Some(peer) = peer {
            let Some(torrent) = peer.torrent() else {
                return Ok(());
            };
            let message = Message::decode(frame)?;
            torrent.handle_message(&peer, message)?;
            return Ok(());
        }

        if Handshake::is_handshake(&frame) {
            self.handle_handshake(conn, &frame)
        } else {
            debug!(conn = %conn, len = frame.len(), "dropping frame before handshake");
            Ok(())
        }
    }

    fn handle_handshake(&self, conn: ConnectionId, frame: &[u8]) -> Result<(), ClientError> {
        let handshake = Handshake::decode(frame)?;
        let info_hash = InfoHash::new(handshake.info_hash);
        let peer_id = PeerId(handshake.peer_id);

        let (addr, expected_hash, outbound, handshake_sent) = {
            let associations = self.associations.lock();
            let Some(a) = associations.get(&conn) else {
                return Ok(());
            };
            (a.addr, a.info_hash, a.outbound, a.handshake_sent)
        };

        if let Some(expected) = expected_hash {
            if expected != info_hash {
                return Err(ClientError::InfoHashMismatch {
                    expected,
                    actual: info_hash,
                });
            }
        }
        if peer_id == self.peer_id {
            return Err(ClientError::SelfConnection);
        }

        let torrent = self
            .torrents
            .get(&info_hash)
            .map(|t| t.value().clone())
            .filter(|t| t.state().is_active())
            .ok_or(ClientError::UnknownTorrent(info_hash))?;

        if outbound {
            let expected = torrent.peer_by_host(addr).and_then(|p| p.peer_id());
            if let Some(expected) = expected {
                if expected != peer_id {
                    return Err(ClientError::PeerIdMismatch {
                        expected,
                        actual: peer_id,
                    });
                }
            }
        }

        if !handshake_sent {
            self.send_handshake(conn, info_hash)?;
        }

        let peer = torrent.get_or_create_peer(addr, Some(peer_id));
        torrent.bind_peer(&peer, conn, self.transport.clone());

        let still_open = match self.associations.lock().get_mut(&conn) {
            Some(a) => {
                a.info_hash = Some(info_hash);
                a.handshake_sent = true;
                a.peer = Some(peer.clone());
                true
            }
            None => false,
        };
        if !still_open {
            torrent.handle_peer_disconnected(&peer);
            return Ok(());
        }

        let completed = torrent.completed_pieces();
        if !completed.is_empty() {
            peer.send(&Message::Bitfield(completed.to_bytes()))?;
        }
        if torrent.is_server_mode() {
            peer.send(&Message::ServerCompletion(torrent.completion_percent()))?;
        }

        info!(torrent = %info_hash, peer = %peer, conn = %conn, outbound, "handshake complete");
        Ok(())
    }

    /// Forgets `conn`, disconnecting its peer or closing it directly.
    fn drop_connection(&self, conn: ConnectionId) {
        let association = self.associations.lock().remove(&conn);
        match association.and_then(|a| a.peer) {
            Some(peer) if peer.connection() == Some(conn) => match peer.torrent() {
                Some(torrent) => torrent.handle_peer_disconnected(&peer),
                None => self.transport.close(conn),
            },
            _ => self.transport.close(conn),
        }
    }
}

impl ReactorListener for ConnectionRegistry {
    fn on_inbound(&self, conn: ConnectionId, addr: SocketAddr) {
        debug!(conn = %conn, %addr, "inbound connection");
        self.associations
            .lock()
            .insert(conn, Association::new(addr, None, false));
    }

    fn on_connected(&self, conn: ConnectionId, addr: SocketAddr, info_hash: InfoHash) {
        self.associations
            .lock()
            .insert(conn, Association::new(addr, Some(info_hash), true));

        match self.send_handshake(conn, info_hash) {
            Ok(()) => {
                if let Some(a) = self.associations.lock().get_mut(&conn) {
                    a.handshake_sent = true;
                }
                debug!(conn = %conn, %addr, torrent = %info_hash, "sent handshake");
            }
            Err(e) => {
                warn!(conn = %conn, %addr, error = %e, "failed to send handshake");
                self.drop_connection(conn);
            }
        }
    }

    fn on_frames(&self, conn: ConnectionId, frames: Vec<Bytes>) {
        for frame in frames {
            if let Err(e) = self.handle_frame(conn, frame) {
                match e {
                    ClientError::UnknownTorrent(_) => debug!(conn = %conn, error = %e, "closing connection"),
                    _ => warn!(conn = %conn, error = %e, "protocol violation, closing connection"),
                }
                self.drop_connection(conn);
                return;
            }
        }
    }

    fn on_dead(&self, conn: ConnectionId) {
        let association = self.associations.lock().remove(&conn);
        let Some(association) = association else {
            return;
        };
        match association.peer {
            Some(peer) => {
                if peer.connection() == Some(conn) {
                    if let Some(torrent) = peer.torrent() {
                        torrent.handle_peer_disconnected(&peer);
                    }
                }
            }
            None => debug!(conn = %conn, addr = %association.addr, "connection died before handshake"),
        }
    }
}
