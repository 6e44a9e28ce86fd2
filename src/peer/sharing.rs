use super::{Bitfield, PeerId, PeerIdentity, Rate};
use crate::net::{ConnectionId, NetError, Transport};
use crate::torrent::{InfoHash, TorrentCoordinator};
use crate::wire::Message;
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// A remote peer taking part in one torrent.
///
/// Created by the torrent's coordinator on first sighting and kept across
/// reconnections; only the connection-bound state is reset when the peer
/// is bound to a new connection or unbound.
pub struct SharingPeer {
    addr: SocketAddr,
    peer_id: Mutex<Option<PeerId>>,
    info_hash: InfoHash,
    torrent: Weak<TorrentCoordinator>,
    link: Mutex<PeerLink>,
}

struct PeerLink {
    connection: Option<(ConnectionId, Arc<dyn Transport>)>,
    /// We refuse requests from the peer.
    choking: bool,
    /// The peer wants to download from us.
    interested: bool,
    /// The peer refuses our requests.
    choked: bool,
    /// We want to download from the peer.
    interesting: bool,
    available: Bitfield,
    requested: Option<u32>,
    download: Rate,
    upload: Rate,
    server_completion: Option<u8>,
}

impl PeerLink {
    fn new(piece_count: usize) -> Self {
        Self {
            connection: None,
            choking: true,
            interested: false,
            choked: true,
            interesting: false,
            available: Bitfield::new(piece_count),
            requested: None,
            download: Rate::new(),
            upload: Rate::new(),
            server_completion: None,
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.available.piece_count());
    }

    fn send(&mut self, message: &Message) -> Result<(), NetError> {
        let (conn, transport) = self.connection.as_ref().ok_or(NetError::NotConnected)?;
        transport.send(*conn, message.encode())?;
        if let Message::Piece { data, .. } = message {
            self.upload.add(data.len() as u64);
        }
        Ok(())
    }
}

impl SharingPeer {
    pub(crate) fn new(
        addr: SocketAddr,
        peer_id: Option<PeerId>,
        info_hash: InfoHash,
        piece_count: usize,
        torrent: Weak<TorrentCoordinator>,
    ) -> Self {
        Self {
            addr,
            peer_id: Mutex::new(peer_id),
            info_hash,
            torrent,
            link: Mutex::new(PeerLink::new(piece_count)),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn peer_id(&self) -> Option<PeerId> {
        *self.peer_id.lock()
    }

    /// Records the peer ID learned from a handshake, returning the one it
    /// replaces.
    pub(crate) fn set_peer_id(&self, peer_id: PeerId) -> Option<PeerId> {
        self.peer_id.lock().replace(peer_id)
    }

    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.addr, self.peer_id())
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// The coordinator this peer belongs to, unless it has been dropped.
    pub fn torrent(&self) -> Option<Arc<TorrentCoordinator>> {
        self.torrent.upgrade()
    }

    /// Attaches the peer to a freshly handshaken connection.
    ///
    /// All connection-bound state starts over. A previous connection, if
    /// any, is closed.
    pub(crate) fn bind(&self, conn: ConnectionId, transport: Arc<dyn Transport>) {
        let mut link = self.link.lock();
        if let Some((old, old_transport)) = link.connection.take() {
            debug!(peer = %self, old = %old, new = %conn, "replacing peer connection");
            old_transport.close(old);
        }
        link.reset();
        link.connection = Some((conn, transport));
    }

    /// Detaches the peer from its connection and closes it.
    pub(crate) fn unbind(&self) -> Option<ConnectionId> {
        let mut link = self.link.lock();
        let previous = link.connection.take();
        link.reset();
        previous.map(|(conn, transport)| {
            transport.close(conn);
            conn
        })
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.link.lock().connection.as_ref().map(|(conn, _)| *conn)
    }

    pub fn is_connected(&self) -> bool {
        self.link.lock().connection.is_some()
    }

    pub fn send(&self, message: &Message) -> Result<(), NetError> {
        trace!(peer = %self, kind = message.kind(), "sending message");
        self.link.lock().send(message)
    }

    /// Chokes the peer; the choke message goes out only on a change.
    pub fn choke(&self) -> Result<(), NetError> {
        let mut link = self.link.lock();
        if !link.choking {
            link.send(&Message::Choke)?;
            link.choking = true;
            debug!(peer = %self, "choked");
        }
        Ok(())
    }

    /// Unchokes the peer; the unchoke message goes out only on a change.
    pub fn unchoke(&self) -> Result<(), NetError> {
        let mut link = self.link.lock();
        if link.choking {
            link.send(&Message::Unchoke)?;
            link.choking = false;
            debug!(peer = %self, "unchoked");
        }
        Ok(())
    }

    /// Declares (or withdraws) our interest in the peer's pieces.
    pub fn set_interesting(&self, interesting: bool) -> Result<(), NetError> {
        let mut link = self.link.lock();
        if link.interesting != interesting {
            let message = if interesting {
                Message::Interested
            } else {
                Message::NotInterested
            };
            link.send(&message)?;
            link.interesting = interesting;
        }
        Ok(())
    }

    pub fn is_choking(&self) -> bool {
        self.link.lock().choking
    }

    pub fn is_interested(&self) -> bool {
        self.link.lock().interested
    }

    pub fn is_choked(&self) -> bool {
        self.link.lock().choked
    }

    pub fn is_interesting(&self) -> bool {
        self.link.lock().interesting
    }

    pub(crate) fn set_interested(&self, interested: bool) {
        self.link.lock().interested = interested;
    }

    pub(crate) fn set_choked(&self, choked: bool) {
        self.link.lock().choked = choked;
    }

    pub fn available(&self) -> Bitfield {
        self.link.lock().available.clone()
    }

    /// Replaces the peer's availability and returns the previous one.
    pub(crate) fn set_available(&self, available: Bitfield) -> Bitfield {
        std::mem::replace(&mut self.link.lock().available, available)
    }

    /// Returns whether the piece was newly announced.
    pub(crate) fn mark_available(&self, index: u32) -> bool {
        self.link.lock().available.set_piece(index as usize)
    }

    /// The piece currently requested from this peer.
    pub fn requested(&self) -> Option<u32> {
        self.link.lock().requested
    }

    pub(crate) fn set_requested(&self, piece: Option<u32>) {
        self.link.lock().requested = piece;
    }

    pub(crate) fn take_requested(&self) -> Option<u32> {
        self.link.lock().requested.take()
    }

    /// Clears the requested piece only if it is still `piece`.
    pub(crate) fn release_requested(&self, piece: u32) -> bool {
        let mut link = self.link.lock();
        if link.requested == Some(piece) {
            link.requested = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn record_download(&self, bytes: u64) {
        self.link.lock().download.add(bytes);
    }

    /// Bytes per second received from the peer in the current window.
    pub fn download_rate(&self) -> f64 {
        self.link.lock().download.per_second()
    }

    /// Bytes per second sent to the peer in the current window.
    pub fn upload_rate(&self) -> f64 {
        self.link.lock().upload.per_second()
    }

    pub fn reset_rates(&self) {
        let mut link = self.link.lock();
        link.download.reset();
        link.upload.reset();
    }

    pub fn server_completion(&self) -> Option<u8> {
        self.link.lock().server_completion
    }

    pub(crate) fn set_server_completion(&self, percent: u8) {
        self.link.lock().server_completion = Some(percent);
    }
}

impl fmt::Display for SharingPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identity())
    }
}

impl fmt::Debug for SharingPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharingPeer")
            .field("identity", &self.identity())
            .field("info_hash", &self.info_hash)
            .field("connection", &self.connection())
            .finish()
    }
}
