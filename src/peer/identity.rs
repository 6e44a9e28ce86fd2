use super::PeerId;
use std::fmt;
use std::net::SocketAddr;

/// Where a peer can be reached and, once learned, who it claims to be.
///
/// Two identities are equal when their addresses match, or when both carry a
/// peer ID and those match. A tracker sighting (address only) therefore
/// equals the later handshake identity of the same endpoint.
#[derive(Clone, Copy)]
pub struct PeerIdentity {
    pub addr: SocketAddr,
    pub peer_id: Option<PeerId>,
}

impl PeerIdentity {
    pub fn new(addr: SocketAddr, peer_id: Option<PeerId>) -> Self {
        Self { addr, peer_id }
    }

    pub fn from_addr(addr: SocketAddr) -> Self {
        Self {
            addr,
            peer_id: None,
        }
    }

    pub fn has_peer_id(&self) -> bool {
        self.peer_id.is_some()
    }
}

impl PartialEq for PeerIdentity {
    fn eq(&self, other: &Self) -> bool {
        if self.addr == other.addr {
            return true;
        }
        matches!((self.peer_id, other.peer_id), (Some(a), Some(b)) if a == b)
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.peer_id {
            Some(id) => write!(f, "{}/{:?}", self.addr, id),
            None => write!(f, "{}/?", self.addr),
        }
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
