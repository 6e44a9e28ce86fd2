//! Remote peers.
//!
//! [`SharingPeer`] is the per-torrent state of one remote endpoint: choke and
//! interest flags in both directions, windowed transfer rates, the piece
//! currently requested from it and the connection it is bound to.

mod bitfield;
mod identity;
mod peer_id;
mod rate;
mod sharing;

pub use bitfield::Bitfield;
pub use identity::PeerIdentity;
pub use peer_id::PeerId;
pub use rate::Rate;
pub use sharing::SharingPeer;
