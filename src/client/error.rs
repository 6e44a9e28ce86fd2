use crate::config::ConfigError;
use crate::net::NetError;
use crate::peer::PeerId;
use crate::torrent::{InfoHash, TorrentError};
use crate::wire::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The torrent is not coordinated by this client, or not active.
    #[error("unknown torrent {0}")]
    UnknownTorrent(InfoHash),

    #[error("torrent {0} already added")]
    DuplicateTorrent(InfoHash),

    #[error("info hash mismatch: expected {expected}, got {actual}")]
    InfoHashMismatch {
        expected: InfoHash,
        actual: InfoHash,
    },

    #[error("peer id mismatch: expected {expected}, got {actual}")]
    PeerIdMismatch { expected: PeerId, actual: PeerId },

    #[error("connected to ourselves")]
    SelfConnection,

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
