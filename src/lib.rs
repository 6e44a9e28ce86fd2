//! swarmlink - A BitTorrent peer engine
//!
//! This library implements the peer side of a BitTorrent client: a
//! non-blocking connection reactor, the length-prefixed peer wire protocol,
//! handshake validation, and per-torrent piece scheduling with the
//! tit-for-tat choke algorithm.
//!
//! # Modules
//!
//! - [`wire`] - Frame codec, handshake and peer messages
//! - [`net`] - mio reactor with read and write workers
//! - [`peer`] - Peer identity, bitfields, rates and per-peer state
//! - [`torrent`] - Torrent coordinator, lifecycle, choking and piece stores
//! - [`client`] - Connection registry, control loop and client facade
//! - [`config`] - Client and choking configuration
//! - [`constants`] - Protocol constants and defaults

pub mod client;
pub mod config;
pub mod constants;
pub mod net;
pub mod peer;
pub mod torrent;
pub mod wire;

pub use client::{Announcer, Client, ClientError, ConnectionRegistry, NoopAnnouncer};
pub use config::{ChokingConfig, ClientConfig, ConfigError};
pub use net::{ConnectionId, NetError, Reactor, ReactorListener, Transport};
pub use peer::{Bitfield, PeerId, PeerIdentity, SharingPeer};
pub use torrent::{
    InfoHash, MemoryPieceStore, PieceStore, SeedPolicy, TorrentCoordinator, TorrentError,
    TorrentObserver, TorrentState,
};
pub use wire::{Handshake, Message, WireError};
