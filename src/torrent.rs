//! Per-torrent coordination.
//!
//! A [`TorrentCoordinator`] owns the peers of one torrent, decides which
//! pieces to request from whom, answers requests from its [`PieceStore`] and
//! runs the periodic choke/unchoke pass using [`ChokingAlgorithm`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use swarmlink::config::ChokingConfig;
//! use swarmlink::torrent::{InfoHash, MemoryPieceStore, TorrentCoordinator, TorrentState};
//!
//! let store = Arc::new(MemoryPieceStore::seeded(vec![7u8; 40_000], 16_384));
//! let torrent = TorrentCoordinator::new(InfoHash::new([1; 20]), store, &ChokingConfig::default());
//! torrent.share().unwrap();
//! assert_eq!(torrent.state(), TorrentState::Seeding);
//! ```

mod choking;
mod coordinator;
mod error;
mod info_hash;
mod state;
mod store;

pub use choking::{Candidate, ChokePlan, ChokingAlgorithm, OptimisticPicker, RandomPicker, RankBy};
pub use coordinator::{TorrentCoordinator, TorrentInfo};
pub use error::{StoreError, TorrentError};
pub use info_hash::InfoHash;
pub use state::{SeedPolicy, TorrentObserver, TorrentState};
pub use store::{BlockOutcome, MemoryPieceStore, PieceStore};

#[cfg(test)]
mod tests;
