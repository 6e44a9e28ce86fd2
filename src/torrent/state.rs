use super::TorrentCoordinator;
use std::fmt;
use std::time::Duration;

/// Lifecycle of a torrent.
///
/// `Validating` leads to `Error` (terminal) or to `Sharing`/`Seeding`;
/// `Sharing` becomes `Seeding` once every piece is complete; `Seeding` ends
/// in `Stopped` when the seed period elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorrentState {
    Validating,
    Error,
    Sharing,
    Seeding,
    Stopped,
}

impl TorrentState {
    /// Whether the torrent exchanges pieces and takes part in the control loop.
    pub fn is_active(self) -> bool {
        matches!(self, TorrentState::Sharing | TorrentState::Seeding)
    }
}

impl fmt::Display for TorrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TorrentState::Validating => "validating",
            TorrentState::Error => "error",
            TorrentState::Sharing => "sharing",
            TorrentState::Seeding => "seeding",
            TorrentState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// How long to keep seeding once the torrent is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedPolicy {
    #[default]
    Forever,
    For(Duration),
    /// Stop as soon as the download completes.
    None,
}

/// Receives torrent events, synchronously and in registration order.
pub trait TorrentObserver: Send + Sync {
    fn on_state_change(&self, torrent: &TorrentCoordinator, state: TorrentState);

    fn on_piece_completed(&self, torrent: &TorrentCoordinator, piece: u32) {
        let _ = (torrent, piece);
    }

    /// Fired once, before the torrent moves to seeding.
    fn on_download_complete(&self, torrent: &TorrentCoordinator) {
        let _ = torrent;
    }
}
