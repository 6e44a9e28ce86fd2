use crate::torrent::{InfoHash, TorrentCoordinator, TorrentObserver, TorrentState};
use std::sync::Arc;

/// Tracker side of a client.
///
/// Implementations announce torrents and report discovered peers back
/// through [`Client::handle_discovered_peers`](super::Client::handle_discovered_peers).
/// Transfer counters and the announce budget are read from the coordinator.
pub trait Announcer: Send + Sync {
    fn add_torrent(&self, torrent: &Arc<TorrentCoordinator>) {
        let _ = torrent;
    }

    /// The torrent just finished downloading.
    fn completed(&self, torrent: &TorrentCoordinator) {
        let _ = torrent;
    }

    fn stop(&self, info_hash: &InfoHash) {
        let _ = info_hash;
    }
}

/// Announcer for clients whose peers are supplied by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnnouncer;

impl Announcer for NoopAnnouncer {}

/// Forwards download completion to the announcer.
pub(crate) struct CompletionAnnounce {
    announcer: Arc<dyn Announcer>,
}

impl CompletionAnnounce {
    pub(crate) fn new(announcer: Arc<dyn Announcer>) -> Self {
        Self { announcer }
    }
}

impl TorrentObserver for CompletionAnnounce {
    fn on_state_change(&self, _torrent: &TorrentCoordinator, _state: TorrentState) {}

    fn on_download_complete(&self, torrent: &TorrentCoordinator) {
        self.announcer.completed(torrent);
    }
}
