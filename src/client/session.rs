use super::announce::CompletionAnnounce;
use super::{Announcer, ClientError, ConnectionRegistry, ControlSchedule, Tick};
use crate::config::ClientConfig;
use crate::net::{ConnectionId, NetError, Reactor};
use crate::peer::{PeerId, PeerIdentity};
use crate::torrent::{InfoHash, TorrentCoordinator, TorrentError};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A BitTorrent client sharing any number of torrents.
///
/// Owns a [`Reactor`] for the peer connections, the
/// [`ConnectionRegistry`] listening on it, and a control thread that runs
/// the choke pass of every active torrent once per tick.
pub struct Client {
    config: ClientConfig,
    peer_id: PeerId,
    reactor: Arc<Reactor>,
    registry: Arc<ConnectionRegistry>,
    torrents: Arc<DashMap<InfoHash, Arc<TorrentCoordinator>>>,
    announcer: Arc<dyn Announcer>,
    control: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
    stopped: AtomicBool,
}

impl Client {
    /// Starts listening and runs the control loop.
    pub fn start(config: ClientConfig, announcer: Arc<dyn Announcer>) -> Result<Self, ClientError> {
        config.validate()?;

        let peer_id = PeerId::generate();
        let reactor = Arc::new(Reactor::start(&config)?);
        let torrents = Arc::new(DashMap::new());
        let registry = Arc::new(ConnectionRegistry::new(
            peer_id,
            torrents.clone(),
            reactor.clone(),
        ));
        reactor.add_listener(registry.clone());

        let (stop_tx, stop_rx) = channel::bounded(0);
        let control = ControlLoop {
            torrents: torrents.clone(),
            schedule: ControlSchedule::from_config(&config),
            tick: config.tick,
            stop: stop_rx,
        };
        let handle = thread::Builder::new()
            .name("swarmlink-control".into())
            .spawn(move || control.run())
            .map_err(NetError::from)?;

        info!(peer_id = %peer_id, local_addr = %reactor.local_addr(), "client started");

        Ok(Self {
            config,
            peer_id,
            reactor,
            registry,
            torrents,
            announcer,
            control: Mutex::new(Some((stop_tx, handle))),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.reactor.local_addr()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Adds a torrent. It takes part in the control loop once it is
    /// started with [`share`](Self::share) or [`download`](Self::download).
    pub fn add_torrent(&self, torrent: Arc<TorrentCoordinator>) -> Result<(), ClientError> {
        let info_hash = torrent.info_hash();
        match self.torrents.entry(info_hash) {
            Entry::Occupied(_) => return Err(ClientError::DuplicateTorrent(info_hash)),
            Entry::Vacant(entry) => {
                torrent.set_server_mode(self.config.server);
                torrent.add_observer(Arc::new(CompletionAnnounce::new(self.announcer.clone())));
                entry.insert(torrent.clone());
            }
        }
        self.announcer.add_torrent(&torrent);
        info!(torrent = %info_hash, pieces = torrent.piece_count(), "torrent added");
        Ok(())
    }

    pub fn torrent(&self, info_hash_hex: &str) -> Result<Arc<TorrentCoordinator>, ClientError> {
        let info_hash = InfoHash::from_hex(info_hash_hex)?;
        self.torrents
            .get(&info_hash)
            .map(|t| t.value().clone())
            .ok_or(ClientError::UnknownTorrent(info_hash))
    }

    pub fn torrents(&self) -> Vec<Arc<TorrentCoordinator>> {
        self.torrents.iter().map(|t| t.value().clone()).collect()
    }

    /// Starts sharing a torrent and seeds it without a time limit.
    pub fn share(&self, info_hash_hex: &str) -> Result<Arc<TorrentCoordinator>, ClientError> {
        let torrent = self.torrent(info_hash_hex)?;
        torrent.share()?;
        Ok(torrent)
    }

    /// Starts sharing a torrent and seeds it for `duration` once complete.
    pub fn share_for(
        &self,
        info_hash_hex: &str,
        duration: Duration,
    ) -> Result<Arc<TorrentCoordinator>, ClientError> {
        let torrent = self.torrent(info_hash_hex)?;
        torrent.share_for(duration)?;
        Ok(torrent)
    }

    /// Starts a torrent that stops as soon as it is complete.
    pub fn download(&self, info_hash_hex: &str) -> Result<Arc<TorrentCoordinator>, ClientError> {
        let torrent = self.torrent(info_hash_hex)?;
        torrent.download()?;
        Ok(torrent)
    }

    /// Dials `addr` for the torrent `info_hash`.
    pub fn connect(&self, addr: SocketAddr, info_hash: InfoHash) -> Result<ConnectionId, ClientError> {
        if !self.torrents.contains_key(&info_hash) {
            return Err(ClientError::UnknownTorrent(info_hash));
        }
        Ok(self.reactor.connect(addr, info_hash)?)
    }

    /// Dials the peers a tracker reported for `info_hash`. Returns how many
    /// connections were started.
    ///
    /// Peers already connected are skipped. A complete torrent only dials
    /// while it has fewer than the configured number of connected peers.
    pub fn handle_discovered_peers(&self, peers: &[PeerIdentity], info_hash: &InfoHash) -> usize {
        let Some(torrent) = self.torrents.get(info_hash).map(|t| t.value().clone()) else {
            debug!(torrent = %info_hash, "peers for unknown torrent");
            return 0;
        };
        if !torrent.state().is_active() {
            return 0;
        }

        let mut dialled = 0;
        for identity in peers {
            if torrent.is_complete()
                && torrent.connected_count() + dialled >= self.config.voluntary_outbound
            {
                debug!(torrent = %info_hash, "enough peers for a complete torrent");
                break;
            }
            if identity.peer_id == Some(self.peer_id) || identity.addr == self.local_addr() {
                continue;
            }

            let peer = torrent.get_or_create_peer(identity.addr, identity.peer_id);
            if peer.is_connected() {
                continue;
            }
            match self.reactor.connect(identity.addr, *info_hash) {
                Ok(conn) => {
                    debug!(torrent = %info_hash, peer = %identity, conn = %conn, "dialling peer");
                    dialled += 1;
                }
                Err(e) => warn!(torrent = %info_hash, peer = %identity, error = %e, "failed to dial peer"),
            }
        }
        dialled
    }

    /// Stops the control loop and every torrent, then the reactor.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some((stop, handle)) = self.control.lock().take() {
            drop(stop);
            if handle.join().is_err() {
                error!("control loop panicked");
            }
        }

        for torrent in self.torrents() {
            torrent.stop();
            self.announcer.stop(&torrent.info_hash());
        }

        self.reactor.shutdown();
        info!(peer_id = %self.peer_id, "client stopped");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ControlLoop {
    torrents: Arc<DashMap<InfoHash, Arc<TorrentCoordinator>>>,
    schedule: ControlSchedule,
    tick: Duration,
    stop: Receiver<()>,
}

impl ControlLoop {
    fn run(mut self) {
        debug!(tick = ?self.tick, "control loop started");

        while let Err(RecvTimeoutError::Timeout) = self.stop.recv_timeout(self.tick) {
            let tick = self.schedule.next();
            let active: Vec<_> = self
                .torrents
                .iter()
                .map(|t| t.value().clone())
                .filter(|t| t.state().is_active())
                .collect();
            for torrent in active {
                run_pass(&torrent, tick);
            }
        }

        for torrent in self.torrents.iter() {
            torrent.disconnect_all();
        }
        debug!("control loop exited");
    }
}

fn run_pass(torrent: &TorrentCoordinator, tick: Tick) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), TorrentError> {
        torrent.unchoke_peers(tick.optimistic)?;

        let info = torrent.info();
        debug!(
            torrent = %info.info_hash,
            state = %info.state,
            connected = info.connected_peers,
            known = info.known_peers,
            completion = info.completion,
            download_rate = info.download_rate,
            upload_rate = info.upload_rate,
            "torrent status"
        );

        if tick.reset_rates {
            torrent.reset_peer_rates();
        }
        Ok(())
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(torrent = %torrent.info_hash(), error = %e, "control pass failed"),
        Err(_) => error!(torrent = %torrent.info_hash(), "control pass panicked"),
    }
}
