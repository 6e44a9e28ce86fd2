use super::choking::{Candidate, ChokingAlgorithm, OptimisticPicker, RandomPicker, RankBy};
use super::{
    BlockOutcome, InfoHash, PieceStore, SeedPolicy, TorrentError, TorrentObserver, TorrentState,
};
use crate::config::ChokingConfig;
use crate::constants::{BLOCK_SIZE, DEFAULT_ANNOUNCES};
use crate::net::{ConnectionId, NetError, Transport};
use crate::peer::{Bitfield, PeerId, SharingPeer};
use crate::wire::{Message, MAX_FRAME_PAYLOAD};
use bytes::Bytes;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use rand::Rng as _;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Type byte plus index and offset in front of a piece block.
const PIECE_HEADER_LEN: usize = 9;

/// Point-in-time statistics of one torrent.
#[derive(Debug, Clone)]
pub struct TorrentInfo {
    pub info_hash: InfoHash,
    pub state: TorrentState,
    pub known_peers: usize,
    pub connected_peers: usize,
    pub completion: f64,
    pub download_rate: f64,
    pub upload_rate: f64,
    pub uploaded: u64,
    pub downloaded: u64,
    pub left: u64,
}

#[derive(Default)]
struct PeerRegistry {
    by_host: HashMap<SocketAddr, Arc<SharingPeer>>,
    by_id: HashMap<PeerId, Arc<SharingPeer>>,
    connected: HashMap<SocketAddr, Arc<SharingPeer>>,
}

struct PendingRequest {
    peer: Arc<SharingPeer>,
    at: Instant,
}

/// Which pieces are in flight and how common each piece is among peers.
struct PieceBook {
    requested: Bitfield,
    pending: HashMap<u32, PendingRequest>,
    availability: Vec<u32>,
}

/// Coordinates the peers of one torrent.
///
/// Lock order is `book`, then `peers`, then a peer's own state; a scheduler
/// pass additionally holds `scheduler` for its whole duration so passes of
/// the same torrent never interleave.
pub struct TorrentCoordinator {
    info_hash: InfoHash,
    me: Weak<TorrentCoordinator>,
    store: Arc<dyn PieceStore>,
    piece_count: usize,
    piece_timeout: Duration,
    choking: ChokingAlgorithm,
    picker: Box<dyn OptimisticPicker>,
    server: AtomicBool,
    state: RwLock<TorrentState>,
    seed_policy: Mutex<SeedPolicy>,
    seed_timer: Mutex<Option<Sender<()>>>,
    observers: RwLock<Vec<Arc<dyn TorrentObserver>>>,
    peers: Mutex<PeerRegistry>,
    book: Mutex<PieceBook>,
    scheduler: Mutex<()>,
    announces: AtomicU32,
    uploaded: AtomicU64,
    downloaded: AtomicU64,
}

impl TorrentCoordinator {
    pub fn new(
        info_hash: InfoHash,
        store: Arc<dyn PieceStore>,
        config: &ChokingConfig,
    ) -> Arc<Self> {
        Self::with_picker(info_hash, store, config, Box::new(RandomPicker))
    }

    /// Like [`new`](Self::new) with a custom optimistic unchoke picker.
    pub fn with_picker(
        info_hash: InfoHash,
        store: Arc<dyn PieceStore>,
        config: &ChokingConfig,
        picker: Box<dyn OptimisticPicker>,
    ) -> Arc<Self> {
        let piece_count = store.piece_count() as usize;
        Arc::new_cyclic(|me| Self {
            info_hash,
            me: me.clone(),
            store,
            piece_count,
            piece_timeout: config.piece_timeout,
            choking: ChokingAlgorithm::new(config),
            picker,
            server: AtomicBool::new(false),
            state: RwLock::new(TorrentState::Validating),
            seed_policy: Mutex::new(SeedPolicy::Forever),
            seed_timer: Mutex::new(None),
            observers: RwLock::new(Vec::new()),
            peers: Mutex::new(PeerRegistry::default()),
            book: Mutex::new(PieceBook {
                requested: Bitfield::new(piece_count),
                pending: HashMap::new(),
                availability: vec![0; piece_count],
            }),
            scheduler: Mutex::new(()),
            announces: AtomicU32::new(DEFAULT_ANNOUNCES),
            uploaded: AtomicU64::new(0),
            downloaded: AtomicU64::new(0),
        })
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn state(&self) -> TorrentState {
        *self.state.read()
    }

    pub fn piece_count(&self) -> usize {
        self.piece_count
    }

    pub fn store(&self) -> &Arc<dyn PieceStore> {
        &self.store
    }

    /// In server mode every bitfield and HAVE is followed by a
    /// server-completion message.
    pub fn set_server_mode(&self, server: bool) {
        self.server.store(server, Ordering::Relaxed);
    }

    pub fn is_server_mode(&self) -> bool {
        self.server.load(Ordering::Relaxed)
    }

    pub fn add_observer(&self, observer: Arc<dyn TorrentObserver>) {
        self.observers.write().push(observer);
    }

    fn observers(&self) -> Vec<Arc<dyn TorrentObserver>> {
        self.observers.read().clone()
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Validates local data and starts sharing, or seeding if the data is
    /// already complete. Any store failure is terminal.
    pub fn initialize(&self) -> Result<(), TorrentError> {
        let state = self.state();
        if state != TorrentState::Validating {
            return Err(TorrentError::InvalidState {
                state,
                operation: "initialize",
            });
        }

        if let Err(e) = self.store.initialize() {
            error!(torrent = %self.info_hash, error = %e, "initialization failed");
            self.transition(TorrentState::Error);
            self.disconnect_all();
            return Err(e.into());
        }

        info!(
            torrent = %self.info_hash,
            completed = self.store.completed_pieces().count(),
            pieces = self.piece_count,
            "local data validated"
        );

        if self.store.is_complete() {
            self.enter_seeding();
        } else {
            self.transition(TorrentState::Sharing);
        }
        Ok(())
    }

    /// Starts the torrent and seeds without a time limit.
    pub fn share(&self) -> Result<(), TorrentError> {
        self.start(SeedPolicy::Forever)
    }

    /// Starts the torrent and seeds for `duration` once complete.
    pub fn share_for(&self, duration: Duration) -> Result<(), TorrentError> {
        self.start(SeedPolicy::For(duration))
    }

    /// Starts the torrent and stops as soon as the download completes.
    pub fn download(&self) -> Result<(), TorrentError> {
        self.start(SeedPolicy::None)
    }

    fn start(&self, policy: SeedPolicy) -> Result<(), TorrentError> {
        *self.seed_policy.lock() = policy;
        self.initialize()
    }

    /// Stops the torrent and disconnects all of its peers.
    pub fn stop(&self) {
        self.cancel_seed_timer();
        if self.transition(TorrentState::Stopped) {
            self.disconnect_all();
        }
    }

    fn enter_seeding(&self) {
        if !self.transition(TorrentState::Seeding) {
            return;
        }
        let policy = *self.seed_policy.lock();
        match policy {
            SeedPolicy::Forever => {}
            SeedPolicy::None => {
                info!(torrent = %self.info_hash, "no seeding requested, stopping");
                self.stop();
            }
            SeedPolicy::For(duration) => self.schedule_stop(duration),
        }
    }

    /// Moves to `next` and notifies observers. Returns `false` when already
    /// there or when the current state is terminal.
    fn transition(&self, next: TorrentState) -> bool {
        let previous = {
            let mut state = self.state.write();
            let current = *state;
            if current == next || matches!(current, TorrentState::Error | TorrentState::Stopped) {
                return false;
            }
            *state = next;
            current
        };

        if previous == TorrentState::Seeding {
            self.cancel_seed_timer();
        }

        info!(torrent = %self.info_hash, from = %previous, to = %next, "state change");
        for observer in self.observers() {
            observer.on_state_change(self, next);
        }
        true
    }

    fn schedule_stop(&self, after: Duration) {
        let (tx, rx) = channel::bounded::<()>(0);
        *self.seed_timer.lock() = Some(tx);

        let torrent = self.me.clone();
        let info_hash = self.info_hash;
        let spawned = thread::Builder::new()
            .name("swarmlink-seed-timer".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(after) {
                    if let Some(torrent) = torrent.upgrade() {
                        info!(torrent = %info_hash, "seed period elapsed");
                        torrent.stop();
                    }
                }
            });

        match spawned {
            Ok(_) => debug!(torrent = %self.info_hash, ?after, "seeding for a limited time"),
            Err(e) => {
                warn!(torrent = %self.info_hash, error = %e, "failed to start seed timer, stopping now");
                self.stop();
            }
        }
    }

    fn cancel_seed_timer(&self) {
        // Dropping the sender wakes the timer thread without firing.
        self.seed_timer.lock().take();
    }

    // ------------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------------

    /// Returns the one peer known under `addr` or `peer_id`, creating it if
    /// neither key is known yet. Learning a peer ID for a host-only peer
    /// re-indexes that same peer under the ID.
    pub fn get_or_create_peer(&self, addr: SocketAddr, peer_id: Option<PeerId>) -> Arc<SharingPeer> {
        let mut peers = self.peers.lock();

        if let Some(id) = peer_id {
            if let Some(peer) = peers.by_id.get(&id).cloned() {
                let host_free = peers
                    .by_host
                    .get(&addr)
                    .map_or(true, |other| Arc::ptr_eq(other, &peer));
                if host_free {
                    peers.by_host.insert(addr, peer.clone());
                }
                return peer;
            }
        }

        if let Some(peer) = peers.by_host.get(&addr).cloned() {
            if let Some(id) = peer_id {
                if let Some(stale) = peer.set_peer_id(id) {
                    if peers.by_id.get(&stale).is_some_and(|p| Arc::ptr_eq(p, &peer)) {
                        peers.by_id.remove(&stale);
                    }
                }
                peers.by_id.insert(id, peer.clone());
            }
            return peer;
        }

        let peer = Arc::new(SharingPeer::new(
            addr,
            peer_id,
            self.info_hash,
            self.piece_count,
            self.me.clone(),
        ));
        peers.by_host.insert(addr, peer.clone());
        if let Some(id) = peer_id {
            peers.by_id.insert(id, peer.clone());
        }
        debug!(torrent = %self.info_hash, peer = %peer, "new peer");
        peer
    }

    pub fn peer_by_host(&self, addr: SocketAddr) -> Option<Arc<SharingPeer>> {
        self.peers.lock().by_host.get(&addr).cloned()
    }

    pub fn peer_by_id(&self, peer_id: &PeerId) -> Option<Arc<SharingPeer>> {
        self.peers.lock().by_id.get(peer_id).cloned()
    }

    /// Every distinct known peer.
    pub fn peers(&self) -> Vec<Arc<SharingPeer>> {
        let peers = self.peers.lock();
        let mut seen = HashSet::new();
        peers
            .by_host
            .values()
            .chain(peers.by_id.values())
            .filter(|p| seen.insert(Arc::as_ptr(p)))
            .cloned()
            .collect()
    }

    pub fn connected_peers(&self) -> Vec<Arc<SharingPeer>> {
        self.peers.lock().connected.values().cloned().collect()
    }

    pub fn connected_count(&self) -> usize {
        self.peers.lock().connected.len()
    }

    /// Binds `peer` to a handshaken connection and marks it connected.
    pub fn bind_peer(&self, peer: &Arc<SharingPeer>, conn: ConnectionId, transport: Arc<dyn Transport>) {
        {
            let mut book = self.book.lock();
            Self::release_request(&mut book, peer);
            Self::forget_availability(&mut book, peer);
            peer.bind(conn, transport);
        }
        self.peers
            .lock()
            .connected
            .insert(peer.addr(), peer.clone());
        info!(torrent = %self.info_hash, peer = %peer, conn = %conn, "peer connected");
    }

    /// Releases the peer's outstanding request, forgets its availability and
    /// unbinds it.
    pub fn handle_peer_disconnected(&self, peer: &Arc<SharingPeer>) {
        let conn = {
            let mut book = self.book.lock();
            Self::release_request(&mut book, peer);
            Self::forget_availability(&mut book, peer);
            peer.unbind()
        };

        {
            let mut peers = self.peers.lock();
            if peers
                .connected
                .get(&peer.addr())
                .is_some_and(|p| Arc::ptr_eq(p, peer))
            {
                peers.connected.remove(&peer.addr());
            }
        }

        if let Some(conn) = conn {
            info!(torrent = %self.info_hash, peer = %peer, conn = %conn, "peer disconnected");
        }
    }

    pub fn disconnect_all(&self) {
        for peer in self.connected_peers() {
            self.handle_peer_disconnected(&peer);
        }
    }

    fn release_request(book: &mut PieceBook, peer: &Arc<SharingPeer>) {
        if let Some(piece) = peer.take_requested() {
            book.requested.clear_piece(piece as usize);
            if book
                .pending
                .get(&piece)
                .is_some_and(|r| Arc::ptr_eq(&r.peer, peer))
            {
                book.pending.remove(&piece);
            }
            debug!(piece, peer = %peer, "released piece request");
        }
    }

    fn forget_availability(book: &mut PieceBook, peer: &SharingPeer) {
        for index in peer.available().iter_set() {
            if let Some(count) = book.availability.get_mut(index) {
                *count = count.saturating_sub(1);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------------

    /// Applies one message received from a bound peer.
    ///
    /// An error means the peer violated the protocol and its connection
    /// should be closed.
    pub fn handle_message(&self, peer: &Arc<SharingPeer>, message: Message) -> Result<(), TorrentError> {
        trace!(torrent = %self.info_hash, peer = %peer, kind = message.kind(), "message");

        match message {
            Message::KeepAlive => {}
            Message::Choke => {
                peer.set_choked(true);
                // A choking peer drops our pending requests.
                let mut book = self.book.lock();
                Self::release_request(&mut book, peer);
            }
            Message::Unchoke => {
                peer.set_choked(false);
                self.handle_peer_ready(peer);
            }
            Message::Interested => peer.set_interested(true),
            Message::NotInterested => peer.set_interested(false),
            Message::Have { piece } => {
                if piece as usize >= self.piece_count {
                    return Err(TorrentError::InvalidPiece(piece));
                }
                {
                    let mut book = self.book.lock();
                    if peer.mark_available(piece) {
                        book.availability[piece as usize] += 1;
                    }
                }
                if !self.store.completed_pieces().has_piece(piece as usize) {
                    quietly(peer, peer.set_interesting(true));
                }
                self.handle_peer_ready(peer);
            }
            Message::Bitfield(bits) => {
                let available = Bitfield::from_bytes(&bits, self.piece_count);
                {
                    let mut book = self.book.lock();
                    Self::forget_availability(&mut book, peer);
                    for index in available.iter_set() {
                        book.availability[index] += 1;
                    }
                    peer.set_available(available.clone());
                }
                let wanted = available.has_any_missing_from(&self.store.completed_pieces());
                quietly(peer, peer.set_interesting(wanted));
                self.handle_peer_ready(peer);
            }
            Message::Request {
                index,
                begin,
                length,
            } => self.serve_request(peer, index, begin, length)?,
            Message::Piece { index, begin, data } => self.receive_block(peer, index, begin, data)?,
            Message::Cancel { index, begin, .. } => {
                // Requests are answered as soon as they arrive.
                trace!(peer = %peer, index, begin, "cancel after block was sent");
            }
            Message::ServerCompletion(percent) => peer.set_server_completion(percent),
        }
        Ok(())
    }

    fn serve_request(
        &self,
        peer: &Arc<SharingPeer>,
        index: u32,
        begin: u32,
        length: u32,
    ) -> Result<(), TorrentError> {
        if peer.is_choking() {
            debug!(peer = %peer, index, "ignoring request from choked peer");
            return Ok(());
        }
        if index as usize >= self.piece_count || !self.store.completed_pieces().has_piece(index as usize) {
            warn!(peer = %peer, index, "peer requested a piece we do not have");
            return Err(TorrentError::InvalidPiece(index));
        }
        if length as usize > MAX_FRAME_PAYLOAD - PIECE_HEADER_LEN {
            return Err(TorrentError::BlockTooLarge(length));
        }

        let data = self.store.read_block(index, begin, length)?;
        self.uploaded.fetch_add(data.len() as u64, Ordering::Relaxed);
        quietly(peer, peer.send(&Message::Piece { index, begin, data }));
        Ok(())
    }

    fn receive_block(
        &self,
        peer: &Arc<SharingPeer>,
        index: u32,
        begin: u32,
        data: Bytes,
    ) -> Result<(), TorrentError> {
        let expected = self
            .book
            .lock()
            .pending
            .get(&index)
            .is_some_and(|r| Arc::ptr_eq(&r.peer, peer));
        if !expected {
            debug!(peer = %peer, index, begin, "dropping unrequested block");
            return Ok(());
        }

        peer.record_download(data.len() as u64);
        self.downloaded.fetch_add(data.len() as u64, Ordering::Relaxed);

        match self.store.write_block(index, begin, &data)? {
            BlockOutcome::Partial => {}
            BlockOutcome::PieceComplete { valid } => self.handle_piece_completed(peer, index, valid),
        }
        Ok(())
    }

    /// Records the outcome of a fully received piece.
    ///
    /// A valid piece is marked complete and announced to every connected
    /// peer; completing the last piece moves the torrent to seeding. Either
    /// way the peer is asked for another piece.
    pub fn handle_piece_completed(&self, peer: &Arc<SharingPeer>, index: u32, valid: bool) {
        {
            let mut book = self.book.lock();
            book.requested.clear_piece(index as usize);
            book.pending.remove(&index);
            peer.release_requested(index);
        }

        if valid {
            self.store.mark_completed(index);
            debug!(
                torrent = %self.info_hash,
                piece = index,
                completion = self.store.completion(),
                "piece completed"
            );
            self.broadcast_have(index);
            for observer in self.observers() {
                observer.on_piece_completed(self, index);
            }
            self.refresh_interest();

            if self.store.is_complete() && self.state() == TorrentState::Sharing {
                info!(torrent = %self.info_hash, "download complete");
                for observer in self.observers() {
                    observer.on_download_complete(self);
                }
                self.enter_seeding();
            }
        } else {
            warn!(torrent = %self.info_hash, peer = %peer, piece = index, "piece failed hash check");
        }

        self.handle_peer_ready(peer);
    }

    fn broadcast_have(&self, index: u32) {
        let server = self.is_server_mode();
        let percent = self.completion_percent();
        for peer in self.connected_peers() {
            quietly(&peer, peer.send(&Message::Have { piece: index }));
            if server {
                quietly(&peer, peer.send(&Message::ServerCompletion(percent)));
            }
        }
    }

    /// Withdraws interest from peers that no longer have anything we lack.
    fn refresh_interest(&self) {
        let completed = self.store.completed_pieces();
        for peer in self.connected_peers() {
            if peer.is_interesting() && !peer.available().has_any_missing_from(&completed) {
                quietly(&peer, peer.set_interesting(false));
            }
        }
    }

    /// Requests a new piece from `peer` if it can serve one.
    ///
    /// Picks, rarest first, a piece the peer has that we neither have nor
    /// already requested, and asks for it block by block.
    pub fn handle_peer_ready(&self, peer: &Arc<SharingPeer>) {
        if self.state() != TorrentState::Sharing
            || !peer.is_connected()
            || peer.is_choked()
            || peer.requested().is_some()
        {
            return;
        }

        let completed = self.store.completed_pieces();
        let available = peer.available();

        let piece = {
            let mut book = self.book.lock();
            if peer.requested().is_some() {
                return;
            }
            match Self::pick_piece(&book, &available, &completed) {
                Some(piece) => {
                    book.requested.set_piece(piece as usize);
                    book.pending.insert(
                        piece,
                        PendingRequest {
                            peer: peer.clone(),
                            at: Instant::now(),
                        },
                    );
                    peer.set_requested(Some(piece));
                    piece
                }
                None => {
                    drop(book);
                    if !available.has_any_missing_from(&completed) {
                        quietly(peer, peer.set_interesting(false));
                    }
                    return;
                }
            }
        };

        quietly(peer, peer.set_interesting(true));
        let length = self.store.piece_length(piece);
        debug!(torrent = %self.info_hash, peer = %peer, piece, length, "requesting piece");
        for begin in (0..length).step_by(BLOCK_SIZE as usize) {
            let request = Message::Request {
                index: piece,
                begin,
                length: BLOCK_SIZE.min(length - begin),
            };
            if let Err(e) = peer.send(&request) {
                debug!(peer = %peer, error = %e, "failed to send request");
                break;
            }
        }
    }

    fn pick_piece(book: &PieceBook, available: &Bitfield, completed: &Bitfield) -> Option<u32> {
        let candidates: Vec<usize> = available
            .iter_set()
            .filter(|&i| !completed.has_piece(i) && !book.requested.has_piece(i))
            .collect();
        let rarest = candidates.iter().map(|&i| book.availability[i]).min()?;
        let rarest: Vec<usize> = candidates
            .into_iter()
            .filter(|&i| book.availability[i] == rarest)
            .collect();
        let pick = rarest[rand::rng().random_range(0..rarest.len())];
        Some(pick as u32)
    }

    // ------------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------------

    /// Runs one choke/unchoke pass, then releases timed-out requests.
    ///
    /// Fails with [`TorrentError::InvalidState`] unless the torrent is
    /// sharing or seeding.
    pub fn unchoke_peers(&self, optimistic: bool) -> Result<(), TorrentError> {
        let _pass = self.scheduler.lock();
        let rank = RankBy::for_state(self.state())?;

        let peers = self.connected_peers();
        if !peers.is_empty() {
            let candidates: Vec<Candidate> = peers
                .iter()
                .map(|p| Candidate {
                    download_rate: p.download_rate(),
                    upload_rate: p.upload_rate(),
                    choking: p.is_choking(),
                    interested: p.is_interested(),
                })
                .collect();

            let plan = self
                .choking
                .plan(&candidates, rank, optimistic, self.picker.as_ref());

            for &i in &plan.unchoke {
                quietly(&peers[i], peers[i].unchoke());
            }
            if let Some(i) = plan.optimistic {
                debug!(torrent = %self.info_hash, peer = %peers[i], "optimistic unchoke");
                quietly(&peers[i], peers[i].unchoke());
            }
            for &i in &plan.choke {
                quietly(&peers[i], peers[i].choke());
            }
            debug!(
                torrent = %self.info_hash,
                peers = peers.len(),
                unchoked = plan.unchoke.len(),
                choked = plan.choke.len(),
                optimistic,
                "choke pass"
            );
        }

        self.expire_requests(Instant::now());
        Ok(())
    }

    /// Releases every piece request older than the piece timeout at `now`
    /// and lets the still-connected requesters pick again. Returns how many
    /// requests were released.
    pub fn expire_requests(&self, now: Instant) -> usize {
        let released: Vec<Arc<SharingPeer>> = {
            let mut book = self.book.lock();
            let expired: Vec<u32> = book
                .pending
                .iter()
                .filter(|(_, r)| now.saturating_duration_since(r.at) >= self.piece_timeout)
                .map(|(&piece, _)| piece)
                .collect();

            expired
                .into_iter()
                .filter_map(|piece| {
                    let request = book.pending.remove(&piece)?;
                    book.requested.clear_piece(piece as usize);
                    request.peer.release_requested(piece);
                    warn!(torrent = %self.info_hash, peer = %request.peer, piece, "piece request timed out");
                    Some(request.peer)
                })
                .collect()
        };

        let count = released.len();
        for peer in released {
            if peer.is_connected() {
                self.handle_peer_ready(&peer);
            }
        }
        count
    }

    pub fn reset_peer_rates(&self) {
        for peer in self.connected_peers() {
            peer.reset_rates();
        }
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Aggregate download and upload rates of the connected peers, in bytes
    /// per second.
    pub fn rates(&self) -> (f64, f64) {
        self.connected_peers()
            .iter()
            .fold((0.0, 0.0), |(down, up), p| {
                (down + p.download_rate(), up + p.upload_rate())
            })
    }

    pub fn completed_pieces(&self) -> Bitfield {
        self.store.completed_pieces()
    }

    pub fn requested_pieces(&self) -> Bitfield {
        self.book.lock().requested.clone()
    }

    pub fn is_requested(&self, index: u32) -> bool {
        self.book.lock().pending.contains_key(&index)
    }

    pub fn is_complete(&self) -> bool {
        self.store.is_complete()
    }

    pub fn completion(&self) -> f64 {
        self.store.completion()
    }

    pub fn completion_percent(&self) -> u8 {
        self.store.completion().round().clamp(0.0, 100.0) as u8
    }

    pub fn uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn left(&self) -> u64 {
        self.store.left()
    }

    pub fn remaining_announces(&self) -> u32 {
        self.announces.load(Ordering::Relaxed)
    }

    pub fn set_announces(&self, announces: u32) {
        self.announces.store(announces, Ordering::Relaxed);
    }

    /// Consumes one announce from the budget; `false` once it is spent.
    pub fn take_announce(&self) -> bool {
        self.announces
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn info(&self) -> TorrentInfo {
        let (download_rate, upload_rate) = self.rates();
        TorrentInfo {
            info_hash: self.info_hash,
            state: self.state(),
            known_peers: self.peers().len(),
            connected_peers: self.connected_count(),
            completion: self.completion(),
            download_rate,
            upload_rate,
            uploaded: self.uploaded(),
            downloaded: self.downloaded(),
            left: self.left(),
        }
    }
}

impl std::fmt::Debug for TorrentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentCoordinator")
            .field("info_hash", &self.info_hash)
            .field("state", &self.state())
            .finish()
    }
}

fn quietly(peer: &SharingPeer, result: Result<(), NetError>) {
    if let Err(e) = result {
        debug!(peer = %peer, error = %e, "send failed");
    }
}
