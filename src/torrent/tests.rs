use super::*;
use crate::config::ChokingConfig;
use crate::net::testing::RecordingTransport;
use crate::net::ConnectionId;
use crate::peer::{PeerId, SharingPeer};
use crate::wire::Message;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const PIECE: u32 = 16 * 1024;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([10, 0, 0, 2], port))
}

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn seeder(data: Vec<u8>) -> Arc<TorrentCoordinator> {
    let store = Arc::new(MemoryPieceStore::seeded(data, PIECE));
    let torrent = TorrentCoordinator::new(InfoHash::new([1; 20]), store, &ChokingConfig::default());
    torrent.share().unwrap();
    torrent
}

fn leecher_with(data: &[u8], config: &ChokingConfig, picker: Box<dyn OptimisticPicker>) -> Arc<TorrentCoordinator> {
    let hashes = MemoryPieceStore::seeded(data.to_vec(), PIECE).piece_hashes();
    let store = Arc::new(MemoryPieceStore::empty(data.len() as u64, PIECE, hashes));
    let torrent = TorrentCoordinator::with_picker(InfoHash::new([2; 20]), store, config, picker);
    torrent.share().unwrap();
    torrent
}

fn leecher(data: &[u8]) -> Arc<TorrentCoordinator> {
    leecher_with(data, &ChokingConfig::default(), Box::new(RandomPicker))
}

fn connect(
    torrent: &TorrentCoordinator,
    transport: &Arc<RecordingTransport>,
    port: u16,
) -> (Arc<SharingPeer>, ConnectionId) {
    let conn = ConnectionId::new(port as usize);
    let peer = torrent.get_or_create_peer(addr(port), Some(PeerId([port as u8; 20])));
    torrent.bind_peer(&peer, conn, transport.clone());
    (peer, conn)
}

fn requests(transport: &RecordingTransport, conn: ConnectionId) -> Vec<(u32, u32, u32)> {
    transport
        .messages(conn)
        .into_iter()
        .filter_map(|m| match m {
            Message::Request {
                index,
                begin,
                length,
            } => Some((index, begin, length)),
            _ => None,
        })
        .collect()
}

struct FixedPicker(usize);

impl OptimisticPicker for FixedPicker {
    fn pick(&self, _len: usize) -> usize {
        self.0
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl TorrentObserver for Recorder {
    fn on_state_change(&self, _torrent: &TorrentCoordinator, state: TorrentState) {
        self.0.lock().push(format!("state {state}"));
    }

    fn on_piece_completed(&self, _torrent: &TorrentCoordinator, piece: u32) {
        self.0.lock().push(format!("piece {piece}"));
    }

    fn on_download_complete(&self, _torrent: &TorrentCoordinator) {
        self.0.lock().push("complete".into());
    }
}

// ============================================================================
// Choking
// ============================================================================

#[test]
fn test_rank_by_state() {
    assert_eq!(RankBy::for_state(TorrentState::Sharing).unwrap(), RankBy::Download);
    assert_eq!(RankBy::for_state(TorrentState::Seeding).unwrap(), RankBy::Upload);
    for state in [TorrentState::Validating, TorrentState::Error, TorrentState::Stopped] {
        assert!(matches!(
            RankBy::for_state(state),
            Err(TorrentError::InvalidState { .. })
        ));
    }
}

#[test]
fn test_plan_keeps_fastest_interested() {
    let algorithm = ChokingAlgorithm::new(&ChokingConfig {
        max_unchoked: 1,
        ..ChokingConfig::default()
    });
    let candidates = [
        Candidate {
            download_rate: 0.0,
            choking: true,
            interested: true,
            ..Candidate::default()
        },
        Candidate {
            download_rate: 100.0,
            choking: true,
            interested: true,
            ..Candidate::default()
        },
    ];

    let plan = algorithm.plan(&candidates, RankBy::Download, false, &RandomPicker);
    assert_eq!(plan.unchoke, vec![1]);
    assert_eq!(plan.choke, vec![0]);
    assert_eq!(plan.optimistic, None);

    let plan = algorithm.plan(&candidates, RankBy::Download, true, &FixedPicker(0));
    assert!(plan.choke.is_empty());
    assert_eq!(plan.optimistic, Some(0));
}

#[test]
fn test_plan_uninterested_peers_do_not_use_slots() {
    let algorithm = ChokingAlgorithm::new(&ChokingConfig {
        max_unchoked: 1,
        ..ChokingConfig::default()
    });
    let candidates = [
        Candidate {
            upload_rate: 50.0,
            choking: true,
            interested: false,
            ..Candidate::default()
        },
        Candidate {
            upload_rate: 10.0,
            choking: true,
            interested: true,
            ..Candidate::default()
        },
        Candidate {
            upload_rate: 5.0,
            choking: false,
            interested: true,
            ..Candidate::default()
        },
    ];

    let plan = algorithm.plan(&candidates, RankBy::Upload, false, &RandomPicker);
    assert_eq!(plan.unchoke, vec![0, 1]);
    assert_eq!(plan.choke, vec![2]);
}

#[test]
fn test_plan_never_exceeds_cap() {
    let mut rng = rand::rng();
    for _ in 0..200 {
        let max_unchoked = rng.random_range(1..6);
        let algorithm = ChokingAlgorithm::new(&ChokingConfig {
            max_unchoked,
            ..ChokingConfig::default()
        });
        let candidates: Vec<Candidate> = (0..rng.random_range(0..20))
            .map(|_| Candidate {
                download_rate: rng.random_range(0.0..1000.0),
                upload_rate: rng.random_range(0.0..1000.0),
                choking: rng.random_bool(0.5),
                interested: rng.random_bool(0.5),
            })
            .collect();
        let optimistic = rng.random_bool(0.5);

        let plan = algorithm.plan(&candidates, RankBy::Download, optimistic, &RandomPicker);

        let kept_interested = (0..candidates.len())
            .filter(|i| !plan.choke.contains(i) && plan.optimistic != Some(*i))
            .filter(|&i| candidates[i].interested)
            .count();
        assert!(kept_interested <= max_unchoked);
        for i in &plan.unchoke {
            assert!(candidates[*i].choking);
            assert!(!plan.choke.contains(i));
        }
        if let Some(i) = plan.optimistic {
            assert!(!plan.choke.contains(&i));
        }
    }
}

#[test]
fn test_unchoke_peers_optimistic_exemption() {
    let data = content(40_000);
    let config = ChokingConfig {
        max_unchoked: 1,
        ..ChokingConfig::default()
    };
    let torrent = leecher_with(&data, &config, Box::new(FixedPicker(0)));
    let transport = Arc::new(RecordingTransport::default());
    let (a, conn_a) = connect(&torrent, &transport, 1);
    let (b, conn_b) = connect(&torrent, &transport, 2);

    torrent.handle_message(&a, Message::Interested).unwrap();
    torrent.handle_message(&b, Message::Interested).unwrap();
    b.record_download(100_000);

    torrent.unchoke_peers(false).unwrap();
    assert!(!b.is_choking());
    assert!(a.is_choking());
    assert_eq!(transport.messages(conn_b), vec![Message::Unchoke]);
    assert!(transport.messages(conn_a).is_empty());

    torrent.unchoke_peers(true).unwrap();
    assert!(!a.is_choking());
    assert!(!b.is_choking());
    assert_eq!(transport.messages(conn_a), vec![Message::Unchoke]);
    assert_eq!(transport.messages(conn_b), vec![Message::Unchoke]);

    // Next regular pass chokes the optimistic pick again.
    torrent.unchoke_peers(false).unwrap();
    assert!(a.is_choking());
    assert_eq!(transport.messages(conn_a), vec![Message::Unchoke, Message::Choke]);
}

#[test]
fn test_unchoke_peers_requires_active_state() {
    let store = Arc::new(MemoryPieceStore::seeded(content(100), PIECE));
    let torrent = TorrentCoordinator::new(InfoHash::new([3; 20]), store, &ChokingConfig::default());
    assert!(matches!(
        torrent.unchoke_peers(false),
        Err(TorrentError::InvalidState {
            state: TorrentState::Validating,
            ..
        })
    ));

    torrent.share().unwrap();
    torrent.unchoke_peers(false).unwrap();
    torrent.stop();
    assert!(torrent.unchoke_peers(true).is_err());
}

// ============================================================================
// Peers
// ============================================================================

#[test]
fn test_peer_merge_by_host_then_id() {
    let torrent = seeder(content(100));
    let id = PeerId([9; 20]);

    let by_host = torrent.get_or_create_peer(addr(1), None);
    let learned = torrent.get_or_create_peer(addr(1), Some(id));
    assert!(Arc::ptr_eq(&by_host, &learned));
    assert_eq!(learned.peer_id(), Some(id));

    let elsewhere = torrent.get_or_create_peer(addr(2), Some(id));
    assert!(Arc::ptr_eq(&by_host, &elsewhere));
    assert!(Arc::ptr_eq(&torrent.peer_by_id(&id).unwrap(), &by_host));
    assert!(Arc::ptr_eq(&torrent.peer_by_host(addr(2)).unwrap(), &by_host));
    assert_eq!(torrent.peers().len(), 1);
}

#[test]
fn test_peer_new_id_replaces_stale_key() {
    let torrent = seeder(content(100));
    let old = PeerId([1; 20]);
    let new = PeerId([2; 20]);

    let peer = torrent.get_or_create_peer(addr(1), Some(old));
    let same = torrent.get_or_create_peer(addr(1), Some(new));
    assert!(Arc::ptr_eq(&peer, &same));
    assert!(torrent.peer_by_id(&old).is_none());
    assert!(torrent.peer_by_id(&new).is_some());
}

#[test]
fn test_peer_id_on_other_host_keeps_host_entry() {
    let torrent = seeder(content(100));
    let id = PeerId([5; 20]);

    let host_only = torrent.get_or_create_peer(addr(1), None);
    let known = torrent.get_or_create_peer(addr(2), Some(id));
    let found = torrent.get_or_create_peer(addr(1), Some(id));

    assert!(Arc::ptr_eq(&found, &known));
    assert!(Arc::ptr_eq(&torrent.peer_by_host(addr(1)).unwrap(), &host_only));
    assert!(Arc::ptr_eq(&torrent.peer_by_host(addr(2)).unwrap(), &known));
    assert_eq!(torrent.peers().len(), 2);
}

#[test]
fn test_peer_disconnect_cleans_up() {
    let data = content(40_000);
    let torrent = leecher(&data);
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Bitfield(crate::peer::Bitfield::full(3).to_bytes()))
        .unwrap();
    torrent.handle_message(&peer, Message::Unchoke).unwrap();
    let piece = peer.requested().unwrap();
    assert!(torrent.is_requested(piece));
    assert_eq!(torrent.connected_count(), 1);

    torrent.handle_peer_disconnected(&peer);
    assert!(!torrent.is_requested(piece));
    assert!(torrent.requested_pieces().is_empty());
    assert_eq!(torrent.connected_count(), 0);
    assert_eq!(transport.closed(), vec![conn]);
    assert!(!peer.is_connected());
    assert!(peer.available().is_empty());
    // Still known for a later reconnect.
    assert_eq!(torrent.peers().len(), 1);
}

#[test]
fn test_choke_releases_request() {
    let data = content(40_000);
    let torrent = leecher(&data);
    let transport = Arc::new(RecordingTransport::default());
    let (peer, _) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Have { piece: 1 })
        .unwrap();
    torrent.handle_message(&peer, Message::Unchoke).unwrap();
    assert_eq!(peer.requested(), Some(1));

    torrent.handle_message(&peer, Message::Choke).unwrap();
    assert_eq!(peer.requested(), None);
    assert!(!torrent.is_requested(1));
}

#[test]
fn test_have_out_of_range_is_rejected() {
    let torrent = leecher(&content(40_000));
    let transport = Arc::new(RecordingTransport::default());
    let (peer, _) = connect(&torrent, &transport, 1);

    assert!(matches!(
        torrent.handle_message(&peer, Message::Have { piece: 3 }),
        Err(TorrentError::InvalidPiece(3))
    ));
}

// ============================================================================
// Requests and downloads
// ============================================================================

#[test]
fn test_request_timeout_releases_piece() {
    let data = content(20_000);
    let config = ChokingConfig {
        piece_timeout: Duration::from_secs(9),
        ..ChokingConfig::default()
    };
    let torrent = leecher_with(&data, &config, Box::new(RandomPicker));
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Have { piece: 1 })
        .unwrap();
    torrent.handle_message(&peer, Message::Unchoke).unwrap();
    assert_eq!(requests(&transport, conn), vec![(1, 0, 20_000 - PIECE)]);

    assert_eq!(torrent.expire_requests(Instant::now()), 0);
    assert_eq!(
        torrent.expire_requests(Instant::now() + Duration::from_secs(9)),
        1
    );

    // The peer is still connected and unchoked, so it is asked again.
    assert_eq!(requests(&transport, conn).len(), 2);
    assert_eq!(peer.requested(), Some(1));
}

#[test]
fn test_request_timeout_clears_request_state() {
    let data = content(20_000);
    let config = ChokingConfig {
        piece_timeout: Duration::from_secs(9),
        ..ChokingConfig::default()
    };
    let torrent = leecher_with(&data, &config, Box::new(RandomPicker));
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Have { piece: 1 })
        .unwrap();
    torrent.handle_message(&peer, Message::Unchoke).unwrap();
    assert!(torrent.is_requested(1));

    // Choked without a Choke message, so nothing is released until the timeout.
    peer.set_choked(true);
    assert_eq!(
        torrent.expire_requests(Instant::now() + Duration::from_secs(9)),
        1
    );

    assert_eq!(peer.requested(), None);
    assert!(!torrent.requested_pieces().has_piece(1));
    assert!(!torrent.is_requested(1));
    assert_eq!(requests(&transport, conn).len(), 1);
    assert_eq!(torrent.expire_requests(Instant::now() + Duration::from_secs(60)), 0);
}

#[test]
fn test_requests_split_into_blocks() {
    let data = content(PIECE as usize * 2 + 100);
    let hashes = MemoryPieceStore::seeded(data.clone(), PIECE * 2).piece_hashes();
    let store = Arc::new(MemoryPieceStore::empty(data.len() as u64, PIECE * 2, hashes));
    let torrent = TorrentCoordinator::new(InfoHash::new([4; 20]), store, &ChokingConfig::default());
    torrent.share().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Have { piece: 0 })
        .unwrap();
    torrent.handle_message(&peer, Message::Unchoke).unwrap();
    assert_eq!(
        requests(&transport, conn),
        vec![(0, 0, PIECE), (0, PIECE, PIECE)]
    );
}

#[test]
fn test_full_download_from_one_peer() {
    let data = content(20_000);
    let torrent = leecher(&data);
    torrent.set_server_mode(true);
    let recorder = Arc::new(Recorder::default());
    torrent.add_observer(recorder.clone());
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Bitfield(crate::peer::Bitfield::full(2).to_bytes()))
        .unwrap();
    assert!(peer.is_interesting());
    torrent.handle_message(&peer, Message::Unchoke).unwrap();

    let mut served = 0;
    while torrent.state() == TorrentState::Sharing && served < 10 {
        let pending = requests(&transport, conn);
        let Some(&(index, begin, length)) = pending.get(served) else {
            break;
        };
        served += 1;
        let start = (index * PIECE + begin) as usize;
        let block = Bytes::copy_from_slice(&data[start..start + length as usize]);
        torrent
            .handle_message(&peer, Message::Piece { index, begin, data: block })
            .unwrap();
    }

    assert_eq!(served, 2);
    assert_eq!(torrent.state(), TorrentState::Seeding);
    assert!(torrent.is_complete());
    assert_eq!(torrent.left(), 0);
    assert_eq!(torrent.downloaded(), 20_000);

    let sent = transport.messages(conn);
    assert!(sent.contains(&Message::Have { piece: 0 }));
    assert!(sent.contains(&Message::Have { piece: 1 }));
    assert!(sent.contains(&Message::ServerCompletion(100)));
    assert_eq!(sent.last(), Some(&Message::NotInterested));
    assert!(!peer.is_interesting());

    let events = recorder.0.lock().clone();
    assert_eq!(events.len(), 4);
    assert!(events[0].starts_with("piece "));
    assert!(events[1].starts_with("piece "));
    assert_ne!(events[0], events[1]);
    assert_eq!(events[2], "complete");
    assert_eq!(events[3], "state seeding");
}

#[test]
fn test_corrupt_piece_is_requested_again() {
    let data = content(1_000);
    let store = Arc::new(MemoryPieceStore::empty(1_000, PIECE, vec![[0; 20]]));
    let torrent = TorrentCoordinator::new(InfoHash::new([5; 20]), store, &ChokingConfig::default());
    torrent.share().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(&peer, Message::Have { piece: 0 })
        .unwrap();
    torrent.handle_message(&peer, Message::Unchoke).unwrap();
    torrent
        .handle_message(
            &peer,
            Message::Piece {
                index: 0,
                begin: 0,
                data: Bytes::from(data),
            },
        )
        .unwrap();

    assert!(torrent.completed_pieces().is_empty());
    assert_eq!(torrent.state(), TorrentState::Sharing);
    assert_eq!(requests(&transport, conn).len(), 2);
    assert_eq!(peer.requested(), Some(0));
}

#[test]
fn test_unrequested_block_is_dropped() {
    let data = content(1_000);
    let torrent = leecher(&data);
    let transport = Arc::new(RecordingTransport::default());
    let (peer, _) = connect(&torrent, &transport, 1);

    torrent
        .handle_message(
            &peer,
            Message::Piece {
                index: 0,
                begin: 0,
                data: Bytes::from(data),
            },
        )
        .unwrap();
    assert_eq!(torrent.downloaded(), 0);
    assert!(torrent.completed_pieces().is_empty());
}

#[test]
fn test_serve_request() {
    let data = content(40_000);
    let torrent = seeder(data.clone());
    let transport = Arc::new(RecordingTransport::default());
    let (peer, conn) = connect(&torrent, &transport, 1);

    let request = Message::Request {
        index: 1,
        begin: 0,
        length: PIECE,
    };

    // Choked peers are ignored.
    torrent.handle_message(&peer, request.clone()).unwrap();
    assert!(transport.messages(conn).is_empty());

    torrent.handle_message(&peer, Message::Interested).unwrap();
    torrent.unchoke_peers(false).unwrap();
    torrent.handle_message(&peer, request).unwrap();

    let expected = Bytes::copy_from_slice(&data[PIECE as usize..2 * PIECE as usize]);
    assert_eq!(
        transport.messages(conn),
        vec![
            Message::Unchoke,
            Message::Piece {
                index: 1,
                begin: 0,
                data: expected,
            }
        ]
    );
    assert_eq!(torrent.uploaded(), PIECE as u64);
    assert!(peer.upload_rate() > 0.0);
}

#[test]
fn test_serve_request_rejects_bad_requests() {
    let torrent = seeder(content(40_000));
    let transport = Arc::new(RecordingTransport::default());
    let (peer, _) = connect(&torrent, &transport, 1);
    torrent.handle_message(&peer, Message::Interested).unwrap();
    torrent.unchoke_peers(false).unwrap();

    assert!(matches!(
        torrent.handle_message(
            &peer,
            Message::Request {
                index: 7,
                begin: 0,
                length: 10
            }
        ),
        Err(TorrentError::InvalidPiece(7))
    ));
    assert!(matches!(
        torrent.handle_message(
            &peer,
            Message::Request {
                index: 0,
                begin: 0,
                length: 70_000
            }
        ),
        Err(TorrentError::BlockTooLarge(70_000))
    ));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_initialize_only_once() {
    let torrent = seeder(content(100));
    assert_eq!(torrent.state(), TorrentState::Seeding);
    assert!(matches!(
        torrent.share(),
        Err(TorrentError::InvalidState {
            operation: "initialize",
            ..
        })
    ));
}

#[test]
fn test_initialize_failure_is_terminal() {
    let store = Arc::new(MemoryPieceStore::empty(100, 16, Vec::new()));
    let torrent = TorrentCoordinator::new(InfoHash::new([6; 20]), store, &ChokingConfig::default());
    let recorder = Arc::new(Recorder::default());
    torrent.add_observer(recorder.clone());

    assert!(matches!(torrent.share(), Err(TorrentError::Store(_))));
    assert_eq!(torrent.state(), TorrentState::Error);
    assert_eq!(recorder.0.lock().clone(), vec!["state error".to_string()]);

    torrent.stop();
    assert_eq!(torrent.state(), TorrentState::Error);
}

#[test]
fn test_download_policy_stops_when_complete() {
    let store = Arc::new(MemoryPieceStore::seeded(content(100), PIECE));
    let torrent = TorrentCoordinator::new(InfoHash::new([7; 20]), store, &ChokingConfig::default());
    let recorder = Arc::new(Recorder::default());
    torrent.add_observer(recorder.clone());

    torrent.download().unwrap();
    assert_eq!(torrent.state(), TorrentState::Stopped);
    assert_eq!(
        recorder.0.lock().clone(),
        vec!["state seeding".to_string(), "state stopped".to_string()]
    );
}

#[test]
fn test_seed_timer_stops_torrent() {
    let store = Arc::new(MemoryPieceStore::seeded(content(100), PIECE));
    let torrent = TorrentCoordinator::new(InfoHash::new([8; 20]), store, &ChokingConfig::default());
    torrent.share_for(Duration::from_millis(50)).unwrap();
    assert_eq!(torrent.state(), TorrentState::Seeding);

    let deadline = Instant::now() + Duration::from_secs(5);
    while torrent.state() != TorrentState::Stopped && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(torrent.state(), TorrentState::Stopped);
}

#[test]
fn test_stop_cancels_seed_timer_and_disconnects() {
    let torrent = {
        let store = Arc::new(MemoryPieceStore::seeded(content(100), PIECE));
        TorrentCoordinator::new(InfoHash::new([9; 20]), store, &ChokingConfig::default())
    };
    torrent.share_for(Duration::from_secs(60)).unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let (_, conn) = connect(&torrent, &transport, 1);

    torrent.stop();
    assert_eq!(torrent.state(), TorrentState::Stopped);
    assert_eq!(torrent.connected_count(), 0);
    assert_eq!(transport.closed(), vec![conn]);
}

#[test]
fn test_announce_budget() {
    let torrent = seeder(content(100));
    assert_eq!(torrent.remaining_announces(), crate::constants::DEFAULT_ANNOUNCES);
    assert!(torrent.take_announce());
    assert!(torrent.take_announce());
    assert!(!torrent.take_announce());
    torrent.set_announces(1);
    assert!(torrent.take_announce());
}

#[test]
fn test_info_snapshot() {
    let torrent = seeder(content(40_000));
    let transport = Arc::new(RecordingTransport::default());
    connect(&torrent, &transport, 1);
    torrent.get_or_create_peer(addr(2), None);

    let info = torrent.info();
    assert_eq!(info.state, TorrentState::Seeding);
    assert_eq!(info.known_peers, 2);
    assert_eq!(info.connected_peers, 1);
    assert_eq!(info.completion, 100.0);
    assert_eq!(info.left, 0);
}

// ============================================================================
// Store
// ============================================================================

#[test]
fn test_memory_store_seeded() {
    let data = content(40_000);
    let store = MemoryPieceStore::seeded(data.clone(), PIECE);
    store.initialize().unwrap();
    assert_eq!(store.piece_count(), 3);
    assert_eq!(store.piece_length(2), 40_000 - 2 * PIECE);
    assert!(store.is_complete());
    assert_eq!(store.left(), 0);
    assert_eq!(&store.read_block(2, 0, 100).unwrap()[..], &data[2 * PIECE as usize..2 * PIECE as usize + 100]);
    assert!(matches!(
        store.read_block(2, 0, PIECE),
        Err(StoreError::InvalidBlock { .. })
    ));
    assert!(matches!(store.read_block(3, 0, 1), Err(StoreError::InvalidPiece(3))));
}

#[test]
fn test_memory_store_zero_piece_length_is_rejected() {
    let store = Arc::new(MemoryPieceStore::seeded(content(100), 0));
    assert!(store.piece_hashes().is_empty());
    assert!(matches!(store.initialize(), Err(StoreError::Initialization(_))));

    let torrent = TorrentCoordinator::new(InfoHash::new([6; 20]), store, &ChokingConfig::default());
    assert!(matches!(torrent.share(), Err(TorrentError::Store(_))));
    assert_eq!(torrent.state(), TorrentState::Error);
}

#[test]
fn test_memory_store_write_and_verify() {
    let data = content(PIECE as usize * 2);
    let hashes = MemoryPieceStore::seeded(data.clone(), PIECE * 2).piece_hashes();
    let store = MemoryPieceStore::empty(data.len() as u64, PIECE * 2, hashes);
    store.initialize().unwrap();
    assert_eq!(store.completion(), 0.0);
    assert!(store.read_block(0, 0, 10).is_err());

    assert!(matches!(
        store.write_block(0, 10, &data[10..20]),
        Err(StoreError::InvalidBlock { .. })
    ));
    assert_eq!(
        store.write_block(0, PIECE, &data[PIECE as usize..]).unwrap(),
        BlockOutcome::Partial
    );
    assert_eq!(
        store.write_block(0, 0, &data[..PIECE as usize]).unwrap(),
        BlockOutcome::PieceComplete { valid: true }
    );

    // Completion is recorded by the caller.
    assert!(!store.is_complete());
    store.mark_completed(0);
    assert!(store.is_complete());
    assert_eq!(store.contents(), data);
}
