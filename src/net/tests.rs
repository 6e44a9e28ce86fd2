use super::reactor::ChangeRequest;
use super::*;
use crate::config::ClientConfig;
use crate::torrent::InfoHash;
use bytes::Bytes;
use crossbeam::channel::{self, Receiver, Sender};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum Seen {
    Inbound(ConnectionId),
    Connected(ConnectionId, InfoHash),
    Frames(ConnectionId, Vec<Bytes>),
    Dead(ConnectionId),
}

struct Probe(Sender<Seen>);

impl ReactorListener for Probe {
    fn on_inbound(&self, conn: ConnectionId, _addr: SocketAddr) {
        let _ = self.0.send(Seen::Inbound(conn));
    }

    fn on_connected(&self, conn: ConnectionId, _addr: SocketAddr, info_hash: InfoHash) {
        let _ = self.0.send(Seen::Connected(conn, info_hash));
    }

    fn on_frames(&self, conn: ConnectionId, frames: Vec<Bytes>) {
        let _ = self.0.send(Seen::Frames(conn, frames));
    }

    fn on_dead(&self, conn: ConnectionId) {
        let _ = self.0.send(Seen::Dead(conn));
    }
}

struct Panicker;

impl ReactorListener for Panicker {
    fn on_inbound(&self, _conn: ConnectionId, _addr: SocketAddr) {
        panic!("inbound");
    }

    fn on_frames(&self, _conn: ConnectionId, _frames: Vec<Bytes>) {
        panic!("frames");
    }
}

fn probed_reactor() -> (Reactor, Receiver<Seen>) {
    let reactor = Reactor::start(&ClientConfig::loopback()).unwrap();
    let (tx, rx) = channel::unbounded();
    reactor.add_listener(Arc::new(Probe(tx)));
    (reactor, rx)
}

fn wait_for<T>(rx: &Receiver<Seen>, mut pick: impl FnMut(Seen) -> Option<T>) -> T {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        let seen = rx.recv_timeout(left).expect("timed out waiting for reactor event");
        if let Some(found) = pick(seen) {
            return found;
        }
    }
}

/// Connects `from` to `to` and returns (outbound id on `from`, inbound id on `to`).
fn link(
    from: &Reactor,
    from_rx: &Receiver<Seen>,
    to: &Reactor,
    to_rx: &Receiver<Seen>,
) -> (ConnectionId, ConnectionId) {
    let token = InfoHash::new([3u8; 20]);
    let out = from.connect(to.local_addr(), token).unwrap();
    let connected = wait_for(from_rx, |seen| match seen {
        Seen::Connected(conn, hash) if conn == out => Some(hash),
        _ => None,
    });
    assert_eq!(connected, token);
    let inbound = wait_for(to_rx, |seen| match seen {
        Seen::Inbound(conn) => Some(conn),
        _ => None,
    });
    (out, inbound)
}

fn collect_frames(rx: &Receiver<Seen>, conn: ConnectionId, count: usize) -> Vec<Bytes> {
    let mut frames = Vec::new();
    while frames.len() < count {
        frames.extend(wait_for(rx, |seen| match seen {
            Seen::Frames(c, batch) if c == conn => Some(batch),
            _ => None,
        }));
    }
    frames
}

#[test]
fn test_frames_arrive_in_order() {
    let (a, a_rx) = probed_reactor();
    let (b, b_rx) = probed_reactor();
    let (out, inbound) = link(&b, &b_rx, &a, &a_rx);

    let payloads: Vec<Bytes> = (0..200u32)
        .map(|i| {
            let len = match i % 4 {
                0 => 0,
                1 => 17,
                2 => 40_000,
                _ => 65_535,
            };
            Bytes::from(vec![(i % 256) as u8; len])
        })
        .collect();

    for payload in &payloads {
        b.send(out, payload.clone()).unwrap();
    }

    let received = collect_frames(&a_rx, inbound, payloads.len());
    assert_eq!(received, payloads);

    a.send(inbound, Bytes::from_static(b"pong")).unwrap();
    let reply = collect_frames(&b_rx, out, 1);
    assert_eq!(&reply[0][..], b"pong");
}

#[test]
fn test_partial_writes_resume_in_order() {
    use std::io::Read;

    let (a, rx) = probed_reactor();
    let stalled = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let conn = a
        .connect(stalled.local_addr().unwrap(), InfoHash::new([5u8; 20]))
        .unwrap();
    let (mut reader, _) = stalled.accept().unwrap();
    wait_for(&rx, |seen| match seen {
        Seen::Connected(c, _) if c == conn => Some(()),
        _ => None,
    });

    // Far more than the socket buffers hold while nobody reads.
    let payloads: Vec<Bytes> = (0..300u32)
        .map(|i| Bytes::from(vec![(i % 256) as u8; 60_000]))
        .collect();
    for payload in &payloads {
        a.send(conn, payload.clone()).unwrap();
    }
    thread::sleep(Duration::from_millis(500));

    reader.set_read_timeout(Some(WAIT)).unwrap();
    for (i, payload) in payloads.iter().enumerate() {
        let mut prefix = [0u8; 2];
        reader.read_exact(&mut prefix).unwrap();
        assert_eq!(u16::from_be_bytes(prefix) as usize, payload.len(), "frame {i}");

        let mut body = vec![0u8; payload.len()];
        reader.read_exact(&mut body).unwrap();
        assert_eq!(&body[..], &payload[..], "frame {i}");
    }
    assert!(a.is_running());
}

#[test]
fn test_send_rejects_oversize_and_unknown() {
    let (a, _rx) = probed_reactor();
    let unknown = ConnectionId::new(9_999);

    assert!(matches!(
        a.send(unknown, Bytes::from_static(b"x")),
        Err(NetError::UnknownConnection(c)) if c == unknown
    ));
    assert!(matches!(
        a.send(unknown, Bytes::from(vec![0u8; 70_000])),
        Err(NetError::Wire(_))
    ));
}

#[test]
fn test_close_notifies_both_ends() {
    let (a, a_rx) = probed_reactor();
    let (b, b_rx) = probed_reactor();
    let (out, inbound) = link(&b, &b_rx, &a, &a_rx);

    b.close(out);

    wait_for(&b_rx, |seen| match seen {
        Seen::Dead(conn) if conn == out => Some(()),
        _ => None,
    });
    wait_for(&a_rx, |seen| match seen {
        Seen::Dead(conn) if conn == inbound => Some(()),
        _ => None,
    });

    assert!(matches!(
        b.send(out, Bytes::from_static(b"late")),
        Err(NetError::UnknownConnection(_))
    ));
}

#[test]
fn test_interest_change_for_unknown_connection_reports_dead() {
    let (a, rx) = probed_reactor();
    let ghost = ConnectionId::new(4_242);

    a.shared().submit(ChangeRequest::Interest {
        id: ghost,
        writable: true,
    });

    wait_for(&rx, |seen| match seen {
        Seen::Dead(conn) if conn == ghost => Some(()),
        _ => None,
    });
    assert!(a.is_running());
}

#[test]
fn test_refused_connect_reports_dead() {
    let (a, rx) = probed_reactor();
    let closed_port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };

    let conn = a.connect(closed_port, InfoHash::new([1u8; 20])).unwrap();
    wait_for(&rx, |seen| match seen {
        Seen::Dead(c) if c == conn => Some(()),
        Seen::Connected(c, _) if c == conn => panic!("connected to a closed port"),
        _ => None,
    });
}

#[test]
fn test_panicking_listener_is_isolated() {
    let a = Reactor::start(&ClientConfig::loopback()).unwrap();
    let (b, b_rx) = probed_reactor();
    a.add_listener(Arc::new(Panicker));
    let (tx, a_rx) = channel::unbounded();
    a.add_listener(Arc::new(Probe(tx)));

    let (out, inbound) = link(&b, &b_rx, &a, &a_rx);
    b.send(out, Bytes::from_static(b"still alive")).unwrap();

    let frames = collect_frames(&a_rx, inbound, 1);
    assert_eq!(&frames[0][..], b"still alive");
}

#[test]
fn test_port_range_exhausted() {
    let held = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = held.local_addr().unwrap().port();

    let mut config = ClientConfig::loopback();
    config.listen_ports = port..=port;
    assert!(matches!(
        Reactor::start(&config),
        Err(NetError::NoPortAvailable { start, end }) if start == port && end == port
    ));
}

#[test]
fn test_shutdown_rejects_new_work() {
    let (a, _rx) = probed_reactor();
    a.shutdown();
    assert!(!a.is_running());
    assert!(matches!(
        a.connect("127.0.0.1:1".parse().unwrap(), InfoHash::new([0u8; 20])),
        Err(NetError::ShutDown)
    ));
}
