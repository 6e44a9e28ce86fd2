use super::worker::{ReadTask, ReadWorker, WriteTask, WriteWorker};
use super::{ConnectionId, NetError, ReactorListener, Transport};
use crate::config::ClientConfig;
use crate::constants::STAGING_BUFFER_SIZE;
use crate::torrent::InfoHash;
use crate::wire::{WireError, MAX_FRAME_PAYLOAD};
use bytes::Bytes;
use crossbeam::channel::{self, Sender};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::io::{self, Read};
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, trace, warn};

const LISTENER: Token = Token(0);
const WAKER: Token = Token(1);
const FIRST_CONNECTION: usize = 2;
const EVENTS_CAPACITY: usize = 1024;

/// A queued instruction for the event loop, applied on its next iteration.
pub(crate) enum ChangeRequest {
    Register {
        id: ConnectionId,
        stream: TcpStream,
        addr: SocketAddr,
        info_hash: InfoHash,
    },
    Interest {
        id: ConnectionId,
        writable: bool,
    },
    Close {
        id: ConnectionId,
    },
}

/// Payloads waiting to be written to one connection.
#[derive(Default)]
pub(crate) struct Outbound {
    pub(crate) pending: VecDeque<Bytes>,
    /// Unwritten tail of a frame the socket did not fully accept.
    pub(crate) partial: Option<Bytes>,
}

impl Outbound {
    fn has_pending(&self) -> bool {
        self.partial.is_some() || !self.pending.is_empty()
    }
}

/// State shared between the event loop, the workers and callers.
pub(crate) struct Shared {
    waker: Waker,
    changes: Mutex<Vec<ChangeRequest>>,
    pub(crate) outbound: Mutex<HashMap<ConnectionId, Outbound>>,
    listeners: RwLock<Vec<Arc<dyn ReactorListener>>>,
    next_id: AtomicUsize,
    running: AtomicBool,
}

impl Shared {
    pub(crate) fn submit(&self, change: ChangeRequest) {
        self.changes.lock().push(change);
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "failed to wake reactor");
        }
    }

    pub(crate) fn listeners(&self) -> Vec<Arc<dyn ReactorListener>> {
        self.listeners.read().clone()
    }

    fn allocate_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn has_pending(&self, id: ConnectionId) -> bool {
        self.outbound
            .lock()
            .get(&id)
            .is_some_and(Outbound::has_pending)
    }
}

/// Non-blocking socket multiplexer.
///
/// One thread waits for readiness and moves bytes, a read worker assembles
/// frames and calls the listeners, and a write worker frames and flushes
/// queued payloads. All three exit after [`Reactor::shutdown`].
pub struct Reactor {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
}

impl Reactor {
    /// Binds the first free port of the configured range and starts the
    /// reactor threads.
    pub fn start(config: &ClientConfig) -> Result<Self, NetError> {
        let poll = Poll::new()?;
        let mut listener = bind_first(config.listen_ip, &config.listen_ports)?;
        let local_addr = listener.local_addr()?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)?;
        let waker = Waker::new(poll.registry(), WAKER)?;

        let shared = Arc::new(Shared {
            waker,
            changes: Mutex::new(Vec::new()),
            outbound: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(FIRST_CONNECTION),
            running: AtomicBool::new(true),
        });

        let (read_tx, read_rx) = channel::unbounded();
        let (write_tx, write_rx) = channel::unbounded();

        let read_worker = ReadWorker::new(read_rx, shared.clone());
        thread::Builder::new()
            .name("swarmlink-read".into())
            .spawn(move || read_worker.run())?;

        let write_worker = WriteWorker::new(write_rx, shared.clone());
        thread::Builder::new()
            .name("swarmlink-write".into())
            .spawn(move || write_worker.run())?;

        let event_loop = EventLoop {
            poll,
            listener,
            connections: HashMap::new(),
            shared: shared.clone(),
            reads: read_tx,
            writes: write_tx,
            staging: vec![0u8; STAGING_BUFFER_SIZE],
        };
        thread::Builder::new()
            .name("swarmlink-reactor".into())
            .spawn(move || event_loop.run())?;

        info!(%local_addr, "reactor listening");
        Ok(Self { shared, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Adds a listener; listeners are called in the order they were added.
    pub fn add_listener(&self, listener: Arc<dyn ReactorListener>) {
        self.shared.listeners.write().push(listener);
    }

    /// Starts connecting to `addr`.
    ///
    /// Returns at once; completion arrives as
    /// [`ReactorListener::on_connected`] carrying `info_hash`, failure as
    /// [`ReactorListener::on_dead`].
    pub fn connect(&self, addr: SocketAddr, info_hash: InfoHash) -> Result<ConnectionId, NetError> {
        self.ensure_running()?;
        let stream = TcpStream::connect(addr)?;
        let id = self.shared.allocate_id();
        self.shared.outbound.lock().insert(id, Outbound::default());
        self.shared.submit(ChangeRequest::Register {
            id,
            stream,
            addr,
            info_hash,
        });
        debug!(conn = %id, %addr, "connecting");
        Ok(id)
    }

    /// Queues a frame payload for `conn`.
    pub fn send(&self, conn: ConnectionId, payload: Bytes) -> Result<(), NetError> {
        self.ensure_running()?;
        if payload.len() > MAX_FRAME_PAYLOAD {
            return Err(WireError::FrameTooLarge(payload.len()).into());
        }
        {
            let mut outbound = self.shared.outbound.lock();
            let queue = outbound
                .get_mut(&conn)
                .ok_or(NetError::UnknownConnection(conn))?;
            queue.pending.push_back(payload);
        }
        self.shared.submit(ChangeRequest::Interest {
            id: conn,
            writable: true,
        });
        Ok(())
    }

    pub fn close(&self, conn: ConnectionId) {
        self.shared.submit(ChangeRequest::Close { id: conn });
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Stops the event loop and drops every listener.
    ///
    /// Sockets are closed when the loop exits; the workers follow once their
    /// queues drain.
    pub fn shutdown(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            info!(local_addr = %self.local_addr, "reactor shutting down");
            if let Err(e) = self.shared.waker.wake() {
                warn!(error = %e, "failed to wake reactor");
            }
        }
        self.shared.listeners.write().clear();
    }

    fn ensure_running(&self) -> Result<(), NetError> {
        if self.is_running() {
            Ok(())
        } else {
            Err(NetError::ShutDown)
        }
    }

    #[cfg(test)]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl Transport for Reactor {
    fn send(&self, conn: ConnectionId, payload: Bytes) -> Result<(), NetError> {
        Reactor::send(self, conn, payload)
    }

    fn close(&self, conn: ConnectionId) {
        Reactor::close(self, conn)
    }
}

impl Drop for Reactor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn bind_first(ip: IpAddr, ports: &RangeInclusive<u16>) -> Result<TcpListener, NetError> {
    for port in ports.clone() {
        match TcpListener::bind(SocketAddr::new(ip, port)) {
            Ok(listener) => return Ok(listener),
            Err(e) => debug!(port, error = %e, "port unavailable"),
        }
    }
    Err(NetError::NoPortAvailable {
        start: *ports.start(),
        end: *ports.end(),
    })
}

enum ConnState {
    /// Outbound connect in progress, carrying the caller's token.
    Connecting(InfoHash),
    Established,
}

struct Connection {
    stream: Arc<Mutex<TcpStream>>,
    addr: SocketAddr,
    state: ConnState,
}

struct EventLoop {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<ConnectionId, Connection>,
    shared: Arc<Shared>,
    reads: Sender<ReadTask>,
    writes: Sender<WriteTask>,
    staging: Vec<u8>,
}

impl EventLoop {
    fn run(mut self) {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        while self.shared.running.load(Ordering::Acquire) {
            self.apply_changes();

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                error!(error = %e, "reactor poll failed");
                break;
            }

            if !self.shared.running.load(Ordering::Acquire) {
                break;
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept(),
                    WAKER => {}
                    token => self.ready(ConnectionId::new(token.0), event),
                }
            }
        }

        self.close_all();
        debug!("reactor loop exited");
    }

    fn apply_changes(&mut self) {
        let changes = std::mem::take(&mut *self.shared.changes.lock());
        for change in changes {
            match change {
                ChangeRequest::Register {
                    id,
                    stream,
                    addr,
                    info_hash,
                } => self.register_outbound(id, stream, addr, info_hash),
                ChangeRequest::Interest { id, writable } => self.set_interest(id, writable),
                ChangeRequest::Close { id } => self.close(id, "closed locally"),
            }
        }
    }

    fn register_outbound(
        &mut self,
        id: ConnectionId,
        mut stream: TcpStream,
        addr: SocketAddr,
        info_hash: InfoHash,
    ) {
        // Connect completion is reported as writability.
        if let Err(e) = self
            .poll
            .registry()
            .register(&mut stream, Token(id.raw()), Interest::WRITABLE)
        {
            warn!(conn = %id, %addr, error = %e, "failed to register connection");
            self.shared.outbound.lock().remove(&id);
            self.dead(id);
            return;
        }
        self.connections.insert(
            id,
            Connection {
                stream: Arc::new(Mutex::new(stream)),
                addr,
                state: ConnState::Connecting(info_hash),
            },
        );
    }

    fn set_interest(&mut self, id: ConnectionId, writable: bool) {
        let Some(conn) = self.connections.get(&id) else {
            debug!(conn = %id, "interest change for unknown connection");
            self.shared.outbound.lock().remove(&id);
            self.dead(id);
            return;
        };
        if let ConnState::Connecting(_) = conn.state {
            // Applied when the connect completes.
            return;
        }

        let interest = if writable || self.shared.has_pending(id) {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };
        let result = self
            .poll
            .registry()
            .reregister(&mut *conn.stream.lock(), Token(id.raw()), interest);
        if let Err(e) = result {
            warn!(conn = %id, error = %e, "failed to update interest");
            self.close(id, "reregister failed");
        }
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    let id = self.shared.allocate_id();
                    if let Err(e) =
                        self.poll
                            .registry()
                            .register(&mut stream, Token(id.raw()), Interest::READABLE)
                    {
                        warn!(%addr, error = %e, "failed to register inbound connection");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    self.connections.insert(
                        id,
                        Connection {
                            stream: Arc::new(Mutex::new(stream)),
                            addr,
                            state: ConnState::Established,
                        },
                    );
                    self.shared.outbound.lock().insert(id, Outbound::default());
                    debug!(conn = %id, %addr, "accepted connection");
                    let _ = self.reads.send(ReadTask::Inbound { id, addr });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn ready(&mut self, id: ConnectionId, event: &Event) {
        let Some(conn) = self.connections.get(&id) else {
            return;
        };

        if let ConnState::Connecting(info_hash) = conn.state {
            self.finish_connect(id, info_hash);
            return;
        }

        if (event.is_readable() || event.is_read_closed() || event.is_error()) && !self.read(id) {
            return;
        }

        if event.is_writable() {
            if let Some(conn) = self.connections.get(&id) {
                let _ = self.writes.send(WriteTask {
                    id,
                    stream: conn.stream.clone(),
                });
            }
        }
    }

    fn finish_connect(&mut self, id: ConnectionId, info_hash: InfoHash) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let addr = conn.addr;
        let interest = if self.shared.has_pending(id) {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        let outcome = {
            let mut stream = conn.stream.lock();
            match stream.take_error() {
                Ok(Some(e)) | Err(e) => Err(e),
                Ok(None) => match stream.peer_addr() {
                    Ok(_) => self
                        .poll
                        .registry()
                        .reregister(&mut *stream, Token(id.raw()), interest)
                        .map(|()| true),
                    Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
                    Err(e) => Err(e),
                },
            }
        };

        match outcome {
            Ok(true) => {
                conn.state = ConnState::Established;
                debug!(conn = %id, %addr, "connected");
                let _ = self.reads.send(ReadTask::Connected {
                    id,
                    addr,
                    info_hash,
                });
            }
            Ok(false) => {}
            Err(e) => {
                debug!(conn = %id, %addr, error = %e, "connect failed");
                self.close(id, "connect failed");
            }
        }
    }

    /// Drains the socket into the read worker. Returns `false` once the
    /// connection has been closed.
    fn read(&mut self, id: ConnectionId) -> bool {
        let Some(stream) = self.connections.get(&id).map(|c| c.stream.clone()) else {
            return false;
        };

        loop {
            let result = stream.lock().read(&mut self.staging[..]);
            match result {
                Ok(0) => {
                    self.close(id, "closed by peer");
                    return false;
                }
                Ok(n) => {
                    trace!(conn = %id, bytes = n, "read");
                    let data = Bytes::copy_from_slice(&self.staging[..n]);
                    let _ = self.reads.send(ReadTask::Data { id, data });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!(conn = %id, error = %e, "read failed");
                    self.close(id, "read failed");
                    return false;
                }
            }
        }
    }

    fn close(&mut self, id: ConnectionId, reason: &'static str) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        {
            let mut stream = conn.stream.lock();
            let _ = self.poll.registry().deregister(&mut *stream);
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared.outbound.lock().remove(&id);
        debug!(conn = %id, addr = %conn.addr, reason, "connection closed");
        self.dead(id);
    }

    fn dead(&self, id: ConnectionId) {
        let _ = self.reads.send(ReadTask::Dead { id });
    }

    fn close_all(&mut self) {
        for (_, conn) in self.connections.drain() {
            let mut stream = conn.stream.lock();
            let _ = self.poll.registry().deregister(&mut *stream);
            let _ = stream.shutdown(Shutdown::Both);
        }
        self.shared.outbound.lock().clear();
        self.shared.changes.lock().clear();
    }
}
