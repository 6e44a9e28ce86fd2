//! Read and write workers.
//!
//! Each worker drains its own FIFO on a dedicated thread so the event loop
//! never assembles frames or blocks flushing application data.

use super::reactor::{ChangeRequest, Shared};
use super::{ConnectionId, ReactorListener};
use crate::constants::INITIAL_READ_BUFFER;
use crate::torrent::InfoHash;
use crate::wire::frame;
use bytes::{Buf, Bytes, BytesMut};
use crossbeam::channel::Receiver;
use mio::net::TcpStream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

pub(crate) enum ReadTask {
    Inbound {
        id: ConnectionId,
        addr: SocketAddr,
    },
    Connected {
        id: ConnectionId,
        addr: SocketAddr,
        info_hash: InfoHash,
    },
    Data {
        id: ConnectionId,
        data: Bytes,
    },
    Dead {
        id: ConnectionId,
    },
}

pub(crate) struct WriteTask {
    pub(crate) id: ConnectionId,
    pub(crate) stream: Arc<Mutex<TcpStream>>,
}

/// Assembles frames per connection and fans events out to the listeners.
pub(crate) struct ReadWorker {
    tasks: Receiver<ReadTask>,
    shared: Arc<Shared>,
    buffers: HashMap<ConnectionId, BytesMut>,
}

impl ReadWorker {
    pub(crate) fn new(tasks: Receiver<ReadTask>, shared: Arc<Shared>) -> Self {
        Self {
            tasks,
            shared,
            buffers: HashMap::new(),
        }
    }

    pub(crate) fn run(mut self) {
        while let Ok(task) = self.tasks.recv() {
            match task {
                ReadTask::Inbound { id, addr } => {
                    self.notify("inbound", |l| l.on_inbound(id, addr));
                }
                ReadTask::Connected {
                    id,
                    addr,
                    info_hash,
                } => {
                    self.notify("connected", |l| l.on_connected(id, addr, info_hash));
                }
                ReadTask::Data { id, data } => {
                    let frames = self.assemble(id, &data);
                    trace!(conn = %id, frames = frames.len(), "assembled frames");
                    self.notify("frames", |l| l.on_frames(id, frames.clone()));
                }
                ReadTask::Dead { id } => {
                    self.buffers.remove(&id);
                    self.notify("dead", |l| l.on_dead(id));
                }
            }
        }
        debug!("read worker exited");
    }

    /// Appends `data` to the connection's buffer and extracts every complete
    /// frame. Leftover bytes stay buffered for the next delivery.
    fn assemble(&mut self, id: ConnectionId, data: &[u8]) -> Vec<Bytes> {
        let buf = self
            .buffers
            .entry(id)
            .or_insert_with(|| BytesMut::with_capacity(INITIAL_READ_BUFFER));
        buf.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            if let Some(needed) = frame::declared_len(&buf[..]) {
                if needed > buf.capacity() {
                    buf.reserve(needed - buf.len());
                }
            }
            match frame::decode(buf) {
                Some(payload) => frames.push(payload),
                None => break,
            }
        }
        frames
    }

    fn notify(&self, event: &'static str, f: impl Fn(&dyn ReactorListener)) {
        for listener in self.shared.listeners() {
            let result = panic::catch_unwind(AssertUnwindSafe(|| f(listener.as_ref())));
            if result.is_err() {
                error!(event, "reactor listener panicked");
            }
        }
    }
}

/// Frames and flushes each connection's pending payloads.
pub(crate) struct WriteWorker {
    tasks: Receiver<WriteTask>,
    shared: Arc<Shared>,
}

impl WriteWorker {
    pub(crate) fn new(tasks: Receiver<WriteTask>, shared: Arc<Shared>) -> Self {
        Self { tasks, shared }
    }

    pub(crate) fn run(self) {
        while let Ok(task) = self.tasks.recv() {
            self.flush(task.id, &task.stream);
        }
        debug!("write worker exited");
    }

    fn flush(&self, id: ConnectionId, stream: &Mutex<TcpStream>) {
        loop {
            let chunk = {
                let mut outbound = self.shared.outbound.lock();
                let Some(queue) = outbound.get_mut(&id) else {
                    // Closed; queued writes were discarded with it.
                    return;
                };
                if let Some(rest) = queue.partial.take() {
                    rest
                } else if let Some(payload) = queue.pending.pop_front() {
                    match frame::encode(&payload) {
                        Ok(framed) => framed,
                        Err(e) => {
                            warn!(conn = %id, error = %e, "dropping unframeable payload");
                            continue;
                        }
                    }
                } else {
                    drop(outbound);
                    self.shared.submit(ChangeRequest::Interest {
                        id,
                        writable: false,
                    });
                    return;
                }
            };

            match write_nonblocking(stream, chunk) {
                Ok(None) => {}
                Ok(Some(rest)) => {
                    trace!(conn = %id, remaining = rest.len(), "partial write");
                    if let Some(queue) = self.shared.outbound.lock().get_mut(&id) {
                        queue.partial = Some(rest);
                    }
                    self.shared.submit(ChangeRequest::Interest { id, writable: true });
                    return;
                }
                Err(e) => {
                    debug!(conn = %id, error = %e, "write failed");
                    let _ = stream.lock().shutdown(Shutdown::Both);
                    self.shared.outbound.lock().remove(&id);
                    self.shared.submit(ChangeRequest::Close { id });
                    return;
                }
            }
        }
    }
}

/// Writes as much of `chunk` as the socket takes. Returns the unwritten
/// tail when the socket would block.
fn write_nonblocking(stream: &Mutex<TcpStream>, mut chunk: Bytes) -> io::Result<Option<Bytes>> {
    let mut stream = stream.lock();
    while !chunk.is_empty() {
        match stream.write(&chunk) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => chunk.advance(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Some(chunk)),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}
