use super::ConnectionId;
use crate::wire::WireError;
use thiserror::Error;

/// Errors surfaced by the reactor to its callers.
///
/// Failures of individual sockets never show up here; they close the
/// connection and reach listeners as a dead-connection notice.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no free port in {start}..={end}")]
    NoPortAvailable { start: u16, end: u16 },

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// The peer is not bound to a connection.
    #[error("not connected")]
    NotConnected,

    #[error("reactor is shut down")]
    ShutDown,

    #[error(transparent)]
    Wire(#[from] WireError),
}
