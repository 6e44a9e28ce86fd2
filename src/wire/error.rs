use thiserror::Error;

/// Errors produced while encoding or decoding peer wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// The payload does not fit behind a 2-byte length prefix.
    #[error("frame payload too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The frame is not a well-formed handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message type.
    #[error("invalid message id: {0}")]
    InvalidMessageId(u8),
}
