//! Peer wire codec.
//!
//! Every unit exchanged on a connection travels inside a transport frame: a
//! 2-byte big-endian length followed by that many payload bytes. The first
//! frame in each direction carries the 68-byte handshake; every later frame
//! carries one [`Message`] (a type byte plus its fields).

mod error;
pub mod frame;
mod message;

pub use error::WireError;
pub use frame::{FRAME_PREFIX_LEN, MAX_FRAME_PAYLOAD};
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN, PROTOCOL};
