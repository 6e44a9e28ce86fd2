//! Length-prefixed transport framing.
//!
//! Pure functions, no I/O. [`decode`] either removes exactly one complete
//! frame from the front of the buffer or leaves the buffer untouched, so a
//! caller can keep appending network reads until a frame completes.

use super::error::WireError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Width of the big-endian length prefix.
pub const FRAME_PREFIX_LEN: usize = 2;

/// Largest payload a frame can carry.
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;

/// Frames `payload` behind its 2-byte length.
pub fn encode(payload: &[u8]) -> Result<Bytes, WireError> {
    let mut buf = BytesMut::with_capacity(FRAME_PREFIX_LEN + payload.len());
    encode_into(payload, &mut buf)?;
    Ok(buf.freeze())
}

/// Appends the framed form of `payload` to `dst`.
pub fn encode_into(payload: &[u8], dst: &mut BytesMut) -> Result<(), WireError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    dst.reserve(FRAME_PREFIX_LEN + payload.len());
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Returns the total size (prefix included) of the frame at the front of
/// `buf`, or `None` while the prefix itself is incomplete.
pub fn declared_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < FRAME_PREFIX_LEN {
        return None;
    }
    let payload = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    Some(FRAME_PREFIX_LEN + payload)
}

/// Removes one complete frame from the front of `buf` and returns its payload.
///
/// Returns `None` without consuming anything when `buf` does not yet hold the
/// whole frame.
pub fn decode(buf: &mut BytesMut) -> Option<Bytes> {
    let total = declared_len(buf)?;
    if buf.len() < total {
        return None;
    }
    buf.advance(FRAME_PREFIX_LEN);
    Some(buf.split_to(total - FRAME_PREFIX_LEN).freeze())
}
