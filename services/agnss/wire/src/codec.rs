//! Frame encoding.
//!
//! The payload may be supplied as several independent slices; they are
//! written back to back as if concatenated.

use crate::frame::checksum;
use crate::header::{FRAME_OVERHEAD, MAX_PAYLOAD_SIZE, SYNC_CHAR_1, SYNC_CHAR_2};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

/// Builder for a single UBX frame
#[derive(Debug, Clone)]
pub struct FrameBuilder<'a> {
    class: u8,
    id: u8,
    parts: SmallVec<[&'a [u8]; 4]>,
}

impl<'a> FrameBuilder<'a> {
    /// Create a new frame builder
    pub fn new(class: u8, id: u8) -> Self {
        Self {
            class,
            id,
            parts: SmallVec::new(),
        }
    }

    /// Append one payload part
    pub fn part(mut self, part: &'a [u8]) -> Self {
        self.parts.push(part);
        self
    }

    /// Append several payload parts in order
    pub fn parts<I>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        self.parts.extend(parts);
        self
    }

    /// Total payload length of the parts added so far
    pub fn payload_len(&self) -> usize {
        self.parts.iter().map(|p| p.len()).sum()
    }

    /// Build the frame
    pub fn build(self) -> Result<Bytes, WireError> {
        if self.parts.iter().any(|p| p.is_empty()) {
            return Err(WireError::InvalidEntry);
        }
        let payload_len = self.payload_len();
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge(payload_len));
        }
        Ok(encode(self.class, self.id, &self.parts, payload_len))
    }
}

fn encode(class: u8, id: u8, parts: &[&[u8]], payload_len: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload_len + FRAME_OVERHEAD);
    buf.put_u8(SYNC_CHAR_1);
    buf.put_u8(SYNC_CHAR_2);
    buf.put_u8(class);
    buf.put_u8(id);
    buf.put_u16_le(payload_len as u16);
    for part in parts {
        buf.put_slice(part);
    }
    let ck = checksum(&buf[2..]);
    buf.put_slice(&ck);
    buf.freeze()
}

/// Encode a frame whose payload is known to fit the length field.
///
/// Used for fixed-layout control frames; empty parts are allowed.
pub(crate) fn encode_fixed(class: u8, id: u8, parts: &[&[u8]]) -> Bytes {
    let payload_len: usize = parts.iter().map(|p| p.len()).sum();
    debug_assert!(payload_len <= MAX_PAYLOAD_SIZE);
    encode(class, id, parts, payload_len)
}

/// Build a frame from a class, id and payload parts
pub fn build_frame(class: u8, id: u8, parts: &[&[u8]]) -> Result<Bytes, WireError> {
    FrameBuilder::new(class, id).parts(parts.iter().copied()).build()
}
