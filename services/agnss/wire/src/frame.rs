//! UBX frame parsing and validation.
//!
//! ```text
//! +------+------+-------+----+-------------+-----------+------+------+
//! | 0xB5 | 0x62 | class | id | length u16LE| payload   | ck_a | ck_b |
//! +------+------+-------+----+-------------+-----------+------+------+
//!               |<------------ checksummed region ------>|
//! ```
//!
//! Frames are borrowed views into caller buffers; nothing here copies
//! payload bytes except the streaming [`FrameDecoder`], which hands out
//! owned `Bytes` split off its input buffer.

use crate::header::{MsgId, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD_SIZE, SYNC_CHAR_1, SYNC_CHAR_2};
use crate::WireError;
use bytes::{Buf, Bytes, BytesMut};
use tracing::debug;

/// Compute the two-byte Fletcher checksum over `data`
pub fn checksum(data: &[u8]) -> [u8; 2] {
    let mut a: u8 = 0;
    let mut b: u8 = 0;
    for byte in data {
        a = a.wrapping_add(*byte);
        b = b.wrapping_add(a);
    }
    [a, b]
}

/// Check the trailing checksum of a buffer holding exactly one frame
pub fn validate(frame: &[u8]) -> bool {
    if frame.len() < FRAME_OVERHEAD {
        return false;
    }
    let end = frame.len() - 2;
    checksum(&frame[2..end]) == [frame[end], frame[end + 1]]
}

/// Recompute and store the checksum of a frame edited in place
pub fn rewrite_checksum(frame: &mut [u8]) {
    if frame.len() < FRAME_OVERHEAD {
        return;
    }
    let end = frame.len() - 2;
    let ck = checksum(&frame[2..end]);
    frame[end] = ck[0];
    frame[end + 1] = ck[1];
}

/// How [`parse`] treats bytes after the first frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// The buffer must hold exactly one frame
    Exact,
    /// Only the first frame is examined; later bytes are left alone
    IgnoreTrailing,
}

/// Structural check of the frame at the start of `buf`, without the checksum.
///
/// Returns the total frame length (header, payload and checksum).
pub fn frame_len(buf: &[u8]) -> Result<usize, WireError> {
    if buf.len() < FRAME_OVERHEAD {
        return Err(WireError::TooShort);
    }
    if buf[0] != SYNC_CHAR_1 || buf[1] != SYNC_CHAR_2 {
        return Err(WireError::BadSyncBytes);
    }
    let payload_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
    let total = payload_len + FRAME_OVERHEAD;
    if total > buf.len() {
        return Err(WireError::PayloadTooShort);
    }
    Ok(total)
}

/// Parse and validate the frame at the start of `buf`, returning its length
pub fn parse(buf: &[u8], mode: ParseMode) -> Result<usize, WireError> {
    let total = frame_len(buf)?;
    if mode == ParseMode::Exact && total != buf.len() {
        return Err(WireError::TrailingBytes(buf.len() - total));
    }
    if !validate(&buf[..total]) {
        return Err(WireError::ChecksumMismatch);
    }
    Ok(total)
}

/// Borrowed view of one structurally complete frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// View the frame at the start of `buf`; trailing bytes are ignored
    pub fn parse(buf: &'a [u8]) -> Result<Self, WireError> {
        let total = parse(buf, ParseMode::IgnoreTrailing)?;
        Ok(Self { bytes: &buf[..total] })
    }

    /// View a buffer that must be exactly one valid frame
    pub fn parse_exact(buf: &'a [u8]) -> Result<Self, WireError> {
        let total = parse(buf, ParseMode::Exact)?;
        Ok(Self { bytes: &buf[..total] })
    }

    /// Message class
    pub fn class(&self) -> u8 {
        self.bytes[2]
    }

    /// Message id
    pub fn id(&self) -> u8 {
        self.bytes[3]
    }

    /// Class and id pair
    pub fn msg_id(&self) -> MsgId {
        MsgId::new(self.class(), self.id())
    }

    /// Payload bytes
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[HEADER_SIZE..self.bytes.len() - 2]
    }

    /// Total frame length including header and checksum
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false; a frame carries at least its header
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whole frame bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Whether the trailing checksum matches
    pub fn checksum_ok(&self) -> bool {
        validate(self.bytes)
    }
}

/// Iterator over back-to-back frames in a contiguous buffer.
///
/// Yields `(offset, frame)` for every structurally complete frame, including
/// frames whose checksum fails. The first region that does not parse as a
/// frame yields an error and ends the iteration.
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Iterator for Frames<'a> {
    type Item = Result<(usize, Frame<'a>), WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let rest = &self.buf[self.offset..];
        match frame_len(rest) {
            Ok(total) => {
                let offset = self.offset;
                self.offset += total;
                Some(Ok((
                    offset,
                    Frame {
                        bytes: &rest[..total],
                    },
                )))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Walk the frames of a buffer holding concatenated frames
pub fn frames(buf: &[u8]) -> Frames<'_> {
    Frames {
        buf,
        offset: 0,
        failed: false,
    }
}

/// Streaming decoder that extracts frames from an arbitrary byte stream
#[derive(Debug)]
pub struct FrameDecoder {
    max_payload: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder
    pub fn new() -> Self {
        Self {
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }

    /// Treat declared lengths above `max_payload` as noise
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Decode one frame from a buffer.
    ///
    /// Bytes before the next sync pair and frames with a bad checksum are
    /// dropped. Returns `None` when more input is needed.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Option<Bytes> {
        loop {
            let start = buf
                .windows(2)
                .position(|w| w[0] == SYNC_CHAR_1 && w[1] == SYNC_CHAR_2);
            match start {
                Some(0) => {}
                Some(skip) => {
                    debug!("Discarding {} bytes before sync", skip);
                    buf.advance(skip);
                }
                None => {
                    // Keep a trailing first sync byte; its partner may follow
                    let keep = usize::from(buf.last() == Some(&SYNC_CHAR_1));
                    let skip = buf.len() - keep;
                    if skip > 0 {
                        buf.advance(skip);
                    }
                    return None;
                }
            }

            if buf.len() < HEADER_SIZE {
                return None;
            }
            let payload_len = u16::from_le_bytes([buf[4], buf[5]]) as usize;
            if payload_len > self.max_payload {
                debug!("Dropping sync with oversized length {}", payload_len);
                buf.advance(2);
                continue;
            }
            let total = payload_len + FRAME_OVERHEAD;
            if buf.len() < total {
                return None;
            }
            if !validate(&buf[..total]) {
                debug!("Dropping frame {:02X}-{:02X} with bad checksum", buf[2], buf[3]);
                buf.advance(2);
                continue;
            }
            return Some(buf.split_to(total).freeze());
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
