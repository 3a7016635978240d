//! Legacy aiding server messages (UBX-AID-ALPSRV).
//!
//! The receiver asks the host for slices of an ALP file by offset and size
//! in 16-bit words, and may push updated slices back. Every request starts
//! with a 16-byte header; updates use a shorter 8-byte header followed by
//! the new data.

use crate::codec::FrameBuilder;
use crate::frame::Frame;
use crate::header::{aid, class, MsgId};
use crate::WireError;
use bytes::Bytes;
use std::ops::Range;

/// Size of the ALP file header sent when the server starts
pub const ALP_FILE_HEADER_LEN: usize = 84;

/// Size of an ALPSRV request header
pub const REQUEST_HEADER_LEN: usize = 16;

/// Size of an ALPSRV update header
pub const UPDATE_HEADER_LEN: usize = 8;

/// Request type marking a data update
pub const UPDATE_TYPE: u8 = 0xFF;

/// Request type used for the initial file header
const HEADER_REQUEST_TYPE: u8 = 1;

/// ALPSRV request header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlpSrvRequest {
    /// Header size in bytes
    pub id_size: u8,
    /// Request type
    pub kind: u8,
    /// Offset in words
    pub ofs: u16,
    /// Size in words
    pub size: u16,
    /// File id the request refers to
    pub file_id: u16,
    /// Bytes of data following the header
    pub data_size: u16,
    /// Receiver-private identifier
    pub id1: u8,
    /// Receiver-private identifier
    pub id2: u8,
    /// Receiver-private identifier
    pub id3: u32,
}

impl AlpSrvRequest {
    fn decode(p: &[u8]) -> Self {
        Self {
            id_size: p[0],
            kind: p[1],
            ofs: u16::from_le_bytes([p[2], p[3]]),
            size: u16::from_le_bytes([p[4], p[5]]),
            file_id: u16::from_le_bytes([p[6], p[7]]),
            data_size: u16::from_le_bytes([p[8], p[9]]),
            id1: p[10],
            id2: p[11],
            id3: u32::from_le_bytes([p[12], p[13], p[14], p[15]]),
        }
    }

    /// Encode to the 16-byte wire layout
    pub fn encode(&self) -> [u8; REQUEST_HEADER_LEN] {
        let mut out = [0u8; REQUEST_HEADER_LEN];
        out[0] = self.id_size;
        out[1] = self.kind;
        out[2..4].copy_from_slice(&self.ofs.to_le_bytes());
        out[4..6].copy_from_slice(&self.size.to_le_bytes());
        out[6..8].copy_from_slice(&self.file_id.to_le_bytes());
        out[8..10].copy_from_slice(&self.data_size.to_le_bytes());
        out[10] = self.id1;
        out[11] = self.id2;
        out[12..16].copy_from_slice(&self.id3.to_le_bytes());
        out
    }

    /// Byte range of a `len`-byte buffer this request asks for
    pub fn byte_range(&self, len: usize) -> Option<Range<usize>> {
        let ofs = usize::from(self.ofs) * 2;
        if ofs >= len {
            return None;
        }
        clamp_range(ofs, usize::from(self.size) * 2, len)
    }
}

/// ALPSRV update: new data for part of the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlpSrvUpdate<'a> {
    /// Offset in words
    pub ofs: u16,
    /// Size in words
    pub size: u16,
    /// File id the update applies to
    pub file_id: u16,
    /// Replacement data, `size * 2` bytes
    pub data: &'a [u8],
}

impl<'a> AlpSrvUpdate<'a> {
    /// Byte range of a `len`-byte buffer this update overwrites
    pub fn byte_range(&self, len: usize) -> Option<Range<usize>> {
        clamp_range(usize::from(self.ofs) * 2, self.data.len(), len)
    }
}

/// Inbound ALPSRV message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlpSrvMessage<'a> {
    /// Receiver asks for data
    Request(AlpSrvRequest),
    /// Receiver pushes data
    Update(AlpSrvUpdate<'a>),
}

impl<'a> AlpSrvMessage<'a> {
    /// Decode an AID-ALPSRV frame; anything malformed yields `None`
    pub fn parse(frame: &Frame<'a>) -> Option<Self> {
        if frame.msg_id() != MsgId::new(class::AID, aid::ALPSRV) {
            return None;
        }
        let p = frame.payload();
        if p.len() <= UPDATE_HEADER_LEN - 2 || p.len() < usize::from(p[0]) {
            return None;
        }
        if p[1] == UPDATE_TYPE {
            let size = u16::from_le_bytes([p[4], p[5]]);
            if p.len() != UPDATE_HEADER_LEN + usize::from(size) * 2 {
                return None;
            }
            Some(AlpSrvMessage::Update(AlpSrvUpdate {
                ofs: u16::from_le_bytes([p[2], p[3]]),
                size,
                file_id: u16::from_le_bytes([p[6], p[7]]),
                data: &p[UPDATE_HEADER_LEN..],
            }))
        } else {
            if usize::from(p[0]) != REQUEST_HEADER_LEN || p.len() < REQUEST_HEADER_LEN {
                return None;
            }
            Some(AlpSrvMessage::Request(AlpSrvRequest::decode(p)))
        }
    }
}

/// Clamp `size` bytes at `ofs` to a `len`-byte buffer.
///
/// An offset at or past the end is pulled back to the last byte.
pub fn clamp_range(ofs: usize, size: usize, len: usize) -> Option<Range<usize>> {
    if size == 0 || len == 0 {
        return None;
    }
    if ofs + size >= len {
        let ofs = ofs.min(len - 1);
        return Some(ofs..len);
    }
    Some(ofs..ofs + size)
}

/// AID-ALPSRV announcing a new ALP file, carrying its 84-byte header
pub fn alpsrv_file_header(file_id: u16, alp_file: &[u8]) -> Result<Bytes, WireError> {
    if alp_file.len() < ALP_FILE_HEADER_LEN {
        return Err(WireError::PayloadTooShort);
    }
    let header = AlpSrvRequest {
        id_size: REQUEST_HEADER_LEN as u8,
        kind: HEADER_REQUEST_TYPE,
        ofs: 0,
        size: (ALP_FILE_HEADER_LEN / 2) as u16,
        file_id,
        data_size: ALP_FILE_HEADER_LEN as u16,
        id1: 0,
        id2: 0,
        id3: 0,
    }
    .encode();
    FrameBuilder::new(class::AID, aid::ALPSRV)
        .part(&header)
        .part(&alp_file[..ALP_FILE_HEADER_LEN])
        .build()
}

/// AID-ALPSRV answering `request` with `data`
pub fn alpsrv_reply(request: &AlpSrvRequest, file_id: u16, data: &[u8]) -> Result<Bytes, WireError> {
    let data_size = u16::try_from(data.len()).map_err(|_| WireError::PayloadTooLarge(data.len()))?;
    let header = AlpSrvRequest {
        file_id,
        data_size,
        ..*request
    }
    .encode();
    FrameBuilder::new(class::AID, aid::ALPSRV)
        .part(&header)
        .part(data)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::build_frame;

    fn request(ofs: u16, size: u16) -> Bytes {
        let req = AlpSrvRequest {
            id_size: 16,
            kind: 0,
            ofs,
            size,
            file_id: 0,
            data_size: 0,
            id1: 7,
            id2: 8,
            id3: 9,
        };
        build_frame(class::AID, aid::ALPSRV, &[&req.encode()]).unwrap()
    }

    #[test]
    fn test_file_header_frame() {
        let alp = vec![0xAAu8; 200];
        let frame = alpsrv_file_header(0x1234, &alp).unwrap();
        assert_eq!(frame.len(), 8 + 16 + 84);
        assert_eq!(&frame[6..12], &[16, 1, 0, 0, 42, 0]);
        assert_eq!(&frame[12..16], &[0x34, 0x12, 84, 0]);
        assert!(frame[22..106].iter().all(|b| *b == 0xAA));
    }

    #[test]
    fn test_file_header_needs_84_bytes() {
        assert_eq!(
            alpsrv_file_header(1, &[0u8; 83]),
            Err(WireError::PayloadTooShort)
        );
    }

    #[test]
    fn test_parse_request() {
        let bytes = request(5, 10);
        match AlpSrvMessage::parse(&Frame::parse_exact(&bytes).unwrap()) {
            Some(AlpSrvMessage::Request(req)) => {
                assert_eq!(req.ofs, 5);
                assert_eq!(req.size, 10);
                assert_eq!(req.id3, 9);
                assert_eq!(req.byte_range(100), Some(10..30));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_request_clamped_to_buffer() {
        let bytes = request(40, 10);
        let Some(AlpSrvMessage::Request(req)) = AlpSrvMessage::parse(&Frame::parse_exact(&bytes).unwrap()) else {
            panic!("not a request");
        };
        assert_eq!(req.byte_range(90), Some(80..90));
        assert_eq!(req.byte_range(80), None);
    }

    #[test]
    fn test_parse_update() {
        let payload = [8u8, 0xFF, 2, 0, 2, 0, 0x34, 0x12, 1, 2, 3, 4];
        let bytes = build_frame(class::AID, aid::ALPSRV, &[&payload]).unwrap();
        match AlpSrvMessage::parse(&Frame::parse_exact(&bytes).unwrap()) {
            Some(AlpSrvMessage::Update(update)) => {
                assert_eq!(update.file_id, 0x1234);
                assert_eq!(update.data, &[1, 2, 3, 4]);
                assert_eq!(update.byte_range(100), Some(4..8));
                assert_eq!(update.byte_range(6), Some(4..6));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_update_length_mismatch_ignored() {
        let payload = [8u8, 0xFF, 0, 0, 3, 0, 0, 0, 1, 2];
        let bytes = build_frame(class::AID, aid::ALPSRV, &[&payload]).unwrap();
        assert!(AlpSrvMessage::parse(&Frame::parse_exact(&bytes).unwrap()).is_none());
    }

    #[test]
    fn test_reply_rewrites_file_id_and_size() {
        let bytes = request(0, 2);
        let Some(AlpSrvMessage::Request(req)) = AlpSrvMessage::parse(&Frame::parse_exact(&bytes).unwrap()) else {
            panic!("not a request");
        };
        let reply = alpsrv_reply(&req, 0xBEEF, &[1, 2, 3, 4]).unwrap();
        assert_eq!(&reply[12..16], &[0xEF, 0xBE, 4, 0]);
        assert_eq!(&reply[16..22], &[7, 8, 9, 0, 0, 0]);
        assert_eq!(&reply[22..26], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_clamp_range() {
        assert_eq!(clamp_range(0, 4, 10), Some(0..4));
        assert_eq!(clamp_range(8, 4, 10), Some(8..10));
        assert_eq!(clamp_range(12, 4, 10), Some(9..10));
        assert_eq!(clamp_range(0, 0, 10), None);
    }
}
