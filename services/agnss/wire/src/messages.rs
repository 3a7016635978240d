//! Control frames written by the engine and acknowledgements read back.

use crate::chunk::FLASH_BLOCK_SIZE;
use crate::codec::encode_fixed;
use crate::frame::Frame;
use crate::header::{aid, class, cfg, flash_type, mga, AckKind, FlashAckType, MsgId, Navx5Mask};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Sequence number carried by the acknowledgement of a flash stop frame
pub const FLASH_STOP_SEQUENCE: u16 = 0xFFFF;

/// Bytes of an assistance payload echoed back in MGA-ACK
pub const ECHO_LEN: usize = 4;

/// Layout version of UBX-CFG-NAVX5
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Navx5Version {
    /// Version 0, 40-byte payload
    V0,
    /// Version 3, 44-byte payload
    V3,
}

impl Navx5Version {
    fn payload_len(self) -> usize {
        match self {
            Navx5Version::V0 => 40,
            Navx5Version::V3 => 44,
        }
    }
}

/// UBX-CFG-NAVX5 switching assistance acknowledgements on or off
pub fn cfg_navx5_ack_aiding(version: Navx5Version, enable: bool) -> Bytes {
    let mut payload = [0u8; 44];
    payload[0] = match version {
        Navx5Version::V0 => 0,
        Navx5Version::V3 => 3,
    };
    payload[2..4].copy_from_slice(&Navx5Mask::ACK_AID.bits().to_le_bytes());
    payload[17] = u8::from(enable);
    encode_fixed(class::CFG, cfg::NAVX5, &[&payload[..version.payload_len()]])
}

/// UBX-CFG-MSG enabling output of `msg` on every port
pub fn cfg_msg_enable(msg: MsgId) -> Bytes {
    encode_fixed(
        class::CFG,
        cfg::MSG,
        &[&[msg.class, msg.id, 1, 1, 1, 1, 1, 0]],
    )
}

/// UBX-CFG-MSG disabling output of `msg` on the current port
pub fn cfg_msg_disable(msg: MsgId) -> Bytes {
    encode_fixed(class::CFG, cfg::MSG, &[&[msg.class, msg.id, 0]])
}

/// UBX-MGA-FLASH-DATA carrying one block; `data` may be empty
pub fn mga_flash_data(sequence: u16, data: &[u8]) -> Bytes {
    debug_assert!(data.len() <= FLASH_BLOCK_SIZE);
    let seq = sequence.to_le_bytes();
    let size = (data.len() as u16).to_le_bytes();
    let header = [flash_type::DATA, 0, seq[0], seq[1], size[0], size[1]];
    encode_fixed(class::MGA, mga::FLASH, &[&header, data])
}

/// UBX-MGA-FLASH-STOP
pub fn mga_flash_stop() -> Bytes {
    encode_fixed(class::MGA, mga::FLASH, &[&[flash_type::STOP, 0]])
}

/// UBX-AID-ALP carrying one raw block
pub fn aid_alp_data(data: &[u8]) -> Bytes {
    debug_assert!(data.len() <= FLASH_BLOCK_SIZE);
    encode_fixed(class::AID, aid::ALP, &[data])
}

/// UBX-AID-ALP end-of-data marker
pub fn aid_alp_stop() -> Bytes {
    encode_fixed(class::AID, aid::ALP, &[&[0xFF]])
}

/// Decoded UBX-MGA-ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MgaAck {
    /// Accepted or rejected
    pub kind: AckKind,
    /// Message version
    pub version: u8,
    /// Receiver reason code
    pub info_code: u8,
    /// MGA id of the acknowledged message
    pub msg_id: u8,
    /// First payload bytes of the acknowledged message
    pub echo: [u8; ECHO_LEN],
}

impl MgaAck {
    /// Decode an MGA-ACK frame; anything else yields `None`
    pub fn parse(frame: &Frame<'_>) -> Option<Self> {
        if frame.msg_id() != MsgId::new(class::MGA, mga::ACK) {
            return None;
        }
        let p = frame.payload();
        if p.len() != 4 + ECHO_LEN {
            return None;
        }
        Some(Self {
            kind: AckKind::try_from(p[0]).ok()?,
            version: p[1],
            info_code: p[2],
            msg_id: p[3],
            echo: [p[4], p[5], p[6], p[7]],
        })
    }
}

/// Decoded UBX-ACK-ACK or UBX-ACK-NAK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericAck {
    /// ACK-ACK when true, ACK-NAK otherwise
    pub acked: bool,
    /// Class and id of the message being answered
    pub echoed: MsgId,
}

impl GenericAck {
    /// Decode an ACK class frame; anything else yields `None`
    pub fn parse(frame: &Frame<'_>) -> Option<Self> {
        if frame.class() != class::ACK {
            return None;
        }
        let acked = match frame.id() {
            crate::header::ack::ACK => true,
            crate::header::ack::NAK => false,
            _ => return None,
        };
        match frame.payload() {
            [c, i] => Some(Self {
                acked,
                echoed: MsgId::new(*c, *i),
            }),
            _ => None,
        }
    }
}

/// Decoded UBX-MGA-FLASH-ACK
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashAck {
    /// Receiver verdict
    pub ack_type: FlashAckType,
    /// Sequence number of the answered block, or [`FLASH_STOP_SEQUENCE`]
    pub sequence: u16,
}

impl FlashAck {
    /// Decode an MGA-FLASH-ACK frame; anything else yields `None`
    pub fn parse(frame: &Frame<'_>) -> Option<Self> {
        if frame.msg_id() != MsgId::new(class::MGA, mga::FLASH) {
            return None;
        }
        match frame.payload() {
            [flash_type::ACK, _version, ack_type, _reserved, s0, s1] => Some(Self {
                ack_type: FlashAckType::try_from(*ack_type).ok()?,
                sequence: u16::from_le_bytes([*s0, *s1]),
            }),
            _ => None,
        }
    }
}

/// Decode the one-byte UBX-AID-ALP response to a legacy flash block
pub fn alp_response(frame: &Frame<'_>) -> Option<AckKind> {
    if frame.msg_id() != MsgId::new(class::AID, aid::ALP) {
        return None;
    }
    match frame.payload() {
        [b] => AckKind::try_from(*b).ok(),
        _ => None,
    }
}
