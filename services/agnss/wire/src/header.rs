//! UBX frame header constants and message identifiers.
//!
//! Every UBX frame starts with the same six bytes: two sync bytes, the
//! message class, the message id and a little-endian payload length. This
//! module names the classes and ids the assistance engine reads or writes,
//! and the small enumerations carried inside acknowledgement payloads.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// First sync byte
pub const SYNC_CHAR_1: u8 = 0xB5;
/// Second sync byte
pub const SYNC_CHAR_2: u8 = 0x62;

/// Sync, class, id and length bytes preceding the payload
pub const HEADER_SIZE: usize = 6;

/// Header plus the two checksum bytes
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 2;

/// Largest payload representable in the length field
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Wildcard value for a class or id in an allow-list
pub const WILDCARD: u8 = 0xFF;

/// Message class values
pub mod class {
    /// Acknowledgement class
    pub const ACK: u8 = 0x05;
    /// Configuration class
    pub const CFG: u8 = 0x06;
    /// Legacy AssistNow aiding class
    pub const AID: u8 = 0x0B;
    /// Multiple GNSS assistance class
    pub const MGA: u8 = 0x13;
}

/// Message ids in the MGA class
pub mod mga {
    /// GPS ephemeris, almanac, health and ionosphere
    pub const GPS: u8 = 0x00;
    /// Galileo assistance
    pub const GAL: u8 = 0x02;
    /// BeiDou assistance
    pub const BDS: u8 = 0x03;
    /// QZSS assistance
    pub const QZSS: u8 = 0x05;
    /// GLONASS assistance
    pub const GLO: u8 = 0x06;
    /// AssistNow Offline orbit data
    pub const ANO: u8 = 0x20;
    /// Flash transfer data, stop and acknowledgement
    pub const FLASH: u8 = 0x21;
    /// Initial time, position and clock
    pub const INI: u8 = 0x40;
    /// Per-message assistance acknowledgement
    pub const ACK: u8 = 0x60;
    /// Navigation database dump
    pub const DBD: u8 = 0x80;
}

/// Message ids in the ACK class
pub mod ack {
    /// Message not acknowledged
    pub const NAK: u8 = 0x00;
    /// Message acknowledged
    pub const ACK: u8 = 0x01;
}

/// Message ids in the CFG class
pub mod cfg {
    /// Per-message output rate
    pub const MSG: u8 = 0x01;
    /// Extended navigation settings
    pub const NAVX5: u8 = 0x23;
}

/// Message ids in the AID class
pub mod aid {
    /// Initial time and position
    pub const INI: u8 = 0x01;
    /// GPS health, UTC and ionosphere
    pub const HUI: u8 = 0x02;
    /// GPS almanac
    pub const ALM: u8 = 0x30;
    /// GPS ephemeris
    pub const EPH: u8 = 0x31;
    /// Legacy aiding server request/update
    pub const ALPSRV: u8 = 0x32;
    /// Legacy aiding data transfer
    pub const ALP: u8 = 0x50;
}

/// Sub-type in the first payload byte of MGA-INI
pub mod ini_type {
    /// Position in latitude, longitude, altitude
    pub const POS_LLH: u8 = 0x01;
    /// Time in UTC
    pub const TIME_UTC: u8 = 0x10;
}

/// Sub-type in the first payload byte of MGA-FLASH
pub mod flash_type {
    /// Data block
    pub const DATA: u8 = 0x01;
    /// End of transfer
    pub const STOP: u8 = 0x02;
    /// Receiver acknowledgement
    pub const ACK: u8 = 0x03;
}

/// Message class and id pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MsgId {
    /// Message class
    pub class: u8,
    /// Message id within the class
    pub id: u8,
}

impl MsgId {
    /// Create a class/id pair
    pub const fn new(class: u8, id: u8) -> Self {
        Self { class, id }
    }

    /// True for the MGA per-constellation almanac/ephemeris messages
    pub fn is_mga_almanac(&self) -> bool {
        self.class == class::MGA
            && matches!(
                self.id,
                mga::GPS | mga::GAL | mga::BDS | mga::QZSS | mga::GLO
            )
    }
}

impl std::fmt::Display for MsgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02X}-{:02X}", self.class, self.id)
    }
}

/// Acknowledgement kind carried in MGA-ACK and ALP responses
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckKind {
    /// Message rejected
    Nak = 0,
    /// Message accepted
    Ack = 1,
}

impl TryFrom<u8> for AckKind {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(AckKind::Nak),
            1 => Ok(AckKind::Ack),
            _ => Err(crate::WireError::Code(value)),
        }
    }
}

/// Reason code reported by the receiver in MGA-ACK
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NakReason {
    /// Accepted
    None = 0,
    /// Receiver has no time yet
    NoTime = 1,
    /// Message version not supported
    VersionNotSupported = 2,
    /// Message size does not match its version
    SizeVersionMismatch = 3,
    /// Message data could not be stored
    CouldNotStore = 4,
    /// Receiver not ready for this message
    ReceiverNotReady = 5,
    /// Message type unknown
    MessageUnknown = 6,
}

impl TryFrom<u8> for NakReason {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NakReason::None),
            1 => Ok(NakReason::NoTime),
            2 => Ok(NakReason::VersionNotSupported),
            3 => Ok(NakReason::SizeVersionMismatch),
            4 => Ok(NakReason::CouldNotStore),
            5 => Ok(NakReason::ReceiverNotReady),
            6 => Ok(NakReason::MessageUnknown),
            _ => Err(crate::WireError::Code(value)),
        }
    }
}

/// Acknowledgement type carried in MGA-FLASH-ACK
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashAckType {
    /// Block stored
    Ack = 0,
    /// Block rejected, send it again
    NakRetry = 1,
    /// Block rejected, abandon the transfer
    NakGiveUp = 2,
}

impl TryFrom<u8> for FlashAckType {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FlashAckType::Ack),
            1 => Ok(FlashAckType::NakRetry),
            2 => Ok(FlashAckType::NakGiveUp),
            _ => Err(crate::WireError::Code(value)),
        }
    }
}

bitflags! {
    /// First mask word of UBX-CFG-NAVX5, selecting which settings apply
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Navx5Mask: u16 {
        /// Apply min/max satellite counts
        const MIN_MAX = 1 << 2;
        /// Apply minimum C/N0
        const MIN_CNO = 1 << 3;
        /// Apply initial 3D fix setting
        const INITIAL_FIX_3D = 1 << 6;
        /// Apply week-number rollover setting
        const WKN_ROLL = 1 << 9;
        /// Apply assistance acknowledgement setting
        const ACK_AID = 1 << 10;
        /// Apply PPP setting
        const PPP = 1 << 13;
        /// Apply AssistNow Autonomous setting
        const AOP = 1 << 14;
    }
}
