//! UBX wire format for AssistNow assistance delivery.
//!
//! This crate provides the low-level pieces the transfer engine builds on:
//! checksumming, parsing and building UBX frames, walking frame streams,
//! filtering assistance messages, chunking flash payloads, and the fixed
//! layouts of the control, time, position and legacy aiding messages.
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | 0xB5 0x62            | sync bytes                 |
//! +----------------------+----------------------------+
//! | class u8, id u8      | message identifier         |
//! +----------------------+----------------------------+
//! | u16 length (LE)      | payload length             |
//! +----------------------+----------------------------+
//! | payload              | variable (0..65535)        |
//! +----------------------+----------------------------+
//! | ck_a u8, ck_b u8     | Fletcher over class..payload|
//! +----------------------+----------------------------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod alp;
pub mod chunk;
pub mod codec;
pub mod error;
pub mod filter;
pub mod frame;
pub mod header;
pub mod ini;
pub mod messages;
pub mod offline;

// Re-export main types
pub use alp::{AlpSrvMessage, AlpSrvRequest, AlpSrvUpdate, ALP_FILE_HEADER_LEN};
pub use chunk::{BlockSpan, Chunker, FLASH_BLOCK_SIZE};
pub use codec::{build_frame, FrameBuilder};
pub use error::WireError;
pub use filter::AllowList;
pub use frame::{checksum, frames, parse, validate, Frame, FrameDecoder, Frames, ParseMode};
pub use header::{
    AckKind, FlashAckType, MsgId, NakReason, Navx5Mask, FRAME_OVERHEAD, HEADER_SIZE,
    MAX_PAYLOAD_SIZE, WILDCARD,
};
pub use ini::{PosLlh, TimeAccuracy, TimeAdjust};
pub use messages::{FlashAck, GenericAck, MgaAck, Navx5Version, ECHO_LEN, FLASH_STOP_SEQUENCE};
