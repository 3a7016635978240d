//! Per-message transfer descriptors.

use crate::event::{FailureReason, MessageInfo, MsgState};
use agnss_wire::{Frame, MsgId, ECHO_LEN};
use std::ops::Range;
use std::time::Instant;

/// Identity an acknowledgement must echo back to match a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoFingerprint {
    /// Class and id of the message
    pub msg_id: MsgId,
    /// First payload bytes, zero padded
    pub head: [u8; ECHO_LEN],
}

impl EchoFingerprint {
    /// Fingerprint of a frame
    pub fn of(frame: &Frame<'_>) -> Self {
        let mut head = [0u8; ECHO_LEN];
        let payload = frame.payload();
        let n = payload.len().min(ECHO_LEN);
        head[..n].copy_from_slice(&payload[..n]);
        Self {
            msg_id: frame.msg_id(),
            head,
        }
    }
}

/// One frame of an active transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDescriptor {
    /// Byte span in the session buffer
    pub span: Range<usize>,
    /// Position in transfer order
    pub sequence: usize,
    /// Delivery state
    pub state: MsgState,
    /// Resends so far
    pub retry_count: u32,
    /// When the outstanding acknowledgement expires
    pub deadline: Option<Instant>,
    /// Failure reason, when failed
    pub failure: Option<FailureReason>,
    /// Acknowledgement matching key
    pub echo: EchoFingerprint,
}

impl MessageDescriptor {
    /// Frame length in bytes
    pub fn len(&self) -> usize {
        self.span.len()
    }

    /// Always false; descriptors cover whole frames
    pub fn is_empty(&self) -> bool {
        self.span.is_empty()
    }

    /// Received or failed
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, MsgState::Received | MsgState::Failed)
    }

    /// Event snapshot
    pub fn info(&self) -> MessageInfo {
        MessageInfo {
            sequence: self.sequence,
            msg_id: self.echo.msg_id,
            len: self.len(),
            state: self.state,
            retry_count: self.retry_count,
            failure: self.failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agnss_wire::build_frame;

    #[test]
    fn test_fingerprint_pads_short_payload() {
        let bytes = build_frame(0x13, 0x40, &[&[0x10, 0x00]]).unwrap();
        let fp = EchoFingerprint::of(&Frame::parse_exact(&bytes).unwrap());
        assert_eq!(fp.msg_id, MsgId::new(0x13, 0x40));
        assert_eq!(fp.head, [0x10, 0x00, 0x00, 0x00]);
    }
}
