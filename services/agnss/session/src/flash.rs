//! Offline data transfer into receiver flash.
//!
//! The payload is sent as raw 512-byte blocks, one at a time. Each
//! transmission carries a fresh 16-bit wire sequence number and the
//! receiver's acknowledgement must echo the number of the latest
//! transmission. After the last block a stop frame is written; the session
//! finishes when the receiver acknowledges it.

use crate::error::MgaError;
use crate::event::{FailureReason, MessageInfo, MsgState, ProgressEvent, TerminationReason};
use crate::session::{Outcome, Step};
use agnss_wire::header::{class, mga};
use agnss_wire::messages::{mga_flash_data, mga_flash_stop};
use agnss_wire::{Chunker, FlashAck, FlashAckType, MsgId, FLASH_STOP_SEQUENCE};
use bytes::Bytes;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Single byte written to wake a receiver that missed a block
pub(crate) const NUDGE: &[u8] = &[0x00];

/// One block of a flash transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FlashBlock {
    pub(crate) index: usize,
    pub(crate) span: Range<usize>,
    /// Sequence number of the latest transmission
    pub(crate) wire_seq: u16,
    pub(crate) state: MsgState,
    pub(crate) retry_count: u32,
    pub(crate) deadline: Option<Instant>,
    pub(crate) failure: Option<FailureReason>,
}

/// What to do about an overdue block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockTimeout {
    /// Deadline not reached
    Pending,
    /// Write a nudge byte
    Nudge,
    /// Write the whole block again
    Resend,
    /// Retries used up; block marked failed
    Exhausted,
}

impl FlashBlock {
    /// Split `len` bytes into blocks
    pub(crate) fn split(len: usize) -> Result<Vec<FlashBlock>, MgaError> {
        let chunker = Chunker::new();
        let mut blocks = Vec::new();
        blocks.try_reserve_exact(chunker.block_count(len))?;
        blocks.extend(chunker.split(len).map(|span| FlashBlock {
            index: span.index,
            span: span.range,
            wire_seq: 0,
            state: MsgState::WaitingToSend,
            retry_count: 0,
            deadline: None,
            failure: None,
        }));
        Ok(blocks)
    }

    pub(crate) fn info(&self, msg_id: MsgId) -> MessageInfo {
        MessageInfo {
            sequence: self.index,
            msg_id,
            len: self.span.len(),
            state: self.state,
            retry_count: self.retry_count,
            failure: self.failure,
        }
    }

    /// Advance the nudge-then-resend timeout rule.
    ///
    /// The first expiry asks for a nudge and re-arms the deadline without
    /// touching the retry count. A second expiry asks for a resend, consuming
    /// a retry, until `retry_limit` resends have been made.
    pub(crate) fn on_timeout(&mut self, step: &Step) -> BlockTimeout {
        let overdue = self.deadline.is_some_and(|d| step.now > d);
        if !overdue {
            return BlockTimeout::Pending;
        }
        match self.state {
            MsgState::WaitingForAck => {
                self.state = MsgState::WaitingForAckSecondChance;
                self.deadline = Some(step.deadline());
                BlockTimeout::Nudge
            }
            MsgState::WaitingForAckSecondChance if self.retry_count < step.config.retry_limit => {
                self.retry_count += 1;
                BlockTimeout::Resend
            }
            MsgState::WaitingForAckSecondChance => {
                self.state = MsgState::Failed;
                self.failure = Some(FailureReason::TooManyRetries);
                self.deadline = None;
                BlockTimeout::Exhausted
            }
            _ => BlockTimeout::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlashPhase {
    Blocks,
    Stopping,
}

/// Block transfer into MGA flash
#[derive(Debug)]
pub(crate) struct FlashTransfer {
    data: Bytes,
    pub(crate) blocks: Vec<FlashBlock>,
    current: usize,
    next_seq: u16,
    phase: FlashPhase,
    stop_retries: u32,
    stop_deadline: Option<Instant>,
}

const FLASH_MSG: MsgId = MsgId::new(class::MGA, mga::FLASH);

impl FlashTransfer {
    pub(crate) fn new(data: Bytes) -> Result<Self, MgaError> {
        let blocks = FlashBlock::split(data.len())?;
        Ok(Self {
            data,
            blocks,
            current: 0,
            next_seq: 0,
            phase: FlashPhase::Blocks,
            stop_retries: 0,
            stop_deadline: None,
        })
    }

    /// Transfer consisting of an empty data block and a stop frame
    pub(crate) fn erase(step: &mut Step) -> Self {
        step.out.write(mga_flash_data(0, &[]));
        let mut transfer = Self {
            data: Bytes::new(),
            blocks: Vec::new(),
            current: 0,
            next_seq: 1,
            phase: FlashPhase::Blocks,
            stop_retries: 0,
            stop_deadline: None,
        };
        transfer.send_stop(step);
        transfer
    }

    pub(crate) fn start(&mut self, step: &mut Step) {
        info!("Starting flash transfer of {} blocks", self.blocks.len());
        step.out.emit(ProgressEvent::Start {
            total: self.blocks.len(),
        });
        self.send_block(step);
    }

    fn send_block(&mut self, step: &mut Step) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let deadline = step.deadline();
        let block = &mut self.blocks[self.current];
        step.out
            .write(mga_flash_data(seq, &self.data[block.span.clone()]));
        block.wire_seq = seq;
        block.state = MsgState::WaitingForAck;
        block.deadline = Some(deadline);
        debug!(
            "Flash block {} sent with sequence {}",
            block.index, block.wire_seq
        );
        step.out.emit(ProgressEvent::Sent(block.info(FLASH_MSG)));
    }

    fn send_stop(&mut self, step: &mut Step) {
        step.out.write(mga_flash_stop());
        self.phase = FlashPhase::Stopping;
        self.stop_deadline = Some(step.deadline());
    }

    /// Handle an MGA-FLASH-ACK
    pub(crate) fn on_ack(&mut self, ack: &FlashAck, step: &mut Step) -> Outcome {
        match self.phase {
            FlashPhase::Stopping => {
                match ack.ack_type {
                    FlashAckType::Ack if ack.sequence != FLASH_STOP_SEQUENCE => {
                        warn!("Flash ack for sequence {} while stopping", ack.sequence);
                        Outcome::Terminate(TerminationReason::ProtocolError)
                    }
                    FlashAckType::Ack => {
                        info!("Flash stop acknowledged");
                        Outcome::Finish
                    }
                    _ => {
                        warn!("Flash stop rejected: {:?}", ack.ack_type);
                        Outcome::Terminate(TerminationReason::ReceiverNak)
                    }
                }
            }
            FlashPhase::Blocks => self.on_block_ack(ack, step),
        }
    }

    fn on_block_ack(&mut self, ack: &FlashAck, step: &mut Step) -> Outcome {
        let Some(block) = self.blocks.get_mut(self.current) else {
            return Outcome::Terminate(TerminationReason::ProtocolError);
        };

        // Only a positive ack has to echo the block sequence
        match ack.ack_type {
            FlashAckType::Ack if ack.sequence != block.wire_seq => {
                warn!(
                    "Flash ack sequence {} does not match block {} sequence {}",
                    ack.sequence, block.index, block.wire_seq
                );
                Outcome::Terminate(TerminationReason::ProtocolError)
            }
            FlashAckType::Ack => {
                block.state = MsgState::Received;
                block.deadline = None;
                step.out
                    .emit(ProgressEvent::TransferComplete(block.info(FLASH_MSG)));
                self.current += 1;
                if self.current < self.blocks.len() {
                    self.send_block(step);
                } else {
                    self.send_stop(step);
                }
                Outcome::Continue
            }
            FlashAckType::NakRetry if block.retry_count < step.config.retry_limit => {
                block.retry_count += 1;
                debug!("Flash block {} retry {}", block.index, block.retry_count);
                self.send_block(step);
                Outcome::Continue
            }
            // Retry NAKs count against the retry limit; running out is a rejection
            FlashAckType::NakRetry => {
                block.state = MsgState::Failed;
                block.failure = Some(FailureReason::TooManyRetries);
                block.deadline = None;
                warn!("Flash block {} rejected too often", block.index);
                step.out
                    .emit(ProgressEvent::TransferFailed(block.info(FLASH_MSG)));
                Outcome::Terminate(TerminationReason::ReceiverNak)
            }
            FlashAckType::NakGiveUp => {
                block.state = MsgState::Failed;
                block.failure = Some(FailureReason::NotSet);
                block.deadline = None;
                warn!("Receiver gave up on flash block {}", block.index);
                step.out
                    .emit(ProgressEvent::TransferFailed(block.info(FLASH_MSG)));
                Outcome::Terminate(TerminationReason::ReceiverNak)
            }
        }
    }

    /// Nudge, resend or abandon the current block or stop frame
    pub(crate) fn check_timeouts(&mut self, step: &mut Step) -> Outcome {
        match self.phase {
            FlashPhase::Stopping => {
                if !self.stop_deadline.is_some_and(|d| step.now > d) {
                    return Outcome::Continue;
                }
                if self.stop_retries < step.config.retry_limit {
                    self.stop_retries += 1;
                    debug!("Flash stop retry {}", self.stop_retries);
                    self.send_stop(step);
                    Outcome::Continue
                } else {
                    warn!("Flash stop never acknowledged");
                    Outcome::Terminate(TerminationReason::ReceiverNotResponding)
                }
            }
            FlashPhase::Blocks => {
                let Some(block) = self.blocks.get_mut(self.current) else {
                    return Outcome::Continue;
                };
                match block.on_timeout(step) {
                    BlockTimeout::Pending => Outcome::Continue,
                    BlockTimeout::Nudge => {
                        debug!("Flash block {} overdue, nudging receiver", block.index);
                        step.out.write(Bytes::from_static(NUDGE));
                        Outcome::Continue
                    }
                    BlockTimeout::Resend => {
                        self.send_block(step);
                        Outcome::Continue
                    }
                    BlockTimeout::Exhausted => {
                        warn!("Flash block {} never acknowledged", block.index);
                        step.out
                            .emit(ProgressEvent::TransferFailed(block.info(FLASH_MSG)));
                        Outcome::Terminate(TerminationReason::ReceiverNotResponding)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlowConfig, FlowControl};
    use crate::outbox::Action;
    use std::time::Duration;

    fn step() -> Step {
        Step::new(FlowConfig::default(), Instant::now())
    }

    fn expire(s: &mut Step) {
        s.now += s.config.msg_timeout + Duration::from_millis(1);
    }

    fn ack(ack_type: FlashAckType, sequence: u16) -> FlashAck {
        FlashAck { ack_type, sequence }
    }

    fn writes(s: &Step) -> Vec<Bytes> {
        s.out
            .actions()
            .iter()
            .filter_map(|a| match a {
                Action::Write(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_split_1025_bytes() {
        let blocks = FlashBlock::split(1025).unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2].span, 1024..1025);
    }

    #[test]
    fn test_blocks_then_stop_then_finish() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0xAB; 1025])).unwrap();
        let mut s = step();
        t.start(&mut s);

        assert_eq!(t.on_ack(&ack(FlashAckType::Ack, 0), &mut s), Outcome::Continue);
        assert_eq!(t.on_ack(&ack(FlashAckType::Ack, 1), &mut s), Outcome::Continue);
        assert_eq!(t.on_ack(&ack(FlashAckType::Ack, 2), &mut s), Outcome::Continue);

        let w = writes(&s);
        assert_eq!(w.len(), 4);
        assert_eq!(w[2].len(), 8 + 6 + 1);
        assert_eq!(&w[3][6..8], &[2, 0]);

        assert_eq!(
            t.on_ack(&ack(FlashAckType::Ack, FLASH_STOP_SEQUENCE), &mut s),
            Outcome::Finish
        );
    }

    #[test]
    fn test_sequence_mismatch_is_protocol_error() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 600])).unwrap();
        let mut s = step();
        t.start(&mut s);
        assert_eq!(
            t.on_ack(&ack(FlashAckType::Ack, 5), &mut s),
            Outcome::Terminate(TerminationReason::ProtocolError)
        );
    }

    #[test]
    fn test_nak_retry_uses_new_sequence() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 600])).unwrap();
        let mut s = step();
        t.start(&mut s);

        assert_eq!(t.on_ack(&ack(FlashAckType::NakRetry, 0), &mut s), Outcome::Continue);
        assert_eq!(t.blocks[0].retry_count, 1);
        assert_eq!(t.blocks[0].wire_seq, 1);
        assert_eq!(
            t.on_ack(&ack(FlashAckType::Ack, 0), &mut s),
            Outcome::Terminate(TerminationReason::ProtocolError)
        );
    }

    #[test]
    fn test_nak_retry_exhaustion() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 10])).unwrap();
        let mut s = step();
        t.start(&mut s);
        for seq in 0..s.config.retry_limit as u16 {
            assert_eq!(t.on_ack(&ack(FlashAckType::NakRetry, seq), &mut s), Outcome::Continue);
        }
        let seq = t.blocks[0].wire_seq;
        assert_eq!(
            t.on_ack(&ack(FlashAckType::NakRetry, seq), &mut s),
            Outcome::Terminate(TerminationReason::ReceiverNak)
        );
        assert_eq!(t.blocks[0].failure, Some(FailureReason::TooManyRetries));
    }

    #[test]
    fn test_nak_give_up_terminates() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 10])).unwrap();
        let mut s = step();
        t.start(&mut s);
        assert_eq!(
            t.on_ack(&ack(FlashAckType::NakGiveUp, 0), &mut s),
            Outcome::Terminate(TerminationReason::ReceiverNak)
        );
    }

    #[test]
    fn test_nak_give_up_ignores_sequence() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 600])).unwrap();
        let mut s = step();
        t.start(&mut s);
        assert_eq!(
            t.on_ack(&ack(FlashAckType::NakGiveUp, 7), &mut s),
            Outcome::Terminate(TerminationReason::ReceiverNak)
        );
        assert_eq!(t.blocks[0].state, MsgState::Failed);
    }

    #[test]
    fn test_nak_retry_ignores_sequence() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 600])).unwrap();
        let mut s = step();
        t.start(&mut s);
        let sent = writes(&s).len();

        assert_eq!(t.on_ack(&ack(FlashAckType::NakRetry, 7), &mut s), Outcome::Continue);
        assert_eq!(t.blocks[0].retry_count, 1);
        assert_eq!(writes(&s).len(), sent + 1);
        assert_eq!(t.on_ack(&ack(FlashAckType::Ack, 1), &mut s), Outcome::Continue);
        assert_eq!(t.blocks[0].state, MsgState::Received);
    }

    #[test]
    fn test_stop_nak_ignores_sequence() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 10])).unwrap();
        let mut s = step();
        t.start(&mut s);
        t.on_ack(&ack(FlashAckType::Ack, 0), &mut s);
        assert_eq!(
            t.on_ack(&ack(FlashAckType::NakGiveUp, 3), &mut s),
            Outcome::Terminate(TerminationReason::ReceiverNak)
        );
    }

    #[test]
    fn test_nudge_then_resend() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 10])).unwrap();
        let mut s = step();
        t.start(&mut s);
        let sent = writes(&s).len();

        expire(&mut s);
        assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
        let w = writes(&s);
        assert_eq!(w.len(), sent + 1);
        assert_eq!(&w[sent][..], NUDGE);
        assert_eq!(t.blocks[0].state, MsgState::WaitingForAckSecondChance);
        assert_eq!(t.blocks[0].retry_count, 0);

        expire(&mut s);
        assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
        let w = writes(&s);
        assert_eq!(w.len(), sent + 2);
        assert_eq!(w[sent + 1].len(), 8 + 6 + 10);
        assert_eq!(t.blocks[0].state, MsgState::WaitingForAck);
        assert_eq!(t.blocks[0].retry_count, 1);
    }

    #[test]
    fn test_block_timeout_exhaustion_terminates() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 10])).unwrap();
        let mut s = Step::new(
            FlowConfig {
                policy: FlowControl::Simple,
                retry_limit: 0,
                ..FlowConfig::default()
            },
            Instant::now(),
        );
        t.start(&mut s);
        expire(&mut s);
        assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
        expire(&mut s);
        assert_eq!(
            t.check_timeouts(&mut s),
            Outcome::Terminate(TerminationReason::ReceiverNotResponding)
        );
    }

    #[test]
    fn test_stop_frame_retries_then_gives_up() {
        let mut t = FlashTransfer::new(Bytes::from(vec![0; 10])).unwrap();
        let mut s = step();
        t.start(&mut s);
        t.on_ack(&ack(FlashAckType::Ack, 0), &mut s);

        for _ in 0..s.config.retry_limit {
            expire(&mut s);
            assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
        }
        expire(&mut s);
        assert_eq!(
            t.check_timeouts(&mut s),
            Outcome::Terminate(TerminationReason::ReceiverNotResponding)
        );
    }

    #[test]
    fn test_erase_waits_for_stop_ack() {
        let mut s = step();
        let mut t = FlashTransfer::erase(&mut s);
        let w = writes(&s);
        assert_eq!(w.len(), 2);
        assert_eq!(&w[0][6..12], &[1, 0, 0, 0, 0, 0]);
        assert_eq!(
            t.on_ack(&ack(FlashAckType::Ack, FLASH_STOP_SEQUENCE), &mut s),
            Outcome::Finish
        );
    }
}
