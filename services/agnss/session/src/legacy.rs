//! Legacy aiding: ALP file transfer into flash and the ALP server role.
//!
//! The flash transfer runs `Starting -> MainSequence -> Stopping`. During
//! startup the receiver answers the opening stop frame with a NAK, which
//! counts as success; in every later phase a NAK is fatal.
//!
//! The server answers receiver requests for slices of a host-held ALP file
//! and applies receiver updates to it in place.

use crate::error::MgaError;
use crate::event::{FailureReason, LegacyAidingEvent, MsgState, ProgressEvent, TerminationReason};
use crate::flash::{BlockTimeout, FlashBlock, NUDGE};
use crate::session::{Disposition, Outcome, Step};
use agnss_wire::alp::{alpsrv_file_header, alpsrv_reply};
use agnss_wire::header::{aid, class};
use agnss_wire::messages::{aid_alp_data, aid_alp_stop, cfg_msg_disable, cfg_msg_enable};
use agnss_wire::{AckKind, AlpSrvMessage, AlpSrvRequest, Frame, MsgId};
use bytes::Bytes;
use rand::Rng;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

const ALP_MSG: MsgId = MsgId::new(class::AID, aid::ALP);
const ALPSRV_MSG: MsgId = MsgId::new(class::AID, aid::ALPSRV);

/// Frame length of an AID-ALP ACK/NAK
pub(crate) const ALP_RESPONSE_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyPhase {
    Starting,
    MainSequence,
    Stopping,
}

fn legacy(event: LegacyAidingEvent) -> ProgressEvent {
    ProgressEvent::LegacyAiding(event)
}

/// ALP file transfer into receiver flash
#[derive(Debug)]
pub(crate) struct LegacyFlashTransfer {
    data: Bytes,
    pub(crate) blocks: Vec<FlashBlock>,
    current: usize,
    phase: LegacyPhase,
    deadline: Option<Instant>,
}

impl LegacyFlashTransfer {
    pub(crate) fn new(data: Bytes) -> Result<Self, MgaError> {
        let blocks = FlashBlock::split(data.len())?;
        Ok(Self {
            data,
            blocks,
            current: 0,
            phase: LegacyPhase::Starting,
            deadline: None,
        })
    }

    /// Open the startup handshake
    pub(crate) fn start(&mut self, step: &mut Step) {
        info!("Starting legacy flash transfer of {} blocks", self.blocks.len());
        step.out.emit(legacy(LegacyAidingEvent::Startup {
            blocks: self.blocks.len(),
        }));
        step.out.write(aid_alp_stop());
        self.phase = LegacyPhase::Starting;
        self.deadline = Some(step.deadline());
    }

    fn send_block(&mut self, step: &mut Step) {
        let deadline = step.deadline();
        let block = &mut self.blocks[self.current];
        step.out.write(aid_alp_data(&self.data[block.span.clone()]));
        block.state = MsgState::WaitingForAck;
        block.deadline = Some(deadline);
        debug!("ALP block {} sent", block.index);
        step.out
            .emit(legacy(LegacyAidingEvent::FlashBlockSent(block.info(ALP_MSG))));
    }

    fn finalize(&mut self, step: &mut Step) {
        step.out.emit(legacy(LegacyAidingEvent::FinalizeStart));
        self.phase = LegacyPhase::Stopping;
        step.out.write(aid_alp_stop());
        self.deadline = Some(step.deadline());
    }

    /// Handle an AID-ALP ACK or NAK
    pub(crate) fn on_response(&mut self, kind: AckKind, step: &mut Step) -> Outcome {
        match (self.phase, kind) {
            // the receiver NAKs the opening handshake
            (LegacyPhase::Starting, _) => {
                step.out.emit(legacy(LegacyAidingEvent::StartupCompleted));
                self.phase = LegacyPhase::MainSequence;
                self.deadline = None;
                self.send_block(step);
                Outcome::Continue
            }
            (_, AckKind::Nak) => {
                warn!("Legacy aiding NAK in {:?}", self.phase);
                Outcome::Terminate(TerminationReason::ReceiverNak)
            }
            (LegacyPhase::MainSequence, AckKind::Ack) => {
                let block = &mut self.blocks[self.current];
                block.state = MsgState::Received;
                block.deadline = None;
                step.out.emit(legacy(LegacyAidingEvent::FlashBlockComplete(
                    block.info(ALP_MSG),
                )));
                self.current += 1;
                if self.current < self.blocks.len() {
                    self.send_block(step);
                } else {
                    self.finalize(step);
                }
                Outcome::Continue
            }
            (LegacyPhase::Stopping, AckKind::Ack) => {
                info!("Legacy flash transfer finalized");
                step.out.emit(legacy(LegacyAidingEvent::FinalizeCompleted));
                Outcome::Finish
            }
        }
    }

    pub(crate) fn check_timeouts(&mut self, step: &mut Step) -> Outcome {
        match self.phase {
            LegacyPhase::Starting | LegacyPhase::Stopping => {
                if !self.deadline.is_some_and(|d| step.now > d) {
                    return Outcome::Continue;
                }
                if self.phase == LegacyPhase::Starting {
                    warn!("Legacy aiding startup not acknowledged");
                    step.out.emit(legacy(LegacyAidingEvent::StartupFailed(
                        FailureReason::LegacyNoAck,
                    )));
                    step.out.write(aid_alp_stop());
                } else {
                    warn!("Legacy aiding finalize not acknowledged");
                    step.out.emit(legacy(LegacyAidingEvent::FinalizeFailed));
                }
                Outcome::Finish
            }
            LegacyPhase::MainSequence => {
                let block = &mut self.blocks[self.current];
                match block.on_timeout(step) {
                    BlockTimeout::Pending => Outcome::Continue,
                    BlockTimeout::Nudge => {
                        debug!("ALP block {} overdue, nudging receiver", block.index);
                        step.out.write(Bytes::from_static(NUDGE));
                        Outcome::Continue
                    }
                    BlockTimeout::Resend => {
                        self.send_block(step);
                        Outcome::Continue
                    }
                    BlockTimeout::Exhausted => {
                        block.failure = Some(FailureReason::LegacyNoAck);
                        warn!("ALP block {} never acknowledged", block.index);
                        step.out.emit(legacy(LegacyAidingEvent::FlashBlockFailed(
                            block.info(ALP_MSG),
                        )));
                        step.out.write(aid_alp_stop());
                        Outcome::Finish
                    }
                }
            }
        }
    }
}

/// Legacy aiding server serving a shared ALP file
#[derive(Debug)]
pub(crate) struct LegacyServer {
    pub(crate) file_id: u16,
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LegacyServer {
    /// Announce the file and enable receiver requests
    pub(crate) fn start(buffer: Arc<Mutex<Vec<u8>>>, step: &mut Step) -> Result<Self, MgaError> {
        let file_id: u16 = rand::thread_rng().gen_range(1..=u16::MAX);
        let header = {
            let alp = buffer.lock().unwrap_or_else(|e| e.into_inner());
            alpsrv_file_header(file_id, &alp)?
        };

        step.out.write(cfg_msg_enable(ALPSRV_MSG));
        step.out.write(header);
        info!("Legacy aiding server started with file id {:#06x}", file_id);
        step.out
            .emit(legacy(LegacyAidingEvent::ServerStarted { file_id }));

        Ok(Self { file_id, buffer })
    }

    /// Disable receiver requests
    pub(crate) fn stop(&self, step: &mut Step) {
        step.out.write(cfg_msg_disable(ALPSRV_MSG));
        info!("Legacy aiding server {:#06x} stopped", self.file_id);
    }

    /// Answer a request or apply an update
    pub(crate) fn handle(&self, frame: &Frame<'_>, step: &mut Step) -> Disposition {
        let Some(message) = AlpSrvMessage::parse(frame) else {
            return Disposition::Ignored;
        };
        let mut alp = self.buffer.lock().unwrap_or_else(|e| e.into_inner());

        match message {
            AlpSrvMessage::Request(request) => {
                step.out
                    .emit(legacy(LegacyAidingEvent::RequestReceived(request)));
                let reply = request.byte_range(alp.len()).and_then(|range| {
                    let data = &alp[range];
                    let bytes = alpsrv_reply(&request, self.file_id, data).ok()?;
                    let sent = AlpSrvRequest {
                        file_id: self.file_id,
                        data_size: u16::try_from(data.len()).ok()?,
                        ..request
                    };
                    Some((bytes, sent))
                });
                match reply {
                    Some((bytes, sent)) => {
                        debug!(
                            "ALPSRV request ofs {} size {} answered with {} bytes",
                            request.ofs, request.size, sent.data_size
                        );
                        step.out.write(bytes);
                        step.out
                            .emit(legacy(LegacyAidingEvent::RequestCompleted(Some(sent))));
                    }
                    None => {
                        debug!("ALPSRV request ofs {} outside file", request.ofs);
                        step.out
                            .emit(legacy(LegacyAidingEvent::RequestCompleted(None)));
                    }
                }
            }
            AlpSrvMessage::Update(update) => {
                step.out.emit(legacy(LegacyAidingEvent::UpdateReceived {
                    file_id: update.file_id,
                    ofs: update.ofs,
                    size: update.size,
                }));
                if update.file_id != self.file_id {
                    warn!(
                        "ALPSRV update for file {:#06x}, serving {:#06x}",
                        update.file_id, self.file_id
                    );
                    step.out.emit(legacy(LegacyAidingEvent::RequestFailedIdMismatch {
                        file_id: update.file_id,
                    }));
                } else if let Some(range) = update.byte_range(alp.len()) {
                    let n = range.len();
                    alp[range].copy_from_slice(&update.data[..n]);
                    debug!("ALPSRV update applied at ofs {} ({} bytes)", update.ofs, n);
                }
                step.out.emit(legacy(LegacyAidingEvent::UpdateCompleted));
            }
        }
        Disposition::Handled
    }
}
