//! Session state and the single teardown path.
//!
//! A session is either idle or active. An active session runs at most one
//! transfer and may additionally host the legacy aiding server. Transfers
//! never tear the session down themselves; they return an [`Outcome`] that
//! [`SessionContext::apply`] turns into exactly one terminal event.

use crate::config::FlowConfig;
use crate::dispatch::OnlineTransfer;
use crate::event::{EventInterface, ProgressEvent, TerminationReason};
use crate::flash::FlashTransfer;
use crate::legacy::{LegacyFlashTransfer, LegacyServer, ALP_RESPONSE_LEN};
use crate::outbox::Outbox;
use agnss_wire::messages::alp_response;
use agnss_wire::{FlashAck, Frame, GenericAck, MgaAck, FRAME_OVERHEAD};
use std::time::Instant;
use tracing::info;

/// Frame length of an MGA-ACK
const MGA_ACK_LEN: usize = FRAME_OVERHEAD + 8;
/// Frame length of an ACK-ACK or ACK-NAK
const GENERIC_ACK_LEN: usize = FRAME_OVERHEAD + 2;

/// Result of a state machine transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// Keep going
    Continue,
    /// Session completed normally
    Finish,
    /// Session must end early
    Terminate(TerminationReason),
}

/// What the engine did with an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Frame was consumed by the active session
    Handled,
    /// Frame was not relevant
    Ignored,
}

/// Inputs and collected effects of one engine call
#[derive(Debug)]
pub(crate) struct Step {
    pub(crate) config: FlowConfig,
    pub(crate) now: Instant,
    pub(crate) out: Outbox,
}

impl Step {
    pub(crate) fn new(config: FlowConfig, now: Instant) -> Self {
        Self {
            config,
            now,
            out: Outbox::new(),
        }
    }

    /// Deadline for something written now
    pub(crate) fn deadline(&self) -> Instant {
        self.now + self.config.msg_timeout
    }
}

/// Transfer running inside an active session
#[derive(Debug, Default)]
pub(crate) enum Transfer {
    #[default]
    None,
    Online(OnlineTransfer),
    Flash(FlashTransfer),
    Legacy(LegacyFlashTransfer),
}

/// State owned by an active session
#[derive(Debug, Default)]
pub(crate) struct ActiveSession {
    pub(crate) transfer: Transfer,
    pub(crate) server: Option<LegacyServer>,
}

impl ActiveSession {
    /// Whether a transfer or the server is running
    pub(crate) fn is_busy(&self) -> bool {
        !matches!(self.transfer, Transfer::None) || self.server.is_some()
    }

    /// Route an inbound frame; `None` when nothing consumed it
    pub(crate) fn on_frame(&mut self, frame: &Frame<'_>, step: &mut Step) -> Option<Outcome> {
        if let Some(server) = &self.server {
            return match server.handle(frame, step) {
                Disposition::Handled => Some(Outcome::Continue),
                Disposition::Ignored => None,
            };
        }

        match &mut self.transfer {
            Transfer::None => None,
            Transfer::Legacy(t) if frame.len() == ALP_RESPONSE_LEN => {
                let kind = alp_response(frame)?;
                Some(t.on_response(kind, step))
            }
            Transfer::Legacy(_) => None,
            Transfer::Flash(t) => {
                let ack = FlashAck::parse(frame)?;
                Some(t.on_ack(&ack, step))
            }
            Transfer::Online(t) => match frame.len() {
                MGA_ACK_LEN => t.on_mga_ack(&MgaAck::parse(frame)?, step),
                GENERIC_ACK_LEN => t.on_generic_ack(&GenericAck::parse(frame)?, step),
                _ => None,
            },
        }
    }

    /// Run deadline handling for the active transfer
    pub(crate) fn check_timeouts(&mut self, step: &mut Step) -> Outcome {
        match &mut self.transfer {
            Transfer::None => Outcome::Continue,
            Transfer::Online(t) => t.check_timeouts(step),
            Transfer::Flash(t) => t.check_timeouts(step),
            Transfer::Legacy(t) => t.check_timeouts(step),
        }
    }
}

/// Engine session state
#[derive(Debug, Default)]
pub(crate) enum SessionState {
    #[default]
    Idle,
    Active(ActiveSession),
}

/// Everything the engine guards with its lock
#[derive(Debug, Default)]
pub(crate) struct SessionContext {
    pub(crate) config: Option<FlowConfig>,
    pub(crate) events: Option<EventInterface>,
    pub(crate) state: SessionState,
}

impl SessionContext {
    pub(crate) fn active(&mut self) -> Option<&mut ActiveSession> {
        match &mut self.state {
            SessionState::Active(session) => Some(session),
            SessionState::Idle => None,
        }
    }

    /// Apply a transition outcome, tearing the session down if it ended
    pub(crate) fn apply(&mut self, outcome: Outcome, step: &mut Step) {
        match outcome {
            Outcome::Continue => {}
            Outcome::Finish => self.stop(ProgressEvent::Finish, step),
            Outcome::Terminate(reason) => self.stop(ProgressEvent::Terminated(reason), step),
        }
    }

    /// Release all session state and report how it ended
    pub(crate) fn stop(&mut self, terminal: ProgressEvent, step: &mut Step) {
        debug_assert!(terminal.is_terminal());
        let previous = std::mem::take(&mut self.state);
        if let SessionState::Active(ActiveSession {
            server: Some(server),
            ..
        }) = &previous
        {
            server.stop(step);
        }
        info!("Session ended: {:?}", terminal);
        step.out.emit(terminal);
    }
}
