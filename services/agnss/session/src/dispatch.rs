//! Flow-controlled delivery of discrete assistance messages.
//!
//! Every policy goes through [`OnlineTransfer::send`], which writes the frame,
//! arms its deadline and reports `Sent`. Acknowledgement handling lives in
//! `ack.rs` and deadline handling in `timeout.rs`; both end by calling
//! [`OnlineTransfer::settle`].

use crate::config::FlowControl;
use crate::event::{MsgState, ProgressEvent};
use crate::message::MessageDescriptor;
use crate::session::{Outcome, Step};
use agnss_wire::messages::{cfg_navx5_ack_aiding, Navx5Version};
use bytes::Bytes;
use tracing::debug;

/// Online transfer of a parsed message list
#[derive(Debug)]
pub(crate) struct OnlineTransfer {
    pub(crate) data: Bytes,
    pub(crate) messages: Vec<MessageDescriptor>,
    pub(crate) policy: FlowControl,
    /// Index of the next unsent message
    pub(crate) next: usize,
    /// Index of the most recently written message
    pub(crate) last_sent: Option<usize>,
    pub(crate) resolved: usize,
}

impl OnlineTransfer {
    pub(crate) fn new(data: Bytes, messages: Vec<MessageDescriptor>, policy: FlowControl) -> Self {
        Self {
            data,
            messages,
            policy,
            next: 0,
            last_sent: None,
            resolved: 0,
        }
    }

    /// Report the start and write the first messages the policy allows
    pub(crate) fn start(&mut self, step: &mut Step) -> Outcome {
        step.out.emit(ProgressEvent::Start {
            total: self.messages.len(),
        });

        match self.policy {
            FlowControl::None => {
                for index in 0..self.messages.len() {
                    self.send(index, step);
                    let msg = &mut self.messages[index];
                    msg.state = MsgState::Received;
                    msg.deadline = None;
                    step.out.emit(ProgressEvent::TransferComplete(msg.info()));
                }
                self.next = self.messages.len();
                self.resolved = self.messages.len();
                Outcome::Finish
            }
            FlowControl::Simple | FlowControl::Smart => {
                step.out.write(cfg_navx5_ack_aiding(Navx5Version::V0, true));
                self.refill(step);
                Outcome::Continue
            }
        }
    }

    /// Write message `index`, arm its deadline and report it
    pub(crate) fn send(&mut self, index: usize, step: &mut Step) {
        let deadline = step.deadline();
        let msg = &mut self.messages[index];
        step.out.write(self.data.slice(msg.span.clone()));
        msg.state = MsgState::WaitingForAck;
        msg.deadline = Some(deadline);
        self.last_sent = Some(index);
        debug!(
            "Sent {} (seq {}, retry {})",
            msg.echo.msg_id, msg.sequence, msg.retry_count
        );
        step.out.emit(ProgressEvent::Sent(msg.info()));
    }

    /// Messages currently awaiting an acknowledgement
    pub(crate) fn outstanding(&self) -> impl Iterator<Item = &MessageDescriptor> {
        self.messages
            .iter()
            .filter(|m| m.state == MsgState::WaitingForAck)
    }

    fn outstanding_bytes(&self) -> usize {
        self.outstanding().map(MessageDescriptor::len).sum()
    }

    /// Send as many unsent messages as the policy allows
    pub(crate) fn refill(&mut self, step: &mut Step) {
        while self.next < self.messages.len() {
            let allowed = match self.policy {
                FlowControl::None => true,
                FlowControl::Simple => self.outstanding().next().is_none(),
                FlowControl::Smart => {
                    let outstanding = self.outstanding_bytes();
                    outstanding == 0
                        || outstanding + self.messages[self.next].len()
                            <= step.config.rx_buffer_budget
                }
            };
            if !allowed {
                break;
            }
            self.send(self.next, step);
            self.next += 1;
        }
    }

    /// Finish once every message is resolved, otherwise keep the pipe full
    pub(crate) fn settle(&mut self, step: &mut Step) -> Outcome {
        if self.resolved == self.messages.len() {
            return Outcome::Finish;
        }
        self.refill(step);
        Outcome::Continue
    }
}
