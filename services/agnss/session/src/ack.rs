//! Acknowledgement matching for online transfers.

use crate::dispatch::OnlineTransfer;
use crate::event::{FailureReason, MsgState, ProgressEvent};
use crate::session::{Outcome, Step};
use agnss_wire::header::{cfg, class};
use agnss_wire::messages::{cfg_navx5_ack_aiding, Navx5Version};
use agnss_wire::{AckKind, GenericAck, MgaAck, MsgId};
use tracing::{debug, warn};

impl OnlineTransfer {
    /// Handle an MGA-ACK; `None` when it matches no outstanding message
    pub(crate) fn on_mga_ack(&mut self, ack: &MgaAck, step: &mut Step) -> Option<Outcome> {
        if self.last_sent.is_none() {
            return None;
        }
        let acked = MsgId::new(class::MGA, ack.msg_id);
        let index = self.messages.iter().position(|m| {
            m.state == MsgState::WaitingForAck && m.echo.msg_id == acked && m.echo.head == ack.echo
        });
        let Some(index) = index else {
            debug!("MGA-ACK for {} matches no outstanding message", acked);
            return None;
        };

        let verdict = match ack.kind {
            AckKind::Ack => None,
            AckKind::Nak => Some(FailureReason::from_info_code(ack.info_code)),
        };
        Some(self.resolve(index, verdict, step))
    }

    /// Handle an ACK-ACK or ACK-NAK; `None` when it is not for us
    pub(crate) fn on_generic_ack(&mut self, ack: &GenericAck, step: &mut Step) -> Option<Outcome> {
        let last = self.last_sent?;

        if self.messages[last].echo.msg_id == ack.echoed
            && ack.echoed.class == class::AID
            && self.messages[last].state == MsgState::WaitingForAck
        {
            let verdict = (!ack.acked).then_some(FailureReason::NotSet);
            return Some(self.resolve(last, verdict, step));
        }

        if !ack.acked && ack.echoed == MsgId::new(class::CFG, cfg::NAVX5) {
            debug!("CFG-NAVX5 v0 rejected, retrying with v3");
            step.out.write(cfg_navx5_ack_aiding(Navx5Version::V3, true));
            return Some(Outcome::Continue);
        }

        None
    }

    /// Mark message `index` received (`None`) or failed, then settle
    fn resolve(&mut self, index: usize, failure: Option<FailureReason>, step: &mut Step) -> Outcome {
        let msg = &mut self.messages[index];
        msg.deadline = None;
        match failure {
            None => {
                msg.state = MsgState::Received;
                debug!("{} (seq {}) acknowledged", msg.echo.msg_id, msg.sequence);
                step.out.emit(ProgressEvent::TransferComplete(msg.info()));
            }
            Some(reason) => {
                msg.state = MsgState::Failed;
                msg.failure = Some(reason);
                warn!(
                    "{} (seq {}) rejected: {:?}",
                    msg.echo.msg_id, msg.sequence, reason
                );
                step.out.emit(ProgressEvent::TransferFailed(msg.info()));
            }
        }
        self.resolved += 1;
        self.settle(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowControl;
    use crate::dispatch::tests::{mga_frame, step, transfer};
    use crate::outbox::Action;
    use agnss_wire::header::{aid, ini_type, mga};
    use agnss_wire::{build_frame, NakReason};

    fn ack_for(kind: AckKind, info: u8, svid: u8) -> MgaAck {
        MgaAck {
            kind,
            version: 0,
            info_code: info,
            msg_id: mga::GPS,
            echo: [1, 0, svid, 0],
        }
    }

    #[test]
    fn test_ack_resolves_matching_message() {
        let mut t = transfer(&[mga_frame(1, 68), mga_frame(2, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        t.start(&mut s);

        let outcome = t.on_mga_ack(&ack_for(AckKind::Ack, 0, 1), &mut s);
        assert_eq!(outcome, Some(Outcome::Continue));
        assert_eq!(t.messages[0].state, MsgState::Received);
        assert_eq!(t.messages[1].state, MsgState::WaitingForAck);

        let outcome = t.on_mga_ack(&ack_for(AckKind::Ack, 0, 2), &mut s);
        assert_eq!(outcome, Some(Outcome::Finish));
    }

    #[test]
    fn test_nak_records_reason() {
        let mut t = transfer(&[mga_frame(1, 68), mga_frame(2, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        t.start(&mut s);

        t.on_mga_ack(&ack_for(AckKind::Nak, 1, 1), &mut s);
        assert_eq!(t.messages[0].state, MsgState::Failed);
        assert_eq!(
            t.messages[0].failure,
            Some(FailureReason::Receiver(NakReason::NoTime))
        );
        assert!(s.out.actions().iter().any(|a| matches!(
            a,
            Action::Progress(ProgressEvent::TransferFailed(i)) if i.sequence == 0
        )));
    }

    #[test]
    fn test_forged_echo_ignored() {
        let mut t = transfer(&[mga_frame(1, 68), mga_frame(2, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        t.start(&mut s);
        let before = t.messages.clone();

        assert_eq!(t.on_mga_ack(&ack_for(AckKind::Ack, 0, 9), &mut s), None);
        // message 1 is not outstanding yet
        assert_eq!(t.on_mga_ack(&ack_for(AckKind::Ack, 0, 2), &mut s), None);
        assert_eq!(t.messages, before);
    }

    #[test]
    fn test_ack_before_anything_sent_ignored() {
        let mut t = transfer(&[mga_frame(1, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        assert_eq!(t.on_mga_ack(&ack_for(AckKind::Ack, 0, 1), &mut s), None);
    }

    #[test]
    fn test_smart_matches_any_outstanding() {
        let frames = [mga_frame(1, 92), mga_frame(2, 92), mga_frame(3, 92)];
        let mut t = transfer(&frames, FlowControl::Smart);
        let mut s = step(FlowControl::Smart);
        t.start(&mut s);
        assert_eq!(t.outstanding().count(), 3);

        t.on_mga_ack(&ack_for(AckKind::Ack, 0, 2), &mut s);
        assert_eq!(t.messages[1].state, MsgState::Received);
        assert_eq!(t.messages[0].state, MsgState::WaitingForAck);
    }

    #[test]
    fn test_generic_ack_for_last_aid_message() {
        let mut ini = vec![0u8; 48];
        ini[0] = ini_type::TIME_UTC;
        let frames = [
            build_frame(class::AID, aid::INI, &[&ini]).unwrap().to_vec(),
            build_frame(class::AID, aid::EPH, &[&[0u8; 104]]).unwrap().to_vec(),
        ];
        let mut t = transfer(&frames, FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        t.start(&mut s);

        let nak = GenericAck {
            acked: false,
            echoed: MsgId::new(class::AID, aid::INI),
        };
        assert_eq!(t.on_generic_ack(&nak, &mut s), Some(Outcome::Continue));
        assert_eq!(t.messages[0].failure, Some(FailureReason::NotSet));
        assert_eq!(t.messages[1].state, MsgState::WaitingForAck);

        let stale = GenericAck {
            acked: true,
            echoed: MsgId::new(class::AID, aid::INI),
        };
        assert_eq!(t.on_generic_ack(&stale, &mut s), None);
    }

    #[test]
    fn test_navx5_nak_resends_v3() {
        let mut t = transfer(&[mga_frame(1, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        t.start(&mut s);

        let nak = GenericAck {
            acked: false,
            echoed: MsgId::new(class::CFG, cfg::NAVX5),
        };
        assert_eq!(t.on_generic_ack(&nak, &mut s), Some(Outcome::Continue));
        let last = s.out.actions().last().unwrap();
        assert!(matches!(last, Action::Write(b) if b.len() == 52 && b[6] == 3));
    }
}
