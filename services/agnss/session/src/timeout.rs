//! Deadline handling for online transfers.

use crate::dispatch::OnlineTransfer;
use crate::event::{FailureReason, MsgState, ProgressEvent};
use crate::session::{Outcome, Step};
use tracing::warn;

impl OnlineTransfer {
    /// Resend or fail every outstanding message whose deadline has passed
    pub(crate) fn check_timeouts(&mut self, step: &mut Step) -> Outcome {
        let expired: Vec<usize> = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.state == MsgState::WaitingForAck)
            .filter(|(_, m)| m.deadline.is_some_and(|d| step.now > d))
            .map(|(i, _)| i)
            .collect();

        if expired.is_empty() {
            return Outcome::Continue;
        }

        for index in expired {
            if self.messages[index].retry_count < step.config.retry_limit {
                self.messages[index].retry_count += 1;
                self.send(index, step);
                continue;
            }

            let msg = &mut self.messages[index];
            msg.state = MsgState::Failed;
            msg.failure = Some(FailureReason::TooManyRetries);
            msg.deadline = None;
            warn!(
                "{} (seq {}) not acknowledged after {} retries",
                msg.echo.msg_id, msg.sequence, msg.retry_count
            );
            step.out.emit(ProgressEvent::TransferFailed(msg.info()));
            self.resolved += 1;
        }

        self.settle(step)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::FlowControl;
    use crate::dispatch::tests::{mga_frame, step, transfer};
    use crate::event::{FailureReason, MsgState, ProgressEvent};
    use crate::outbox::Action;
    use crate::session::Outcome;
    use std::time::Duration;

    #[test]
    fn test_deadline_not_passed_until_strictly_after() {
        let mut t = transfer(&[mga_frame(1, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        t.start(&mut s);

        s.now += s.config.msg_timeout;
        let writes_before = s.out.actions().len();
        assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
        assert_eq!(s.out.actions().len(), writes_before);
        assert_eq!(t.messages[0].retry_count, 0);
    }

    #[test]
    fn test_retry_ceiling_is_exact() {
        let mut t = transfer(&[mga_frame(1, 68), mga_frame(2, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        let limit = s.config.retry_limit;
        t.start(&mut s);

        for retry in 1..=limit {
            s.now += s.config.msg_timeout + Duration::from_millis(1);
            assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
            assert_eq!(t.messages[0].retry_count, retry);
            assert_eq!(t.messages[0].state, MsgState::WaitingForAck);
        }

        s.now += s.config.msg_timeout + Duration::from_millis(1);
        assert_eq!(t.check_timeouts(&mut s), Outcome::Continue);
        assert_eq!(t.messages[0].state, MsgState::Failed);
        assert_eq!(t.messages[0].retry_count, limit);
        assert_eq!(t.messages[0].failure, Some(FailureReason::TooManyRetries));
        assert_eq!(t.messages[1].state, MsgState::WaitingForAck);

        let sent_for_first = s
            .out
            .actions()
            .iter()
            .filter(|a| matches!(a, Action::Progress(ProgressEvent::Sent(i)) if i.sequence == 0))
            .count();
        assert_eq!(sent_for_first as u32, limit + 1);
    }

    #[test]
    fn test_last_failure_finishes() {
        let mut t = transfer(&[mga_frame(1, 68)], FlowControl::Simple);
        let mut s = step(FlowControl::Simple);
        s.config.retry_limit = 0;
        t.start(&mut s);

        s.now += s.config.msg_timeout + Duration::from_millis(1);
        assert_eq!(t.check_timeouts(&mut s), Outcome::Finish);
    }
}
