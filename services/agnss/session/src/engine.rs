//! Public engine facade.
//!
//! [`MgaEngine`] owns the one [`SessionContext`] behind a mutex. Each call
//! collects its writes and progress events into an outbox while holding the
//! lock and delivers them after releasing it, so the writer and the progress
//! sink may call back into the engine.

use crate::clock::{Clock, SystemClock};
use crate::config::{FlowConfig, FlowControl};
use crate::dispatch::OnlineTransfer;
use crate::error::MgaError;
use crate::event::{EventInterface, LegacyAidingEvent, ProgressEvent, TerminationReason};
use crate::flash::FlashTransfer;
use crate::legacy::{LegacyFlashTransfer, LegacyServer};
use crate::message::EchoFingerprint;
use crate::msglist::{build_list, count_matching};
use crate::session::{ActiveSession, Disposition, SessionContext, SessionState, Step, Transfer};
use agnss_wire::ini::{adjust_time, is_initial_time, mga_ini_pos_llh, mga_ini_time_utc};
use agnss_wire::offline::{almanac_prefix_len, almanac_subset, todays_subset};
use agnss_wire::{AllowList, Frame, PosLlh, TimeAccuracy, TimeAdjust};
use bytes::Bytes;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// AssistNow transfer engine
pub struct MgaEngine {
    clock: Arc<dyn Clock>,
    inner: Mutex<SessionContext>,
}

impl Default for MgaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MgaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MgaEngine")
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// The session that a new transfer or server may start in
fn ready_session(ctx: &mut SessionContext) -> Result<&mut ActiveSession, MgaError> {
    let session = ctx.active().ok_or(MgaError::AlreadyIdle)?;
    if session.is_busy() {
        return Err(MgaError::AlreadyRunning);
    }
    Ok(session)
}

fn copy_blob(blob: &[u8]) -> Result<Vec<u8>, MgaError> {
    let mut data = Vec::new();
    data.try_reserve_exact(blob.len())?;
    data.extend_from_slice(blob);
    Ok(data)
}

/// Parse, validate and optionally re-time an online blob
fn prepare_online(
    blob: &[u8],
    adjust: Option<&TimeAdjust>,
    policy: FlowControl,
) -> Result<OnlineTransfer, MgaError> {
    let allow = AllowList::assistance();
    let count = count_matching(blob, &allow)?;
    if count == 0 {
        return Err(MgaError::NoDataToSend);
    }
    let mut messages = build_list(blob, count, &allow)?;

    let first = messages[0].span.clone();
    if !is_initial_time(&Frame::parse(&blob[first.clone()])?) {
        return Err(MgaError::NoMgaIniTime);
    }

    let mut data = copy_blob(blob)?;
    if let Some(adjust) = adjust {
        adjust_time(&mut data[first.clone()], adjust)?;
        messages[0].echo = EchoFingerprint::of(&Frame::parse_exact(&data[first])?);
        debug!("Adjusted initial time: {:?}", adjust);
    }

    Ok(OnlineTransfer::new(Bytes::from(data), messages, policy))
}

impl MgaEngine {
    /// Engine using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Engine using a caller-supplied clock
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(SessionContext::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionContext> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` under the lock, then deliver what it produced
    fn run<T, F>(&self, f: F) -> Result<T, MgaError>
    where
        F: FnOnce(&mut SessionContext, &mut Step) -> Result<T, MgaError>,
    {
        let mut ctx = self.lock();
        let (Some(config), Some(events)) = (ctx.config.clone(), ctx.events.clone()) else {
            return Err(MgaError::NotConfigured);
        };
        let mut step = Step::new(config, self.clock.now());
        let result = f(&mut *ctx, &mut step);
        drop(ctx);
        step.out.deliver(&events);
        result
    }

    /// Install flow settings and the event interface
    pub fn configure(&self, config: FlowConfig, events: EventInterface) -> Result<(), MgaError> {
        let mut ctx = self.lock();
        if matches!(ctx.state, SessionState::Active(_)) {
            return Err(MgaError::AlreadyRunning);
        }
        debug!("Configured with {:?}", config);
        ctx.config = Some(config);
        ctx.events = Some(events);
        Ok(())
    }

    /// Whether a session is active
    pub fn is_active(&self) -> bool {
        matches!(self.lock().state, SessionState::Active(_))
    }

    /// Open a session
    pub fn session_start(&self) -> Result<(), MgaError> {
        self.run(|ctx, _| {
            if matches!(ctx.state, SessionState::Active(_)) {
                return Err(MgaError::AlreadyRunning);
            }
            ctx.state = SessionState::Active(ActiveSession::default());
            info!("Session started");
            Ok(())
        })
    }

    /// Cancel the session from the host side
    pub fn session_stop(&self) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            ctx.active().ok_or(MgaError::AlreadyIdle)?;
            ctx.stop(ProgressEvent::Terminated(TerminationReason::HostCancel), step);
            Ok(())
        })
    }

    /// Send an online blob, optionally rewriting its leading time message
    pub fn send_online_data(&self, blob: &[u8], adjust: Option<TimeAdjust>) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            let session = ready_session(ctx)?;
            let mut transfer = prepare_online(blob, adjust.as_ref(), step.config.policy)?;
            info!(
                "Sending {} online messages ({} flow control)",
                transfer.messages.len(),
                step.config.policy
            );
            let outcome = transfer.start(step);
            session.transfer = Transfer::Online(transfer);
            ctx.apply(outcome, step);
            Ok(())
        })
    }

    /// Send an offline blob preceded by an initial time and optional position
    pub fn send_offline_data(
        &self,
        blob: &[u8],
        utc: NaiveDateTime,
        accuracy: TimeAccuracy,
        position: Option<PosLlh>,
    ) -> Result<(), MgaError> {
        let time = mga_ini_time_utc(&utc, accuracy)?;
        let pos = position.as_ref().map(mga_ini_pos_llh).transpose()?;

        let mut data = Vec::new();
        let total = time.len() + pos.as_ref().map_or(0, Bytes::len) + blob.len();
        data.try_reserve_exact(total)?;
        data.extend_from_slice(&time);
        if let Some(pos) = &pos {
            data.extend_from_slice(pos);
        }
        data.extend_from_slice(blob);

        self.send_online_data(&data, None)
    }

    /// Write an offline blob into receiver flash
    pub fn send_offline_to_flash(&self, blob: &[u8]) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            let session = ready_session(ctx)?;
            let payload = &blob[almanac_prefix_len(blob)..];
            if payload.is_empty() {
                return Err(MgaError::NoDataToSend);
            }
            let mut transfer = FlashTransfer::new(Bytes::from(copy_blob(payload)?))?;
            transfer.start(step);
            session.transfer = Transfer::Flash(transfer);
            Ok(())
        })
    }

    /// Write an ALP file into the flash of a legacy receiver
    pub fn send_legacy_offline_to_flash(&self, alp: &[u8]) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            let session = ready_session(ctx)?;
            if alp.is_empty() {
                return Err(MgaError::NoDataToSend);
            }
            let mut transfer = LegacyFlashTransfer::new(Bytes::from(copy_blob(alp)?))?;
            transfer.start(step);
            session.transfer = Transfer::Legacy(transfer);
            Ok(())
        })
    }

    /// Erase the offline data held in receiver flash
    pub fn erase_offline_flash(&self) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            let session = ready_session(ctx)?;
            info!("Erasing offline flash");
            session.transfer = Transfer::Flash(FlashTransfer::erase(step));
            Ok(())
        })
    }

    /// Serve `alp` to a legacy receiver; returns the announced file id
    pub fn start_legacy_aiding(&self, alp: Arc<Mutex<Vec<u8>>>) -> Result<u16, MgaError> {
        self.run(|ctx, step| {
            let session = ready_session(ctx)?;
            let server = LegacyServer::start(alp, step)?;
            let file_id = server.file_id;
            session.server = Some(server);
            Ok(file_id)
        })
    }

    /// Stop serving and end the session
    pub fn stop_legacy_aiding(&self) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            let session = ctx.active().ok_or(MgaError::AlreadyIdle)?;
            if session.server.is_none() {
                return Err(MgaError::AlreadyIdle);
            }
            ctx.stop(
                ProgressEvent::LegacyAiding(LegacyAidingEvent::ServerStopped),
                step,
            );
            Ok(())
        })
    }

    /// Feed one complete frame received from the receiver
    pub fn process_receiver_message(&self, buf: &[u8]) -> Disposition {
        let Ok(frame) = Frame::parse_exact(buf) else {
            return Disposition::Ignored;
        };
        self.run(|ctx, step| {
            let Some(session) = ctx.active() else {
                return Ok(Disposition::Ignored);
            };
            match session.on_frame(&frame, step) {
                Some(outcome) => {
                    ctx.apply(outcome, step);
                    Ok(Disposition::Handled)
                }
                None => Ok(Disposition::Ignored),
            }
        })
        .unwrap_or(Disposition::Ignored)
    }

    /// Handle expired deadlines; call periodically
    pub fn check_for_timeouts(&self) -> Result<(), MgaError> {
        self.run(|ctx, step| {
            if let Some(session) = ctx.active() {
                let outcome = session.check_timeouts(step);
                ctx.apply(outcome, step);
            }
            Ok(())
        })
    }

    /// Today's MGA-ANO frames plus all almanac frames of an offline blob
    pub fn select_todays_offline_subset(date: NaiveDate, blob: &[u8]) -> Result<Vec<u8>, MgaError> {
        let subset = todays_subset(blob, date)?;
        if subset.is_empty() {
            return Err(MgaError::NoDataToSend);
        }
        Ok(subset)
    }

    /// Almanac frames of an offline blob
    pub fn select_almanac_subset(blob: &[u8]) -> Result<Vec<u8>, MgaError> {
        let subset = almanac_subset(blob)?;
        if subset.is_empty() {
            return Err(MgaError::NoDataToSend);
        }
        Ok(subset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::{FailureReason, MsgState};
    use agnss_wire::header::{aid, class, mga};
    use agnss_wire::messages::FLASH_STOP_SEQUENCE;
    use agnss_wire::{build_frame, WireError};
    use std::time::Duration;

    struct Harness {
        engine: Arc<MgaEngine>,
        clock: ManualClock,
        writes: Arc<Mutex<Vec<Vec<u8>>>>,
        events: Arc<Mutex<Vec<ProgressEvent>>>,
    }

    impl Harness {
        fn new(policy: FlowControl) -> Self {
            let clock = ManualClock::new();
            let engine = Arc::new(MgaEngine::with_clock(Arc::new(clock.clone())));
            let writes = Arc::new(Mutex::new(Vec::new()));
            let events = Arc::new(Mutex::new(Vec::new()));
            let w = writes.clone();
            let e = events.clone();
            engine
                .configure(
                    FlowConfig {
                        policy,
                        ..FlowConfig::default()
                    },
                    EventInterface::new(
                        move |bytes: &[u8]| w.lock().unwrap().push(bytes.to_vec()),
                        move |event: &ProgressEvent| e.lock().unwrap().push(event.clone()),
                    ),
                )
                .unwrap();
            Self {
                engine,
                clock,
                writes,
                events,
            }
        }

        fn events(&self) -> Vec<ProgressEvent> {
            self.events.lock().unwrap().clone()
        }

        fn writes(&self) -> Vec<Vec<u8>> {
            self.writes.lock().unwrap().clone()
        }

        fn terminal_events(&self) -> Vec<ProgressEvent> {
            self.events().into_iter().filter(|e| e.is_terminal()).collect()
        }

        fn expire(&self) {
            self.clock
                .advance(FlowConfig::default().msg_timeout + Duration::from_millis(1));
            self.engine.check_for_timeouts().unwrap();
        }
    }

    fn time_frame() -> Vec<u8> {
        let utc = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        mga_ini_time_utc(&utc, TimeAccuracy::new(1, 0)).unwrap().to_vec()
    }

    fn eph(svid: u8) -> Vec<u8> {
        let mut payload = vec![0u8; 68];
        payload[0] = 1;
        payload[2] = svid;
        build_frame(class::MGA, mga::GPS, &[&payload]).unwrap().to_vec()
    }

    fn mga_ack(kind: u8, echo: &[u8]) -> Vec<u8> {
        let msg_id = if echo[0] == 0x10 { mga::INI } else { mga::GPS };
        let payload = [kind, 0, 0, msg_id, echo[0], echo[1], echo[2], echo[3]];
        build_frame(class::MGA, mga::ACK, &[&payload]).unwrap().to_vec()
    }

    fn flash_ack(ack_type: u8, seq: u16) -> Vec<u8> {
        let s = seq.to_le_bytes();
        build_frame(class::MGA, mga::FLASH, &[&[3, 0, ack_type, 0, s[0], s[1]]])
            .unwrap()
            .to_vec()
    }

    fn alp_response(kind: u8) -> Vec<u8> {
        build_frame(class::AID, aid::ALP, &[&[kind]]).unwrap().to_vec()
    }

    #[test]
    fn test_lifecycle_errors() {
        let engine = MgaEngine::new();
        assert_eq!(engine.session_start(), Err(MgaError::NotConfigured));

        let h = Harness::new(FlowControl::Simple);
        assert_eq!(h.engine.session_stop(), Err(MgaError::AlreadyIdle));
        assert_eq!(
            h.engine.send_online_data(&time_frame(), None),
            Err(MgaError::AlreadyIdle)
        );
        h.engine.session_start().unwrap();
        assert_eq!(h.engine.session_start(), Err(MgaError::AlreadyRunning));
        assert_eq!(
            h.engine.configure(FlowConfig::default(), EventInterface::new(|_: &[u8]| {}, |_: &ProgressEvent| {})),
            Err(MgaError::AlreadyRunning)
        );
        h.engine.session_stop().unwrap();
        assert!(!h.engine.is_active());
        assert_eq!(
            h.terminal_events(),
            vec![ProgressEvent::Terminated(TerminationReason::HostCancel)]
        );
    }

    #[test]
    fn test_input_errors_leave_session_ready() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();

        assert_eq!(
            h.engine.send_online_data(&eph(1), None),
            Err(MgaError::NoMgaIniTime)
        );
        let dbd = build_frame(class::MGA, mga::DBD, &[&[1]]).unwrap();
        assert_eq!(
            h.engine.send_online_data(&dbd, None),
            Err(MgaError::NoDataToSend)
        );
        let mut truncated = time_frame();
        truncated.truncate(10);
        assert_eq!(
            h.engine.send_online_data(&truncated, None),
            Err(MgaError::BadData(WireError::PayloadTooShort))
        );
        assert!(h.writes().is_empty());
        assert!(h.engine.is_active());
    }

    #[test]
    fn test_online_simple_transfer() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        let blob = [time_frame(), eph(1), eph(2)].concat();
        h.engine.send_online_data(&blob, None).unwrap();

        assert_eq!(h.events()[0], ProgressEvent::Start { total: 3 });
        // NAVX5 then the time message
        assert_eq!(h.writes().len(), 2);

        let time = time_frame();
        assert_eq!(
            h.engine.process_receiver_message(&mga_ack(1, &time[6..10])),
            Disposition::Handled
        );
        assert_eq!(
            h.engine.process_receiver_message(&mga_ack(1, &[1, 0, 9, 0])),
            Disposition::Ignored
        );
        h.engine.process_receiver_message(&mga_ack(1, &[1, 0, 1, 0]));
        h.engine.process_receiver_message(&mga_ack(0, &[1, 0, 2, 0]));

        assert!(!h.engine.is_active());
        assert_eq!(h.terminal_events(), vec![ProgressEvent::Finish]);
        assert!(h.events().iter().any(|e| matches!(
            e,
            ProgressEvent::TransferFailed(i) if i.sequence == 2 && i.state == MsgState::Failed
        )));
    }

    #[test]
    fn test_simple_never_more_than_one_outstanding() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        let blob = [time_frame(), eph(1), eph(2), eph(3)].concat();
        h.engine.send_online_data(&blob, None).unwrap();

        let outstanding = |h: &Harness| {
            let mut ctx = h.engine.lock();
            match ctx.active() {
                Some(ActiveSession {
                    transfer: Transfer::Online(t),
                    ..
                }) => t.outstanding().count(),
                _ => 0,
            }
        };
        assert_eq!(outstanding(&h), 1);
        let time = time_frame();
        h.engine.process_receiver_message(&mga_ack(1, &time[6..10]));
        assert_eq!(outstanding(&h), 1);
        h.expire();
        assert_eq!(outstanding(&h), 1);
    }

    #[test]
    fn test_none_policy_finishes_immediately() {
        let h = Harness::new(FlowControl::None);
        h.engine.session_start().unwrap();
        h.engine
            .send_online_data(&[time_frame(), eph(1)].concat(), None)
            .unwrap();
        assert_eq!(h.writes().len(), 2);
        assert!(!h.engine.is_active());
        assert_eq!(h.terminal_events(), vec![ProgressEvent::Finish]);
    }

    #[test]
    fn test_time_adjustment_rewrites_first_message() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        let adjust = TimeAdjust::Relative(chrono::Duration::hours(1));
        h.engine
            .send_online_data(&[time_frame(), eph(1)].concat(), Some(adjust))
            .unwrap();

        let written = h.writes()[1].clone();
        assert_eq!(written[6 + 8], 11);
        assert!(agnss_wire::validate(&written));
    }

    #[test]
    fn test_offline_data_prepends_time_then_position() {
        let h = Harness::new(FlowControl::Smart);
        h.engine.session_start().unwrap();
        let utc = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let pos = PosLlh {
            lat_deg: 47.0,
            lon_deg: 8.0,
            alt_cm: 0,
            acc_cm: 1000,
        };
        h.engine
            .send_offline_data(&eph(1), utc, TimeAccuracy::default(), Some(pos))
            .unwrap();

        let w = h.writes();
        assert_eq!(w.len(), 4);
        assert_eq!(w[1][6], 0x10);
        assert_eq!(w[2][6], 0x01);
        assert_eq!(h.events()[0], ProgressEvent::Start { total: 3 });
    }

    #[test]
    fn test_retry_exhaustion_reports_and_finishes() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        h.engine.send_online_data(&time_frame(), None).unwrap();

        for _ in 0..=FlowConfig::default().retry_limit {
            h.expire();
        }
        assert!(!h.engine.is_active());
        assert!(h.events().iter().any(|e| matches!(
            e,
            ProgressEvent::TransferFailed(i) if i.failure == Some(FailureReason::TooManyRetries)
        )));
        assert_eq!(h.terminal_events(), vec![ProgressEvent::Finish]);
    }

    #[test]
    fn test_flash_transfer_skips_leading_almanac() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        let ano = build_frame(class::MGA, mga::ANO, &[&[0u8; 68]]).unwrap().to_vec();
        let blob = [eph(1), eph(2), ano.clone()].concat();
        h.engine.send_offline_to_flash(&blob).unwrap();

        let w = h.writes();
        assert_eq!(w.len(), 1);
        assert_eq!(&w[0][6 + 6..w[0].len() - 2], &ano[..]);

        h.engine.process_receiver_message(&flash_ack(0, 0));
        h.engine
            .process_receiver_message(&flash_ack(0, FLASH_STOP_SEQUENCE));
        assert_eq!(h.terminal_events(), vec![ProgressEvent::Finish]);
    }

    #[test]
    fn test_flash_sequence_mismatch_terminates() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        h.engine.send_offline_to_flash(&[0u8; 1025]).unwrap();
        h.engine.process_receiver_message(&flash_ack(0, 7));
        assert_eq!(
            h.terminal_events(),
            vec![ProgressEvent::Terminated(TerminationReason::ProtocolError)]
        );
    }

    #[test]
    fn test_erase_flash() {
        let h = Harness::new(FlowControl::Simple);
        assert_eq!(h.engine.erase_offline_flash(), Err(MgaError::AlreadyIdle));
        h.engine.session_start().unwrap();
        h.engine.erase_offline_flash().unwrap();
        assert_eq!(h.writes().len(), 2);
        h.engine
            .process_receiver_message(&flash_ack(0, FLASH_STOP_SEQUENCE));
        assert_eq!(h.terminal_events(), vec![ProgressEvent::Finish]);
    }

    #[test]
    fn test_legacy_flash_nak_quirk() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        h.engine.send_legacy_offline_to_flash(&[0x55; 600]).unwrap();

        assert_eq!(
            h.engine.process_receiver_message(&alp_response(0)),
            Disposition::Handled
        );
        assert!(h.engine.is_active());
        h.engine.process_receiver_message(&alp_response(0));
        assert_eq!(
            h.terminal_events(),
            vec![ProgressEvent::Terminated(TerminationReason::ReceiverNak)]
        );
    }

    #[test]
    fn test_legacy_server_roundtrip() {
        let h = Harness::new(FlowControl::Simple);
        h.engine.session_start().unwrap();
        let file = Arc::new(Mutex::new(vec![7u8; 300]));
        let file_id = h.engine.start_legacy_aiding(file.clone()).unwrap();
        assert_eq!(
            h.engine.send_online_data(&time_frame(), None),
            Err(MgaError::AlreadyRunning)
        );

        let id = file_id.to_le_bytes();
        let update = build_frame(
            class::AID,
            aid::ALPSRV,
            &[&[8, 0xFF, 0, 0, 1, 0, id[0], id[1]], &[1, 2]],
        )
        .unwrap();
        assert_eq!(
            h.engine.process_receiver_message(&update),
            Disposition::Handled
        );
        assert_eq!(&file.lock().unwrap()[..3], &[1, 2, 7]);

        h.engine.stop_legacy_aiding().unwrap();
        assert!(!h.engine.is_active());
        let last_write = h.writes().pop().unwrap();
        assert_eq!(&last_write[2..4], &[0x06, 0x01]);
        assert_eq!(
            h.terminal_events(),
            vec![ProgressEvent::LegacyAiding(LegacyAidingEvent::ServerStopped)]
        );
    }

    #[test]
    fn test_idle_ignores_input() {
        let h = Harness::new(FlowControl::Simple);
        assert_eq!(
            h.engine.process_receiver_message(&flash_ack(0, 0)),
            Disposition::Ignored
        );
        assert_eq!(h.engine.check_for_timeouts(), Ok(()));
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_callbacks_may_reenter_engine() {
        let clock = ManualClock::new();
        let engine = Arc::new(MgaEngine::with_clock(Arc::new(clock)));
        let weak = Arc::downgrade(&engine);
        let stops = Arc::new(Mutex::new(Vec::new()));
        let s = stops.clone();
        engine
            .configure(
                FlowConfig::default(),
                EventInterface::new(|_: &[u8]| {}, move |event: &ProgressEvent| {
                    if matches!(event, ProgressEvent::Sent(_)) {
                        if let Some(engine) = weak.upgrade() {
                            s.lock().unwrap().push(engine.session_stop());
                        }
                    }
                }),
            )
            .unwrap();
        engine.session_start().unwrap();
        engine.send_online_data(&time_frame(), None).unwrap();

        assert_eq!(*stops.lock().unwrap(), vec![Ok(())]);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_subset_selection() {
        let mut ano = vec![0u8; 68];
        ano[4] = 24;
        ano[5] = 5;
        ano[6] = 1;
        let today = build_frame(class::MGA, mga::ANO, &[&ano]).unwrap().to_vec();
        ano[6] = 2;
        let tomorrow = build_frame(class::MGA, mga::ANO, &[&ano]).unwrap().to_vec();
        let blob = [eph(1), today.clone(), tomorrow].concat();

        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        assert_eq!(
            MgaEngine::select_todays_offline_subset(date, &blob).unwrap(),
            [eph(1), today].concat()
        );
        assert_eq!(MgaEngine::select_almanac_subset(&blob).unwrap(), eph(1));
        assert_eq!(
            MgaEngine::select_almanac_subset(&blob[eph(1).len()..]),
            Err(MgaError::NoDataToSend)
        );
    }
}
