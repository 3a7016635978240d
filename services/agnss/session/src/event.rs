//! Progress events and the caller-supplied event interface.
//!
//! The engine talks to the outside world through two narrow traits: a
//! [`DeviceWriter`] that puts bytes on the receiver transport, and a
//! [`ProgressSink`] that observes transfer progress. Both are invoked after
//! the engine lock has been released, so implementations may call back into
//! the engine.

use agnss_wire::{AlpSrvRequest, MsgId, NakReason};
use std::sync::Arc;

/// Why a session was torn down early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Host stopped the session
    HostCancel,
    /// Receiver refused the transfer
    ReceiverNak,
    /// Receiver stopped answering
    ReceiverNotResponding,
    /// Receiver answered out of sequence
    ProtocolError,
}

/// Why a single message or block failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Rejected without a reason code
    NotSet,
    /// Rejected with a known reason code
    Receiver(NakReason),
    /// Rejected with an unrecognised reason code
    ReceiverCode(u8),
    /// No acknowledgement after all retries
    TooManyRetries,
    /// No acknowledgement during a legacy aiding transfer
    LegacyNoAck,
}

impl FailureReason {
    /// Map an MGA-ACK info code
    pub fn from_info_code(code: u8) -> Self {
        match NakReason::try_from(code) {
            Ok(reason) => FailureReason::Receiver(reason),
            Err(_) => FailureReason::ReceiverCode(code),
        }
    }
}

/// Delivery state of a message or flash block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgState {
    /// Not written yet
    WaitingToSend,
    /// Written, acknowledgement outstanding
    WaitingForAck,
    /// Flash block timed out once and the receiver was nudged
    WaitingForAckSecondChance,
    /// Acknowledged
    Received,
    /// Rejected or abandoned
    Failed,
}

/// Snapshot of one message or block, attached to per-message events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    /// Position in transfer order
    pub sequence: usize,
    /// Frame class and id as written
    pub msg_id: MsgId,
    /// Bytes of assistance data carried
    pub len: usize,
    /// State at the time of the event
    pub state: MsgState,
    /// Resends so far
    pub retry_count: u32,
    /// Failure reason, when failed
    pub failure: Option<FailureReason>,
}

/// Problems reported by an assistance data source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerErrorKind {
    /// Unexpected status from the server
    BadStatus(u16),
    /// Response lacked a usable length
    MissingLength,
    /// Response body shorter than announced
    PartialContent,
    /// Response carried no assistance data
    NoData,
}

/// Events of the legacy aiding transfers and server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyAidingEvent {
    /// Startup handshake begun for this many blocks
    Startup {
        /// Blocks to transfer
        blocks: usize,
    },
    /// Receiver answered the startup handshake
    StartupCompleted,
    /// Receiver never answered the startup handshake
    StartupFailed(FailureReason),
    /// Block written
    FlashBlockSent(MessageInfo),
    /// Block acknowledged
    FlashBlockComplete(MessageInfo),
    /// Block abandoned
    FlashBlockFailed(MessageInfo),
    /// All blocks written, end marker sent
    FinalizeStart,
    /// End marker acknowledged
    FinalizeCompleted,
    /// End marker never acknowledged
    FinalizeFailed,
    /// Server role started with this file id
    ServerStarted {
        /// Random id identifying the served file
        file_id: u16,
    },
    /// Server role stopped
    ServerStopped,
    /// Receiver asked for data
    RequestReceived(AlpSrvRequest),
    /// Request answered; `None` when nothing could be sent
    RequestCompleted(Option<AlpSrvRequest>),
    /// Update referred to a different file
    RequestFailedIdMismatch {
        /// File id carried by the update
        file_id: u16,
    },
    /// Receiver pushed data
    UpdateReceived {
        /// File id carried by the update
        file_id: u16,
        /// Offset in words
        ofs: u16,
        /// Size in words
        size: u16,
    },
    /// Update processed
    UpdateCompleted,
}

/// Progress reported to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Transfer begun with this many messages or blocks
    Start {
        /// Messages or blocks in the transfer
        total: usize,
    },
    /// Message or block written
    Sent(MessageInfo),
    /// Message or block acknowledged
    TransferComplete(MessageInfo),
    /// Message or block failed
    TransferFailed(MessageInfo),
    /// Session ended normally
    Finish,
    /// Session ended early
    Terminated(TerminationReason),
    /// Contacting an assistance server
    ServerConnecting(String),
    /// Connected to an assistance server
    ServerConnected(String),
    /// Assistance server unreachable
    ServerCannotConnect(String),
    /// Assistance server name could not be resolved
    UnknownServer(String),
    /// Assistance server answered badly
    ServerError(ServerErrorKind),
    /// Legacy aiding progress
    LegacyAiding(LegacyAidingEvent),
}

impl ProgressEvent {
    /// Whether this event ends a session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Finish
                | ProgressEvent::Terminated(_)
                | ProgressEvent::LegacyAiding(LegacyAidingEvent::ServerStopped)
        )
    }
}

/// Sink for bytes destined to the receiver
pub trait DeviceWriter: Send + Sync {
    /// Write one frame (or nudge byte) to the receiver
    fn write_to_device(&self, bytes: &[u8]);
}

/// Sink for progress events
pub trait ProgressSink: Send + Sync {
    /// Observe one event
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> DeviceWriter for F
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn write_to_device(&self, bytes: &[u8]) {
        self(bytes)
    }
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Writer and progress sink installed at configuration time
#[derive(Clone)]
pub struct EventInterface {
    /// Receiver transport
    pub writer: Arc<dyn DeviceWriter>,
    /// Progress observer
    pub progress: Arc<dyn ProgressSink>,
}

impl EventInterface {
    /// Bundle a writer and a progress sink
    pub fn new<W, P>(writer: W, progress: P) -> Self
    where
        W: DeviceWriter + 'static,
        P: ProgressSink + 'static,
    {
        Self {
            writer: Arc::new(writer),
            progress: Arc::new(progress),
        }
    }
}

impl std::fmt::Debug for EventInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInterface").finish_non_exhaustive()
    }
}
