//! Assistance transfer engine for u-blox receivers.
//!
//! This crate drives the delivery of AssistNow assistance data to a receiver:
//! it parses the assistance blob into messages, paces them according to a
//! flow control policy, matches the receiver's acknowledgements, retries on
//! timeout, and reports progress through a caller-supplied event interface.
//!
//! ## Features
//!
//! - **Online/offline transfer**: MGA and AID messages with `None`, `Simple`
//!   or `Smart` flow control
//! - **Flash transfer**: offline data written to receiver flash in 512-byte
//!   blocks with sequence-checked acknowledgements
//! - **Legacy aiding**: ALP file transfer and the ALP server role for older
//!   receivers
//! - **Deterministic time**: deadlines come from a pluggable [`Clock`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use agnss_session::{EventInterface, FlowConfig, FlowControl, MgaEngine, ProgressEvent};
//!
//! # fn example(blob: &[u8]) -> Result<(), agnss_session::MgaError> {
//! let engine = MgaEngine::new();
//! engine.configure(
//!     FlowConfig {
//!         policy: FlowControl::Smart,
//!         ..FlowConfig::default()
//!     },
//!     EventInterface::new(
//!         |bytes: &[u8]| { /* write to the receiver */ },
//!         |event: &ProgressEvent| println!("{:?}", event),
//!     ),
//! )?;
//!
//! engine.session_start()?;
//! engine.send_online_data(blob, None)?;
//!
//! // for every frame read from the receiver:
//! //     engine.process_receiver_message(&frame);
//! // about once a second:
//! //     engine.check_for_timeouts()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod ack;
pub mod clock;
pub mod config;
mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
mod flash;
mod legacy;
pub mod message;
pub mod msglist;
mod outbox;
mod session;
pub mod source;
mod timeout;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FlowConfig, FlowControl, ParseFlowControlError, DEFAULT_RX_BUFFER_BUDGET};
pub use engine::MgaEngine;
pub use error::MgaError;
pub use event::{
    DeviceWriter, EventInterface, FailureReason, LegacyAidingEvent, MessageInfo, MsgState,
    ProgressEvent, ProgressSink, ServerErrorKind, TerminationReason,
};
pub use session::Disposition;
pub use source::AssistanceSource;
