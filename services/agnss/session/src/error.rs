//! Engine result codes.

use agnss_wire::WireError;
use std::collections::TryReserveError;
use thiserror::Error;

/// Errors returned synchronously by the engine API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MgaError {
    /// Operation needs an idle engine, or a transfer is already in progress
    #[error("session already running")]
    AlreadyRunning,

    /// Operation needs an active session
    #[error("session already idle")]
    AlreadyIdle,

    /// No flow configuration or event interface installed
    #[error("engine not configured")]
    NotConfigured,

    /// Input is not a well-formed stream of frames
    #[error("bad data: {0}")]
    BadData(#[from] WireError),

    /// Input holds no messages of interest
    #[error("no data to send")]
    NoDataToSend,

    /// First message is not an initial time message
    #[error("first message is not MGA-INI-TIME or AID-INI")]
    NoMgaIniTime,

    /// Descriptor or block list could not be allocated
    #[error("out of memory")]
    OutOfMemory,

    /// Assistance server unreachable
    #[error("cannot connect to assistance server")]
    CannotConnect,

    /// Assistance server reachable but returned no usable data
    #[error("cannot get data from assistance server")]
    CannotGetData,
}

impl From<TryReserveError> for MgaError {
    fn from(_: TryReserveError) -> Self {
        MgaError::OutOfMemory
    }
}
