//! Boundary to whatever supplies assistance data.

use crate::error::MgaError;
use crate::event::ProgressSink;
use bytes::Bytes;

/// Supplier of assistance blobs, such as an AssistNow server or a file.
///
/// Implementations report connection progress (`ServerConnecting`,
/// `ServerConnected`, `ServerCannotConnect`, `UnknownServer`, `ServerError`)
/// through `progress` and map failures to [`MgaError::CannotConnect`] or
/// [`MgaError::CannotGetData`].
pub trait AssistanceSource: Send + Sync {
    /// Human readable origin, used in progress events
    fn name(&self) -> &str;

    /// Retrieve one blob of concatenated frames
    fn fetch(&self, progress: &dyn ProgressSink) -> Result<Bytes, MgaError>;
}
