//! Assistance data read from local files.

use agnss_session::{AssistanceSource, MgaError, ProgressEvent, ProgressSink, ServerErrorKind};
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Blob previously downloaded from an AssistNow service and stored on disk
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self { path, name }
    }
}

impl AssistanceSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, progress: &dyn ProgressSink) -> Result<Bytes, MgaError> {
        progress.on_progress(&ProgressEvent::ServerConnecting(self.name.clone()));

        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                progress.on_progress(&ProgressEvent::UnknownServer(self.name.clone()));
                return Err(MgaError::CannotConnect);
            }
            Err(_) => {
                progress.on_progress(&ProgressEvent::ServerCannotConnect(self.name.clone()));
                return Err(MgaError::CannotConnect);
            }
        };
        progress.on_progress(&ProgressEvent::ServerConnected(self.name.clone()));

        if data.is_empty() {
            progress.on_progress(&ProgressEvent::ServerError(ServerErrorKind::NoData));
            return Err(MgaError::CannotGetData);
        }
        Ok(Bytes::from(data))
    }
}
