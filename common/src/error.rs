use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("storage medium failed to attach at {mount_point}: {reason}")]
    MediumUnavailable { mount_point: String, reason: String },
    #[error("storage layout could not be created: {0}")]
    Layout(#[from] FsError),
}

#[derive(Debug, Error)]
#[error("{op} {path}: {source}")]
pub struct FsError {
    pub op: &'static str,
    pub path: String,
    #[source]
    pub source: io::Error,
}

impl FsError {
    pub fn new(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self {
            op,
            path: path.display().to_string(),
            source,
        }
    }
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct HardwareError(pub String);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("storage volume is not mounted")]
    NotMounted,
    #[error("camera hardware failure: {0}")]
    Hardware(#[from] HardwareError),
    #[error("photo write failed: {0}")]
    Write(#[from] FsError),
    #[error("size verification mismatch: wrote {expected} bytes, found {actual}")]
    VerifyMismatch { expected: u64, actual: u64 },
}
