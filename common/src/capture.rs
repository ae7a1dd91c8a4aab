use chrono::{DateTime, FixedOffset};
use log::{info, warn};

use crate::error::{CaptureError, HardwareError};
use crate::hal::Camera;
use crate::state::{DeviceState, PhotoRecord};
use crate::storage::StorageManager;

pub struct CaptureService<C: Camera> {
    camera: C,
}

impl<C: Camera> CaptureService<C> {
    pub fn new(camera: C) -> Self {
        Self { camera }
    }

    pub fn init(&mut self) -> Result<(), HardwareError> {
        self.camera.init()
    }

    // One invocation produces exactly one durable, verified photo or leaves
    // the sequence counter untouched. Effects are strictly ordered: the
    // counter never advances before verification succeeds.
    pub fn capture(
        &mut self,
        storage: &StorageManager,
        state: &mut DeviceState,
        now: DateTime<FixedOffset>,
    ) -> Result<PhotoRecord, CaptureError> {
        if !state.mounted {
            return Err(CaptureError::NotMounted);
        }

        let bytes = self.camera.capture()?;
        let path = storage.next_path(state.sequence, now);

        // Power loss between this write and the counter advance below leaves
        // an orphan file with the current sequence number on disk. The next
        // boot re-seeds the counter past it, so no filename is ever reused.
        storage.write_photo(&path, &bytes)?;
        if let Err(err) = storage.verify_photo(&path, bytes.len() as u64) {
            storage.discard_photo(&path);
            return Err(err);
        }

        let record = PhotoRecord {
            sequence: state.sequence,
            captured_at: now,
            size_bytes: bytes.len() as u64,
            path,
        };

        if let Err(err) = storage.append_log(&record) {
            warn!(
                "photo #{:04} saved but log entry failed: {err}",
                record.sequence
            );
        }

        state.sequence += 1;
        info!(
            "photo #{:04} saved: {}",
            record.sequence,
            record.path.display()
        );
        Ok(record)
    }
}
