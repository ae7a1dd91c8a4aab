use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use log::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{CaptureError, FsError, MountError};
use crate::hal::StorageMedium;
use crate::state::{DeviceState, PhotoRecord};

const PHOTO_PREFIX: &str = "photo_";
const PHOTO_SUFFIX: &str = ".jpg";
const SYNC_PROBE_NAME: &str = ".sync_probe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOutcome {
    pub success: bool,
    pub deleted: usize,
    pub errors: usize,
}

pub struct StorageManager {
    medium: Box<dyn StorageMedium>,
    root: PathBuf,
    photo_dir: PathBuf,
    log_dir: PathBuf,
    log_file: PathBuf,
}

impl StorageManager {
    pub fn new(config: StorageConfig, medium: Box<dyn StorageMedium>) -> Self {
        let root = PathBuf::from(&config.mount_point);
        let photo_dir = root.join(&config.photo_dir);
        let log_dir = root.join(&config.log_dir);
        let log_file = log_dir.join(&config.log_file);
        Self {
            medium,
            root,
            photo_dir,
            log_dir,
            log_file,
        }
    }

    pub fn photo_dir(&self) -> &Path {
        &self.photo_dir
    }

    pub fn mount(&mut self, state: &mut DeviceState) -> Result<(), MountError> {
        self.medium.mount(&self.root)?;
        self.ensure_layout()?;
        state.sequence = self.recover_sequence();
        state.mounted = true;
        info!(
            "storage mounted at {} (next sequence {:04})",
            self.root.display(),
            state.sequence
        );
        Ok(())
    }

    pub fn ensure_layout(&self) -> Result<(), FsError> {
        fs::create_dir_all(&self.photo_dir)
            .map_err(|err| FsError::new("create_dir", &self.photo_dir, err))?;
        fs::create_dir_all(&self.log_dir)
            .map_err(|err| FsError::new("create_dir", &self.log_dir, err))?;
        Ok(())
    }

    pub fn recover_sequence(&self) -> u32 {
        let entries = match fs::read_dir(&self.photo_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "cannot scan {} for existing photos: {err}",
                    self.photo_dir.display()
                );
                return 0;
            }
        };

        let mut next = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match parse_photo_sequence(name) {
                Some(seq) => next = next.max(seq + 1),
                None => {
                    if name.ends_with(PHOTO_SUFFIX) {
                        debug!("ignoring unrecognized photo filename {name}");
                    }
                }
            }
        }
        next
    }

    pub fn next_path(&self, sequence: u32, timestamp: DateTime<FixedOffset>) -> PathBuf {
        self.photo_dir.join(format!(
            "{PHOTO_PREFIX}{sequence:04}_{}{PHOTO_SUFFIX}",
            timestamp.format("%Y-%m-%d_%H-%M-%S")
        ))
    }

    pub fn write_photo(&self, path: &Path, bytes: &[u8]) -> Result<(), FsError> {
        let mut file = File::create(path).map_err(|err| FsError::new("create", path, err))?;
        file.write_all(bytes)
            .map_err(|err| FsError::new("write", path, err))?;
        file.sync_all()
            .map_err(|err| FsError::new("sync", path, err))?;
        Ok(())
    }

    pub fn verify_photo(&self, path: &Path, expected: u64) -> Result<(), CaptureError> {
        let metadata = fs::metadata(path).map_err(|err| FsError::new("stat", path, err))?;
        let actual = metadata.len();
        if actual != expected {
            return Err(CaptureError::VerifyMismatch { expected, actual });
        }
        Ok(())
    }

    // A photo that failed verification must not surface in the photo list.
    pub fn discard_photo(&self, path: &Path) {
        if let Err(err) = fs::remove_file(path) {
            debug!("could not discard {}: {err}", path.display());
        }
    }

    pub fn append_log(&self, record: &PhotoRecord) -> Result<(), FsError> {
        let filename = record
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .map_err(|err| FsError::new("open", &self.log_file, err))?;
        writeln!(
            file,
            "{} | Photo #{:04} | {} | {} bytes",
            record.captured_at.format("%Y-%m-%d %H:%M:%S"),
            record.sequence,
            filename,
            record.size_bytes
        )
        .map_err(|err| FsError::new("append", &self.log_file, err))?;
        Ok(())
    }

    // Lexicographic order is chronological order because filenames embed the
    // zero-padded sequence first.
    pub fn list_photos(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.photo_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("cannot list {}: {err}", self.photo_dir.display());
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
            .filter(|name| name.ends_with(PHOTO_SUFFIX))
            .collect();
        names.sort();
        names
    }

    pub fn total_size(&self) -> u64 {
        self.list_photos()
            .iter()
            .filter_map(|name| fs::metadata(self.photo_dir.join(name)).ok())
            .map(|metadata| metadata.len())
            .sum()
    }

    pub fn delete_all(&mut self, state: &mut DeviceState) -> (usize, usize) {
        let mut deleted = 0;
        let mut errors = 0;
        for name in self.list_photos() {
            let path = self.photo_dir.join(&name);
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(err) => {
                    warn!("failed to delete {}: {err}", path.display());
                    errors += 1;
                }
            }
        }
        state.sequence = 0;
        info!("deleted {deleted} photos ({errors} errors); sequence reset");
        (deleted, errors)
    }

    pub fn format_volume(&mut self, state: &mut DeviceState) -> FormatOutcome {
        let mut deleted = 0;
        let mut errors = 0;

        match fs::read_dir(&self.root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    let removal = match entry.file_type() {
                        Ok(kind) if kind.is_dir() => fs::remove_dir_all(&path),
                        _ => fs::remove_file(&path),
                    };
                    match removal {
                        Ok(()) => deleted += 1,
                        Err(err) => {
                            warn!("format: failed to remove {}: {err}", path.display());
                            errors += 1;
                        }
                    }
                }
            }
            Err(err) => {
                warn!("format: cannot read {}: {err}", self.root.display());
                errors += 1;
            }
        }

        // The closing re-creation step keeps the required folders present even
        // when the wipe above only partially succeeded.
        let success = match self.ensure_layout() {
            Ok(()) => {
                state.sequence = 0;
                true
            }
            Err(err) => {
                warn!("format: layout recreation failed: {err}");
                state.mounted = false;
                false
            }
        };

        info!("format complete: success={success}, removed {deleted} entries, {errors} errors");
        FormatOutcome {
            success,
            deleted,
            errors,
        }
    }

    pub fn sync(&mut self) -> bool {
        match self.medium.sync() {
            Ok(()) => true,
            Err(err) => {
                debug!("medium flush unavailable ({err}); falling back to probe write");
                self.sync_fallback()
            }
        }
    }

    // Write-then-delete a throwaway file so the filesystem is forced to push
    // its buffers out.
    fn sync_fallback(&self) -> bool {
        let probe = self.log_dir.join(SYNC_PROBE_NAME);
        let result = File::create(&probe)
            .and_then(|mut file| file.write_all(b"sync").and_then(|_| file.sync_all()));
        match result {
            Ok(()) => {
                let _ = fs::remove_file(&probe);
                true
            }
            Err(err) => {
                warn!("sync fallback failed: {err}");
                let _ = fs::remove_file(&probe);
                false
            }
        }
    }
}

fn parse_photo_sequence(name: &str) -> Option<u32> {
    let rest = name.strip_prefix(PHOTO_PREFIX)?;
    let (seq, rest) = rest.split_once('_')?;
    if seq.len() != 4 || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !rest.ends_with(PHOTO_SUFFIX) {
        return None;
    }
    seq.parse().ok()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::config::StorageConfig;
    use crate::hal::mock::MockMedium;
    use crate::state::DeviceState;

    fn test_storage(dir: &TempDir) -> (StorageManager, DeviceState) {
        let config = StorageConfig {
            mount_point: dir.path().join("sdcard").display().to_string(),
            ..StorageConfig::default()
        };
        let mut storage = StorageManager::new(config, Box::new(MockMedium::default()));
        let mut state = DeviceState::new();
        storage.mount(&mut state).unwrap();
        (storage, state)
    }

    fn fixed_time() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .unwrap()
    }

    #[test]
    fn parses_only_well_formed_filenames() {
        assert_eq!(
            parse_photo_sequence("photo_0042_2026-03-14_09-26-53.jpg"),
            Some(42)
        );
        assert_eq!(parse_photo_sequence("photo_12_2026-03-14.jpg"), None);
        assert_eq!(parse_photo_sequence("photo_abcd_2026-03-14.jpg"), None);
        assert_eq!(parse_photo_sequence("snapshot.jpg"), None);
        assert_eq!(parse_photo_sequence("photo_0042_raw.png"), None);
    }

    #[test]
    fn recovers_sequence_past_existing_photos() {
        let dir = TempDir::new().unwrap();
        let (storage, _) = test_storage(&dir);

        for seq in 0..8 {
            let name = format!("photo_{seq:04}_2026-03-14_09-00-0{seq}.jpg");
            fs::write(storage.photo_dir().join(name), b"jpeg").unwrap();
        }
        fs::write(storage.photo_dir().join("photo_misc_notes.jpg"), b"x").unwrap();

        assert_eq!(storage.recover_sequence(), 8);
    }

    #[test]
    fn recovery_of_empty_folder_starts_at_zero() {
        let dir = TempDir::new().unwrap();
        let (storage, state) = test_storage(&dir);

        assert_eq!(storage.recover_sequence(), 0);
        assert_eq!(state.sequence, 0);
    }

    #[test]
    fn next_path_embeds_sequence_and_timestamp() {
        let dir = TempDir::new().unwrap();
        let (storage, _) = test_storage(&dir);

        let path = storage.next_path(7, fixed_time());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "photo_0007_2026-03-14_09-26-53.jpg"
        );
    }

    #[test]
    fn append_log_writes_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let (storage, _) = test_storage(&dir);

        let record = PhotoRecord {
            sequence: 3,
            captured_at: fixed_time(),
            size_bytes: 2048,
            path: storage.next_path(3, fixed_time()),
        };
        storage.append_log(&record).unwrap();

        let log = fs::read_to_string(&storage.log_file).unwrap();
        assert_eq!(
            log,
            "2026-03-14 09:26:53 | Photo #0003 | photo_0003_2026-03-14_09-26-53.jpg | 2048 bytes\n"
        );
    }

    #[test]
    fn list_photos_is_sorted_and_jpg_only() {
        let dir = TempDir::new().unwrap();
        let (storage, _) = test_storage(&dir);

        fs::write(storage.photo_dir().join("photo_0002_a.jpg"), b"b").unwrap();
        fs::write(storage.photo_dir().join("photo_0000_a.jpg"), b"a").unwrap();
        fs::write(storage.photo_dir().join("notes.txt"), b"n").unwrap();

        assert_eq!(
            storage.list_photos(),
            vec!["photo_0000_a.jpg", "photo_0002_a.jpg"]
        );
    }

    #[test]
    fn delete_all_removes_photos_and_resets_sequence() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = test_storage(&dir);
        state.sequence = 5;

        fs::write(storage.photo_dir().join("photo_0000_a.jpg"), b"a").unwrap();
        fs::write(storage.photo_dir().join("photo_0001_a.jpg"), b"b").unwrap();

        let (deleted, errors) = storage.delete_all(&mut state);

        assert_eq!((deleted, errors), (2, 0));
        assert_eq!(state.sequence, 0);
        assert!(storage.list_photos().is_empty());
    }

    #[test]
    fn format_wipes_volume_and_recreates_layout() {
        let dir = TempDir::new().unwrap();
        let (mut storage, mut state) = test_storage(&dir);
        state.sequence = 9;

        fs::write(storage.photo_dir().join("photo_0008_a.jpg"), b"a").unwrap();
        fs::write(storage.root.join("stray.bin"), b"junk").unwrap();

        let outcome = storage.format_volume(&mut state);

        assert!(outcome.success);
        assert_eq!(outcome.errors, 0);
        assert!(outcome.deleted >= 3);
        assert_eq!(state.sequence, 0);
        assert!(storage.list_photos().is_empty());
        assert!(storage.photo_dir().is_dir());

        // Formatting twice must be harmless.
        let again = storage.format_volume(&mut state);
        assert!(again.success);
    }

    #[test]
    fn sync_falls_back_to_probe_write() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            mount_point: dir.path().join("sdcard").display().to_string(),
            ..StorageConfig::default()
        };
        let mut storage = StorageManager::new(
            config,
            Box::new(MockMedium {
                fail_sync: true,
                ..MockMedium::default()
            }),
        );
        let mut state = DeviceState::new();
        storage.mount(&mut state).unwrap();

        assert!(storage.sync());
        assert!(!storage.log_dir.join(SYNC_PROBE_NAME).exists());
    }

    #[test]
    fn mount_failure_leaves_state_unmounted() {
        let dir = TempDir::new().unwrap();
        let config = StorageConfig {
            mount_point: dir.path().join("sdcard").display().to_string(),
            ..StorageConfig::default()
        };
        let mut storage = StorageManager::new(
            config,
            Box::new(MockMedium {
                fail_mount: true,
                ..MockMedium::default()
            }),
        );
        let mut state = DeviceState::new();

        assert!(storage.mount(&mut state).is_err());
        assert!(!state.mounted);
    }

    #[test]
    fn total_size_sums_photo_files() {
        let dir = TempDir::new().unwrap();
        let (storage, _) = test_storage(&dir);

        fs::write(storage.photo_dir().join("photo_0000_a.jpg"), vec![0; 100]).unwrap();
        fs::write(storage.photo_dir().join("photo_0001_a.jpg"), vec![0; 28]).unwrap();

        assert_eq!(storage.total_size(), 128);
    }
}
