use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLevel {
    High,
    Low,
    Unknown,
}

// Owned by the main loop; components receive `&mut` access scoped to one
// operation. There are no ambient globals.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub sequence: u32,
    pub mounted: bool,
    pub last_button_level: ButtonLevel,
}

impl DeviceState {
    pub fn new() -> Self {
        Self {
            sequence: 0,
            mounted: false,
            last_button_level: ButtonLevel::Unknown,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub sequence: u32,
    pub captured_at: DateTime<FixedOffset>,
    pub size_bytes: u64,
    pub path: PathBuf,
}
