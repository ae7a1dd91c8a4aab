pub mod capture;
pub mod config;
pub mod error;
pub mod hal;
pub mod http;
pub mod mainloop;
pub mod pages;
pub mod server;
pub mod shutter;
pub mod state;
pub mod storage;

pub use capture::CaptureService;
pub use config::{DeviceConfig, HttpAuthConfig, NetworkConfig, RuntimeConfig, StorageConfig};
pub use error::{CaptureError, FsError, HardwareError, MountError};
pub use hal::{ButtonInput, Camera, StorageMedium};
pub use mainloop::{ExitReason, MainLoop};
pub use server::{ControlServer, ServerCommand};
pub use shutter::ShutterMonitor;
pub use state::{ButtonLevel, DeviceState, PhotoRecord};
pub use storage::{FormatOutcome, StorageManager};
