use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use photostation_common::{
    ButtonInput, ButtonLevel, Camera, ControlServer, ExitReason, FsError, HardwareError, MainLoop,
    MountError, RuntimeConfig, StorageManager, StorageMedium,
};

// Simulated drivers so the appliance can run on a workstation: the "card" is
// a plain directory, the "sensor" emits a stub JPEG, the shutter line idles
// high. Hardware integration points live in esp.rs.

struct SimCamera {
    frame_counter: u32,
}

impl Camera for SimCamera {
    fn init(&mut self) -> Result<(), HardwareError> {
        info!("simulated camera ready");
        Ok(())
    }

    fn capture(&mut self) -> Result<Vec<u8>, HardwareError> {
        self.frame_counter = self.frame_counter.wrapping_add(1);

        // SOI + APP0 header, a payload that varies per frame, EOI.
        let mut bytes = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00,
        ];
        let payload_len = 512 + (self.frame_counter % 7) as usize * 64;
        bytes.extend((0..payload_len).map(|i| (i as u32 ^ self.frame_counter) as u8));
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        Ok(bytes)
    }
}

struct IdleButton;

impl ButtonInput for IdleButton {
    fn level(&mut self) -> ButtonLevel {
        // Pull-up line with nothing attached; captures come over HTTP.
        ButtonLevel::High
    }
}

struct DirectoryMedium;

impl StorageMedium for DirectoryMedium {
    fn mount(&mut self, mount_point: &Path) -> Result<(), MountError> {
        fs::create_dir_all(mount_point).map_err(|err| MountError::MediumUnavailable {
            mount_point: mount_point.display().to_string(),
            reason: err.to_string(),
        })
    }

    fn sync(&mut self) -> Result<(), FsError> {
        Ok(())
    }

    fn unmount(&mut self) {}
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let data_dir = std::env::var("PHOTOSTATION_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.photostation"));

    let mut config = load_runtime_config(&data_dir.join("runtime.json"))
        .context("failed to load runtime config")?;
    if config.storage.mount_point == "/sdcard" {
        // Keep the simulated card inside the data dir instead of the device
        // mount path.
        config.storage.mount_point = data_dir.join("sdcard").display().to_string();
    }
    if let Ok(port) = std::env::var("PHOTOSTATION_HTTP_PORT") {
        if let Ok(port) = port.parse::<u16>() {
            config.network.http_port = port;
        }
    }
    config.sanitize();

    let storage = StorageManager::new(config.storage.clone(), Box::new(DirectoryMedium));
    let server = ControlServer::bind(config.network.http_port, config.auth.clone())
        .context("failed to bind control server")?;
    info!(
        "open http://{} to manage photos",
        server.local_addr().context("listener has no address")?
    );

    let mut main_loop = MainLoop::new(
        &config,
        storage,
        SimCamera { frame_counter: 0 },
        IdleButton,
        server,
    );

    match main_loop.run() {
        ExitReason::RebootRequested => {
            info!("exiting for supervisor restart");
            Ok(())
        }
    }
}

fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match fs::read(path) {
        Ok(raw) => Ok(RuntimeConfig::from_json(&raw)
            .with_context(|| format!("invalid config at {}", path.display()))?),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let config = RuntimeConfig::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            if let Ok(raw) = config.to_json_pretty() {
                if let Err(err) = fs::write(path, &raw) {
                    warn!("could not write default config to {}: {err}", path.display());
                }
            }
            Ok(config)
        }
        Err(err) => Err(err).with_context(|| format!("cannot read {}", path.display())),
    }
}
