use std::ffi::CString;
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use embedded_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};
use esp_idf_hal::gpio::{AnyIOPin, Input, PinDriver, Pull};
use esp_idf_hal::prelude::Peripherals;
use esp_idf_hal::sd::{mmc::SdMmcHostDriver, SdCardConfiguration, SdCardDriver};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::fs::fatfs::Fatfs;
use esp_idf_svc::handle::RawHandle;
use esp_idf_svc::io::vfs::MountedFatfs;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sntp::EspSntp;
use esp_idf_svc::sys::camera;
use esp_idf_svc::wifi::{BlockingWifi, EspWifi};
use log::{info, warn};

use photostation_common::{
    ButtonInput, ButtonLevel, Camera, ControlServer, ExitReason, FsError, HardwareError, MainLoop,
    MountError, NetworkConfig, RuntimeConfig, StorageManager, StorageMedium,
};

const NVS_NAMESPACE: &str = "photostation";
const NVS_RUNTIME_KEY: &str = "runtime_json";
const NVS_RUNTIME_MAX_LEN: usize = 4096;
const WIFI_CONNECT_ATTEMPTS: u32 = 5;
const WIFI_RETRY_DELAY_MS: u64 = 3_000;
const SD_MOUNT_POINT: &str = "/sdcard";
const SD_MAX_OPEN_FILES: usize = 4;

// AI-Thinker ESP32-CAM sensor wiring. The SD slot runs in 1-bit mode
// (CMD 15 / CLK 14 / D0 2) so GPIO13 stays free for the shutter input.
mod pinout {
    pub const PWDN: i32 = 32;
    pub const RESET: i32 = -1;
    pub const XCLK: i32 = 0;
    pub const SIOD: i32 = 26;
    pub const SIOC: i32 = 27;
    pub const Y9: i32 = 35;
    pub const Y8: i32 = 34;
    pub const Y7: i32 = 39;
    pub const Y6: i32 = 36;
    pub const Y5: i32 = 21;
    pub const Y4: i32 = 19;
    pub const Y3: i32 = 18;
    pub const Y2: i32 = 5;
    pub const VSYNC: i32 = 25;
    pub const HREF: i32 = 23;
    pub const PCLK: i32 = 22;
}

struct EspCamera {
    initialized: bool,
}

impl Camera for EspCamera {
    fn init(&mut self) -> Result<(), HardwareError> {
        let mut config = camera::camera_config_t::default();
        config.pin_pwdn = pinout::PWDN;
        config.pin_reset = pinout::RESET;
        config.pin_xclk = pinout::XCLK;
        config.pin_d7 = pinout::Y9;
        config.pin_d6 = pinout::Y8;
        config.pin_d5 = pinout::Y7;
        config.pin_d4 = pinout::Y6;
        config.pin_d3 = pinout::Y5;
        config.pin_d2 = pinout::Y4;
        config.pin_d1 = pinout::Y3;
        config.pin_d0 = pinout::Y2;
        config.pin_vsync = pinout::VSYNC;
        config.pin_href = pinout::HREF;
        config.pin_pclk = pinout::PCLK;
        config.xclk_freq_hz = 20_000_000;
        config.ledc_timer = camera::ledc_timer_t_LEDC_TIMER_0;
        config.ledc_channel = camera::ledc_channel_t_LEDC_CHANNEL_0;
        config.pixel_format = camera::pixformat_t_PIXFORMAT_JPEG;
        config.frame_size = camera::framesize_t_FRAMESIZE_UXGA;
        config.jpeg_quality = 12;
        config.fb_count = 1;

        unsafe {
            config.__bindgen_anon_1.pin_sccb_sda = pinout::SIOD;
            config.__bindgen_anon_2.pin_sccb_scl = pinout::SIOC;

            let err = camera::esp_camera_init(&config);
            if err != camera::ESP_OK as camera::esp_err_t {
                return Err(HardwareError(format!("esp_camera_init failed: {err}")));
            }
        }

        self.initialized = true;
        info!("camera initialized");
        Ok(())
    }

    fn capture(&mut self) -> Result<Vec<u8>, HardwareError> {
        if !self.initialized {
            return Err(HardwareError("camera not initialized".into()));
        }

        unsafe {
            let fb = camera::esp_camera_fb_get();
            if fb.is_null() {
                return Err(HardwareError("frame buffer unavailable".into()));
            }
            let bytes = std::slice::from_raw_parts((*fb).buf, (*fb).len as usize).to_vec();
            camera::esp_camera_fb_return(fb);
            Ok(bytes)
        }
    }
}

struct GpioButton<'d> {
    pin: PinDriver<'d, AnyIOPin, Input>,
}

impl ButtonInput for GpioButton<'_> {
    fn level(&mut self) -> ButtonLevel {
        if self.pin.is_high() {
            ButtonLevel::High
        } else {
            ButtonLevel::Low
        }
    }
}

// The FATFS handle owned by run() is the real mount; this medium only
// reports whether the card came up and leaves flushing to the manager's
// probe-write fallback.
struct SdCardMedium {
    attached: bool,
}

impl StorageMedium for SdCardMedium {
    fn mount(&mut self, mount_point: &Path) -> Result<(), MountError> {
        if !self.attached {
            return Err(MountError::MediumUnavailable {
                mount_point: mount_point.display().to_string(),
                reason: "sd card not attached".into(),
            });
        }
        if !mount_point.exists() {
            return Err(MountError::MediumUnavailable {
                mount_point: mount_point.display().to_string(),
                reason: "mount path missing".into(),
            });
        }
        Ok(())
    }

    fn sync(&mut self) -> Result<(), FsError> {
        Err(FsError::new(
            "sync",
            Path::new(SD_MOUNT_POINT),
            io::Error::new(io::ErrorKind::Unsupported, "fatfs has no global flush"),
        ))
    }

    fn unmount(&mut self) {
        self.attached = false;
    }
}

struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    fn new(partition: EspDefaultNvsPartition) -> anyhow::Result<Self> {
        Ok(Self {
            nvs: EspNvs::new(partition, NVS_NAMESPACE, true)?,
        })
    }

    fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let mut buf = vec![0_u8; NVS_RUNTIME_MAX_LEN];
        match self.nvs.get_raw(NVS_RUNTIME_KEY, &mut buf)? {
            Some(raw) => Ok(RuntimeConfig::from_json(raw)?),
            None => Ok(RuntimeConfig::default()),
        }
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let nvs_store = NvsStore::new(nvs_partition.clone())?;

    let mut config = nvs_store.load_runtime_config().unwrap_or_else(|err| {
        warn!("failed to load runtime config from NVS: {err:#}");
        RuntimeConfig::default()
    });
    ensure_wifi_defaults(&mut config);
    config.sanitize();

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;

    let mut esp_wifi = EspWifi::new(peripherals.modem, sys_loop.clone(), Some(nvs_partition))?;
    register_hostname(&esp_wifi, &config.network.device_name);
    connect_wifi(&mut esp_wifi, sys_loop, &config.network).context("wifi startup failed")?;
    info!(
        "wifi connected as `{}`, ip {:?}",
        config.network.device_name,
        esp_wifi.sta_netif().get_ip_info().map(|info| info.ip)
    );

    let _sntp = EspSntp::new_default().context("failed to start SNTP")?;
    info!("SNTP initialized");

    // Keep the mount handle alive for the program lifetime; dropping it
    // unmounts the card.
    let _mounted_fatfs = match attach_sd_card(peripherals.sdmmc1, pins.gpio15, pins.gpio14, pins.gpio2)
    {
        Ok(mounted) => Some(mounted),
        Err(err) => {
            warn!("sd card mount failed: {err:#}");
            None
        }
    };
    let medium = SdCardMedium {
        attached: _mounted_fatfs.is_some(),
    };

    let mut shutter = PinDriver::input(unsafe { AnyIOPin::new(config.device.shutter_gpio) })?;
    shutter.set_pull(Pull::Up)?;

    let storage = StorageManager::new(config.storage.clone(), Box::new(medium));
    let server = ControlServer::bind(config.network.http_port, config.auth.clone())
        .context("failed to bind control server")?;

    let mut main_loop = MainLoop::new(
        &config,
        storage,
        EspCamera { initialized: false },
        GpioButton { pin: shutter },
        server,
    );

    let _wifi = esp_wifi;

    let ExitReason::RebootRequested = main_loop.run();
    warn!("reboot requested; restarting");
    thread::sleep(Duration::from_millis(500));
    unsafe { esp_idf_svc::sys::esp_restart() };

    #[allow(unreachable_code)]
    Ok(())
}

fn ensure_wifi_defaults(config: &mut RuntimeConfig) {
    if config.network.wifi_ssid.is_empty() {
        if let Some(ssid) = option_env!("WIFI_SSID") {
            config.network.wifi_ssid = ssid.to_string();
        }
    }

    if config.network.wifi_pass.is_empty() {
        if let Some(pass) = option_env!("WIFI_PASS") {
            config.network.wifi_pass = pass.to_string();
        }
    }
}

fn register_hostname(esp_wifi: &EspWifi<'static>, device_name: &str) {
    let Ok(hostname) = CString::new(device_name) else {
        return;
    };
    let err = unsafe {
        esp_idf_svc::sys::esp_netif_set_hostname(esp_wifi.sta_netif().handle(), hostname.as_ptr())
    };
    if err != esp_idf_svc::sys::ESP_OK {
        warn!("failed to set DHCP hostname `{device_name}`: {err}");
    }
}

fn connect_wifi(
    esp_wifi: &mut EspWifi<'static>,
    sys_loop: EspSystemEventLoop,
    network: &NetworkConfig,
) -> anyhow::Result<()> {
    if network.wifi_ssid.trim().is_empty() {
        return Err(anyhow!("wifi ssid is not configured"));
    }

    let auth_method = if network.wifi_pass.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::WPAWPA2Personal
    };

    let mut wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: network
            .wifi_ssid
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: network
            .wifi_pass
            .as_str()
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        auth_method,
        ..Default::default()
    }))?;

    wifi.start()?;
    info!("wifi started, connecting to `{}`", network.wifi_ssid);

    let mut last_err = None;
    for attempt in 1..=WIFI_CONNECT_ATTEMPTS {
        info!("wifi connect attempt {attempt}/{WIFI_CONNECT_ATTEMPTS}");
        match wifi.connect() {
            Ok(()) => match wifi.wait_netif_up() {
                Ok(()) => {
                    info!("wifi connected and netif up on attempt {attempt}");
                    last_err = None;
                    break;
                }
                Err(err) => {
                    warn!("wifi netif up failed on attempt {attempt}: {err:#}");
                    last_err = Some(err);
                }
            },
            Err(err) => {
                warn!("wifi connect failed on attempt {attempt}: {err:#}");
                last_err = Some(err);
            }
        }

        if attempt < WIFI_CONNECT_ATTEMPTS {
            let _ = wifi.disconnect();
            thread::sleep(Duration::from_millis(WIFI_RETRY_DELAY_MS));
        }
    }

    match last_err {
        None => Ok(()),
        Some(err) => {
            let _ = wifi.disconnect();
            let _ = wifi.stop();
            // The boot supervisor restarts the whole process after a failed
            // startup; no provisioning fallback on this device.
            Err(err).context(format!(
                "all {WIFI_CONNECT_ATTEMPTS} wifi connect attempts failed"
            ))
        }
    }
}

type MountedSdCard = MountedFatfs<Fatfs<SdCardDriver<SdMmcHostDriver<'static>>>>;

fn attach_sd_card(
    sdmmc: esp_idf_hal::sd::mmc::SDMMC1,
    cmd: esp_idf_hal::gpio::Gpio15,
    clk: esp_idf_hal::gpio::Gpio14,
    d0: esp_idf_hal::gpio::Gpio2,
) -> anyhow::Result<MountedSdCard> {
    let card = SdCardDriver::new_mmc(
        SdMmcHostDriver::new_1bit(sdmmc, cmd, clk, d0, None::<AnyIOPin>, None::<AnyIOPin>)?,
        &SdCardConfiguration::new(),
    )?;

    let mounted = MountedFatfs::mount(Fatfs::new_sdcard(0, card)?, SD_MOUNT_POINT, SD_MAX_OPEN_FILES)?;
    info!("sd card mounted at {SD_MOUNT_POINT}");
    Ok(mounted)
}
