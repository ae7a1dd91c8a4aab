use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use log::{info, warn};

use crate::capture::CaptureService;
use crate::config::RuntimeConfig;
use crate::hal::{ButtonInput, Camera};
use crate::server::{ControlServer, ServerCommand};
use crate::shutter::ShutterMonitor;
use crate::state::DeviceState;
use crate::storage::StorageManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    RebootRequested,
}

// The single thread of control. Everything the appliance does is
// interleaved here at tick granularity; an in-flight capture blocks the
// tick, so the button and the listener are starved for its duration.
pub struct MainLoop<C: Camera, B: ButtonInput> {
    tick_interval: Duration,
    status_interval_ms: u64,
    timezone: Option<Tz>,
    state: DeviceState,
    storage: StorageManager,
    capture: CaptureService<C>,
    shutter: ShutterMonitor,
    server: ControlServer,
    button: B,
    started: Instant,
    last_status_ms: u64,
}

impl<C: Camera, B: ButtonInput> MainLoop<C, B> {
    pub fn new(
        config: &RuntimeConfig,
        storage: StorageManager,
        camera: C,
        button: B,
        server: ControlServer,
    ) -> Self {
        let timezone = match config.timezone.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(_) => {
                warn!("unknown timezone `{}`, using UTC", config.timezone);
                None
            }
        };

        Self {
            tick_interval: Duration::from_millis(config.device.tick_interval_ms),
            status_interval_ms: config.device.status_interval_ms,
            timezone,
            state: DeviceState::new(),
            storage,
            capture: CaptureService::new(camera),
            shutter: ShutterMonitor::new(config.device.debounce_ms),
            server,
            button,
            started: Instant::now(),
            last_status_ms: 0,
        }
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    pub fn run(&mut self) -> ExitReason {
        self.start_up();
        loop {
            if let Some(reason) = self.tick() {
                return reason;
            }
            thread::sleep(self.tick_interval);
        }
    }

    // A failed mount disables the capture subsystem but the control surface
    // stays up to serve diagnostics; a failed camera init is reported the
    // same way the original operator console would see it.
    fn start_up(&mut self) {
        if let Err(err) = self.storage.mount(&mut self.state) {
            warn!("storage mount failed: {err}; capture disabled");
        }
        if let Err(err) = self.capture.init() {
            warn!("camera init failed: {err}");
        }
    }

    pub fn tick(&mut self) -> Option<ExitReason> {
        let now_ms = self.uptime_ms();

        let level = self.button.level();
        if self.shutter.poll(level, now_ms, &mut self.state) {
            info!("shutter button pressed");
            self.run_capture();
        }

        if let Some(command) = self.server.poll_once(&mut self.storage, &mut self.state) {
            match command {
                ServerCommand::Capture => self.run_capture(),
                ServerCommand::Reboot => {
                    info!("reboot requested, shutting down listener");
                    return Some(ExitReason::RebootRequested);
                }
            }
        }

        if now_ms.saturating_sub(self.last_status_ms) >= self.status_interval_ms {
            self.last_status_ms = now_ms;
            info!(
                "status: {} photos on storage, next sequence {:04}, mounted={}",
                self.storage.list_photos().len(),
                self.state.sequence,
                self.state.mounted
            );
        }

        None
    }

    // Fire-and-forget from the operator's perspective: failures are logged,
    // never raised out of the loop.
    fn run_capture(&mut self) {
        let now = self.local_now();
        if let Err(err) = self.capture.capture(&self.storage, &mut self.state, now) {
            warn!("capture failed: {err}");
        }
    }

    fn uptime_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        match self.timezone {
            Some(tz) => {
                let local = Utc::now().with_timezone(&tz);
                local.with_timezone(&local.offset().fix())
            }
            None => Utc::now().fixed_offset(),
        }
    }
}
