use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub tick_interval_ms: u64,
    pub debounce_ms: u64,
    pub status_interval_ms: u64,
    pub shutter_gpio: i32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            debounce_ms: 500,
            status_interval_ms: 30_000,
            shutter_gpio: 13,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub device_name: String,
    pub http_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            device_name: "photostation".to_string(),
            http_port: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub mount_point: String,
    pub photo_dir: String,
    pub log_dir: String,
    pub log_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_point: "/sdcard".to_string(),
            photo_dir: "photos".to_string(),
            log_dir: "logs".to_string(),
            log_file: "photo_log.txt".to_string(),
        }
    }
}

// The shared secret is stored as a SHA-256 hex digest, never plaintext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpAuthConfig {
    pub username: String,
    pub password_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub device: DeviceConfig,
    pub network: NetworkConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: Option<HttpAuthConfig>,
    pub timezone: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            auth: None,
            timezone: "UTC".to_string(),
        }
    }
}

impl DeviceConfig {
    pub fn sanitize(&mut self) {
        self.tick_interval_ms = self.tick_interval_ms.clamp(1, 1_000);
        self.debounce_ms = self.debounce_ms.clamp(100, 2_000);
        self.status_interval_ms = self.status_interval_ms.clamp(1_000, 600_000);
    }
}

impl StorageConfig {
    pub fn sanitize(&mut self) {
        if self.mount_point.is_empty() {
            self.mount_point = "/sdcard".to_string();
        }
        if self.photo_dir.is_empty() {
            self.photo_dir = "photos".to_string();
        }
        if self.log_dir.is_empty() {
            self.log_dir = "logs".to_string();
        }
        if self.log_file.is_empty() {
            self.log_file = "photo_log.txt".to_string();
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.device.sanitize();
        self.storage.sanitize();

        if self.network.device_name.trim().is_empty() {
            self.network.device_name = "photostation".to_string();
        }
        if self.network.http_port == 0 {
            self.network.http_port = 80;
        }

        if self.timezone.parse::<Tz>().is_err() {
            self.timezone = "UTC".to_string();
        }

        // An auth entry with a blank digest would lock every route out.
        if let Some(auth) = &self.auth {
            let digest_ok = auth.password_sha256.len() == 64
                && auth.password_sha256.chars().all(|c| c.is_ascii_hexdigit());
            if auth.username.trim().is_empty() || !digest_ok {
                self.auth = None;
            }
        }
    }

    pub fn from_json(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sanitize_clamps_device_timings() {
        let mut config = RuntimeConfig::default();
        config.device.tick_interval_ms = 0;
        config.device.debounce_ms = 10;
        config.device.status_interval_ms = 0;
        config.sanitize();

        assert_eq!(config.device.tick_interval_ms, 1);
        assert_eq!(config.device.debounce_ms, 100);
        assert_eq!(config.device.status_interval_ms, 1_000);
    }

    #[test]
    fn sanitize_rejects_unknown_timezone_and_bad_auth() {
        let mut config = RuntimeConfig::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        config.auth = Some(HttpAuthConfig {
            username: "operator".to_string(),
            password_sha256: "not-a-digest".to_string(),
        });
        config.sanitize();

        assert_eq!(config.timezone, "UTC");
        assert!(config.auth.is_none());
    }

    #[test]
    fn round_trips_through_json() {
        let mut config = RuntimeConfig::default();
        config.network.wifi_ssid = "workshop".to_string();
        config.network.http_port = 8080;

        let raw = config.to_json_pretty().unwrap();
        let loaded = RuntimeConfig::from_json(&raw).unwrap();

        assert_eq!(loaded.network.wifi_ssid, "workshop");
        assert_eq!(loaded.network.http_port, 8080);
        assert!(loaded.auth.is_none());
    }
}
