use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::palette::{Color, DEFAULT_COLOR_KEY};

const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
const DEFAULT_SERVER_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 200;
const DEFAULT_DISPLAY_THRESHOLD: f64 = 0.4;
const DEFAULT_MAX_BOXES: usize = 5;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_CAMERA_URL: &str = "stub://camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_ALERT_THRESHOLD: f64 = 0.5;
const DEFAULT_SNAPSHOT_JPEG_QUALITY: u8 = 70;
const DEFAULT_MQTT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_MQTT_CLIENT_ID: &str = "lookout";
const DEFAULT_MQTT_TOPIC_PREFIX: &str = "lookout";
const DEFAULT_SMS_POLL_SECS: u64 = 60;
const DEFAULT_SESSION_PATH: &str = "lookout_session.json";

const DEFAULT_COLORS: [(&str, &str); 7] = [
    ("person", "#FF5733"),
    ("car", "#33A1FF"),
    ("dog", "#33FF57"),
    ("cat", "#D033FF"),
    ("stone", "#FFD700"),
    ("gas_cylinder", "#FF4500"),
    (DEFAULT_COLOR_KEY, "#00FFFF"),
];

#[derive(Debug, Deserialize, Default)]
struct LookoutConfigFile {
    server: Option<ServerConfigFile>,
    capture: Option<CaptureConfigFile>,
    camera: Option<CameraConfigFile>,
    alerts: Option<AlertConfigFile>,
    colors: Option<BTreeMap<String, String>>,
    mqtt: Option<MqttConfigFile>,
    overlay: Option<OverlayConfigFile>,
    sms: Option<SmsConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    interval_ms: Option<u64>,
    display_threshold: Option<f64>,
    max_boxes: Option<usize>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    threshold: Option<f64>,
    snapshot_jpeg_quality: Option<u8>,
    cooldown_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    enabled: Option<bool>,
    broker_addr: Option<String>,
    allow_remote: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    use_tls: Option<bool>,
    tls_ca_path: Option<PathBuf>,
    tls_client_cert_path: Option<PathBuf>,
    tls_client_key_path: Option<PathBuf>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    output_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct SmsConfigFile {
    poll_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    state_path: Option<PathBuf>,
}

/// Resolved, validated client configuration. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct LookoutConfig {
    pub server: ServerSettings,
    pub capture: CaptureSettings,
    pub camera: CameraSettings,
    pub alerts: AlertSettings,
    /// Label to `#RRGGBB` map. Always carries a `default` entry.
    pub colors: BTreeMap<String, String>,
    pub mqtt: MqttSettings,
    pub overlay: OverlaySettings,
    pub sms: SmsSettings,
    pub session: SessionSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub base_url: String,
    pub timeout: Duration,
}

impl ServerSettings {
    pub fn detect_url(&self) -> String {
        format!("{}/detect_frame", self.base_url.trim_end_matches('/'))
    }

    pub fn sms_status_url(&self) -> String {
        format!("{}/api/sms_status", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub interval: Duration,
    pub display_threshold: f64,
    pub max_boxes: usize,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub threshold: f64,
    pub snapshot_jpeg_quality: u8,
    /// Zero disables the per-label cooldown.
    pub cooldown: Duration,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub enabled: bool,
    pub broker_addr: String,
    pub allow_remote: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub use_tls: bool,
    pub tls_ca_path: Option<PathBuf>,
    pub tls_client_cert_path: Option<PathBuf>,
    pub tls_client_key_path: Option<PathBuf>,
    pub client_id: String,
    pub topic_prefix: String,
}

#[derive(Debug, Clone, Default)]
pub struct OverlaySettings {
    pub output_path: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SmsSettings {
    pub poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub state_path: PathBuf,
}

impl Default for LookoutConfig {
    fn default() -> Self {
        Self::from_file(LookoutConfigFile::default())
    }
}

impl LookoutConfig {
    /// Load from `LOOKOUT_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOOKOUT_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file path, then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => LookoutConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LookoutConfigFile) -> Self {
        let server = file.server.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let alerts = file.alerts.unwrap_or_default();
        let mqtt = file.mqtt.unwrap_or_default();
        let overlay = file.overlay.unwrap_or_default();
        let sms = file.sms.unwrap_or_default();
        let session = file.session.unwrap_or_default();

        let mut colors: BTreeMap<String, String> = DEFAULT_COLORS
            .iter()
            .map(|(label, hex)| (label.to_string(), hex.to_string()))
            .collect();
        if let Some(overrides) = file.colors {
            colors.extend(overrides);
        }

        Self {
            server: ServerSettings {
                base_url: server
                    .base_url
                    .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string()),
                timeout: Duration::from_millis(
                    server.timeout_ms.unwrap_or(DEFAULT_SERVER_TIMEOUT_MS),
                ),
            },
            capture: CaptureSettings {
                interval: Duration::from_millis(
                    capture.interval_ms.unwrap_or(DEFAULT_CAPTURE_INTERVAL_MS),
                ),
                display_threshold: capture
                    .display_threshold
                    .unwrap_or(DEFAULT_DISPLAY_THRESHOLD),
                max_boxes: capture.max_boxes.unwrap_or(DEFAULT_MAX_BOXES),
                jpeg_quality: capture.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            camera: CameraSettings {
                url: camera.url.unwrap_or_else(|| DEFAULT_CAMERA_URL.to_string()),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            alerts: AlertSettings {
                threshold: alerts.threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD),
                snapshot_jpeg_quality: alerts
                    .snapshot_jpeg_quality
                    .unwrap_or(DEFAULT_SNAPSHOT_JPEG_QUALITY),
                cooldown: Duration::from_secs(alerts.cooldown_secs.unwrap_or(0)),
            },
            colors,
            mqtt: MqttSettings {
                enabled: mqtt.enabled.unwrap_or(false),
                broker_addr: mqtt
                    .broker_addr
                    .unwrap_or_else(|| DEFAULT_MQTT_BROKER_ADDR.to_string()),
                allow_remote: mqtt.allow_remote.unwrap_or(false),
                username: mqtt.username,
                password: mqtt.password,
                use_tls: mqtt.use_tls.unwrap_or(false),
                tls_ca_path: mqtt.tls_ca_path,
                tls_client_cert_path: mqtt.tls_client_cert_path,
                tls_client_key_path: mqtt.tls_client_key_path,
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_MQTT_CLIENT_ID.to_string()),
                topic_prefix: mqtt
                    .topic_prefix
                    .unwrap_or_else(|| DEFAULT_MQTT_TOPIC_PREFIX.to_string()),
            },
            overlay: OverlaySettings {
                output_path: overlay.output_path,
                font_path: overlay.font_path,
            },
            sms: SmsSettings {
                poll_interval: Duration::from_secs(
                    sms.poll_interval_secs.unwrap_or(DEFAULT_SMS_POLL_SECS),
                ),
            },
            session: SessionSettings {
                state_path: session
                    .state_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_PATH)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = non_empty_env("LOOKOUT_SERVER_URL") {
            self.server.base_url = url;
        }
        if let Some(url) = non_empty_env("LOOKOUT_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(interval) = non_empty_env("LOOKOUT_CAPTURE_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("LOOKOUT_CAPTURE_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.capture.interval = Duration::from_millis(millis);
        }
        if let Some(threshold) = non_empty_env("LOOKOUT_DISPLAY_THRESHOLD") {
            self.capture.display_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("LOOKOUT_DISPLAY_THRESHOLD must be a number"))?;
        }
        if let Some(threshold) = non_empty_env("LOOKOUT_ALERT_THRESHOLD") {
            self.alerts.threshold = threshold
                .parse()
                .map_err(|_| anyhow!("LOOKOUT_ALERT_THRESHOLD must be a number"))?;
        }
        if let Some(addr) = non_empty_env("LOOKOUT_MQTT_BROKER_ADDR") {
            self.mqtt.broker_addr = addr;
            self.mqtt.enabled = true;
        }
        if let Some(path) = non_empty_env("LOOKOUT_OVERLAY_PATH") {
            self.overlay.output_path = Some(PathBuf::from(path));
        }
        if let Some(path) = non_empty_env("LOOKOUT_SESSION_PATH") {
            self.session.state_path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Reject values the capture loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.server.base_url)
            .with_context(|| format!("invalid server url {}", self.server.base_url))?;
        if !matches!(base.scheme(), "http" | "https") {
            bail!("server url must be http(s): {}", self.server.base_url);
        }
        check_unit_interval("capture.display_threshold", self.capture.display_threshold)?;
        check_unit_interval("alerts.threshold", self.alerts.threshold)?;
        if self.capture.interval.is_zero() {
            bail!("capture interval must be greater than zero");
        }
        if self.capture.max_boxes == 0 {
            bail!("capture.max_boxes must be greater than zero");
        }
        check_jpeg_quality("capture.jpeg_quality", self.capture.jpeg_quality)?;
        check_jpeg_quality(
            "alerts.snapshot_jpeg_quality",
            self.alerts.snapshot_jpeg_quality,
        )?;
        if self.sms.poll_interval.is_zero() {
            bail!("sms poll interval must be greater than zero");
        }
        if self.camera.url.trim().is_empty() {
            bail!("camera url must not be empty");
        }
        if !self.colors.contains_key(DEFAULT_COLOR_KEY) {
            bail!("colors must define a '{}' entry", DEFAULT_COLOR_KEY);
        }
        for (label, hex) in &self.colors {
            hex.parse::<Color>()
                .with_context(|| format!("invalid color for '{}'", label))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<LookoutConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn check_unit_interval(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{} must be within [0, 1], got {}", name, value);
    }
    Ok(())
}

fn check_jpeg_quality(name: &str, value: u8) -> Result<()> {
    if !(1..=100).contains(&value) {
        bail!("{} must be within 1..=100, got {}", name, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_browser_client() {
        let cfg = LookoutConfig::default();
        assert_eq!(cfg.capture.interval, Duration::from_millis(200));
        assert_eq!(cfg.capture.display_threshold, 0.4);
        assert_eq!(cfg.capture.max_boxes, 5);
        assert_eq!(cfg.alerts.threshold, 0.5);
        assert_eq!(cfg.colors["person"], "#FF5733");
        assert_eq!(cfg.colors["default"], "#00FFFF");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn endpoint_urls_join_without_double_slash() {
        let server = ServerSettings {
            base_url: "http://detector:5000/".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(server.detect_url(), "http://detector:5000/detect_frame");
        assert_eq!(
            server.sms_status_url(),
            "http://detector:5000/api/sms_status"
        );
    }

    #[test]
    fn toml_colors_merge_over_defaults() {
        let file: LookoutConfigFile = toml::from_str(
            r##"
            [colors]
            person = "#000000"
            forklift = "#123456"
            "##,
        )
        .unwrap();
        let cfg = LookoutConfig::from_file(file);
        assert_eq!(cfg.colors["person"], "#000000");
        assert_eq!(cfg.colors["forklift"], "#123456");
        assert_eq!(cfg.colors["car"], "#33A1FF");
    }

    #[test]
    fn out_of_range_threshold_rejected() {
        let mut cfg = LookoutConfig::default();
        cfg.capture.display_threshold = 1.5;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("display_threshold"));
    }

    #[test]
    fn bad_color_rejected() {
        let mut cfg = LookoutConfig::default();
        cfg.colors.insert("dog".to_string(), "green".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = LookoutConfig::default();
        cfg.capture.interval = Duration::ZERO;
        assert!(cfg.validate().is_err());
    }
}
