use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::{Band, ChannelKind};

const DEFAULT_CONFIG_PATH: &str = "/config/lampmon.yaml";

/// Top-level configuration for the lampmon agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub fiware: FiwareConfig,
    #[serde(default)]
    pub sample: SampleConfig,
    #[serde(default)]
    pub channels: ChannelThresholds,
    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            fiware: FiwareConfig::default(),
            sample: SampleConfig::default(),
            channels: ChannelThresholds::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Endpoints and tenancy of the FIWARE deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct FiwareConfig {
    /// STH-Comet base URL (context history queries).
    #[serde(default = "FiwareConfig::default_sth_url")]
    pub sth_url: String,
    /// Orion Context Broker base URL (actuator commands).
    #[serde(default = "FiwareConfig::default_orion_url")]
    pub orion_url: String,
    #[serde(default = "FiwareConfig::default_service")]
    pub service: String,
    #[serde(default = "FiwareConfig::default_service_path")]
    pub service_path: String,
    /// Device suffix of the lamp entity id.
    #[serde(default = "FiwareConfig::default_device")]
    pub device: String,
}

impl FiwareConfig {
    fn default_sth_url() -> String {
        "http://localhost:8666".to_string()
    }

    fn default_orion_url() -> String {
        "http://localhost:1026".to_string()
    }

    fn default_service() -> String {
        "smart".to_string()
    }

    fn default_service_path() -> String {
        "/".to_string()
    }

    fn default_device() -> String {
        "06x".to_string()
    }

    pub fn entity_id(&self) -> String {
        format!("urn:ngsi-ld:Lamp:{}", self.device)
    }
}

impl Default for FiwareConfig {
    fn default() -> Self {
        Self {
            sth_url: Self::default_sth_url(),
            orion_url: Self::default_orion_url(),
            service: Self::default_service(),
            service_path: Self::default_service_path(),
            device: Self::default_device(),
        }
    }
}

/// Poll schedule configuration (with friendly duration parsing).
#[derive(Debug, Clone, Deserialize)]
pub struct SampleConfig {
    /// Telemetry loop period.
    #[serde(default = "SampleConfig::default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// How many recent samples to request per channel each tick.
    #[serde(default = "SampleConfig::default_last_n")]
    pub last_n: u32,
    /// Outbound request timeout shared by both FIWARE clients.
    #[serde(
        default = "SampleConfig::default_request_timeout",
        with = "humantime_serde"
    )]
    pub request_timeout: Duration,
}

impl SampleConfig {
    const fn default_interval() -> Duration {
        Duration::from_secs(10)
    }

    const fn default_last_n() -> u32 {
        10
    }

    const fn default_request_timeout() -> Duration {
        Duration::from_secs(5)
    }
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            interval: Self::default_interval(),
            last_n: Self::default_last_n(),
            request_timeout: Self::default_request_timeout(),
        }
    }
}

/// Per-channel threshold bands.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelThresholds {
    #[serde(default = "ChannelThresholds::default_luminosity")]
    pub luminosity: ThresholdConfig,
    #[serde(default = "ChannelThresholds::default_temperature")]
    pub temperature: ThresholdConfig,
    #[serde(default = "ChannelThresholds::default_humidity")]
    pub humidity: ThresholdConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ThresholdConfig {
    pub min: f64,
    pub max: f64,
}

impl ChannelThresholds {
    const fn default_luminosity() -> ThresholdConfig {
        ThresholdConfig {
            min: 0.0,
            max: 30.0,
        }
    }

    const fn default_temperature() -> ThresholdConfig {
        ThresholdConfig {
            min: 15.0,
            max: 25.0,
        }
    }

    const fn default_humidity() -> ThresholdConfig {
        ThresholdConfig {
            min: 30.0,
            max: 50.0,
        }
    }

    pub fn band(&self, channel: ChannelKind) -> Band {
        let thresholds = match channel {
            ChannelKind::Luminosity => self.luminosity,
            ChannelKind::Temperature => self.temperature,
            ChannelKind::Humidity => self.humidity,
        };
        Band {
            min: thresholds.min,
            max: thresholds.max,
        }
    }
}

impl Default for ChannelThresholds {
    fn default() -> Self {
        Self {
            luminosity: Self::default_luminosity(),
            temperature: Self::default_temperature(),
            humidity: Self::default_humidity(),
        }
    }
}

/// HTTP listener configuration (bind address).
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_bind")]
    pub bind: String,
    #[serde(default = "HttpConfig::default_static_dir")]
    pub static_dir: String,
}

impl HttpConfig {
    fn default_bind() -> String {
        "0.0.0.0:8040".to_string()
    }

    fn default_static_dir() -> String {
        "frontend/dist".to_string()
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: Self::default_bind(),
            static_dir: Self::default_static_dir(),
        }
    }
}

/// Load configuration from a YAML disk file, falling back to defaults + env
/// overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let target_path = if let Some(path) = path {
        path.to_path_buf()
    } else if let Ok(env_path) = env::var("LAMPMON_CONFIG") {
        PathBuf::from(env_path)
    } else {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    };

    let mut config = match try_parse_file(&target_path)? {
        Some(cfg) => {
            info!(path = %target_path.display(), "loaded configuration");
            cfg
        }
        None => {
            warn!(path = %target_path.display(), "config file not found; using built-in defaults");
            AppConfig::default()
        }
    };

    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

fn try_parse_file(path: &Path) -> Result<Option<AppConfig>> {
    match fs::read_to_string(path) {
        Ok(raw) => {
            let cfg = serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse YAML config at {}", path.display()))?;
            Ok(Some(cfg))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read config file at {}", path.display()))
        }
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(sth_url) = env::var("LAMPMON_STH_URL") {
        if !sth_url.is_empty() {
            config.fiware.sth_url = sth_url;
        }
    }

    if let Ok(orion_url) = env::var("LAMPMON_ORION_URL") {
        if !orion_url.is_empty() {
            config.fiware.orion_url = orion_url;
        }
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    if config.sample.last_n == 0 {
        bail!("sample.last_n must be at least 1");
    }
    if config.fiware.sth_url.trim().is_empty() {
        bail!("fiware.sth_url must not be empty");
    }
    if config.fiware.orion_url.trim().is_empty() {
        bail!("fiware.orion_url must not be empty");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.sample.interval, Duration::from_secs(10));
        assert_eq!(config.sample.last_n, 10);
        assert_eq!(config.fiware.entity_id(), "urn:ngsi-ld:Lamp:06x");

        let band = config.channels.band(ChannelKind::Temperature);
        assert_eq!(band.min, 15.0);
        assert_eq!(band.max, 25.0);
    }

    #[test]
    fn zero_last_n_is_rejected() {
        let mut config = AppConfig::default();
        config.sample.last_n = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn yaml_overrides_defaults() {
        let raw = r#"
sample:
  interval: 30s
  last_n: 5
channels:
  luminosity:
    min: 5
    max: 60
"#;
        let config: AppConfig = serde_yaml::from_str(raw).expect("valid yaml");
        assert_eq!(config.sample.interval, Duration::from_secs(30));
        assert_eq!(config.sample.last_n, 5);

        let band = config.channels.band(ChannelKind::Luminosity);
        assert_eq!(band.min, 5.0);
        assert_eq!(band.max, 60.0);
        // Untouched sections keep their defaults.
        assert_eq!(config.channels.band(ChannelKind::Humidity).max, 50.0);
    }
}
