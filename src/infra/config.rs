//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and key is optional; missing values take the defaults below.

use crate::domain::negligence::new_uuid_v7;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DroneConfig {
    /// Identity on the bus; empty generates a fresh id at startup
    pub id: String,
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self { id: "drone-1".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            keep_alive_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Run an embedded broker in-process
    pub enabled: bool,
    pub bind_address: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: "0.0.0.0".to_string(), port: 1883 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub poll_interval_ms: u64,
    pub travel_tick_ms: u64,
    /// Moving time needed for each leg (outbound and return)
    pub travel_duration_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 500, travel_tick_ms: 50, travel_duration_ms: 6000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Chance (0-100) that an arrival is reported as a successful delivery
    pub success_percentage: u8,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { success_percentage: 70 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub proximity_warning_cm: f64,
    pub proximity_critical_cm: f64,
    pub angle_warning_deg: i32,
    pub angle_critical_deg: i32,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            proximity_warning_cm: 50.0,
            proximity_critical_cm: 30.0,
            angle_warning_deg: 30,
            angle_critical_deg: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorsConfig {
    /// Drive the sensors from built-in simulated producers
    pub simulated: bool,
    pub sample_interval_ms: u64,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self { simulated: true, sample_interval_ms: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    /// Publish negligence reports on `negligenceReports/{courier}`
    pub publish: bool,
    /// Optional JSONL journal of every report
    pub file: Option<String>,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self { publish: true, file: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 30, prometheus_port: 0 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub drone: DroneConfig,
    pub mqtt: MqttConfig,
    pub broker: BrokerConfig,
    pub timing: TimingConfig,
    pub delivery: DeliveryConfig,
    pub thresholds: ThresholdsConfig,
    pub sensors: SensorsConfig,
    pub reports: ReportsConfig,
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    drone_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    mqtt_keep_alive_secs: u64,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    poll_interval_ms: u64,
    travel_tick_ms: u64,
    travel_duration_ms: u64,
    success_percentage: u8,
    proximity_warning_cm: f64,
    proximity_critical_cm: f64,
    angle_warning_deg: i32,
    angle_critical_deg: i32,
    sensors_simulated: bool,
    sensor_sample_interval_ms: u64,
    reports_publish: bool,
    reports_file: Option<String>,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let drone_id = match toml_config.drone.id.trim() {
            "" => new_uuid_v7(),
            id => id.to_string(),
        };

        let success_percentage = toml_config.delivery.success_percentage.min(100);
        if success_percentage != toml_config.delivery.success_percentage {
            warn!(
                configured = %toml_config.delivery.success_percentage,
                "success_percentage_clamped"
            );
        }

        let thresholds = toml_config.thresholds;
        if thresholds.proximity_critical_cm > thresholds.proximity_warning_cm
            || thresholds.angle_critical_deg < thresholds.angle_warning_deg
        {
            warn!(?thresholds, "alert_thresholds_inverted");
        }

        Self {
            drone_id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            mqtt_keep_alive_secs: toml_config.mqtt.keep_alive_secs,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            poll_interval_ms: toml_config.timing.poll_interval_ms.max(1),
            travel_tick_ms: toml_config.timing.travel_tick_ms.max(1),
            travel_duration_ms: toml_config.timing.travel_duration_ms,
            success_percentage,
            proximity_warning_cm: thresholds.proximity_warning_cm,
            proximity_critical_cm: thresholds.proximity_critical_cm,
            angle_warning_deg: thresholds.angle_warning_deg,
            angle_critical_deg: thresholds.angle_critical_deg,
            sensors_simulated: toml_config.sensors.simulated,
            sensor_sample_interval_ms: toml_config.sensors.sample_interval_ms.max(1),
            reports_publish: toml_config.reports.publish,
            reports_file: toml_config.reports.file.filter(|f| !f.trim().is_empty()),
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {origin}"))?;
        Ok(Self::from_toml(toml_config, origin))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed: using defaults");
                Self::default()
            }
        }
    }

    pub fn drone_id(&self) -> &str {
        &self.drone_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn mqtt_keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn travel_tick(&self) -> Duration {
        Duration::from_millis(self.travel_tick_ms)
    }

    pub fn travel_duration(&self) -> Duration {
        Duration::from_millis(self.travel_duration_ms)
    }

    pub fn success_percentage(&self) -> u8 {
        self.success_percentage
    }

    pub fn proximity_warning_cm(&self) -> f64 {
        self.proximity_warning_cm
    }

    pub fn proximity_critical_cm(&self) -> f64 {
        self.proximity_critical_cm
    }

    pub fn angle_warning_deg(&self) -> i32 {
        self.angle_warning_deg
    }

    pub fn angle_critical_deg(&self) -> i32 {
        self.angle_critical_deg
    }

    pub fn sensors_simulated(&self) -> bool {
        self.sensors_simulated
    }

    pub fn sensor_sample_interval(&self) -> Duration {
        Duration::from_millis(self.sensor_sample_interval_ms)
    }

    pub fn reports_publish(&self) -> bool {
        self.reports_publish
    }

    pub fn reports_file(&self) -> Option<&str> {
        self.reports_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    pub fn with_drone_id(mut self, id: &str) -> Self {
        self.drone_id = id.to_string();
        self
    }

    pub fn with_success_percentage(mut self, percentage: u8) -> Self {
        self.success_percentage = percentage.min(100);
        self
    }

    pub fn with_travel_duration_ms(mut self, ms: u64) -> Self {
        self.travel_duration_ms = ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms.max(1);
        self
    }

    pub fn with_travel_tick_ms(mut self, ms: u64) -> Self {
        self.travel_tick_ms = ms.max(1);
        self
    }
}
