use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_DIR: &str = "slot-sentry";

/// Monitor configuration, loaded once at startup and never mutated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub bootstrap: BootstrapConfig,
    pub alerts: AlertConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Page listing the exam sessions
    pub url: Option<String>,
    pub poll_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub log_file: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            url: None,
            poll_interval_secs: 60,
            request_timeout_secs: 30,
            log_file: PathBuf::from("slot-sentry.log"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub visual: bool,
    pub sound: bool,
    pub title_flash: bool,
    pub desktop: bool,
    pub tone_frequency_hz: f32,
    pub tone_step_hz: f32,
    pub tone_duration_ms: u64,
    pub tone_gap_ms: u64,
    pub tone_repeat: u32,
    pub tone_gain: f32,
    pub title_flash_ms: u64,
    pub alert_title: String,
    pub idle_title: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            visual: true,
            sound: true,
            title_flash: true,
            desktop: false,
            tone_frequency_hz: 800.0,
            tone_step_hz: 100.0,
            tone_duration_ms: 200,
            tone_gap_ms: 50,
            tone_repeat: 5,
            tone_gain: 0.3,
            title_flash_ms: 800,
            alert_title: "*** EXAM SLOT AVAILABLE ***".to_string(),
            idle_title: "slot-sentry".to_string(),
        }
    }
}

impl Config {
    /// Load from an explicit path, or from the user config dir if a file
    /// exists there, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.poll_interval_secs must be greater than zero".into(),
            ));
        }
        if self.bootstrap.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "bootstrap.max_attempts must be greater than zero".into(),
            ));
        }
        if self.alerts.tone_duration_ms == 0 || self.alerts.tone_repeat == 0 {
            return Err(ConfigError::Invalid(
                "alerts.tone_duration_ms and alerts.tone_repeat must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alerts.tone_gain) {
            return Err(ConfigError::Invalid(format!(
                "alerts.tone_gain must be within 0.0..=1.0, got {}",
                self.alerts.tone_gain
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.monitor.request_timeout_secs)
    }

    pub fn bootstrap_delay(&self) -> Duration {
        Duration::from_millis(self.bootstrap.retry_delay_ms)
    }

    /// Log file location; relative paths land in the user data dir
    pub fn log_path(&self) -> PathBuf {
        let file = &self.monitor.log_file;
        if file.is_absolute() {
            return file.clone();
        }
        dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR).join(file))
            .unwrap_or_else(|| file.clone())
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}
