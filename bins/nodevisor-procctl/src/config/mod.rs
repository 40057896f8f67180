use anyhow::{Context, Result};
use nodevisor_process::{ReaperOptions, DEFAULT_MARKER};
use nodevisor_process_file::ProcessFileConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod validation;

pub use duration_serde::parse_duration;

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcctlConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Where PID files of supervised components live
    #[serde(default)]
    pub process_file: ProcessFileConfig,

    #[serde(default)]
    pub reaper: ReaperConfig,
}

/// Stale process reaper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// `NAME=VALUE` entry identifying supervised processes
    #[serde(default = "default_marker")]
    pub marker: String,

    #[serde(default = "default_exit_code")]
    pub exit_code: u32,

    #[serde(default = "default_reap_timeout", with = "duration_serde")]
    pub timeout: Duration,

    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,
}

impl Default for ProcctlConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            process_file: ProcessFileConfig::default(),
            reaper: ReaperConfig::default(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            exit_code: default_exit_code(),
            timeout: default_reap_timeout(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl From<&ReaperConfig> for ReaperOptions {
    fn from(config: &ReaperConfig) -> Self {
        ReaperOptions {
            marker: config.marker.clone(),
            exit_code: config.exit_code,
            timeout: config.timeout,
            poll_interval: config.poll_interval,
        }
    }
}

impl ProcctlConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        Self::load_from_string(&content)
    }

    /// Load configuration from a YAML string
    pub fn load_from_string(content: &str) -> Result<Self> {
        let config: ProcctlConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

fn default_exit_code() -> u32 {
    1
}

fn default_reap_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

// Custom serialization for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    /// Parse `"250ms"`, `"5s"` or `"2m"`.
    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let invalid = || format!("Invalid duration: {}", s);

        // Check for "ms" BEFORE "s" since "ms" ends with 's'
        if let Some(num_str) = s.strip_suffix("ms") {
            let millis: u64 = num_str.parse().map_err(|_| invalid())?;
            Ok(Duration::from_millis(millis))
        } else if let Some(num_str) = s.strip_suffix('s') {
            let secs: u64 = num_str.parse().map_err(|_| invalid())?;
            Ok(Duration::from_secs(secs))
        } else if let Some(num_str) = s.strip_suffix('m') {
            let mins: u64 = num_str.parse().map_err(|_| invalid())?;
            Ok(Duration::from_secs(mins.checked_mul(60).ok_or_else(invalid)?))
        } else {
            Err(format!("Duration must end with 's', 'ms', or 'm': {}", s))
        }
    }
}
