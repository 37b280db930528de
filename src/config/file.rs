//! Configuration file management for the dispatch engine.
//!
//! Handles loading and saving engine configuration from TOML files stored in
//! the user's config directory. Every field carries a default so missing
//! entries fall back to the reference values.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Limits and routing knobs for the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum accepted payload size in bytes (default 10 MB)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,
    /// Accepted filename extensions (audio container formats)
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Clips at or below this duration take the inline path (default 60 s)
    #[serde(default = "default_inline_threshold_secs")]
    pub inline_threshold_secs: u64,
    /// Interval between background-job status polls (default 3 s)
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Deadline for a background job to reach a terminal state (default 120 s)
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,
    /// Directory for the fingerprint cache database. Defaults to the user
    /// data directory when unset.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Directory for scoped temp files. Defaults to the system temp dir.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

fn default_max_payload_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    ["wav", "mp3", "m4a", "mp4", "flac", "ogg", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_inline_threshold_secs() -> u64 {
    60
}

fn default_poll_interval_secs() -> u64 {
    3
}

fn default_job_timeout_secs() -> u64 {
    120
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            inline_threshold_secs: default_inline_threshold_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            job_timeout_secs: default_job_timeout_secs(),
            cache_dir: None,
            spool_dir: None,
        }
    }
}

impl DispatchConfig {
    pub fn inline_threshold(&self) -> Duration {
        Duration::from_secs(self.inline_threshold_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Audio normalization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPipelineConfig {
    /// Canonical sample rate in Hz (16000 recommended for speech recognition)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// High-pass filter cutoff in Hz for low-frequency noise removal
    #[serde(default = "default_highpass_hz")]
    pub highpass_hz: f32,
    /// RMS loudness floor in dBFS; quieter audio is rejected as too silent
    #[serde(default = "default_silence_floor_dbfs")]
    pub silence_floor_dbfs: f32,
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_highpass_hz() -> f32 {
    80.0
}

fn default_silence_floor_dbfs() -> f32 {
    -50.0
}

impl Default for AudioPipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            highpass_hz: default_highpass_hz(),
            silence_floor_dbfs: default_silence_floor_dbfs(),
        }
    }
}

/// Endpoint configuration for the HTTP transcription provider binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEndpointConfig {
    /// Base URL of the provider API
    #[serde(default)]
    pub base_url: String,
    /// API key sent as the Authorization header
    #[serde(default)]
    pub api_key: String,
}

/// Endpoint configuration for the HTTP language-detection binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// URL of the language-detection endpoint
    #[serde(default)]
    pub endpoint: String,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScribedConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub audio: AudioPipelineConfig,
    #[serde(default)]
    pub provider: ProviderEndpointConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
}

impl ScribedConfig {
    /// Loads configuration from the user's config directory, falling back to
    /// defaults when no file exists yet.
    ///
    /// # Errors
    /// - If the config directory cannot be determined
    /// - If an existing config file cannot be read
    /// - If the TOML is malformed
    pub fn load() -> anyhow::Result<Self> {
        let config_path = config_path()?;
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let config_content = fs::read_to_string(&config_path)?;
        let config: ScribedConfig = toml::from_str(&config_content)?;
        Ok(config)
    }

    /// Saves configuration to the user's config directory.
    ///
    /// # Errors
    /// - If the config directory cannot be determined or created
    /// - If the file cannot be written
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = config_path()?;
        let config_content = toml::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        tracing::info!("Configuration saved");
        Ok(())
    }
}

/// Retrieves the path to the config file, creating parent directories.
fn config_path() -> Result<PathBuf, std::io::Error> {
    let home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find home directory",
        )
    })?;
    let config_path = home.join(".config").join("scribed").join("scribed.toml");

    std::fs::create_dir_all(config_path.parent().unwrap())?;

    Ok(config_path)
}
