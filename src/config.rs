//! Engine settings, loaded from JSON.
//!
//! Every field has a default so a partial (or missing) settings file works.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::audio::bus::DEFAULT_MASTER_LEVEL;
use crate::audio::device::AudioConfig;
use crate::audio::envelope::PulseSettings;
use crate::audio::mixer::DEFAULT_RAMP_SECONDS;
use crate::error::{EngineError, Result};

const APP_DIR: &str = "mixdeck";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Output device name; `None` uses the system default
    pub device_name: Option<String>,
    pub audio: AudioConfig,
    /// Render into an offline context on a paced thread instead of a device
    pub headless: bool,
    pub master_level: f32,
    /// Time constant of gain/pan ramps, seconds
    pub ramp_seconds: f32,
    pub sampler_interval_ms: u64,
    /// ±ratio of random detune per play (0 disables)
    pub frequency_jitter: f32,
    pub pulse: PulseSettings,
    pub percussive_roles: Vec<String>,
    /// Ceiling on live nodes in the processing context
    pub max_nodes: Option<usize>,
    pub services: ServiceSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            device_name: None,
            audio: AudioConfig::default(),
            headless: false,
            master_level: DEFAULT_MASTER_LEVEL,
            ramp_seconds: DEFAULT_RAMP_SECONDS,
            sampler_interval_ms: 17,
            frequency_jitter: 0.01,
            pulse: PulseSettings::default(),
            percussive_roles: vec!["kick".to_string()],
            max_nodes: None,
            services: ServiceSettings::default(),
        }
    }
}

/// External helper commands. An empty command means the service is not configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub generate_command: Vec<String>,
    pub stems_command: Vec<String>,
    pub pair_command: Vec<String>,
    pub timeout_secs: u64,
    /// Where generated and saved artifacts go
    pub output_dir: PathBuf,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            generate_command: Vec::new(),
            stems_command: Vec::new(),
            pair_command: Vec::new(),
            timeout_secs: 60,
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(dirs::data_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// `<config dir>/mixdeck/settings.json`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(SETTINGS_FILE))
}

impl EngineSettings {
    /// Load and validate settings from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_default() -> Result<Self> {
        match default_settings_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("No settings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(EngineError::Settings(msg));

        if !(0.0..=1.0).contains(&self.master_level) {
            return invalid(format!("master_level {} is outside 0..=1", self.master_level));
        }
        if !self.ramp_seconds.is_finite() || self.ramp_seconds < 0.0 {
            return invalid(format!("ramp_seconds {} must be >= 0", self.ramp_seconds));
        }
        if self.sampler_interval_ms == 0 {
            return invalid("sampler_interval_ms must be > 0".to_string());
        }
        if !(0.0..0.5).contains(&self.frequency_jitter) {
            return invalid(format!(
                "frequency_jitter {} is outside 0..0.5",
                self.frequency_jitter
            ));
        }
        if self.audio.sample_rate == 0 || self.audio.channels == 0 {
            return invalid("audio sample_rate and channels must be > 0".to_string());
        }
        if self.pulse.period_ms == 0 || self.pulse.decay_ms == 0 {
            return invalid("pulse period_ms and decay_ms must be > 0".to_string());
        }
        if !(0.0..1.0).contains(&self.pulse.floor) {
            return invalid(format!("pulse floor {} is outside 0..1", self.pulse.floor));
        }
        if self.services.timeout_secs == 0 {
            return invalid("services timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}
