//! Demo driver configuration.
//!
//! Configuration is stored at `~/.config/stageload/config.json` unless the
//! `STAGELOAD_CONFIG` environment variable points somewhere else. A missing
//! file means defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stageload_core::{LoaderOptions, PredictionModel, StageTimings};

/// Application name used for the config directory path
const APP_NAME: &str = "stageload";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the config file location
const CONFIG_PATH_ENV: &str = "STAGELOAD_CONFIG";

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_max_age_ms: u64,
    pub refresh_interval_ms: Option<u64>,
    pub secondary_delay_ms: u64,
    pub background_delay_ms: u64,
    pub gate_stages_on_critical: bool,
    /// Weight factor for older transitions; unset means flat frequency.
    pub prediction_decay: Option<f64>,
    /// Simulated backend latency range
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    /// Also write logs to `stageload.log` in this directory.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        let options = LoaderOptions::default();
        Self {
            cache_max_age_ms: millis(options.cache_max_age),
            refresh_interval_ms: None,
            secondary_delay_ms: millis(options.stage_timings.secondary),
            background_delay_ms: millis(options.stage_timings.background),
            gate_stages_on_critical: options.stage_timings.gate_on_critical,
            prediction_decay: None,
            min_latency_ms: 40,
            max_latency_ms: 250,
            log_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn loader_options(&self) -> LoaderOptions {
        LoaderOptions::new()
            .with_cache_max_age(Duration::from_millis(self.cache_max_age_ms))
            .with_refresh_interval(self.refresh_interval_ms.map(Duration::from_millis))
            .with_stage_timings(StageTimings {
                secondary: Duration::from_millis(self.secondary_delay_ms),
                background: Duration::from_millis(self.background_delay_ms),
                gate_on_critical: self.gate_stages_on_critical,
            })
    }

    pub fn prediction_model(&self) -> PredictionModel {
        match self.prediction_decay {
            Some(factor) => PredictionModel::Decayed { factor },
            None => PredictionModel::Frequency,
        }
    }

    /// Latency range with the bounds in order.
    pub fn latency_range(&self) -> (Duration, Duration) {
        let lo = self.min_latency_ms.min(self.max_latency_ms);
        let hi = self.min_latency_ms.max(self.max_latency_ms);
        (Duration::from_millis(lo), Duration::from_millis(hi))
    }
}
