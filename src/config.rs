use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_PROFESSIONAL_WEIGHT: f64 = 0.6;
pub const DEFAULT_EVALUATOR_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize, Clone)]
pub struct WeightConfig {
    #[serde(default = "default_professional_weight")]
    pub professional: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            professional: DEFAULT_PROFESSIONAL_WEIGHT,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_evaluator_timeout")]
    pub evaluator_timeout_ms: u64,
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub weights: WeightConfig,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("professional weight must be within (0, 1], got {0}")]
    Weight(f64),
    #[error("evaluator_timeout_ms ({evaluator}) exceeds analysis_timeout_ms ({analysis})")]
    Budget { evaluator: u64, analysis: u64 },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::Zero {
                field: "max_file_size_bytes",
            });
        }
        if self.evaluator_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "evaluator_timeout_ms",
            });
        }
        if self.analysis_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                field: "analysis_timeout_ms",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Zero {
                field: "poll_interval_ms",
            });
        }
        let weight = self.weights.professional;
        if !(weight > 0.0 && weight <= 1.0) {
            return Err(ConfigError::Weight(weight));
        }
        if self.evaluator_timeout_ms > self.analysis_timeout_ms {
            return Err(ConfigError::Budget {
                evaluator: self.evaluator_timeout_ms,
                analysis: self.analysis_timeout_ms,
            });
        }
        Ok(())
    }

    /// Worker count with `0` resolved to the number of logical CPUs.
    pub fn effective_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }

    pub fn evaluator_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluator_timeout_ms)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            workers: 0,
            evaluator_timeout_ms: DEFAULT_EVALUATOR_TIMEOUT_MS,
            analysis_timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
            poll_interval_ms: 20,
            weights: WeightConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_hash: String,
}

pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let bytes: Vec<u8> = if let Some(p) = path {
        std::fs::read(p)?
    } else {
        include_bytes!("../config/default.yml").to_vec()
    };

    let config: Config = serde_yaml::from_slice(&bytes)?;
    config.validate()?;

    let config_hash = hash_bytes(&bytes);

    Ok(LoadedConfig {
        config,
        config_hash,
    })
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE_BYTES
}

fn default_evaluator_timeout() -> u64 {
    DEFAULT_EVALUATOR_TIMEOUT_MS
}

fn default_analysis_timeout() -> u64 {
    DEFAULT_ANALYSIS_TIMEOUT_MS
}

fn default_poll_interval() -> u64 {
    20
}

fn default_professional_weight() -> f64 {
    DEFAULT_PROFESSIONAL_WEIGHT
}
