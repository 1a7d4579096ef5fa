//! Run settings loaded from TOML. Every key is optional; CLI flags override them.

use crate::capacity::CapacityOptions;
use crate::predict::PredictionOptions;
use crate::predictor::{PredictorFactory, Strategy};
use crate::types::EvalError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read the configuration file: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to parse the configuration as TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    pub strategy: Strategy,
    pub threshold: f64,
    pub repeats: usize,
    pub ratio: f64,
    pub min_margin: f64,
    pub seed: Option<u64>,
    pub strict: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        let capacity = CapacityOptions::default();
        Self {
            strategy: Strategy::default(),
            threshold: 0.0,
            repeats: capacity.repeats,
            ratio: capacity.ratio,
            min_margin: PredictionOptions::default().min_margin,
            seed: None,
            strict: false,
        }
    }
}

impl EvalConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "threshold must be finite and non-negative, got {}",
                self.threshold
            )));
        }
        if self.repeats == 0 {
            return Err(ConfigError::Invalid("repeats must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.ratio) {
            return Err(ConfigError::Invalid(format!(
                "ratio must lie in [0, 1], got {}",
                self.ratio
            )));
        }
        if !self.min_margin.is_finite() || self.min_margin < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_margin must be finite and non-negative, got {}",
                self.min_margin
            )));
        }
        Ok(())
    }

    pub fn predictor_factory(&self) -> Result<PredictorFactory, EvalError> {
        PredictorFactory::new(self.strategy, self.threshold)
    }

    pub fn capacity_options(&self) -> CapacityOptions {
        CapacityOptions {
            repeats: self.repeats,
            ratio: self.ratio,
            strict_labels: self.strict,
        }
    }

    pub fn prediction_options(&self) -> PredictionOptions {
        PredictionOptions {
            ratio: self.ratio,
            min_margin: self.min_margin,
            strict_labels: self.strict,
        }
    }

    /// A seeded generator when `seed` is set, otherwise one seeded from OS entropy.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}
