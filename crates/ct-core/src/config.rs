//! Estimator configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Options recognised by every estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Interval coverage parameter: `0.05` requests a 95% interval.
    /// `None` skips interval computation.
    pub confidence_level: Option<f64>,
    /// Resamples for models without a closed-form interval (0 disables them).
    pub bootstrap_iterations: usize,
    /// Base seed; resample `b` uses `seed + b`.
    pub seed: u64,
    /// Wall-clock budget for resampling; exceeded budgets fail with a timeout.
    pub max_duration_secs: Option<f64>,
    /// Causal forest options.
    pub forest: ForestConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            confidence_level: Some(0.05),
            bootstrap_iterations: 200,
            seed: 0,
            max_duration_secs: None,
            forest: ForestConfig::default(),
        }
    }
}

impl EstimatorConfig {
    /// Parse and validate from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject out-of-range options.
    pub fn validate(&self) -> Result<()> {
        if let Some(level) = self.confidence_level {
            validate_confidence_level(level)?;
        }
        if let Some(secs) = self.max_duration_secs {
            if !(secs.is_finite() && secs > 0.0) {
                return Err(Error::InvalidInput(format!(
                    "max_duration_secs must be positive, got {secs}"
                )));
            }
        }
        self.forest.validate()
    }

    /// Resampling budget as a `Duration`.
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_secs.map(Duration::from_secs_f64)
    }
}

/// `level` is the two-sided miss probability and must lie in (0, 1).
pub fn validate_confidence_level(level: f64) -> Result<()> {
    if level.is_finite() && level > 0.0 && level < 1.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("confidence_level must be in (0,1), got {level}")))
    }
}

/// Causal forest hyper-parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Bagged trees.
    pub n_trees: usize,
    /// Minimum complete rows per leaf.
    pub min_leaf_size: usize,
    /// Maximum split depth.
    pub max_depth: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self { n_trees: 100, min_leaf_size: 25, max_depth: 6 }
    }
}

impl ForestConfig {
    fn validate(&self) -> Result<()> {
        if self.n_trees < 2 {
            return Err(Error::InvalidInput("forest.n_trees must be >= 2".to_string()));
        }
        if self.min_leaf_size < 4 {
            return Err(Error::InvalidInput("forest.min_leaf_size must be >= 4".to_string()));
        }
        Ok(())
    }
}
