//! Engine configuration.

use ct_core::{EstimatorConfig, Result};
use ct_graph::IdentifierConfig;
use ct_inference::ValidationConfig;
use serde::{Deserialize, Serialize};

/// What to do when the data lack treated or control support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositivityPolicy {
    /// Fail with `PositivityViolation` before estimation.
    #[default]
    Abort,
    /// Log the violation, estimate anyway and record a caveat.
    Proceed,
}

/// Options for every stage of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Candidate-set limits.
    pub identifier: IdentifierConfig,
    /// Positivity stratification.
    pub validation: ValidationConfig,
    /// Interval and resampling options.
    pub estimator: EstimatorConfig,
    /// Positivity handling.
    pub positivity: PositivityPolicy,
}

impl EngineConfig {
    /// Parse and validate from JSON; omitted sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.identifier.validate()?;
        self.validation.validate()?;
        self.estimator.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_partial_json() {
        let cfg = EngineConfig::from_json_str(
            r#"{"positivity": "proceed", "estimator": {"confidence_level": 0.1, "seed": 7}}"#,
        )
        .unwrap();
        assert_eq!(cfg.positivity, PositivityPolicy::Proceed);
        assert_eq!(cfg.estimator.confidence_level, Some(0.1));
        assert_eq!(cfg.estimator.seed, 7);
        assert_eq!(cfg.estimator.bootstrap_iterations, 200);
        assert_eq!(cfg.identifier, IdentifierConfig::default());
        assert_eq!(EngineConfig::default().positivity, PositivityPolicy::Abort);
    }

    #[test]
    fn invalid_sections_are_rejected() {
        assert!(EngineConfig::from_json_str(r#"{"estimator": {"confidence_level": 1.5}}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"identifier": {"max_candidates": 0}}"#).is_err());
        assert!(EngineConfig::from_json_str("{not json").is_err());
    }
}
