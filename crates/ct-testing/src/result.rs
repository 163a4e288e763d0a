//! Outcome of executing one causal test case.

use ct_core::{Estimand, Result};
use serde::{Deserialize, Serialize};

/// Estimate produced for one test case.
///
/// Serialised as plain JSON; `confidence_intervals` and `confidence_level`
/// are `null` when no interval was requested or available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalTestResult {
    /// Estimand the estimate targets.
    pub estimand: Estimand,
    /// Average effect of the intervention on the outcome.
    pub point_estimate: f64,
    /// `(lower, upper)` bounds with `lower <= upper`.
    pub confidence_intervals: Option<(f64, f64)>,
    /// Miss probability of the interval (`0.05` for 95%).
    pub confidence_level: Option<f64>,
    /// Name of the estimator that produced the estimate.
    pub estimator: String,
    /// Modelling assumptions of that estimator.
    pub assumptions: Vec<String>,
    /// Observations used by the fit.
    pub n_obs: usize,
    /// Data problems the run proceeded past.
    #[serde(default)]
    pub caveats: Vec<String>,
}

impl CausalTestResult {
    /// Lower interval bound.
    pub fn lower(&self) -> Option<f64> {
        self.confidence_intervals.map(|(lo, _)| lo)
    }

    /// Upper interval bound.
    pub fn upper(&self) -> Option<f64> {
        self.confidence_intervals.map(|(_, hi)| hi)
    }

    /// Whether `value` lies in the interval; `None` without an interval.
    pub fn interval_contains(&self, value: f64) -> Option<bool> {
        self.confidence_intervals.map(|(lo, hi)| lo <= value && value <= hi)
    }

    /// Compact JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use ct_core::Strategy;

    use super::*;

    fn sample() -> CausalTestResult {
        CausalTestResult {
            estimand: Estimand::new(
                Strategy::Backdoor,
                vec!["x".into()],
                vec!["y".into()],
                ["z".to_string()].into_iter().collect(),
            ),
            point_estimate: 2.1,
            confidence_intervals: Some((1.8, 2.4)),
            confidence_level: Some(0.05),
            estimator: "linear_regression".into(),
            assumptions: vec!["linear".into()],
            n_obs: 100,
            caveats: vec![],
        }
    }

    #[test]
    fn interval_accessors() {
        let r = sample();
        assert_eq!(r.lower(), Some(1.8));
        assert_eq!(r.upper(), Some(2.4));
        assert_eq!(r.interval_contains(2.0), Some(true));
        assert_eq!(r.interval_contains(3.0), Some(false));
        let bare = CausalTestResult { confidence_intervals: None, ..sample() };
        assert_eq!(bare.interval_contains(2.0), None);
    }

    #[test]
    fn json_shape() {
        let r = CausalTestResult { confidence_intervals: None, confidence_level: None, ..sample() };
        let v: serde_json::Value = serde_json::from_str(&r.to_json().unwrap()).unwrap();
        assert!(v["confidence_intervals"].is_null());
        assert!(v["confidence_level"].is_null());
        assert_eq!(v["point_estimate"], 2.1);
        assert_eq!(CausalTestResult::from_json_str(&r.to_json().unwrap()).unwrap(), r);
    }
}
