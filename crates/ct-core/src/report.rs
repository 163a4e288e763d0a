//! Structured data-validation reports.
//!
//! Validation returns these as data instead of failing, so a caller can
//! decide whether to collect more data or proceed with a caveat.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Strategy, Value};

/// Which side of the contrast lacks support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    /// Baseline level.
    Control,
    /// Intervened level.
    Treated,
}

/// A treatment level with no supporting rows in a stratum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingLevel {
    /// Treatment variable.
    pub treatment: String,
    /// Contrast arm.
    pub arm: Arm,
    /// Unsupported value.
    pub value: Value,
}

impl fmt::Display for MissingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.treatment, self.value)
    }
}

/// One stratum of the adjustment set that lacks treated or control rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StratumViolation {
    /// `(variable, level label)` pairs identifying the stratum; empty for the whole data.
    pub stratum: Vec<(String, String)>,
    /// Complete rows in the stratum.
    pub n_rows: usize,
    /// Unsupported treatment levels.
    pub missing: Vec<MissingLevel>,
}

impl StratumViolation {
    /// Human-readable stratum label (`"Z=1, W=[0.5, 1.2]"`, or `"all rows"`).
    pub fn label(&self) -> String {
        if self.stratum.is_empty() {
            return "all rows".to_string();
        }
        self.stratum.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(", ")
    }
}

/// Positivity check outcome for one `(Dataset, Estimand)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositivityReport {
    /// Strategy of the checked estimand.
    pub strategy: Strategy,
    /// Observed strata examined.
    pub n_strata: usize,
    /// Strata lacking support, in stratum order.
    pub violations: Vec<StratumViolation>,
}

impl PositivityReport {
    /// `true` when every stratum has both treated and control rows.
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }
}

impl fmt::Display for PositivityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "all {} strata supported", self.n_strata);
        }
        write!(f, "{} of {} strata lack support", self.violations.len(), self.n_strata)?;
        for v in &self.violations {
            let missing = v.missing.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ");
            write!(f, "; [{}] ({} rows) missing {missing}", v.label(), v.n_rows)?;
        }
        Ok(())
    }
}

/// Values of a referenced variable outside its declared domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainViolation {
    /// Variable name.
    pub variable: String,
    /// Number of offending cells.
    pub n_rows: usize,
    /// First few offending row indices.
    pub sample_rows: Vec<usize>,
}

/// Everything the validator learned about a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Rows in the dataset.
    pub n_rows: usize,
    /// Rows observed in every referenced column.
    pub n_complete_rows: usize,
    /// Positivity outcome.
    pub positivity: PositivityReport,
    /// Domain conformance problems.
    pub domain_violations: Vec<DomainViolation>,
}

impl ValidationReport {
    /// No positivity or domain problems.
    pub fn is_clean(&self) -> bool {
        self.positivity.is_satisfied() && self.domain_violations.is_empty()
    }

    /// Caveat strings suitable for attaching to a result.
    pub fn caveats(&self) -> Vec<String> {
        let mut out = Vec::new();
        if !self.positivity.is_satisfied() {
            out.push(format!("positivity: {}", self.positivity));
        }
        for d in &self.domain_violations {
            out.push(format!("domain: {} values of '{}' outside declared domain", d.n_rows, d.variable));
        }
        let dropped = self.n_rows - self.n_complete_rows;
        if dropped > 0 {
            out.push(format!("{dropped} incomplete rows excluded"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_renders_offending_strata() {
        let report = PositivityReport {
            strategy: Strategy::Backdoor,
            n_strata: 1,
            violations: vec![StratumViolation {
                stratum: vec![],
                n_rows: 10,
                missing: vec![MissingLevel {
                    treatment: "X".into(),
                    arm: Arm::Treated,
                    value: Value::Int(1),
                }],
            }],
        };
        assert!(!report.is_satisfied());
        assert_eq!(report.to_string(), "1 of 1 strata lack support; [all rows] (10 rows) missing X=1");
    }

    #[test]
    fn caveats_mention_dropped_rows() {
        let report = ValidationReport {
            n_rows: 12,
            n_complete_rows: 10,
            positivity: PositivityReport {
                strategy: Strategy::Backdoor,
                n_strata: 3,
                violations: vec![],
            },
            domain_violations: vec![],
        };
        assert!(report.is_clean());
        assert_eq!(report.caveats(), vec!["2 incomplete rows excluded".to_string()]);
    }
}
