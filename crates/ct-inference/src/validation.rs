//! Dataset validation against an estimand: column presence, positivity and
//! domain conformance.
//!
//! Validation never mutates the dataset and is idempotent. Missing columns are
//! an error; positivity and domain problems come back as a report.

use std::collections::{BTreeMap, BTreeSet};

use ct_core::{
    Arm, Contrast, Dataset, Domain, DomainViolation, Error, Estimand, MissingLevel,
    PositivityReport, Result, Strategy, StratumViolation, ValidationReport, Value, Variable,
};
use serde::{Deserialize, Serialize};

use crate::bootstrap_ci::quantile_linear_sorted;

/// Validator options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Equal-frequency bins used to stratify continuous adjustment variables.
    pub continuous_bins: usize,
    /// Offending rows listed per domain violation.
    pub max_sample_rows: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { continuous_bins: 4, max_sample_rows: 5 }
    }
}

impl ValidationConfig {
    /// Parse and validate from JSON.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject out-of-range options.
    pub fn validate(&self) -> Result<()> {
        if self.continuous_bins == 0 {
            return Err(Error::InvalidInput("continuous_bins must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Read-only checks run before estimation.
#[derive(Debug, Clone, Default)]
pub struct DataValidator {
    config: ValidationConfig,
    domains: BTreeMap<String, Domain>,
}

/// Stratum coordinates of each complete row along one adjustment variable.
struct Axis {
    name: String,
    /// Ordinal per complete row.
    codes: Vec<usize>,
    labels: BTreeMap<usize, String>,
}

impl DataValidator {
    /// Validator without declared domains.
    pub fn new(config: ValidationConfig) -> Self {
        Self { config, domains: BTreeMap::new() }
    }

    /// Use the declared domains of `variables` for stratification and
    /// conformance checks.
    pub fn with_variables<'a, I>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = &'a Variable>,
    {
        for v in variables {
            self.domains.insert(v.name().to_string(), v.domain().clone());
        }
        self
    }

    /// Active options.
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Fail with `MissingColumn` listing every referenced column absent from `data`.
    pub fn check_columns(&self, data: &Dataset, estimand: &Estimand) -> Result<()> {
        let missing: Vec<String> =
            estimand.referenced_variables().into_iter().filter(|n| !data.has_column(n)).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingColumn(missing))
        }
    }

    /// Column check, then positivity and domain conformance.
    pub fn validate(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        contrast: &Contrast,
    ) -> Result<ValidationReport> {
        self.check_columns(data, estimand)?;
        let referenced = estimand.referenced_variables();
        let rows = data.complete_rows(referenced.iter().map(String::as_str));
        let positivity = self.positivity_on(data, estimand, contrast, &rows)?;
        let domain_violations = self.check_domains(data, estimand);

        let report = ValidationReport {
            n_rows: data.n_rows(),
            n_complete_rows: rows.len(),
            positivity,
            domain_violations,
        };
        tracing::info!(
            n_rows = report.n_rows,
            n_complete_rows = report.n_complete_rows,
            n_strata = report.positivity.n_strata,
            n_violations = report.positivity.violations.len(),
            n_domain_violations = report.domain_violations.len(),
            "validated dataset"
        );
        Ok(report)
    }

    /// Treated and control support within every observed stratum.
    pub fn check_positivity(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        contrast: &Contrast,
    ) -> Result<PositivityReport> {
        self.check_columns(data, estimand)?;
        let referenced = estimand.referenced_variables();
        let rows = data.complete_rows(referenced.iter().map(String::as_str));
        self.positivity_on(data, estimand, contrast, &rows)
    }

    /// Referenced values outside their declared domain.
    pub fn check_domains(&self, data: &Dataset, estimand: &Estimand) -> Vec<DomainViolation> {
        let mut out = Vec::new();
        for name in estimand.referenced_variables() {
            let (Some(domain), Some(col)) = (self.domains.get(&name), data.column(&name)) else {
                continue;
            };
            let bad: Vec<usize> = col
                .iter()
                .enumerate()
                .filter_map(|(i, c)| c.as_ref().filter(|v| !domain.contains(v)).map(|_| i))
                .collect();
            if !bad.is_empty() {
                tracing::warn!(variable = %name, n_rows = bad.len(), "values outside declared domain");
                out.push(DomainViolation {
                    variable: name,
                    n_rows: bad.len(),
                    sample_rows: bad.into_iter().take(self.config.max_sample_rows).collect(),
                });
            }
        }
        out
    }

    fn positivity_on(
        &self,
        data: &Dataset,
        estimand: &Estimand,
        contrast: &Contrast,
        rows: &[usize],
    ) -> Result<PositivityReport> {
        let treatments: BTreeSet<&str> = estimand.treatments().iter().map(String::as_str).collect();
        if let Some(item) = contrast.items().iter().find(|c| !treatments.contains(c.name.as_str())) {
            return Err(Error::InvalidInput(format!(
                "contrast names '{}', which is not a treatment of the estimand",
                item.name
            )));
        }

        let axes: Vec<Axis> = match estimand.strategy() {
            Strategy::Backdoor => {
                estimand.adjustment_set().iter().map(|name| self.axis(data, name, rows)).collect()
            }
            Strategy::FrontDoor | Strategy::Instrumental => Vec::new(),
        };

        let mut strata: BTreeMap<Vec<usize>, Vec<usize>> = BTreeMap::new();
        for (k, &row) in rows.iter().enumerate() {
            let key: Vec<usize> = axes.iter().map(|a| a.codes[k]).collect();
            strata.entry(key).or_default().push(row);
        }

        let discrete: BTreeMap<&str, bool> = contrast
            .items()
            .iter()
            .map(|c| (c.name.as_str(), self.is_discrete(data, &c.name, rows)))
            .collect();

        let mut violations = Vec::new();
        if rows.is_empty() {
            let missing = contrast
                .items()
                .iter()
                .flat_map(|c| arms(c.name.as_str(), &c.control, &c.treated))
                .collect();
            violations.push(StratumViolation { stratum: Vec::new(), n_rows: 0, missing });
        }
        for (key, members) in &strata {
            let mut missing = Vec::new();
            for c in contrast.items() {
                let values: Vec<&Value> =
                    members.iter().filter_map(|&r| data.value(r, &c.name)).collect();
                let supported = |level: &Value| {
                    if discrete[c.name.as_str()] {
                        values.iter().any(|v| v.same_level(level))
                    } else {
                        within_range(&values, level)
                    }
                };
                for level in arms(c.name.as_str(), &c.control, &c.treated) {
                    if !supported(&level.value) {
                        missing.push(level);
                    }
                }
            }
            if !missing.is_empty() {
                let stratum = axes
                    .iter()
                    .zip(key)
                    .map(|(a, code)| (a.name.clone(), a.labels[code].clone()))
                    .collect();
                violations.push(StratumViolation { stratum, n_rows: members.len(), missing });
            }
        }

        let report =
            PositivityReport { strategy: estimand.strategy(), n_strata: strata.len(), violations };
        if !report.is_satisfied() {
            tracing::warn!(report = %report, "positivity violated");
        }
        Ok(report)
    }

    fn is_discrete(&self, data: &Dataset, name: &str, rows: &[usize]) -> bool {
        let values: Vec<&Value> = rows.iter().filter_map(|&r| data.value(r, name)).collect();
        if values.iter().any(|v| !v.is_numeric()) {
            return true;
        }
        match self.domains.get(name) {
            Some(domain) => domain.is_discrete(),
            None => {
                let mut distinct: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup();
                distinct.len() <= self.config.continuous_bins
            }
        }
    }

    fn axis(&self, data: &Dataset, name: &str, rows: &[usize]) -> Axis {
        let values: Vec<&Value> = rows.iter().filter_map(|&r| data.value(r, name)).collect();
        if self.is_discrete(data, name, rows) {
            let mut labels: Vec<String> = values.iter().map(|v| v.label()).collect();
            labels.sort();
            labels.dedup();
            let codes = values
                .iter()
                .map(|v| labels.binary_search(&v.label()).unwrap_or_default())
                .collect();
            return Axis {
                name: name.to_string(),
                codes,
                labels: labels.into_iter().enumerate().collect(),
            };
        }

        let xs: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
        let mut sorted = xs.clone();
        sorted.sort_by(f64::total_cmp);
        let bins = self.config.continuous_bins;
        let mut cuts: Vec<f64> =
            (1..bins).map(|k| quantile_linear_sorted(&sorted, k as f64 / bins as f64)).collect();
        cuts.dedup();
        let codes: Vec<usize> = xs.iter().map(|&x| cuts.iter().filter(|&&c| x > c).count()).collect();

        let mut bounds: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
        for (&code, &x) in codes.iter().zip(&xs) {
            let e = bounds.entry(code).or_insert((x, x));
            e.0 = e.0.min(x);
            e.1 = e.1.max(x);
        }
        let labels = bounds
            .into_iter()
            .map(|(code, (lo, hi))| (code, format!("[{}, {}]", Value::Float(lo), Value::Float(hi))))
            .collect();
        Axis { name: name.to_string(), codes, labels }
    }
}

fn arms(name: &str, control: &Value, treated: &Value) -> Vec<MissingLevel> {
    let mut out =
        vec![MissingLevel { treatment: name.to_string(), arm: Arm::Control, value: control.clone() }];
    if !treated.same_level(control) {
        out.push(MissingLevel { treatment: name.to_string(), arm: Arm::Treated, value: treated.clone() });
    }
    out
}

fn within_range(values: &[&Value], level: &Value) -> bool {
    let Some(x) = level.as_f64() else {
        return false;
    };
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for v in values.iter().filter_map(|v| v.as_f64()) {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    lo <= x && x <= hi
}
