//! Test oracles: turn a causal test result into a verdict.

use std::fmt;
use std::sync::Arc;

use crate::result::CausalTestResult;

/// Pass/fail outcome of an oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The expected effect is consistent with the result.
    Pass,
    /// It is not; the string says why.
    Fail(String),
}

impl Verdict {
    /// `true` for [`Verdict::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    fn check(ok: bool, reason: impl FnOnce() -> String) -> Self {
        if ok { Verdict::Pass } else { Verdict::Fail(reason()) }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Fail(reason) => write!(f, "fail: {reason}"),
        }
    }
}

type PredicateFn = dyn Fn(&CausalTestResult) -> bool + Send + Sync;

/// User-supplied check over a result.
#[derive(Clone)]
pub struct Predicate {
    description: String,
    check: Arc<PredicateFn>,
}

impl Predicate {
    /// Wrap a closure; `description` appears in failure reasons.
    pub fn new<F>(description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&CausalTestResult) -> bool + Send + Sync + 'static,
    {
        Self { description: description.into(), check: Arc::new(check) }
    }

    /// What the predicate asserts.
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("description", &self.description).finish_non_exhaustive()
    }
}

/// Expected causal effect of a test case.
///
/// Sign and zero checks use the interval when the result carries one and the
/// point estimate otherwise.
#[derive(Debug, Clone)]
pub enum Oracle {
    /// Effect equals `value`: inside the interval when present, else within
    /// `tolerance` of the point estimate.
    ExactEffect {
        /// Expected effect.
        value: f64,
        /// Allowed absolute error without an interval.
        tolerance: f64,
    },
    /// Effect is strictly positive.
    Positive,
    /// Effect is strictly negative.
    Negative,
    /// Effect is zero: interval covers 0, else `|estimate| <= tolerance`.
    NoEffect {
        /// Allowed absolute error without an interval.
        tolerance: f64,
    },
    /// Point estimate lies in `[min, max]`.
    WithinRange {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// Arbitrary check.
    Predicate(Predicate),
}

impl Oracle {
    /// [`Oracle::ExactEffect`].
    pub fn exact(value: f64, tolerance: f64) -> Self {
        Oracle::ExactEffect { value, tolerance }
    }

    /// [`Oracle::Predicate`] from a closure.
    pub fn predicate<F>(description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&CausalTestResult) -> bool + Send + Sync + 'static,
    {
        Oracle::Predicate(Predicate::new(description, check))
    }

    /// Judge `result`.
    pub fn evaluate(&self, result: &CausalTestResult) -> Verdict {
        let est = result.point_estimate;
        match self {
            Oracle::ExactEffect { value, tolerance } => match result.confidence_intervals {
                Some((lo, hi)) => Verdict::check(lo <= *value && *value <= hi, || {
                    format!("expected effect {value} outside interval [{lo}, {hi}]")
                }),
                None => Verdict::check((est - value).abs() <= *tolerance, || {
                    format!("estimate {est} differs from expected {value} by more than {tolerance}")
                }),
            },
            Oracle::Positive => {
                let lower = result.lower().unwrap_or(est);
                Verdict::check(lower > 0.0, || format!("effect not positive (lower bound {lower})"))
            }
            Oracle::Negative => {
                let upper = result.upper().unwrap_or(est);
                Verdict::check(upper < 0.0, || format!("effect not negative (upper bound {upper})"))
            }
            Oracle::NoEffect { tolerance } => match result.confidence_intervals {
                Some((lo, hi)) => Verdict::check(lo <= 0.0 && 0.0 <= hi, || {
                    format!("interval [{lo}, {hi}] excludes zero")
                }),
                None => Verdict::check(est.abs() <= *tolerance, || {
                    format!("estimate {est} exceeds tolerance {tolerance}")
                }),
            },
            Oracle::WithinRange { min, max } => Verdict::check(*min <= est && est <= *max, || {
                format!("estimate {est} outside [{min}, {max}]")
            }),
            Oracle::Predicate(p) => {
                Verdict::check((p.check)(result), || format!("predicate failed: {}", p.description))
            }
        }
    }
}

impl fmt::Display for Oracle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Oracle::ExactEffect { value, tolerance } => write!(f, "effect == {value} (±{tolerance})"),
            Oracle::Positive => write!(f, "effect > 0"),
            Oracle::Negative => write!(f, "effect < 0"),
            Oracle::NoEffect { tolerance } => write!(f, "effect == 0 (±{tolerance})"),
            Oracle::WithinRange { min, max } => write!(f, "effect in [{min}, {max}]"),
            Oracle::Predicate(p) => write!(f, "{}", p.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use ct_core::{Estimand, Strategy};

    use super::*;

    fn result(point: f64, ci: Option<(f64, f64)>) -> CausalTestResult {
        CausalTestResult {
            estimand: Estimand::new(
                Strategy::Backdoor,
                vec!["x".into()],
                vec!["y".into()],
                Default::default(),
            ),
            point_estimate: point,
            confidence_intervals: ci,
            confidence_level: ci.map(|_| 0.05),
            estimator: "linear_regression".into(),
            assumptions: vec![],
            n_obs: 10,
            caveats: vec![],
        }
    }

    #[test]
    fn exact_effect_prefers_interval() {
        let oracle = Oracle::exact(2.0, 0.2);
        assert!(oracle.evaluate(&result(1.9, Some((1.7, 2.1)))).is_pass());
        // Point is close but the interval misses.
        assert!(!oracle.evaluate(&result(1.9, Some((1.85, 1.95)))).is_pass());
        assert!(oracle.evaluate(&result(2.15, None)).is_pass());
        assert!(!oracle.evaluate(&result(2.5, None)).is_pass());
    }

    #[test]
    fn sign_oracles() {
        assert!(Oracle::Positive.evaluate(&result(0.5, Some((0.1, 0.9)))).is_pass());
        assert!(!Oracle::Positive.evaluate(&result(0.5, Some((-0.1, 0.9)))).is_pass());
        assert!(Oracle::Positive.evaluate(&result(0.5, None)).is_pass());
        assert!(Oracle::Negative.evaluate(&result(-0.5, Some((-0.9, -0.1)))).is_pass());
        assert!(!Oracle::Negative.evaluate(&result(0.0, None)).is_pass());
    }

    #[test]
    fn no_effect_and_range() {
        let none = Oracle::NoEffect { tolerance: 0.1 };
        assert!(none.evaluate(&result(0.3, Some((-0.1, 0.7)))).is_pass());
        assert!(!none.evaluate(&result(0.3, Some((0.1, 0.7)))).is_pass());
        assert!(none.evaluate(&result(0.05, None)).is_pass());
        let range = Oracle::WithinRange { min: 1.0, max: 3.0 };
        assert!(range.evaluate(&result(2.0, None)).is_pass());
        assert!(!range.evaluate(&result(3.5, None)).is_pass());
    }

    #[test]
    fn predicate_failure_names_the_description() {
        let oracle = Oracle::predicate("uses at least 20 rows", |r| r.n_obs >= 20);
        match oracle.evaluate(&result(1.0, None)) {
            Verdict::Fail(reason) => assert!(reason.contains("at least 20 rows")),
            Verdict::Pass => panic!("expected failure"),
        }
        assert_eq!(oracle.to_string(), "uses at least 20 rows");
    }
}
