//! Resampling and percentile interval utilities.
//!
//! Resamples run data-parallel on the rayon pool. Resample `b` is seeded with
//! `seed + b`, so results do not depend on scheduling.

use std::time::{Duration, Instant};

use ct_core::{Error, EstimationFailureCause, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Quantile for sorted data via linear interpolation.
///
/// - `q=0` returns min
/// - `q=1` returns max
/// - empty input returns `NaN`
pub fn quantile_linear_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let i = pos.floor() as usize;
    let j = pos.ceil() as usize;
    if i == j {
        return sorted[i];
    }
    let t = pos - i as f64;
    (1.0 - t) * sorted[i] + t * sorted[j]
}

/// Quantile via sorting + linear interpolation.
pub fn quantile_linear(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut v = data.to_vec();
    v.sort_by(f64::total_cmp);
    quantile_linear_sorted(&v, q)
}

/// Percentile interval covering `1 - confidence_level` of the samples.
pub fn percentile_interval(samples: &[f64], confidence_level: f64) -> Result<(f64, f64)> {
    if samples.len() < 2 {
        return Err(Error::insufficient_data("percentile interval requires at least 2 samples"));
    }
    ct_core::validate_confidence_level(confidence_level)?;

    let alpha = confidence_level / 2.0;
    let lo = quantile_linear(samples, alpha);
    let hi = quantile_linear(samples, 1.0 - alpha);
    Ok((lo.min(hi), lo.max(hi)))
}

/// `n` row indices drawn with replacement.
pub fn bootstrap_indices<R: Rng>(rng: &mut R, n: usize) -> Vec<usize> {
    (0..n).map(|_| rng.random_range(0..n)).collect()
}

/// Outcome of a batch of resamples.
#[derive(Debug, Clone)]
pub struct Resampled<T> {
    /// Statistics of resamples that fitted.
    pub values: Vec<T>,
    /// Resamples whose fit failed (e.g. a singular bootstrap design).
    pub n_failed: usize,
    /// Wall time (seconds).
    pub elapsed_secs: f64,
}

enum Slot<T> {
    Done(T),
    Failed,
    Skipped,
}

/// Run `requested` resamples of `statistic` in parallel.
///
/// Each resample gets its own `StdRng` seeded with `seed + b`. When `budget`
/// elapses, remaining resamples are skipped and the call fails with
/// `EstimationFailure(Timeout)`.
pub fn run_resamples<T, F>(
    requested: usize,
    seed: u64,
    budget: Option<Duration>,
    statistic: F,
) -> Result<Resampled<T>>
where
    T: Send,
    F: Fn(&mut StdRng) -> Result<T> + Sync,
{
    let t0 = Instant::now();
    let slots: Vec<Slot<T>> = (0..requested)
        .into_par_iter()
        .map(|b| {
            if budget.is_some_and(|d| t0.elapsed() > d) {
                return Slot::Skipped;
            }
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(b as u64));
            match statistic(&mut rng) {
                Ok(v) => Slot::Done(v),
                Err(_) => Slot::Failed,
            }
        })
        .collect();
    let elapsed_secs = t0.elapsed().as_secs_f64();

    let n_skipped = slots.iter().filter(|s| matches!(s, Slot::Skipped)).count();
    let over_budget = budget.is_some_and(|d| t0.elapsed() > d);
    if n_skipped > 0 || over_budget {
        let completed = requested - n_skipped;
        tracing::warn!(elapsed_secs, completed, requested, "resampling exceeded its time budget");
        return Err(Error::EstimationFailure(EstimationFailureCause::Timeout {
            elapsed_secs,
            completed,
            requested,
        }));
    }

    let mut values = Vec::with_capacity(requested);
    let mut n_failed = 0;
    for s in slots {
        match s {
            Slot::Done(v) => values.push(v),
            Slot::Failed => n_failed += 1,
            Slot::Skipped => {}
        }
    }
    if n_failed > 0 {
        tracing::debug!(n_failed, requested, "some resamples failed to fit");
    }
    Ok(Resampled { values, n_failed, elapsed_secs })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_linear_sorted_edges() {
        let s = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((quantile_linear_sorted(&s, 0.0) - 1.0).abs() < 1e-12);
        assert!((quantile_linear_sorted(&s, 1.0) - 5.0).abs() < 1e-12);
        assert!((quantile_linear_sorted(&s, 0.5) - 3.0).abs() < 1e-12);
        assert!((quantile_linear_sorted(&s, 0.25) - 2.0).abs() < 1e-12);
        assert!(quantile_linear_sorted(&[], 0.5).is_nan());
    }

    #[test]
    fn percentile_interval_uses_miss_probability() {
        let xs: Vec<f64> = (0..=100).map(f64::from).collect();
        let (lo, hi) = percentile_interval(&xs, 0.1).unwrap();
        assert!((lo - 5.0).abs() < 1e-9);
        assert!((hi - 95.0).abs() < 1e-9);
        assert!(percentile_interval(&[1.0], 0.05).is_err());
        assert!(percentile_interval(&xs, 1.5).is_err());
    }

    #[test]
    fn resamples_are_deterministic_per_seed() {
        let data: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let mean_of = |rng: &mut StdRng| -> Result<f64> {
            let idx = bootstrap_indices(rng, data.len());
            Ok(idx.iter().map(|&i| data[i]).sum::<f64>() / idx.len() as f64)
        };
        let a = run_resamples(64, 7, None, mean_of).unwrap();
        let b = run_resamples(64, 7, None, mean_of).unwrap();
        assert_eq!(a.values, b.values);
        assert_eq!(a.n_failed, 0);
        let c = run_resamples(64, 8, None, mean_of).unwrap();
        assert_ne!(a.values, c.values);
    }

    #[test]
    fn failed_resamples_are_counted() {
        let r = run_resamples(10, 0, None, |rng: &mut StdRng| {
            if rng.random_range(0..2) == 0 { Err(Error::singular("test")) } else { Ok(1.0) }
        })
        .unwrap();
        assert_eq!(r.values.len() + r.n_failed, 10);
    }

    #[test]
    fn exhausted_budget_times_out() {
        let err = run_resamples(8, 0, Some(Duration::from_millis(1)), |_rng: &mut StdRng| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(0.0)
        })
        .unwrap_err();
        match err {
            Error::EstimationFailure(EstimationFailureCause::Timeout { requested, .. }) => {
                assert_eq!(requested, 8)
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }
}
