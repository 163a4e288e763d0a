//! Two-Stage Least Squares (2SLS) with first-stage diagnostics.
//!
//! # References
//!
//! - Wooldridge, *Econometric Analysis of Cross Section and Panel Data*, Ch. 5.
//! - Stock & Yogo (2005), "Testing for weak instruments in linear IV regression."

use ct_core::{Error, Result};
use nalgebra::{DMatrix, DVector};

use crate::regression::matrix_rank;

/// First-stage regression diagnostics for one endogenous regressor.
#[derive(Debug, Clone)]
pub struct FirstStage {
    /// F-statistic for joint significance of the excluded instruments.
    pub f_stat: f64,
    /// First-stage R².
    pub r_squared: f64,
    /// Partial R² of the excluded instruments.
    pub partial_r_squared: f64,
    /// Whether `f_stat` exceeds the Stock–Yogo 10% maximal-size critical value.
    pub strong: bool,
}

/// Result of a 2SLS fit.
#[derive(Debug, Clone)]
pub struct TslsFit {
    /// Coefficients on `[exogenous | endogenous]` columns.
    pub coefficients: DVector<f64>,
    /// Homoskedastic 2SLS covariance.
    pub covariance: DMatrix<f64>,
    /// Residual degrees of freedom.
    pub dof: usize,
    /// First-stage diagnostics, one per endogenous column.
    pub first_stage: Vec<FirstStage>,
    /// Observations.
    pub n_obs: usize,
}

/// Stock–Yogo 10% maximal IV size critical value for one endogenous regressor.
fn stock_yogo_cv(k_endog: usize, m: usize) -> f64 {
    match (k_endog, m) {
        (1, 1) => 16.38,
        (1, 2) => 19.93,
        _ => 10.0,
    }
}

fn rss_of(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<f64> {
    let xt = x.transpose();
    let inv = (&xt * x).try_inverse()?;
    let beta = inv * (&xt * y);
    Some((y - x * beta).norm_squared())
}

/// 2SLS of `y` on exogenous `x_exog` (include the intercept column here) and
/// endogenous `x_endog`, instrumented by excluded instruments `z`.
pub fn two_stage_least_squares(
    y: &DVector<f64>,
    x_exog: &DMatrix<f64>,
    x_endog: &DMatrix<f64>,
    z: &DMatrix<f64>,
) -> Result<TslsFit> {
    let n = y.len();
    let (k_exog, k_endog, m) = (x_exog.ncols(), x_endog.ncols(), z.ncols());
    if x_exog.nrows() != n || x_endog.nrows() != n || z.nrows() != n {
        return Err(Error::InvalidInput("2SLS inputs must have the same number of rows".into()));
    }
    if k_endog == 0 {
        return Err(Error::InvalidInput("2SLS needs at least 1 endogenous regressor".into()));
    }
    if m < k_endog {
        return Err(Error::unsupported(format!(
            "under-identified: {m} instruments < {k_endog} endogenous regressors"
        )));
    }
    let k_full_z = k_exog + m;
    let k_total = k_exog + k_endog;
    if n <= k_full_z.max(k_total) {
        return Err(Error::insufficient_data(format!("{n} observations for 2SLS with {k_full_z} instruments")));
    }

    // Full instrument matrix [X_exog | Z].
    let mut z_full = DMatrix::zeros(n, k_full_z);
    z_full.columns_mut(0, k_exog).copy_from(x_exog);
    z_full.columns_mut(k_exog, m).copy_from(z);
    if matrix_rank(&z_full) < k_full_z {
        return Err(Error::singular("instrument matrix is rank deficient"));
    }
    let ztz_inv = (z_full.transpose() * &z_full)
        .try_inverse()
        .ok_or_else(|| Error::singular("Z'Z singular in 2SLS"))?;

    // First stage: each endogenous column on Z_full.
    let mut first_stage = Vec::with_capacity(k_endog);
    let mut x_endog_hat = DMatrix::zeros(n, k_endog);
    for e in 0..k_endog {
        let endog = x_endog.column(e).into_owned();
        let gamma = &ztz_inv * (z_full.transpose() * &endog);
        let fitted = &z_full * gamma;
        let rss_fs = (&endog - &fitted).norm_squared();
        x_endog_hat.set_column(e, &fitted);

        let mean = endog.mean();
        let tss_fs: f64 = endog.iter().map(|v| (v - mean).powi(2)).sum();
        let r_squared = if tss_fs > 0.0 { 1.0 - rss_fs / tss_fs } else { 0.0 };

        let rss_restricted = if k_exog > 0 { rss_of(x_exog, &endog).unwrap_or(tss_fs) } else { tss_fs };
        let f_stat = if rss_fs > 0.0 {
            ((rss_restricted - rss_fs) / m as f64) / (rss_fs / (n - k_full_z) as f64)
        } else {
            f64::INFINITY
        };
        let partial_r_squared =
            if rss_restricted > 0.0 { (rss_restricted - rss_fs) / rss_restricted } else { 0.0 };
        let strong = f_stat > stock_yogo_cv(k_endog, m);
        if !strong {
            tracing::warn!(f_stat, endogenous = e, "weak instruments (first-stage F below Stock-Yogo 10%)");
        }
        first_stage.push(FirstStage { f_stat, r_squared, partial_r_squared, strong });
    }

    // Second stage on [X_exog | X̂_endog].
    let mut x2 = DMatrix::zeros(n, k_total);
    x2.columns_mut(0, k_exog).copy_from(x_exog);
    x2.columns_mut(k_exog, k_endog).copy_from(&x_endog_hat);
    let xtx2_inv = (x2.transpose() * &x2)
        .try_inverse()
        .ok_or_else(|| Error::singular("X'X singular in 2SLS second stage"))?;
    let coefficients = &xtx2_inv * (x2.transpose() * y);

    // Residuals use the original endogenous columns.
    let mut x_orig = DMatrix::zeros(n, k_total);
    x_orig.columns_mut(0, k_exog).copy_from(x_exog);
    x_orig.columns_mut(k_exog, k_endog).copy_from(x_endog);
    let rss = (y - &x_orig * &coefficients).norm_squared();
    let dof = n - k_total;
    let covariance = xtx2_inv * (rss / dof as f64);

    Ok(TslsFit { coefficients, covariance, dof, first_stage, n_obs: n })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    use super::*;

    #[test]
    fn exact_identification_without_noise() {
        let n = 100;
        let z = DMatrix::from_fn(n, 1, |i, _| i as f64 / 10.0);
        let x = DMatrix::from_fn(n, 1, |i, _| 0.5 * z[(i, 0)]);
        let y = DVector::from_fn(n, |i, _| 1.0 + 2.0 * x[(i, 0)]);
        let ones = DMatrix::from_element(n, 1, 1.0);
        let fit = two_stage_least_squares(&y, &ones, &x, &z).unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-6);
        assert!(fit.first_stage[0].r_squared > 0.99);
        assert!(fit.first_stage[0].strong);
    }

    #[test]
    fn removes_confounding_bias() {
        let n = 4000;
        let mut rng = StdRng::seed_from_u64(3);
        let std = Normal::new(0.0, 1.0).unwrap();
        let u: Vec<f64> = (0..n).map(|_| std.sample(&mut rng)).collect();
        let zv: Vec<f64> = (0..n).map(|_| std.sample(&mut rng)).collect();
        let xv: Vec<f64> =
            (0..n).map(|i| zv[i] + u[i] + 0.5 * std.sample(&mut rng)).collect();
        let yv: Vec<f64> =
            (0..n).map(|i| 1.5 * xv[i] + 2.0 * u[i] + 0.5 * std.sample(&mut rng)).collect();

        let ones = DMatrix::from_element(n, 1, 1.0);
        let fit = two_stage_least_squares(
            &DVector::from_vec(yv),
            &ones,
            &DMatrix::from_vec(n, 1, xv),
            &DMatrix::from_vec(n, 1, zv),
        )
        .unwrap();
        assert!((fit.coefficients[1] - 1.5).abs() < 0.1, "beta={}", fit.coefficients[1]);
        assert!(fit.covariance[(1, 1)] > 0.0);
    }

    #[test]
    fn under_identified_is_rejected() {
        let n = 10;
        let ones = DMatrix::from_element(n, 1, 1.0);
        let x = DMatrix::from_fn(n, 2, |i, j| (i + j) as f64);
        let z = DMatrix::from_fn(n, 1, |i, _| i as f64);
        let y = DVector::from_element(n, 1.0);
        assert!(two_stage_least_squares(&y, &ones, &x, &z).is_err());
    }
}
