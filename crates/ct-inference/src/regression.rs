//! Closed-form ordinary least squares with classical covariance.

use ct_core::{Error, Result};
use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Relative singular-value threshold for the rank check.
const RANK_TOL: f64 = 1e-10;

/// Fitted OLS model.
#[derive(Debug, Clone)]
pub struct OlsFit {
    /// Coefficients, one per design column.
    pub coefficients: DVector<f64>,
    /// `sigma^2 (X'X)^-1`.
    pub covariance: DMatrix<f64>,
    /// Residual variance `RSS / (n - p)`.
    pub sigma2: f64,
    /// Residual degrees of freedom `n - p`.
    pub dof: usize,
    /// Observations.
    pub n_obs: usize,
}

impl OlsFit {
    /// `c' beta`.
    pub fn linear_combination(&self, c: &DVector<f64>) -> f64 {
        c.dot(&self.coefficients)
    }

    /// Standard error of `c' beta`.
    pub fn linear_combination_se(&self, c: &DVector<f64>) -> f64 {
        (c.transpose() * &self.covariance * c)[(0, 0)].max(0.0).sqrt()
    }

    /// Standard errors of the coefficients.
    pub fn standard_errors(&self) -> Vec<f64> {
        (0..self.coefficients.len()).map(|j| self.covariance[(j, j)].max(0.0).sqrt()).collect()
    }
}

#[inline]
fn validate_xy_dims(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<()> {
    let (n, p) = x.shape();
    if p == 0 {
        return Err(Error::InvalidInput("X must have at least 1 column".to_string()));
    }
    if y.len() != n {
        return Err(Error::InvalidInput(format!("y has wrong length: expected n={n}, got {}", y.len())));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(Error::InvalidInput("X and y must contain only finite values".to_string()));
    }
    if n <= p {
        return Err(Error::insufficient_data(format!(
            "{n} observations for {p} coefficients leaves no residual degrees of freedom"
        )));
    }
    Ok(())
}

/// Numerical rank of `x` from its singular values.
pub fn matrix_rank(x: &DMatrix<f64>) -> usize {
    let svd = x.clone().svd(false, false);
    let max_sv = svd.singular_values.max();
    if max_sv <= 0.0 {
        return 0;
    }
    svd.rank(max_sv * RANK_TOL)
}

/// Fit `y = X beta + e` by least squares.
///
/// Rank-deficient designs fail with `EstimationFailure(Singular)`.
pub fn ols(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit> {
    validate_xy_dims(x, y)?;
    let (n, p) = x.shape();
    let rank = matrix_rank(x);
    if rank < p {
        return Err(Error::singular(format!("design has rank {rank} < {p} columns")));
    }

    let xt = x.transpose();
    let xtx = &xt * x;
    let xty = &xt * y;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| Error::singular("X'X is not invertible"))?;
    let coefficients = &xtx_inv * xty;

    let resid = y - x * &coefficients;
    let rss = resid.norm_squared();
    let dof = n - p;
    let sigma2 = rss / dof as f64;
    let covariance = xtx_inv * sigma2;
    Ok(OlsFit { coefficients, covariance, sigma2, dof, n_obs: n })
}

/// Two-sided `1 - confidence_level` interval `estimate ± t_{dof} * se`.
pub fn t_interval(estimate: f64, se: f64, dof: usize, confidence_level: f64) -> Result<(f64, f64)> {
    ct_core::validate_confidence_level(confidence_level)?;
    if dof == 0 {
        return Err(Error::insufficient_data("t interval needs at least 1 degree of freedom"));
    }
    let t = StudentsT::new(0.0, 1.0, dof as f64)
        .map_err(|e| Error::InvalidInput(format!("Student-t: {e}")))?;
    let q = t.inverse_cdf(1.0 - confidence_level / 2.0);
    Ok((estimate - q * se, estimate + q * se))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    use super::*;

    fn with_intercept(xs: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(xs.len(), 2, |i, j| if j == 0 { 1.0 } else { xs[i] })
    }

    #[test]
    fn exact_line_is_recovered() {
        let xs: Vec<f64> = (0..10).map(f64::from).collect();
        let y = DVector::from_iterator(10, xs.iter().map(|x| 1.0 + 2.0 * x));
        let fit = ols(&with_intercept(&xs), &y).unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(fit.coefficients[1], 2.0, epsilon = 1e-10);
        assert_eq!(fit.dof, 8);
        assert!(fit.sigma2 < 1e-20);
    }

    #[test]
    fn standard_error_matches_textbook_formula() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let xs: Vec<f64> = (0..200).map(|i| i as f64 / 20.0).collect();
        let y = DVector::from_iterator(200, xs.iter().map(|x| 0.5 * x + noise.sample(&mut rng)));
        let fit = ols(&with_intercept(&xs), &y).unwrap();
        let mean = xs.iter().sum::<f64>() / 200.0;
        let sxx: f64 = xs.iter().map(|x| (x - mean).powi(2)).sum();
        let se_slope = (fit.sigma2 / sxx).sqrt();
        assert_relative_eq!(fit.standard_errors()[1], se_slope, max_relative = 1e-8);
        let c = DVector::from_vec(vec![0.0, 1.0]);
        assert_relative_eq!(fit.linear_combination_se(&c), se_slope, max_relative = 1e-8);
    }

    #[test]
    fn collinear_design_is_singular() {
        let x = DMatrix::from_fn(6, 3, |i, j| match j {
            0 => 1.0,
            1 => i as f64,
            _ => 2.0 * i as f64,
        });
        let y = DVector::from_element(6, 1.0);
        let err = ols(&x, &y).unwrap_err();
        assert!(matches!(
            err,
            Error::EstimationFailure(ct_core::EstimationFailureCause::Singular(_))
        ));
    }

    #[test]
    fn too_few_rows() {
        let x = with_intercept(&[1.0, 2.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(
            ols(&x, &y),
            Err(Error::EstimationFailure(ct_core::EstimationFailureCause::InsufficientData(_)))
        ));
    }

    #[test]
    fn t_interval_widens_with_coverage() {
        let (lo95, hi95) = t_interval(2.0, 0.1, 30, 0.05).unwrap();
        let (lo80, hi80) = t_interval(2.0, 0.1, 30, 0.2).unwrap();
        assert!(lo95 < lo80 && hi80 < hi95);
        assert_relative_eq!((lo95 + hi95) / 2.0, 2.0, epsilon = 1e-12);
        // t_{30, 0.975} ~= 2.042
        assert_relative_eq!(hi95 - 2.0, 0.2042, epsilon = 1e-3);
    }
}
