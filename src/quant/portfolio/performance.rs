//! # Portfolio Performance
//!
//! $$
//! R_p=\mathbf{w}^\top\mu,\qquad \sigma_p=\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}},\qquad S=\frac{R_p-r_f}{\sigma_p}
//! $$
//!
use ndarray::ArrayView1;
use ndarray::ArrayView2;

use super::types::PortfolioPerformance;
use crate::error::PortfolioError;
use crate::error::Result;

/// Volatilities at or below this value make the Sharpe ratio undefined.
pub const VOLATILITY_FLOOR: f64 = 1e-12;

/// Check that `weights`, `mean_returns` and `cov_matrix` describe the same
/// non-empty universe.
pub(crate) fn check_dimensions(
  n_weights: usize,
  mean_returns: ArrayView1<f64>,
  cov_matrix: ArrayView2<f64>,
) -> Result<usize> {
  let n = mean_returns.len();
  if n == 0 {
    return Err(PortfolioError::EmptyUniverse);
  }
  if n_weights != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "weights",
      expected: n,
      got: n_weights,
    });
  }
  if cov_matrix.nrows() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "covariance rows",
      expected: n,
      got: cov_matrix.nrows(),
    });
  }
  if cov_matrix.ncols() != n {
    return Err(PortfolioError::DimensionMismatch {
      context: "covariance columns",
      expected: n,
      got: cov_matrix.ncols(),
    });
  }
  Ok(n)
}

/// `w . mu`
pub fn portfolio_return(weights: ArrayView1<f64>, mean_returns: ArrayView1<f64>) -> f64 {
  weights.dot(&mean_returns)
}

/// `sqrt(w' Sigma w)`; a slightly negative quadratic form from round-off is
/// treated as zero.
pub fn portfolio_volatility(weights: ArrayView1<f64>, cov_matrix: ArrayView2<f64>) -> f64 {
  let sigma_w = cov_matrix.dot(&weights);
  weights.dot(&sigma_w).max(0.0).sqrt()
}

/// Expected return, volatility and Sharpe ratio of `weights`.
///
/// Fails with [`PortfolioError::DegenerateVolatility`] instead of returning an
/// infinite or `NaN` Sharpe ratio when the volatility vanishes.
pub fn evaluate_performance(
  weights: ArrayView1<f64>,
  mean_returns: ArrayView1<f64>,
  cov_matrix: ArrayView2<f64>,
  risk_free_rate: f64,
) -> Result<PortfolioPerformance> {
  check_dimensions(weights.len(), mean_returns, cov_matrix)?;

  let expected_return = portfolio_return(weights, mean_returns);
  let volatility = portfolio_volatility(weights, cov_matrix);
  if !(volatility > VOLATILITY_FLOOR) {
    return Err(PortfolioError::DegenerateVolatility { volatility });
  }

  Ok(PortfolioPerformance {
    expected_return,
    volatility,
    sharpe: (expected_return - risk_free_rate) / volatility,
  })
}
