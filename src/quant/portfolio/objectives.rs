//! # Portfolio Objectives
//!
//! $$
//! f_{S}(\mathbf{w})=-\frac{\mathbf{w}^\top\mu-r_f}{\sigma_p},\qquad
//! \nabla f_{S}=\frac{(\mathbf{w}^\top\mu-r_f)\,\Sigma\mathbf{w}}{\sigma_p^3}-\frac{\mu}{\sigma_p},\qquad
//! \nabla\sigma_p=\frac{\Sigma\mathbf{w}}{\sigma_p}
//! $$
//!
//! Minimization targets for the constrained optimizer, with analytic gradients.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use super::performance::evaluate_performance;
use super::performance::VOLATILITY_FLOOR;
use crate::error::PortfolioError;

/// Negated Sharpe ratio; minimizing it maximizes the Sharpe ratio.
#[derive(ImplNew, Clone, Debug)]
pub struct NegativeSharpe {
  /// Annualized expected returns.
  pub mean_returns: Array1<f64>,
  /// Annualized covariance matrix.
  pub cov_matrix: Array2<f64>,
  /// Annualized risk-free rate.
  pub risk_free_rate: f64,
}

impl NegativeSharpe {
  pub fn value(&self, weights: ArrayView1<f64>) -> crate::error::Result<f64> {
    let perf = evaluate_performance(
      weights,
      self.mean_returns.view(),
      self.cov_matrix.view(),
      self.risk_free_rate,
    )?;
    Ok(-perf.sharpe)
  }

  pub fn gradient_at(&self, weights: ArrayView1<f64>) -> crate::error::Result<Array1<f64>> {
    let sigma_w = self.cov_matrix.dot(&weights);
    let vol = weights.dot(&sigma_w).max(0.0).sqrt();
    if !(vol > VOLATILITY_FLOOR) {
      return Err(PortfolioError::DegenerateVolatility { volatility: vol });
    }

    let excess = weights.dot(&self.mean_returns) - self.risk_free_rate;
    Ok(sigma_w * (excess / vol.powi(3)) - &self.mean_returns / vol)
  }
}

impl CostFunction for NegativeSharpe {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.value(ArrayView1::from(x.as_slice()))?)
  }
}

impl Gradient for NegativeSharpe {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    Ok(self.gradient_at(ArrayView1::from(x.as_slice()))?.to_vec())
  }
}

/// Portfolio volatility.
#[derive(ImplNew, Clone, Debug)]
pub struct Volatility {
  /// Annualized covariance matrix.
  pub cov_matrix: Array2<f64>,
}

impl Volatility {
  pub fn value(&self, weights: ArrayView1<f64>) -> crate::error::Result<f64> {
    if weights.len() != self.cov_matrix.nrows() || weights.len() != self.cov_matrix.ncols() {
      return Err(PortfolioError::DimensionMismatch {
        context: "weights",
        expected: self.cov_matrix.nrows(),
        got: weights.len(),
      });
    }
    let sigma_w = self.cov_matrix.dot(&weights);
    Ok(weights.dot(&sigma_w).max(0.0).sqrt())
  }

  /// `Sigma w / sigma_p`. At zero volatility the portfolio is a global
  /// minimum and the zero vector is returned as its subgradient.
  pub fn gradient_at(&self, weights: ArrayView1<f64>) -> crate::error::Result<Array1<f64>> {
    let sigma_w = self.cov_matrix.dot(&weights);
    let vol = weights.dot(&sigma_w).max(0.0).sqrt();
    if !(vol > VOLATILITY_FLOOR) {
      return Ok(Array1::zeros(weights.len()));
    }
    Ok(sigma_w / vol)
  }
}

impl CostFunction for Volatility {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    Ok(self.value(ArrayView1::from(x.as_slice()))?)
  }
}

impl Gradient for Volatility {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, x: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    Ok(self.gradient_at(ArrayView1::from(x.as_slice()))?.to_vec())
  }
}
