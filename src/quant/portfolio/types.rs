//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared configuration, objective selector and result containers.

use std::fmt::Display;
use std::str::FromStr;

use ndarray::Array1;
use ndarray::Array2;

use super::performance::evaluate_performance;
use super::solver::Bounds;
use crate::error::PortfolioError;
use crate::error::Result;

/// Supported optimization targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortfolioObjective {
  /// Maximize `(E[R_p] - r_f) / sigma_p` by minimizing its negation.
  MaxSharpe,
  /// Minimize `sigma_p`.
  MinVolatility,
}

impl FromStr for PortfolioObjective {
  type Err = PortfolioError;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_lowercase().as_str() {
      "sharpe" | "max-sharpe" | "maxsharpe" | "tangency" => Ok(Self::MaxSharpe),
      "vol" | "min-vol" | "min-volatility" | "minvol" | "gmv" => Ok(Self::MinVolatility),
      other => Err(PortfolioError::InvalidConfig(format!(
        "unknown portfolio objective '{other}'"
      ))),
    }
  }
}

impl Display for PortfolioObjective {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      PortfolioObjective::MaxSharpe => write!(f, "Max Sharpe Ratio"),
      PortfolioObjective::MinVolatility => write!(f, "Minimum Volatility"),
    }
  }
}

/// Optimizer configuration.
///
/// Defaults: `risk_free_rate = 0.0`, `no_shorting = true`, `weight_cap = 1.0`,
/// `max_iters = 5000`, `tolerance = 1e-9`.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizerConfig {
  /// Annualized risk-free rate used by the Sharpe objective.
  pub risk_free_rate: f64,
  /// Long-only when `true` (lower bound 0), otherwise weights may go down to -1.
  pub no_shorting: bool,
  /// Upper bound on every single weight.
  pub weight_cap: f64,
  /// Iteration cap for the solver.
  pub max_iters: u64,
  /// Projected-gradient stationarity tolerance.
  pub tolerance: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.0,
      no_shorting: true,
      weight_cap: 1.0,
      max_iters: 5000,
      tolerance: 1e-9,
    }
  }
}

impl OptimizerConfig {
  pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
    self.risk_free_rate = risk_free_rate;
    self
  }

  pub fn with_no_shorting(mut self, no_shorting: bool) -> Self {
    self.no_shorting = no_shorting;
    self
  }

  pub fn with_weight_cap(mut self, weight_cap: f64) -> Self {
    self.weight_cap = weight_cap;
    self
  }

  pub fn with_max_iters(mut self, max_iters: u64) -> Self {
    self.max_iters = max_iters;
    self
  }

  pub fn with_tolerance(mut self, tolerance: f64) -> Self {
    self.tolerance = tolerance;
    self
  }

  /// Lower weight bound implied by the shorting flag.
  pub fn lower_bound(&self) -> f64 {
    if self.no_shorting {
      0.0
    } else {
      -1.0
    }
  }

  /// `[lower_bound, weight_cap]` for each of `n` assets.
  pub fn bounds(&self, n: usize) -> Result<Bounds> {
    Bounds::uniform(n, self.lower_bound(), self.weight_cap)
  }

  /// Reject values the solver cannot work with.
  ///
  /// A cap that is too small for the universe is *not* rejected here: that is
  /// an infeasible problem and is reported through the result's success flag.
  pub fn validate(&self) -> Result<()> {
    if !self.risk_free_rate.is_finite() {
      return Err(PortfolioError::InvalidConfig(
        "risk_free_rate must be finite".into(),
      ));
    }
    if !self.weight_cap.is_finite() || self.weight_cap <= 0.0 {
      return Err(PortfolioError::InvalidConfig(format!(
        "weight_cap must be a positive finite number, got {}",
        self.weight_cap
      )));
    }
    if self.max_iters == 0 {
      return Err(PortfolioError::InvalidConfig(
        "max_iters must be at least 1".into(),
      ));
    }
    if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
      return Err(PortfolioError::InvalidConfig(format!(
        "tolerance must be a positive finite number, got {}",
        self.tolerance
      )));
    }
    Ok(())
  }
}

/// Expected return, volatility and Sharpe ratio of one weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioPerformance {
  /// `w . mu` (annualized if the inputs are annualized).
  pub expected_return: f64,
  /// `sqrt(w' Sigma w)`.
  pub volatility: f64,
  /// `(expected_return - r_f) / volatility`.
  pub sharpe: f64,
}

/// Output of a constrained optimization run.
///
/// Callers must check [`OptimizationResult::success`] before trusting
/// `weights`; on failure they hold the best-effort point the solver reached.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
  /// Final portfolio weights.
  pub weights: Array1<f64>,
  /// Converged and feasible.
  pub success: bool,
  /// Objective value at `weights` (`NaN` when it could not be evaluated).
  pub objective_value: f64,
  /// Solver iterations performed.
  pub iterations: u64,
  /// Diagnostic message from the solver.
  pub message: String,
}

impl OptimizationResult {
  /// Evaluate the resulting weights against the given statistics.
  pub fn performance(
    &self,
    mean_returns: &Array1<f64>,
    cov_matrix: &Array2<f64>,
    risk_free_rate: f64,
  ) -> Result<PortfolioPerformance> {
    evaluate_performance(
      self.weights.view(),
      mean_returns.view(),
      cov_matrix.view(),
      risk_free_rate,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_matches_documented_defaults() {
    let config = OptimizerConfig::default();

    assert_eq!(config.risk_free_rate, 0.0);
    assert!(config.no_shorting);
    assert_eq!(config.weight_cap, 1.0);
    assert_eq!(config.lower_bound(), 0.0);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn shorting_lowers_bound_to_minus_one() {
    let config = OptimizerConfig::default().with_no_shorting(false);
    assert_eq!(config.lower_bound(), -1.0);

    let bounds = config.with_weight_cap(0.4).bounds(3).unwrap();
    assert_eq!(bounds.len(), 3);
    assert!(bounds.lower().iter().all(|&l| l == -1.0));
    assert!(bounds.upper().iter().all(|&u| u == 0.4));
  }

  #[test]
  fn validate_rejects_unusable_values() {
    let base = OptimizerConfig::default();

    assert!(base.clone().with_weight_cap(0.0).validate().is_err());
    assert!(base.clone().with_weight_cap(f64::NAN).validate().is_err());
    assert!(base.clone().with_risk_free_rate(f64::INFINITY).validate().is_err());
    assert!(base.clone().with_max_iters(0).validate().is_err());
    assert!(base.with_tolerance(-1.0).validate().is_err());
  }

  #[test]
  fn objective_parses_aliases() {
    assert_eq!(
      "max-sharpe".parse::<PortfolioObjective>().unwrap(),
      PortfolioObjective::MaxSharpe
    );
    assert_eq!(
      "GMV".parse::<PortfolioObjective>().unwrap(),
      PortfolioObjective::MinVolatility
    );
    assert!("hrp".parse::<PortfolioObjective>().is_err());
  }
}
