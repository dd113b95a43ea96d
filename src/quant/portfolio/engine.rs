//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(\mu, \Sigma, \rho)
//! $$
//!
//! High-level API that runs the optimizers against a bundle of annualized
//! asset statistics.

use tracing::warn;

use super::data::AssetStatistics;
use super::frontier::FrontierSampler;
use super::frontier::FrontierSamples;
use super::optimizers::solve_max_sharpe;
use super::optimizers::solve_min_volatility;
use super::types::OptimizationResult;
use super::types::OptimizerConfig;
use super::types::PortfolioObjective;
use super::types::PortfolioPerformance;
use crate::error::Result;

/// Optimized portfolio together with its evaluated performance.
#[derive(Clone, Debug)]
pub struct PortfolioReport {
  pub objective: PortfolioObjective,
  pub result: OptimizationResult,
  /// `None` when the returned weights have degenerate volatility.
  pub performance: Option<PortfolioPerformance>,
}

/// Single entry point for optimizing and sampling one asset universe.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: OptimizerConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: OptimizerConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  /// Optimize portfolio weights for `objective`.
  pub fn optimize(
    &self,
    objective: PortfolioObjective,
    stats: &AssetStatistics,
  ) -> Result<OptimizationResult> {
    match objective {
      PortfolioObjective::MaxSharpe => {
        solve_max_sharpe(&stats.mean_returns, &stats.cov_matrix, &self.config)
      }
      PortfolioObjective::MinVolatility => {
        solve_min_volatility(&stats.mean_returns, &stats.cov_matrix, &self.config)
      }
    }
  }

  pub fn max_sharpe(&self, stats: &AssetStatistics) -> Result<OptimizationResult> {
    self.optimize(PortfolioObjective::MaxSharpe, stats)
  }

  pub fn min_volatility(&self, stats: &AssetStatistics) -> Result<OptimizationResult> {
    self.optimize(PortfolioObjective::MinVolatility, stats)
  }

  /// Optimize and evaluate the resulting weights.
  pub fn report(
    &self,
    objective: PortfolioObjective,
    stats: &AssetStatistics,
  ) -> Result<PortfolioReport> {
    let result = self.optimize(objective, stats)?;
    let performance = match result.performance(
      &stats.mean_returns,
      &stats.cov_matrix,
      self.config.risk_free_rate,
    ) {
      Ok(perf) => Some(perf),
      Err(err) => {
        warn!(objective = %objective, error = %err, "could not evaluate optimized weights");
        None
      }
    };

    Ok(PortfolioReport {
      objective,
      result,
      performance,
    })
  }

  /// Random long-only portfolios evaluated at the engine's risk-free rate.
  pub fn frontier(
    &self,
    stats: &AssetStatistics,
    sampler: &FrontierSampler,
  ) -> Result<FrontierSamples> {
    sampler.sample(
      &stats.mean_returns,
      &stats.cov_matrix,
      self.config.risk_free_rate,
    )
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  fn stats() -> AssetStatistics {
    AssetStatistics {
      assets: vec!["AAA".to_string(), "BBB".to_string()],
      mean_returns: array![0.10, 0.20],
      cov_matrix: array![[0.04, 0.01], [0.01, 0.09]],
      periods_per_year: 252.0,
    }
  }

  #[test]
  fn engine_dispatches_on_objective() {
    let engine = PortfolioEngine::default();
    let stats = stats();

    let min_vol = engine.min_volatility(&stats).unwrap();
    let same = engine
      .optimize(PortfolioObjective::MinVolatility, &stats)
      .unwrap();
    assert_eq!(min_vol.weights, same.weights);
    assert_abs_diff_eq!(min_vol.weights[0], 8.0 / 11.0, epsilon = 1e-5);

    let sharpe = engine.max_sharpe(&stats).unwrap();
    assert!(sharpe.success);
    assert!(sharpe.objective_value < min_vol.objective_value);
  }

  #[test]
  fn report_carries_performance() {
    let engine = PortfolioEngine::new(OptimizerConfig::default().with_risk_free_rate(0.02));
    let report = engine
      .report(PortfolioObjective::MaxSharpe, &stats())
      .unwrap();

    assert_eq!(report.objective, PortfolioObjective::MaxSharpe);
    let perf = report.performance.unwrap();
    assert_abs_diff_eq!(perf.sharpe, -report.result.objective_value, epsilon = 1e-12);
  }

  #[test]
  fn report_without_volatility_has_no_performance() {
    let engine = PortfolioEngine::default();
    let flat = AssetStatistics {
      assets: vec!["CASH".to_string()],
      mean_returns: array![0.01],
      cov_matrix: array![[0.0]],
      periods_per_year: 252.0,
    };

    let report = engine
      .report(PortfolioObjective::MinVolatility, &flat)
      .unwrap();
    // zero volatility is a valid minimum, but its Sharpe ratio is undefined
    assert!(report.result.success, "{}", report.result.message);
    assert_abs_diff_eq!(report.result.weights[0], 1.0);
    assert_abs_diff_eq!(report.result.objective_value, 0.0);
    assert!(report.performance.is_none());
  }

  #[test]
  fn frontier_uses_engine_risk_free_rate() {
    let engine = PortfolioEngine::new(OptimizerConfig::default().with_risk_free_rate(0.05));
    let samples = engine
      .frontier(&stats(), &FrontierSampler::new(50, Some(3)))
      .unwrap();

    for i in 0..samples.len() {
      let expected = (samples.returns[i] - 0.05) / samples.volatilities[i];
      assert_abs_diff_eq!(samples.sharpes[i], expected, epsilon = 1e-12);
    }
  }
}
