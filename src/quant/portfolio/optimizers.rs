//! # Portfolio Optimizers
//!
//! $$
//! \min_{\mathbf{w}} f(\mathbf{w})\quad\text{s.t.}\quad \sum_i w_i = 1,\ \ l \le w_i \le c
//! $$
//!
//! Maximum Sharpe ratio and minimum volatility portfolios. The lower bound `l`
//! is `0` for long-only portfolios and `-1` when shorting is allowed; `c` is
//! the per-asset weight cap. Both solves start from equal weights.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;
use tracing::warn;

use super::objectives::NegativeSharpe;
use super::objectives::Volatility;
use super::performance::check_dimensions;
use super::solver::ConstrainedMinimizer;
use super::solver::LinearEquality;
use super::solver::ProjectedGradient;
use super::types::OptimizationResult;
use super::types::OptimizerConfig;
use super::types::PortfolioObjective;
use crate::error::PortfolioError;
use crate::error::Result;

/// Tolerance for the budget and bound checks on a returned solution.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

fn validate_inputs(
  mean_returns: &Array1<f64>,
  cov_matrix: &Array2<f64>,
  config: &OptimizerConfig,
) -> Result<usize> {
  let n = check_dimensions(mean_returns.len(), mean_returns.view(), cov_matrix.view())?;
  if mean_returns.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::NonFiniteInput("mean returns"));
  }
  if cov_matrix.iter().any(|v| !v.is_finite()) {
    return Err(PortfolioError::NonFiniteInput("covariance matrix"));
  }
  config.validate()?;
  Ok(n)
}

fn solve<M, O>(
  minimizer: &M,
  objective: O,
  kind: PortfolioObjective,
  n: usize,
  config: &OptimizerConfig,
) -> Result<OptimizationResult>
where
  M: ConstrainedMinimizer,
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  let lower = config.lower_bound();
  let bounds = config.bounds(n)?;
  let budget = LinearEquality::budget(n);
  let initial_guess = Array1::from_elem(n, 1.0 / n as f64);

  debug!(
    objective = %kind,
    assets = n,
    lower_bound = lower,
    weight_cap = config.weight_cap,
    "starting portfolio optimization"
  );
  let outcome = minimizer.minimize(objective, &initial_guess, &bounds, &budget);

  let budget_residual = budget.residual(outcome.solution.view()).abs();
  let within_bounds = bounds.contains(outcome.solution.view(), FEASIBILITY_TOLERANCE);
  let feasible = budget_residual <= FEASIBILITY_TOLERANCE && within_bounds;

  let success = outcome.success && feasible && outcome.objective_value.is_finite();
  let message = if outcome.success && !feasible {
    format!(
      "solution violates constraints (budget residual {budget_residual:e}, within bounds: {within_bounds})"
    )
  } else if outcome.success && !outcome.objective_value.is_finite() {
    "objective value is not finite".to_string()
  } else {
    outcome.message
  };

  if success {
    debug!(
      objective = %kind,
      iterations = outcome.iterations,
      value = outcome.objective_value,
      "portfolio optimization converged"
    );
  } else {
    warn!(objective = %kind, %message, "portfolio optimization did not succeed");
  }

  Ok(OptimizationResult {
    weights: outcome.solution,
    success,
    objective_value: outcome.objective_value,
    iterations: outcome.iterations,
    message,
  })
}

/// Maximum Sharpe ratio portfolio using the default projected-gradient solver.
pub fn solve_max_sharpe(
  mean_returns: &Array1<f64>,
  cov_matrix: &Array2<f64>,
  config: &OptimizerConfig,
) -> Result<OptimizationResult> {
  solve_max_sharpe_with(&ProjectedGradient::from(config), mean_returns, cov_matrix, config)
}

/// Maximum Sharpe ratio portfolio with a caller-supplied solver.
pub fn solve_max_sharpe_with<M: ConstrainedMinimizer>(
  minimizer: &M,
  mean_returns: &Array1<f64>,
  cov_matrix: &Array2<f64>,
  config: &OptimizerConfig,
) -> Result<OptimizationResult> {
  let n = validate_inputs(mean_returns, cov_matrix, config)?;
  let objective = NegativeSharpe::new(
    mean_returns.clone(),
    cov_matrix.clone(),
    config.risk_free_rate,
  );
  solve(minimizer, objective, PortfolioObjective::MaxSharpe, n, config)
}

/// Minimum volatility portfolio using the default projected-gradient solver.
///
/// `config.risk_free_rate` plays no role here.
pub fn solve_min_volatility(
  mean_returns: &Array1<f64>,
  cov_matrix: &Array2<f64>,
  config: &OptimizerConfig,
) -> Result<OptimizationResult> {
  solve_min_volatility_with(&ProjectedGradient::from(config), mean_returns, cov_matrix, config)
}

/// Minimum volatility portfolio with a caller-supplied solver.
pub fn solve_min_volatility_with<M: ConstrainedMinimizer>(
  minimizer: &M,
  mean_returns: &Array1<f64>,
  cov_matrix: &Array2<f64>,
  config: &OptimizerConfig,
) -> Result<OptimizationResult> {
  let n = validate_inputs(mean_returns, cov_matrix, config)?;
  let objective = Volatility::new(cov_matrix.clone());
  solve(minimizer, objective, PortfolioObjective::MinVolatility, n, config)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;
  use crate::quant::portfolio::performance::evaluate_performance;
  use crate::quant::portfolio::performance::portfolio_volatility;
  use crate::quant::portfolio::solver::Bounds;
  use crate::quant::portfolio::solver::SolverOutcome;

  fn two_assets() -> (Array1<f64>, Array2<f64>) {
    (array![0.10, 0.20], array![[0.04, 0.01], [0.01, 0.09]])
  }

  fn five_assets() -> (Array1<f64>, Array2<f64>) {
    let vols = [0.28, 0.25, 0.30, 0.35, 0.40];
    let corr = [
      [1.0, 0.65, 0.55, 0.50, 0.45],
      [0.65, 1.0, 0.60, 0.55, 0.50],
      [0.55, 0.60, 1.0, 0.50, 0.45],
      [0.50, 0.55, 0.50, 1.0, 0.40],
      [0.45, 0.50, 0.45, 0.40, 1.0],
    ];
    let cov = Array2::from_shape_fn((5, 5), |(i, j)| vols[i] * vols[j] * corr[i][j]);
    (array![0.30, 0.25, 0.20, 0.32, 0.18], cov)
  }

  fn assert_feasible(weights: &Array1<f64>, lower: f64, cap: f64) {
    assert_abs_diff_eq!(weights.sum(), 1.0, epsilon = 1e-6);
    for &w in weights.iter() {
      assert!(w >= lower - 1e-6 && w <= cap + 1e-6, "weight {w} outside [{lower}, {cap}]");
    }
  }

  #[test]
  fn min_volatility_matches_closed_form_for_two_assets() {
    let (mu, cov) = two_assets();
    let result = solve_min_volatility(&mu, &cov, &OptimizerConfig::default()).unwrap();

    assert!(result.success, "{}", result.message);
    // w1 = (s22 - s12) / (s11 + s22 - 2 s12) = 0.08 / 0.11
    assert_abs_diff_eq!(result.weights[0], 8.0 / 11.0, epsilon = 1e-5);
    assert_abs_diff_eq!(result.weights[1], 3.0 / 11.0, epsilon = 1e-5);
    assert!(result.weights[0] > result.weights[1]);
  }

  #[test]
  fn max_sharpe_matches_closed_form_for_two_assets() {
    let (mu, cov) = two_assets();

    // tangency direction Sigma^-1 (mu - rf); at rf = 0 it is (0.007, 0.007) / 0.0035
    let result = solve_max_sharpe(&mu, &cov, &OptimizerConfig::default()).unwrap();
    assert!(result.success, "{}", result.message);
    assert_abs_diff_eq!(result.weights[0], 0.5, epsilon = 1e-5);
    assert_abs_diff_eq!(result.weights[1], 0.5, epsilon = 1e-5);
    assert_feasible(&result.weights, 0.0, 1.0);

    let perf = result.performance(&mu, &cov, 0.0).unwrap();
    assert_abs_diff_eq!(result.objective_value, -perf.sharpe, epsilon = 1e-12);

    // at rf = 0.02 it is (0.0054, 0.0064) / 0.0035, tilting toward asset 2
    let config = OptimizerConfig::default().with_risk_free_rate(0.02);
    let result = solve_max_sharpe(&mu, &cov, &config).unwrap();
    assert!(result.success, "{}", result.message);
    assert_abs_diff_eq!(result.weights[0], 54.0 / 118.0, epsilon = 1e-5);
    assert_abs_diff_eq!(result.weights[1], 64.0 / 118.0, epsilon = 1e-5);
    assert!(result.weights[1] > result.weights[0]);
  }

  #[test]
  fn optimal_portfolios_beat_equal_weights() {
    let (mu, cov) = five_assets();
    let equal = Array1::from_elem(5, 0.2);
    let equal_perf = evaluate_performance(equal.view(), mu.view(), cov.view(), 0.02).unwrap();

    for cap in [0.2, 0.3, 0.5, 1.0] {
      let config = OptimizerConfig::default()
        .with_risk_free_rate(0.02)
        .with_weight_cap(cap);

      let sharpe = solve_max_sharpe(&mu, &cov, &config).unwrap();
      assert!(sharpe.success, "cap {cap}: {}", sharpe.message);
      assert_feasible(&sharpe.weights, 0.0, cap);
      let perf = sharpe.performance(&mu, &cov, 0.02).unwrap();
      assert!(perf.sharpe >= equal_perf.sharpe - 1e-9);

      let min_vol = solve_min_volatility(&mu, &cov, &config).unwrap();
      assert!(min_vol.success, "cap {cap}: {}", min_vol.message);
      assert_feasible(&min_vol.weights, 0.0, cap);
      assert!(
        portfolio_volatility(min_vol.weights.view(), cov.view()) <= equal_perf.volatility + 1e-9
      );
    }
  }

  #[test]
  fn weight_cap_binds() {
    let (mu, cov) = five_assets();
    let config = OptimizerConfig::default()
      .with_risk_free_rate(0.02)
      .with_weight_cap(0.3);

    let result = solve_max_sharpe(&mu, &cov, &config).unwrap();

    assert!(result.success, "{}", result.message);
    assert!(result.weights.iter().all(|&w| w <= 0.3 + 1e-6));
    assert!(result.weights.iter().any(|&w| (w - 0.3).abs() < 1e-4));
  }

  #[test]
  fn shorting_allows_negative_weights() {
    // asset 2 is a noisy copy of asset 0 with lower return: short it
    let mu = array![0.12, 0.10, 0.02];
    let cov = array![
      [0.04, 0.01, 0.038],
      [0.01, 0.09, 0.01],
      [0.038, 0.01, 0.04]
    ];
    let long_short = OptimizerConfig::default().with_no_shorting(false);

    let result = solve_max_sharpe(&mu, &cov, &long_short).unwrap();
    assert!(result.success, "{}", result.message);
    assert_feasible(&result.weights, -1.0, 1.0);
    assert!(result.weights[2] < 0.0);

    let long_only = solve_max_sharpe(&mu, &cov, &OptimizerConfig::default()).unwrap();
    let ls = result.performance(&mu, &cov, 0.0).unwrap();
    let lo = long_only.performance(&mu, &cov, 0.0).unwrap();
    assert!(ls.sharpe >= lo.sharpe - 1e-9);
  }

  #[test]
  #[traced_test]
  fn infeasible_cap_is_reported_not_thrown() {
    let mu = array![0.1, 0.12, 0.08];
    let cov = array![[0.04, 0.0, 0.0], [0.0, 0.05, 0.0], [0.0, 0.0, 0.03]];
    let config = OptimizerConfig::default().with_weight_cap(0.2);

    let sharpe = solve_max_sharpe(&mu, &cov, &config).unwrap();
    let min_vol = solve_min_volatility(&mu, &cov, &config).unwrap();

    assert!(!sharpe.success);
    assert!(!min_vol.success);
    assert!(sharpe.message.contains("infeasible"));
    assert!(logs_contain("constraints are infeasible"));
  }

  #[test]
  fn invalid_inputs_are_rejected_before_solving() {
    let (mu, cov) = two_assets();
    let config = OptimizerConfig::default();

    assert!(matches!(
      solve_max_sharpe(&Array1::zeros(0), &Array2::zeros((0, 0)), &config),
      Err(PortfolioError::EmptyUniverse)
    ));
    assert!(matches!(
      solve_min_volatility(&array![0.1, 0.2, 0.3], &cov, &config),
      Err(PortfolioError::DimensionMismatch { .. })
    ));
    assert!(matches!(
      solve_min_volatility(&array![f64::NAN, 0.2], &cov, &config),
      Err(PortfolioError::NonFiniteInput(_))
    ));
    assert!(matches!(
      solve_max_sharpe(&mu, &cov, &config.clone().with_weight_cap(-0.5)),
      Err(PortfolioError::InvalidConfig(_))
    ));
  }

  #[test]
  fn zero_variance_asset_is_flagged_not_infinite() {
    // a riskless asset with positive excess return sends the Sharpe ratio to infinity
    let mu = array![0.05, 0.10];
    let cov = array![[0.0, 0.0], [0.0, 0.04]];

    let result = solve_max_sharpe(&mu, &cov, &OptimizerConfig::default()).unwrap();

    assert!(!result.success);
    assert!(result.iterations > 0);
    // progress toward the riskless asset survives the degenerate trial points
    assert!(result.weights[0] > 0.9, "{:?}", result.weights);
    assert_feasible(&result.weights, 0.0, 1.0);
    assert!(result.objective_value.is_finite());
    assert!(result.objective_value < -0.75);
  }

  #[test]
  fn min_volatility_finds_a_perfect_hedge() {
    let mu = array![0.08, 0.06];
    let cov = array![[0.04, -0.04], [-0.04, 0.04]];

    let result = solve_min_volatility(&mu, &cov, &OptimizerConfig::default()).unwrap();

    assert!(result.success, "{}", result.message);
    assert_abs_diff_eq!(result.weights[0], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(result.weights[1], 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(result.objective_value, 0.0, epsilon = 1e-12);
  }

  #[test]
  fn min_volatility_moves_into_a_riskless_asset() {
    let mu = array![0.05, 0.10];
    let cov = array![[0.0, 0.0], [0.0, 0.04]];

    let result = solve_min_volatility(&mu, &cov, &OptimizerConfig::default()).unwrap();

    assert!(result.success, "{}", result.message);
    assert!(result.iterations > 0);
    assert_abs_diff_eq!(result.weights[0], 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.weights[1], 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(result.objective_value, 0.0, epsilon = 1e-9);
  }

  #[test]
  fn max_sharpe_stops_at_the_optimum_with_default_tolerance() {
    // one low-return asset, a cap and a small risk-free rate
    let mu = array![0.2847, 0.2276, 0.2009, 0.01];
    let loadings = array![
      [0.21, -0.12, 0.05, 0.27],
      [0.18, 0.25, -0.09, -0.14],
      [-0.22, 0.08, 0.19, 0.11],
      [0.04, -0.17, -0.26, 0.06]
    ];
    let mut cov = loadings.dot(&loadings.t());
    for (i, idio) in [0.021, 0.034, 0.015, 0.042].iter().enumerate() {
      cov[[i, i]] += *idio;
    }
    let config = OptimizerConfig::default()
      .with_weight_cap(0.6195)
      .with_risk_free_rate(0.004584);

    let result = solve_max_sharpe(&mu, &cov, &config).unwrap();

    assert!(result.success, "{}", result.message);
    assert!(result.iterations < config.max_iters, "took {} iterations", result.iterations);
    assert_feasible(&result.weights, 0.0, 0.6195);

    let equal = Array1::from_elem(4, 0.25);
    let equal_perf = evaluate_performance(equal.view(), mu.view(), cov.view(), 0.004584).unwrap();
    let perf = result.performance(&mu, &cov, 0.004584).unwrap();
    assert!(perf.sharpe >= equal_perf.sharpe - 1e-9);
  }

  #[test]
  fn iteration_cap_surfaces_as_failure() {
    let (mu, cov) = five_assets();
    let config = OptimizerConfig::default().with_max_iters(1).with_tolerance(1e-300);

    let result = solve_max_sharpe(&mu, &cov, &config).unwrap();

    assert!(!result.success);
    assert!(result.weights.iter().all(|w| w.is_finite()));
  }

  #[test]
  fn custom_solver_is_used() {
    struct EqualWeights;

    impl ConstrainedMinimizer for EqualWeights {
      fn minimize<O>(
        &self,
        objective: O,
        initial_guess: &Array1<f64>,
        _bounds: &Bounds,
        _equality: &LinearEquality,
      ) -> SolverOutcome
      where
        O: CostFunction<Param = Vec<f64>, Output = f64>
          + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
      {
        SolverOutcome {
          solution: initial_guess.clone(),
          success: true,
          objective_value: objective.cost(&initial_guess.to_vec()).unwrap(),
          iterations: 0,
          message: "equal weights".into(),
        }
      }
    }

    let (mu, cov) = two_assets();
    let result =
      solve_min_volatility_with(&EqualWeights, &mu, &cov, &OptimizerConfig::default()).unwrap();

    assert!(result.success);
    assert_eq!(result.message, "equal weights");
    assert_abs_diff_eq!(result.weights[0], 0.5);
    assert_abs_diff_eq!(result.objective_value, 0.0375_f64.sqrt(), epsilon = 1e-12);
  }
}
