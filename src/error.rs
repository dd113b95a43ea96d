//! # Error
//!
//! $$
//! \text{input} \to \text{Ok}(\cdot)\ \vee\ \text{Err}(\text{PortfolioError})
//! $$
//!
use thiserror::Error;

/// Error type for statistics preparation, evaluation and optimization.
///
/// Infeasible constraints and solver non-convergence are not errors: they are
/// reported through [`crate::quant::portfolio::OptimizationResult::success`].
#[derive(Debug, Error)]
pub enum PortfolioError {
  /// No assets were supplied.
  #[error("asset universe is empty")]
  EmptyUniverse,

  /// Vector or matrix dimensions disagree.
  #[error("dimension mismatch in {context}: expected {expected}, got {got}")]
  DimensionMismatch {
    context: &'static str,
    expected: usize,
    got: usize,
  },

  /// A statistic contains `NaN` or an infinity.
  #[error("non-finite value in {0}")]
  NonFiniteInput(&'static str),

  /// Optimizer or sampler configuration is unusable.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// Portfolio volatility vanished, so the Sharpe ratio is undefined.
  #[error("portfolio volatility {volatility:e} is below the floor, Sharpe ratio is undefined")]
  DegenerateVolatility { volatility: f64 },

  /// Not enough observations to estimate statistics.
  #[error("insufficient data: {0}")]
  InsufficientData(String),

  #[error("CSV error: {0}")]
  Csv(#[from] csv::Error),

  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

/// Result type for portfolio operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;
