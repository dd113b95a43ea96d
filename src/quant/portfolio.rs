//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Mean-variance portfolio optimization under a full-investment budget and
//! per-asset box bounds.

pub mod data;
pub mod engine;
pub mod frontier;
pub mod objectives;
pub mod optimizers;
pub mod performance;
pub mod solver;
pub mod types;

pub use data::annualized_statistics;
pub use data::drop_missing_rows;
pub use data::simple_returns;
pub use data::AssetStatistics;
pub use data::PriceTable;
pub use data::ReturnSeries;
pub use data::TRADING_DAYS_PER_YEAR;
pub use engine::PortfolioEngine;
pub use engine::PortfolioReport;
pub use frontier::capital_market_line;
pub use frontier::FrontierSampler;
pub use frontier::FrontierSamples;
pub use objectives::NegativeSharpe;
pub use objectives::Volatility;
pub use optimizers::solve_max_sharpe;
pub use optimizers::solve_max_sharpe_with;
pub use optimizers::solve_min_volatility;
pub use optimizers::solve_min_volatility_with;
pub use optimizers::FEASIBILITY_TOLERANCE;
pub use performance::evaluate_performance;
pub use performance::portfolio_return;
pub use performance::portfolio_volatility;
pub use performance::VOLATILITY_FLOOR;
pub use solver::Bounds;
pub use solver::ConstrainedMinimizer;
pub use solver::LinearEquality;
pub use solver::ProjectedGradient;
pub use solver::SolverOutcome;
pub use types::OptimizationResult;
pub use types::OptimizerConfig;
pub use types::PortfolioObjective;
pub use types::PortfolioPerformance;
