//! # markowitz-rs
//!
//! $$
//! \min_{\mathbf{w}} f(\mathbf{w})\quad\text{s.t.}\quad \mathbf{1}^\top\mathbf{w}=1,\ \ l\le w_i\le u
//! $$
//!
//! Mean-variance portfolio optimization: annualized statistics from price
//! history, maximum Sharpe ratio and minimum volatility portfolios, Monte Carlo
//! frontier sampling and efficient-frontier charts.
//!
pub mod error;
pub mod quant;
pub mod visualization;

pub use error::PortfolioError;
pub use error::Result;
