//! # Efficient Frontier Sampling
//!
//! $$
//! \mathbf{w}=\frac{\mathbf{u}}{\mathbf{1}^\top\mathbf{u}},\ \ u_i\sim\mathcal U[0,1),\qquad
//! \text{CML}:\ y=r_f+S^\*\,x
//! $$
//!
//! Monte Carlo cloud of random long-only portfolios and the capital market line.

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Uniform;
use rayon::prelude::*;
use tracing::debug;

use super::performance::check_dimensions;
use super::performance::evaluate_performance;
use super::types::PortfolioPerformance;
use crate::error::Result;

/// Random portfolio sampler.
#[derive(ImplNew, Clone, Debug)]
pub struct FrontierSampler {
  /// Number of random portfolios.
  pub num_portfolios: usize,
  /// Seed for reproducible clouds; entropy when `None`.
  pub seed: Option<u64>,
}

/// Sampled portfolios, index-aligned.
#[derive(Clone, Debug, Default)]
pub struct FrontierSamples {
  pub returns: Vec<f64>,
  pub volatilities: Vec<f64>,
  pub sharpes: Vec<f64>,
  pub weights: Vec<Array1<f64>>,
}

impl FrontierSamples {
  pub fn len(&self) -> usize {
    self.returns.len()
  }

  pub fn is_empty(&self) -> bool {
    self.returns.is_empty()
  }

  /// Index of the sample with the highest Sharpe ratio.
  pub fn best_sharpe(&self) -> Option<usize> {
    self
      .sharpes
      .iter()
      .enumerate()
      .max_by(|a, b| a.1.total_cmp(b.1))
      .map(|(i, _)| i)
  }
}

impl FrontierSampler {
  /// Draw `num_portfolios` normalized uniform weight vectors and evaluate them.
  ///
  /// Every sample gets its own generator seeded from the base seed, so the
  /// cloud is identical for a given seed regardless of thread scheduling.
  pub fn sample(
    &self,
    mean_returns: &Array1<f64>,
    cov_matrix: &Array2<f64>,
    risk_free_rate: f64,
  ) -> Result<FrontierSamples> {
    let n = check_dimensions(mean_returns.len(), mean_returns.view(), cov_matrix.view())?;
    let base_seed = self.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let unit = Uniform::new(0.0, 1.0);

    let draws: Vec<(Array1<f64>, PortfolioPerformance)> = (0..self.num_portfolios)
      .into_par_iter()
      .map(|k| {
        let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(k as u64));
        let raw = Array1::random_using(n, unit, &mut rng);
        let total = raw.sum();
        let weights = if total > 0.0 {
          raw / total
        } else {
          Array1::from_elem(n, 1.0 / n as f64)
        };
        let perf = evaluate_performance(
          weights.view(),
          mean_returns.view(),
          cov_matrix.view(),
          risk_free_rate,
        )?;
        Ok((weights, perf))
      })
      .collect::<Result<Vec<_>>>()?;

    let mut samples = FrontierSamples {
      returns: Vec::with_capacity(draws.len()),
      volatilities: Vec::with_capacity(draws.len()),
      sharpes: Vec::with_capacity(draws.len()),
      weights: Vec::with_capacity(draws.len()),
    };
    for (weights, perf) in draws {
      samples.returns.push(perf.expected_return);
      samples.volatilities.push(perf.volatility);
      samples.sharpes.push(perf.sharpe);
      samples.weights.push(weights);
    }
    debug!(samples = samples.len(), seed = base_seed, "sampled frontier");

    Ok(samples)
  }
}

/// Points `(volatility, return)` of the capital market line through the
/// tangency portfolio, from zero risk to 1.5 times its volatility.
pub fn capital_market_line(
  tangency: &PortfolioPerformance,
  risk_free_rate: f64,
  points: usize,
) -> Vec<(f64, f64)> {
  if points == 0 {
    return Vec::new();
  }

  Array1::linspace(0.0, tangency.volatility * 1.5, points)
    .iter()
    .map(|&x| (x, risk_free_rate + tangency.sharpe * x))
    .collect()
}
