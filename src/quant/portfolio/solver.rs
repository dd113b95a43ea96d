//! # Constrained Solver
//!
//! $$
//! \mathbf{w}_{k+1}=\Pi_{\mathcal C}\big(\mathbf{w}_k-\alpha_k\nabla f(\mathbf{w}_k)\big),\qquad
//! \mathcal C=\{\mathbf{w}:\ \mathbf{a}^\top\mathbf{w}=b,\ l\le\mathbf{w}\le u\}
//! $$
//!
//! Box bounds, one linear equality constraint and a projected-gradient
//! minimizer driven by argmin's [`Executor`].
//!
//! The Euclidean projection onto `C` has the closed form
//! `w_i(lambda) = clamp(y_i - lambda * a_i, l_i, u_i)`, where the scalar
//! `lambda` is the root of the non-increasing function `a . w(lambda) - b` and
//! is found by bisection.

use argmin::core::CostFunction;
use argmin::core::Error;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::IterState;
use argmin::core::Problem;
use argmin::core::Solver;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::core::KV;
use ndarray::Array1;
use ndarray::ArrayView1;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::types::OptimizerConfig;
use crate::error::PortfolioError;
use crate::error::Result;

const MAX_BISECTION_STEPS: usize = 200;
const FEASIBILITY_SLACK: f64 = 1e-12;

/// Per-variable box constraint `lower_i <= w_i <= upper_i`.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
  lower: Array1<f64>,
  upper: Array1<f64>,
}

impl Bounds {
  pub fn new(lower: Array1<f64>, upper: Array1<f64>) -> Result<Self> {
    if lower.len() != upper.len() {
      return Err(PortfolioError::DimensionMismatch {
        context: "upper bounds",
        expected: lower.len(),
        got: upper.len(),
      });
    }
    if lower.iter().chain(upper.iter()).any(|v| !v.is_finite()) {
      return Err(PortfolioError::NonFiniteInput("bounds"));
    }
    if lower.iter().zip(upper.iter()).any(|(l, u)| l > u) {
      return Err(PortfolioError::InvalidConfig(
        "lower bound exceeds upper bound".into(),
      ));
    }

    Ok(Self { lower, upper })
  }

  /// Same `[lower, upper]` interval for all `n` variables.
  pub fn uniform(n: usize, lower: f64, upper: f64) -> Result<Self> {
    Self::new(Array1::from_elem(n, lower), Array1::from_elem(n, upper))
  }

  pub fn len(&self) -> usize {
    self.lower.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lower.is_empty()
  }

  pub fn lower(&self) -> &Array1<f64> {
    &self.lower
  }

  pub fn upper(&self) -> &Array1<f64> {
    &self.upper
  }

  /// Every component lies within its interval, up to `tol`.
  pub fn contains(&self, x: ArrayView1<f64>, tol: f64) -> bool {
    x.len() == self.len()
      && x
        .iter()
        .zip(self.lower.iter().zip(self.upper.iter()))
        .all(|(v, (l, u))| *v >= l - tol && *v <= u + tol)
  }
}

/// Linear equality constraint `a . w = b`.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearEquality {
  coefficients: Array1<f64>,
  target: f64,
}

impl LinearEquality {
  pub fn new(coefficients: Array1<f64>, target: f64) -> Result<Self> {
    if !target.is_finite() || coefficients.iter().any(|a| !a.is_finite()) {
      return Err(PortfolioError::NonFiniteInput("equality constraint"));
    }
    if coefficients.iter().all(|a| *a == 0.0) {
      return Err(PortfolioError::InvalidConfig(
        "equality constraint has no non-zero coefficient".into(),
      ));
    }

    Ok(Self {
      coefficients,
      target,
    })
  }

  /// Full-investment budget `sum(w) = 1`.
  pub fn budget(n: usize) -> Self {
    Self {
      coefficients: Array1::ones(n),
      target: 1.0,
    }
  }

  pub fn coefficients(&self) -> &Array1<f64> {
    &self.coefficients
  }

  pub fn target(&self) -> f64 {
    self.target
  }

  /// `g(w) = a . w - b`
  pub fn residual(&self, x: ArrayView1<f64>) -> f64 {
    self.coefficients.dot(&x) - self.target
  }

  /// Range of `a . w` over the box.
  pub fn attainable_range(&self, bounds: &Bounds) -> (f64, f64) {
    let mut lo = 0.0;
    let mut hi = 0.0;
    for ((a, l), u) in self
      .coefficients
      .iter()
      .zip(bounds.lower.iter())
      .zip(bounds.upper.iter())
    {
      lo += (a * l).min(a * u);
      hi += (a * l).max(a * u);
    }
    (lo, hi)
  }

  /// The constraint set `{a . w = b} ∩ box` is non-empty.
  pub fn is_satisfiable(&self, bounds: &Bounds) -> bool {
    if bounds.len() != self.coefficients.len() {
      return false;
    }
    let (lo, hi) = self.attainable_range(bounds);
    let slack = FEASIBILITY_SLACK * (1.0 + self.target.abs());
    lo <= self.target + slack && self.target <= hi + slack
  }

  fn clamped_at(&self, y: ArrayView1<f64>, bounds: &Bounds, lambda: f64) -> Array1<f64> {
    ndarray::Zip::from(&y)
      .and(&self.coefficients)
      .and(&bounds.lower)
      .and(&bounds.upper)
      .map_collect(|&yi, &ai, &li, &ui| (yi - lambda * ai).clamp(li, ui))
  }

  fn residual_at(&self, y: ArrayView1<f64>, bounds: &Bounds, lambda: f64) -> f64 {
    let mut acc = 0.0;
    for (((yi, ai), li), ui) in y
      .iter()
      .zip(self.coefficients.iter())
      .zip(bounds.lower.iter())
      .zip(bounds.upper.iter())
    {
      acc += ai * (yi - lambda * ai).clamp(*li, *ui);
    }
    acc - self.target
  }

  /// Euclidean projection of `y` onto `{a . w = b} ∩ box`.
  ///
  /// When the set is empty the result is the box point closest to satisfying
  /// the equality.
  pub fn project(&self, y: ArrayView1<f64>, bounds: &Bounds) -> Array1<f64> {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for (((yi, ai), li), ui) in y
      .iter()
      .zip(self.coefficients.iter())
      .zip(bounds.lower.iter())
      .zip(bounds.upper.iter())
    {
      if *ai == 0.0 {
        continue;
      }
      let t_upper = (yi - ui) / ai;
      let t_lower = (yi - li) / ai;
      lo = lo.min(t_upper.min(t_lower));
      hi = hi.max(t_upper.max(t_lower));
    }
    if !lo.is_finite() || !hi.is_finite() {
      return self.clamped_at(y, bounds, 0.0);
    }

    // residual_at(lo) >= 0 >= residual_at(hi) whenever the set is non-empty
    for _ in 0..MAX_BISECTION_STEPS {
      let mid = 0.5 * (lo + hi);
      if self.residual_at(y, bounds, mid) > 0.0 {
        lo = mid;
      } else {
        hi = mid;
      }
      if hi - lo <= f64::EPSILON * (1.0 + mid.abs()) {
        break;
      }
    }

    self.clamped_at(y, bounds, 0.5 * (lo + hi))
  }
}

/// Outcome of a constrained minimization.
#[derive(Clone, Debug)]
pub struct SolverOutcome {
  /// Optimal or best-found point.
  pub solution: Array1<f64>,
  /// The solver reported convergence.
  pub success: bool,
  /// Objective value at `solution` (`NaN` when it could not be evaluated).
  pub objective_value: f64,
  /// Iterations performed.
  pub iterations: u64,
  /// Human readable termination diagnostic.
  pub message: String,
}

/// A nonlinear solver for one linear equality constraint plus box bounds.
pub trait ConstrainedMinimizer {
  fn minimize<O>(
    &self,
    objective: O,
    initial_guess: &Array1<f64>,
    bounds: &Bounds,
    equality: &LinearEquality,
  ) -> SolverOutcome
  where
    O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>;
}

/// Projected gradient descent with Barzilai-Borwein steps and Armijo
/// backtracking.
#[derive(Clone, Debug)]
pub struct ProjectedGradient {
  /// Iteration cap.
  pub max_iters: u64,
  /// Stationarity tolerance on `||w - P(w - grad f(w))||_inf`.
  pub tolerance: f64,
  /// Stationarity accepted as converged once the line search can no longer
  /// make progress in floating point, or accepted steps only shave round-off
  /// off the objective.
  pub stall_tolerance: f64,
}

impl Default for ProjectedGradient {
  fn default() -> Self {
    Self {
      max_iters: 5000,
      tolerance: 1e-9,
      stall_tolerance: 1e-6,
    }
  }
}

impl From<&OptimizerConfig> for ProjectedGradient {
  fn from(config: &OptimizerConfig) -> Self {
    Self {
      max_iters: config.max_iters,
      tolerance: config.tolerance,
      stall_tolerance: config.tolerance.max(1e-6),
    }
  }
}

impl ConstrainedMinimizer for ProjectedGradient {
  fn minimize<O>(
    &self,
    objective: O,
    initial_guess: &Array1<f64>,
    bounds: &Bounds,
    equality: &LinearEquality,
  ) -> SolverOutcome
  where
    O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
  {
    if bounds.len() != initial_guess.len() || !equality.is_satisfiable(bounds) {
      let (lo, hi) = equality.attainable_range(bounds);
      warn!(
        budget = equality.target(),
        attainable_min = lo,
        attainable_max = hi,
        "constraints are infeasible, solver not started"
      );
      return SolverOutcome {
        solution: initial_guess.clone(),
        success: false,
        objective_value: objective.cost(&initial_guess.to_vec()).unwrap_or(f64::NAN),
        iterations: 0,
        message: format!(
          "infeasible constraints: equality target {} is outside the attainable range [{lo}, {hi}]",
          equality.target()
        ),
      };
    }

    let start = equality.project(initial_guess.view(), bounds);
    let solver = ProjectedGradientSolver::new(
      bounds.clone(),
      equality.clone(),
      self.tolerance,
      self.stall_tolerance,
    );

    let run = Executor::new(objective, solver)
      .configure(|state| state.param(start.to_vec()).max_iters(self.max_iters))
      .run();

    match run {
      Ok(res) => {
        let state = res.state();
        let (solution, objective_value) = match state.get_best_param() {
          Some(best) => (Array1::from_vec(best.clone()), state.get_best_cost()),
          None => (
            state
              .get_param()
              .map(|p| Array1::from_vec(p.clone()))
              .unwrap_or(start),
            state.get_cost(),
          ),
        };
        let iterations = state.get_iter();
        let (success, message) = match state.get_termination_reason() {
          Some(TerminationReason::SolverConverged) => {
            (true, "optimization terminated successfully".to_string())
          }
          Some(TerminationReason::MaxItersReached) => (
            false,
            format!("iteration limit of {} reached", self.max_iters),
          ),
          Some(TerminationReason::SolverExit(reason)) => (false, reason.clone()),
          Some(other) => (false, format!("solver terminated: {other:?}")),
          None => (false, "solver did not report a termination reason".to_string()),
        };
        debug!(iterations, success, "projected gradient finished");

        SolverOutcome {
          solution,
          success,
          objective_value,
          iterations,
          message,
        }
      }
      Err(err) => {
        warn!(error = %err, "projected gradient aborted");
        SolverOutcome {
          solution: start,
          success: false,
          objective_value: f64::NAN,
          iterations: 0,
          message: format!("solver aborted: {err}"),
        }
      }
    }
  }
}

type PgState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

/// argmin solver state for [`ProjectedGradient`].
#[derive(Clone, Debug)]
struct ProjectedGradientSolver {
  bounds: Bounds,
  equality: LinearEquality,
  tolerance: f64,
  stall_tolerance: f64,
  /// Armijo sufficient decrease constant.
  armijo: f64,
  /// Backtracking factor.
  shrink: f64,
  min_step: f64,
  /// Safeguard interval for the Barzilai-Borwein trial step.
  spectral_bounds: (f64, f64),
  step: f64,
  stationarity: f64,
  stalled: bool,
  /// Consecutive accepted steps lowering the cost by at most
  /// `flat_tolerance * (1 + |f|)`.
  flat_steps: usize,
  flat_tolerance: f64,
  flat_patience: usize,
  /// Accepted steps inside the stall tolerance without a new best stationarity.
  idle_steps: usize,
  idle_patience: usize,
  best_stationarity: f64,
  /// Last objective error seen on a rejected trial point.
  rejected: Option<String>,
  failure: Option<String>,
}

impl ProjectedGradientSolver {
  fn new(bounds: Bounds, equality: LinearEquality, tolerance: f64, stall_tolerance: f64) -> Self {
    Self {
      bounds,
      equality,
      tolerance,
      stall_tolerance,
      armijo: 1e-4,
      shrink: 0.5,
      min_step: 1e-16,
      spectral_bounds: (1e-10, 1e6),
      step: 1.0,
      stationarity: f64::INFINITY,
      stalled: false,
      flat_steps: 0,
      flat_tolerance: 10.0 * f64::EPSILON,
      flat_patience: 3,
      idle_steps: 0,
      idle_patience: 50,
      best_stationarity: f64::INFINITY,
      rejected: None,
      failure: None,
    }
  }

  fn project(&self, y: &[f64]) -> Vec<f64> {
    self
      .equality
      .project(ArrayView1::from(y), &self.bounds)
      .to_vec()
  }

  /// `||x - P(x - g)||_inf`, zero exactly at a KKT point.
  fn stationarity_of(&self, x: &[f64], grad: &[f64]) -> f64 {
    let shifted: Vec<f64> = x.iter().zip(grad).map(|(xi, gi)| xi - gi).collect();
    self
      .project(&shifted)
      .iter()
      .zip(x)
      .map(|(p, xi)| (p - xi).abs())
      .fold(0.0, f64::max)
  }

  /// Marks the run as stalled once accepted steps stop making progress, so
  /// the stall tolerance decides between convergence and failure.
  fn record_progress(&mut self, previous_cost: f64, cost: f64, stationarity: f64) {
    if previous_cost - cost <= self.flat_tolerance * (1.0 + previous_cost.abs()) {
      self.flat_steps += 1;
    } else {
      self.flat_steps = 0;
    }

    if stationarity < self.best_stationarity {
      self.best_stationarity = stationarity;
      self.idle_steps = 0;
    } else if stationarity <= self.stall_tolerance {
      self.idle_steps += 1;
    }

    if self.flat_steps >= self.flat_patience || self.idle_steps >= self.idle_patience {
      debug!(
        stationarity,
        flat_steps = self.flat_steps,
        idle_steps = self.idle_steps,
        "projected gradient stopped making progress"
      );
      self.stalled = true;
    }
  }
}

impl<O> Solver<O, PgState> for ProjectedGradientSolver
where
  O: CostFunction<Param = Vec<f64>, Output = f64> + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>,
{
  const NAME: &'static str = "Projected gradient";

  fn init(
    &mut self,
    problem: &mut Problem<O>,
    mut state: PgState,
  ) -> std::result::Result<(PgState, Option<KV>), Error> {
    let x0 = state
      .take_param()
      .ok_or_else(|| anyhow::anyhow!("projected gradient requires an initial guess"))?;
    let x0 = self.project(&x0);
    let cost = problem.cost(&x0)?;
    let grad = problem.gradient(&x0)?;
    self.stationarity = self.stationarity_of(&x0, &grad);
    self.best_stationarity = self.stationarity;

    Ok((state.param(x0).cost(cost).gradient(grad), None))
  }

  fn next_iter(
    &mut self,
    problem: &mut Problem<O>,
    mut state: PgState,
  ) -> std::result::Result<(PgState, Option<KV>), Error> {
    let x = state
      .take_param()
      .ok_or_else(|| anyhow::anyhow!("projected gradient lost its iterate"))?;
    let grad = state
      .take_gradient()
      .ok_or_else(|| anyhow::anyhow!("projected gradient lost its gradient"))?;
    let cost = state.get_cost();

    if self.stationarity <= self.tolerance {
      return Ok((state.param(x).gradient(grad), None));
    }

    let (lo, hi) = self.spectral_bounds;
    let mut step = self.step.clamp(lo, hi);
    loop {
      let trial: Vec<f64> = x.iter().zip(&grad).map(|(xi, gi)| xi - step * gi).collect();
      let candidate = self.project(&trial);

      let moved = candidate
        .iter()
        .zip(&x)
        .map(|(c, xi)| (c - xi).abs())
        .fold(0.0, f64::max);
      if moved == 0.0 || step < self.min_step {
        self.stalled = true;
        return Ok((state.param(x).gradient(grad), None));
      }

      // g . (x+ - x) < 0 for any non-stationary x
      let decrease: f64 = grad
        .iter()
        .zip(candidate.iter().zip(&x))
        .map(|(g, (c, xi))| g * (c - xi))
        .sum();
      let candidate_cost = match problem.cost(&candidate) {
        Ok(value) => value,
        Err(err) => {
          trace!(step, error = %err, "trial point rejected");
          self.rejected = Some(err.to_string());
          step *= self.shrink;
          continue;
        }
      };

      if candidate_cost <= cost + self.armijo * decrease {
        let candidate_grad = match problem.gradient(&candidate) {
          Ok(value) => value,
          Err(err) => {
            self.failure = Some(format!("gradient evaluation failed: {err}"));
            return Ok((state.param(x).gradient(grad), None));
          }
        };
        // Barzilai-Borwein step s's / s'y for the next iteration
        let (ss, sy) = candidate
          .iter()
          .zip(&x)
          .zip(candidate_grad.iter().zip(&grad))
          .fold((0.0, 0.0), |(ss, sy), ((c, xi), (gc, gi))| {
            let s = c - xi;
            (ss + s * s, sy + s * (gc - gi))
          });
        self.step = if sy > 0.0 { ss / sy } else { step * 2.0 };
        self.stationarity = self.stationarity_of(&candidate, &candidate_grad);
        self.record_progress(cost, candidate_cost, self.stationarity);
        return Ok((
          state
            .param(candidate)
            .cost(candidate_cost)
            .gradient(candidate_grad),
          None,
        ));
      }

      step *= self.shrink;
    }
  }

  fn terminate(&mut self, _state: &PgState) -> TerminationStatus {
    if let Some(reason) = &self.failure {
      return TerminationStatus::Terminated(TerminationReason::SolverExit(reason.clone()));
    }
    if self.stationarity <= self.tolerance {
      return TerminationStatus::Terminated(TerminationReason::SolverConverged);
    }
    if self.stalled {
      return if self.stationarity <= self.stall_tolerance {
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
      } else {
        let mut reason = format!(
          "line search stalled with projected gradient norm {:e}",
          self.stationarity
        );
        if let Some(err) = &self.rejected {
          reason.push_str(&format!(", last rejected trial: {err}"));
        }
        TerminationStatus::Terminated(TerminationReason::SolverExit(reason))
      };
    }
    TerminationStatus::NotTerminated
  }
}
