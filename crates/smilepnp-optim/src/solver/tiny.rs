//! Thin wrapper around tiny-solver for consistent option handling.
//!
//! tiny-solver's own loop stops as soon as the error change falls under the
//! decrease thresholds, and a rejected step changes the error by exactly
//! zero. [`solve`] therefore drives the optimizer one Levenberg–Marquardt
//! step at a time and owns the damping: a rejected step only raises the
//! damping, and the decrease thresholds are checked on accepted steps only.

use anyhow::{anyhow, Result};
use nalgebra::DVector;
use std::collections::HashMap;
use tiny_solver::linear::sparse::LinearSolverType;
use tiny_solver::optimizer::{Optimizer, OptimizerOptions};
use tiny_solver::problem::Problem;
use tiny_solver::LevenbergMarquardtOptimizer;

const MIN_DIAGONAL: f64 = 1e-6;
const MAX_DIAGONAL: f64 = 1e32;
/// Trust region radius of the first step (damping `1 / radius`).
const INITIAL_RADIUS: f64 = 1e4;
const MAX_RADIUS: f64 = 1e16;
/// Below this radius a rejected step means the gradient vanished.
const MIN_RADIUS: f64 = 1e-6;

/// Levenberg–Marquardt settings.
///
/// `None` keeps tiny-solver's own default for that threshold. The decrease
/// thresholds apply to accepted steps; `min_error` compares against `Σ r²`.
#[derive(Clone)]
pub struct TinySolveOptions {
    pub max_iters: usize,
    pub verbosity: usize,
    pub linear_solver: Option<LinearSolverType>,
    pub min_abs_decrease: Option<f64>,
    pub min_rel_decrease: Option<f64>,
    pub min_error: Option<f64>,
}

impl Default for TinySolveOptions {
    fn default() -> Self {
        let defaults = OptimizerOptions::default();
        Self {
            max_iters: defaults.max_iteration,
            verbosity: defaults.verbosity_level,
            linear_solver: Some(defaults.linear_solver_type),
            min_abs_decrease: Some(defaults.min_abs_error_decrease_threshold),
            min_rel_decrease: Some(defaults.min_rel_error_decrease_threshold),
            min_error: Some(defaults.min_error_threshold),
        }
    }
}

impl std::fmt::Debug for TinySolveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TinySolveOptions")
            .field("max_iters", &self.max_iters)
            .field("verbosity", &self.verbosity)
            .field("min_abs_decrease", &self.min_abs_decrease)
            .field("min_rel_decrease", &self.min_rel_decrease)
            .field("min_error", &self.min_error)
            .finish_non_exhaustive()
    }
}

impl TinySolveOptions {
    /// Tight stopping thresholds for problems that should reach
    /// sub-micropixel residuals on exact data.
    pub fn precise(max_iters: usize) -> Self {
        Self {
            max_iters,
            min_abs_decrease: Some(1e-14),
            min_rel_decrease: Some(1e-14),
            min_error: Some(1e-20),
            ..Self::default()
        }
    }

    /// Options for a single tiny-solver iteration; stopping is decided here.
    fn single_step_options(&self) -> OptimizerOptions {
        let mut opts = OptimizerOptions::default();
        opts.max_iteration = 1;
        opts.verbosity_level = self.verbosity;
        if let Some(solver) = self.linear_solver.clone() {
            opts.linear_solver_type = solver;
        }
        opts
    }

    fn stop_on_decrease(&self, previous: f64, current: f64) -> bool {
        let decrease = previous - current;
        self.min_abs_decrease.is_some_and(|t| decrease < t)
            || self.min_rel_decrease.is_some_and(|t| decrease / previous < t)
    }
}

/// Why [`solve`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `Σ r²` fell to `min_error`.
    MinError,
    /// An accepted step lowered the cost by less than the thresholds.
    SmallDecrease,
    /// Damping grew until no step could lower the cost.
    Stationary,
    MaxIterations,
}

/// Solution of one [`solve`] call.
#[derive(Debug, Clone)]
pub struct TinySolution {
    pub params: HashMap<String, DVector<f64>>,
    /// `0.5 * Σ r²` at the initial values.
    pub initial_cost: f64,
    /// `0.5 * Σ r²` at `params`.
    pub final_cost: f64,
    pub iterations: usize,
    /// Steps that lowered the cost.
    pub accepted_steps: usize,
    /// Steps whose linear solve failed or whose cost was not finite.
    pub failed_steps: usize,
    pub stop: StopReason,
}

impl TinySolution {
    /// No step was accepted before the budget ran out, or every attempted
    /// step failed.
    ///
    /// A run that only rejected steps until [`StopReason::Stationary`]
    /// started at a minimum and is not stalled.
    pub fn stalled(&self) -> bool {
        self.accepted_steps == 0
            && (self.stop == StopReason::MaxIterations
                || (self.iterations > 0 && self.failed_steps == self.iterations))
    }
}

/// Solve a tiny-solver problem with the given initial values and options.
pub fn solve(
    problem: &Problem,
    initial: HashMap<String, DVector<f64>>,
    opts: &TinySolveOptions,
) -> Result<TinySolution> {
    let step_opts = opts.single_step_options();
    let min_error = opts.min_error.unwrap_or(0.0);

    let initial_cost = final_cost(problem, &initial);
    if !initial_cost.is_finite() {
        return Err(anyhow!("initial cost is not finite"));
    }
    let mut params = initial;
    let mut cost = initial_cost;
    let mut radius = INITIAL_RADIUS;
    let mut iterations = 0;
    let mut accepted_steps = 0;
    let mut failed_steps = 0;

    let stop = loop {
        if 2.0 * cost <= min_error {
            break StopReason::MinError;
        }
        if radius < MIN_RADIUS {
            break StopReason::Stationary;
        }
        if iterations >= opts.max_iters {
            break StopReason::MaxIterations;
        }
        iterations += 1;

        let optimizer = LevenbergMarquardtOptimizer::new(MIN_DIAGONAL, MAX_DIAGONAL, radius);
        let candidate = optimizer
            .optimize(problem, &params, Some(step_opts.clone()))
            .map(|p| {
                let c = final_cost(problem, &p);
                (p, c)
            })
            .filter(|(_, c)| c.is_finite());

        match candidate {
            Some((next, next_cost)) if next_cost < cost => {
                let previous = cost;
                params = next;
                cost = next_cost;
                accepted_steps += 1;
                radius = (radius * 3.0).min(MAX_RADIUS);
                if opts.stop_on_decrease(previous, cost) {
                    break StopReason::SmallDecrease;
                }
            }
            Some(_) => radius *= 0.5,
            None => {
                failed_steps += 1;
                radius *= 0.5;
            }
        }
    };
    log::trace!(
        "LM stopped ({stop:?}) after {iterations} iterations, {accepted_steps} accepted, \
         cost {initial_cost:.3e} -> {cost:.3e}"
    );

    Ok(TinySolution {
        params,
        initial_cost,
        final_cost: cost,
        iterations,
        accepted_steps,
        failed_steps,
        stop,
    })
}

/// `0.5 * Σ r²` over every residual block at `solution`.
pub fn final_cost(problem: &Problem, solution: &HashMap<String, DVector<f64>>) -> f64 {
    let blocks = problem.initialize_parameter_blocks(solution);
    let residuals = problem.compute_residuals(&blocks, true);
    0.5 * residuals.as_ref().squared_norm_l2()
}
