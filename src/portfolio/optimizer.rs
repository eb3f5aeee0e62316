//! Constrained portfolio weight optimization.
//!
//! Two solvers back the four objectives:
//!
//! - `MaxSharpe`, `MinRisk` and `MaxReturn` run projected gradient descent
//!   over the bounded simplex `{Σw = 1, min ≤ w ≤ max}` with a backtracking
//!   step. Optional constraints (volatility, drawdown, diversification, group
//!   bounds, turnover) enter as quadratic penalties whose weight is raised over
//!   a few continuation rounds, and are re-checked exactly on the final point.
//! - `RiskParity` runs cyclic coordinate descent on
//!   `½ y'Σy − Σ bᵢ ln yᵢ`, whose optimum has equal risk contributions, and
//!   normalizes. If the equal-risk point lies outside the weight bounds the
//!   solve fails instead of clipping.
//!
//! A result is either feasible and converged, or an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::config::{AnalyticsConfig, MetricsConfig};
use crate::core::error::{QuantError, Result};
use crate::core::timeseries::{align, ReturnSeries};
use crate::metrics::drawdown::max_drawdown_from_returns;
use crate::metrics::portfolio::StrategyReturns;
use crate::metrics::stats::{
    covariance_matrix, historical_var_cvar, mean, quadratic_form, risk_contributions,
    std_dev, weighted_returns, VARIANCE_EPSILON,
};

/// Tolerance used when checking hard constraints on a solution.
const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Risk figure minimized by [`OptimizationObjective::MinRisk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMeasure {
    Volatility,
    ValueAtRisk,
    ConditionalVar,
    MaxDrawdown,
}

/// What the optimizer solves for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationObjective {
    MaxSharpe,
    MinRisk(RiskMeasure),
    MaxReturn,
    RiskParity,
}

/// Bounds on the summed weight of a named group of strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupBound {
    /// Sector or asset-class name.
    pub name: String,
    /// Strategy ids in the group.
    pub members: Vec<String>,
    pub min: f64,
    pub max: f64,
}

/// Constraints on the weight vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConstraints {
    pub min_weight: f64,
    pub max_weight: f64,
    /// Upper bound on per-period portfolio volatility.
    pub max_volatility: Option<f64>,
    /// Upper bound on historical max drawdown (fraction).
    pub max_drawdown: Option<f64>,
    pub min_diversification: Option<f64>,
    pub group_bounds: Vec<GroupBound>,
    /// Upper bound on `Σ|w - current|`; requires `current_weights`.
    pub max_turnover: Option<f64>,
    pub current_weights: Option<Vec<f64>>,
}

impl Default for PortfolioConstraints {
    fn default() -> Self {
        Self {
            min_weight: 0.0,
            max_weight: 1.0,
            max_volatility: None,
            max_drawdown: None,
            min_diversification: None,
            group_bounds: Vec::new(),
            max_turnover: None,
            current_weights: None,
        }
    }
}

impl PortfolioConstraints {
    /// Long-only constraints with per-asset bounds.
    pub fn bounded(min_weight: f64, max_weight: f64) -> Self {
        Self {
            min_weight,
            max_weight,
            ..Default::default()
        }
    }

    pub fn with_max_volatility(mut self, vol: f64) -> Self {
        self.max_volatility = Some(vol);
        self
    }

    pub fn with_max_drawdown(mut self, drawdown: f64) -> Self {
        self.max_drawdown = Some(drawdown);
        self
    }

    pub fn with_min_diversification(mut self, ratio: f64) -> Self {
        self.min_diversification = Some(ratio);
        self
    }

    pub fn with_group(mut self, group: GroupBound) -> Self {
        self.group_bounds.push(group);
        self
    }

    pub fn with_turnover_limit(mut self, current: Vec<f64>, max_turnover: f64) -> Self {
        self.current_weights = Some(current);
        self.max_turnover = Some(max_turnover);
        self
    }

    fn validate(&self, n: usize) -> Result<()> {
        if self.min_weight > self.max_weight {
            return Err(QuantError::invalid_config(format!(
                "min_weight ({}) exceeds max_weight ({})",
                self.min_weight, self.max_weight
            )));
        }
        if self.min_weight * n as f64 > 1.0 + FEASIBILITY_TOLERANCE
            || self.max_weight * (n as f64) < 1.0 - FEASIBILITY_TOLERANCE
        {
            return Err(QuantError::infeasible(format!(
                "weights in [{}, {}] cannot sum to 1 across {n} strategies",
                self.min_weight, self.max_weight
            )));
        }
        for g in &self.group_bounds {
            if g.min > g.max {
                return Err(QuantError::invalid_config(format!(
                    "group {} has min above max",
                    g.name
                )));
            }
        }
        if let Some(t) = self.max_turnover {
            if t < 0.0 {
                return Err(QuantError::invalid_config("max_turnover must be non-negative"));
            }
            match &self.current_weights {
                Some(cw) if cw.len() == n => {}
                Some(cw) => return Err(QuantError::length_mismatch(n, cw.len())),
                None => {
                    return Err(QuantError::invalid_config(
                        "max_turnover requires current_weights",
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Solver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Iteration cap per solve (gradient steps or risk parity sweeps).
    pub max_iterations: usize,
    /// Step size below which the gradient solver is considered stationary.
    pub tolerance: f64,
    pub initial_step: f64,
    /// Penalty weights tried in order for optional constraints.
    pub penalty_schedule: Vec<f64>,
    /// Max deviation of a risk contribution from 1/n at convergence.
    pub risk_parity_tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-10,
            initial_step: 0.1,
            penalty_schedule: vec![1e2, 1e4, 1e6, 1e8],
            risk_parity_tolerance: 1e-8,
        }
    }
}

impl OptimizerConfig {
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(QuantError::invalid_config("max_iterations must be at least 1"));
        }
        if !(self.tolerance > 0.0) || !(self.initial_step > 0.0) {
            return Err(QuantError::invalid_config("tolerance and initial_step must be positive"));
        }
        if self.penalty_schedule.is_empty() || self.penalty_schedule.iter().any(|p| !(*p > 0.0)) {
            return Err(QuantError::invalid_config("penalty_schedule must hold positive weights"));
        }
        if !(self.risk_parity_tolerance > 0.0) {
            return Err(QuantError::invalid_config("risk_parity_tolerance must be positive"));
        }
        Ok(())
    }
}

/// A converged, feasible weight vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub objective: OptimizationObjective,
    /// Strategy ids in weight order.
    pub ids: Vec<String>,
    pub weights: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Per-period expected return of the weighted portfolio.
    pub expected_return: f64,
    /// Per-period volatility of the weighted portfolio.
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// `w_i (Σw)_i / w'Σw` per strategy.
    pub risk_contributions: Vec<f64>,
}

impl OptimizationResult {
    /// Weights keyed by strategy id.
    pub fn weight_map(&self) -> HashMap<String, f64> {
        self.ids.iter().cloned().zip(self.weights.iter().copied()).collect()
    }
}

/// Estimated moments and aligned history of the strategy universe.
struct Problem<'a> {
    columns: Vec<Vec<f64>>,
    mu: Vec<f64>,
    cov: Vec<Vec<f64>>,
    vols: Vec<f64>,
    groups: Vec<(Vec<usize>, f64, f64)>,
    constraints: &'a PortfolioConstraints,
    rf: f64,
    var_confidence: f64,
}

impl Problem<'_> {
    fn n(&self) -> usize {
        self.mu.len()
    }

    fn portfolio_returns(&self, w: &[f64]) -> Vec<f64> {
        weighted_returns(&self.columns, w)
    }

    fn volatility(&self, w: &[f64]) -> f64 {
        quadratic_form(&self.cov, w).max(0.0).sqrt()
    }

    fn expected_return(&self, w: &[f64]) -> f64 {
        self.mu.iter().zip(w).map(|(m, x)| m * x).sum()
    }

    fn diversification(&self, w: &[f64]) -> f64 {
        let vol = self.volatility(w);
        if vol <= VARIANCE_EPSILON.sqrt() {
            return 1.0;
        }
        self.vols.iter().zip(w).map(|(s, x)| s * x).sum::<f64>() / vol
    }

    fn risk(&self, measure: RiskMeasure, w: &[f64]) -> f64 {
        match measure {
            RiskMeasure::Volatility => quadratic_form(&self.cov, w),
            RiskMeasure::MaxDrawdown => max_drawdown_from_returns(&self.portfolio_returns(w)),
            RiskMeasure::ValueAtRisk | RiskMeasure::ConditionalVar => {
                match historical_var_cvar(&self.portfolio_returns(w), self.var_confidence) {
                    Ok((var, _)) if measure == RiskMeasure::ValueAtRisk => var,
                    Ok((_, cvar)) => cvar,
                    Err(_) => 0.0,
                }
            }
        }
    }

    fn neg_sharpe(&self, w: &[f64]) -> f64 {
        let vol = self.volatility(w).max(VARIANCE_EPSILON.sqrt());
        -(self.expected_return(w) - self.rf) / vol
    }

    /// Every optional constraint as `(limit, value, bound, excess)`; a positive
    /// excess is a breach.
    fn limits(&self, w: &[f64]) -> Vec<(Limit, f64, f64, f64)> {
        let c = self.constraints;
        let mut out = Vec::new();
        if let Some(max_vol) = c.max_volatility {
            let vol = self.volatility(w);
            out.push((Limit::Volatility, vol, max_vol, vol - max_vol));
        }
        if let Some(max_dd) = c.max_drawdown {
            let dd = max_drawdown_from_returns(&self.portfolio_returns(w));
            out.push((Limit::Drawdown, dd, max_dd, dd - max_dd));
        }
        if let Some(min_div) = c.min_diversification {
            let div = self.diversification(w);
            out.push((Limit::Diversification, div, min_div, min_div - div));
        }
        for (idx, (members, lo, hi)) in self.groups.iter().enumerate() {
            let sum: f64 = members.iter().map(|&i| w[i]).sum();
            let (bound, excess) = if sum > *hi { (*hi, sum - hi) } else { (*lo, lo - sum) };
            out.push((Limit::Group(idx), sum, bound, excess));
        }
        if let (Some(limit), Some(current)) = (c.max_turnover, &c.current_weights) {
            let turnover: f64 = w.iter().zip(current).map(|(a, b)| (a - b).abs()).sum();
            out.push((Limit::Turnover, turnover, limit, turnover - limit));
        }
        out
    }

    /// Sum of squared breaches, used as the penalty.
    fn violation(&self, w: &[f64]) -> f64 {
        self.limits(w)
            .iter()
            .map(|(_, _, _, excess)| excess.max(0.0).powi(2))
            .sum()
    }

    /// First constraint the point breaches beyond tolerance, if any.
    fn infeasibility(&self, w: &[f64]) -> Option<String> {
        self.limits(w)
            .into_iter()
            .find(|(_, _, bound, excess)| {
                *excess > FEASIBILITY_TOLERANCE * (1.0 + bound.abs()) * 10.0
            })
            .map(|(limit, value, bound, _)| {
                let what = match limit {
                    Limit::Volatility => "volatility".to_string(),
                    Limit::Drawdown => "drawdown".to_string(),
                    Limit::Diversification => "diversification".to_string(),
                    Limit::Group(idx) => format!("group {}", self.constraints.group_bounds[idx].name),
                    Limit::Turnover => "turnover".to_string(),
                };
                format!("{what} {value:.6} breaches limit {bound:.6}")
            })
    }
}

/// Optional constraint kinds checked on a weight vector.
#[derive(Debug, Clone, Copy)]
enum Limit {
    Volatility,
    Drawdown,
    Diversification,
    /// Index into `group_bounds`.
    Group(usize),
    Turnover,
}

/// Solves for target weights under an objective and constraints.
///
/// The risk-free rate, periods per year and VaR confidence come from the
/// same [`MetricsConfig`] the metrics calculator uses.
#[derive(Debug, Clone, Default)]
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
    metrics: MetricsConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        Self::with_metrics(config, MetricsConfig::default())
    }

    pub fn with_metrics(config: OptimizerConfig, metrics: MetricsConfig) -> Result<Self> {
        config.validate()?;
        metrics.validate()?;
        Ok(Self { config, metrics })
    }

    /// Build from the `[optimizer]` and `[metrics]` sections.
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        Self::with_metrics(config.optimizer.clone(), config.metrics.clone())
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsConfig {
        &self.metrics
    }

    /// Optimize weights for the given strategies.
    pub fn optimize(
        &self,
        strategies: &[StrategyReturns],
        objective: OptimizationObjective,
        constraints: &PortfolioConstraints,
    ) -> Result<OptimizationResult> {
        let n = strategies.len();
        if n == 0 {
            return Err(QuantError::insufficient_data(1, 0));
        }
        constraints.validate(n)?;

        let problem = self.build_problem(strategies, constraints)?;

        let (weights, iterations) = match objective {
            OptimizationObjective::RiskParity => self.solve_risk_parity(&problem)?,
            OptimizationObjective::MinRisk(measure) => {
                self.solve_gradient(&problem, |w| problem.risk(measure, w))?
            }
            OptimizationObjective::MaxReturn => {
                self.solve_gradient(&problem, |w| -problem.expected_return(w))?
            }
            OptimizationObjective::MaxSharpe => {
                self.solve_gradient(&problem, |w| problem.neg_sharpe(w))?
            }
        };

        if weights.iter().any(|w| {
            !w.is_finite()
                || *w < constraints.min_weight - FEASIBILITY_TOLERANCE
                || *w > constraints.max_weight + FEASIBILITY_TOLERANCE
        }) {
            return Err(QuantError::infeasible("solution left the weight bounds"));
        }
        if let Some(reason) = problem.infeasibility(&weights) {
            return Err(QuantError::infeasible(reason));
        }

        let expected_return = problem.expected_return(&weights);
        let volatility = problem.volatility(&weights);
        let sharpe_ratio = if volatility > VARIANCE_EPSILON.sqrt() {
            (expected_return - problem.rf) / volatility
        } else {
            0.0
        };

        debug!(?objective, iterations, expected_return, volatility, "optimizer converged");

        Ok(OptimizationResult {
            objective,
            ids: strategies.iter().map(|s| s.id.clone()).collect(),
            risk_contributions: risk_contributions(&problem.cov, &weights),
            weights,
            iterations,
            converged: true,
            expected_return,
            volatility,
            sharpe_ratio,
        })
    }

    fn build_problem<'a>(
        &self,
        strategies: &[StrategyReturns],
        constraints: &'a PortfolioConstraints,
    ) -> Result<Problem<'a>> {
        let series: Vec<&ReturnSeries> = strategies.iter().map(|s| &s.returns).collect();
        let aligned = align(&series);
        if aligned.len() < 2 {
            return Err(QuantError::insufficient_data(2, aligned.len()));
        }

        let index: HashMap<&str, usize> = strategies
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        let groups = constraints
            .group_bounds
            .iter()
            .map(|g| -> Result<(Vec<usize>, f64, f64)> {
                let members = g
                    .members
                    .iter()
                    .map(|id| {
                        index.get(id.as_str()).copied().ok_or_else(|| {
                            QuantError::invalid_config(format!(
                                "group {} references unknown strategy {id}",
                                g.name
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((members, g.min, g.max))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Problem {
            mu: aligned.columns.iter().map(|c| mean(c)).collect(),
            cov: covariance_matrix(&aligned.columns),
            vols: aligned.columns.iter().map(|c| std_dev(c)).collect(),
            columns: aligned.columns,
            groups,
            constraints,
            rf: self.metrics.per_period_risk_free(),
            var_confidence: self.metrics.var_confidence,
        })
    }

    /// Projected gradient descent with penalty continuation.
    fn solve_gradient<O>(&self, problem: &Problem<'_>, objective: O) -> Result<(Vec<f64>, usize)>
    where
        O: Fn(&[f64]) -> f64,
    {
        let c = problem.constraints;
        let (lo, hi) = (c.min_weight, c.max_weight);
        let n = problem.n();

        let start = c
            .current_weights
            .clone()
            .unwrap_or_else(|| vec![1.0 / n as f64; n]);
        let mut w = project_bounded_simplex(&start, lo, hi);

        let schedule: &[f64] = if !problem.limits(&w).is_empty() {
            &self.config.penalty_schedule
        } else {
            &self.config.penalty_schedule[..1]
        };

        let mut total_iterations = 0;
        for &rho in schedule {
            let f = |x: &[f64]| -> f64 { objective(x) + rho * problem.violation(x) };
            let (next, iterations) = self.descend(&f, w, lo, hi)?;
            w = next;
            total_iterations += iterations;
            if problem.infeasibility(&w).is_none() {
                break;
            }
        }

        Ok((w, total_iterations))
    }

    /// Backtracking projected descent along the normalized numeric gradient.
    ///
    /// Converges when the step needed for any decrease drops below tolerance.
    fn descend<F>(&self, f: &F, mut w: Vec<f64>, lo: f64, hi: f64) -> Result<(Vec<f64>, usize)>
    where
        F: Fn(&[f64]) -> f64,
    {
        let mut fw = f(&w);
        let mut step = self.config.initial_step;
        let mut grad = numeric_gradient(f, &w);

        for iteration in 1..=self.config.max_iterations {
            let scale = grad.iter().fold(0.0f64, |m, g| m.max(g.abs()));
            if scale <= f64::EPSILON * fw.abs().max(1e-300) || !scale.is_finite() {
                return Ok((w, iteration));
            }

            let candidate: Vec<f64> = w
                .iter()
                .zip(&grad)
                .map(|(x, g)| x - step * g / scale)
                .collect();
            let candidate = project_bounded_simplex(&candidate, lo, hi);
            let fc = f(&candidate);

            if fc < fw {
                let moved = w
                    .iter()
                    .zip(&candidate)
                    .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()));
                w = candidate;
                fw = fc;
                if moved < self.config.tolerance {
                    return Ok((w, iteration));
                }
                grad = numeric_gradient(f, &w);
                step = (step * 1.5).min(1.0);
            } else {
                step *= 0.5;
                if step < self.config.tolerance {
                    return Ok((w, iteration));
                }
            }
        }

        warn!(max_iterations = self.config.max_iterations, "gradient solver hit iteration cap");
        Err(QuantError::OptimizationDidNotConverge {
            iterations: self.config.max_iterations,
        })
    }

    /// Cyclic coordinate descent for equal risk contributions.
    fn solve_risk_parity(&self, problem: &Problem<'_>) -> Result<(Vec<f64>, usize)> {
        let n = problem.n();
        let cov = &problem.cov;
        if let Some(i) = (0..n).find(|&i| cov[i][i] <= VARIANCE_EPSILON) {
            return Err(QuantError::infeasible(format!(
                "strategy {i} has zero variance, risk parity undefined"
            )));
        }

        let budget = 1.0 / n as f64;
        let mut y: Vec<f64> = (0..n).map(|i| 1.0 / cov[i][i].sqrt()).collect();

        for sweep in 1..=self.config.max_iterations {
            for i in 0..n {
                let a = cov[i][i];
                let c: f64 = (0..n).filter(|&j| j != i).map(|j| cov[i][j] * y[j]).sum();
                y[i] = (-c + (c * c + 4.0 * a * budget).sqrt()) / (2.0 * a);
            }

            let total: f64 = y.iter().sum();
            let w: Vec<f64> = y.iter().map(|v| v / total).collect();
            let rc = risk_contributions(cov, &w);
            let deviation = rc.iter().fold(0.0f64, |m, r| m.max((r - budget).abs()));

            if deviation < self.config.risk_parity_tolerance {
                let c = problem.constraints;
                if let Some((i, x)) = w.iter().enumerate().find(|(_, x)| {
                    **x < c.min_weight - FEASIBILITY_TOLERANCE
                        || **x > c.max_weight + FEASIBILITY_TOLERANCE
                }) {
                    return Err(QuantError::infeasible(format!(
                        "equal-risk weight {x:.6} of strategy {i} outside [{}, {}]",
                        c.min_weight, c.max_weight
                    )));
                }
                return Ok((w, sweep));
            }
        }

        warn!(max_iterations = self.config.max_iterations, "risk parity hit sweep cap");
        Err(QuantError::OptimizationDidNotConverge {
            iterations: self.config.max_iterations,
        })
    }
}

/// Central-difference gradient.
fn numeric_gradient<F: Fn(&[f64]) -> f64>(f: &F, w: &[f64]) -> Vec<f64> {
    const H: f64 = 1e-7;
    let mut x = w.to_vec();
    (0..w.len())
        .map(|i| {
            let orig = x[i];
            x[i] = orig + H;
            let up = f(&x);
            x[i] = orig - H;
            let down = f(&x);
            x[i] = orig;
            (up - down) / (2.0 * H)
        })
        .collect()
}

/// Euclidean projection onto `{Σw = 1, lo ≤ wᵢ ≤ hi}`.
///
/// Finds the shift τ with `Σ clamp(vᵢ - τ, lo, hi) = 1` by bisection.
pub fn project_bounded_simplex(v: &[f64], lo: f64, hi: f64) -> Vec<f64> {
    let sum_at = |tau: f64| -> f64 { v.iter().map(|x| (x - tau).clamp(lo, hi)).sum() };

    let max_v = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min_v = v.iter().copied().fold(f64::INFINITY, f64::min);
    let mut low = min_v - hi - 1.0;
    let mut high = max_v - lo + 1.0;

    for _ in 0..200 {
        let mid = 0.5 * (low + high);
        if mid <= low || mid >= high {
            break;
        }
        if sum_at(mid) > 1.0 {
            low = mid;
        } else {
            high = mid;
        }
    }

    let tau = 0.5 * (low + high);
    v.iter().map(|x| (x - tau).clamp(lo, hi)).collect()
}
