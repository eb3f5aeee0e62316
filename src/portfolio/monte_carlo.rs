//! Monte Carlo forward simulation of portfolio equity.
//!
//! Paths are built by bootstrap resampling of historical returns (uniform
//! draws with replacement), not from a fitted distribution. Runs are
//! independent and fan out over Rayon; each run gets its own RNG seeded from
//! the caller's generator, so results are identical for any thread count.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{QuantError, Result};
use crate::metrics::drawdown::max_drawdown;

/// Confidence levels reported when none are configured.
pub const DEFAULT_CONFIDENCE_LEVELS: [f64; 3] = [0.95, 0.90, 0.80];

/// Configuration for Monte Carlo simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub n_simulations: usize,
    /// Number of compounding steps per run.
    pub time_horizon: usize,
    pub initial_equity: f64,
    pub confidence_levels: Vec<f64>,
    /// Width of drawdown distribution bins (0.01 = 2 decimals).
    pub drawdown_bin_width: f64,
    /// Width of terminal equity distribution bins, in currency units.
    pub equity_bin_width: f64,
    /// Seed used by [`MonteCarloEngine::run_seeded`].
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_simulations: 1000,
            time_horizon: 252,
            initial_equity: 10_000.0,
            confidence_levels: DEFAULT_CONFIDENCE_LEVELS.to_vec(),
            drawdown_bin_width: 0.01,
            equity_bin_width: 1000.0,
            seed: 42,
        }
    }
}

impl MonteCarloConfig {
    pub fn with_simulations(mut self, n: usize) -> Self {
        self.n_simulations = n;
        self
    }

    pub fn with_horizon(mut self, steps: usize) -> Self {
        self.time_horizon = steps;
        self
    }

    pub fn with_initial_equity(mut self, equity: f64) -> Self {
        self.initial_equity = equity;
        self
    }

    pub fn with_confidence_levels(mut self, levels: Vec<f64>) -> Self {
        self.confidence_levels = levels;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_simulations == 0 {
            return Err(QuantError::invalid_config("n_simulations must be at least 1"));
        }
        if self.time_horizon == 0 {
            return Err(QuantError::invalid_config("time_horizon must be at least 1"));
        }
        if !(self.initial_equity > 0.0) {
            return Err(QuantError::invalid_config("initial_equity must be positive"));
        }
        if let Some(level) = self
            .confidence_levels
            .iter()
            .find(|l| !(**l > 0.0 && **l <= 1.0))
        {
            return Err(QuantError::invalid_config(format!(
                "confidence level {level} outside (0, 1]"
            )));
        }
        if !(self.drawdown_bin_width > 0.0) || !(self.equity_bin_width > 0.0) {
            return Err(QuantError::invalid_config("bin widths must be positive"));
        }
        Ok(())
    }
}

/// One synthetic equity path of `time_horizon + 1` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub equity: Vec<f64>,
}

impl SimulationRun {
    /// Final equity value.
    #[inline]
    pub fn terminal(&self) -> f64 {
        self.equity.last().copied().unwrap_or(0.0)
    }

    /// Maximum peak-to-trough drawdown as fraction.
    pub fn max_drawdown(&self) -> f64 {
        max_drawdown(&self.equity)
    }
}

/// Point-wise percentile band across all runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub level: f64,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

/// One histogram bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistributionBin {
    /// Bin center.
    pub value: f64,
    pub count: usize,
    /// `count / n_simulations`.
    pub frequency: f64,
}

/// Aggregated outcome of a simulation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub expected_equity_curve: Vec<f64>,
    pub confidence_bands: Vec<ConfidenceBand>,
    /// Run with the highest terminal equity.
    pub best_case: Vec<f64>,
    /// Run with the lowest terminal equity.
    pub worst_case: Vec<f64>,
    pub drawdown_distribution: Vec<DistributionBin>,
    pub final_equity_distribution: Vec<DistributionBin>,
    /// Fraction of runs ending below the initial equity.
    pub probability_of_loss: f64,
    /// Terminal loss at the 5th percentile, as fraction of initial equity.
    pub var_95: f64,
    /// Mean terminal loss at or beyond the 5th percentile.
    pub cvar_95: f64,
    pub n_simulations: usize,
}

impl MonteCarloResult {
    /// Band for an exact confidence level, if it was requested.
    pub fn band(&self, level: f64) -> Option<&ConfidenceBand> {
        self.confidence_bands
            .iter()
            .find(|b| (b.level - level).abs() < 1e-12)
    }
}

/// Bootstrap Monte Carlo simulator.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloEngine {
    config: MonteCarloConfig,
}

impl MonteCarloEngine {
    pub fn new(config: MonteCarloConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MonteCarloConfig {
        &self.config
    }

    /// Simulate and aggregate using the configured seed.
    pub fn run_seeded(&self, returns: &[f64]) -> Result<MonteCarloResult> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.run(returns, &mut rng)
    }

    /// Simulate `n_simulations` paths and aggregate them.
    pub fn run<R: RngCore>(&self, returns: &[f64], rng: &mut R) -> Result<MonteCarloResult> {
        let runs = self.simulate_paths(returns, rng)?;
        self.aggregate(&runs)
    }

    /// Generate the raw paths.
    ///
    /// One child seed per run is drawn from `rng` up front, in run order.
    pub fn simulate_paths<R: RngCore>(
        &self,
        returns: &[f64],
        rng: &mut R,
    ) -> Result<Vec<SimulationRun>> {
        if returns.is_empty() {
            return Err(QuantError::insufficient_data(1, 0));
        }

        let seeds: Vec<u64> = (0..self.config.n_simulations)
            .map(|_| rng.next_u64())
            .collect();
        let horizon = self.config.time_horizon;
        let initial = self.config.initial_equity;

        let runs = seeds
            .into_par_iter()
            .map(|seed| {
                let mut run_rng = StdRng::seed_from_u64(seed);
                simulate_one(returns, initial, horizon, &mut run_rng)
            })
            .collect();

        Ok(runs)
    }

    /// Derive bands, expected curve, extremes and distributions from paths.
    pub fn aggregate(&self, runs: &[SimulationRun]) -> Result<MonteCarloResult> {
        if runs.is_empty() {
            return Err(QuantError::insufficient_data(1, 0));
        }
        let n = runs.len();
        let steps = runs[0].equity.len();
        if let Some(bad) = runs.iter().find(|r| r.equity.len() != steps) {
            return Err(QuantError::length_mismatch(steps, bad.equity.len()));
        }

        let mut levels = self.config.confidence_levels.clone();
        levels.sort_by(|a, b| b.total_cmp(a));

        let mut expected_equity_curve = Vec::with_capacity(steps);
        let mut bands: Vec<ConfidenceBand> = levels
            .iter()
            .map(|&level| ConfidenceBand {
                level,
                lower: Vec::with_capacity(steps),
                upper: Vec::with_capacity(steps),
            })
            .collect();

        let mut column = vec![0.0; n];
        for t in 0..steps {
            for (slot, run) in column.iter_mut().zip(runs) {
                *slot = run.equity[t];
            }
            expected_equity_curve.push(column.iter().sum::<f64>() / n as f64);
            column.sort_by(|a, b| a.total_cmp(b));

            for band in &mut bands {
                let tail = (1.0 - band.level) / 2.0;
                band.lower.push(column[percentile_index(tail, n)]);
                band.upper.push(column[percentile_index(1.0 - tail, n)]);
            }
        }

        let best = runs
            .iter()
            .max_by(|a, b| a.terminal().total_cmp(&b.terminal()))
            .map(|r| r.equity.clone())
            .unwrap_or_default();
        let worst = runs
            .iter()
            .min_by(|a, b| a.terminal().total_cmp(&b.terminal()))
            .map(|r| r.equity.clone())
            .unwrap_or_default();

        let drawdowns: Vec<f64> = runs.iter().map(SimulationRun::max_drawdown).collect();
        let drawdown_distribution = histogram(&drawdowns, self.config.drawdown_bin_width);

        let mut finals: Vec<f64> = runs.iter().map(SimulationRun::terminal).collect();
        let final_equity_distribution = histogram(&finals, self.config.equity_bin_width);

        let initial = runs[0].equity[0];
        finals.sort_by(|a, b| a.total_cmp(b));
        let probability_of_loss = finals.iter().filter(|&&v| v < initial).count() as f64 / n as f64;
        let p5_idx = ((0.05 * (n as f64 - 1.0)).round() as usize).min(n - 1);
        let (var_95, cvar_95) = if initial > 0.0 {
            let tail = &finals[..=p5_idx];
            let avg_tail = tail.iter().sum::<f64>() / tail.len() as f64;
            (
                ((initial - finals[p5_idx]) / initial).max(0.0),
                ((initial - avg_tail) / initial).max(0.0),
            )
        } else {
            (0.0, 0.0)
        };

        debug!(
            runs = n,
            steps,
            probability_of_loss,
            "monte carlo batch aggregated"
        );

        Ok(MonteCarloResult {
            expected_equity_curve,
            confidence_bands: bands,
            best_case: best,
            worst_case: worst,
            drawdown_distribution,
            final_equity_distribution,
            probability_of_loss,
            var_95,
            cvar_95,
            n_simulations: n,
        })
    }
}

/// Compound `horizon` bootstrap draws from `initial`.
///
/// A draw of -100 % or worse wipes the path out: equity becomes 0 and stays 0.
fn simulate_one<R: Rng>(returns: &[f64], initial: f64, horizon: usize, rng: &mut R) -> SimulationRun {
    let mut equity = Vec::with_capacity(horizon + 1);
    let mut value = initial;
    equity.push(value);

    for _ in 0..horizon {
        let r = returns[rng.gen_range(0..returns.len())];
        if value > 0.0 {
            let growth = 1.0 + r;
            value = if growth > 0.0 { value * growth } else { 0.0 };
        }
        equity.push(value);
    }

    SimulationRun { equity }
}

/// Index of the `p` quantile in a sorted sample of `n`, `floor(p * n)` clamped
/// to the last element. The nudge keeps e.g. 0.05 * 1000 from flooring to 49.
fn percentile_index(p: f64, n: usize) -> usize {
    ((p * n as f64 + 1e-9).floor() as usize).min(n - 1)
}

/// Fixed-width histogram with frequencies relative to the sample size.
fn histogram(values: &[f64], width: f64) -> Vec<DistributionBin> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for v in values {
        *counts.entry((v / width).round() as i64).or_insert(0) += 1;
    }
    let n = values.len() as f64;
    counts
        .into_iter()
        .map(|(bin, count)| DistributionBin {
            value: bin as f64 * width,
            count,
            frequency: count as f64 / n,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(n: usize, horizon: usize) -> MonteCarloEngine {
        MonteCarloEngine::new(
            MonteCarloConfig::default()
                .with_simulations(n)
                .with_horizon(horizon),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_returns() {
        let err = engine(10, 5).run_seeded(&[]).unwrap_err();
        assert!(matches!(err, QuantError::InsufficientData { .. }));
    }

    #[test]
    fn test_path_shape() {
        let e = engine(50, 20);
        let mut rng = StdRng::seed_from_u64(7);
        let runs = e.simulate_paths(&[0.01, -0.01, 0.02], &mut rng).unwrap();
        assert_eq!(runs.len(), 50);
        assert!(runs.iter().all(|r| r.equity.len() == 21 && r.equity[0] == 10_000.0));
    }

    #[test]
    fn test_deterministic() {
        let e = engine(200, 30);
        let returns = [0.02, -0.015, 0.004, 0.01, -0.03];
        let a = e.simulate_paths(&returns, &mut StdRng::seed_from_u64(123)).unwrap();
        let b = e.simulate_paths(&returns, &mut StdRng::seed_from_u64(123)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wipe_out_is_terminal() {
        let e = engine(20, 10);
        let result = e.run_seeded(&[-1.5]).unwrap();
        for v in &result.expected_equity_curve[1..] {
            assert_eq!(*v, 0.0);
        }
        assert_eq!(result.probability_of_loss, 1.0);
        assert!(result.worst_case.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_constant_return() {
        let e = engine(10, 3);
        let result = e.run_seeded(&[0.1]).unwrap();
        let expected = 10_000.0 * 1.1f64.powi(3);
        assert!((result.expected_equity_curve[3] - expected).abs() < 1e-6);
        assert_eq!(result.drawdown_distribution.len(), 1);
        assert_eq!(result.drawdown_distribution[0].value, 0.0);
    }

    #[test]
    fn test_percentile_index() {
        assert_eq!(percentile_index(0.05, 1000), 50);
        assert_eq!(percentile_index(0.025, 1000), 25);
        assert_eq!(percentile_index(1.0, 10), 9);
    }

    #[test]
    fn test_histogram_frequencies() {
        let h = histogram(&[0.104, 0.101, 0.2, 0.0], 0.01);
        assert_eq!(h.len(), 3);
        assert_eq!(h[1].count, 2);
        assert!((h.iter().map(|b| b.frequency).sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_config() {
        assert!(MonteCarloEngine::new(MonteCarloConfig::default().with_simulations(0)).is_err());
        assert!(MonteCarloEngine::new(
            MonteCarloConfig::default().with_confidence_levels(vec![1.5])
        )
        .is_err());
    }
}
