//! Portfolio-level risk and performance metrics.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::drawdown::{calmar_ratio, max_drawdown_from_returns};
use super::stats::{
    correlation_matrix, covariance, downside_deviation, historical_var_cvar, mean, std_dev,
    variance, weighted_returns, VARIANCE_EPSILON,
};
use crate::core::config::MetricsConfig;
use crate::core::error::{QuantError, Result};
use crate::core::timeseries::{align, ReturnSeries, TimeSeries};

/// Tolerance on the sum of portfolio weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Return history of one strategy or instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyReturns {
    pub id: String,
    pub returns: ReturnSeries,
}

impl StrategyReturns {
    pub fn new(id: impl Into<String>, returns: ReturnSeries) -> Self {
        Self {
            id: id.into(),
            returns,
        }
    }
}

/// Metrics that need a benchmark/market return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkMetrics {
    pub tracking_error: f64,
    pub information_ratio: f64,
    pub beta: f64,
    pub treynor_ratio: f64,
    /// Annualized portfolio return over max drawdown.
    pub calmar_ratio: f64,
}

/// Snapshot of portfolio metrics for one weight vector.
///
/// Per-period figures are in the frequency of the input returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Mean per-period portfolio return.
    pub expected_return: f64,
    /// Population standard deviation of per-period portfolio returns.
    pub volatility: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// Maximum drawdown of the compounded portfolio value, as fraction.
    pub max_drawdown: f64,
    /// Strategy ids in matrix order.
    pub strategy_ids: Vec<String>,
    pub correlation_matrix: Vec<Vec<f64>>,
    /// Pairs whose correlation was reported as 0 because one side had no variance.
    pub degenerate_pairs: Vec<(String, String)>,
    /// Historical VaR as a positive loss fraction.
    pub value_at_risk: f64,
    /// Historical CVaR (expected shortfall) as a positive loss fraction.
    pub conditional_var: f64,
    pub diversification_ratio: f64,
    pub calmar_ratio: Option<f64>,
    pub tracking_error: Option<f64>,
    pub information_ratio: Option<f64>,
    pub beta_to_market: Option<f64>,
    pub treynor_ratio: Option<f64>,
    /// Number of dates on the aligned axis.
    pub observations: usize,
}

/// Computes [`PortfolioMetrics`] from per-strategy returns and weights.
#[derive(Debug, Clone, Default)]
pub struct PortfolioMetricsCalculator {
    config: MetricsConfig,
}

impl PortfolioMetricsCalculator {
    pub fn new(config: MetricsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Weighted portfolio returns on the aligned date axis.
    pub fn portfolio_returns(
        &self,
        strategies: &[StrategyReturns],
        weights: &[f64],
    ) -> Result<ReturnSeries> {
        check_weights(strategies, weights)?;
        let series: Vec<&ReturnSeries> = strategies.iter().map(|s| &s.returns).collect();
        let aligned = align(&series);
        let values = weighted_returns(&aligned.columns, weights);
        Ok(TimeSeries {
            timestamps: aligned.axis,
            values,
        })
    }

    /// Metrics without benchmark-relative figures.
    pub fn calculate(
        &self,
        strategies: &[StrategyReturns],
        weights: &[f64],
    ) -> Result<PortfolioMetrics> {
        check_weights(strategies, weights)?;

        let series: Vec<&ReturnSeries> = strategies.iter().map(|s| &s.returns).collect();
        let aligned = align(&series);
        if aligned.len() < 2 {
            return Err(QuantError::insufficient_data(2, aligned.len()));
        }

        let portfolio = weighted_returns(&aligned.columns, weights);
        let rf = self.config.per_period_risk_free();
        let ppy = self.config.periods_per_year;

        let expected_return = mean(&portfolio);
        let volatility = std_dev(&portfolio);
        let sharpe_ratio = guarded_ratio(expected_return - rf, volatility, "sharpe_ratio");
        let sortino_ratio = guarded_ratio(
            expected_return - rf,
            downside_deviation(&portfolio, rf),
            "sortino_ratio",
        );
        let max_drawdown = max_drawdown_from_returns(&portfolio);
        let annualized_return = expected_return * ppy;

        let correlations = correlation_matrix(&aligned.columns)?;
        let degenerate_pairs = correlations
            .degenerate_pairs
            .iter()
            .map(|&(i, j)| (strategies[i].id.clone(), strategies[j].id.clone()))
            .collect();

        let (value_at_risk, conditional_var) =
            historical_var_cvar(&portfolio, self.config.var_confidence)?;

        let weighted_vol: f64 = aligned
            .columns
            .iter()
            .zip(weights)
            .map(|(col, w)| w * std_dev(col))
            .sum();
        let diversification_ratio = diversification_ratio(weighted_vol, volatility);

        debug!(
            strategies = strategies.len(),
            observations = aligned.len(),
            expected_return,
            volatility,
            "portfolio metrics computed"
        );

        Ok(PortfolioMetrics {
            expected_return,
            volatility,
            annualized_return,
            annualized_volatility: volatility * ppy.sqrt(),
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            strategy_ids: strategies.iter().map(|s| s.id.clone()).collect(),
            correlation_matrix: correlations.matrix,
            degenerate_pairs,
            value_at_risk,
            conditional_var,
            diversification_ratio,
            calmar_ratio: None,
            tracking_error: None,
            information_ratio: None,
            beta_to_market: None,
            treynor_ratio: None,
            observations: aligned.len(),
        })
    }

    /// Full metrics including the benchmark-relative figures and Calmar.
    ///
    /// Fails with `MissingBenchmark` when `benchmark` is `None`.
    pub fn calculate_with_benchmark(
        &self,
        strategies: &[StrategyReturns],
        weights: &[f64],
        benchmark: Option<&ReturnSeries>,
    ) -> Result<PortfolioMetrics> {
        let benchmark = benchmark.ok_or_else(|| QuantError::missing_benchmark("portfolio metrics"))?;
        let mut metrics = self.calculate(strategies, weights)?;
        let portfolio = self.portfolio_returns(strategies, weights)?;
        let relative = self.benchmark_metrics(&portfolio, Some(benchmark))?;

        metrics.tracking_error = Some(relative.tracking_error);
        metrics.information_ratio = Some(relative.information_ratio);
        metrics.beta_to_market = Some(relative.beta);
        metrics.treynor_ratio = Some(relative.treynor_ratio);
        metrics.calmar_ratio = Some(relative.calmar_ratio);
        Ok(metrics)
    }

    /// Benchmark-relative metrics of a portfolio return series.
    pub fn benchmark_metrics(
        &self,
        portfolio: &ReturnSeries,
        benchmark: Option<&ReturnSeries>,
    ) -> Result<BenchmarkMetrics> {
        let benchmark = benchmark.ok_or_else(|| QuantError::missing_benchmark("benchmark metrics"))?;
        let aligned = align(&[portfolio, benchmark]);
        if aligned.len() < 2 {
            return Err(QuantError::insufficient_data(2, aligned.len()));
        }
        let (p, b) = (&aligned.columns[0], &aligned.columns[1]);

        let active: Vec<f64> = p.iter().zip(b).map(|(x, y)| x - y).collect();
        let tracking_error = std_dev(&active);
        let information_ratio = guarded_ratio(mean(&active), tracking_error, "information_ratio");

        let market_variance = variance(b);
        let beta = if market_variance <= VARIANCE_EPSILON {
            warn!("benchmark has zero variance, reporting beta 0");
            0.0
        } else {
            covariance(p, b) / market_variance
        };
        let excess = mean(p) - self.config.per_period_risk_free();
        let treynor_ratio = guarded_ratio(excess, beta, "treynor_ratio");
        let calmar = calmar_ratio(
            mean(&portfolio.values) * self.config.periods_per_year,
            max_drawdown_from_returns(&portfolio.values),
        );

        Ok(BenchmarkMetrics {
            tracking_error,
            information_ratio,
            beta,
            treynor_ratio,
            calmar_ratio: calmar,
        })
    }

    /// Tracking error alone; fails with `MissingBenchmark` without a benchmark.
    pub fn tracking_error(
        &self,
        portfolio: &ReturnSeries,
        benchmark: Option<&ReturnSeries>,
    ) -> Result<f64> {
        self.benchmark_metrics(portfolio, benchmark)
            .map(|m| m.tracking_error)
    }
}

fn check_weights(strategies: &[StrategyReturns], weights: &[f64]) -> Result<()> {
    if strategies.is_empty() {
        return Err(QuantError::insufficient_data(1, 0));
    }
    if strategies.len() != weights.len() {
        return Err(QuantError::length_mismatch(strategies.len(), weights.len()));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(QuantError::invalid_parameter(format!(
            "weights must sum to 1, got {sum}"
        )));
    }
    Ok(())
}

/// `numerator / denominator`, or 0 with a warning when the denominator vanishes.
fn guarded_ratio(numerator: f64, denominator: f64, metric: &str) -> f64 {
    if denominator.abs() <= VARIANCE_EPSILON.sqrt() {
        warn!(metric, "zero denominator, reporting 0");
        return 0.0;
    }
    numerator / denominator
}

fn diversification_ratio(weighted_vol: f64, portfolio_vol: f64) -> f64 {
    if portfolio_vol <= VARIANCE_EPSILON.sqrt() {
        if weighted_vol <= VARIANCE_EPSILON.sqrt() {
            return 1.0;
        }
        warn!("portfolio volatility fully hedged away, diversification ratio unbounded");
        return f64::INFINITY;
    }
    weighted_vol / portfolio_vol
}
