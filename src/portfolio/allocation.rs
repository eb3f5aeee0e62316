//! Target allocation strategies for the rebalancer.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::{RebalanceConfig, RebalanceStrategy};
use crate::core::error::{QuantError, Result};
use crate::core::timeseries::{align, ReturnSeries};
use crate::core::types::Allocation;
use crate::metrics::portfolio::StrategyReturns;
use crate::metrics::stats::{std_dev, weighted_returns};

use super::optimizer::{
    OptimizationObjective, PortfolioConstraints, PortfolioOptimizer, RiskMeasure,
};

/// Market state read from recent history by the dynamic strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// Annualized volatility above the configured threshold.
    HighVolatility,
    /// Calm market with positive recent return.
    Trending,
    /// Calm market without a positive trend.
    RangeBound,
}

impl MarketRegime {
    /// The two strategies blended in this regime and the weight of the first.
    pub fn blend(self) -> (RebalanceStrategy, RebalanceStrategy, f64) {
        match self {
            MarketRegime::HighVolatility => {
                (RebalanceStrategy::MinimumVariance, RebalanceStrategy::RiskParity, 0.7)
            }
            MarketRegime::Trending => (RebalanceStrategy::Momentum, RebalanceStrategy::RiskParity, 0.6),
            MarketRegime::RangeBound => {
                (RebalanceStrategy::RiskParity, RebalanceStrategy::EqualWeight, 0.5)
            }
        }
    }
}

/// Derives target weights for a set of symbols.
#[derive(Debug, Clone)]
pub struct TargetAllocator {
    optimizer: PortfolioOptimizer,
    constraints: PortfolioConstraints,
    momentum_lookback: usize,
    regime_volatility_threshold: f64,
}

impl Default for TargetAllocator {
    fn default() -> Self {
        Self::from_config(&RebalanceConfig::default(), PortfolioOptimizer::default())
    }
}

impl TargetAllocator {
    /// Create an allocator using the rebalance settings and an optimizer.
    pub fn from_config(config: &RebalanceConfig, optimizer: PortfolioOptimizer) -> Self {
        Self {
            optimizer,
            constraints: PortfolioConstraints::default(),
            momentum_lookback: config.momentum_lookback,
            regime_volatility_threshold: config.regime_volatility_threshold,
        }
    }

    /// Constraints passed to optimizer-backed strategies.
    pub fn with_constraints(mut self, constraints: PortfolioConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Target weights for `symbols`.
    ///
    /// # Arguments
    /// * `strategy` - Allocation strategy
    /// * `symbols` - Symbols to allocate across
    /// * `history` - Return history keyed by symbol id; unused by equal weight
    ///
    /// # Returns
    /// Weights summing to 1, or an error if history is missing or a solver fails
    pub fn target(
        &self,
        strategy: RebalanceStrategy,
        symbols: &[String],
        history: &[StrategyReturns],
    ) -> Result<Allocation> {
        if symbols.is_empty() {
            return Ok(Allocation::new());
        }

        match strategy {
            RebalanceStrategy::EqualWeight => Ok(equal_weight(symbols)),
            RebalanceStrategy::RiskParity => {
                self.optimized(OptimizationObjective::RiskParity, symbols, history)
            }
            RebalanceStrategy::MinimumVariance => self.optimized(
                OptimizationObjective::MinRisk(RiskMeasure::Volatility),
                symbols,
                history,
            ),
            RebalanceStrategy::MaximumSharpe => {
                self.optimized(OptimizationObjective::MaxSharpe, symbols, history)
            }
            RebalanceStrategy::Momentum => self.momentum(symbols, history),
            RebalanceStrategy::Dynamic => {
                let regime = self.detect_regime(symbols, history)?;
                let (first, second, share) = regime.blend();
                debug!(?regime, ?first, ?second, share, "dynamic allocation regime");
                let a = self.target(first, symbols, history)?;
                let b = self.target(second, symbols, history)?;
                Ok(symbols
                    .iter()
                    .map(|s| {
                        let w = share * a.get(s).copied().unwrap_or(0.0)
                            + (1.0 - share) * b.get(s).copied().unwrap_or(0.0);
                        (s.clone(), w)
                    })
                    .collect())
            }
        }
    }

    /// Classify recent history of the equal-weight portfolio.
    pub fn detect_regime(
        &self,
        symbols: &[String],
        history: &[StrategyReturns],
    ) -> Result<MarketRegime> {
        let selected = select_history(symbols, history)?;
        let series: Vec<&ReturnSeries> = selected.iter().map(|s| &s.returns).collect();
        let aligned = align(&series);
        if aligned.len() < 2 {
            return Err(QuantError::insufficient_data(2, aligned.len()));
        }

        let weights = vec![1.0 / symbols.len() as f64; symbols.len()];
        let portfolio = weighted_returns(&aligned.columns, &weights);
        let periods_per_year = self.optimizer.metrics().periods_per_year;
        let annual_vol = std_dev(&portfolio) * periods_per_year.sqrt();

        if annual_vol > self.regime_volatility_threshold {
            return Ok(MarketRegime::HighVolatility);
        }
        if trailing_return(&portfolio, self.momentum_lookback) > 0.0 {
            Ok(MarketRegime::Trending)
        } else {
            Ok(MarketRegime::RangeBound)
        }
    }

    /// Weights proportional to positive trailing compounded return.
    fn momentum(&self, symbols: &[String], history: &[StrategyReturns]) -> Result<Allocation> {
        let selected = select_history(symbols, history)?;
        let scores: Vec<f64> = selected
            .iter()
            .map(|s| trailing_return(s.returns.values(), self.momentum_lookback).max(0.0))
            .collect();

        match normalize(&scores) {
            Some(weights) => Ok(symbols.iter().cloned().zip(weights).collect()),
            None => {
                debug!("no positive momentum, falling back to equal weight");
                Ok(equal_weight(symbols))
            }
        }
    }

    fn optimized(
        &self,
        objective: OptimizationObjective,
        symbols: &[String],
        history: &[StrategyReturns],
    ) -> Result<Allocation> {
        let selected = select_history(symbols, history)?;
        let result = self.optimizer.optimize(&selected, objective, &self.constraints)?;
        Ok(result.ids.into_iter().zip(result.weights).collect())
    }
}

/// `1/n` for every symbol.
pub fn equal_weight(symbols: &[String]) -> Allocation {
    let w = 1.0 / symbols.len() as f64;
    symbols.iter().map(|s| (s.clone(), w)).collect()
}

/// Scale non-negative scores to sum to 1. `None` when nothing is positive.
pub fn normalize(scores: &[f64]) -> Option<Vec<f64>> {
    let total: f64 = scores.iter().sum();
    if !(total > 0.0) {
        return None;
    }
    Some(scores.iter().map(|s| s / total).collect())
}

/// Compounded return of the last `lookback` values.
fn trailing_return(values: &[f64], lookback: usize) -> f64 {
    let start = values.len().saturating_sub(lookback);
    values[start..].iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

/// History for each symbol, in symbol order.
fn select_history(symbols: &[String], history: &[StrategyReturns]) -> Result<Vec<StrategyReturns>> {
    let selected: Vec<StrategyReturns> = symbols
        .iter()
        .filter_map(|sym| history.iter().find(|h| &h.id == sym).cloned())
        .collect();
    if selected.len() != symbols.len() {
        return Err(QuantError::insufficient_data(symbols.len(), selected.len()));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timeseries::TimeSeries;

    fn symbols() -> Vec<String> {
        vec!["A".to_string(), "B".to_string()]
    }

    fn history() -> Vec<StrategyReturns> {
        vec![
            StrategyReturns::new("A", TimeSeries::from_values(vec![0.011, -0.009, 0.011, -0.009])),
            StrategyReturns::new("B", TimeSeries::from_values(vec![0.022, 0.022, -0.018, -0.018])),
        ]
    }

    fn sum(a: &Allocation) -> f64 {
        a.values().sum()
    }

    #[test]
    fn test_equal_weight() {
        let a = TargetAllocator::default()
            .target(RebalanceStrategy::EqualWeight, &symbols(), &[])
            .unwrap();
        assert!((a["A"] - 0.5).abs() < 1e-12);
        assert!((sum(&a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_momentum_scores() {
        let hist = vec![
            StrategyReturns::new("A", TimeSeries::from_values(vec![0.1, 0.1])),
            StrategyReturns::new("B", TimeSeries::from_values(vec![-0.1, -0.1])),
        ];
        let a = TargetAllocator::default()
            .target(RebalanceStrategy::Momentum, &symbols(), &hist)
            .unwrap();
        assert!((a["A"] - 1.0).abs() < 1e-12);
        assert_eq!(a["B"], 0.0);
    }

    #[test]
    fn test_momentum_all_negative_falls_back() {
        let hist = vec![
            StrategyReturns::new("A", TimeSeries::from_values(vec![-0.1, 0.0])),
            StrategyReturns::new("B", TimeSeries::from_values(vec![-0.2, 0.0])),
        ];
        let a = TargetAllocator::default()
            .target(RebalanceStrategy::Momentum, &symbols(), &hist)
            .unwrap();
        assert!((a["A"] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_risk_parity_target() {
        let a = TargetAllocator::default()
            .target(RebalanceStrategy::RiskParity, &symbols(), &history())
            .unwrap();
        assert!((a["A"] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_dynamic_blend_sums_to_one() {
        let allocator = TargetAllocator::default();
        let regime = allocator.detect_regime(&symbols(), &history()).unwrap();
        // ~0.011 per-period vol annualizes to ~0.18, below the 0.25 threshold.
        assert_ne!(regime, MarketRegime::HighVolatility);
        let a = allocator
            .target(RebalanceStrategy::Dynamic, &symbols(), &history())
            .unwrap();
        assert!((sum(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_history() {
        let hist = vec![history().remove(0)];
        let err = TargetAllocator::default()
            .target(RebalanceStrategy::MinimumVariance, &symbols(), &hist)
            .unwrap_err();
        assert!(matches!(err, QuantError::InsufficientData { required: 2, available: 1 }));
    }
}
