//! Cost-aware rebalance planning.
//!
//! Compares the current allocation of a portfolio with a target allocation and
//! produces the orders that move it there: deltas below the minimum trade
//! value are dropped, quantities and prices follow the symbol's precision, and
//! large trades are split into time-spaced child orders.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::{AnalyticsConfig, RebalanceConfig};
use crate::core::error::{QuantError, Result};
use crate::core::timeseries::{align, ReturnSeries};
use crate::core::types::{Allocation, MarketData, PortfolioSnapshot, Side, Timestamp, TradeOrder};
use crate::metrics::portfolio::{StrategyReturns, WEIGHT_SUM_TOLERANCE};
use crate::metrics::stats::{covariance_matrix, risk_contributions};
use crate::portfolio::allocation::TargetAllocator;
use crate::portfolio::optimizer::PortfolioOptimizer;

use super::costs::CostModel;
use super::orders::{floor_to_precision, plan_order, split_order};

/// Summary statistics of a rebalance plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebalanceMetrics {
    /// Σ order notional / portfolio value.
    pub turnover: f64,
    pub trade_count: usize,
    /// Σ spread, commission and market impact over all orders.
    pub estimated_cost: f64,
    /// `sqrt(Σ (target - current)²)` over all symbols.
    pub tracking_error: f64,
    /// Share of target portfolio variance per symbol; empty without history.
    pub risk_contribution: Allocation,
}

/// A complete trade plan. Handed downstream as a whole or not at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceResult {
    pub trades: Vec<TradeOrder>,
    pub metrics: RebalanceMetrics,
    pub current_allocation: Allocation,
    pub target_allocation: Allocation,
    pub timestamp: Timestamp,
}

impl RebalanceResult {
    fn empty(current: Allocation, target: Allocation, timestamp: Timestamp) -> Self {
        Self {
            trades: Vec::new(),
            metrics: RebalanceMetrics::default(),
            current_allocation: current,
            target_allocation: target,
            timestamp,
        }
    }

    /// True when no orders are needed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

/// Turns target weights into an executable order list.
#[derive(Debug, Clone)]
pub struct PortfolioRebalancer {
    config: RebalanceConfig,
    allocator: TargetAllocator,
    costs: CostModel,
}

impl PortfolioRebalancer {
    /// Create a rebalancer with a default optimizer behind its strategies.
    pub fn new(config: RebalanceConfig) -> Result<Self> {
        Self::with_optimizer(config, PortfolioOptimizer::default())
    }

    /// Create a rebalancer from a loaded config, with the optimizer built from
    /// its `[optimizer]` and `[metrics]` sections.
    pub fn from_config(config: &AnalyticsConfig) -> Result<Self> {
        Self::with_optimizer(config.rebalance.clone(), PortfolioOptimizer::from_config(config)?)
    }

    pub fn with_optimizer(config: RebalanceConfig, optimizer: PortfolioOptimizer) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            allocator: TargetAllocator::from_config(&config, optimizer),
            costs: CostModel::from_config(&config),
            config,
        })
    }

    /// Replace the target allocator, e.g. to add optimizer constraints.
    pub fn with_allocator(mut self, allocator: TargetAllocator) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn config(&self) -> &RebalanceConfig {
        &self.config
    }

    /// Current weights `quantity * price / total` and the total value.
    pub fn current_allocation(
        snapshot: &PortfolioSnapshot,
        market: &MarketData,
    ) -> Result<(Allocation, f64)> {
        let mut values = Allocation::new();
        for position in &snapshot.positions {
            let price = market.get(&position.symbol)?.price;
            *values.entry(position.symbol.clone()).or_insert(0.0) += position.value_at(price);
        }

        let total: f64 = values.values().sum();
        if total <= 0.0 {
            return Ok((Allocation::new(), 0.0));
        }
        for v in values.values_mut() {
            *v /= total;
        }
        Ok((values, total))
    }

    /// Rebalance toward the configured strategy's target.
    ///
    /// # Arguments
    /// * `snapshot` - Held positions
    /// * `market` - Live market data for every held symbol
    /// * `history` - Return history keyed by symbol, used by non-equal strategies
    /// * `now` - Timestamp of the plan and of the first order
    pub fn rebalance(
        &self,
        snapshot: &PortfolioSnapshot,
        market: &MarketData,
        history: &[StrategyReturns],
        now: Timestamp,
    ) -> Result<RebalanceResult> {
        let (current, total) = Self::current_allocation(snapshot, market)?;
        if current.is_empty() {
            debug!("no positions to rebalance");
            return Ok(RebalanceResult::empty(current, Allocation::new(), now));
        }

        let symbols: Vec<String> = current.keys().cloned().collect();
        let target = self.allocator.target(self.config.strategy, &symbols, history)?;
        self.plan(snapshot, current, total, target, market, history, now)
    }

    /// Rebalance toward an explicit target, such as an optimizer result.
    pub fn rebalance_to(
        &self,
        snapshot: &PortfolioSnapshot,
        market: &MarketData,
        target: &Allocation,
        history: &[StrategyReturns],
        now: Timestamp,
    ) -> Result<RebalanceResult> {
        if target.values().any(|w| *w < 0.0 || !w.is_finite()) {
            return Err(QuantError::invalid_parameter("target weights must be non-negative"));
        }
        let sum: f64 = target.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(QuantError::invalid_parameter(format!(
                "target weights sum to {sum}, expected 1"
            )));
        }

        let (current, total) = Self::current_allocation(snapshot, market)?;
        if current.is_empty() {
            debug!("no positions to rebalance");
            return Ok(RebalanceResult::empty(current, target.clone(), now));
        }
        self.plan(snapshot, current, total, target.clone(), market, history, now)
    }

    #[allow(clippy::too_many_arguments)]
    fn plan(
        &self,
        snapshot: &PortfolioSnapshot,
        current: Allocation,
        total: f64,
        target: Allocation,
        market: &MarketData,
        history: &[StrategyReturns],
        now: Timestamp,
    ) -> Result<RebalanceResult> {
        let symbols: BTreeSet<&String> = current.keys().chain(target.keys()).collect();
        let drift: Vec<(&String, f64)> = symbols
            .iter()
            .map(|s| {
                let c = current.get(*s).copied().unwrap_or(0.0);
                let t = target.get(*s).copied().unwrap_or(0.0);
                (*s, t - c)
            })
            .collect();

        let tracking_error = drift.iter().map(|(_, d)| d * d).sum::<f64>().sqrt();
        let risk_contribution = target_risk_contribution(&target, history);

        if drift.iter().all(|(_, d)| d.abs() < self.config.rebalance_threshold) {
            debug!(tracking_error, "portfolio within rebalance threshold");
            let mut result = RebalanceResult::empty(current, target, now);
            result.metrics.tracking_error = tracking_error;
            result.metrics.risk_contribution = risk_contribution;
            return Ok(result);
        }

        let mut trades = Vec::new();
        let mut estimated_cost = 0.0;
        for (symbol, delta_weight) in drift {
            let delta_value = delta_weight * total;
            if delta_value.abs() < self.config.min_trade_value {
                continue;
            }

            let quote = market.get(symbol)?;
            let Some(mut order) = plan_order(symbol, delta_value, quote, now) else {
                continue;
            };
            if order.side == Side::Sell {
                // Never sell more than the held quantity, on the precision grid.
                let held = floor_to_precision(
                    snapshot.held_quantity(symbol),
                    quote.quantity_precision,
                );
                order.quantity = order.quantity.min(held);
                if order.quantity <= 0.0 {
                    continue;
                }
            }

            for child in split_order(
                &order,
                self.config.max_trade_value,
                self.config.trade_interval(),
                quote.quantity_precision,
            ) {
                estimated_cost += self.costs.estimate(&child, quote).total();
                trades.push(child);
            }
        }

        let turnover = trades.iter().map(TradeOrder::notional).sum::<f64>() / total;

        info!(
            trades = trades.len(),
            turnover,
            estimated_cost,
            tracking_error,
            "rebalance planned"
        );

        Ok(RebalanceResult {
            metrics: RebalanceMetrics {
                turnover,
                trade_count: trades.len(),
                estimated_cost,
                tracking_error,
                risk_contribution,
            },
            trades,
            current_allocation: current,
            target_allocation: target,
            timestamp: now,
        })
    }
}

/// Risk contribution of each target symbol, if every symbol has history.
fn target_risk_contribution(target: &Allocation, history: &[StrategyReturns]) -> Allocation {
    let series: Option<Vec<&ReturnSeries>> = target
        .keys()
        .map(|s| history.iter().find(|h| &h.id == s).map(|h| &h.returns))
        .collect();
    let Some(series) = series else {
        return Allocation::new();
    };

    let aligned = align(&series);
    if aligned.len() < 2 {
        return Allocation::new();
    }
    let weights: Vec<f64> = target.values().copied().collect();
    let cov = covariance_matrix(&aligned.columns);
    target
        .keys()
        .cloned()
        .zip(risk_contributions(&cov, &weights))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RebalanceStrategy;
    use crate::core::timeseries::TimeSeries;
    use crate::core::types::{Position, SymbolMarket};

    fn market() -> MarketData {
        MarketData::new()
            .with_symbol("A", SymbolMarket::new(100.0, 0.02, 1e7, 2, 0))
            .with_symbol("B", SymbolMarket::new(50.0, 0.01, 1e7, 2, 0))
    }

    #[test]
    fn test_current_allocation() {
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 30.0, 90.0, 100.0),
            Position::new("B", 20.0, 40.0, 50.0),
        ]);
        let (alloc, total) = PortfolioRebalancer::current_allocation(&snapshot, &market()).unwrap();
        assert!((total - 4000.0).abs() < 1e-9);
        assert!((alloc["A"] - 0.75).abs() < 1e-12);
        assert!((alloc.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_portfolio() {
        let r = PortfolioRebalancer::new(RebalanceConfig::default())
            .unwrap()
            .rebalance(&PortfolioSnapshot::default(), &market(), &[], 0)
            .unwrap();
        assert!(r.is_empty());
        assert_eq!(r.metrics.turnover, 0.0);
    }

    #[test]
    fn test_equal_weight_trades() {
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 30.0, 100.0, 100.0),
            Position::new("B", 20.0, 50.0, 50.0),
        ]);
        let r = PortfolioRebalancer::new(RebalanceConfig::default())
            .unwrap()
            .rebalance(&snapshot, &market(), &[], 5)
            .unwrap();
        // 0.75/0.25 -> 0.5/0.5 of 4000: sell 10 A, buy 20 B
        assert_eq!(r.trades.len(), 2);
        let a = &r.trades[0];
        assert_eq!((a.symbol.as_str(), a.side, a.quantity), ("A", Side::Sell, 10.0));
        let b = &r.trades[1];
        assert_eq!((b.symbol.as_str(), b.side, b.quantity), ("B", Side::Buy, 20.0));
        assert!((r.metrics.turnover - 0.5).abs() < 1e-12);
        assert!((r.metrics.tracking_error - (2.0f64 * 0.0625).sqrt()).abs() < 1e-12);
        assert!(r.metrics.estimated_cost > 2.0);
        assert_eq!(r.timestamp, 5);
    }

    #[test]
    fn test_min_trade_value_skips_small_delta() {
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 30.0, 100.0, 100.0),
            Position::new("B", 20.0, 50.0, 50.0),
        ]);
        let config = RebalanceConfig::default().with_trade_bounds(5_000.0, 10_000.0);
        let r = PortfolioRebalancer::new(config)
            .unwrap()
            .rebalance(&snapshot, &market(), &[], 0)
            .unwrap();
        assert!(r.is_empty());
    }

    #[test]
    fn test_full_exit_sells_whole_units() {
        let market = MarketData::new()
            .with_symbol("A", SymbolMarket::new(99.01, 0.02, 1e7, 2, 0))
            .with_symbol("B", SymbolMarket::new(50.0, 0.01, 1e7, 2, 0));
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 2.0, 99.01, 99.01),
            Position::new("B", 5.0, 50.0, 50.0),
        ]);
        let target: Allocation = [("A".to_string(), 0.0), ("B".to_string(), 1.0)]
            .into_iter()
            .collect();
        let r = PortfolioRebalancer::new(RebalanceConfig::default())
            .unwrap()
            .rebalance_to(&snapshot, &market, &target, &[], 0)
            .unwrap();
        let sell = r.trades.iter().find(|t| t.symbol == "A").unwrap();
        assert_eq!(sell.side, Side::Sell);
        assert_eq!(sell.quantity, 2.0);
    }

    #[test]
    fn test_sell_capped_at_held_grid_quantity() {
        let market = MarketData::new()
            .with_symbol("A", SymbolMarket::new(100.0, 0.02, 1e7, 2, 2))
            .with_symbol("B", SymbolMarket::new(50.0, 0.01, 1e7, 2, 2));
        // 1.239 held: rounding the full exit would give 1.24.
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 1.239, 100.0, 100.0),
            Position::new("B", 1.0, 50.0, 50.0),
        ]);
        let target: Allocation = [("A".to_string(), 0.0), ("B".to_string(), 1.0)]
            .into_iter()
            .collect();
        let r = PortfolioRebalancer::new(RebalanceConfig::default())
            .unwrap()
            .rebalance_to(&snapshot, &market, &target, &[], 0)
            .unwrap();
        let sell = r.trades.iter().find(|t| t.symbol == "A").unwrap();
        assert_eq!(sell.quantity, 1.23);
    }

    #[test]
    fn test_allocator_constraints_reach_optimizer() {
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 30.0, 100.0, 100.0),
            Position::new("B", 20.0, 50.0, 50.0),
        ]);
        let history = vec![
            StrategyReturns::new("A", TimeSeries::from_values(vec![0.011, -0.009, 0.011, -0.009])),
            StrategyReturns::new("B", TimeSeries::from_values(vec![0.022, 0.022, -0.018, -0.018])),
        ];
        let config = RebalanceConfig::default().with_strategy(RebalanceStrategy::RiskParity);
        // Equal risk needs 2/3 in A.
        let allocator = TargetAllocator::default()
            .with_constraints(crate::portfolio::optimizer::PortfolioConstraints::bounded(0.0, 0.6));
        let err = PortfolioRebalancer::new(config)
            .unwrap()
            .with_allocator(allocator)
            .rebalance(&snapshot, &market(), &history, 0)
            .unwrap_err();
        assert!(matches!(err, QuantError::InfeasibleConstraints { .. }));
    }

    #[test]
    fn test_rebalance_to_rejects_bad_target() {
        let snapshot = PortfolioSnapshot::new(vec![Position::new("A", 1.0, 100.0, 100.0)]);
        let target: Allocation = [("A".to_string(), 0.7)].into_iter().collect();
        let err = PortfolioRebalancer::new(RebalanceConfig::default())
            .unwrap()
            .rebalance_to(&snapshot, &market(), &target, &[], 0)
            .unwrap_err();
        assert!(matches!(err, QuantError::InvalidParameter { .. }));
    }

    #[test]
    fn test_missing_market_data() {
        let snapshot = PortfolioSnapshot::new(vec![Position::new("Z", 1.0, 1.0, 1.0)]);
        let err = PortfolioRebalancer::new(RebalanceConfig::default())
            .unwrap()
            .rebalance(&snapshot, &market(), &[], 0)
            .unwrap_err();
        assert!(matches!(err, QuantError::UnknownSymbol { .. }));
    }

    #[test]
    fn test_risk_contribution_with_history() {
        let snapshot = PortfolioSnapshot::new(vec![
            Position::new("A", 30.0, 100.0, 100.0),
            Position::new("B", 20.0, 50.0, 50.0),
        ]);
        let history = vec![
            StrategyReturns::new("A", TimeSeries::from_values(vec![0.011, -0.009, 0.011, -0.009])),
            StrategyReturns::new("B", TimeSeries::from_values(vec![0.022, 0.022, -0.018, -0.018])),
        ];
        let config = RebalanceConfig::default().with_strategy(RebalanceStrategy::RiskParity);
        let r = PortfolioRebalancer::new(config)
            .unwrap()
            .rebalance(&snapshot, &market(), &history, 0)
            .unwrap();
        assert!((r.metrics.risk_contribution["A"] - 0.5).abs() < 1e-6);
        assert!((r.target_allocation["A"] - 2.0 / 3.0).abs() < 1e-6);
    }
}
