//! Transaction cost estimation for rebalance orders.

use serde::{Deserialize, Serialize};

use crate::core::config::RebalanceConfig;
use crate::core::types::{SymbolMarket, TradeOrder};

/// Cost breakdown of one order, in currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeCost {
    /// Half the quoted spread paid on every unit crossed.
    pub spread: f64,
    pub commission: f64,
    pub market_impact: f64,
}

impl TradeCost {
    #[inline]
    pub fn total(&self) -> f64 {
        self.spread + self.commission + self.market_impact
    }
}

/// Commission plus spread plus square-root market impact.
#[derive(Debug, Clone, Copy)]
pub struct CostModel {
    /// Commission as fraction of notional.
    pub commission_rate: f64,
    /// Commission floor per order.
    pub min_commission: f64,
    /// Market impact coefficient.
    pub slippage_factor: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_config(&RebalanceConfig::default())
    }
}

impl CostModel {
    pub fn from_config(config: &RebalanceConfig) -> Self {
        Self {
            commission_rate: config.commission_rate,
            min_commission: config.min_commission,
            slippage_factor: config.slippage_factor,
        }
    }

    /// Commission for a trade of the given notional.
    #[inline]
    pub fn commission(&self, notional: f64) -> f64 {
        (notional * self.commission_rate).max(self.min_commission)
    }

    /// Square-root impact: `notional * factor * sqrt(notional / volume)`.
    ///
    /// Symbols without quoted volume carry no impact estimate.
    pub fn market_impact(&self, notional: f64, volume: f64) -> f64 {
        if volume <= 0.0 || notional <= 0.0 {
            return 0.0;
        }
        notional * self.slippage_factor * (notional / volume).sqrt()
    }

    /// Estimate the cost of an order against the symbol's market data.
    pub fn estimate(&self, order: &TradeOrder, market: &SymbolMarket) -> TradeCost {
        let notional = order.notional();
        TradeCost {
            spread: 0.5 * market.spread * order.quantity.abs(),
            commission: self.commission(notional),
            market_impact: self.market_impact(notional, market.volume),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderClass, Side};

    fn order(quantity: f64, price: f64) -> TradeOrder {
        TradeOrder {
            symbol: "X".into(),
            side: Side::Buy,
            quantity,
            price,
            timestamp: 0,
            class: OrderClass::Rebalance,
        }
    }

    #[test]
    fn test_commission_floor() {
        let model = CostModel::default();
        assert!((model.commission(100.0) - 1.0).abs() < 1e-12);
        assert!((model.commission(5000.0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_market_impact_square_root() {
        let model = CostModel::default();
        // 1000 * 0.1 * sqrt(1000 / 100_000) = 100 * 0.1 = 10
        assert!((model.market_impact(1000.0, 100_000.0) - 10.0).abs() < 1e-9);
        assert_eq!(model.market_impact(1000.0, 0.0), 0.0);
    }

    #[test]
    fn test_estimate_breakdown() {
        let model = CostModel::default();
        let market = SymbolMarket::new(100.0, 0.02, 1_000_000.0, 2, 0);
        let cost = model.estimate(&order(10.0, 100.0), &market);
        assert!((cost.spread - 0.1).abs() < 1e-12);
        assert!((cost.commission - 1.0).abs() < 1e-12);
        assert!((cost.market_impact - 1000.0 * 0.1 * 0.001f64.sqrt()).abs() < 1e-9);
        assert!((cost.total() - (cost.spread + cost.commission + cost.market_impact)).abs() < 1e-12);
    }
}
