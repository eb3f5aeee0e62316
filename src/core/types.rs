//! Core data types for folioquant.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{QuantError, Result};

/// Type alias for price values.
pub type Price = f64;

/// Type alias for timestamp values (nanoseconds since epoch).
pub type Timestamp = i64;

/// Nanoseconds in one calendar day.
pub const NANOS_PER_DAY: i64 = 86_400_000_000_000;

/// Symbol -> weight map. Ordered so that trade plans come out deterministic.
pub type Allocation = BTreeMap<String, f64>;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Side implied by a signed value delta.
    pub fn from_delta(delta: f64) -> Self {
        if delta > 0.0 {
            Side::Buy
        } else {
            Side::Sell
        }
    }
}

/// A closed trade as reported by the trade history collaborator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Realized profit/loss in currency units.
    pub profit: f64,
    /// Entry price.
    pub entry_price: Price,
    /// Exit timestamp.
    pub exit_time: Timestamp,
}

impl TradeRecord {
    pub fn new(profit: f64, entry_price: Price, exit_time: Timestamp) -> Self {
        Self {
            profit,
            entry_price,
            exit_time,
        }
    }
}

/// A held position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    pub entry_price: Price,
    pub current_price: Price,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: f64, entry_price: Price, current_price: Price) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            entry_price,
            current_price,
        }
    }

    /// Market value at the given price.
    #[inline]
    pub fn value_at(&self, price: Price) -> f64 {
        self.quantity * price
    }
}

/// Portfolio snapshot handed over by the store layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub positions: Vec<Position>,
}

impl PortfolioSnapshot {
    pub fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }

    /// Total quantity held in a symbol across all positions.
    pub fn held_quantity(&self, symbol: &str) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .map(|p| p.quantity)
            .sum()
    }
}

/// Live market data for one symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SymbolMarket {
    pub price: Price,
    /// Bid-ask spread in price units.
    pub spread: f64,
    /// Traded value in currency units, used for market impact.
    pub volume: f64,
    /// Decimal places allowed for prices.
    pub price_precision: u32,
    /// Decimal places allowed for quantities.
    pub quantity_precision: u32,
}

impl SymbolMarket {
    pub fn new(price: Price, spread: f64, volume: f64, price_precision: u32, quantity_precision: u32) -> Self {
        Self {
            price,
            spread,
            volume,
            price_precision,
            quantity_precision,
        }
    }
}

/// Market data keyed by symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketData {
    pub symbols: BTreeMap<String, SymbolMarket>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol's market data.
    pub fn with_symbol(mut self, symbol: impl Into<String>, market: SymbolMarket) -> Self {
        self.symbols.insert(symbol.into(), market);
        self
    }

    /// Look up a symbol, failing if it is not quoted.
    pub fn get(&self, symbol: &str) -> Result<&SymbolMarket> {
        self.symbols
            .get(symbol)
            .ok_or_else(|| QuantError::unknown_symbol(symbol))
    }
}

/// Tag describing why an order was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderClass {
    Rebalance,
}

/// An order produced by the rebalancer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: Price,
    pub timestamp: Timestamp,
    pub class: OrderClass,
}

impl TradeOrder {
    /// Notional value of the order.
    #[inline]
    pub fn notional(&self) -> f64 {
        self.quantity.abs() * self.price
    }
}
