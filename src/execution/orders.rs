//! Order construction, precision rounding and large-order splitting.

use tracing::debug;

use crate::core::types::{OrderClass, Side, SymbolMarket, Timestamp, TradeOrder};

/// Round to a number of decimal places.
#[inline]
pub fn round_to_precision(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Round down to a number of decimal places, so that the result never
/// exceeds `value` by more than float noise.
#[inline]
pub fn floor_to_precision(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    ((value * factor) + 1e-9).floor() / factor
}

/// Build an order for a signed value delta at the symbol's current price.
///
/// Quantity is rounded to the symbol's quantity precision and the price to
/// its price precision. Returns `None` if the quantity rounds to zero.
pub fn plan_order(
    symbol: &str,
    delta_value: f64,
    market: &SymbolMarket,
    timestamp: Timestamp,
) -> Option<TradeOrder> {
    if !(market.price > 0.0) || delta_value == 0.0 {
        return None;
    }

    let quantity = round_to_precision(delta_value.abs() / market.price, market.quantity_precision);
    if quantity <= 0.0 {
        return None;
    }

    Some(TradeOrder {
        symbol: symbol.to_string(),
        side: Side::from_delta(delta_value),
        quantity,
        price: round_to_precision(market.price, market.price_precision),
        timestamp,
        class: OrderClass::Rebalance,
    })
}

/// Split an order whose notional exceeds `max_trade_value`.
///
/// Produces `ceil(notional / max_trade_value)` children spaced `interval`
/// apart, capped at one child per quantity step. Quantities are distributed
/// in whole precision units so the children sum to the parent exactly and
/// differ from one another by at most one unit.
///
/// # Arguments
/// * `order` - Parent order, quantity already on the precision grid
/// * `max_trade_value` - Maximum notional per child
/// * `interval` - Timestamp spacing between children
/// * `quantity_precision` - Decimal places of the symbol's quantity
///
/// # Returns
/// The children, or the parent alone if no split is needed
pub fn split_order(
    order: &TradeOrder,
    max_trade_value: f64,
    interval: Timestamp,
    quantity_precision: u32,
) -> Vec<TradeOrder> {
    let notional = order.notional();
    if !(max_trade_value > 0.0) || notional <= max_trade_value {
        return vec![order.clone()];
    }

    let factor = 10f64.powi(quantity_precision as i32);
    let units = (order.quantity.abs() * factor).round() as u64;
    let wanted = (notional / max_trade_value).ceil() as u64;
    let parts = wanted.min(units).max(1);
    if parts < wanted {
        debug!(
            symbol = %order.symbol,
            wanted,
            parts,
            "split limited by quantity precision"
        );
    }

    let base = units / parts;
    let remainder = units % parts;

    let mut children = Vec::with_capacity(parts as usize);
    let mut timestamp = order.timestamp;
    for i in 0..parts {
        let child_units = base + u64::from(i < remainder);
        children.push(TradeOrder {
            quantity: child_units as f64 / factor,
            timestamp,
            ..order.clone()
        });
        timestamp += interval;
    }
    children
}
