//! Return sampling from trade history and equity curves.

use crate::core::error::{QuantError, Result};
use crate::core::timeseries::{ReturnSeries, TimeSeries};
use crate::core::types::{Timestamp, TradeRecord};

/// Converts raw history into return series.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnsSampler;

impl ReturnsSampler {
    /// Per-trade returns `profit / entry_price`, ordered by exit time.
    pub fn from_trades(trades: &[TradeRecord]) -> Result<ReturnSeries> {
        if trades.len() < 2 {
            return Err(QuantError::insufficient_data(2, trades.len()));
        }

        let pairs = trades
            .iter()
            .map(|t| {
                if !(t.entry_price > 0.0) {
                    return Err(QuantError::invalid_parameter(format!(
                        "entry price must be positive, got {}",
                        t.entry_price
                    )));
                }
                Ok((t.exit_time, t.profit / t.entry_price))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TimeSeries::from_pairs(pairs))
    }

    /// Period returns of an undated equity curve.
    pub fn from_equity_curve(equity: &[f64]) -> Result<ReturnSeries> {
        Self::from_dated_equity(&TimeSeries::from_values(equity.to_vec()))
    }

    /// Period returns of a dated equity curve, stamped with the later date of
    /// each pair.
    pub fn from_dated_equity(equity: &TimeSeries<f64>) -> Result<ReturnSeries> {
        equity.require(2)?;

        let mut timestamps = Vec::with_capacity(equity.len() - 1);
        let mut values = Vec::with_capacity(equity.len() - 1);
        for i in 1..equity.len() {
            let prev = equity.values[i - 1];
            if prev == 0.0 {
                return Err(QuantError::invalid_parameter(format!(
                    "equity is zero at index {}, return undefined",
                    i - 1
                )));
            }
            timestamps.push(equity.timestamps[i]);
            values.push((equity.values[i] - prev) / prev);
        }

        Ok(TimeSeries { timestamps, values })
    }

    /// Compound returns falling into the same fixed-width period bucket,
    /// `Π(1 + r) - 1`.
    ///
    /// Each bucket is stamped with its start, so per-trade series of different
    /// strategies line up on a shared per-period axis.
    pub fn aggregate_by_period(series: &ReturnSeries, period: Timestamp) -> Result<ReturnSeries> {
        if period <= 0 {
            return Err(QuantError::invalid_parameter("aggregation period must be positive"));
        }

        let mut timestamps: Vec<Timestamp> = Vec::new();
        let mut values: Vec<f64> = Vec::new();
        for (ts, r) in series.iter() {
            let bucket = ts.div_euclid(period) * period;
            match timestamps.last() {
                Some(&last) if last == bucket => {
                    if let Some(v) = values.last_mut() {
                        *v = (1.0 + *v) * (1.0 + r) - 1.0;
                    }
                }
                _ => {
                    timestamps.push(bucket);
                    values.push(*r);
                }
            }
        }

        Ok(TimeSeries { timestamps, values })
    }
}
