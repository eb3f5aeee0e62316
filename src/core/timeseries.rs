//! Time-indexed return series and date-axis alignment.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::error::{QuantError, Result};
use super::types::Timestamp;

/// A time-indexed series of values, kept in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries<T> {
    /// Timestamps for each value.
    pub timestamps: Vec<Timestamp>,
    /// Values.
    pub values: Vec<T>,
}

/// Per-period fractional returns.
pub type ReturnSeries = TimeSeries<f64>;

impl<T: Clone> TimeSeries<T> {
    /// Create a new time series from parallel vectors.
    ///
    /// Timestamps must be non-decreasing; use [`TimeSeries::from_pairs`] for
    /// unsorted input.
    pub fn new(timestamps: Vec<Timestamp>, values: Vec<T>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(QuantError::length_mismatch(timestamps.len(), values.len()));
        }
        if timestamps.windows(2).any(|w| w[1] < w[0]) {
            return Err(QuantError::invalid_parameter(
                "timestamps must be in chronological order",
            ));
        }
        Ok(Self { timestamps, values })
    }

    /// Create from values only, indexed 0..n.
    pub fn from_values(values: Vec<T>) -> Self {
        let timestamps = (0..values.len() as i64).collect();
        Self { timestamps, values }
    }

    /// Create from (timestamp, value) pairs in any order. Sorting is stable.
    pub fn from_pairs(mut pairs: Vec<(Timestamp, T)>) -> Self {
        pairs.sort_by_key(|(ts, _)| *ts);
        let (timestamps, values) = pairs.into_iter().unzip();
        Self { timestamps, values }
    }

    /// Get the length.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get value at index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    /// Slice of values.
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Iterator over (timestamp, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &T)> {
        self.timestamps.iter().copied().zip(self.values.iter())
    }
}

impl TimeSeries<f64> {
    /// Fail with `InsufficientData` unless at least `required` observations exist.
    pub fn require(&self, required: usize) -> Result<()> {
        if self.len() < required {
            return Err(QuantError::insufficient_data(required, self.len()));
        }
        Ok(())
    }

    /// Timestamp -> value lookup. Duplicate timestamps are summed.
    fn dense_map(&self) -> BTreeMap<Timestamp, f64> {
        let mut map = BTreeMap::new();
        for (ts, v) in self.iter() {
            *map.entry(ts).or_insert(0.0) += *v;
        }
        map
    }
}

/// Series re-indexed onto one shared, chronologically sorted date axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSeries {
    /// Union of all input timestamps, ascending.
    pub axis: Vec<Timestamp>,
    /// One row per input series, each of `axis.len()` values.
    pub columns: Vec<Vec<f64>>,
}

impl AlignedSeries {
    /// Number of dates on the shared axis.
    #[inline]
    pub fn len(&self) -> usize {
        self.axis.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.axis.is_empty()
    }
}

/// Align several return series onto the union of their dates.
///
/// A series without an observation on a date contributes a return of 0 for
/// that date.
pub fn align(series: &[&ReturnSeries]) -> AlignedSeries {
    let axis: Vec<Timestamp> = series
        .iter()
        .flat_map(|s| s.timestamps.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let columns = series
        .iter()
        .map(|s| {
            let dense = s.dense_map();
            axis.iter()
                .map(|ts| dense.get(ts).copied().unwrap_or(0.0))
                .collect()
        })
        .collect();

    AlignedSeries { axis, columns }
}
