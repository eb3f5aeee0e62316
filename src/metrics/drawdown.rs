//! Peak-to-trough drawdown tracking.
//!
//! All drawdowns here are fractions of the running peak (0.25 = 25 %).

/// Incremental drawdown tracker.
#[derive(Debug, Clone)]
pub struct DrawdownTracker {
    /// Running peak value.
    peak: f64,
    /// Maximum drawdown seen.
    max_drawdown: f64,
}

impl Default for DrawdownTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawdownTracker {
    /// Create a tracker with no peak yet; the first update sets it.
    pub fn new() -> Self {
        Self {
            peak: f64::NEG_INFINITY,
            max_drawdown: 0.0,
        }
    }

    /// Update with a new value.
    pub fn update(&mut self, value: f64) {
        if value >= self.peak {
            self.peak = value;
        } else if self.peak > 0.0 {
            self.max_drawdown = self.max_drawdown.max((self.peak - value) / self.peak);
        }
    }

    /// Maximum drawdown as fraction.
    #[inline]
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    #[inline]
    pub fn peak(&self) -> f64 {
        self.peak
    }
}

/// Maximum drawdown of a value path.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut tracker = DrawdownTracker::new();
    for &v in values {
        tracker.update(v);
    }
    tracker.max_drawdown()
}

/// Compound a return series into a value path starting at `start`.
///
/// The returned path has `returns.len() + 1` points.
pub fn compound(returns: &[f64], start: f64) -> Vec<f64> {
    let mut path = Vec::with_capacity(returns.len() + 1);
    let mut value = start;
    path.push(value);
    for r in returns {
        value *= 1.0 + r;
        path.push(value);
    }
    path
}

/// Maximum drawdown of the value path obtained by compounding `returns` from 1.
pub fn max_drawdown_from_returns(returns: &[f64]) -> f64 {
    max_drawdown(&compound(returns, 1.0))
}

/// Calmar ratio: return divided by maximum drawdown.
///
/// Without a drawdown the ratio is infinite for positive returns and 0
/// otherwise.
pub fn calmar_ratio(total_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown <= 0.0 {
        return if total_return > 0.0 { f64::INFINITY } else { 0.0 };
    }
    total_return / max_drawdown
}
