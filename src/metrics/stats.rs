//! Descriptive statistics over return slices.
//!
//! Variances and covariances use the population (divide-by-n) convention.

use tracing::warn;

use crate::core::error::{QuantError, Result};

/// Variances below this are treated as zero.
pub const VARIANCE_EPSILON: f64 = 1e-18;

/// Arithmetic mean. Returns 0 for an empty slice.
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
#[inline]
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Population covariance of two equally long slices.
pub fn covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let (ma, mb) = (mean(&a[..n]), mean(&b[..n]));
    a[..n]
        .iter()
        .zip(&b[..n])
        .map(|(x, y)| (x - ma) * (y - mb))
        .sum::<f64>()
        / n as f64
}

/// Pearson correlation that refuses zero-variance inputs.
pub fn checked_correlation(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(QuantError::length_mismatch(a.len(), b.len()));
    }
    if a.len() < 2 {
        return Err(QuantError::insufficient_data(2, a.len()));
    }
    let (va, vb) = (variance(a), variance(b));
    if va <= VARIANCE_EPSILON || vb <= VARIANCE_EPSILON {
        return Err(QuantError::division_by_zero("correlation of zero-variance series"));
    }
    if a == b {
        return Ok(1.0);
    }
    Ok((covariance(a, b) / (va.sqrt() * vb.sqrt())).clamp(-1.0, 1.0))
}

/// Pearson correlation with the zero-variance case resolved to 0.
///
/// Returns the correlation and whether the guard fired.
pub fn correlation(a: &[f64], b: &[f64]) -> Result<(f64, bool)> {
    match checked_correlation(a, b) {
        Ok(c) => Ok((c, false)),
        Err(QuantError::DivisionByZeroGuarded { .. }) => Ok((0.0, true)),
        Err(e) => Err(e),
    }
}

/// Correlation matrix with the pairs whose correlation was guarded.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    pub matrix: Vec<Vec<f64>>,
    pub degenerate_pairs: Vec<(usize, usize)>,
}

/// Symmetric Pearson correlation matrix with an exact unit diagonal.
pub fn correlation_matrix(columns: &[Vec<f64>]) -> Result<CorrelationMatrix> {
    let n = columns.len();
    let mut matrix = vec![vec![0.0; n]; n];
    let mut degenerate_pairs = Vec::new();

    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let (c, guarded) = correlation(&columns[i], &columns[j])?;
            if guarded {
                warn!(i, j, "zero-variance series in correlation, reporting 0");
                degenerate_pairs.push((i, j));
            }
            matrix[i][j] = c;
            matrix[j][i] = c;
        }
    }

    Ok(CorrelationMatrix {
        matrix,
        degenerate_pairs,
    })
}

/// Population covariance matrix.
pub fn covariance_matrix(columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = columns.len();
    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let c = covariance(&columns[i], &columns[j]);
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    cov
}

/// Weighted sum of columns: one portfolio return per row index.
pub fn weighted_returns(columns: &[Vec<f64>], weights: &[f64]) -> Vec<f64> {
    let len = columns.first().map_or(0, Vec::len);
    (0..len)
        .map(|t| {
            columns
                .iter()
                .zip(weights)
                .map(|(col, w)| w * col[t])
                .sum()
        })
        .collect()
}

/// Matrix-vector product `m * v`.
pub fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    m.iter()
        .map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum())
        .collect()
}

/// Quadratic form `w' Σ w`.
pub fn quadratic_form(cov: &[Vec<f64>], w: &[f64]) -> f64 {
    mat_vec(cov, w).iter().zip(w).map(|(a, b)| a * b).sum()
}

/// Downside deviation relative to `target` (root mean square of shortfalls).
pub fn downside_deviation(values: &[f64], target: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = values
        .iter()
        .map(|v| (v - target).min(0.0).powi(2))
        .sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Historical VaR and CVaR at `confidence`, both reported as positive losses.
///
/// Returns are sorted ascending; the VaR point is `sorted[floor((1 - c) * n)]`
/// and CVaR is the mean of every return at or below it.
pub fn historical_var_cvar(returns: &[f64], confidence: f64) -> Result<(f64, f64)> {
    if returns.len() < 2 {
        return Err(QuantError::insufficient_data(2, returns.len()));
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let idx = (((1.0 - confidence) * n as f64).floor() as usize).min(n - 1);
    let threshold = sorted[idx];

    let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= threshold).collect();
    Ok((-threshold, -mean(&tail)))
}

/// Risk contribution of each asset: `w_i (Σw)_i / w'Σw`. Sums to 1.
pub fn risk_contributions(cov: &[Vec<f64>], weights: &[f64]) -> Vec<f64> {
    let marginal = mat_vec(cov, weights);
    let total = quadratic_form(cov, weights);
    if total <= VARIANCE_EPSILON {
        return vec![0.0; weights.len()];
    }
    weights
        .iter()
        .zip(&marginal)
        .map(|(w, m)| w * m / total)
        .collect()
}
