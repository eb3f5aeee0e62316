//! Configuration for the analytics components.
//!
//! Each component owns a small config struct with a `Default` impl and a
//! `validate()` method. [`AnalyticsConfig`] groups them so the whole set can be
//! loaded from one TOML document:
//!
//! ```toml
//! [monte_carlo]
//! n_simulations = 5000
//! time_horizon = 252
//!
//! [metrics]
//! risk_free_rate = 0.03
//!
//! [rebalance]
//! strategy = "risk_parity"
//! rebalance_threshold = 0.02
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{QuantError, Result};
use super::types::Timestamp;
use crate::portfolio::monte_carlo::MonteCarloConfig;
use crate::portfolio::optimizer::OptimizerConfig;

/// Annual risk-free rate used by Sharpe, Sortino and Treynor ratios (2 %).
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

/// Trading periods per year used to de-annualize the risk-free rate and to
/// annualize return and volatility.
pub const DEFAULT_PERIODS_PER_YEAR: f64 = 252.0;

/// Confidence level for historical VaR/CVaR.
pub const DEFAULT_VAR_CONFIDENCE: f64 = 0.95;

/// Settings for [`crate::metrics::PortfolioMetricsCalculator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Annual risk-free rate.
    pub risk_free_rate: f64,
    /// Return periods per year.
    pub periods_per_year: f64,
    /// VaR confidence level in (0, 1).
    pub var_confidence: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            periods_per_year: DEFAULT_PERIODS_PER_YEAR,
            var_confidence: DEFAULT_VAR_CONFIDENCE,
        }
    }
}

impl MetricsConfig {
    /// Set the annual risk-free rate.
    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    /// Risk-free rate for a single return period.
    #[inline]
    pub fn per_period_risk_free(&self) -> f64 {
        self.risk_free_rate / self.periods_per_year
    }

    pub fn validate(&self) -> Result<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(QuantError::invalid_config("risk_free_rate must be finite"));
        }
        if !(self.periods_per_year > 0.0) {
            return Err(QuantError::invalid_config("periods_per_year must be positive"));
        }
        if !(self.var_confidence > 0.0 && self.var_confidence < 1.0) {
            return Err(QuantError::invalid_config(format!(
                "var_confidence must be in (0, 1), got {}",
                self.var_confidence
            )));
        }
        Ok(())
    }
}

/// How the rebalancer derives its target allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    EqualWeight,
    RiskParity,
    MinimumVariance,
    MaximumSharpe,
    Momentum,
    Dynamic,
}

/// Rebalancing parameters, supplied by the caller and immutable per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    pub strategy: RebalanceStrategy,
    /// Maximum tolerated |target - current| weight drift before trading.
    pub rebalance_threshold: f64,
    /// Trades with a smaller absolute value are dropped.
    pub min_trade_value: f64,
    /// Trades with a larger notional are split into child orders.
    pub max_trade_value: f64,
    /// Commission as fraction of notional.
    pub commission_rate: f64,
    /// Commission floor per order.
    pub min_commission: f64,
    /// Coefficient of the square-root market impact model.
    pub slippage_factor: f64,
    /// Spacing between child orders of a split trade, in seconds.
    pub trade_interval_secs: u64,
    pub auto_rebalance: bool,
    /// Period of the auto-rebalance timer, in seconds.
    pub auto_rebalance_interval_secs: u64,
    /// Return periods used to score momentum.
    pub momentum_lookback: usize,
    /// Annualized volatility above which the dynamic strategy turns defensive.
    pub regime_volatility_threshold: f64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            strategy: RebalanceStrategy::EqualWeight,
            rebalance_threshold: 0.05,
            min_trade_value: 10.0,
            max_trade_value: 10_000.0,
            commission_rate: 0.001,
            min_commission: 1.0,
            slippage_factor: 0.1,
            trade_interval_secs: 60,
            auto_rebalance: false,
            auto_rebalance_interval_secs: 86_400,
            momentum_lookback: 20,
            regime_volatility_threshold: 0.25,
        }
    }
}

impl RebalanceConfig {
    /// Set the target allocation strategy.
    pub fn with_strategy(mut self, strategy: RebalanceStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set min/max trade values.
    pub fn with_trade_bounds(mut self, min_value: f64, max_value: f64) -> Self {
        self.min_trade_value = min_value;
        self.max_trade_value = max_value;
        self
    }

    /// Child order spacing in timestamp units.
    #[inline]
    pub fn trade_interval(&self) -> Timestamp {
        self.trade_interval_secs as i64 * 1_000_000_000
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.rebalance_threshold) {
            return Err(QuantError::invalid_config(format!(
                "rebalance_threshold must be in [0, 1], got {}",
                self.rebalance_threshold
            )));
        }
        if self.min_trade_value < 0.0 {
            return Err(QuantError::invalid_config("min_trade_value must be non-negative"));
        }
        if !(self.max_trade_value > 0.0) {
            return Err(QuantError::invalid_config("max_trade_value must be positive"));
        }
        if self.max_trade_value < self.min_trade_value {
            return Err(QuantError::invalid_config(format!(
                "max_trade_value ({}) is below min_trade_value ({})",
                self.max_trade_value, self.min_trade_value
            )));
        }
        if self.commission_rate < 0.0 || self.min_commission < 0.0 {
            return Err(QuantError::invalid_config("commission settings must be non-negative"));
        }
        if self.slippage_factor < 0.0 {
            return Err(QuantError::invalid_config("slippage_factor must be non-negative"));
        }
        if self.auto_rebalance && self.auto_rebalance_interval_secs == 0 {
            return Err(QuantError::invalid_config(
                "auto_rebalance_interval_secs must be positive when auto_rebalance is enabled",
            ));
        }
        if self.momentum_lookback == 0 {
            return Err(QuantError::invalid_config("momentum_lookback must be at least 1"));
        }
        Ok(())
    }
}

/// All component settings in one document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub monte_carlo: MonteCarloConfig,
    pub metrics: MetricsConfig,
    pub optimizer: OptimizerConfig,
    pub rebalance: RebalanceConfig,
}

impl AnalyticsConfig {
    /// Parse and validate a TOML document. Missing sections take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnalyticsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.monte_carlo.validate()?;
        self.metrics.validate()?;
        self.optimizer.validate()?;
        self.rebalance.validate()
    }
}
