//! folioquant - portfolio quantitative analytics core.
//!
//! This crate provides:
//! - Return sampling from trade history and equity curves
//! - Bootstrap Monte Carlo equity simulation with confidence bands
//! - Portfolio risk/performance metrics (Sharpe, Sortino, VaR/CVaR, correlation)
//! - A constrained allocation optimizer (max Sharpe, min risk, max return, risk parity)
//! - Cost-aware rebalancing with precision rounding and order splitting
//! - A single-flight periodic auto-rebalancer

pub mod core;
pub mod execution;
pub mod metrics;
pub mod portfolio;

pub use crate::core::{AnalyticsConfig, MetricsConfig, QuantError, RebalanceConfig, RebalanceStrategy, Result};
pub use execution::{AutoRebalancer, PortfolioRebalancer, RebalanceResult};
pub use metrics::{PortfolioMetrics, PortfolioMetricsCalculator, StrategyReturns};
pub use portfolio::{
    MonteCarloConfig, MonteCarloEngine, MonteCarloResult, OptimizationObjective, OptimizationResult,
    PortfolioConstraints, PortfolioOptimizer, ReturnsSampler, RiskMeasure,
};
