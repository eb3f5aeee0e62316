//! Performance and risk metrics for folioquant.

pub mod drawdown;
pub mod portfolio;
pub mod stats;

pub use drawdown::DrawdownTracker;
pub use portfolio::{BenchmarkMetrics, PortfolioMetrics, PortfolioMetricsCalculator, StrategyReturns};
pub use stats::CorrelationMatrix;
