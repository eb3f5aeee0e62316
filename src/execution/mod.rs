//! Rebalance planning, costing and scheduling for folioquant.

pub mod costs;
pub mod orders;
pub mod rebalancer;
pub mod scheduler;

pub use costs::{CostModel, TradeCost};
pub use rebalancer::{PortfolioRebalancer, RebalanceMetrics, RebalanceResult};
pub use scheduler::{AutoRebalanceHandle, AutoRebalancer, PortfolioFeed, RebalanceExecutor, SingleFlight};
