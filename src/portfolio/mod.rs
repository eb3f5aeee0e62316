//! Return sampling, simulation and allocation for folioquant.

pub mod allocation;
pub mod monte_carlo;
pub mod optimizer;
pub mod returns;

pub use allocation::{MarketRegime, TargetAllocator};
pub use monte_carlo::{MonteCarloConfig, MonteCarloEngine, MonteCarloResult};
pub use optimizer::{
    OptimizationObjective, OptimizationResult, OptimizerConfig, PortfolioConstraints,
    PortfolioOptimizer, RiskMeasure,
};
pub use returns::ReturnsSampler;
