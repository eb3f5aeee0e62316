//! Error types for folioquant.

use thiserror::Error;

/// Result type alias for folioquant operations.
pub type Result<T> = std::result::Result<T, QuantError>;

/// Error types for the analytics core.
#[derive(Error, Debug)]
pub enum QuantError {
    /// Too few observations for the requested statistic.
    #[error("Insufficient data: need at least {required} observations, got {available}")]
    InsufficientData { required: usize, available: usize },

    /// A benchmark-relative metric was requested without a benchmark series.
    #[error("Missing benchmark series for {metric}")]
    MissingBenchmark { metric: String },

    /// A zero-variance denominator was detected in a strict computation.
    #[error("Division by zero guarded in {context}")]
    DivisionByZeroGuarded { context: String },

    /// The optimizer hit its iteration limit.
    #[error("Optimization did not converge after {iterations} iterations")]
    OptimizationDidNotConverge { iterations: usize },

    /// No weight vector satisfies every constraint.
    #[error("Infeasible constraints: {message}")]
    InfeasibleConstraints { message: String },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Invalid input value.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Data length mismatch between arrays.
    #[error("Data length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Symbol present in a portfolio but absent from market data.
    #[error("No market data for symbol {symbol}")]
    UnknownSymbol { symbol: String },

    /// The execution collaborator rejected a rebalance plan.
    #[error("Execution failed: {message}")]
    Execution { message: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

impl QuantError {
    /// Create an insufficient data error.
    pub fn insufficient_data(required: usize, available: usize) -> Self {
        Self::InsufficientData {
            required,
            available,
        }
    }

    /// Create a missing benchmark error.
    pub fn missing_benchmark(metric: impl Into<String>) -> Self {
        Self::MissingBenchmark {
            metric: metric.into(),
        }
    }

    /// Create a guarded division by zero error.
    pub fn division_by_zero(context: impl Into<String>) -> Self {
        Self::DivisionByZeroGuarded {
            context: context.into(),
        }
    }

    /// Create an infeasible constraints error.
    pub fn infeasible(message: impl Into<String>) -> Self {
        Self::InfeasibleConstraints {
            message: message.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a length mismatch error.
    pub fn length_mismatch(expected: usize, actual: usize) -> Self {
        Self::LengthMismatch { expected, actual }
    }

    /// Create an unknown symbol error.
    pub fn unknown_symbol(symbol: impl Into<String>) -> Self {
        Self::UnknownSymbol {
            symbol: symbol.into(),
        }
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }
}
