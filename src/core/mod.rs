//! Core types and utilities for folioquant.

pub mod config;
pub mod error;
pub mod timeseries;
pub mod types;

pub use config::{AnalyticsConfig, MetricsConfig, RebalanceConfig, RebalanceStrategy};
pub use error::{QuantError, Result};
pub use timeseries::{align, AlignedSeries, ReturnSeries, TimeSeries};
pub use types::*;
