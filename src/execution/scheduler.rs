//! Periodic auto-rebalancing.
//!
//! A background tokio task wakes on a fixed interval, pulls a snapshot from a
//! [`PortfolioFeed`], plans a rebalance and hands the whole
//! [`RebalanceResult`] to a [`RebalanceExecutor`]. Cycles never overlap, and
//! stopping the task does not wait for an in-flight cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::error::{QuantError, Result};
use crate::core::types::{MarketData, PortfolioSnapshot, Timestamp};
use crate::metrics::portfolio::StrategyReturns;

use super::rebalancer::{PortfolioRebalancer, RebalanceResult};

/// Source of portfolio state for each cycle.
pub trait PortfolioFeed: Send + Sync {
    fn snapshot(&self) -> Result<PortfolioSnapshot>;

    fn market_data(&self) -> Result<MarketData>;

    /// Return history keyed by symbol. Empty by default.
    fn history(&self) -> Result<Vec<StrategyReturns>> {
        Ok(Vec::new())
    }
}

/// Receives complete trade plans.
#[async_trait]
pub trait RebalanceExecutor: Send + Sync {
    /// Execute the plan and resolve once it is confirmed.
    async fn execute(&self, plan: RebalanceResult) -> Result<()>;
}

/// Busy flag allowing at most one holder at a time.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag, or `None` if another holder has it.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                busy: Arc::clone(&self.busy),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the flag on drop, including when the cycle is cancelled.
#[derive(Debug)]
pub struct FlightGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Drives rebalance cycles for one portfolio.
pub struct AutoRebalancer<F, E> {
    rebalancer: PortfolioRebalancer,
    feed: F,
    executor: E,
    flight: SingleFlight,
}

impl<F, E> AutoRebalancer<F, E>
where
    F: PortfolioFeed + 'static,
    E: RebalanceExecutor + 'static,
{
    pub fn new(rebalancer: PortfolioRebalancer, feed: F, executor: E) -> Self {
        Self {
            rebalancer,
            feed,
            executor,
            flight: SingleFlight::new(),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.flight.is_busy()
    }

    /// Run one cycle now.
    ///
    /// Returns `Ok(None)` if a cycle is already in flight. Plans without
    /// trades are not sent to the executor.
    pub async fn run_cycle(&self) -> Result<Option<RebalanceResult>> {
        let Some(_guard) = self.flight.try_acquire() else {
            debug!("rebalance cycle already in flight, skipping");
            return Ok(None);
        };

        let snapshot = self.feed.snapshot()?;
        let market = self.feed.market_data()?;
        let history = self.feed.history()?;
        let plan = self.rebalancer.rebalance(&snapshot, &market, &history, now_nanos())?;

        if !plan.is_empty() {
            self.executor.execute(plan.clone()).await?;
            info!(trades = plan.trades.len(), "rebalance plan executed");
        }
        Ok(Some(plan))
    }

    /// Spawn the periodic task. Requires `auto_rebalance` in the config.
    pub fn start(self: Arc<Self>) -> Result<AutoRebalanceHandle> {
        let config = self.rebalancer.config();
        if !config.auto_rebalance {
            return Err(QuantError::invalid_config("auto_rebalance is disabled"));
        }
        let period = Duration::from_secs(config.auto_rebalance_interval_secs);
        if period.is_zero() {
            return Err(QuantError::invalid_config("auto_rebalance_interval_secs must be positive"));
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_cycle().await {
                            warn!(error = %e, "auto-rebalance cycle failed");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("auto-rebalance task stopped");
        });

        Ok(AutoRebalanceHandle { stop: stop_tx, task })
    }
}

/// Handle to a running auto-rebalance task.
#[derive(Debug)]
pub struct AutoRebalanceHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl AutoRebalanceHandle {
    /// Stop immediately, cancelling any in-flight cycle.
    pub fn stop(self) {
        let _ = self.stop.send(true);
        self.task.abort();
    }

    /// Signal the task and wait for the current cycle to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

fn now_nanos() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as Timestamp)
        .unwrap_or_default()
}
