//! Collector Manager
//!
//! Drives every registered collector on a fixed interval. Lifecycle is
//! Idle → Running → Stopped; a stopped manager cannot be started again.
//!
//! Collectors are dispatched one after another within a tick. Each pass runs
//! in its own task so that a panicking collector is reported instead of
//! taking the scheduler down, but the loop awaits it before starting the
//! next one, so no background work piles up when a pass outlives the
//! interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Collector;
use crate::error::{Error, Result};
use crate::metrics::{get_or_register_gauge, naming, Registry, TICK_INTERVAL_SECS};

// =============================================================================
// Configuration
// =============================================================================

/// Scheduler timing
///
/// Rate metrics are always ticked every [`TICK_INTERVAL_SECS`] seconds, the
/// cadence their smoothing constants are derived for.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Period between collection passes
    pub collect_interval: Duration,

    rate_tick_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl ManagerConfig {
    pub fn new(collect_interval: Duration) -> Self {
        Self {
            collect_interval,
            rate_tick_interval: Duration::from_secs(TICK_INTERVAL_SECS as u64),
        }
    }

    /// Default timing with a collection period of `seconds`
    pub fn from_seconds(seconds: u64) -> Self {
        Self::new(Duration::from_secs(seconds))
    }

    /// Period between EWMA/meter ticks
    pub fn rate_tick_interval(&self) -> Duration {
        self.rate_tick_interval
    }

    /// Faster rate ticks so tests need not wait 5 s
    #[cfg(test)]
    pub(crate) fn with_rate_tick(mut self, interval: Duration) -> Self {
        self.rate_tick_interval = interval;
        self
    }
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle state of a [`CollectorManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Idle,
    Running,
    Stopped,
}

impl ManagerState {
    fn as_str(&self) -> &'static str {
        match self {
            ManagerState::Idle => "idle",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
        }
    }
}

/// Completion handle of a stopped scheduling loop
#[derive(Debug)]
pub struct ShutdownHandle {
    handle: Option<JoinHandle<()>>,
}

impl ShutdownHandle {
    /// Wait until the loop has exited.
    ///
    /// A pass that was in flight when stop was requested runs to completion
    /// first.
    pub async fn wait(self) -> Result<()> {
        match self.handle {
            Some(handle) => handle
                .await
                .map_err(|e| Error::Internal(format!("Collector loop failed: {}", e))),
            None => Ok(()),
        }
    }

    /// True once the loop has exited (or was never running)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Periodic scheduler over a set of collectors
pub struct CollectorManager {
    config: ManagerConfig,
    base_registry: Arc<dyn Registry>,
    collectors: Vec<Arc<dyn Collector>>,
    state: ManagerState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CollectorManager {
    /// Create an idle manager.
    ///
    /// `base_registry` is the registry collectors write into; rate metrics in
    /// it are ticked by the loop and collector panics are counted in it.
    pub fn new(config: ManagerConfig, base_registry: Arc<dyn Registry>) -> Self {
        Self {
            config,
            base_registry,
            collectors: Vec::new(),
            state: ManagerState::Idle,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn base_registry(&self) -> &Arc<dyn Registry> {
        &self.base_registry
    }

    /// Prefixes of the registered collectors, in dispatch order
    pub fn prefixes(&self) -> Vec<&str> {
        self.collectors.iter().map(|c| c.prefix()).collect()
    }

    /// Append a collector. Only takes effect before [`start`](Self::start).
    pub fn register_collector(&mut self, collector: Arc<dyn Collector>) {
        if self.state != ManagerState::Idle {
            warn!(
                prefix = collector.prefix(),
                state = self.state.as_str(),
                "Ignoring collector registered after start"
            );
            return;
        }
        info!(prefix = collector.prefix(), "Registered collector");
        self.collectors.push(collector);
    }

    pub fn register_collectors<I>(&mut self, collectors: I)
    where
        I: IntoIterator<Item = Arc<dyn Collector>>,
    {
        for collector in collectors {
            self.register_collector(collector);
        }
    }

    /// Spawn the scheduling loop and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != ManagerState::Idle {
            return Err(Error::ManagerState {
                action: "start",
                state: self.state.as_str(),
            });
        }

        info!(
            collectors = self.collectors.len(),
            interval = ?self.config.collect_interval,
            "Starting collector manager"
        );

        let collectors: Arc<[Arc<dyn Collector>]> = self.collectors.clone().into();
        let task = tokio::spawn(run_loop(
            collectors,
            Arc::clone(&self.base_registry),
            self.config.clone(),
            self.cancel.clone(),
        ));

        self.task = Some(task);
        self.state = ManagerState::Running;
        Ok(())
    }

    /// Signal the loop to exit and return a handle to await its completion.
    ///
    /// Does not block. Calling it again (or on a manager that never started)
    /// returns an already-finished handle.
    pub fn stop(&mut self) -> ShutdownHandle {
        match self.state {
            ManagerState::Running => info!("Stopping collector manager"),
            ManagerState::Idle => debug!("Stop requested before start"),
            ManagerState::Stopped => debug!("Collector manager already stopped"),
        }

        self.cancel.cancel();
        self.state = ManagerState::Stopped;
        ShutdownHandle {
            handle: self.task.take(),
        }
    }
}

impl Drop for CollectorManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for CollectorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorManager")
            .field("config", &self.config)
            .field("collectors", &self.prefixes())
            .field("state", &self.state)
            .finish()
    }
}

// =============================================================================
// Scheduling Loop
// =============================================================================

async fn run_loop(
    collectors: Arc<[Arc<dyn Collector>]>,
    base_registry: Arc<dyn Registry>,
    config: ManagerConfig,
    cancel: CancellationToken,
) {
    let now = Instant::now();
    let mut collect_tick = interval_at(now + config.collect_interval, config.collect_interval);
    collect_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut rate_tick = interval_at(now + config.rate_tick_interval, config.rate_tick_interval);
    rate_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Collector manager started");

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                info!("Collector manager stopped");
                return;
            }
            _ = rate_tick.tick() => {
                base_registry.each(&mut |_, metric| metric.tick());
            }
            _ = collect_tick.tick() => {
                collect_all(&collectors, base_registry.as_ref()).await;
            }
        }
    }
}

/// One tick: every collector, in order
async fn collect_all(collectors: &[Arc<dyn Collector>], base_registry: &dyn Registry) {
    for collector in collectors {
        let c = Arc::clone(collector);
        let pass = tokio::spawn(async move { c.collect().await });

        if let Err(e) = pass.await {
            let prefix = collector.prefix();
            error!(prefix = prefix, error = %e, "Collector pass aborted");

            let name = naming::join(prefix, "error.panic");
            match get_or_register_gauge(base_registry, &name) {
                Ok(gauge) => gauge.inc(1),
                Err(e) => warn!(prefix = prefix, error = %e, "Panic gauge unavailable"),
            }
        }
    }
}
