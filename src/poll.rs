//! Periodic status polling.
//!
//! Three background tasks keep the engine in sync with the printer:
//! position (`M114`) and temperature (`M105`) on fixed intervals, and mesh
//! info (`G29 S0`) which repeats only until the grid size is known.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::LevelerConfig;
use crate::error::Result;

/// Query issued by a poll task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    /// Position report.
    Position,
    /// Temperature report.
    Temperature,
    /// Mesh grid size and Z search height.
    MeshInfo,
}

/// Something poll tasks can send queries to.
pub trait PollTarget: Send + Sync {
    /// Sends the query for `kind`.
    ///
    /// Returns `Ok(false)` when there is nothing left to ask (mesh info once
    /// the geometry is known). Connection errors are retried on the next tick;
    /// any other error stops the task.
    fn poll(&self, kind: PollKind) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;
}

/// Poll intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    /// Position query period.
    pub position: Duration,
    /// Temperature query period.
    pub temperature: Duration,
    /// Delay between mesh info retries.
    pub mesh_retry: Duration,
}

impl From<&LevelerConfig> for PollIntervals {
    fn from(config: &LevelerConfig) -> Self {
        Self {
            position: config.position_interval,
            temperature: config.temperature_interval,
            mesh_retry: config.mesh_retry_interval,
        }
    }
}

/// Owns the running poll tasks.
#[derive(Default)]
pub struct PollScheduler {
    tasks: Vec<JoinHandle<()>>,
}

impl PollScheduler {
    /// Creates an idle scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts all three polls, replacing any running ones.
    ///
    /// Each poll fires immediately and then on its own schedule.
    pub fn start(&mut self, target: Arc<dyn PollTarget>, intervals: PollIntervals) {
        self.stop();
        tracing::debug!("starting polls: {intervals:?}");

        self.tasks.push(tokio::spawn(run_periodic(
            Arc::clone(&target),
            PollKind::Position,
            intervals.position,
        )));
        self.tasks.push(tokio::spawn(run_periodic(
            Arc::clone(&target),
            PollKind::Temperature,
            intervals.temperature,
        )));
        self.tasks
            .push(tokio::spawn(run_mesh_retry(target, intervals.mesh_retry)));
    }

    /// Aborts all poll tasks.
    pub fn stop(&mut self) {
        if !self.tasks.is_empty() {
            tracing::debug!("stopping polls");
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    /// Number of poll tasks still running.
    #[must_use]
    pub fn active(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }
}

impl Drop for PollScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_periodic(target: Arc<dyn PollTarget>, kind: PollKind, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match target.poll(kind).await {
            Ok(_) => {}
            Err(e) if e.is_connection() => {
                tracing::warn!("{kind:?} poll failed: {e}");
            }
            Err(e) => {
                tracing::debug!("{kind:?} poll stopped: {e}");
                return;
            }
        }
    }
}

async fn run_mesh_retry(target: Arc<dyn PollTarget>, retry: Duration) {
    loop {
        match target.poll(PollKind::MeshInfo).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("mesh geometry known, mesh info poll done");
                return;
            }
            Err(e) if e.is_connection() => {
                tracing::warn!("mesh info poll failed: {e}");
            }
            Err(e) => {
                tracing::debug!("mesh info poll stopped: {e}");
                return;
            }
        }
        tokio::time::sleep(retry).await;
    }
}
