//! Loop runner and execution orchestrator.
//!
//! Sequences the scripted phases of one workload replay: navigate, login,
//! setup, then N loop iterations with snapshots at configured boundaries.
//! Everything is sequential; every driver interaction is a suspension
//! point, and no two snapshots are ever in flight at once.

use crate::error::Result;
use crate::steps;
use async_trait::async_trait;
use leakhound_config::{AppConfig, Phase};
use leakhound_driver::{Driver, HeapSnapshotStream};
use log::warn;
use std::time::Duration;
use tokio::time::sleep;

/// Pause between finishing the login phase and re-navigating, giving the
/// app time to persist session state.
const POST_LOGIN_DELAY: Duration = Duration::from_millis(1000);

/// Receiver for snapshots taken at loop boundaries.
///
/// The orchestrator awaits each delivery before continuing; a failure is
/// logged and the replay carries on.
#[async_trait]
pub trait SnapshotSink: Send {
    async fn accept(&mut self, snapshot: Box<dyn HeapSnapshotStream>) -> anyhow::Result<()>;
}

pub(crate) struct Workload<'a> {
    pub driver: &'a mut dyn Driver,
    pub config: &'a AppConfig,
}

impl Workload<'_> {
    /// Run every step of `phase` in order.
    ///
    /// With `is_loop`, additionally wait for step 0's predicate after the
    /// last step: the loop is only complete once the app is back in its
    /// quiescent initial state, which is what makes snapshots taken here
    /// comparable across iterations.
    pub async fn run_loop(
        &mut self,
        phase: Phase,
        is_loop: bool,
        snapshot_at_end: bool,
    ) -> Result<Option<Box<dyn HeapSnapshotStream>>> {
        let len = self.config.steps(phase).len();
        if len == 0 {
            return Ok(None);
        }
        for index in 0..len {
            steps::next_step(self.driver, self.config, phase, index).await?;
        }
        if is_loop {
            steps::wait_until_true(self.driver, self.config, phase, 0, None).await?;
        }
        if snapshot_at_end {
            let snapshot = self.driver.take_heap_snapshot().await?;
            return Ok(Some(snapshot));
        }
        Ok(None)
    }

    /// Replay the workload once: navigate, optional login, setup, then
    /// `iterations` loop iterations.
    ///
    /// When `sink` is present, a snapshot is taken after every
    /// `iterations_per_snapshot`-th iteration and delivered to it; with
    /// `snapshot_on_first`, one extra snapshot is taken before the first
    /// iteration, at loop-step-0 quiescence. Deliveries are awaited in
    /// order; sink failures are logged, never fatal.
    pub async fn execute(
        &mut self,
        iterations: u32,
        run_login: bool,
        mut sink: Option<&mut dyn SnapshotSink>,
        iterations_per_snapshot: u32,
        snapshot_on_first: bool,
    ) -> Result<()> {
        let iterations_per_snapshot = iterations_per_snapshot.max(1);

        self.driver.navigate_to(&self.config.url).await?;
        if run_login {
            self.run_loop(Phase::Login, false, false).await?;
            sleep(POST_LOGIN_DELAY).await;
            self.driver.navigate_to(&self.config.url).await?;
        }
        self.run_loop(Phase::Setup, false, false).await?;

        if snapshot_on_first {
            if let Some(s) = sink.as_mut() {
                steps::wait_until_true(self.driver, self.config, Phase::Loop, 0, None).await?;
                let snapshot = self.driver.take_heap_snapshot().await?;
                deliver(&mut **s, snapshot).await;
            }
        }

        for i in 0..iterations {
            let snapshot_run = sink.is_some() && (i + 1) % iterations_per_snapshot == 0;
            let snapshot = self.run_loop(Phase::Loop, true, snapshot_run).await?;
            if let (Some(s), Some(snapshot)) = (sink.as_mut(), snapshot) {
                deliver(&mut **s, snapshot).await;
            }
        }
        Ok(())
    }
}

async fn deliver(sink: &mut dyn SnapshotSink, snapshot: Box<dyn HeapSnapshotStream>) {
    if let Err(err) = sink.accept(snapshot).await {
        warn!("snapshot sink failed: {err:#}");
    }
}
