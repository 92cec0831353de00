// src/scheduler.rs

//! # Control Loop Scheduler
//!
//! Drives [`Autopilot::tick`] from a `tokio` task at the configured
//! period. Late ticks are skipped rather than bunched up. Each actuation
//! request a tick produces runs in its own task so the loop never waits on
//! the vendor SDK.
//!
//! Stopping is deterministic: [`stop`](ControlLoopScheduler::stop) signals
//! the loop, which aborts any in-flight flight requests, and waits for it to
//! exit. An aborted request only loses its completion handling; the vendor
//! call itself has already been issued. Authority releases are the
//! exception: they are drained, so stopping never strands the session
//! mid-release.

use crate::autopilot::{ActuationRequest, Autopilot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

/// Handle on a running control loop.
pub struct ControlLoopScheduler {
    autopilot: Arc<Autopilot>,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ControlLoopScheduler {
    /// Spawns the control loop on the current runtime.
    pub fn start(autopilot: Arc<Autopilot>) -> Self {
        let period = autopilot.config().period;
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(run(autopilot.clone(), period, stop_rx));
        tracing::info!(?period, "control loop started");

        Self {
            autopilot,
            stop_tx,
            handle,
        }
    }

    /// The autopilot being driven.
    pub fn autopilot(&self) -> &Arc<Autopilot> {
        &self.autopilot
    }

    /// Whether the loop task is still running.
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stops ticking and waits for the loop to exit.
    pub async fn stop(self) -> Arc<Autopilot> {
        let _ = self.stop_tx.send(());
        if let Err(err) = self.handle.await {
            tracing::error!(%err, "control loop task failed");
        }
        tracing::info!("control loop stopped");
        self.autopilot
    }

    /// Stops the loop, then tears the autopilot down.
    pub async fn shutdown(self) {
        let autopilot = self.stop().await;
        autopilot.shutdown().await;
    }
}

async fn run(autopilot: Arc<Autopilot>, period: Duration, mut stop: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();
    let mut releases = JoinSet::new();

    loop {
        tokio::select! {
            _ = &mut stop => break,
            now = interval.tick() => {
                for request in autopilot.tick(now) {
                    let tasks = match request {
                        ActuationRequest::ReleaseAuthority => &mut releases,
                        _ => &mut in_flight,
                    };
                    let autopilot = autopilot.clone();
                    tasks.spawn(async move { autopilot.settle(vec![request]).await });
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                log_join(joined);
            }
            Some(joined) = releases.join_next(), if !releases.is_empty() => {
                log_join(joined);
            }
        }
    }

    if !in_flight.is_empty() {
        tracing::debug!(pending = in_flight.len(), "aborting in-flight actuation requests");
        in_flight.abort_all();
    }
    if !releases.is_empty() {
        tracing::debug!(pending = releases.len(), "waiting for authority release");
    }
    while let Some(joined) = releases.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(err) = joined {
        if !err.is_cancelled() {
            tracing::error!(%err, "actuation task failed");
        }
    }
}
