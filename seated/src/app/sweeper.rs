//! Periodic waitlist expiry.
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
//! let handle = ExpirySweeper::spawn(engine, config.sweep_interval(), shutdown_rx);
//! // ...
//! shutdown_tx.send(())?;
//! handle.await?;
//! ```

use super::waitlist::WaitlistEngine;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Background task running [`WaitlistEngine::expire_stale_entries`] on a
/// fixed interval until shutdown.
pub struct ExpirySweeper;

impl ExpirySweeper {
    /// Spawns the sweep loop on the current tokio runtime.
    ///
    /// The first sweep runs immediately. Ticks missed while a sweep is slow are
    /// skipped, not replayed. The loop ends when `shutdown` receives a value or
    /// its sender is dropped.
    #[must_use]
    pub fn spawn(
        engine: WaitlistEngine,
        every: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval = ?every, "Waitlist expiry sweeper started");

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        info!("Waitlist expiry sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        match engine.expire_stale_entries().await {
                            Ok(report) => debug!(
                                expired = report.expired,
                                promoted = report.promoted,
                                "Sweep complete"
                            ),
                            Err(error) => warn!(%error, "Sweep failed"),
                        }
                        let pruned = engine.prune_locks();
                        if pruned > 0 {
                            debug!(pruned, "Pruned idle event locks");
                        }
                    }
                }
            }
        })
    }
}
