//! Background sweeper for expired donations
//!
//! Listings already treat overdue donations as expired. The sweeper writes that status down so
//! the stored data catches up.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::Lifecycle;

/// Default time between two sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Start sweeping on the runtime until `shutdown` is cancelled
pub fn spawn(lifecycle: Lifecycle, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(lifecycle, every, shutdown))
}

async fn run(lifecycle: Lifecycle, every: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::debug!("Expiry sweeper started, every {} seconds", every.as_secs());

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => sweep(&lifecycle).await,
        }
    }

    tracing::debug!("Expiry sweeper stopped");
}

/// Run a single sweep, failures are logged and retried on the next tick
async fn sweep(lifecycle: &Lifecycle) {
    match lifecycle.expire_overdue().await {
        Ok(0) => {}
        Ok(count) => tracing::debug!("Marked {count} donation(s) as expired"),
        Err(err) => tracing::error!("Failed to expire donations: {err}"),
    }
}
