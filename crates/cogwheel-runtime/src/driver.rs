//! Periodic driver: the outer loop that paces [`Scheduler::tick`].
//!
//! The scheduler itself never sleeps.  [`run_periodic`] calls `tick`, then
//! waits out whatever is left of the control period, so a slow tick shortens
//! the following wait and an overrun removes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::pacing::{CycleStats, pace_delay};
use crate::scheduler::Scheduler;

/// Drive `scheduler` until `shutdown` is set, then return the tick stats.
///
/// ```no_run
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicBool;
/// use cogwheel_runtime::{Scheduler, SchedulerConfig, driver::run_periodic};
///
/// # async fn demo() {
/// let mut scheduler = Scheduler::new(SchedulerConfig::default());
/// let shutdown = Arc::new(AtomicBool::new(false));
/// let stats = run_periodic(&mut scheduler, shutdown).await;
/// println!("{} ticks", stats.ticks);
/// # }
/// ```
pub async fn run_periodic(scheduler: &mut Scheduler, shutdown: Arc<AtomicBool>) -> CycleStats {
    let period = scheduler.config().period();
    info!(period_ms = period.as_millis() as u64, "periodic driver started");

    while !shutdown.load(Ordering::SeqCst) {
        let report = scheduler.tick();
        for (id, err) in &report.failed {
            warn!(command = %id, error = %err, "dropped from the active set");
        }
        tokio::time::sleep(pace_delay(period, report.elapsed)).await;
    }

    let stats = scheduler.stats().clone();
    info!(
        ticks = stats.ticks,
        overruns = stats.overruns,
        avg_us = stats.average().as_micros() as u64,
        "periodic driver stopped"
    );
    stats
}
