use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::orchestrator::{CycleOutcome, SyncOrchestrator, SyncTrigger};

/// A tick that fires later than `expected + grace` is dropped.
pub fn is_misfire(expected: DateTime<Utc>, fired_at: DateTime<Utc>, grace: Duration) -> bool {
    let grace =
        chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::days(365 * 100));
    fired_at.signed_duration_since(expected) > grace
}

fn after(at: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|step| at.checked_add_signed(step))
        .unwrap_or(at)
}

/// Registers the recurring sync job and starts the scheduler.
pub async fn start_interval_scheduler(
    orchestrator: Arc<SyncOrchestrator>,
    interval: Duration,
    misfire_grace: Duration,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;

    orchestrator
        .set_next_scheduled_time(Some(after(Utc::now(), interval)))
        .await;

    let job_orchestrator = Arc::clone(&orchestrator);
    let job = Job::new_repeated_async(interval, move |_uuid, _l| {
        let orchestrator = Arc::clone(&job_orchestrator);
        Box::pin(async move {
            run_scheduled_tick(&orchestrator, interval, misfire_grace).await;
        })
    })
    .with_context(|| format!("creating sync job every {}s", interval.as_secs()))?;
    sched.add(job).await.context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;

    info!(
        interval_secs = interval.as_secs(),
        misfire_grace_secs = misfire_grace.as_secs(),
        "sync scheduler started"
    );
    Ok(sched)
}

pub async fn run_scheduled_tick(
    orchestrator: &Arc<SyncOrchestrator>,
    interval: Duration,
    misfire_grace: Duration,
) {
    let fired_at = Utc::now();
    let expected = orchestrator.next_scheduled_time().await.unwrap_or(fired_at);
    orchestrator
        .set_next_scheduled_time(Some(after(fired_at, interval)))
        .await;

    if is_misfire(expected, fired_at, misfire_grace) {
        warn!(%expected, %fired_at, "scheduled sync missed its grace window, skipping");
        return;
    }

    match orchestrator.run_cycle(SyncTrigger::Scheduled).await {
        Ok(CycleOutcome::Completed(report)) => {
            info!(run_id = %report.run_id, "scheduled sync finished");
        }
        Ok(CycleOutcome::AlreadyRunning) => {}
        Err(err) => error!(error = %err, "scheduled sync failed"),
    }
}
