//! One sync cycle at a time: fetch every collection, persist each snapshot,
//! reconcile, persist the summary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use donorwall_core::{
    errors_or_none, Campaign, Collection, Contact, DataOrigin, RecurringPlan, SnapshotEnvelope,
    SyncPhase, SyncSummary, Transaction,
};
use donorwall_storage::{SnapshotKind, SnapshotStore, StorageError, StoredSnapshot};
use donorwall_upstream::{UpstreamClient, UpstreamRecord};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::reconcile::{ReconcileError, Reconciler, SnapshotSet};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to store {kind} snapshot: {source}")]
    Store {
        kind: SnapshotKind,
        #[source]
        source: StorageError,
    },
    #[error("failed to reconcile snapshots: {0}")]
    Reconcile(#[source] StorageError),
    #[error("failed to aggregate totals: {0}")]
    Totals(#[from] ReconcileError),
    #[error("sync cycle aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Startup,
    Scheduled,
    Manual,
}

/// Snapshot written during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleSnapshot {
    pub kind: String,
    pub key: String,
    pub content_hash: String,
    pub byte_size: usize,
}

impl CycleSnapshot {
    fn new(kind: SnapshotKind, stored: StoredSnapshot) -> Self {
        Self {
            kind: kind.to_string(),
            key: stored.key,
            content_hash: stored.content_hash,
            byte_size: stored.byte_size,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub trigger: SyncTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshots: Vec<CycleSnapshot>,
    /// Collections served from the synthetic dataset this cycle.
    pub fallbacks: Vec<Collection>,
    pub summary: SyncSummary,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TriggerResponse {
    Accepted { run_id: Uuid },
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub state: SyncPhase,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub next_scheduled_time: Option<DateTime<Utc>>,
    pub errors: Option<Vec<String>>,
    pub current_run_id: Option<Uuid>,
}

/// Proof that the caller holds the single in-flight slot. Hand it to
/// [`SyncOrchestrator::execute`], which releases the slot whether the cycle
/// completes, fails or panics. Dropping it unexecuted leaves the phase at
/// `syncing`.
#[must_use]
#[derive(Debug)]
pub struct CycleTicket {
    run_id: Uuid,
    trigger: SyncTrigger,
    started_at: DateTime<Utc>,
}

impl CycleTicket {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

#[derive(Debug)]
struct SyncState {
    phase: SyncPhase,
    last_sync_time: Option<DateTime<Utc>>,
    next_scheduled_time: Option<DateTime<Utc>>,
    errors: Vec<String>,
    current_run: Option<Uuid>,
}

pub struct SyncOrchestrator {
    upstream: UpstreamClient,
    snapshots: Arc<SnapshotStore>,
    reconciler: Reconciler,
    state: Mutex<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(upstream: UpstreamClient, snapshots: Arc<SnapshotStore>) -> Self {
        Self {
            upstream,
            snapshots,
            reconciler: Reconciler::new(),
            state: Mutex::new(SyncState {
                phase: SyncPhase::Idle,
                last_sync_time: None,
                next_scheduled_time: None,
                errors: Vec::new(),
                current_run: None,
            }),
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn reconciler(&self) -> Reconciler {
        self.reconciler
    }

    pub fn upstream_configured(&self) -> bool {
        self.upstream.is_configured()
    }

    /// Claims the in-flight slot. `None` while another cycle is syncing.
    pub async fn try_begin(&self, trigger: SyncTrigger) -> Option<CycleTicket> {
        let mut state = self.state.lock().await;
        if state.phase == SyncPhase::Syncing {
            return None;
        }
        let ticket = CycleTicket {
            run_id: Uuid::new_v4(),
            trigger,
            started_at: Utc::now(),
        };
        state.phase = SyncPhase::Syncing;
        state.errors.clear();
        state.current_run = Some(ticket.run_id);
        Some(ticket)
    }

    /// Runs a cycle to completion and waits for it.
    pub async fn run_cycle(self: &Arc<Self>, trigger: SyncTrigger) -> Result<CycleOutcome, SyncError> {
        match self.try_begin(trigger).await {
            Some(ticket) => self.execute(ticket).await.map(CycleOutcome::Completed),
            None => {
                info!(?trigger, "sync cycle already running, skipping");
                Ok(CycleOutcome::AlreadyRunning)
            }
        }
    }

    /// Claims the slot synchronously and runs the cycle in the background.
    pub async fn trigger(self: &Arc<Self>, trigger: SyncTrigger) -> TriggerResponse {
        let Some(ticket) = self.try_begin(trigger).await else {
            info!(?trigger, "sync cycle already running, trigger rejected");
            return TriggerResponse::AlreadyRunning;
        };
        let run_id = ticket.run_id;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = this.execute(ticket).await {
                warn!(%run_id, error = %err, "background sync cycle failed");
            }
        });
        TriggerResponse::Accepted { run_id }
    }

    /// Runs the cycle steps on their own task, so a panic surfaces as a
    /// failed cycle and the in-flight slot is always released.
    pub async fn execute(self: &Arc<Self>, ticket: CycleTicket) -> Result<CycleReport, SyncError> {
        let span = info_span!("sync_cycle", run_id = %ticket.run_id, trigger = ?ticket.trigger);
        let this = Arc::clone(self);
        let steps = tokio::spawn(
            async move {
                info!("sync cycle started");
                this.run_steps(&ticket).await
            }
            .instrument(span.clone()),
        );

        async move {
            let result = match steps.await {
                Ok(result) => result,
                Err(join) => Err(SyncError::Aborted(join.to_string())),
            };

            let mut state = self.state.lock().await;
            state.current_run = None;
            match result {
                Ok(report) => {
                    state.phase = SyncPhase::Completed;
                    state.last_sync_time = Some(report.finished_at);
                    info!(
                        snapshots = report.snapshots.len(),
                        fallbacks = report.fallbacks.len(),
                        donors = report.summary.total_donors,
                        "sync cycle completed"
                    );
                    Ok(report)
                }
                Err(err) => {
                    state.phase = SyncPhase::Failed;
                    state.errors.push(format!("Sync Error: {err}"));
                    error!(error = %err, "sync cycle failed");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_steps(&self, ticket: &CycleTicket) -> Result<CycleReport, SyncError> {
        let mut snapshots = Vec::with_capacity(Collection::ALL.len() + 1);
        let mut fallbacks = Vec::new();

        snapshots.push(self.sync_collection::<Contact>(&mut fallbacks).await?);
        snapshots.push(self.sync_collection::<Transaction>(&mut fallbacks).await?);
        snapshots.push(self.sync_collection::<RecurringPlan>(&mut fallbacks).await?);
        snapshots.push(self.sync_collection::<Campaign>(&mut fallbacks).await?);

        let set = SnapshotSet::load(&self.snapshots)
            .await
            .map_err(SyncError::Reconcile)?;
        let errors = self.state.lock().await.errors.clone();
        let summary = self
            .reconciler
            .summarize(&set, SyncPhase::Completed, &errors, Utc::now())?;

        let kind = SnapshotKind::Summary;
        let stored = self
            .snapshots
            .put(kind, &summary)
            .await
            .map_err(|source| SyncError::Store { kind, source })?;
        snapshots.push(CycleSnapshot::new(kind, stored));

        Ok(CycleReport {
            run_id: ticket.run_id,
            trigger: ticket.trigger,
            started_at: ticket.started_at,
            finished_at: Utc::now(),
            snapshots,
            fallbacks,
            summary,
        })
    }

    async fn sync_collection<R: UpstreamRecord>(
        &self,
        fallbacks: &mut Vec<Collection>,
    ) -> Result<CycleSnapshot, SyncError> {
        let collection = R::COLLECTION;
        let outcome = self.upstream.fetch::<R>().await;
        if let Some(note) = outcome.error_note(collection) {
            self.state.lock().await.errors.push(note);
        }
        if outcome.origin() == DataOrigin::Synthetic {
            fallbacks.push(collection);
        }

        let origin = outcome.origin();
        let envelope = SnapshotEnvelope::merged(outcome.into_records(), origin, Utc::now());
        let kind = SnapshotKind::from(collection);
        let stored = self
            .snapshots
            .put(kind, &envelope)
            .await
            .map_err(|source| SyncError::Store { kind, source })?;
        Ok(CycleSnapshot::new(kind, stored))
    }

    pub async fn phase(&self) -> SyncPhase {
        self.state.lock().await.phase
    }

    pub async fn status(&self) -> SyncStatus {
        let state = self.state.lock().await;
        SyncStatus {
            state: state.phase,
            last_sync_time: state.last_sync_time,
            next_scheduled_time: state.next_scheduled_time,
            errors: errors_or_none(&state.errors),
            current_run_id: state.current_run,
        }
    }

    pub async fn next_scheduled_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.next_scheduled_time
    }

    pub async fn set_next_scheduled_time(&self, at: Option<DateTime<Utc>>) {
        self.state.lock().await.next_scheduled_time = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donorwall_storage::{MemoryBlobStore, SnapshotConfig};
    use donorwall_upstream::synthetic;

    fn synthetic_orchestrator() -> (Arc<SyncOrchestrator>, Arc<MemoryBlobStore>) {
        let blobs = Arc::new(MemoryBlobStore::new());
        let store = Arc::new(SnapshotStore::new(blobs.clone(), SnapshotConfig::default()));
        let orchestrator = Arc::new(SyncOrchestrator::new(UpstreamClient::synthetic_only(), store));
        (orchestrator, blobs)
    }

    #[tokio::test]
    async fn starts_idle_with_empty_status() {
        let (orchestrator, _) = synthetic_orchestrator();
        let status = orchestrator.status().await;
        assert_eq!(status.state, SyncPhase::Idle);
        assert_eq!(status.last_sync_time, None);
        assert_eq!(status.errors, None);
        assert_eq!(status.current_run_id, None);
    }

    #[tokio::test]
    async fn synthetic_cycle_writes_five_snapshots() {
        let (orchestrator, blobs) = synthetic_orchestrator();
        let CycleOutcome::Completed(report) =
            orchestrator.run_cycle(SyncTrigger::Manual).await.unwrap()
        else {
            panic!("expected a completed cycle");
        };

        assert_eq!(blobs.len().await, 5);
        let kinds = report.snapshots.iter().map(|s| s.kind.as_str()).collect::<Vec<_>>();
        assert_eq!(kinds, ["contacts", "transactions", "plans", "campaigns", "summary"]);
        assert_eq!(report.fallbacks, Collection::ALL.to_vec());

        // A missing credential is not an error.
        assert_eq!(report.summary.sync_errors, None);
        assert_eq!(report.summary.sync_status, "completed");
        assert_eq!(report.summary.total_donors, synthetic::CONTACT_COUNT);
        assert_eq!(report.summary.total_transactions, synthetic::TRANSACTION_COUNT);
        assert_eq!(
            report.summary.total_amount_cents,
            synthetic::TRANSACTION_AMOUNT * synthetic::TRANSACTION_COUNT as i64
        );
        assert_eq!(report.summary.active_recurring_plans, synthetic::PLAN_COUNT);

        let status = orchestrator.status().await;
        assert_eq!(status.state, SyncPhase::Completed);
        assert_eq!(status.last_sync_time, Some(report.finished_at));
    }

    #[tokio::test]
    async fn second_claim_is_rejected_while_syncing() {
        let (orchestrator, blobs) = synthetic_orchestrator();
        let ticket = orchestrator.try_begin(SyncTrigger::Scheduled).await.unwrap();

        assert!(orchestrator.try_begin(SyncTrigger::Manual).await.is_none());
        assert_eq!(
            orchestrator.trigger(SyncTrigger::Manual).await,
            TriggerResponse::AlreadyRunning
        );
        assert!(matches!(
            orchestrator.run_cycle(SyncTrigger::Manual).await.unwrap(),
            CycleOutcome::AlreadyRunning
        ));
        assert_eq!(orchestrator.status().await.current_run_id, Some(ticket.run_id()));

        orchestrator.execute(ticket).await.unwrap();
        assert_eq!(blobs.len().await, 5);
        assert!(orchestrator.try_begin(SyncTrigger::Manual).await.is_some());
    }

    #[tokio::test]
    async fn next_scheduled_time_is_reported_in_status() {
        let (orchestrator, _) = synthetic_orchestrator();
        let at = Utc::now();
        orchestrator.set_next_scheduled_time(Some(at)).await;
        assert_eq!(orchestrator.status().await.next_scheduled_time, Some(at));
    }
}
