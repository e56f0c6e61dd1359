//! Sync pipeline: upstream fetch, snapshot persistence, reconciliation and
//! the scheduler that drives it.

use std::sync::Arc;

use anyhow::{Context, Result};
use donorwall_storage::{FsBlobStore, SnapshotStore};
use donorwall_upstream::UpstreamClient;
use tokio_cron_scheduler::JobScheduler;
use tracing::info;

pub mod config;
pub mod orchestrator;
pub mod reconcile;
pub mod scheduler;

pub use config::SyncConfig;
pub use orchestrator::{
    CycleOutcome, CycleReport, CycleSnapshot, CycleTicket, SyncError, SyncOrchestrator, SyncStatus,
    SyncTrigger, TriggerResponse,
};
pub use reconcile::{ReconcileError, Reconciler, SnapshotSet};
pub use scheduler::{is_misfire, run_scheduled_tick, start_interval_scheduler};

pub const CRATE_NAME: &str = "donorwall-sync";

/// Wired-up orchestrator plus the config it was built from.
pub struct SyncService {
    config: SyncConfig,
    orchestrator: Arc<SyncOrchestrator>,
}

impl SyncService {
    pub fn new(config: SyncConfig) -> Result<Self> {
        let blobs = FsBlobStore::new(config.bucket_root());
        let snapshots = SnapshotStore::new(Arc::new(blobs), config.snapshots.clone());
        let upstream =
            UpstreamClient::from_config(&config.upstream).context("building upstream client")?;
        Ok(Self::with_parts(config, upstream, Arc::new(snapshots)))
    }

    pub fn with_parts(
        config: SyncConfig,
        upstream: UpstreamClient,
        snapshots: Arc<SnapshotStore>,
    ) -> Self {
        Self {
            config,
            orchestrator: Arc::new(SyncOrchestrator::new(upstream, snapshots)),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::new(SyncConfig::from_env())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// Kicks off the startup cycle in the background and, when enabled,
    /// starts the recurring scheduler.
    pub async fn start(&self) -> Result<Option<JobScheduler>> {
        info!(
            upstream_configured = self.orchestrator.upstream_configured(),
            bucket_root = %self.config.bucket_root().display(),
            "starting sync service"
        );
        self.orchestrator.trigger(SyncTrigger::Startup).await;

        if !self.config.scheduler_enabled {
            info!("sync scheduler disabled");
            return Ok(None);
        }
        let sched = start_interval_scheduler(
            Arc::clone(&self.orchestrator),
            self.config.sync_interval,
            self.config.misfire_grace,
        )
        .await?;
        Ok(Some(sched))
    }
}

pub async fn run_sync_once_from_env() -> Result<CycleOutcome> {
    let service = SyncService::from_env()?;
    service
        .orchestrator()
        .run_cycle(SyncTrigger::Manual)
        .await
        .context("sync cycle failed")
}
