//! Read-side contract consumed by an HTTP layer: summary, donor listing,
//! manual trigger, sync status and health.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use donorwall_core::{EnrichedDonor, SyncSummary};
use donorwall_storage::SnapshotKind;
use donorwall_sync::{
    SnapshotSet, SyncOrchestrator, SyncService, SyncStatus, SyncTrigger, TriggerResponse,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

pub mod auth;

pub use auth::{AuthError, Authenticator, StaticTokens, TokenVerifier};

pub const CRATE_NAME: &str = "donorwall-query";
pub const SERVICE_NAME: &str = "donor-wall-sync";

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonorPage {
    pub donors: Vec<EnrichedDonor>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_status: String,
    pub upstream_configured: bool,
}

#[derive(Clone)]
pub struct QuerySurface {
    orchestrator: Arc<SyncOrchestrator>,
    auth: Authenticator,
}

impl QuerySurface {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, auth: Authenticator) -> Self {
        Self { orchestrator, auth }
    }

    /// Surface over a running service, with enforcement taken from its
    /// configured environment.
    pub fn for_service(service: &SyncService, verifier: Option<Arc<dyn TokenVerifier>>) -> Self {
        Self::new(
            Arc::clone(service.orchestrator()),
            Authenticator::for_environment(&service.config().environment, verifier),
        )
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Gate for every operation except [`Self::health`].
    pub async fn authorize(&self, authorization: Option<&str>) -> Result<(), QueryError> {
        self.auth.authorize(authorization).await?;
        Ok(())
    }

    /// Latest stored summary. Without one, a summary is reconciled from the
    /// latest raw snapshots; with no data at all, or totals that cannot be
    /// computed, a zero summary.
    pub async fn get_summary(&self) -> SyncSummary {
        let store = self.orchestrator.snapshots();
        if let Some(summary) = store.get_latest::<SyncSummary>(SnapshotKind::Summary).await {
            return summary;
        }

        let status = self.orchestrator.status().await;
        let set = SnapshotSet::load_lenient(store).await;
        if set.is_empty() {
            debug!("no snapshots yet, serving zero summary");
            return SyncSummary::empty(status.state, Utc::now());
        }
        let errors = status.errors.unwrap_or_default();
        match self
            .orchestrator
            .reconciler()
            .summarize(&set, status.state, &errors, Utc::now())
        {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "cannot reconcile summary, serving zero summary");
                SyncSummary::empty(status.state, Utc::now())
            }
        }
    }

    /// One page of enriched donors in contact order. `limit` is at least 1.
    pub async fn get_donors(&self, limit: usize, offset: usize) -> DonorPage {
        let limit = limit.max(1);
        let set = SnapshotSet::load_lenient(self.orchestrator.snapshots()).await;
        let donors = self
            .orchestrator
            .reconciler()
            .enrich(&set)
            .unwrap_or_else(|err| {
                warn!(error = %err, "cannot enrich donors, serving empty listing");
                Vec::new()
            });
        let total = donors.len();

        DonorPage {
            donors: donors.into_iter().skip(offset).take(limit).collect(),
            total,
            page: offset / limit + 1,
            per_page: limit,
            has_more: offset.saturating_add(limit) < total,
        }
    }

    pub async fn trigger_sync(&self) -> TriggerResponse {
        let response = self.orchestrator.trigger(SyncTrigger::Manual).await;
        info!(?response, "manual sync requested");
        response
    }

    pub async fn get_sync_status(&self) -> SyncStatus {
        self.orchestrator.status().await
    }

    /// Liveness report; never gated.
    pub async fn health(&self) -> HealthReport {
        let status = self.orchestrator.status().await;
        HealthReport {
            status: "healthy",
            service: SERVICE_NAME,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
            last_sync: status.last_sync_time,
            sync_status: status.state.to_string(),
            upstream_configured: self.orchestrator.upstream_configured(),
        }
    }
}
