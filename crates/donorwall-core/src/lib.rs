//! Core domain model for the donor wall: upstream records, snapshot envelopes,
//! and the derived donor/summary views.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod codec;
pub mod money;

pub const CRATE_NAME: &str = "donorwall-core";

/// One homogeneous record set fetched from the fundraising platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Contacts,
    Transactions,
    Plans,
    Campaigns,
}

impl Collection {
    /// Sync order. Campaigns are stored but never joined.
    pub const ALL: [Collection; 4] = [
        Collection::Contacts,
        Collection::Transactions,
        Collection::Plans,
        Collection::Campaigns,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Contacts => "contacts",
            Collection::Transactions => "transactions",
            Collection::Plans => "plans",
            Collection::Campaigns => "campaigns",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(deserialize_with = "codec::id")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Contact {
    /// `"first last"` trimmed, or `"Anonymous"` when both parts are blank.
    pub fn display_name(&self) -> String {
        let joined = format!(
            "{} {}",
            self.first_name.as_deref().unwrap_or_default(),
            self.last_name.as_deref().unwrap_or_default()
        );
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            "Anonymous".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// A single donation. Amounts are minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(deserialize_with = "codec::id")]
    pub id: String,
    #[serde(default, deserialize_with = "codec::minor_units")]
    pub amount: i64,
    #[serde(default, deserialize_with = "codec::opt_id")]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_minor_units")]
    pub fee: Option<i64>,
    #[serde(default, deserialize_with = "codec::opt_minor_units")]
    pub net_amount: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_id")]
    pub campaign_id: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    #[serde(alias = "annually", alias = "annual")]
    Yearly,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Paused,
    #[serde(alias = "canceled")]
    Cancelled,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringPlan {
    #[serde(deserialize_with = "codec::id")]
    pub id: String,
    #[serde(default, deserialize_with = "codec::minor_units")]
    pub amount: i64,
    #[serde(default)]
    pub interval: PlanInterval,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default, deserialize_with = "codec::opt_id")]
    pub contact_id: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl RecurringPlan {
    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    #[serde(deserialize_with = "codec::id")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_minor_units")]
    pub goal: Option<i64>,
    #[serde(default, deserialize_with = "codec::opt_minor_units")]
    pub raised: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "codec::opt_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Whether a stored collection came from the live API or the synthetic generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataOrigin {
    Live,
    Synthetic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMeta {
    pub total: usize,
    pub page: u32,
    pub per_page: usize,
    pub origin: Option<DataOrigin>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Default for SnapshotMeta {
    fn default() -> Self {
        Self {
            total: 0,
            page: 1,
            per_page: 0,
            origin: None,
            fetched_at: None,
        }
    }
}

/// `{data: [...], meta: {...}}` wrapper persisted for every raw collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEnvelope<T> {
    pub data: Vec<T>,
    #[serde(default)]
    pub meta: SnapshotMeta,
}

impl<T> SnapshotEnvelope<T> {
    /// All pages merged into one: `page = 1`, `per_page = total = data.len()`.
    pub fn merged(data: Vec<T>, origin: DataOrigin, fetched_at: DateTime<Utc>) -> Self {
        let total = data.len();
        Self {
            data,
            meta: SnapshotMeta {
                total,
                page: 1,
                per_page: total,
                origin: Some(origin),
                fetched_at: Some(fetched_at),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorStats {
    pub total_contributions: i64,
    pub recurring_contributions: i64,
    pub contribution_count: usize,
    pub active_plans: usize,
    pub is_recurring: bool,
}

/// A contact joined with its transactions and active recurring plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedDonor {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "isRecurring")]
    pub is_recurring: bool,
    #[serde(rename = "recurringFrequency")]
    pub recurring_frequency: Option<PlanInterval>,
    pub stats: DonorStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Syncing,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::Syncing => "syncing",
            SyncPhase::Completed => "completed",
            SyncPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global aggregates persisted under the `summary` snapshot type.
///
/// `total_amount_dollars` is presentation only; every aggregate is computed on
/// `total_amount_cents`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub total_donors: usize,
    pub total_transactions: usize,
    pub total_amount_cents: i64,
    #[serde(default)]
    pub total_amount_dollars: f64,
    pub active_recurring_plans: usize,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    pub sync_status: String,
    #[serde(default)]
    pub sync_errors: Option<Vec<String>>,
}

impl SyncSummary {
    /// Zeroed summary served when no snapshot has ever been written.
    pub fn empty(phase: SyncPhase, now: DateTime<Utc>) -> Self {
        Self {
            total_donors: 0,
            total_transactions: 0,
            total_amount_cents: 0,
            total_amount_dollars: 0.0,
            active_recurring_plans: 0,
            last_updated: Some(now),
            sync_status: phase.as_str().to_string(),
            sync_errors: None,
        }
    }
}

/// `None` for an empty error list, so the wire form carries `null`.
pub fn errors_or_none(errors: &[String]) -> Option<Vec<String>> {
    if errors.is_empty() {
        None
    } else {
        Some(errors.to_vec())
    }
}
