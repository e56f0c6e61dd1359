//! Joins the latest raw collections into enriched donors and global totals.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use donorwall_core::money::minor_to_major;
use donorwall_core::{
    errors_or_none, Collection, Contact, DonorStats, EnrichedDonor, RecurringPlan, SnapshotEnvelope,
    SyncPhase, SyncSummary, Transaction,
};
use donorwall_storage::{SnapshotKind, SnapshotStore, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{scope} overflows a 64-bit minor-unit total")]
    AmountOverflow { scope: String },
}

/// Sum of minor-unit amounts; `None` on overflow.
fn checked_total(amounts: impl IntoIterator<Item = i64>) -> Option<i64> {
    amounts
        .into_iter()
        .try_fold(0i64, |total, amount| total.checked_add(amount))
}

/// Latest contacts, transactions and plans as read back from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnapshotSet {
    pub contacts: Vec<Contact>,
    pub transactions: Vec<Transaction>,
    pub plans: Vec<RecurringPlan>,
}

impl SnapshotSet {
    /// Strict load: a malformed snapshot is an error, a missing one is empty.
    pub async fn load(store: &SnapshotStore) -> Result<Self, StorageError> {
        let contacts = store
            .try_latest::<SnapshotEnvelope<Contact>>(SnapshotKind::Collection(Collection::Contacts))
            .await?;
        let transactions = store
            .try_latest::<SnapshotEnvelope<Transaction>>(SnapshotKind::Collection(Collection::Transactions))
            .await?;
        let plans = store
            .try_latest::<SnapshotEnvelope<RecurringPlan>>(SnapshotKind::Collection(Collection::Plans))
            .await?;

        Ok(Self {
            contacts: contacts.map(|e| e.data).unwrap_or_default(),
            transactions: transactions.map(|e| e.data).unwrap_or_default(),
            plans: plans.map(|e| e.data).unwrap_or_default(),
        })
    }

    /// Read-path load: unreadable snapshots count as absent.
    pub async fn load_lenient(store: &SnapshotStore) -> Self {
        let contacts = store
            .get_latest::<SnapshotEnvelope<Contact>>(Collection::Contacts.into())
            .await;
        let transactions = store
            .get_latest::<SnapshotEnvelope<Transaction>>(Collection::Transactions.into())
            .await;
        let plans = store
            .get_latest::<SnapshotEnvelope<RecurringPlan>>(Collection::Plans.into())
            .await;

        Self {
            contacts: contacts.map(|e| e.data).unwrap_or_default(),
            transactions: transactions.map(|e| e.data).unwrap_or_default(),
            plans: plans.map(|e| e.data).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty() && self.transactions.is_empty() && self.plans.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Self
    }

    /// Distinct donor ids: every contact plus every contact referenced by a
    /// transaction, whether or not that contact is known.
    pub fn donor_ids(&self, set: &SnapshotSet) -> BTreeSet<String> {
        set.contacts
            .iter()
            .map(|c| c.id.clone())
            .chain(
                set.transactions
                    .iter()
                    .filter_map(|t| t.contact_id.clone()),
            )
            .collect()
    }

    /// One record per contact, in contact order. Plans keep their fetch
    /// order, so the first active plan decides the frequency.
    pub fn enrich(&self, set: &SnapshotSet) -> Result<Vec<EnrichedDonor>, ReconcileError> {
        let mut txns_by_contact: HashMap<&str, Vec<&Transaction>> = HashMap::new();
        for txn in &set.transactions {
            if let Some(contact_id) = txn.contact_id.as_deref() {
                txns_by_contact.entry(contact_id).or_default().push(txn);
            }
        }

        let mut plans_by_contact: HashMap<&str, Vec<&RecurringPlan>> = HashMap::new();
        for plan in set.plans.iter().filter(|p| p.is_active()) {
            if let Some(contact_id) = plan.contact_id.as_deref() {
                plans_by_contact.entry(contact_id).or_default().push(plan);
            }
        }

        set.contacts
            .iter()
            .map(|contact| -> Result<EnrichedDonor, ReconcileError> {
                let txns = txns_by_contact
                    .get(contact.id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let plans = plans_by_contact
                    .get(contact.id.as_str())
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let is_recurring = !plans.is_empty();
                let total_contributions = checked_total(txns.iter().map(|t| t.amount))
                    .ok_or_else(|| ReconcileError::AmountOverflow {
                        scope: format!("contributions of contact {}", contact.id),
                    })?;
                let recurring_contributions = checked_total(plans.iter().map(|p| p.amount))
                    .ok_or_else(|| ReconcileError::AmountOverflow {
                        scope: format!("recurring plans of contact {}", contact.id),
                    })?;

                Ok(EnrichedDonor {
                    id: contact.id.clone(),
                    name: contact.display_name(),
                    email: contact.email.clone(),
                    phone: contact.phone.clone(),
                    created_at: contact.created_at,
                    is_recurring,
                    recurring_frequency: plans.first().map(|p| p.interval),
                    stats: DonorStats {
                        total_contributions,
                        recurring_contributions,
                        contribution_count: txns.len(),
                        active_plans: plans.len(),
                        is_recurring,
                    },
                })
            })
            .collect()
    }

    /// Global aggregates. Pure in its inputs: the same set, errors, phase and
    /// `now` always produce the same summary.
    pub fn summarize(
        &self,
        set: &SnapshotSet,
        phase: SyncPhase,
        errors: &[String],
        now: DateTime<Utc>,
    ) -> Result<SyncSummary, ReconcileError> {
        let total_amount_cents = checked_total(set.transactions.iter().map(|t| t.amount))
            .ok_or_else(|| ReconcileError::AmountOverflow {
                scope: "transaction total".to_string(),
            })?;
        Ok(SyncSummary {
            total_donors: self.donor_ids(set).len(),
            total_transactions: set.transactions.len(),
            total_amount_cents,
            total_amount_dollars: minor_to_major(total_amount_cents),
            active_recurring_plans: set.plans.iter().filter(|p| p.is_active()).count(),
            last_updated: Some(now),
            sync_status: phase.as_str().to_string(),
            sync_errors: errors_or_none(errors),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use donorwall_core::{PlanInterval, PlanStatus};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().unwrap()
    }

    fn mk_contact(id: &str, first: &str) -> Contact {
        Contact {
            id: id.to_string(),
            first_name: Some(first.to_string()),
            last_name: Some("Tester".to_string()),
            email: Some(format!("{id}@example.com")),
            phone: None,
            created_at: None,
        }
    }

    fn mk_txn(id: &str, contact_id: &str, amount: i64) -> Transaction {
        Transaction {
            id: id.to_string(),
            amount,
            contact_id: Some(contact_id.to_string()),
            status: Some("succeeded".to_string()),
            fee: None,
            net_amount: None,
            method: None,
            campaign_id: None,
            created_at: None,
        }
    }

    fn mk_plan(id: &str, contact_id: &str, interval: PlanInterval, status: PlanStatus) -> RecurringPlan {
        RecurringPlan {
            id: id.to_string(),
            amount: 2_500,
            interval,
            status,
            contact_id: Some(contact_id.to_string()),
            created_at: None,
        }
    }

    fn fixture() -> SnapshotSet {
        SnapshotSet {
            contacts: vec![mk_contact("c1", "Ada"), mk_contact("c2", "Grace"), mk_contact("c3", "Alan")],
            transactions: vec![
                mk_txn("t1", "c1", 10_000),
                mk_txn("t2", "c1", 5_000),
                mk_txn("t3", "c2", 2_500),
                mk_txn("t4", "c4", 1_000),
                mk_txn("t5", "c4", 1_000),
            ],
            plans: vec![mk_plan("p1", "c1", PlanInterval::Monthly, PlanStatus::Active)],
        }
    }

    #[test]
    fn donors_include_contacts_referenced_only_by_transactions() {
        let reconciler = Reconciler::new();
        let set = fixture();
        let summary = reconciler.summarize(&set, SyncPhase::Completed, &[], now()).unwrap();

        assert_eq!(summary.total_donors, 4);
        assert_eq!(summary.total_transactions, 5);
        assert_eq!(summary.active_recurring_plans, 1);
        assert_eq!(summary.sync_status, "completed");
        assert_eq!(summary.sync_errors, None);

        // Only known contacts are enriched.
        let donors = reconciler.enrich(&set).unwrap();
        assert_eq!(donors.len(), 3);
        assert_eq!(donors.iter().filter(|d| d.is_recurring).count(), 1);
    }

    #[test]
    fn per_donor_stats_follow_transactions_and_active_plans() {
        let donors = Reconciler::new().enrich(&fixture()).unwrap();
        let ada = &donors[0];
        assert_eq!(ada.name, "Ada Tester");
        assert_eq!(ada.stats.total_contributions, 15_000);
        assert_eq!(ada.stats.contribution_count, 2);
        assert_eq!(ada.stats.recurring_contributions, 2_500);
        assert_eq!(ada.stats.active_plans, 1);
        assert_eq!(ada.recurring_frequency, Some(PlanInterval::Monthly));

        let alan = &donors[2];
        assert_eq!(alan.stats.total_contributions, 0);
        assert_eq!(alan.stats.contribution_count, 0);
        assert!(!alan.is_recurring);
        assert_eq!(alan.recurring_frequency, None);
    }

    #[test]
    fn inactive_plans_are_ignored_and_first_active_plan_sets_frequency() {
        let mut set = fixture();
        set.plans = vec![
            mk_plan("p0", "c2", PlanInterval::Weekly, PlanStatus::Cancelled),
            mk_plan("p1", "c2", PlanInterval::Quarterly, PlanStatus::Active),
            mk_plan("p2", "c2", PlanInterval::Monthly, PlanStatus::Active),
        ];
        let reconciler = Reconciler::new();
        let donors = reconciler.enrich(&set).unwrap();
        let grace = &donors[1];
        assert_eq!(grace.recurring_frequency, Some(PlanInterval::Quarterly));
        assert_eq!(grace.stats.active_plans, 2);
        assert_eq!(grace.stats.recurring_contributions, 5_000);

        let summary = reconciler.summarize(&set, SyncPhase::Completed, &[], now()).unwrap();
        assert_eq!(summary.active_recurring_plans, 2);
    }

    #[test]
    fn totals_are_summed_in_minor_units() {
        let set = SnapshotSet {
            contacts: vec![mk_contact("c1", "Ada")],
            transactions: vec![
                mk_txn("t1", "c1", 10_000),
                mk_txn("t2", "c1", 9_671),
                mk_txn("t3", "c1", 2_500),
            ],
            plans: vec![],
        };
        let summary = Reconciler::new().summarize(&set, SyncPhase::Completed, &[], now()).unwrap();
        assert_eq!(summary.total_amount_cents, 22_171);
        assert_eq!(summary.total_amount_dollars, 221.71);
    }

    #[test]
    fn summarizing_twice_is_byte_identical() {
        let reconciler = Reconciler::new();
        let set = fixture();
        let errors = vec!["API Error (plans): upstream returned HTTP 500".to_string()];
        let first = reconciler.summarize(&set, SyncPhase::Completed, &errors, now()).unwrap();
        let second = reconciler.summarize(&set, SyncPhase::Completed, &errors, now()).unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(first.sync_errors, Some(errors));
    }

    #[test]
    fn empty_set_produces_zero_summary() {
        let summary = Reconciler::new()
            .summarize(&SnapshotSet::default(), SyncPhase::Idle, &[], now())
            .unwrap();
        assert_eq!(summary, SyncSummary::empty(SyncPhase::Idle, now()));
    }

    #[test]
    fn overflowing_totals_are_errors_not_wrapped_sums() {
        let set = SnapshotSet {
            contacts: vec![mk_contact("c1", "Ada")],
            transactions: vec![mk_txn("t1", "c1", i64::MAX), mk_txn("t2", "c1", i64::MAX)],
            plans: vec![],
        };
        let reconciler = Reconciler::new();
        let err = reconciler
            .summarize(&set, SyncPhase::Completed, &[], now())
            .unwrap_err();
        assert_eq!(err.to_string(), "transaction total overflows a 64-bit minor-unit total");

        let err = reconciler.enrich(&set).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::AmountOverflow { scope } if scope == "contributions of contact c1"
        ));

        let near_limit = SnapshotSet {
            transactions: vec![mk_txn("t1", "c1", i64::MAX - 1), mk_txn("t2", "c1", 1)],
            ..set
        };
        let summary = reconciler
            .summarize(&near_limit, SyncPhase::Completed, &[], now())
            .unwrap();
        assert_eq!(summary.total_amount_cents, i64::MAX);
    }
}
