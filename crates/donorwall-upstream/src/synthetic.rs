//! Deterministic stand-in dataset.
//!
//! Sized after the production account and internally linked: every
//! transaction and plan references an existing synthetic contact, and every
//! transaction references the one synthetic campaign.

use chrono::{DateTime, Duration, TimeZone, Utc};
use donorwall_core::{Campaign, Contact, PlanInterval, PlanStatus, RecurringPlan, Transaction};

pub const CONTACT_COUNT: usize = 168;
pub const TRANSACTION_COUNT: usize = 186;
pub const PLAN_COUNT: usize = 78;
pub const CAMPAIGN_ID: &str = "campaign_main";

pub const TRANSACTION_AMOUNT: i64 = 10_000;
pub const TRANSACTION_FEE: i64 = 329;
pub const PLAN_AMOUNT: i64 = 2_500;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn contact_id(n: usize) -> String {
    format!("contact_{n}")
}

pub fn contacts() -> Vec<Contact> {
    (1..=CONTACT_COUNT)
        .map(|n| Contact {
            id: contact_id(n),
            first_name: Some("Donor".to_string()),
            last_name: Some(n.to_string()),
            email: Some(format!("donor{n}@example.com")),
            phone: Some(format!("+1234567{:03}", n - 1)),
            created_at: Some(base_time() + Duration::hours(n as i64)),
        })
        .collect()
}

pub fn transactions() -> Vec<Transaction> {
    (0..TRANSACTION_COUNT)
        .map(|i| Transaction {
            id: format!("txn_{i}"),
            amount: TRANSACTION_AMOUNT,
            contact_id: Some(contact_id(i % CONTACT_COUNT + 1)),
            status: Some("succeeded".to_string()),
            fee: Some(TRANSACTION_FEE),
            net_amount: Some(TRANSACTION_AMOUNT - TRANSACTION_FEE),
            method: Some("card".to_string()),
            campaign_id: Some(CAMPAIGN_ID.to_string()),
            created_at: Some(base_time() + Duration::days(7) + Duration::minutes(i as i64 * 30)),
        })
        .collect()
}

/// The first [`PLAN_COUNT`] contacts each hold one active monthly plan.
pub fn plans() -> Vec<RecurringPlan> {
    (1..=PLAN_COUNT)
        .map(|n| RecurringPlan {
            id: format!("plan_{n}"),
            amount: PLAN_AMOUNT,
            interval: PlanInterval::Monthly,
            status: PlanStatus::Active,
            contact_id: Some(contact_id(n)),
            created_at: Some(base_time() + Duration::days(3) + Duration::hours(n as i64)),
        })
        .collect()
}

pub fn campaigns() -> Vec<Campaign> {
    vec![Campaign {
        id: CAMPAIGN_ID.to_string(),
        title: Some("Annual Fundraiser".to_string()),
        goal: Some(5_000_000),
        raised: Some(1_242_000),
        status: Some("active".to_string()),
        created_at: Some(base_time()),
    }]
}
