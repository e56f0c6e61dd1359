//! Read-only translation of the production export format.
//!
//! The production bucket keeps one `{type}_data.json` blob per type with its
//! own field names. Translation only renames and re-wraps; values are carried
//! over unchanged, and fields with no standard counterpart are dropped.

use donorwall_core::money::{minor_to_major, parse_major_to_minor};
use donorwall_core::Collection;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::snapshot::SnapshotKind;

/// Types the production export carries. Everything else is read from the
/// timestamped namespace.
pub(crate) fn has_canonical_blob(kind: SnapshotKind) -> bool {
    matches!(
        kind,
        SnapshotKind::Summary
            | SnapshotKind::Collection(Collection::Contacts)
            | SnapshotKind::Collection(Collection::Transactions)
    )
}

pub(crate) fn canonical_key(prefix: &str, kind: SnapshotKind) -> String {
    format!("{}/{}_data.json", prefix.trim_end_matches('/'), kind)
}

/// Maps a canonical blob onto the standard shape for `kind`.
pub fn translate_canonical(kind: SnapshotKind, raw: Value) -> Value {
    match kind {
        SnapshotKind::Summary => translate_summary(&raw),
        SnapshotKind::Collection(collection) => translate_collection(collection, raw),
    }
}

fn translate_collection(collection: Collection, raw: Value) -> Value {
    match raw {
        Value::Object(mut root) => match root.remove(collection.as_str()) {
            Some(Value::Array(records)) => {
                let total = records.len();
                json!({ "data": records, "meta": { "total": total, "page": 1, "per_page": total } })
            }
            Some(other) => other,
            None if root.contains_key("data") => Value::Object(root),
            None => json!({ "data": [] }),
        },
        Value::Array(records) => {
            let total = records.len();
            json!({ "data": records, "meta": { "total": total, "page": 1, "per_page": total } })
        }
        _ => json!({ "data": [] }),
    }
}

fn translate_summary(raw: &Value) -> Value {
    let empty = Map::new();
    let root = raw.as_object().unwrap_or(&empty);
    let field = |name: &str| root.get(name).cloned().filter(|v| !v.is_null());

    let total_amount_cents = root.get("total_amount").map(major_to_minor).unwrap_or(0);

    json!({
        "total_donors": field("total_donors").unwrap_or(json!(0)),
        "total_transactions": field("total_donations").unwrap_or(json!(0)),
        "total_amount_cents": total_amount_cents,
        "total_amount_dollars": minor_to_major(total_amount_cents),
        "active_recurring_plans": field("recurring_donors").unwrap_or(json!(0)),
        "last_updated": field("last_sync").unwrap_or(Value::Null),
        "sync_status": field("sync_status").unwrap_or(json!("success")),
        "sync_errors": Value::Null,
    })
}

/// Exact decimal parse of the export's major-unit total.
fn major_to_minor(value: &Value) -> i64 {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => return 0,
        other => {
            warn!(value = %other, "unexpected total_amount in canonical summary");
            return 0;
        }
    };
    match parse_major_to_minor(&text) {
        Some(minor) => minor,
        None => {
            // Exponent notation or sub-cent precision: round once at the boundary.
            let rounded = text
                .parse::<f64>()
                .map(|major| (major * 100.0).round() as i64)
                .unwrap_or(0);
            warn!(value = %text, rounded, "canonical total_amount is not a plain two-decimal value");
            rounded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use donorwall_core::SyncSummary;

    #[test]
    fn summary_field_names_are_translated_without_changing_values() {
        let raw = json!({
            "total_donors": 168,
            "total_donations": 186,
            "total_amount": 18600.5,
            "recurring_donors": 78,
            "last_sync": "2025-06-01T10:00:00Z",
            "sync_status": "success",
            "internal_note": "dropped",
        });
        let summary: SyncSummary =
            serde_json::from_value(translate_canonical(SnapshotKind::Summary, raw)).unwrap();
        assert_eq!(summary.total_donors, 168);
        assert_eq!(summary.total_transactions, 186);
        assert_eq!(summary.total_amount_cents, 1_860_050);
        assert_eq!(summary.total_amount_dollars, 18600.5);
        assert_eq!(summary.active_recurring_plans, 78);
        assert_eq!(summary.sync_status, "success");
        assert!(summary.last_updated.is_some());
        assert!(summary.sync_errors.is_none());
    }

    #[test]
    fn summary_defaults_when_fields_missing() {
        let summary: SyncSummary =
            serde_json::from_value(translate_canonical(SnapshotKind::Summary, json!({}))).unwrap();
        assert_eq!(summary.total_donors, 0);
        assert_eq!(summary.total_amount_cents, 0);
        assert_eq!(summary.sync_status, "success");
        assert!(summary.last_updated.is_none());
    }

    #[test]
    fn transactions_array_is_wrapped_in_envelope() {
        let out = translate_canonical(
            SnapshotKind::Collection(Collection::Transactions),
            json!({"transactions": [{"id": "t1", "amount": 500}, {"id": "t2"}]}),
        );
        assert_eq!(out["data"].as_array().unwrap().len(), 2);
        assert_eq!(out["data"][0]["amount"], 500);
        assert_eq!(out["meta"]["total"], 2);
    }

    #[test]
    fn enveloped_blobs_pass_through() {
        let enveloped = json!({"data": [{"id": "c1"}], "meta": {"total": 1}});
        let out = translate_canonical(
            SnapshotKind::Collection(Collection::Contacts),
            enveloped.clone(),
        );
        assert_eq!(out, enveloped);

        let missing = translate_canonical(
            SnapshotKind::Collection(Collection::Contacts),
            json!({"something_else": 1}),
        );
        assert_eq!(missing, json!({"data": []}));
    }

    #[test]
    fn canonical_keys() {
        assert_eq!(
            canonical_key("donor-sync/production/", SnapshotKind::Summary),
            "donor-sync/production/summary_data.json"
        );
        assert!(has_canonical_blob(SnapshotKind::Collection(Collection::Transactions)));
        assert!(!has_canonical_blob(SnapshotKind::Collection(Collection::Plans)));
    }
}
