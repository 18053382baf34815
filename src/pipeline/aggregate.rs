//! Record validation and batch aggregation.
//!
//! Recovery hands back a [`serde_json::Value`] of unknown shape; this module
//! turns it into typed [`ExpenseRecord`]s and, at the end of a run, folds the
//! per-page results into one ordered record list with an exact grand total.
//!
//! Validation is deliberately strict per record and lenient per page: a
//! malformed element is dropped (and counted), the rest of the page survives.
//! One hallucinated row must never sink an otherwise clean statement.

use serde_json::{Map, Value};
use tracing::debug;

use crate::output::{ExpenseRecord, PageExtraction};
use crate::pipeline::recover::recover_json;
use crate::schema::ExtractionSchema;

/// What record validation salvaged from one model answer.
#[derive(Debug, Default)]
pub struct PageRecovery {
    /// Records that passed validation, in answer order.
    pub records: Vec<ExpenseRecord>,
    /// Candidate records rejected by validation.
    pub dropped: usize,
    /// Whether any JSON structure was recovered at all. `false` means the
    /// answer was prose through and through; zero records with `true` means
    /// the model returned valid JSON that simply held no usable rows.
    pub structure_found: bool,
}

/// Recover JSON from a raw model answer and validate it into records.
///
/// A recovered array is validated element by element; a lone object is
/// treated as a single candidate record; a scalar counts as structure but
/// yields nothing.
pub fn recover_page_records(raw: &str, schema: &ExtractionSchema) -> PageRecovery {
    let Some(value) = recover_json(raw) else {
        return PageRecovery::default();
    };

    let candidates: Vec<Value> = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            debug!("Recovered a scalar, not records: {other}");
            return PageRecovery {
                structure_found: true,
                ..PageRecovery::default()
            };
        }
    };

    let mut recovery = PageRecovery {
        structure_found: true,
        ..PageRecovery::default()
    };
    for candidate in &candidates {
        match validate_record(candidate, schema) {
            Ok(record) => recovery.records.push(record),
            Err(reason) => {
                debug!("Dropping record: {reason}");
                recovery.dropped += 1;
            }
        }
    }
    recovery
}

/// Collect the records of all pages, in the order given, with their total.
///
/// Callers sort pages by `(document, page)` first, so record order follows
/// document order regardless of which page's model call finished first.
pub fn aggregate_pages(pages: &[PageExtraction]) -> (Vec<ExpenseRecord>, f64) {
    let records: Vec<ExpenseRecord> = pages
        .iter()
        .flat_map(|page| page.records.iter().cloned())
        .collect();
    let total = total_amount(&records);
    (records, total)
}

/// Sum of record amounts, exact to the cent.
///
/// Every amount is quantised to two decimals at validation, so summing in
/// integer cents sidesteps float accumulation error and makes the total
/// independent of record order.
pub fn total_amount(records: &[ExpenseRecord]) -> f64 {
    let cents: i64 = records
        .iter()
        .map(|record| (record.amount * 100.0).round() as i64)
        .sum();
    cents as f64 / 100.0
}

// ── Record validation ────────────────────────────────────────────────────────

fn validate_record(value: &Value, schema: &ExtractionSchema) -> Result<ExpenseRecord, String> {
    let map = value
        .as_object()
        .ok_or_else(|| format!("not a JSON object: {value}"))?;

    for field in &schema.required {
        match map.get(field.as_str()) {
            None => return Err(format!("missing required field `{field}`")),
            Some(Value::Null) => return Err(format!("required field `{field}` is null")),
            Some(_) => {}
        }
    }

    let date = string_field(map, "date")?;
    let category = string_field(map, "category")?;
    let description = string_field(map, "description")?;
    let amount = amount_field(map)?;

    // Optional correlation id; anything but a string is treated as absent.
    let id = map.get("id").and_then(Value::as_str).map(str::to_owned);

    Ok(ExpenseRecord {
        id,
        date,
        category,
        description,
        amount,
    })
}

fn string_field(map: &Map<String, Value>, field: &str) -> Result<String, String> {
    map.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| format!("field `{field}` is not a string"))
}

/// Largest admissible single amount.
///
/// Everything below this stays well inside the range where f64 holds cent
/// values exactly and an i64 cent total cannot overflow; anything above it
/// is a hallucinated number, not a travel expense.
const MAX_AMOUNT: f64 = 1_000_000_000.0;

/// Accept a JSON number or a numeric string, reject everything else.
///
/// Models sometimes quote amounts (`"amount": "12.50"`); a plain parse
/// covers that without admitting currency symbols or thousands separators.
fn amount_field(map: &Map<String, Value>) -> Result<f64, String> {
    let raw = map
        .get("amount")
        .ok_or_else(|| "missing required field `amount`".to_string())?;
    let amount = match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("amount out of range: {n}"))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("amount is not numeric: {s:?}"))?,
        other => return Err(format!("amount is not a number: {other}")),
    };
    if !amount.is_finite() {
        return Err(format!("amount is not finite: {amount}"));
    }
    if amount < 0.0 {
        return Err(format!("amount is negative: {amount}"));
    }
    if amount > MAX_AMOUNT {
        return Err(format!("amount exceeds the supported maximum: {amount}"));
    }
    Ok(quantise(amount))
}

/// Quantise to cents, rounding halves away from zero.
fn quantise(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::travel_expenses()
    }

    fn record(amount: f64) -> ExpenseRecord {
        ExpenseRecord {
            id: None,
            date: "2024-03-01".into(),
            category: "Meals".into(),
            description: "Lunch".into(),
            amount,
        }
    }

    // ── recover_page_records ──

    #[test]
    fn valid_array_yields_records() {
        let raw = r#"[
            {"date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": 12.5},
            {"id": "r2", "date": "2024-03-02", "category": "Transport", "description": "Taxi", "amount": "23.40"}
        ]"#;
        let recovery = recover_page_records(raw, &schema());
        assert!(recovery.structure_found);
        assert_eq!(recovery.dropped, 0);
        assert_eq!(recovery.records.len(), 2);
        assert_eq!(recovery.records[0].amount, 12.5);
        assert_eq!(recovery.records[1].amount, 23.4);
        assert_eq!(recovery.records[1].id.as_deref(), Some("r2"));
    }

    #[test]
    fn lone_object_becomes_single_record() {
        let raw = r#"{"date": "2024-03-01", "category": "Hotel", "description": "One night", "amount": 140}"#;
        let recovery = recover_page_records(raw, &schema());
        assert_eq!(recovery.records.len(), 1);
        assert_eq!(recovery.records[0].amount, 140.0);
    }

    #[test]
    fn invalid_elements_are_dropped_not_fatal() {
        let raw = r#"[
            {"date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": 12.5},
            {"date": "2024-03-02", "category": "Meals", "description": "Dinner", "amount": "not a number"},
            {"date": null, "category": "Meals", "description": "Snack", "amount": 3.0},
            "just a string"
        ]"#;
        let recovery = recover_page_records(raw, &schema());
        assert!(recovery.structure_found);
        assert_eq!(recovery.records.len(), 1);
        assert_eq!(recovery.dropped, 3);
    }

    #[test]
    fn missing_required_field_drops_record() {
        let raw = r#"[{"date": "2024-03-01", "category": "Meals", "amount": 9.0}]"#;
        let recovery = recover_page_records(raw, &schema());
        assert!(recovery.records.is_empty());
        assert_eq!(recovery.dropped, 1);
    }

    #[test]
    fn negative_amount_drops_record() {
        let raw = r#"[{"date": "2024-03-01", "category": "Refund", "description": "Credit", "amount": -10.0}]"#;
        let recovery = recover_page_records(raw, &schema());
        assert!(recovery.records.is_empty());
        assert_eq!(recovery.dropped, 1);
    }

    #[test]
    fn absurdly_large_amount_drops_record() {
        // Amounts beyond the admissible maximum would overflow the cent
        // total; they are hallucinations and get dropped like any other
        // malformed amount.
        for amount in ["1e60", "1.5e9", "1000000000.01"] {
            let raw = format!(
                r#"[{{"date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": {amount}}}]"#
            );
            let recovery = recover_page_records(&raw, &schema());
            assert!(recovery.records.is_empty(), "amount {amount} admitted");
            assert_eq!(recovery.dropped, 1);
        }

        // The boundary itself is admissible and sums exactly.
        let raw = r#"[{"date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": 1000000000.0}]"#;
        let recovery = recover_page_records(raw, &schema());
        assert_eq!(recovery.records.len(), 1);
        assert_eq!(total_amount(&recovery.records), 1_000_000_000.0);
    }

    #[test]
    fn amounts_are_quantised_to_cents() {
        let raw = r#"[{"date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": 12.505}]"#;
        let recovery = recover_page_records(raw, &schema());
        assert_eq!(recovery.records[0].amount, 12.51);
    }

    #[test]
    fn prose_answer_finds_no_structure() {
        let recovery = recover_page_records("I could not find any expenses.", &schema());
        assert!(!recovery.structure_found);
        assert!(recovery.records.is_empty());
        assert_eq!(recovery.dropped, 0);
    }

    #[test]
    fn empty_array_is_structure_without_records() {
        let recovery = recover_page_records("[]", &schema());
        assert!(recovery.structure_found);
        assert!(recovery.records.is_empty());
        assert_eq!(recovery.dropped, 0);
    }

    #[test]
    fn non_string_id_is_treated_as_absent() {
        let raw = r#"[{"id": 7, "date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": 5.0}]"#;
        let recovery = recover_page_records(raw, &schema());
        assert_eq!(recovery.records[0].id, None);
    }

    // ── aggregation ──

    fn page_with(records: Vec<ExpenseRecord>) -> PageExtraction {
        PageExtraction {
            document: 0,
            page: 1,
            records,
            dropped_records: 0,
            structure_found: true,
            raw_response: None,
            attempts: 1,
            duration_ms: 0,
            error: None,
        }
    }

    #[test]
    fn mixed_pages_aggregate_to_valid_records_only() {
        // One clean page, one page whose answer was rejected wholesale.
        let clean = recover_page_records(
            r#"[{"date": "2024-03-01", "category": "Meals", "description": "Lunch", "amount": 12.5}]"#,
            &schema(),
        );
        let noisy = recover_page_records("bad", &schema());

        let pages = vec![page_with(clean.records), page_with(noisy.records)];
        let (records, total) = aggregate_pages(&pages);
        assert_eq!(records.len(), 1);
        assert_eq!(total, 12.5);
    }

    #[test]
    fn malformed_amount_on_one_page_leaves_the_other_intact() {
        let first = recover_page_records(
            r#"[{"date":"2024-01-01","category":"Meals","description":"Lunch","amount":12.5}]"#,
            &schema(),
        );
        let second = recover_page_records(
            r#"[{"date":"2024-01-02","category":"Taxi","description":"Airport","amount":"bad"}]"#,
            &schema(),
        );
        assert!(second.structure_found);
        assert_eq!(second.dropped, 1);

        let pages = vec![page_with(first.records), page_with(second.records)];
        let (records, total) = aggregate_pages(&pages);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "Lunch");
        assert_eq!(total, 12.5);
    }

    #[test]
    fn total_is_exact_for_cent_amounts() {
        // 0.1 + 0.2 style float drift must not show up in the total.
        let records: Vec<ExpenseRecord> = (0..10).map(|_| record(0.1)).collect();
        assert_eq!(total_amount(&records), 1.0);
    }

    #[test]
    fn total_is_order_independent() {
        let mut records = vec![record(19.99), record(0.01), record(7.3)];
        let forward = total_amount(&records);
        records.reverse();
        assert_eq!(total_amount(&records), forward);
        assert_eq!(forward, 27.3);
    }

    #[test]
    fn empty_batch_totals_zero() {
        let (records, total) = aggregate_pages(&[]);
        assert!(records.is_empty());
        assert_eq!(total, 0.0);
    }

    #[test]
    fn scalar_recovery_counts_as_structure() {
        let recovery = recover_page_records("42", &schema());
        assert!(recovery.structure_found);
        assert!(recovery.records.is_empty());
        assert_eq!(recovery.dropped, 0);
    }
}
