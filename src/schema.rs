//! Schema describing the expense records the model must return.
//!
//! The schema is serialised into the system prompt verbatim, so its shape is
//! part of the wire contract with the vision model: an array of expense
//! objects, each carrying the four required fields. Downstream validation in
//! [`crate::pipeline::aggregate`] enforces the same `required` list on
//! whatever comes back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Fields every extracted expense record must carry.
///
/// Records missing any of these (or carrying `null` for one) are dropped
/// during aggregation.
pub const REQUIRED_EXPENSE_FIELDS: [&str; 4] = ["date", "category", "description", "amount"];

/// One property in the extraction schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// JSON type name ("string", "number", ...).
    #[serde(rename = "type")]
    pub field_type: String,
    /// Hint shown to the model; keep it short and concrete.
    pub description: String,
}

impl FieldSpec {
    pub fn new(field_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            description: description.into(),
        }
    }
}

/// JSON-Schema-like description of the expense array the model must produce.
///
/// `BTreeMap` keeps property order deterministic, so the serialised prompt is
/// stable across runs and testable by string comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub properties: BTreeMap<String, FieldSpec>,
    pub required: Vec<String>,
}

impl ExtractionSchema {
    /// The default travel-expense schema: required `date`, `category`,
    /// `description` and `amount`, plus an optional `id`.
    pub fn travel_expenses() -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(
            "id".to_string(),
            FieldSpec::new("string", "Identifier of the expense if printed on the report"),
        );
        properties.insert(
            "date".to_string(),
            FieldSpec::new("string", "Expense date in YYYY-MM-DD format"),
        );
        properties.insert(
            "category".to_string(),
            FieldSpec::new("string", "Expense category, e.g. Meals, Taxi, Lodging"),
        );
        properties.insert(
            "description".to_string(),
            FieldSpec::new("string", "Short description of the expense"),
        );
        properties.insert(
            "amount".to_string(),
            FieldSpec::new("number", "Expense amount as a decimal number"),
        );
        Self {
            properties,
            required: REQUIRED_EXPENSE_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }

    /// Serialise to the JSON text embedded in the system prompt.
    ///
    /// The on-wire shape is an array-of-objects schema; `required` is always
    /// present because the aggregator's validation depends on the model
    /// having seen it.
    pub fn to_prompt_json(&self) -> String {
        json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }
        })
        .to_string()
    }

    /// Whether the schema declares all four required expense fields.
    ///
    /// Config validation rejects schemas that do not; aggregation would
    /// otherwise silently drop everything the model returns.
    pub fn declares_required_expense_fields(&self) -> bool {
        REQUIRED_EXPENSE_FIELDS
            .iter()
            .all(|f| self.required.iter().any(|r| r == f))
    }
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self::travel_expenses()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_declares_required_fields() {
        let schema = ExtractionSchema::default();
        assert!(schema.declares_required_expense_fields());
        assert_eq!(schema.required.len(), 4);
    }

    #[test]
    fn id_is_optional() {
        let schema = ExtractionSchema::travel_expenses();
        assert!(schema.properties.contains_key("id"));
        assert!(!schema.required.iter().any(|r| r == "id"));
    }

    #[test]
    fn prompt_json_is_an_array_schema() {
        let text = ExtractionSchema::travel_expenses().to_prompt_json();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "array");
        assert_eq!(value["items"]["type"], "object");
        let required = value["items"]["required"].as_array().unwrap();
        for field in REQUIRED_EXPENSE_FIELDS {
            assert!(
                required.iter().any(|r| r == field),
                "missing required field {field}"
            );
        }
    }

    #[test]
    fn prompt_json_is_stable() {
        let a = ExtractionSchema::travel_expenses().to_prompt_json();
        let b = ExtractionSchema::travel_expenses().to_prompt_json();
        assert_eq!(a, b);
    }

    #[test]
    fn incomplete_schema_is_detected() {
        let mut schema = ExtractionSchema::travel_expenses();
        schema.required.retain(|r| r != "amount");
        assert!(!schema.declares_required_expense_fields());
    }
}
