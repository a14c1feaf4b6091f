//! Field-level response masking.
//!
//! A masking rule is a field-path string; matching is by leaf name, applied
//! recursively at any depth. Masked values are replaced by the `"***"`
//! sentinel regardless of their original type. The walk never mutates its
//! input and preserves every non-sensitive field bit-for-bit.

use serde_json::Value;
use std::collections::HashSet;

pub const MASK_SENTINEL: &str = "***";

/// Mask every mapping key whose name matches a rule's leaf name.
///
/// Linear in the size of the payload; an empty rule set returns the input
/// unchanged.
pub fn mask(value: &Value, masking_rules: &[String]) -> Value {
    if masking_rules.is_empty() {
        return value.clone();
    }
    let fields: HashSet<&str> = masking_rules.iter().map(|rule| leaf_name(rule)).collect();
    mask_value(value, &fields)
}

/// Last segment of a dot-separated field path.
fn leaf_name(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

fn mask_value(value: &Value, fields: &HashSet<&str>) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| {
                    if fields.contains(key.as_str()) {
                        (key.clone(), Value::String(MASK_SENTINEL.to_string()))
                    } else {
                        (key.clone(), mask_value(child, fields))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| mask_value(item, fields)).collect())
        }
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_rules_is_identity() {
        let payload = json!({"name": "Acme", "customer_email": "ceo@acme.com"});
        assert_eq!(mask(&payload, &[]), payload);
    }

    #[test]
    fn test_top_level_field_masked() {
        let payload = json!({"name": "Acme", "customer_email": "ceo@acme.com"});
        let masked = mask(&payload, &rules(&["customer_email"]));
        assert_eq!(masked["customer_email"], json!("***"));
        assert_eq!(masked["name"], json!("Acme"));
    }

    #[test]
    fn test_nested_depth_three_masked() {
        let payload = json!({
            "account": {
                "owner": {
                    "contact": {"customer_email": "ceo@acme.com", "city": "Berlin"}
                }
            }
        });
        let masked = mask(&payload, &rules(&["customer_email"]));
        assert_eq!(masked["account"]["owner"]["contact"]["customer_email"], json!("***"));
        assert_eq!(masked["account"]["owner"]["contact"]["city"], json!("Berlin"));
    }

    #[test]
    fn test_arrays_masked_element_wise() {
        let payload = json!({
            "rows": [
                {"name": "Acme", "customer_phone": "+1-555-0123"},
                {"name": "Globex", "customer_phone": "+1-555-0456"}
            ]
        });
        let masked = mask(&payload, &rules(&["customer_phone"]));
        for row in masked["rows"].as_array().unwrap() {
            assert_eq!(row["customer_phone"], json!("***"));
        }
        assert_eq!(masked["rows"][0]["name"], json!("Acme"));
    }

    #[test]
    fn test_non_string_sensitive_values_become_sentinel() {
        let payload = json!({"salary": 120000, "active": true, "note": null});
        let masked = mask(&payload, &rules(&["salary", "active", "note"]));
        assert_eq!(masked["salary"], json!("***"));
        assert_eq!(masked["active"], json!("***"));
        assert_eq!(masked["note"], json!("***"));
    }

    #[test]
    fn test_absent_rule_keys_are_noop() {
        let payload = json!({"name": "Acme"});
        assert_eq!(mask(&payload, &rules(&["customer_email"])), payload);
    }

    #[test]
    fn test_dotted_path_matches_leaf_name_recursively() {
        let payload = json!({"customer": {"email": "ceo@acme.com"}, "email": "info@acme.com"});
        let masked = mask(&payload, &rules(&["customer.email"]));
        assert_eq!(masked["customer"]["email"], json!("***"));
        // leaf-name match also applies at other depths
        assert_eq!(masked["email"], json!("***"));
    }

    #[test]
    fn test_mask_is_idempotent() {
        let payload = json!({
            "rows": [{"customer_email": "ceo@acme.com", "nested": {"customer_email": "x@y.z"}}]
        });
        let rules = rules(&["customer_email"]);
        let once = mask(&payload, &rules);
        let twice = mask(&once, &rules);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_input_not_mutated() {
        let payload = json!({"customer_email": "ceo@acme.com"});
        let _ = mask(&payload, &rules(&["customer_email"]));
        assert_eq!(payload["customer_email"], json!("ceo@acme.com"));
    }

    #[test]
    fn test_scalar_payload_returned_as_is() {
        assert_eq!(mask(&json!(42), &rules(&["x"])), json!(42));
        assert_eq!(mask(&json!("hello"), &rules(&["x"])), json!("hello"));
    }
}
