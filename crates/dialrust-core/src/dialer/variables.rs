//! Per-call dynamic variables handed to the voice agent

use dialrust_storage::models::{Contact, FieldMapping};
use serde_json::Value;
use std::collections::BTreeMap;

/// Variable names filled from the contact's own columns
pub const STANDARD_FIELDS: [&str; 5] = ["first_name", "last_name", "phone", "email", "address"];

/// Lowercased, with whitespace runs joined by `_`: "First  Name " becomes "first_name"
fn normalize_key(raw: &str) -> String {
    raw.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// CSV headers compare case- and whitespace-insensitively
pub fn normalize_header(header: &str) -> String {
    normalize_key(header)
}

pub fn normalize_variable_name(name: &str) -> String {
    normalize_key(name)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Build the variable map for one call.
///
/// Mapped custom fields are applied first; a present standard field then
/// overwrites any mapping that targets the same name. `phone` is the number
/// actually dialed.
pub fn build_dynamic_variables(
    contact: &Contact,
    phone: &str,
    mappings: &[FieldMapping],
) -> BTreeMap<String, String> {
    let mut variables = BTreeMap::new();

    if let Value::Object(fields) = &contact.custom_fields {
        let by_header: BTreeMap<String, &Value> = fields
            .iter()
            .map(|(header, value)| (normalize_header(header), value))
            .collect();

        for mapping in mappings {
            let name = normalize_variable_name(&mapping.variable_name);
            if name.is_empty() {
                continue;
            }
            if let Some(value) = by_header
                .get(&normalize_header(&mapping.csv_header))
                .and_then(|v| scalar_to_string(v))
            {
                variables.insert(name, value);
            }
        }
    }

    let standard = [
        ("first_name", contact.first_name.as_deref()),
        ("last_name", contact.last_name.as_deref()),
        ("phone", Some(phone)),
        ("email", contact.email.as_deref()),
        ("address", contact.address.as_deref()),
    ];
    for (name, value) in standard {
        if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
            variables.insert(name.to_string(), value.to_string());
        }
    }

    variables
}
