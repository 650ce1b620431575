//! Recurrence rules travel through the API as an opaque JSON map
//! (`{"freq": "DAILY", "count": 5}`) and live in the calendar as RRULE text
//! (`FREQ=DAILY;COUNT=5`). This module converts between the two.

use serde_json::Value;

use super::CalendarError;

pub type Rules = serde_json::Map<String, Value>;

/// Encode a rules map as RRULE property text. Keys are uppercased; string
/// values are uppercased, numbers kept verbatim, arrays comma-joined.
pub fn to_rrule(rules: &Rules) -> Result<String, CalendarError> {
    let mut parts = Vec::with_capacity(rules.len());
    for (key, value) in rules {
        parts.push(format!(
            "{}={}",
            key.to_ascii_uppercase(),
            render_value(key, value)?
        ));
    }
    Ok(parts.join(";"))
}

fn render_value(key: &str, value: &Value) -> Result<String, CalendarError> {
    match value {
        Value::String(s) => Ok(s.to_ascii_uppercase()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => {
            let rendered: Result<Vec<_>, _> =
                items.iter().map(|item| render_value(key, item)).collect();
            Ok(rendered?.join(","))
        }
        other => Err(CalendarError::InvalidData(format!(
            "rule '{key}' has unsupported value {other}"
        ))),
    }
}

/// Decode RRULE property text back into a rules map. Keys come out lowercased;
/// integer values become JSON numbers, comma lists become arrays.
pub fn from_rrule(rrule: &str) -> Rules {
    let mut rules = Rules::new();
    for part in rrule.split(';').filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        let value = if value.contains(',') {
            Value::Array(value.split(',').map(parse_scalar).collect())
        } else {
            parse_scalar(value)
        };
        rules.insert(key.to_ascii_lowercase(), value);
    }
    rules
}

fn parse_scalar(text: &str) -> Value {
    match text.parse::<i64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(text),
    }
}
