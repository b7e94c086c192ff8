//! Bridging between engine values and JSON.
//!
//! Used by the JSON template rule, by `Value`'s serde implementations, and
//! by error payload construction.

use crate::value::{Map, Value};

/// Convert an engine value to JSON.
///
/// Functions and deferreds have no JSON form and become null, as does a
/// non-finite float.
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null | Value::Undef => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Seq(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map.iter() {
                obj.insert(k.to_string(), value_to_json(v));
            }
            serde_json::Value::Object(obj)
        }
        Value::Fn(_) | Value::Deferred(_) => serde_json::Value::Null,
    }
}

/// Convert JSON to an engine value. Integral numbers become `Int`.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => {
            Value::Seq(items.into_iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(obj) => {
            Value::Map(obj.into_iter().map(|(k, v)| (k, json_to_value(v))).collect::<Map>())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_structured_data() {
        let v = json_to_value(json!({"a": [1, 2.5, "x", null, true]}));
        assert_eq!(value_to_json(&v), json!({"a": [1, 2.5, "x", null, true]}));
    }

    #[test]
    fn integral_numbers_become_ints() {
        assert_eq!(json_to_value(json!(3)), Value::Int(3));
        assert_eq!(json_to_value(json!(3.5)), Value::Float(3.5));
    }

    #[test]
    fn undef_serializes_as_null() {
        assert_eq!(value_to_json(&Value::Undef), serde_json::Value::Null);
    }
}
