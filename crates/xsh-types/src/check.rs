//! Type-assertion helpers used by internal code and command callbacks.
//!
//! A type rule is a tag string (`"int"`, `"string"`, `"sequence"`, …). An
//! unknown tag is `VariableTypeInvalid`; a value matching none of the given
//! tags is `AssertFailed`; length checks fail `ArgumentsLengthInvalid`.

use serde_json::json;

use crate::error::{Error, XshResult};
use crate::value::Value;

/// True when `value` matches the type tag; `None` for an unknown tag.
fn matches_tag(value: &Value, tag: &str) -> Option<bool> {
    let ok = match tag {
        "any" => true,
        "null" => matches!(value, Value::Null),
        "undefined" => matches!(value, Value::Undef),
        "bool" => matches!(value, Value::Bool(_)),
        "int" => matches!(value, Value::Int(_)),
        "float" => matches!(value, Value::Float(_)),
        "number" => matches!(value, Value::Int(_) | Value::Float(_)),
        "string" => matches!(value, Value::Str(_)),
        "sequence" => matches!(value, Value::Seq(_)),
        "mapping" => matches!(value, Value::Map(_)),
        "function" => matches!(value, Value::Fn(_)),
        "deferred" => matches!(value, Value::Deferred(_)),
        _ => return None,
    };
    Some(ok)
}

/// Assert that `value` matches at least one of the `expected` type tags.
pub fn check_type(value: &Value, expected: &[&str]) -> XshResult<()> {
    for tag in expected {
        match matches_tag(value, tag) {
            Some(true) => return Ok(()),
            Some(false) => {}
            None => {
                return Err(Error::variable_type_invalid(json!({
                    "type": tag,
                })));
            }
        }
    }
    Err(Error::assert_failed(json!({
        "expected": expected,
        "got": value.type_name(),
        "value": value.display(),
    })))
}

/// Assert an exact argument count.
pub fn check_args_len(args: &[Value], expected: usize) -> XshResult<()> {
    if args.len() != expected {
        return Err(Error::arguments_length_invalid(json!({
            "expected": expected,
            "got": args.len(),
            "message": format!("must be equal to {expected}"),
        })));
    }
    Ok(())
}

/// Assert a condition about an internal helper parameter.
pub fn check_param(ok: bool, parameter: &str, message: &str) -> XshResult<()> {
    if ok {
        return Ok(());
    }
    Err(Error::parameter_type_invalid(json!({
        "parameter": parameter,
        "message": message,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_tag_passes() {
        check_type(&Value::Int(1), &["string", "int"]).unwrap();
        check_type(&Value::Seq(vec![]), &["sequence"]).unwrap();
        check_type(&Value::Null, &["any"]).unwrap();
    }

    #[test]
    fn unmatched_value_is_assert_failed() {
        let err = check_type(&Value::Bool(true), &["int", "string"]).unwrap_err();
        assert!(matches!(err, Error::AssertFailed(_)));
    }

    #[test]
    fn unknown_tag_is_variable_type_invalid() {
        let err = check_type(&Value::Int(1), &["wibble"]).unwrap_err();
        assert!(matches!(err, Error::VariableTypeInvalid(_)));
    }

    #[test]
    fn length_check() {
        check_args_len(&[Value::Int(1)], 1).unwrap();
        let err = check_args_len(&[], 1).unwrap_err();
        assert!(matches!(err, Error::ArgumentsLengthInvalid(_)));
    }

    #[test]
    fn param_check() {
        check_param(true, "path", "must be non-empty").unwrap();
        let err = check_param(false, "path", "must be non-empty").unwrap_err();
        assert!(matches!(err, Error::ParameterTypeInvalid(_)));
    }
}
