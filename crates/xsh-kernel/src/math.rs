//! Math operator rules and the left-fold evaluator.
//!
//! The converter splits a leaf on the first operator (in registry order) it
//! contains, converts the operands, and folds them left-to-right under the
//! operator's callback. Registry order therefore doubles as detection
//! priority: longer operators come first so `>=` never splits as `>`.

use std::sync::Arc;

use serde_json::json;

use xsh_types::{Error, Value, XshResult};

use crate::rules::{MathFn, MathRule};

/// Left-fold `operands` under `rule`. Fails with `MathResultInvalid` when
/// the fold comes out `undefined`.
pub fn fold(rule: &MathRule, operands: &[Value]) -> XshResult<Value> {
    let Some(first) = operands.first() else {
        return Err(Error::math_result_invalid(json!({
            "operator": rule.key,
            "message": "no operands",
        })));
    };
    let mut acc = first.clone();
    for operand in &operands[1..] {
        acc = (rule.apply)(&acc, operand)?;
    }
    if matches!(acc, Value::Undef) {
        return Err(Error::math_result_invalid(json!({
            "operator": rule.key,
        })));
    }
    Ok(acc)
}

/// The built-in math operator rules, in detection order.
pub fn math_rules() -> Vec<MathRule> {
    vec![
        cmp_rule("strict-eq", "===", -700, |a, b| a == b),
        cmp_rule("strict-ne", "!==", -690, |a, b| a != b),
        cmp_rule("loose-eq", "==", -680, |a, b| a.loose_eq(b)),
        cmp_rule("loose-ne", "!=", -670, |a, b| !a.loose_eq(b)),
        numeric_cmp_rule("ge", ">=", -660, |a, b| a >= b),
        numeric_cmp_rule("le", "<=", -650, |a, b| a <= b),
        numeric_cmp_rule("gt", ">", -640, |a, b| a > b),
        numeric_cmp_rule("lt", "<", -630, |a, b| a < b),
        add_rule(),
        numeric_rule("sub", "-", -610, |a, b| a - b, i64::checked_sub),
        numeric_rule("mul", "*", -600, |a, b| a * b, i64::checked_mul),
        div_rule(),
        rem_rule(),
    ]
}

fn rule(name: &'static str, key: &str, order: i32, apply: MathFn) -> MathRule {
    MathRule {
        name,
        key: key.to_string(),
        order,
        apply,
    }
}

fn cmp_rule(
    name: &'static str,
    key: &str,
    order: i32,
    cmp: fn(&Value, &Value) -> bool,
) -> MathRule {
    rule(
        name,
        key,
        order,
        Arc::new(move |a, b| Ok(Value::Bool(cmp(a, b)))),
    )
}

fn numeric_cmp_rule(
    name: &'static str,
    key: &str,
    order: i32,
    cmp: fn(f64, f64) -> bool,
) -> MathRule {
    let op = key.to_string();
    rule(
        name,
        key,
        order,
        Arc::new(move |a, b| {
            let x = to_f64(a, &op)?;
            let y = to_f64(b, &op)?;
            Ok(Value::Bool(cmp(x, y)))
        }),
    )
}

/// `+` is polymorphic: sequence concat, right-biased mapping merge, string
/// concat when either side is a string, numeric addition otherwise.
fn add_rule() -> MathRule {
    rule(
        "add",
        "+",
        -620,
        Arc::new(|a, b| match (a, b) {
            (Value::Seq(x), Value::Seq(y)) => {
                let mut out = x.clone();
                out.extend(y.iter().cloned());
                Ok(Value::Seq(out))
            }
            (Value::Map(x), Value::Map(y)) => Ok(Value::Map(x.merged(y))),
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Ok(Value::Str(format!("{}{}", a.display(), b.display())))
            }
            _ => numeric_binop(a, b, "+", |x, y| x + y, i64::checked_add),
        }),
    )
}

fn numeric_rule(
    name: &'static str,
    key: &str,
    order: i32,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> MathRule {
    let op = key.to_string();
    rule(
        name,
        key,
        order,
        Arc::new(move |a, b| numeric_binop(a, b, &op, float_op, int_op)),
    )
}

/// `/` keeps integer results integral when the division is exact.
fn div_rule() -> MathRule {
    rule(
        "div",
        "/",
        -590,
        Arc::new(|a, b| match (coerce(a, "/")?, coerce(b, "/")?) {
            (Num::Int(x), Num::Int(y)) if y != 0 && x % y == 0 => Ok(Value::Int(x / y)),
            (x, y) => Ok(Value::Float(x.as_f64() / y.as_f64())),
        }),
    )
}

fn rem_rule() -> MathRule {
    rule(
        "rem",
        "%",
        -580,
        Arc::new(|a, b| match (coerce(a, "%")?, coerce(b, "%")?) {
            (Num::Int(x), Num::Int(y)) if y != 0 => Ok(Value::Int(x % y)),
            (x, y) => Ok(Value::Float(x.as_f64() % y.as_f64())),
        }),
    )
}

/// Numeric view of an operand.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

/// Coerce an operand for a numeric operator: ints, floats, bools and numeric
/// strings pass; everything else is a `PropertyTypeMismatch`.
pub(crate) fn coerce(value: &Value, op: &str) -> XshResult<Num> {
    match value {
        Value::Int(i) => Ok(Num::Int(*i)),
        Value::Float(f) => Ok(Num::Float(*f)),
        Value::Bool(b) => Ok(Num::Int(if *b { 1 } else { 0 })),
        Value::Str(s) => {
            let t = s.trim();
            if let Ok(i) = t.parse::<i64>() {
                Ok(Num::Int(i))
            } else if let Ok(f) = t.parse::<f64>() {
                Ok(Num::Float(f))
            } else {
                Err(type_mismatch(value, op))
            }
        }
        _ => Err(type_mismatch(value, op)),
    }
}

fn to_f64(value: &Value, op: &str) -> XshResult<f64> {
    coerce(value, op).map(Num::as_f64)
}

fn type_mismatch(value: &Value, op: &str) -> Error {
    Error::property_type_mismatch(json!({
        "operator": op,
        "operand": value.display(),
        "type": value.type_name(),
    }))
}

fn numeric_binop(
    a: &Value,
    b: &Value,
    op: &str,
    float_op: fn(f64, f64) -> f64,
    int_op: fn(i64, i64) -> Option<i64>,
) -> XshResult<Value> {
    match (coerce(a, op)?, coerce(b, op)?) {
        (Num::Int(x), Num::Int(y)) => match int_op(x, y) {
            Some(v) => Ok(Value::Int(v)),
            None => Ok(Value::Float(float_op(x as f64, y as f64))),
        },
        (x, y) => Ok(Value::Float(float_op(x.as_f64(), y.as_f64()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xsh_types::Map;

    fn by_key(key: &str) -> MathRule {
        math_rules().into_iter().find(|r| r.key == key).unwrap()
    }

    fn run(key: &str, operands: &[Value]) -> XshResult<Value> {
        fold(&by_key(key), operands)
    }

    #[test]
    fn detection_order_puts_longer_operators_first() {
        let keys: Vec<String> = math_rules().into_iter().map(|r| r.key).collect();
        let ge = keys.iter().position(|k| k == ">=").unwrap();
        let gt = keys.iter().position(|k| k == ">").unwrap();
        assert!(ge < gt);
        let seq = keys.iter().position(|k| k == "===").unwrap();
        let leq = keys.iter().position(|k| k == "==").unwrap();
        assert!(seq < leq);
    }

    #[test]
    fn addition_folds_left() {
        let v = run("+", &[Value::Int(1), Value::Int(2), Value::Int(3)]).unwrap();
        assert_eq!(v, Value::Int(6));
    }

    #[test]
    fn add_concats_sequences() {
        let v = run(
            "+",
            &[
                Value::Seq(vec![Value::Int(1)]),
                Value::Seq(vec![Value::Int(2)]),
            ],
        )
        .unwrap();
        assert_eq!(v, Value::Seq(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn add_merges_mappings_right_biased() {
        let mut a = Map::new();
        a.insert("k", Value::Int(1));
        let mut b = Map::new();
        b.insert("k", Value::Int(2));
        let v = run("+", &[Value::Map(a), Value::Map(b)]).unwrap();
        let Value::Map(m) = v else { panic!("expected mapping") };
        assert_eq!(m.get("k"), Some(&Value::Int(2)));
    }

    #[test]
    fn add_stringifies_when_a_string_is_involved() {
        let v = run("+", &[Value::Str("n=".into()), Value::Int(3)]).unwrap();
        assert_eq!(v, Value::Str("n=3".into()));
    }

    #[test]
    fn division_stays_integral_when_exact() {
        assert_eq!(run("/", &[Value::Int(6), Value::Int(3)]).unwrap(), Value::Int(2));
        assert_eq!(
            run("/", &[Value::Int(9), Value::Int(2)]).unwrap(),
            Value::Float(4.5)
        );
    }

    #[test]
    fn non_numeric_operand_is_a_type_mismatch() {
        let err = run("*", &[Value::Int(1), Value::Str("a".into())]).unwrap_err();
        assert!(matches!(err, Error::PropertyTypeMismatch(_)));
    }

    #[test]
    fn loose_and_strict_equality_differ_on_types() {
        assert_eq!(
            run("==", &[Value::Int(1), Value::Str("1".into())]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run("===", &[Value::Int(1), Value::Str("1".into())]).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            run("==", &[Value::Null, Value::Undef]).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            run("===", &[Value::Null, Value::Undef]).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn comparisons_coerce_numerically() {
        assert_eq!(
            run(">=", &[Value::Str("10".into()), Value::Int(2)]).unwrap(),
            Value::Bool(true)
        );
        let err = run("<", &[Value::Int(1), Value::Seq(vec![])]).unwrap_err();
        assert!(matches!(err, Error::PropertyTypeMismatch(_)));
    }

    #[test]
    fn empty_fold_is_math_result_invalid() {
        let err = run("+", &[]).unwrap_err();
        assert!(matches!(err, Error::MathResultInvalid(_)));
    }
}
