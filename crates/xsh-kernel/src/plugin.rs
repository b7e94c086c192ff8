//! The built-in core plugin: operators, normalizer, converter, math,
//! template rules, the std command set, the `$global` ambient bridge and
//! the system template variables.

use serde_json::json;

use xsh_types::{Callable, Error, Map, Value, XshResult};

use crate::commands::std_commands;
use crate::engine::{EngineConfig, Plugin};
use crate::rules::RuleDef;
use crate::{convert, exec, math, normalize, template};

/// The core configuration every engine normally starts from.
pub fn core_plugin() -> Plugin {
    let mut config = EngineConfig::new();
    for rule in normalize::parse_rules() {
        config.rules.push(RuleDef::Parse(rule));
    }
    for rule in convert::convert_rules() {
        config.rules.push(RuleDef::Convert(rule));
    }
    for rule in math::math_rules() {
        config.rules.push(RuleDef::Math(rule));
    }
    for rule in exec::operator_rules() {
        config.rules.push(RuleDef::Command(rule));
    }
    for rule in template::template_rules() {
        config.rules.push(RuleDef::Template(rule));
    }
    for command in std_commands() {
        config.commands.push(command);
    }
    config = config
        .global("global", Value::Map(ambient_bridge()))
        .system_var("version", Value::Str(env!("CARGO_PKG_VERSION").to_string()))
        .system_var("platform", Value::Str(std::env::consts::OS.to_string()));
    Plugin::new("core", config)
}

/// The host ambient name table reachable through `$global`.
fn ambient_bridge() -> Map {
    let mut global = Map::new();
    global.insert("Math", Value::Map(math_namespace()));
    global
}

fn math_namespace() -> Map {
    let mut ns = Map::new();
    ns.insert("PI", Value::Float(std::f64::consts::PI));
    ns.insert("E", Value::Float(std::f64::consts::E));
    ns.insert("min", native_fold("min", |acc, x| if x < acc { x } else { acc }));
    ns.insert("max", native_fold("max", |acc, x| if x > acc { x } else { acc }));
    ns.insert("abs", native_unary("abs", f64::abs));
    ns.insert("floor", native_unary("floor", f64::floor));
    ns.insert("ceil", native_unary("ceil", f64::ceil));
    ns.insert("round", native_unary("round", f64::round));
    ns
}

fn native_fold(name: &'static str, pick: fn(f64, f64) -> f64) -> Value {
    Value::Fn(Callable::native(name, move |_recv, args| {
        let mut acc: Option<f64> = None;
        for arg in args {
            let n = numeric(arg, name)?;
            acc = Some(match acc {
                Some(a) => pick(a, n),
                None => n,
            });
        }
        Ok(acc.map(number_value).unwrap_or(Value::Undef))
    }))
}

fn native_unary(name: &'static str, op: fn(f64) -> f64) -> Value {
    Value::Fn(Callable::native(name, move |_recv, args| {
        let Some(arg) = args.first() else {
            return Ok(Value::Undef);
        };
        Ok(number_value(op(numeric(arg, name)?)))
    }))
}

fn numeric(value: &Value, fn_name: &str) -> XshResult<f64> {
    value.as_number().ok_or_else(|| {
        Error::property_type_mismatch(json!({
            "function": fn_name,
            "operand": value.display(),
            "type": value.type_name(),
        }))
    })
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < i64::MAX as f64 {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}
