//! random, min, max — numeric commands.

use xsh_types::{ArgSpec, Argv, CommandSpec, Value, XshResult};

use super::Command;
use crate::engine::Engine;
use crate::math;
use crate::scope::Scope;

/// Uniform float in `[0, 1)`. Declares no arguments.
pub struct Random;

impl Command for Random {
    fn name(&self) -> &str {
        "random"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("random")
    }

    fn call(&self, _argv: Argv, _engine: &Engine, _scope: &mut Scope) -> XshResult<Value> {
        Ok(Value::Float(rand::random::<f64>()))
    }
}

/// Smallest of the variadic arguments, numerically compared.
pub struct Min;

impl Command for Min {
    fn name(&self) -> &str {
        "min"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("min").arg(ArgSpec::required("args").variadic())
    }

    fn call(&self, argv: Argv, _engine: &Engine, _scope: &mut Scope) -> XshResult<Value> {
        extremum(argv.tail("args"), "min", |candidate, best| candidate < best)
    }
}

/// Largest of the variadic arguments, numerically compared.
pub struct Max;

impl Command for Max {
    fn name(&self) -> &str {
        "max"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("max").arg(ArgSpec::required("args").variadic())
    }

    fn call(&self, argv: Argv, _engine: &Engine, _scope: &mut Scope) -> XshResult<Value> {
        extremum(argv.tail("args"), "max", |candidate, best| candidate > best)
    }
}

fn extremum(items: &[Value], op: &str, wins: fn(f64, f64) -> bool) -> XshResult<Value> {
    let mut best: Option<(f64, &Value)> = None;
    for item in items {
        let n = math::coerce(item, op)?.as_f64();
        if best.is_none_or(|(b, _)| wins(n, b)) {
            best = Some((n, item));
        }
    }
    Ok(best.map(|(_, v)| v.clone()).unwrap_or(Value::Undef))
}
