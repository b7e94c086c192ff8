//! async — wrap a value in a deferred result.

use xsh_types::{ArgSpec, Argv, CommandSpec, Deferred, Value, XshResult};

use super::Command;
use crate::engine::Engine;
use crate::scope::Scope;

/// The `async` command: returns its value as a `Deferred`. With `--as-array`
/// and a sequence value, each element is deferred individually instead.
pub struct Defer;

impl Command for Defer {
    fn name(&self) -> &str {
        "async"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("async")
            .arg(ArgSpec::required("value"))
            .arg(ArgSpec::optional("asArray", Value::Bool(false)))
    }

    fn call(&self, argv: Argv, _engine: &Engine, _scope: &mut Scope) -> XshResult<Value> {
        let value = argv.get("value");
        if argv.truthy("asArray") {
            let items = match value {
                Value::Seq(items) => items,
                other => vec![other],
            };
            return Ok(Value::Seq(
                items
                    .into_iter()
                    .map(|v| Value::Deferred(Deferred::ready(v)))
                    .collect(),
            ));
        }
        Ok(Value::Deferred(Deferred::ready(value)))
    }
}
