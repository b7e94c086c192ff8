//! get, set — scoped variable access through the path traversal.

use xsh_types::{check_type, ArgSpec, Argv, CommandSpec, Value, XshResult, SCOPE_ARG};

use super::Command;
use crate::engine::Engine;
use crate::scope::Scope;

fn path_keys(path: Value) -> XshResult<Vec<Value>> {
    check_type(&path, &["string", "int", "sequence"])?;
    Ok(match path {
        Value::Seq(keys) => keys,
        other => vec![other],
    })
}

/// Read a variable (or dotted path given as a sequence) from the scope.
pub struct GetVar;

impl Command for GetVar {
    fn name(&self) -> &str {
        "get"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("get")
            .arg(ArgSpec::required(SCOPE_ARG))
            .arg(ArgSpec::required("path"))
    }

    fn call(&self, argv: Argv, _engine: &Engine, scope: &mut Scope) -> XshResult<Value> {
        scope.get_path(&path_keys(argv.get("path"))?, Value::Undef)
    }
}

/// Write a variable (or dotted path given as a sequence) into the scope.
/// Returns the written value.
pub struct SetVar;

impl Command for SetVar {
    fn name(&self) -> &str {
        "set"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("set")
            .arg(ArgSpec::required(SCOPE_ARG))
            .arg(ArgSpec::required("path"))
            .arg(ArgSpec::required("value"))
    }

    fn call(&self, argv: Argv, _engine: &Engine, scope: &mut Scope) -> XshResult<Value> {
        let value = argv.get("value");
        scope.set_path(&path_keys(argv.get("path"))?, value.clone())?;
        Ok(value)
    }
}
