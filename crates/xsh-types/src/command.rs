//! Command schema and bound-argument types.
//!
//! A command declares an ordered list of argument descriptors plus a table of
//! single-character flags with bit-weights. Registration compiles the
//! declaration into a `CompiledSpec` carrying the name → position index the
//! dispatcher binds `--long` options through.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use crate::error::{Error, XshResult};
use crate::value::Value;

/// Reserved descriptor name: the slot receives the current scope. It
/// consumes no input token; commands reach the scope through their scope
/// parameter and the slot carries `Undef`.
pub const SCOPE_ARG: &str = "scope";

/// Reserved descriptor name: the slot receives the accumulated short-flag
/// bit-mask as an `Int`. It consumes no input token.
pub const MODE_ARG: &str = "mode";

/// One argument descriptor.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: String,
    pub required: bool,
    pub variadic: bool,
    pub default: Option<Value>,
}

impl ArgSpec {
    /// A required argument.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
            variadic: false,
            default: None,
        }
    }

    /// An optional argument with a default.
    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            required: false,
            variadic: false,
            default: Some(default),
        }
    }

    /// Mark this argument variadic (collects a trailing sequence).
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// Declared command interface: name, ordered args, flag table.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub name: String,
    pub args: Vec<ArgSpec>,
    /// Single-character flags and their bit-weights, OR-combined into `mode`.
    pub flags: Vec<(char, i64)>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            flags: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn flag(mut self, ch: char, weight: i64) -> Self {
        self.flags.push((ch, weight));
        self
    }

    pub fn flag_weight(&self, ch: char) -> Option<i64> {
        self.flags.iter().find(|(c, _)| *c == ch).map(|(_, w)| *w)
    }
}

/// A command spec compiled at registration time.
#[derive(Debug, Clone)]
pub struct CompiledSpec {
    pub spec: CommandSpec,
    /// Argument name → declared position.
    pub index: HashMap<String, usize>,
    /// Position of the variadic descriptor, if any.
    pub variadic_at: Option<usize>,
}

impl CompiledSpec {
    /// Validate the declaration and build the lookup index.
    ///
    /// At most one variadic argument is allowed and it must be declared last.
    pub fn compile(spec: CommandSpec) -> XshResult<Self> {
        let mut index = HashMap::new();
        let mut variadic_at = None;
        for (i, arg) in spec.args.iter().enumerate() {
            if arg.variadic {
                if variadic_at.is_some() || i != spec.args.len() - 1 {
                    return Err(Error::wrong_argument_position(json!({
                        "command": spec.name,
                        "argument": arg.name,
                        "message": "variadic argument must be declared last",
                    })));
                }
                variadic_at = Some(i);
            }
            index.insert(arg.name.clone(), i);
        }
        Ok(Self {
            spec,
            index,
            variadic_at,
        })
    }

    pub fn arg_position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// Arguments bound to a command's declared slots, in declaration order.
///
/// The variadic slot holds a `Seq` of the collected tail; the `mode` slot
/// holds the flag mask; the `scope` slot holds `Undef`.
#[derive(Debug, Clone)]
pub struct Argv {
    spec: Arc<CompiledSpec>,
    values: Vec<Value>,
}

impl Argv {
    pub fn new(spec: Arc<CompiledSpec>, values: Vec<Value>) -> Self {
        Self { spec, values }
    }

    /// Bound value of an argument by declared name. `Undef` when unknown.
    pub fn get(&self, name: &str) -> Value {
        self.slot(name).cloned().unwrap_or(Value::Undef)
    }

    fn slot(&self, name: &str) -> Option<&Value> {
        self.spec.arg_position(name).and_then(|i| self.values.get(i))
    }

    /// The collected variadic tail, empty for a non-variadic command.
    pub fn tail(&self, name: &str) -> &[Value] {
        match self.slot(name) {
            Some(Value::Seq(items)) => items,
            _ => &[],
        }
    }

    /// The flag bit-mask (the `mode` slot), 0 when the command has none.
    pub fn mode(&self) -> i64 {
        match self.slot(MODE_ARG) {
            Some(Value::Int(i)) => *i,
            _ => 0,
        }
    }

    pub fn truthy(&self, name: &str) -> bool {
        self.slot(name).is_some_and(Value::truthy)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_builds_index() {
        let spec = CommandSpec::new("c")
            .arg(ArgSpec::optional("a", Value::Int(1)))
            .arg(ArgSpec::required("rest").variadic());
        let compiled = CompiledSpec::compile(spec).unwrap();
        assert_eq!(compiled.arg_position("a"), Some(0));
        assert_eq!(compiled.arg_position("rest"), Some(1));
        assert_eq!(compiled.variadic_at, Some(1));
    }

    #[test]
    fn variadic_must_be_last() {
        let spec = CommandSpec::new("c")
            .arg(ArgSpec::required("rest").variadic())
            .arg(ArgSpec::required("a"));
        let err = CompiledSpec::compile(spec).unwrap_err();
        assert!(matches!(err, Error::WrongArgumentPosition(_)));
    }

    #[test]
    fn argv_accessors() {
        let spec = CommandSpec::new("c")
            .arg(ArgSpec::optional(MODE_ARG, Value::Int(0)))
            .arg(ArgSpec::required("items").variadic());
        let compiled = Arc::new(CompiledSpec::compile(spec).unwrap());
        let argv = Argv::new(
            compiled,
            vec![Value::Int(5), Value::Seq(vec![Value::Int(1), Value::Int(2)])],
        );
        assert_eq!(argv.mode(), 5);
        assert_eq!(argv.tail("items"), &[Value::Int(1), Value::Int(2)]);
        assert_eq!(argv.get("missing"), Value::Undef);
    }
}
