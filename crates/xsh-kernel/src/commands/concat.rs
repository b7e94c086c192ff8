//! concat — join the variadic arguments with a delimiter.

use xsh_types::{ArgSpec, Argv, CommandSpec, Value, XshResult, MODE_ARG};

use super::Command;
use crate::engine::Engine;
use crate::scope::Scope;

/// Join stringified items. Flags: `a` trims items, `b` drops empty items,
/// `c` collapses consecutive duplicates, `D` switches the default delimiter
/// to a newline (an explicit `--delim` wins).
pub struct Concat;

impl Command for Concat {
    fn name(&self) -> &str {
        "concat"
    }

    fn spec(&self) -> CommandSpec {
        CommandSpec::new("concat")
            .flag('a', 1)
            .flag('b', 2)
            .flag('c', 4)
            .flag('D', 8)
            .arg(ArgSpec::optional(MODE_ARG, Value::Int(0)))
            .arg(ArgSpec::optional("delim", Value::Undef))
            .arg(ArgSpec::required("args").variadic())
    }

    fn call(&self, argv: Argv, _engine: &Engine, _scope: &mut Scope) -> XshResult<Value> {
        let mode = argv.mode();
        let trim = mode & 1 != 0;
        let drop_empty = mode & 2 != 0;
        let dedup = mode & 4 != 0;
        let newline_default = mode & 8 != 0;

        let delim = match argv.get("delim") {
            Value::Undef => {
                if newline_default { "\n".to_string() } else { ",".to_string() }
            }
            other => other.display(),
        };

        let mut items: Vec<String> = argv.tail("args").iter().map(Value::display).collect();
        if trim {
            items = items.into_iter().map(|s| s.trim().to_string()).collect();
        }
        if drop_empty {
            items.retain(|s| !s.is_empty());
        }
        if dedup {
            items.dedup();
        }
        Ok(Value::Str(items.join(&delim)))
    }
}
