//! The command system.
//!
//! Every command implements the `Command` trait: a declared `CommandSpec`
//! (argument descriptors plus flag table) and a callback invoked with the
//! bound `Argv`. Registration compiles the spec; the registry is read-only
//! after engine construction.
//!
//! The std set doubles as the protocol's reference implementations: between
//! them, `concat`, `async`, `random`, `min`/`max` and `get`/`set` exercise
//! positional, variadic, long-option, short-flag/mode and scope binding.

mod concat;
mod defer;
mod numbers;
mod vars;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use xsh_types::{Argv, CommandSpec, CompiledSpec, Value, XshResult};

use crate::engine::Engine;
use crate::scope::Scope;

pub use concat::Concat;
pub use defer::Defer;
pub use numbers::{Max, Min, Random};
pub use vars::{GetVar, SetVar};

/// A command callable from expressions.
#[async_trait]
pub trait Command: Send + Sync {
    /// The name commands are dispatched by.
    fn name(&self) -> &str;

    /// The declared argument schema and flag table.
    fn spec(&self) -> CommandSpec;

    /// Synchronous callback.
    fn call(&self, argv: Argv, engine: &Engine, scope: &mut Scope) -> XshResult<Value>;

    /// Asynchronous callback; defaults to the sync one. Override when the
    /// command needs to await something itself.
    async fn call_async(&self, argv: Argv, engine: &Engine, scope: &mut Scope) -> XshResult<Value> {
        self.call(argv, engine, scope)
    }
}

/// A command plus its compiled spec.
pub struct RegisteredCommand {
    pub command: Arc<dyn Command>,
    pub spec: Arc<CompiledSpec>,
}

/// Name → command store, populated at configuration time.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, RegisteredCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and store a command. A later registration under the same
    /// name replaces the earlier one.
    pub fn register(&mut self, command: Arc<dyn Command>) -> XshResult<()> {
        let spec = Arc::new(CompiledSpec::compile(command.spec())?);
        self.commands.insert(
            command.name().to_string(),
            RegisteredCommand { command, spec },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredCommand> {
        self.commands.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }
}

/// The std command set registered by the core plugin.
pub fn std_commands() -> Vec<Arc<dyn Command>> {
    vec![
        Arc::new(Concat),
        Arc::new(Defer),
        Arc::new(Random),
        Arc::new(Min),
        Arc::new(Max),
        Arc::new(GetVar),
        Arc::new(SetVar),
    ]
}
