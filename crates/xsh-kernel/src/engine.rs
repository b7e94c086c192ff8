//! The engine — a configured instance of the interpreter.
//!
//! An `Engine` is built once from an `EngineConfig` (plugins first,
//! recursively, then commands, then rules) and is read-only afterwards
//! except for the global variable store, which `set_var` and evaluation may
//! write. Scopes are created per evaluation and layer over that store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use xsh_types::{Value, XshResult};

use crate::commands::{Command, CommandRegistry};
use crate::rules::{RuleDef, Rules};
use crate::scope::Scope;

/// Configuration installed into an engine: plugins (recursive), commands,
/// rules, system variables for templates, and seed entries for the global
/// variable store (e.g. the `global` ambient bridge).
#[derive(Default)]
pub struct EngineConfig {
    pub plugins: Vec<Plugin>,
    pub commands: Vec<Arc<dyn Command>>,
    pub rules: Vec<RuleDef>,
    pub system_vars: Vec<(String, Value)>,
    pub globals: Vec<(String, Value)>,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plugin(mut self, plugin: Plugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn command(mut self, command: Arc<dyn Command>) -> Self {
        self.commands.push(command);
        self
    }

    pub fn rule(mut self, rule: RuleDef) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn system_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.system_vars.push((name.into(), value));
        self
    }

    pub fn global(mut self, name: impl Into<String>, value: Value) -> Self {
        self.globals.push((name.into(), value));
        self
    }
}

/// A named bundle of configuration. Plugins compose: a plugin's config may
/// carry further plugins, flattened depth-first at install time.
pub struct Plugin {
    pub name: String,
    pub config: EngineConfig,
}

impl Plugin {
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

/// The configured interpreter instance.
pub struct Engine {
    rules: Rules,
    commands: CommandRegistry,
    globals: Arc<Mutex<HashMap<String, Value>>>,
    system: HashMap<String, Value>,
}

impl Engine {
    /// Build an engine from a configuration.
    pub fn new(config: EngineConfig) -> XshResult<Self> {
        let mut engine = Self {
            rules: Rules::default(),
            commands: CommandRegistry::new(),
            globals: Arc::new(Mutex::new(HashMap::new())),
            system: HashMap::new(),
        };
        engine.install(config)?;
        Ok(engine)
    }

    /// An engine with just the core plugin installed.
    pub fn with_core() -> XshResult<Self> {
        Self::new(EngineConfig::new().plugin(crate::plugin::core_plugin()))
    }

    fn install(&mut self, config: EngineConfig) -> XshResult<()> {
        for plugin in config.plugins {
            debug!(plugin = %plugin.name, "installing plugin");
            self.install(plugin.config)?;
        }
        for command in config.commands {
            self.commands.register(command)?;
        }
        for rule in config.rules {
            self.rules.register(rule);
        }
        for (name, value) in config.system_vars {
            self.system.insert(name, value);
        }
        if !config.globals.is_empty() {
            let mut globals = self.lock_globals();
            for (name, value) in config.globals {
                globals.insert(name, value);
            }
        }
        Ok(())
    }

    fn lock_globals(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.globals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A fresh scope over this engine's global store.
    pub fn new_scope(&self) -> Scope {
        Scope::with_globals(Arc::clone(&self.globals))
    }

    /// Write a name into the global variable store.
    pub fn set_var(&self, name: impl Into<String>, value: Value) {
        self.lock_globals().insert(name.into(), value);
    }

    /// Read a name from the global variable store.
    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.lock_globals().get(name).cloned()
    }

    /// A system variable for `__XSH_SYSTEM_*__` template constants.
    pub fn system_var(&self, name: &str) -> Option<Value> {
        self.system.get(name).cloned()
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }
}
