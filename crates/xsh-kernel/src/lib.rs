//! xsh-kernel — the xsh expression engine.
//!
//! This crate provides:
//!
//! - **Normalizer**: textual pre-pass extracting quoted literals, signed
//!   numbers and brace groups into scope placeholders
//! - **Splitter**: recursive split by operator priority into a subcommand tree
//! - **Converter**: the classification ladder turning leaf tokens into values
//! - **Math**: left-fold evaluation of operator chains
//! - **Executor**: operator folds and the command argument-binding protocol
//! - **Templates**: directive expansion for JS-like and JSON host files
//! - **Engine**: the configured instance tying the registries together
//!
//! # Example
//!
//! ```
//! use xsh_kernel::{Engine, Value};
//!
//! let engine = Engine::with_core().unwrap();
//! let mut scope = engine.new_scope();
//! let v = engine.parse("((1+2)*3-4)/5", &mut scope).unwrap();
//! assert_eq!(v, Value::Int(1));
//! ```

pub mod commands;
pub mod convert;
pub mod engine;
pub mod exec;
pub mod math;
pub mod normalize;
pub mod plugin;
pub mod rules;
pub mod scope;
pub mod split;
pub mod template;

pub use commands::{Command, CommandRegistry};
pub use engine::{Engine, EngineConfig, Plugin};
pub use plugin::core_plugin;
pub use rules::{Converted, OpKind, RuleDef, Rules, TemplateKind};
pub use scope::{is_runnable_variable, is_variable, Scope};
pub use split::Node;

// Re-export the shared data types so embedders only need one import.
pub use xsh_types::{
    ArgSpec, Argv, Callable, CommandSpec, CompiledSpec, Deferred, Error, Map, Value, XshResult,
};
