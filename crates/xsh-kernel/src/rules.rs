//! The rule registry.
//!
//! Rules come in five categories — `parse` (text rewriters), `convert`
//! (classification ladder), `math` (operator fold steps), `command` (splitter
//! operators) and `template` (file-type-filtered rewriters). Each category is
//! kept in a stable sort by ascending `order`; insertion order breaks ties.
//! The registry is populated at configuration time and read-only afterwards.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use xsh_types::{Value, XshResult};

use crate::engine::Engine;
use crate::scope::Scope;

/// Outcome of a converter rule: either a value, or "not me, try the next".
#[derive(Debug)]
pub enum Converted {
    Value(Value),
    Skip,
}

/// Text-rewriting callback for normalizer rules.
pub type ParseFn = Arc<dyn Fn(&Engine, &mut Scope, String) -> XshResult<String> + Send + Sync>;

/// One normalizer rule.
#[derive(Clone)]
pub struct ParseRule {
    pub name: &'static str,
    pub order: i32,
    pub apply: ParseFn,
}

/// Converter callback: classify a leaf token, or skip.
pub type ConvertFn = Arc<dyn Fn(&Engine, &mut Scope, &str) -> XshResult<Converted> + Send + Sync>;

/// Async dual of a converter callback.
pub type ConvertAsyncFn = Arc<
    dyn for<'a> Fn(&'a Engine, &'a mut Scope, &'a str) -> BoxFuture<'a, XshResult<Converted>>
        + Send
        + Sync,
>;

/// One converter-ladder rule.
#[derive(Clone)]
pub struct ConvertRule {
    pub name: &'static str,
    pub order: i32,
    pub apply: ConvertFn,
    /// Used in async mode when present; otherwise `apply` serves both modes.
    pub apply_async: Option<ConvertAsyncFn>,
}

/// One fold step of a math operator: `(accumulator, operand) -> accumulator`.
pub type MathFn = Arc<dyn Fn(&Value, &Value) -> XshResult<Value> + Send + Sync>;

/// One math operator rule. Registry order doubles as the converter's
/// operator-detection order.
#[derive(Clone)]
pub struct MathRule {
    pub name: &'static str,
    /// Operator literal searched for in leaf tokens.
    pub key: String,
    pub order: i32,
    pub apply: MathFn,
}

/// Fold semantics of a command operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// `;` — run all, keep the last non-empty result.
    Sequence,
    /// `||` — first truthy result, else the last.
    Fail,
    /// `&&` — first falsy result, else the last.
    Success,
    /// `??` — first non-nullish result, else the last.
    Nullish,
    /// `|` — thread each result through `scope.context`.
    Pipe,
    /// `>>` — assign the first child's result to the remaining names.
    Assign,
    /// ␠ — command application / parameter list.
    Param,
}

/// One command (splitter) operator rule. Order is the split priority:
/// lowest binds first and sits nearest the root of the subcommand tree.
#[derive(Debug, Clone)]
pub struct OpRule {
    pub name: &'static str,
    pub key: String,
    pub order: i32,
    pub kind: OpKind,
}

/// Host-file types the template engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// JS-like sources: `//#xsh` directives, backtick inlines, constants.
    Js,
    /// JSON sources: whole-string `"#xsh …"` directives.
    Json,
}

impl TemplateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Js => "js",
            TemplateKind::Json => "json",
        }
    }
}

/// An owned regex match handed to template callbacks: capture-group texts
/// and their byte offsets within the source.
#[derive(Debug, Clone)]
pub struct TplMatch {
    groups: Vec<Option<(String, usize)>>,
}

impl TplMatch {
    pub fn from_captures(caps: &regex::Captures<'_>) -> Self {
        let groups = (0..caps.len())
            .map(|i| caps.get(i).map(|m| (m.as_str().to_string(), m.start())))
            .collect();
        Self { groups }
    }

    /// Text of capture group `i`, empty when the group did not participate.
    pub fn group(&self, i: usize) -> &str {
        self.groups
            .get(i)
            .and_then(|g| g.as_ref())
            .map(|(s, _)| s.as_str())
            .unwrap_or("")
    }

    /// Byte offset of capture group `i` in the template source.
    pub fn group_start(&self, i: usize) -> usize {
        self.groups
            .get(i)
            .and_then(|g| g.as_ref())
            .map(|(_, start)| *start)
            .unwrap_or(0)
    }
}

/// Template rewriting callback: produce the replacement for one match.
pub type TemplateFn = Arc<dyn Fn(&Engine, &mut Scope, &TplMatch) -> XshResult<String> + Send + Sync>;

/// Async dual of a template callback.
pub type TemplateAsyncFn = Arc<
    dyn for<'a> Fn(&'a Engine, &'a mut Scope, &'a TplMatch) -> BoxFuture<'a, XshResult<String>>
        + Send
        + Sync,
>;

/// One template rule.
#[derive(Clone)]
pub struct TemplateRule {
    pub name: &'static str,
    pub order: i32,
    /// File types this rule applies to; empty means all.
    pub types: Vec<TemplateKind>,
    pub regex: Regex,
    pub apply: TemplateFn,
    pub apply_async: Option<TemplateAsyncFn>,
}

impl TemplateRule {
    pub fn applies_to(&self, kind: TemplateKind) -> bool {
        self.types.is_empty() || self.types.contains(&kind)
    }
}

/// A rule of any category, as carried by an `EngineConfig`.
pub enum RuleDef {
    Parse(ParseRule),
    Convert(ConvertRule),
    Math(MathRule),
    Command(OpRule),
    Template(TemplateRule),
}

/// The per-category rule store. Immutable once the engine is built.
#[derive(Default)]
pub struct Rules {
    parse: Vec<ParseRule>,
    convert: Vec<ConvertRule>,
    math: Vec<MathRule>,
    command: Vec<OpRule>,
    template: Vec<TemplateRule>,
}

impl Rules {
    /// Append a rule to its category and restore the order-stable sort.
    pub fn register(&mut self, rule: RuleDef) {
        match rule {
            RuleDef::Parse(r) => {
                self.parse.push(r);
                self.parse.sort_by_key(|r| r.order);
            }
            RuleDef::Convert(r) => {
                self.convert.push(r);
                self.convert.sort_by_key(|r| r.order);
            }
            RuleDef::Math(r) => {
                self.math.push(r);
                self.math.sort_by_key(|r| r.order);
            }
            RuleDef::Command(r) => {
                self.command.push(r);
                self.command.sort_by_key(|r| r.order);
            }
            RuleDef::Template(r) => {
                self.template.push(r);
                self.template.sort_by_key(|r| r.order);
            }
        }
    }

    pub fn parse(&self) -> &[ParseRule] {
        &self.parse
    }

    pub fn convert(&self) -> &[ConvertRule] {
        &self.convert
    }

    pub fn math(&self) -> &[MathRule] {
        &self.math
    }

    pub fn command(&self) -> &[OpRule] {
        &self.command
    }

    pub fn template(&self) -> &[TemplateRule] {
        &self.template
    }

    /// Template rules applicable to `kind`, in order.
    pub fn template_for(&self, kind: TemplateKind) -> impl Iterator<Item = &TemplateRule> {
        self.template.iter().filter(move |r| r.applies_to(kind))
    }
}
