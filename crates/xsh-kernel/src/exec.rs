//! The executor: operator folds over the subcommand tree, and the command
//! argument-binding protocol.
//!
//! Evaluation folds the tree bottom-up. Leaves go through the converter;
//! internal nodes apply their operator's fold. The async duals await any
//! deferred child before the fold proceeds, which keeps effect ordering
//! identical to sync mode.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use xsh_types::{check_args_len, Argv, CompiledSpec, Error, Value, XshResult, MODE_ARG, SCOPE_ARG};

use crate::engine::Engine;
use crate::rules::{OpKind, OpRule};
use crate::scope::{settle, Scope};
use crate::split::{split_command, Node};

/// The built-in command operators, lowest priority first.
pub fn operator_rules() -> Vec<OpRule> {
    fn op(name: &'static str, key: &str, order: i32, kind: OpKind) -> OpRule {
        OpRule {
            name,
            key: key.to_string(),
            order,
            kind,
        }
    }
    vec![
        op("sequence", ";", -1000, OpKind::Sequence),
        op("fail", "||", -900, OpKind::Fail),
        op("success", "&&", -800, OpKind::Success),
        op("nullish", "??", -700, OpKind::Nullish),
        op("pipe", "|", -600, OpKind::Pipe),
        op("assign", ">>", -500, OpKind::Assign),
        op("param", " ", -400, OpKind::Param),
    ]
}

impl Engine {
    /// Evaluate a source string: normalize, split, fold.
    pub fn parse(&self, source: &str, scope: &mut Scope) -> XshResult<Value> {
        let text = self.normalize(source, scope)?;
        self.exec_str(&text, scope)
    }

    /// [`Engine::parse`] with `scope.context` seeded first.
    pub fn parse_with_context(
        &self,
        source: &str,
        context: Value,
        scope: &mut Scope,
    ) -> XshResult<Value> {
        scope.set("context", context);
        self.parse(source, scope)
    }

    /// Async dual of [`Engine::parse`]. The returned value is settled — a
    /// trailing deferred chain is awaited before returning.
    pub async fn parse_async(&self, source: &str, scope: &mut Scope) -> XshResult<Value> {
        let text = self.normalize(source, scope)?;
        let value = self.exec_str_async(&text, scope).await?;
        settle(value).await
    }

    /// Async dual of [`Engine::parse_with_context`].
    pub async fn parse_with_context_async(
        &self,
        source: &str,
        context: Value,
        scope: &mut Scope,
    ) -> XshResult<Value> {
        scope.set("context", context);
        self.parse_async(source, scope).await
    }

    /// Split and evaluate already-normalized text.
    pub(crate) fn exec_str(&self, text: &str, scope: &mut Scope) -> XshResult<Value> {
        let node = split_command(self, text);
        self.exec_node(&node, scope)
    }

    pub(crate) fn exec_str_async<'a>(
        &'a self,
        text: &'a str,
        scope: &'a mut Scope,
    ) -> BoxFuture<'a, XshResult<Value>> {
        Box::pin(async move {
            let node = split_command(self, text);
            self.exec_node_async(&node, scope).await
        })
    }

    fn exec_node(&self, node: &Node, scope: &mut Scope) -> XshResult<Value> {
        let Node::Op { kind, children } = node else {
            let Node::Leaf(token) = node else {
                return Ok(Value::Undef);
            };
            return self.convert(Value::Str(token.clone()), scope);
        };
        match kind {
            OpKind::Sequence => {
                let mut result = Value::Undef;
                for child in children {
                    let v = self.exec_node(child, scope)?;
                    if !matches!(v, Value::Undef) {
                        result = v;
                    }
                }
                Ok(result)
            }
            OpKind::Fail => {
                let mut last = Value::Undef;
                for child in children {
                    let v = self.exec_node(child, scope)?;
                    if v.truthy() {
                        return Ok(v);
                    }
                    last = v;
                }
                Ok(last)
            }
            OpKind::Success => {
                let mut last = Value::Undef;
                for child in children {
                    let v = self.exec_node(child, scope)?;
                    if !v.truthy() {
                        return Ok(v);
                    }
                    last = v;
                }
                Ok(last)
            }
            OpKind::Nullish => {
                let mut last = Value::Undef;
                for child in children {
                    let v = self.exec_node(child, scope)?;
                    if !v.is_nullish() {
                        return Ok(v);
                    }
                    last = v;
                }
                Ok(last)
            }
            OpKind::Pipe => {
                let Some(first) = children.first() else {
                    return Ok(Value::Undef);
                };
                let mut result = self.exec_node(first, scope)?;
                for child in &children[1..] {
                    let saved = scope.take_local("context");
                    scope.set("context", result);
                    let next = self.exec_node(child, scope);
                    match saved {
                        Some(v) => scope.set("context", v),
                        None => {
                            scope.take_local("context");
                        }
                    }
                    result = next?;
                }
                Ok(result)
            }
            OpKind::Assign => {
                let Some(first) = children.first() else {
                    return Ok(Value::Undef);
                };
                let result = self.exec_node(first, scope)?;
                for child in &children[1..] {
                    let target = self.exec_node(child, scope)?;
                    let keys = assignment_keys(target);
                    scope.set_path(&keys, result.clone())?;
                }
                Ok(result)
            }
            OpKind::Param => self.param_fold(children, scope),
        }
    }

    fn exec_node_async<'a>(
        &'a self,
        node: &'a Node,
        scope: &'a mut Scope,
    ) -> BoxFuture<'a, XshResult<Value>> {
        Box::pin(async move {
            let Node::Op { kind, children } = node else {
                let Node::Leaf(token) = node else {
                    return Ok(Value::Undef);
                };
                return self.convert_async(Value::Str(token.clone()), scope).await;
            };
            match kind {
                OpKind::Sequence => {
                    let mut result = Value::Undef;
                    for child in children {
                        let v = settle(self.exec_node_async(child, scope).await?).await?;
                        if !matches!(v, Value::Undef) {
                            result = v;
                        }
                    }
                    Ok(result)
                }
                OpKind::Fail => {
                    let mut last = Value::Undef;
                    for child in children {
                        let v = settle(self.exec_node_async(child, scope).await?).await?;
                        if v.truthy() {
                            return Ok(v);
                        }
                        last = v;
                    }
                    Ok(last)
                }
                OpKind::Success => {
                    let mut last = Value::Undef;
                    for child in children {
                        let v = settle(self.exec_node_async(child, scope).await?).await?;
                        if !v.truthy() {
                            return Ok(v);
                        }
                        last = v;
                    }
                    Ok(last)
                }
                OpKind::Nullish => {
                    let mut last = Value::Undef;
                    for child in children {
                        let v = settle(self.exec_node_async(child, scope).await?).await?;
                        if !v.is_nullish() {
                            return Ok(v);
                        }
                        last = v;
                    }
                    Ok(last)
                }
                OpKind::Pipe => {
                    let Some(first) = children.first() else {
                        return Ok(Value::Undef);
                    };
                    let mut result = settle(self.exec_node_async(first, scope).await?).await?;
                    for child in &children[1..] {
                        let saved = scope.take_local("context");
                        scope.set("context", result);
                        let next = self.exec_node_async(child, scope).await;
                        match saved {
                            Some(v) => scope.set("context", v),
                            None => {
                                scope.take_local("context");
                            }
                        }
                        result = settle(next?).await?;
                    }
                    Ok(result)
                }
                OpKind::Assign => {
                    let Some(first) = children.first() else {
                        return Ok(Value::Undef);
                    };
                    let result = settle(self.exec_node_async(first, scope).await?).await?;
                    for child in &children[1..] {
                        let target = settle(self.exec_node_async(child, scope).await?).await?;
                        let keys = assignment_keys(target);
                        scope.set_path(&keys, result.clone())?;
                    }
                    Ok(result)
                }
                OpKind::Param => self.param_fold_async(children, scope).await,
            }
        })
    }

    /// The ␠ fold: command application when the first part names a command
    /// or resolves to a callable; otherwise a parameter sequence.
    fn param_fold(&self, children: &[Node], scope: &mut Scope) -> XshResult<Value> {
        let parts = param_parts(children);
        let Some((first, rest)) = parts.split_first() else {
            return Ok(Value::Undef);
        };
        if rest.is_empty() {
            return self.exec_node(first, scope);
        }
        if let Node::Leaf(name) = first {
            if self.commands().contains(name) {
                let mut tokens = Vec::with_capacity(rest.len());
                for node in rest {
                    tokens.push(self.exec_node(node, scope)?);
                }
                return self.dispatch(name, tokens, scope);
            }
        }
        let head = self.exec_node(first, scope)?;
        let mut values = Vec::with_capacity(rest.len());
        for node in rest {
            values.push(self.exec_node(node, scope)?);
        }
        if let Value::Fn(f) = head {
            return f.invoke(&values);
        }
        let mut items = vec![head];
        items.extend(values);
        Ok(Value::Seq(items))
    }

    async fn param_fold_async(&self, children: &[Node], scope: &mut Scope) -> XshResult<Value> {
        let parts = param_parts(children);
        let Some((first, rest)) = parts.split_first() else {
            return Ok(Value::Undef);
        };
        if rest.is_empty() {
            return self.exec_node_async(first, scope).await;
        }
        if let Node::Leaf(name) = first {
            if self.commands().contains(name) {
                let mut tokens = Vec::with_capacity(rest.len());
                for node in rest {
                    let v = settle(self.exec_node_async(node, scope).await?).await?;
                    tokens.push(v);
                }
                return self.dispatch_async(name, tokens, scope).await;
            }
        }
        let head = settle(self.exec_node_async(first, scope).await?).await?;
        let mut values = Vec::with_capacity(rest.len());
        for node in rest {
            values.push(settle(self.exec_node_async(node, scope).await?).await?);
        }
        if let Value::Fn(f) = head {
            return f.invoke(&values);
        }
        let mut items = vec![head];
        items.extend(values);
        Ok(Value::Seq(items))
    }

    /// Bind `tokens` against a registered command and invoke its callback.
    pub fn dispatch(
        &self,
        name: &str,
        tokens: Vec<Value>,
        scope: &mut Scope,
    ) -> XshResult<Value> {
        let Some(registered) = self.commands().get(name) else {
            return Err(unknown_command(name));
        };
        debug!(command = name, "dispatching");
        let argv = bind_args(&registered.spec, tokens)?;
        registered.command.call(argv, self, scope)
    }

    /// Async dual of [`Engine::dispatch`].
    pub async fn dispatch_async(
        &self,
        name: &str,
        tokens: Vec<Value>,
        scope: &mut Scope,
    ) -> XshResult<Value> {
        let Some(registered) = self.commands().get(name) else {
            return Err(unknown_command(name));
        };
        debug!(command = name, "dispatching (async)");
        let argv = bind_args(&registered.spec, tokens)?;
        registered.command.call_async(argv, self, scope).await
    }

    /// Invoke a foreign callable (obtained through `$global.…`) with the
    /// argument list verbatim — no binding protocol.
    pub fn exec_fn(&self, callable: &xsh_types::Callable, args: &[Value]) -> XshResult<Value> {
        callable.invoke(args)
    }
}

/// Param children with empty leaves dropped (artifacts of splitting around
/// spaces that survived normalization, e.g. after `;`).
fn param_parts(children: &[Node]) -> Vec<&Node> {
    children
        .iter()
        .filter(|n| !matches!(n, Node::Leaf(s) if s.is_empty()))
        .collect()
}

/// An assignment target is either a path (sequence of keys) or one name.
fn assignment_keys(target: Value) -> Vec<Value> {
    match target {
        Value::Seq(keys) => keys,
        other => vec![other],
    }
}

/// Convert a kebab-case long option to its camelCase argument name.
pub(crate) fn kebab_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, part) in s.split('-').filter(|p| !p.is_empty()).enumerate() {
        if i == 0 {
            out.push_str(part);
        } else {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

const POSITION_MSG: &str =
    "Required argument before optional argument, or in the variadic argument";

fn unknown_command(name: &str) -> Error {
    Error::property_not_found(json!({ "command": name }))
}

/// The argument-binding protocol.
///
/// Walks the input tokens against the declared descriptors: plain tokens
/// fill positional slots (or the trailing variadic), `--long` options bind
/// by camelCased name, `-abc` runs OR flag weights into `mode`. Once a named
/// option or flag has appeared, plain positionals are forbidden; once the
/// positional variadic has started collecting, options and flags are.
pub(crate) fn bind_args(compiled: &Arc<CompiledSpec>, tokens: Vec<Value>) -> XshResult<Argv> {
    let spec = &compiled.spec;
    let declared = &spec.args;
    // A command that declares no arguments accepts none.
    if declared.is_empty() {
        check_args_len(&tokens, 0)?;
    }
    let mut slots: Vec<Option<Value>> = vec![None; declared.len()];
    let mut tail: Vec<Value> = Vec::new();
    let mut mode_mask: i64 = 0;
    let mut flags_seen = false;
    let mut seen_named = false;
    let mut variadic_started = false;
    let mut open_long: Option<usize> = None;
    let mut open_long_filled = false;

    let positional: Vec<usize> = declared
        .iter()
        .enumerate()
        .filter(|(_, a)| a.name != SCOPE_ARG && a.name != MODE_ARG)
        .map(|(i, _)| i)
        .collect();
    let mut next_pos = 0usize;

    fn close_long(
        declared: &[xsh_types::ArgSpec],
        slots: &mut [Option<Value>],
        open: &mut Option<usize>,
        filled: bool,
    ) {
        // A long option with no explicit value is a boolean flag.
        if let Some(i) = open.take() {
            if !filled && !declared[i].variadic {
                slots[i] = Some(Value::Bool(true));
            }
        }
    }

    for token in tokens {
        if let Some(option) = long_option(&token) {
            close_long(declared, &mut slots, &mut open_long, open_long_filled);
            if variadic_started {
                return Err(Error::wrong_argument_position(json!({
                    "command": spec.name,
                    "option": option,
                    "message": POSITION_MSG,
                })));
            }
            let key = kebab_to_camel(&option);
            let Some(i) = compiled.arg_position(&key) else {
                return Err(Error::property_not_found(json!({
                    "command": spec.name,
                    "argument": key,
                })));
            };
            seen_named = true;
            open_long = Some(i);
            open_long_filled = false;
        } else if let Some(run) = short_flag_run(&token) {
            close_long(declared, &mut slots, &mut open_long, open_long_filled);
            if variadic_started {
                return Err(Error::wrong_argument_position(json!({
                    "command": spec.name,
                    "flags": run,
                    "message": POSITION_MSG,
                })));
            }
            for ch in run.chars() {
                let Some(weight) = spec.flag_weight(ch) else {
                    return Err(Error::property_not_found(json!({
                        "command": spec.name,
                        "flag": ch.to_string(),
                    })));
                };
                mode_mask |= weight;
            }
            if compiled.arg_position(MODE_ARG).is_none() {
                return Err(Error::property_not_found(json!({
                    "command": spec.name,
                    "flags": run,
                    "message": "command declares no mode argument",
                })));
            }
            flags_seen = true;
            seen_named = true;
        } else if let Some(i) = open_long {
            let arg = &declared[i];
            if arg.variadic {
                tail.push(token);
            } else if !open_long_filled {
                slots[i] = Some(token);
                open_long_filled = true;
            } else {
                return Err(Error::wrong_argument_position(json!({
                    "command": spec.name,
                    "argument": arg.name,
                    "message": POSITION_MSG,
                })));
            }
        } else if seen_named {
            return Err(Error::wrong_argument_position(json!({
                "command": spec.name,
                "message": POSITION_MSG,
            })));
        } else if next_pos < positional.len() {
            let i = positional[next_pos];
            if declared[i].variadic {
                tail.push(token);
                variadic_started = true;
            } else {
                slots[i] = Some(token);
                next_pos += 1;
            }
        } else if positional.is_empty() {
            return Err(Error::arguments_length_invalid(json!({
                "command": spec.name,
                "message": "must be equal to 0",
            })));
        } else {
            return Err(Error::arguments_length_invalid(json!({
                "command": spec.name,
                "message": format!("must be at most {}", positional.len()),
            })));
        }
    }
    close_long(declared, &mut slots, &mut open_long, open_long_filled);

    // Implicit slots, defaults, required checks.
    for (i, arg) in declared.iter().enumerate() {
        if arg.name == SCOPE_ARG {
            slots[i] = Some(Value::Undef);
            continue;
        }
        if arg.name == MODE_ARG {
            let v = if flags_seen {
                Value::Int(mode_mask)
            } else {
                arg.default.clone().unwrap_or(Value::Int(0))
            };
            slots[i] = Some(v);
            continue;
        }
        if arg.variadic {
            if !tail.is_empty() {
                slots[i] = Some(Value::Seq(std::mem::take(&mut tail)));
            } else if let Some(default) = &arg.default {
                slots[i] = Some(default.clone());
            } else if arg.required {
                return Err(Error::property_required(json!({
                    "command": spec.name,
                    "argument": arg.name,
                })));
            } else {
                slots[i] = Some(Value::Seq(Vec::new()));
            }
            continue;
        }
        if slots[i].is_none() {
            if let Some(default) = &arg.default {
                slots[i] = Some(default.clone());
            } else if arg.required {
                return Err(Error::property_required(json!({
                    "command": spec.name,
                    "argument": arg.name,
                })));
            } else {
                slots[i] = Some(Value::Undef);
            }
        }
    }

    let values = slots
        .into_iter()
        .map(|s| s.unwrap_or(Value::Undef))
        .collect();
    Ok(Argv::new(Arc::clone(compiled), values))
}

fn long_option(token: &Value) -> Option<String> {
    match token {
        Value::Str(s) if s.starts_with("--") && s.len() > 2 => Some(s[2..].to_string()),
        _ => None,
    }
}

fn short_flag_run(token: &Value) -> Option<String> {
    match token {
        Value::Str(s)
            if s.starts_with('-') && s.len() > 1 && !s.starts_with("--") =>
        {
            Some(s[1..].to_string())
        }
        _ => None,
    }
}
