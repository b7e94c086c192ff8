//! The converter: classification ladder for leaf tokens.
//!
//! A leaf string is tried against the convert-category rules in order; each
//! rule either produces a value or skips to let the next one look. The
//! effective ladder: keywords, numbers, flag markers, math chains, variable
//! paths, parenthesized expressions, array and object literals, command
//! shapes, and finally no-argument invocation of bare command names. A token
//! no rule claims stays a plain string.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;

use xsh_types::{Map, Value, XshResult};

use crate::engine::Engine;
use crate::math;
use crate::rules::{ConvertRule, Converted};
use crate::scope::{self, is_runnable_variable, is_variable, key_name, Scope};

impl Engine {
    /// Resolve a scalar token to a value. Non-string inputs pass through
    /// unchanged; a string no rule claims is returned as-is.
    pub fn convert(&self, value: Value, scope: &mut Scope) -> XshResult<Value> {
        let Value::Str(token) = &value else {
            return Ok(value);
        };
        let token = token.clone();
        for rule in self.rules().convert() {
            if let Converted::Value(v) = (rule.apply)(self, scope, &token)? {
                return Ok(v);
            }
        }
        Ok(value)
    }

    /// Async dual of [`Engine::convert`]; rules with an async callback use
    /// it, the rest run their sync callback.
    pub fn convert_async<'a>(
        &'a self,
        value: Value,
        scope: &'a mut Scope,
    ) -> BoxFuture<'a, XshResult<Value>> {
        Box::pin(async move {
            let Value::Str(token) = &value else {
                return Ok(value);
            };
            let token = token.clone();
            for rule in self.rules().convert() {
                let outcome = match &rule.apply_async {
                    Some(apply) => apply(self, scope, &token).await?,
                    None => (rule.apply)(self, scope, &token)?,
                };
                if let Converted::Value(v) = outcome {
                    return Ok(v);
                }
            }
            Ok(value)
        })
    }

    /// Force-evaluation (`$$`): a string re-enters the converter ladder in
    /// the same scope, a callable is invoked with no arguments, anything
    /// else (deferreds included, in sync mode) passes through.
    pub fn force_eval(&self, value: Value, scope: &mut Scope) -> XshResult<Value> {
        match value {
            Value::Str(s) => self.convert(Value::Str(s), scope),
            Value::Fn(f) => f.invoke(&[]),
            other => Ok(other),
        }
    }

    /// Async dual of [`Engine::force_eval`]: a deferred target is awaited
    /// first, then the force rules apply to what it resolved to.
    pub fn force_eval_async<'a>(
        &'a self,
        value: Value,
        scope: &'a mut Scope,
    ) -> BoxFuture<'a, XshResult<Value>> {
        Box::pin(async move {
            match value {
                Value::Deferred(d) => {
                    let inner = d.wait().await?;
                    self.force_eval_async(inner, scope).await
                }
                Value::Str(s) => self.convert_async(Value::Str(s), scope).await,
                Value::Fn(f) => f.invoke(&[]),
                other => Ok(other),
            }
        })
    }
}

/// The built-in converter ladder, in order.
pub fn convert_rules() -> Vec<ConvertRule> {
    vec![
        keywords_rule(),
        number_rule(),
        flag_rule(),
        math_rule(),
        variable_rule(),
        paren_rule(),
        array_rule(),
        map_rule(),
        command_rule(),
        bare_command_rule(),
    ]
}

fn sync_rule(
    name: &'static str,
    order: i32,
    apply: impl Fn(&Engine, &mut Scope, &str) -> XshResult<Converted> + Send + Sync + 'static,
) -> ConvertRule {
    ConvertRule {
        name,
        order,
        apply: Arc::new(apply),
        apply_async: None,
    }
}

/// `null`, `undefined`, `true`, `false` and the empty token.
fn keywords_rule() -> ConvertRule {
    sync_rule("keywords", -900, |_, _, token| {
        Ok(match token {
            "" | "undefined" => Converted::Value(Value::Undef),
            "null" => Converted::Value(Value::Null),
            "true" => Converted::Value(Value::Bool(true)),
            "false" => Converted::Value(Value::Bool(false)),
            _ => Converted::Skip,
        })
    })
}

fn number_rule() -> ConvertRule {
    let int_re = Regex::new(r"^-?\d+$").expect("built-in regex");
    let float_re = Regex::new(r"^-?\d+\.\d+$").expect("built-in regex");
    sync_rule("number", -800, move |_, _, token| {
        if int_re.is_match(token) {
            if let Ok(i) = token.parse::<i64>() {
                return Ok(Converted::Value(Value::Int(i)));
            }
        }
        if float_re.is_match(token) {
            if let Ok(f) = token.parse::<f64>() {
                return Ok(Converted::Value(Value::Float(f)));
            }
        }
        Ok(Converted::Skip)
    })
}

/// Tokens starting with `-` pass through untouched; the dispatcher reads
/// them as short-flag runs or long options.
fn flag_rule() -> ConvertRule {
    sync_rule("flag", -700, |_, _, token| {
        if token.starts_with('-') {
            Ok(Converted::Value(Value::Str(token.to_string())))
        } else {
            Ok(Converted::Skip)
        }
    })
}

/// Math chains: split on the first operator (in math-rule order) the token
/// contains, convert the operands, left-fold. A token that is one balanced
/// group is left for the paren/array/map rules — operators inside the group
/// belong to its elements, not to this level.
fn math_rule() -> ConvertRule {
    ConvertRule {
        name: "math",
        order: -600,
        apply: Arc::new(|engine, scope, token| {
            if single_group(token) {
                return Ok(Converted::Skip);
            }
            for rule in engine.rules().math() {
                if !token.contains(rule.key.as_str()) {
                    continue;
                }
                let mut operands = Vec::new();
                for piece in token.split(rule.key.as_str()) {
                    operands.push(engine.convert(Value::Str(piece.to_string()), scope)?);
                }
                return Ok(Converted::Value(math::fold(rule, &operands)?));
            }
            Ok(Converted::Skip)
        }),
        apply_async: Some(Arc::new(math_async)),
    }
}

fn math_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        if single_group(token) {
            return Ok(Converted::Skip);
        }
        for rule in engine.rules().math() {
            if !token.contains(rule.key.as_str()) {
                continue;
            }
            let mut operands = Vec::new();
            for piece in token.split(rule.key.as_str()) {
                let v = engine
                    .convert_async(Value::Str(piece.to_string()), scope)
                    .await?;
                operands.push(scope::settle(v).await?);
            }
            return Ok(Converted::Value(math::fold(rule, &operands)?));
        }
        Ok(Converted::Skip)
    })
}

/// True when the token is one balanced `(…)`, `[…]` or `{…}` group: the
/// delimiter opened by the first byte closes at the last byte. `(1)+(2)` is
/// not one group — its first group closes mid-token.
fn single_group(token: &str) -> bool {
    let bytes = token.as_bytes();
    let (open, close) = match bytes.first() {
        Some(b'(') => (b'(', b')'),
        Some(b'[') => (b'[', b']'),
        Some(b'{') => (b'{', b'}'),
        _ => return false,
    };
    if bytes.len() < 2 || bytes[bytes.len() - 1] != close {
        return false;
    }
    let mut depth = 0usize;
    for (i, &b) in bytes.iter().enumerate() {
        if b == open {
            depth += 1;
        } else if b == close {
            depth -= 1;
            if depth == 0 {
                return i == bytes.len() - 1;
            }
        }
    }
    false
}

/// `$path` and `$$path` references. Each dot segment is converted on its
/// own, so `$a.(1+1)` indexes with the computed key.
fn variable_rule() -> ConvertRule {
    ConvertRule {
        name: "variable",
        order: -500,
        apply: Arc::new(|engine, scope, token| {
            if !is_variable(token) {
                return Ok(Converted::Skip);
            }
            let force = is_runnable_variable(token);
            let start = if force { 2 } else { 1 };
            let body = &token[start..];
            if body.is_empty() {
                return Ok(Converted::Skip);
            }
            let mut keys = Vec::new();
            for segment in body.split('.') {
                keys.push(convert_segment(engine, scope, segment)?);
            }
            let value = scope.get_path(&keys, Value::Undef)?;
            let value = if force {
                engine.force_eval(value, scope)?
            } else {
                value
            };
            Ok(Converted::Value(value))
        }),
        apply_async: Some(Arc::new(variable_async)),
    }
}

fn variable_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        if !is_variable(token) {
            return Ok(Converted::Skip);
        }
        let force = is_runnable_variable(token);
        let start = if force { 2 } else { 1 };
        let body = &token[start..];
        if body.is_empty() {
            return Ok(Converted::Skip);
        }
        let mut keys = Vec::new();
        for segment in body.split('.') {
            if segment.starts_with('$') {
                let v = engine
                    .convert_async(Value::Str(segment.to_string()), scope)
                    .await?;
                keys.push(scope::settle(v).await?);
            } else {
                keys.push(convert_segment(engine, scope, segment)?);
            }
        }
        let value = scope.get_path(&keys, Value::Undef)?;
        let value = if force {
            engine.force_eval_async(value, scope).await?
        } else {
            value
        };
        Ok(Converted::Value(value))
    })
}

/// Convert one dotted-path segment. Variables and placeholders recurse into
/// the ladder; numeric segments index; everything else is a literal key.
fn convert_segment(engine: &Engine, scope: &mut Scope, segment: &str) -> XshResult<Value> {
    if segment.starts_with('$') {
        return engine.convert(Value::Str(segment.to_string()), scope);
    }
    if let Ok(i) = segment.parse::<i64>() {
        return Ok(Value::Int(i));
    }
    Ok(Value::Str(segment.to_string()))
}

/// `(expr)` — evaluate the inner text as a full expression.
fn paren_rule() -> ConvertRule {
    ConvertRule {
        name: "parens",
        order: -400,
        apply: Arc::new(|engine, scope, token| {
            let Some(inner) = paren_body(token) else {
                return Ok(Converted::Skip);
            };
            Ok(Converted::Value(engine.exec_str(inner, scope)?))
        }),
        apply_async: Some(Arc::new(paren_async)),
    }
}

fn paren_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        let Some(inner) = paren_body(token) else {
            return Ok(Converted::Skip);
        };
        Ok(Converted::Value(engine.exec_str_async(inner, scope).await?))
    })
}

fn paren_body(token: &str) -> Option<&str> {
    if token.len() >= 2 && token.starts_with('(') && token.ends_with(')') {
        Some(&token[1..token.len() - 1])
    } else {
        None
    }
}

/// `[a,b,c]` — ordered sequence literal.
fn array_rule() -> ConvertRule {
    ConvertRule {
        name: "array",
        order: -300,
        apply: Arc::new(|engine, scope, token| {
            let Some(inner) = delimited_body(token, '[', ']') else {
                return Ok(Converted::Skip);
            };
            let mut items = Vec::new();
            for piece in inner.split(',') {
                if piece.is_empty() {
                    continue;
                }
                items.push(engine.convert(Value::Str(piece.to_string()), scope)?);
            }
            Ok(Converted::Value(Value::Seq(items)))
        }),
        apply_async: Some(Arc::new(array_async)),
    }
}

fn array_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        let Some(inner) = delimited_body(token, '[', ']') else {
            return Ok(Converted::Skip);
        };
        let mut items = Vec::new();
        for piece in inner.split(',') {
            if piece.is_empty() {
                continue;
            }
            let v = engine
                .convert_async(Value::Str(piece.to_string()), scope)
                .await?;
            items.push(v);
        }
        // Await pending elements once the whole literal has been converted.
        if items.iter().any(|v| matches!(v, Value::Deferred(_))) {
            let mut settled = Vec::with_capacity(items.len());
            for v in items {
                settled.push(scope::settle(v).await?);
            }
            items = settled;
        }
        Ok(Converted::Value(Value::Seq(items)))
    })
}

/// `{k: v, v2}` — keyed mapping literal; keyless items get integer indices
/// in positional order.
fn map_rule() -> ConvertRule {
    ConvertRule {
        name: "map",
        order: -200,
        apply: Arc::new(|engine, scope, token| {
            let Some(inner) = delimited_body(token, '{', '}') else {
                return Ok(Converted::Skip);
            };
            let mut map = Map::new();
            let mut auto_index = 0i64;
            for piece in inner.split(',') {
                if piece.is_empty() {
                    continue;
                }
                match piece.split_once(':') {
                    Some((k, v)) => {
                        let key = key_name(&engine.convert(Value::Str(k.to_string()), scope)?);
                        let value = engine.convert(Value::Str(v.to_string()), scope)?;
                        map.insert(key, value);
                    }
                    None => {
                        let value = engine.convert(Value::Str(piece.to_string()), scope)?;
                        map.insert(auto_index.to_string(), value);
                        auto_index += 1;
                    }
                }
            }
            Ok(Converted::Value(Value::Map(map)))
        }),
        apply_async: Some(Arc::new(map_async)),
    }
}

fn map_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        let Some(inner) = delimited_body(token, '{', '}') else {
            return Ok(Converted::Skip);
        };
        let mut map = Map::new();
        let mut auto_index = 0i64;
        for piece in inner.split(',') {
            if piece.is_empty() {
                continue;
            }
            match piece.split_once(':') {
                Some((k, v)) => {
                    let key = engine.convert_async(Value::Str(k.to_string()), scope).await?;
                    let value = engine.convert_async(Value::Str(v.to_string()), scope).await?;
                    map.insert(key_name(&key), scope::settle(value).await?);
                }
                None => {
                    let value = engine
                        .convert_async(Value::Str(piece.to_string()), scope)
                        .await?;
                    map.insert(auto_index.to_string(), scope::settle(value).await?);
                    auto_index += 1;
                }
            }
        }
        Ok(Converted::Value(Value::Map(map)))
    })
}

fn delimited_body(token: &str, open: char, close: char) -> Option<&str> {
    if token.len() >= 2 && token.starts_with(open) && token.ends_with(close) {
        Some(&token[open.len_utf8()..token.len() - close.len_utf8()])
    } else {
        None
    }
}

/// Tokens with spaces re-enter the splitter — the common `name arg arg`
/// command shape reached through force-evaluation or parentheses.
fn command_rule() -> ConvertRule {
    ConvertRule {
        name: "command",
        order: -100,
        apply: Arc::new(|engine, scope, token| {
            if !token.contains(' ') {
                return Ok(Converted::Skip);
            }
            Ok(Converted::Value(engine.exec_str(token, scope)?))
        }),
        apply_async: Some(Arc::new(command_async)),
    }
}

fn command_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        if !token.contains(' ') {
            return Ok(Converted::Skip);
        }
        Ok(Converted::Value(engine.exec_str_async(token, scope).await?))
    })
}

/// A bare token naming a registered command invokes it with no arguments.
fn bare_command_rule() -> ConvertRule {
    ConvertRule {
        name: "bare-command",
        order: -50,
        apply: Arc::new(|engine, scope, token| {
            if !engine.commands().contains(token) {
                return Ok(Converted::Skip);
            }
            Ok(Converted::Value(engine.dispatch(token, Vec::new(), scope)?))
        }),
        apply_async: Some(Arc::new(bare_command_async)),
    }
}

fn bare_command_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    token: &'a str,
) -> BoxFuture<'a, XshResult<Converted>> {
    Box::pin(async move {
        if !engine.commands().contains(token) {
            return Ok(Converted::Skip);
        }
        Ok(Converted::Value(
            engine.dispatch_async(token, Vec::new(), scope).await?,
        ))
    })
}
