//! The template engine.
//!
//! Runs the template-category rules (filtered by file type) over a host
//! source, replacing directives with evaluated results. JS-like sources get
//! line (`//#xsh`), block (`//#xsht` … `///xsht`), inline (`` `#xsh …` ``)
//! and constant (`__XSH_*__`) directives; JSON sources get whole-string
//! `"#xsh …"` directives. Line and block replacements preserve the source's
//! line count.

use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::debug;

use xsh_types::{value_to_json, Value, XshResult};

use crate::engine::Engine;
use crate::rules::{TemplateKind, TemplateRule, TplMatch};
use crate::scope::Scope;

impl Engine {
    /// Expand template directives in `source` for the given file type.
    pub fn parse_template(
        &self,
        source: &str,
        kind: TemplateKind,
        scope: &mut Scope,
    ) -> XshResult<String> {
        let mut text = source.to_string();
        for rule in self.rules().template_for(kind) {
            debug!(rule = rule.name, kind = kind.as_str(), "applying template rule");
            text = self.apply_template_rule(rule, &text, scope)?;
        }
        Ok(text)
    }

    /// Async dual of [`Engine::parse_template`].
    pub async fn parse_template_async(
        &self,
        source: &str,
        kind: TemplateKind,
        scope: &mut Scope,
    ) -> XshResult<String> {
        let mut text = source.to_string();
        for rule in self.rules().template_for(kind) {
            let matches = collect_matches(rule, &text);
            let mut out = String::with_capacity(text.len());
            let mut last = 0;
            for (start, end, m) in &matches {
                out.push_str(&text[last..*start]);
                let replacement = match &rule.apply_async {
                    Some(apply) => apply(self, scope, m).await?,
                    None => (rule.apply)(self, scope, m)?,
                };
                out.push_str(&replacement);
                last = *end;
            }
            out.push_str(&text[last..]);
            text = out;
        }
        Ok(text)
    }

    fn apply_template_rule(
        &self,
        rule: &TemplateRule,
        source: &str,
        scope: &mut Scope,
    ) -> XshResult<String> {
        let matches = collect_matches(rule, source);
        let mut out = String::with_capacity(source.len());
        let mut last = 0;
        for (start, end, m) in &matches {
            out.push_str(&source[last..*start]);
            out.push_str(&(rule.apply)(self, scope, m)?);
            last = *end;
        }
        out.push_str(&source[last..]);
        Ok(out)
    }
}

type Match = (usize, usize, TplMatch);

fn collect_matches(rule: &TemplateRule, source: &str) -> Vec<Match> {
    rule.regex
        .captures_iter(source)
        .filter_map(|caps| {
            caps.get(0)
                .map(|whole| (whole.start(), whole.end(), TplMatch::from_captures(&caps)))
        })
        .collect()
}

/// The built-in template rules.
pub fn template_rules() -> Vec<TemplateRule> {
    vec![
        js_block_rule(),
        js_line_rule(),
        js_inline_rule(),
        js_constants_rule(),
        json_string_rule(),
    ]
}

/// Line-directive output: numbers and strings inline, everything else is
/// erased.
fn format_js(value: &Value) -> String {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Str(_) => value.display(),
        _ => String::new(),
    }
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

/// `//#xsht <command>` … `///xsht` — the block body lands in
/// `scope.template`, the command runs, and the replacement keeps the block's
/// line count. Ordered far below the line rule so the block is consumed
/// before inner line directives match.
fn js_block_rule() -> TemplateRule {
    let regex = Regex::new(r"(?ms)^[ \t]*//#xsht[ \t]*([^\n]*)\n(.*?)^[ \t]*///xsht[ \t]*$")
        .expect("built-in regex");
    TemplateRule {
        name: "js-block",
        order: -10000,
        types: vec![TemplateKind::Js],
        regex,
        apply: Arc::new(|engine, scope, m| {
            let result = eval_block(engine, scope, m)?;
            Ok(pad_lines(&format_js(&result), m))
        }),
        apply_async: Some(Arc::new(js_block_async)),
    }
}

fn eval_block_setup(scope: &mut Scope, m: &TplMatch) -> String {
    scope.set("template", Value::Str(m.group(2).to_string()));
    scope.set("offset", Value::Int(m.group_start(0) as i64));
    scope.set("templateOffset", Value::Int(m.group_start(2) as i64));
    m.group(1).trim().to_string()
}

fn eval_block(engine: &Engine, scope: &mut Scope, m: &TplMatch) -> XshResult<Value> {
    let command = eval_block_setup(scope, m);
    engine.parse(&command, scope)
}

fn pad_lines(text: &str, m: &TplMatch) -> String {
    let consumed = newlines(m.group(0));
    let produced = newlines(text);
    format!("{}{}", text, "\n".repeat(consumed.saturating_sub(produced)))
}

fn js_block_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    m: &'a TplMatch,
) -> BoxFuture<'a, XshResult<String>> {
    Box::pin(async move {
        let command = eval_block_setup(scope, m);
        let result = engine.parse_async(&command, scope).await?;
        Ok(pad_lines(&format_js(&result), m))
    })
}

/// `//#xsh <command>` — line directive. The command capture stops at a
/// backtick so an inline directive later on the line survives this pass;
/// trailing whitespace between command and inline stays in the output.
fn js_line_rule() -> TemplateRule {
    let regex =
        Regex::new(r"(?m)^[ \t]*//#xsh[ \t]([^`\r\n]*)(\r?\n|)").expect("built-in regex");
    TemplateRule {
        name: "js-line",
        order: -100,
        types: vec![TemplateKind::Js],
        regex,
        apply: Arc::new(|engine, scope, m| {
            let (command, trailing) = split_trailing_ws(m.group(1));
            let result = engine.parse(command, scope)?;
            Ok(format!("{}{}{}", format_js(&result), trailing, m.group(2)))
        }),
        apply_async: Some(Arc::new(js_line_async)),
    }
}

fn split_trailing_ws(raw: &str) -> (&str, &str) {
    let command = raw.trim_end();
    (command, &raw[command.len()..])
}

fn js_line_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    m: &'a TplMatch,
) -> BoxFuture<'a, XshResult<String>> {
    Box::pin(async move {
        let (command, trailing) = split_trailing_ws(m.group(1));
        let result = engine.parse_async(command, scope).await?;
        Ok(format!("{}{}{}", format_js(&result), trailing, m.group(2)))
    })
}

/// `` `#xsh <command>` `` — inline directive, substituted in place.
fn js_inline_rule() -> TemplateRule {
    let regex = Regex::new(r"`#xsh ([^`]*)`").expect("built-in regex");
    TemplateRule {
        name: "js-inline",
        order: -50,
        types: vec![TemplateKind::Js],
        regex,
        apply: Arc::new(|engine, scope, m| {
            let result = engine.parse(m.group(1).trim(), scope)?;
            Ok(format_js(&result))
        }),
        apply_async: Some(Arc::new(js_inline_async)),
    }
}

fn js_inline_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    m: &'a TplMatch,
) -> BoxFuture<'a, XshResult<String>> {
    Box::pin(async move {
        let result = engine.parse_async(m.group(1).trim(), scope).await?;
        Ok(format_js(&result))
    })
}

/// `__XSH_VAR_<NAME>__` / `__XSH_RUN_<NAME>__` / `__XSH_SYSTEM_<NAME>__`
/// constants. A name with a leading underscore is lower-cased wholesale;
/// otherwise SNAKE_CASE becomes camelCase.
fn js_constants_rule() -> TemplateRule {
    let regex =
        Regex::new(r"__XSH_(VAR|RUN|SYSTEM)_([A-Za-z0-9_]+?)__").expect("built-in regex");
    TemplateRule {
        name: "js-constants",
        order: 0,
        types: vec![TemplateKind::Js],
        regex,
        apply: Arc::new(|engine, scope, m| {
            let name = constant_name(m.group(2));
            let value = match m.group(1) {
                "VAR" => scope.get(&name).unwrap_or(Value::Undef),
                "RUN" => {
                    let v = scope.get(&name).unwrap_or(Value::Undef);
                    engine.force_eval(v, scope)?
                }
                _ => engine.system_var(&name).unwrap_or(Value::Undef),
            };
            Ok(format_js(&value))
        }),
        apply_async: Some(Arc::new(js_constants_async)),
    }
}

fn js_constants_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    m: &'a TplMatch,
) -> BoxFuture<'a, XshResult<String>> {
    Box::pin(async move {
        let name = constant_name(m.group(2));
        let value = match m.group(1) {
            "VAR" => scope.get(&name).unwrap_or(Value::Undef),
            "RUN" => {
                let v = scope.get(&name).unwrap_or(Value::Undef);
                engine.force_eval_async(v, scope).await?
            }
            _ => engine.system_var(&name).unwrap_or(Value::Undef),
        };
        Ok(format_js(&value))
    })
}

fn constant_name(raw: &str) -> String {
    if raw.starts_with('_') {
        return raw.to_lowercase();
    }
    let mut out = String::with_capacity(raw.len());
    for (i, part) in raw.split('_').filter(|p| !p.is_empty()).enumerate() {
        let lower = part.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    out
}

/// `"#xsh <command>"` — JSON whole-string directive. Strings re-escape and
/// re-quote; arrays and mappings serialize; scalars inline as JSON literals.
fn json_string_rule() -> TemplateRule {
    let regex = Regex::new(r##""#xsh ((?:\\.|[^"\\])*)""##).expect("built-in regex");
    TemplateRule {
        name: "json-string",
        order: 0,
        types: vec![TemplateKind::Json],
        regex,
        apply: Arc::new(|engine, scope, m| {
            let command = json_unescape(m.group(1));
            let result = engine.parse(&command, scope)?;
            Ok(serde_json::to_string(&value_to_json(&result)).unwrap_or_default())
        }),
        apply_async: Some(Arc::new(json_string_async)),
    }
}

fn json_string_async<'a>(
    engine: &'a Engine,
    scope: &'a mut Scope,
    m: &'a TplMatch,
) -> BoxFuture<'a, XshResult<String>> {
    Box::pin(async move {
        let command = json_unescape(m.group(1));
        let result = engine.parse_async(&command, scope).await?;
        Ok(serde_json::to_string(&value_to_json(&result)).unwrap_or_default())
    })
}

fn json_unescape(s: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{s}\"")).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn render(source: &str, kind: TemplateKind) -> String {
        let engine = Engine::with_core().unwrap();
        let mut scope = engine.new_scope();
        engine.parse_template(source, kind, &mut scope).unwrap()
    }

    #[test]
    fn line_directive_replaces_whole_line() {
        assert_eq!(render("//#xsh 2+2\nrest\n", TemplateKind::Js), "4\nrest\n");
    }

    #[test]
    fn line_directive_erases_non_scalar_results() {
        assert_eq!(render("//#xsh [1,2]\n", TemplateKind::Js), "\n");
    }

    #[test]
    fn inline_directive_substitutes_in_place() {
        assert_eq!(render("a `#xsh 1+1` b", TemplateKind::Js), "a 2 b");
    }

    #[test]
    fn line_and_inline_compose_on_one_line() {
        let out = render("//#xsh '2*2' >> t; test `#xsh $$t`", TemplateKind::Js);
        assert_eq!(out, "test 4");
    }

    #[test]
    fn block_directive_keeps_line_count() {
        let src = "//#xsht $template\nbody line\n///xsht\n";
        let out = render(src, TemplateKind::Js);
        assert_eq!(newlines(&out), newlines(src));
        assert!(out.starts_with("body line\n"));
    }

    #[test]
    fn constants_expand() {
        let engine = Engine::with_core().unwrap();
        let mut scope = engine.new_scope();
        scope.set("myVar", Value::Int(3));
        scope.set("runMe", Value::Str("1+2".into()));
        let out = engine
            .parse_template(
                "__XSH_VAR_MY_VAR__/__XSH_RUN_RUN_ME__/__XSH_SYSTEM_PLATFORM__",
                TemplateKind::Js,
                &mut scope,
            )
            .unwrap();
        assert_eq!(out, format!("3/3/{}", std::env::consts::OS));
    }

    #[test]
    fn constant_with_leading_underscore_is_lowercased() {
        assert_eq!(constant_name("_FOO"), "_foo");
        assert_eq!(constant_name("MY_VAR"), "myVar");
    }

    #[test]
    fn json_directive_inlines_scalars() {
        assert_eq!(
            render(r##"{"test": "#xsh 2+2"}"##, TemplateKind::Json),
            r#"{"test": 4}"#
        );
        assert_eq!(
            render(r##"{"b": "#xsh true"}"##, TemplateKind::Json),
            r#"{"b": true}"#
        );
    }

    #[test]
    fn json_directive_requotes_strings() {
        assert_eq!(
            render(r##"{"s": "#xsh 'a\"b'"}"##, TemplateKind::Json),
            r#"{"s": "a\"b"}"#
        );
    }

    #[test]
    fn json_directive_serializes_containers() {
        assert_eq!(
            render(r##"{"xs": "#xsh [1,2]"}"##, TemplateKind::Json),
            r#"{"xs": [1,2]}"#
        );
    }
}
