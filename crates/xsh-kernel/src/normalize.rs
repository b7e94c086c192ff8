//! The lexical normalizer (parse-category rules).
//!
//! A chain of text rewrites applied in ascending order before splitting:
//! quoted literals, signed numbers and balanced brace groups are pulled out
//! into scope placeholders, whitespace is canonicalized around operators and
//! brace borders. The output contains no quoted strings, no nested brace
//! pairs and no bare negative numerics — every such element is addressable
//! through a `$`-prefixed placeholder.

use std::sync::Arc;

use regex::Regex;

use xsh_types::Value;

use crate::engine::Engine;
use crate::rules::{ParseFn, ParseRule};
use crate::scope::Scope;

impl Engine {
    /// Run the parse-category rules over `source`, binding placeholders into
    /// `scope`.
    pub fn normalize(&self, source: &str, scope: &mut Scope) -> xsh_types::XshResult<String> {
        let mut text = source.to_string();
        for rule in self.rules().parse() {
            text = (rule.apply)(self, scope, text)?;
        }
        Ok(text)
    }
}

/// The built-in normalizer rules, in registration order.
pub fn parse_rules() -> Vec<ParseRule> {
    vec![
        brackets_rule(),
        trim_borders_rule(),
        collapse_spaces_rule(),
        trim_math_rule(),
        trim_braces_rule(),
        signed_numbers_rule(),
        brace_groups_rule(),
    ]
}

fn rule(name: &'static str, order: i32, apply: ParseFn) -> ParseRule {
    ParseRule { name, order, apply }
}

/// Extract `"…"`, `'…'` and `` `…` `` literals (respecting `\` escapes) into
/// string placeholders.
fn brackets_rule() -> ParseRule {
    let re = Regex::new(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'|`(?:\\.|[^`\\])*`"#)
        .expect("built-in regex");
    rule(
        "brackets",
        -1000,
        Arc::new(move |_, scope, text| {
            let mut out = text;
            while let Some(m) = re.find(&out) {
                let range = m.range();
                let raw = m.as_str();
                let body = unescape(&raw[1..raw.len() - 1]);
                let name = scope.add_placeholder(Value::Str(body));
                out.replace_range(range, &format!("${name}"));
            }
            Ok(out)
        }),
    )
}

fn trim_borders_rule() -> ParseRule {
    rule(
        "trim-borders",
        -900,
        Arc::new(|_, _, text| Ok(text.trim().to_string())),
    )
}

fn collapse_spaces_rule() -> ParseRule {
    let re = Regex::new(r"\s+").expect("built-in regex");
    rule(
        "collapse-spaces",
        -800,
        Arc::new(move |_, _, text| Ok(re.replace_all(&text, " ").into_owned())),
    )
}

/// Remove whitespace around binary operators. `-` is deliberately absent:
/// the signed-number rule needs the surrounding context intact.
fn trim_math_rule() -> ParseRule {
    let re = Regex::new(r"\s*(\|\||&&|\?\?|===|!==|==|!=|>=|<=|[,:><+*/%|])\s*")
        .expect("built-in regex");
    rule(
        "trim-math",
        -700,
        Arc::new(move |_, _, text| Ok(re.replace_all(&text, "$1").into_owned())),
    )
}

/// Remove whitespace just inside `[ ( {` and just before `) ] }`.
fn trim_braces_rule() -> ParseRule {
    let open = Regex::new(r"([\[({])\s+").expect("built-in regex");
    let close = Regex::new(r"\s+([\])}])").expect("built-in regex");
    rule(
        "trim-braces",
        -600,
        Arc::new(move |_, _, text| {
            let text = open.replace_all(&text, "$1").into_owned();
            Ok(close.replace_all(&text, "$1").into_owned())
        }),
    )
}

/// Extract negative numeric literals adjacent to operator/boundary contexts
/// into numeric placeholders. `3-4` stays subtraction; `(-4`, `*-4`, `,-4`
/// are negative literals.
fn signed_numbers_rule() -> ParseRule {
    let re = Regex::new(
        r"(?:^|[\s,:\[({*/+%<>=&|?])(-\d+(?:\.\d+)?)(?:$|[\s,:\])}*/+%<>=&|?-])",
    )
    .expect("built-in regex");
    rule(
        "signed-numbers",
        -500,
        Arc::new(move |_, scope, text| {
            let mut out = text;
            loop {
                let Some(caps) = re.captures(&out) else { break };
                let Some(m) = caps.get(1) else { break };
                let range = m.range();
                let literal = m.as_str().to_string();
                let value = if literal.contains('.') {
                    match literal.parse::<f64>() {
                        Ok(f) => Value::Float(f),
                        Err(_) => break,
                    }
                } else {
                    match literal.parse::<i64>() {
                        Ok(i) => Value::Int(i),
                        Err(_) => break,
                    }
                };
                let name = scope.add_placeholder(value);
                out.replace_range(range, &format!("${name}"));
            }
            Ok(out)
        }),
    )
}

/// Substitute innermost `(…)`, `[…]`, `{…}` groups with `$$` placeholders
/// holding the full original substring, iterating until none remain.
fn brace_groups_rule() -> ParseRule {
    let re = Regex::new(r"\([^()\[\]{}]*\)|\[[^()\[\]{}]*\]|\{[^()\[\]{}]*\}")
        .expect("built-in regex");
    rule(
        "brace-groups",
        -400,
        Arc::new(move |_, scope, text| {
            let mut out = text;
            while let Some(m) = re.find(&out) {
                let range = m.range();
                let name = scope.add_placeholder(Value::Str(m.as_str().to_string()));
                out.replace_range(range, &format!("$${name}"));
            }
            Ok(out)
        }),
    )
}

/// Strip `\` escapes: each backslash makes the next character literal.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    fn normalize(input: &str) -> (String, Scope) {
        let engine = Engine::with_core().unwrap();
        let mut scope = engine.new_scope();
        let out = engine.normalize(input, &mut scope).unwrap();
        (out, scope)
    }

    #[test]
    fn quoted_literals_become_placeholders() {
        let (out, scope) = normalize(r#"concat "a b" 'c'"#);
        assert!(!out.contains('"'));
        assert!(!out.contains('\''));
        let names: Vec<&str> = out
            .split(' ')
            .filter(|t| t.starts_with("$__"))
            .collect();
        assert_eq!(names.len(), 2);
        assert_eq!(
            scope.get(&names[0][1..]),
            Some(Value::Str("a b".to_string()))
        );
    }

    #[test]
    fn escapes_are_stripped() {
        let (out, scope) = normalize(r#""a\"b""#);
        let name = out.trim_start_matches('$');
        assert_eq!(scope.get(name), Some(Value::Str("a\"b".to_string())));
    }

    #[test]
    fn whitespace_is_collapsed_and_trimmed() {
        let (out, _) = normalize("  1  +  2  ");
        assert_eq!(out, "1+2");
    }

    #[test]
    fn operator_whitespace_is_trimmed() {
        let (out, _) = normalize("1 && 2 || 3 ?? 4 | 5 >> x");
        assert_eq!(out, "1&&2||3??4|5>>x");
    }

    #[test]
    fn negative_number_after_operator_is_extracted() {
        let (out, scope) = normalize("5*-2");
        let name = out.trim_start_matches("5*").trim_start_matches('$');
        assert_eq!(scope.get(name), Some(Value::Int(-2)));
    }

    #[test]
    fn negative_float_in_sequence_is_extracted() {
        let (out, scope) = normalize("[-1.5,2]");
        // the whole group is itself a placeholder; inspect its stored text
        let group = scope.get(out.trim_start_matches("$$")).unwrap();
        let Value::Str(group) = group else { panic!("expected group text") };
        assert!(group.starts_with("[$__"));
        let inner = group
            .trim_start_matches("[$")
            .split(',')
            .next()
            .unwrap()
            .to_string();
        assert_eq!(scope.get(&inner), Some(Value::Float(-1.5)));
    }

    #[test]
    fn digit_adjacent_minus_stays_subtraction() {
        let (out, _) = normalize("3-4");
        assert_eq!(out, "3-4");
    }

    #[test]
    fn nested_groups_collapse_innermost_first() {
        let (out, scope) = normalize("((1+2)*3-4)/5");
        assert!(out.starts_with("$$"));
        assert!(out.ends_with("/5"));
        let outer = scope
            .get(out.trim_end_matches("/5").trim_start_matches("$$"))
            .unwrap();
        let Value::Str(outer) = outer else { panic!("expected group text") };
        assert!(outer.starts_with("($$"));
        assert!(outer.ends_with("*3-4)"));
    }

    #[test]
    fn normalization_is_idempotent_on_its_output() {
        let engine = Engine::with_core().unwrap();
        let mut scope = engine.new_scope();
        let once = engine
            .normalize(r#"concat "a b" (1 + -2) [3, 4]"#, &mut scope)
            .unwrap();
        let twice = engine.normalize(&once, &mut scope).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn unescape_handles_trailing_backslash() {
        assert_eq!(unescape(r"a\\b\"), "a\\b");
    }
}
