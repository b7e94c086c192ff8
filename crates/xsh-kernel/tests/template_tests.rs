//! Template expansion for JS-like and JSON host sources.

use rstest::rstest;
use xsh_kernel::{Engine, TemplateKind, Value};

fn render(source: &str, kind: TemplateKind) -> String {
    let engine = Engine::with_core().unwrap();
    let mut scope = engine.new_scope();
    engine.parse_template(source, kind, &mut scope).unwrap()
}

fn line_count(s: &str) -> usize {
    s.lines().count()
}

// =============================================================================
// JS TEMPLATES
// =============================================================================

#[test]
fn line_then_inline_on_a_single_line() {
    let out = render("//#xsh '2*2' >> t; test `#xsh $$t`", TemplateKind::Js);
    assert_eq!(out, "test 4");
}

#[test]
fn line_directives_replace_their_line() {
    let src = "const a = 1;\n//#xsh 40+2\nconst b = 2;\n";
    assert_eq!(
        render(src, TemplateKind::Js),
        "const a = 1;\n42\nconst b = 2;\n"
    );
}

#[test]
fn directives_share_one_scope_across_the_template() {
    let src = "//#xsh 6 >> n\nvalue: `#xsh $n*7`\n";
    let out = render(src, TemplateKind::Js);
    assert_eq!(out, "6\nvalue: 42\n");
}

#[test]
fn block_directive_exposes_the_body_as_template() {
    let src = "//#xsht $template + \"!\"\nhello\n///xsht\nafter\n";
    let out = render(src, TemplateKind::Js);
    assert!(out.starts_with("hello\n!"));
    assert!(out.ends_with("after\n"));
}

#[test]
fn block_directive_swallows_inner_line_directives() {
    let src = "//#xsht 'replaced'\n//#xsh 9*9\n///xsht\n";
    let out = render(src, TemplateKind::Js);
    // the block consumed its body before the line rule could run it
    assert!(out.contains("replaced"));
    assert!(!out.contains("81"));
}

#[rstest]
#[case("//#xsh 2+2\nx\n")]
#[case("a\n//#xsh [1,2]\nb\n")]
#[case("//#xsht $template\nline one\nline two\n///xsht\ntail\n")]
#[case("plain\nlines\nonly\n")]
fn js_output_preserves_line_count(#[case] src: &str) {
    assert_eq!(line_count(&render(src, TemplateKind::Js)), line_count(src));
}

#[test]
fn constants_read_scope_and_system_tables() {
    let engine = Engine::with_core().unwrap();
    let mut scope = engine.new_scope();
    scope.set("retryCount", Value::Int(3));
    let out = engine
        .parse_template("retries = __XSH_VAR_RETRY_COUNT__;", TemplateKind::Js, &mut scope)
        .unwrap();
    assert_eq!(out, "retries = 3;");
    let out = engine
        .parse_template("os = __XSH_SYSTEM_PLATFORM__;", TemplateKind::Js, &mut scope)
        .unwrap();
    assert_eq!(out, format!("os = {};", std::env::consts::OS));
}

#[test]
fn run_constant_force_evaluates() {
    let engine = Engine::with_core().unwrap();
    let mut scope = engine.new_scope();
    scope.set("expr", Value::Str("6*7".into()));
    let out = engine
        .parse_template("__XSH_RUN_EXPR__", TemplateKind::Js, &mut scope)
        .unwrap();
    assert_eq!(out, "42");
}

// =============================================================================
// JSON TEMPLATES
// =============================================================================

#[test]
fn json_scalar_directive_inlines_the_literal() {
    assert_eq!(
        render(r##"{"test": "#xsh 2+2"}"##, TemplateKind::Json),
        r#"{"test": 4}"#
    );
}

#[rstest]
#[case(r##""#xsh true""##, "true")]
#[case(r##""#xsh null""##, "null")]
#[case(r##""#xsh 1.5""##, "1.5")]
#[case(r##""#xsh 'text'""##, r#""text""#)]
#[case(r##""#xsh [1, 2]""##, "[1,2]")]
#[case(r##""#xsh {a: 1}""##, r#"{"a":1}"#)]
fn json_directive_result_forms(#[case] src: &str, #[case] expected: &str) {
    assert_eq!(render(src, TemplateKind::Json), expected);
}

#[test]
fn json_directive_sees_the_scope() {
    let engine = Engine::with_core().unwrap();
    let mut scope = engine.new_scope();
    scope.set("port", Value::Int(8080));
    let out = engine
        .parse_template(
            r##"{"port": "#xsh $port"}"##,
            TemplateKind::Json,
            &mut scope,
        )
        .unwrap();
    assert_eq!(out, r#"{"port": 8080}"#);
}

#[test]
fn json_rules_ignore_js_sources_and_vice_versa() {
    // a JSON directive in a JS render stays untouched
    let js = render(r##"{"test": "#xsh 2+2"}"##, TemplateKind::Js);
    assert_eq!(js, r##"{"test": "#xsh 2+2"}"##);
    // a JS line directive in a JSON render stays untouched
    let json = render("//#xsh 2+2", TemplateKind::Json);
    assert_eq!(json, "//#xsh 2+2");
}

// =============================================================================
// ASYNC DUALS
// =============================================================================

#[tokio::test]
async fn async_templates_resolve_deferred_results() {
    let engine = Engine::with_core().unwrap();
    let mut scope = engine.new_scope();
    let out = engine
        .parse_template_async("//#xsh (async 20)+22\n", TemplateKind::Js, &mut scope)
        .await
        .unwrap();
    assert_eq!(out, "42\n");
}

#[tokio::test]
async fn sync_and_async_templates_agree() {
    let src = "//#xsh 6 >> n\nvalue: `#xsh $n*7`\n";
    let engine = Engine::with_core().unwrap();
    let mut s1 = engine.new_scope();
    let sync = engine.parse_template(src, TemplateKind::Js, &mut s1).unwrap();
    let mut s2 = engine.new_scope();
    let asy = engine
        .parse_template_async(src, TemplateKind::Js, &mut s2)
        .await
        .unwrap();
    assert_eq!(sync, asy);
}
