//! End-to-end template rendering scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jinja_rs::{Callable, Context, Param, Template, TemplateError, Value};

fn render(source: &str, ctx: &mut Context) -> Result<String, TemplateError> {
    Template::parse(source)?.render(ctx)
}

fn int_seq(range: std::ops::Range<i64>) -> Value {
    Value::List(range.map(Value::Int).collect())
}

#[test]
fn test_for_loop_simple() {
    let mut ctx = Context::new();
    ctx.set("seq", int_seq(0..10));
    assert_eq!(
        render("{% for item in seq %}{{ item }}{% endfor %}", &mut ctx).unwrap(),
        "0123456789"
    );
}

#[test]
fn test_for_loop_multiple_values() {
    let mut ctx = Context::new();
    ctx.set(
        "seq",
        Value::List(vec![
            Value::List(vec![Value::Int(0), Value::Int(1)]),
            Value::List(vec![Value::Int(2), Value::Int(3)]),
            Value::List(vec![Value::Int(4), Value::Int(5)]),
        ]),
    );
    assert_eq!(
        render("{% for a,b in seq %}{{a}}{{b}}{% endfor %}", &mut ctx).unwrap(),
        "012345"
    );
}

#[test]
fn test_for_loop_else() {
    let mut ctx = Context::new();
    ctx.set("seq", Value::List(vec![]));
    assert_eq!(
        render("{% for item in seq %}XXX{% else %}...{% endfor %}", &mut ctx).unwrap(),
        "..."
    );
}

#[test]
fn test_int_filter_on_string_literal() {
    let mut ctx = Context::new();
    assert_eq!(render("{{ '1' | int }}", &mut ctx).unwrap(), "1");
}

#[test]
fn test_defined_test_on_bound_variable() {
    let mut ctx = Context::new();
    ctx.set("good_var", Value::from("yes"));
    assert_eq!(
        render("{{ good_var is defined }}", &mut ctx).unwrap(),
        "true"
    );
}

#[test]
fn test_defined_test_on_missing_variable() {
    let mut ctx = Context::new();
    assert_eq!(
        render("{{ missing_var is not defined }}", &mut ctx).unwrap(),
        "true"
    );
}

// ── Laws ─────────────────────────────────────────────────────────────

#[test]
fn test_tagless_template_is_identity() {
    let mut ctx = Context::new();
    for source in ["", "plain text", "a { b } c", "multi\nline\ntext"] {
        assert_eq!(render(source, &mut ctx).unwrap(), source);
    }
}

#[test]
fn test_loop_index_sum() {
    let mut ctx = Context::new();
    ctx.set("seq", int_seq(0..7));
    let out = render(
        "{% for item in seq %}{{ loop.index }},{% endfor %}",
        &mut ctx,
    )
    .unwrap();
    let sum: i64 = out
        .split_terminator(',')
        .map(|part| part.parse::<i64>().unwrap())
        .sum();
    assert_eq!(sum, 7 * 8 / 2);
}

#[test]
fn test_loop_last_holds_only_on_final_iteration() {
    let mut ctx = Context::new();
    ctx.set("seq", int_seq(0..5));
    let out = render(
        "{% for item in seq %}{% if loop.last %}{{ loop.index0 }}{% endif %}{% endfor %}",
        &mut ctx,
    )
    .unwrap();
    assert_eq!(out, "4");
}

#[test]
fn test_short_circuit_is_observable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut ctx = Context::new();
    let counter = Arc::clone(&calls);
    ctx.register_callable(
        "probe",
        Callable::new(Vec::new(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Bool(true))
        }),
    );

    assert_eq!(
        render("{{ false and probe() }}", &mut ctx).unwrap(),
        "false"
    );
    assert_eq!(render("{{ true or probe() }}", &mut ctx).unwrap(), "true");
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(
        render("{{ false or probe() }}", &mut ctx).unwrap(),
        "true"
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_filter_chain_is_left_associative() {
    let mut ctx = Context::new();
    ctx.register_filter(
        "double",
        Callable::new(vec![Param::required("val")], |args| {
            Ok(Value::Int(args[0].as_int()? * 2))
        }),
    );
    ctx.register_filter(
        "incr",
        Callable::new(vec![Param::required("val")], |args| {
            Ok(Value::Int(args[0].as_int()? + 1))
        }),
    );

    // double(3) == 6
    assert_eq!(render("{{ 3 | double }}", &mut ctx).unwrap(), "6");
    // incr(double(3)) == 7, not double(incr(3)) == 8
    assert_eq!(render("{{ 3 | double | incr }}", &mut ctx).unwrap(), "7");
    assert_eq!(render("{{ 3 | incr | double }}", &mut ctx).unwrap(), "8");
}

// ── Callables ────────────────────────────────────────────────────────

#[test]
fn test_callable_with_named_arguments_and_default() {
    let mut ctx = Context::new();
    ctx.set("foo", Value::Int(1));
    ctx.register_callable(
        "test",
        Callable::new(
            vec![
                Param::required("a"),
                Param::required("b"),
                Param::with_default("c", Value::Bool(true)),
            ],
            |args| Ok(Value::List(args.to_vec())),
        ),
    );

    assert_eq!(
        render("{{ test(foo, b=\"2\") }}", &mut ctx).unwrap(),
        "[1, 2, true]"
    );
    assert_eq!(
        render("{{ test(1, \"2\", c=false) }}", &mut ctx).unwrap(),
        "[1, 2, false]"
    );
}

#[test]
fn test_callable_binding_errors() {
    let mut ctx = Context::new();
    ctx.register_callable(
        "two",
        Callable::new(
            vec![Param::required("a"), Param::required("b")],
            |args| Ok(Value::List(args.to_vec())),
        ),
    );

    assert!(matches!(
        render("{{ two(1) }}", &mut ctx).unwrap_err(),
        TemplateError::MissingRequiredArg(_)
    ));
    assert!(matches!(
        render("{{ two(1, bogus=2) }}", &mut ctx).unwrap_err(),
        TemplateError::UnknownArgName(_)
    ));
    assert!(matches!(
        render("{{ two(a=1, 2) }}", &mut ctx).unwrap_err(),
        TemplateError::PositionalAfterNamed(_)
    ));
}

// ── Mixed templates ──────────────────────────────────────────────────

#[test]
fn test_mixed_template() {
    let mut ctx = Context::new();
    ctx.set("user", Value::from("ada"));
    ctx.set("items", int_seq(1..4));
    let source = "Hi {{ user }}! {% if items %}\
                  {% for i in items %}[{{ i }}]{% endfor %}\
                  {% else %}empty{% endif %} bye";
    assert_eq!(
        render(source, &mut ctx).unwrap(),
        "Hi ada! [1][2][3] bye"
    );
}

#[test]
fn test_raw_section_between_tags() {
    let mut ctx = Context::new();
    ctx.set("x", Value::Int(1));
    assert_eq!(
        render("{{ x }}{% raw %}{{ x }}{% endraw %}{{ x }}", &mut ctx).unwrap(),
        "1{{ x }}1"
    );
}

#[test]
fn test_host_values_end_to_end() {
    let serde_json::Value::Object(map) = serde_json::json!({
        "title": "report",
        "rows": [{"n": 1}, {"n": 2}],
    }) else {
        panic!("expected object");
    };
    let mut ctx = Context::with_values(map).unwrap();
    assert_eq!(
        render(
            "{{ title }}: {% for row in rows %}{{ row.n }}{% endfor %}",
            &mut ctx
        )
        .unwrap(),
        "report: 12"
    );
}

// ── Errors ───────────────────────────────────────────────────────────

#[test]
fn test_unbalanced_tags_fail_to_parse() {
    assert!(matches!(
        Template::parse("{% if x %}no end"),
        Err(TemplateError::UnterminatedBlock(_))
    ));
    assert!(matches!(
        Template::parse("{% for x in seq %}no end"),
        Err(TemplateError::UnterminatedBlock(_))
    ));
    assert!(matches!(
        Template::parse("{% raw %}no end"),
        Err(TemplateError::UnterminatedBlock(_))
    ));
    assert!(matches!(
        Template::parse("{% endif %}"),
        Err(TemplateError::Syntax(_))
    ));
}

#[test]
fn test_malformed_coercion_is_an_error() {
    let mut ctx = Context::new();
    assert!(matches!(
        render("{{ 'abc' | int }}", &mut ctx).unwrap_err(),
        TemplateError::Coercion(_)
    ));
}

#[test]
fn test_arithmetic_in_substitution() {
    let mut ctx = Context::new();
    ctx.set("n", Value::Int(6));
    assert_eq!(render("{{ n * 7 }}", &mut ctx).unwrap(), "42");
    assert_eq!(render("{{ n + 1.5 }}", &mut ctx).unwrap(), "7.5");
    assert_eq!(
        render("{{ 'a' + 'b' + 'c' }}", &mut ctx).unwrap(),
        "abc"
    );
}
