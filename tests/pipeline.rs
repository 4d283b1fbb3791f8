// ABOUTME: Pipeline operator (`|`) and placeholder (`#`) behavior through the Engine facade

use exprlang::{Engine, EngineOptions, Environment, Value};

fn engine() -> Engine {
    Engine::new(EngineOptions::default())
}

#[test]
fn bare_builtin_as_pipeline_function() {
    let e = engine();
    let mut env = Environment::new();
    env.set("name", "hello");
    assert_eq!(e.eval("name | upper", &env).unwrap(), Value::string("HELLO"));
}

#[test]
fn placeholder_member_access_through_pipe() {
    let e = engine();
    let mut env = Environment::new();
    env.set("user", Value::map(vec![("name".into(), Value::string("Ann"))]));
    assert_eq!(e.eval("user | #.name", &env).unwrap(), Value::string("Ann"));
}

#[test]
fn placeholder_arithmetic_expression_through_pipe() {
    let e = engine();
    let mut env = Environment::new();
    env.set("n", 6);
    assert_eq!(e.eval("n | # * # + 1", &env).unwrap(), Value::Int(37));
}

#[test]
fn filter_then_map_chain_over_a_slice_of_maps() {
    let e = engine();
    let mut env = Environment::new();
    env.set(
        "users",
        Value::slice(vec![
            Value::map(vec![("name".into(), Value::string("Ann")), ("age".into(), Value::Int(30))]),
            Value::map(vec![("name".into(), Value::string("Bo")), ("age".into(), Value::Int(12))]),
        ]),
    );
    let result = e.eval("users | filter(u => u.age >= 18) | map(u => u.name)", &env).unwrap();
    assert_eq!(result, Value::slice(vec![Value::string("Ann")]));
}

#[test]
fn call_with_arguments_desugars_without_a_placeholder() {
    let e = engine();
    let mut env = Environment::new();
    env.set("greeting", "hello world");
    // `greeting | contains("world")` has no `#`, so it desugars to
    // `contains(greeting, "world")` entirely at compile time rather than
    // going through OpPipe.
    assert_eq!(e.eval("greeting | contains(\"world\")", &env).unwrap(), Value::Bool(true));
}

#[test]
fn bitwise_or_is_not_confused_with_pipe() {
    let e = engine();
    let env = Environment::new();
    assert_eq!(e.eval("5 | 2", &env).unwrap(), Value::Int(7));
}

#[test]
fn bitwise_or_binds_tighter_than_null_coalescing() {
    let e = engine();
    let mut env = Environment::new();
    // `a ?? (b | 2)`: `a` is non-nil so `??` short-circuits to `a` without
    // ever evaluating `b | 2`. Under the old, wrong grouping `(a ?? b) | 2`
    // would instead short-circuit `??` to `a` and then compute `a | 2`,
    // giving a different result (6 | 2 = 6) than the correct one (6).
    // Pin down the actual divergence with values where it matters:
    env.set("a", 5);
    env.set("b", 1);
    // correct: a ?? (b | 2) = 5 (never touches b | 2)
    // wrong:   (a ?? b) | 2 = 5 | 2 = 7
    assert_eq!(e.eval("a ?? b | 2", &env).unwrap(), Value::Int(5));
}

#[test]
fn int_identifiers_on_both_sides_of_pipe_are_bitwise_or() {
    let e = engine();
    let mut env = Environment::new();
    env.set("permissions", 5);
    env.set("mask", 2);
    assert_eq!(e.eval("permissions | mask", &env).unwrap(), Value::Int(7));
}
