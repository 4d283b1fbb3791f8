// ABOUTME: Array/object destructuring assignment through the Engine facade

use exprlang::{Engine, EngineOptions, Environment, Value};

fn engine() -> Engine {
    Engine::new(EngineOptions::default())
}

#[test]
fn array_destructure_binds_in_order() {
    let e = engine();
    let env = Environment::new();
    assert_eq!(e.eval("[a, b] = [10, 20]; a + b", &env).unwrap(), Value::Int(30));
}

#[test]
fn array_destructure_pads_missing_targets_with_nil() {
    let e = engine();
    let env = Environment::new();
    assert_eq!(e.eval("[x, y] = [1]; y ?? 7", &env).unwrap(), Value::Int(7));
}

#[test]
fn object_destructure_binds_by_field_name() {
    let e = engine();
    let mut env = Environment::new();
    env.set("point", Value::map(vec![("x".into(), Value::Int(3)), ("y".into(), Value::Int(4))]));
    let result = e.eval("{x, y} = point; x * x + y * y", &env).unwrap();
    assert_eq!(result, Value::Int(25));
}

#[test]
fn rest_pattern_is_parsed_but_rejected_at_compile_time() {
    // The parser accepts `...name` as a pattern element (see Pattern::Rest
    // in ast.rs), but the compiler only ever emits flat, single-level
    // ArrayDestructure/ObjectDestructure, so a rest element is a
    // CompileError rather than a silently-ignored tail binding.
    let e = engine();
    let env = Environment::new();
    let err = e.eval("[first, ...rest] = [1, 2, 3, 4]; first", &env);
    assert!(err.is_err());
}

#[test]
fn nested_destructuring_pattern_is_a_compile_error() {
    let e = engine();
    let env = Environment::new();
    let err = e.eval("[[a, b], c] = [[1, 2], 3]; a", &env);
    assert!(err.is_err());
}
