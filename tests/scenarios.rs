// ABOUTME: End-to-end Engine facade scenarios covering arithmetic, strings, conditionals, and lambdas

use exprlang::{Engine, EngineOptions, Environment, Value};

fn engine() -> Engine {
    Engine::new(EngineOptions::default())
}

#[test]
fn arithmetic_precedence_and_grouping() {
    let e = engine();
    let env = Environment::new();
    assert_eq!(e.eval("2 + 3 * 4", &env).unwrap(), Value::Int(14));
    assert_eq!(e.eval("(2 + 3) * 4", &env).unwrap(), Value::Int(20));
    assert_eq!(e.eval("2 ** 10", &env).unwrap(), Value::Int(1024));
}

#[test]
fn string_concatenation_with_conversion() {
    let e = engine();
    let env = Environment::new();
    let result = e.eval(r#""total: " + string(3 + 4)"#, &env).unwrap();
    assert_eq!(result, Value::string("total: 7"));
}

#[test]
fn ternary_and_null_coalescing() {
    let e = engine();
    let mut env = Environment::new();
    env.set("score", 82);
    env.set("missing", Value::Nil);
    assert_eq!(e.eval("score >= 60 ? \"pass\" : \"fail\"", &env).unwrap(), Value::string("pass"));
    assert_eq!(e.eval("missing ?? \"default\"", &env).unwrap(), Value::string("default"));
}

#[test]
fn lambda_closure_capturing_host_binding() {
    let e = engine();
    let mut env = Environment::new();
    env.set("tax_rate", 0.1);
    let result = e.eval("add_tax = (price) => price + price * tax_rate; add_tax(100)", &env).unwrap();
    assert_eq!(result, Value::Float(110.0));
}

#[test]
fn host_map_binding_via_into_value() {
    use std::collections::HashMap;
    let e = engine();
    let mut env = Environment::new();
    let mut user = HashMap::new();
    user.insert("name".to_string(), "Ann".to_string());
    user.insert("role".to_string(), "admin".to_string());
    env.set("user", user);
    assert_eq!(e.eval("user.name", &env).unwrap(), Value::string("Ann"));
}

#[test]
fn optional_chain_on_missing_property_is_nil() {
    let e = engine();
    let mut env = Environment::new();
    env.set("config", Value::Nil);
    assert_eq!(e.eval("config?.timeout", &env).unwrap(), Value::Nil);
}

#[test]
fn compile_then_run_reuses_the_same_program() {
    let e = engine();
    let mut env = Environment::new();
    env.set("x", 5);
    let program = e.compile("x * x", &env, Default::default()).unwrap();
    assert_eq!(e.run(&program, &env).unwrap(), Value::Int(25));

    env.set("x", 6);
    assert_eq!(e.run(&program, &env).unwrap(), Value::Int(36));
}

#[test]
fn run_with_result_reports_type_and_timing() {
    let e = engine();
    let env = Environment::new();
    let program = e.compile("1 + 1", &env, Default::default()).unwrap();
    let result = e.run_with_result(&program, &env).unwrap();
    assert_eq!(result.value, Value::Int(2));
    assert_eq!(result.type_kind, exprlang::TypeKind::Int);
}

#[test]
fn unknown_identifier_is_a_compile_error() {
    let e = engine();
    let env = Environment::new();
    let err = e.eval("totally_unbound_name + 1", &env).unwrap_err();
    assert!(matches!(err, exprlang::EngineError::Compile(exprlang::CompileError::UnknownIdentifier { .. })));
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let e = engine();
    let mut env = Environment::new();
    env.set("n", 0);
    let err = e.eval("10 / n", &env).unwrap_err();
    assert!(matches!(err, exprlang::EngineError::Runtime(exprlang::RuntimeError::DivisionByZero)));
}
