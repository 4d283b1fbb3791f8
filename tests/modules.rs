// ABOUTME: Module-call (`math.fn(...)`, `strings.fn(...)`) surface through the Engine facade

use exprlang::{Engine, EngineOptions, Environment, Value};
use serial_test::serial;

fn engine() -> Engine {
    Engine::new(EngineOptions::default())
}

#[test]
#[serial]
fn math_module_call_after_import() {
    let e = engine();
    let env = Environment::new();
    let result = e.eval(r#"import "math"; math.sqrt(16)"#, &env).unwrap();
    assert_eq!(result, Value::Float(4.0));
}

#[test]
#[serial]
fn math_pow_and_abs() {
    let e = engine();
    let env = Environment::new();
    assert_eq!(e.eval(r#"import "math"; math.pow(2, 8)"#, &env).unwrap(), Value::Float(256.0));
    assert_eq!(e.eval(r#"import "math"; math.abs(-5)"#, &env).unwrap(), Value::Int(5));
}

#[test]
#[serial]
fn strings_module_reverse_and_repeat() {
    let e = engine();
    let env = Environment::new();
    assert_eq!(e.eval(r#"import "strings"; strings.reverse("abc")"#, &env).unwrap(), Value::string("cba"));
    assert_eq!(e.eval(r#"import "strings"; strings.repeat("ab", 3)"#, &env).unwrap(), Value::string("ababab"));
}

#[test]
#[serial]
fn unknown_module_function_is_a_runtime_error() {
    let e = engine();
    let env = Environment::new();
    let err = e.eval(r#"import "math"; math.nonexistent(1)"#, &env);
    assert!(err.is_err());
}
