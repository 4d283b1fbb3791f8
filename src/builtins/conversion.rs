// ABOUTME: Conversion builtins — to_string/to_int/to_float/to_bool

use crate::error::RuntimeError;
use crate::value::Value;
use exprlang_macros::builtin;

#[builtin(name = "to_string", category = "Conversion", arity = "1")]
pub fn to_string(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::string(args[0].to_string()))
}

#[builtin(name = "to_int", category = "Conversion", arity = "1")]
pub fn to_int(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| RuntimeError::custom("to_int", format!("cannot convert '{s}' to int"))),
        other => Err(RuntimeError::type_error("to_int", "number, bool, or string", other.type_name())),
    }
}

#[builtin(name = "to_float", category = "Conversion", arity = "1")]
pub fn to_float(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| RuntimeError::custom("to_float", format!("cannot convert '{s}' to float"))),
        other => Err(RuntimeError::type_error("to_float", "number or string", other.type_name())),
    }
}

#[builtin(name = "to_bool", category = "Conversion", arity = "1")]
pub fn to_bool(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Bool(args[0].truthy()))
}

/// Source-facing aliases: expressions call `string(v)`/`int(v)`/`float(v)`/
/// `bool(v)` rather than the `to_*` names above, which stay registered in
/// their own right since existing callers (and tests) already use them.
#[builtin(name = "string", category = "Conversion", arity = "1")]
pub fn string(args: &[Value]) -> Result<Value, RuntimeError> {
    to_string(args)
}

#[builtin(name = "int", category = "Conversion", arity = "1")]
pub fn int(args: &[Value]) -> Result<Value, RuntimeError> {
    to_int(args)
}

#[builtin(name = "float", category = "Conversion", arity = "1")]
pub fn float(args: &[Value]) -> Result<Value, RuntimeError> {
    to_float(args)
}

#[builtin(name = "bool", category = "Conversion", arity = "1")]
pub fn bool_(args: &[Value]) -> Result<Value, RuntimeError> {
    to_bool(args)
}

#[builtin(name = "type", category = "Conversion", arity = "1")]
pub fn type_of(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::string(args[0].type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_int_parses_trimmed_strings() {
        assert_eq!(to_int(&[Value::string(" 42 ")]).unwrap(), Value::Int(42));
    }

    #[test]
    fn to_float_truncates_from_int() {
        assert_eq!(to_float(&[Value::Int(3)]).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn to_bool_uses_truthiness_table() {
        assert_eq!(to_bool(&[Value::Int(0)]).unwrap(), Value::Bool(false));
        assert_eq!(to_bool(&[Value::string("x")]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn spec_named_aliases_match_their_to_variants() {
        assert_eq!(string(&[Value::Int(30)]).unwrap(), Value::string("30"));
        assert_eq!(int(&[Value::string("7")]).unwrap(), Value::Int(7));
        assert_eq!(float(&[Value::Int(2)]).unwrap(), Value::Float(2.0));
        assert_eq!(bool_(&[Value::Int(1)]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn type_of_names_every_variant() {
        assert_eq!(type_of(&[Value::Int(1)]).unwrap(), Value::string("int"));
        assert_eq!(type_of(&[Value::string("x")]).unwrap(), Value::string("string"));
    }
}
