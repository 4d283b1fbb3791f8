// ABOUTME: String builtins and type methods — upper/lower/trim/split/join/contains

use crate::error::RuntimeError;
use crate::value::Value;
use exprlang_macros::{builtin, type_method};

fn as_str<'a>(v: &'a Value, fname: &str) -> Result<&'a str, RuntimeError> {
    match v {
        Value::String(s) => Ok(s.as_ref()),
        other => Err(RuntimeError::type_error(fname, "string", other.type_name())),
    }
}

#[builtin(name = "upper", category = "String", arity = "1")]
pub fn upper(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::string(as_str(&args[0], "upper")?.to_uppercase()))
}

#[builtin(name = "lower", category = "String", arity = "1")]
pub fn lower(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::string(as_str(&args[0], "lower")?.to_lowercase()))
}

#[builtin(name = "trim", category = "String", arity = "1")]
pub fn trim(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::string(as_str(&args[0], "trim")?.trim()))
}

#[builtin(name = "split", category = "String", arity = "2")]
pub fn split(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = as_str(&args[0], "split")?;
    let sep = as_str(&args[1], "split")?;
    let parts = if sep.is_empty() {
        s.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::string).collect()
    };
    Ok(Value::slice(parts))
}

#[builtin(name = "join", category = "String", arity = "2")]
pub fn join(args: &[Value]) -> Result<Value, RuntimeError> {
    let sep = as_str(&args[1], "join")?;
    match &args[0] {
        Value::Slice(items, _) => {
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(sep);
                }
                out.push_str(&item.to_string());
            }
            Ok(Value::string(out))
        }
        other => Err(RuntimeError::type_error("join", "slice", other.type_name())),
    }
}

#[builtin(name = "contains", category = "String", arity = "2")]
pub fn contains(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = as_str(&args[0], "contains")?;
    let needle = as_str(&args[1], "contains")?;
    Ok(Value::Bool(s.contains(needle)))
}

#[builtin(name = "startsWith", category = "String", arity = "2")]
pub fn starts_with(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = as_str(&args[0], "startsWith")?;
    let prefix = as_str(&args[1], "startsWith")?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

#[builtin(name = "endsWith", category = "String", arity = "2")]
pub fn ends_with(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = as_str(&args[0], "endsWith")?;
    let suffix = as_str(&args[1], "endsWith")?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

#[builtin(name = "replace", category = "String", arity = "3")]
pub fn replace(args: &[Value]) -> Result<Value, RuntimeError> {
    let s = as_str(&args[0], "replace")?;
    let from = as_str(&args[1], "replace")?;
    let to = as_str(&args[2], "replace")?;
    Ok(Value::string(s.replace(from, to)))
}

/// Alias of `len` restricted to strings, registered alongside the
/// polymorphic `len`.
#[builtin(name = "length", category = "String", arity = "1")]
pub fn length(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(as_str(&args[0], "length")?.chars().count() as i64))
}

#[type_method(type_name = "string", name = "upper", arity = "0")]
pub fn string_upper(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    upper(std::slice::from_ref(receiver))
}

#[type_method(type_name = "string", name = "lower", arity = "0")]
pub fn string_lower(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    lower(std::slice::from_ref(receiver))
}

#[type_method(type_name = "string", name = "trim", arity = "0")]
pub fn string_trim(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    trim(std::slice::from_ref(receiver))
}

#[type_method(type_name = "string", name = "len", arity = "0")]
pub fn string_len(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(as_str(receiver, "len")?.chars().count() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_and_lower_round_trip() {
        assert_eq!(upper(&[Value::string("hi")]).unwrap(), Value::string("HI"));
        assert_eq!(lower(&[Value::string("HI")]).unwrap(), Value::string("hi"));
    }

    #[test]
    fn split_and_join_are_inverse_on_simple_input() {
        let split_result = split(&[Value::string("a,b,c"), Value::string(",")]).unwrap();
        let joined = join(&[split_result, Value::string(",")]).unwrap();
        assert_eq!(joined, Value::string("a,b,c"));
    }

    #[test]
    fn contains_finds_substring() {
        assert_eq!(
            contains(&[Value::string("hello"), Value::string("ell")]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn starts_and_ends_with_check_affixes() {
        assert_eq!(starts_with(&[Value::string("hello"), Value::string("he")]).unwrap(), Value::Bool(true));
        assert_eq!(ends_with(&[Value::string("hello"), Value::string("lo")]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn replace_substitutes_every_occurrence() {
        assert_eq!(
            replace(&[Value::string("a-b-c"), Value::string("-"), Value::string("_")]).unwrap(),
            Value::string("a_b_c")
        );
    }
}
