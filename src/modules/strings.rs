// ABOUTME: The `strings` module namespace reachable via `strings.fn(...)`, compiled through OpModuleCall

use super::ModuleEntry;
use crate::error::RuntimeError;
use crate::value::Value;

fn as_str<'a>(v: &'a Value, fname: &str) -> Result<&'a str, RuntimeError> {
    match v {
        Value::String(s) => Ok(s.as_ref()),
        other => Err(RuntimeError::type_error(fname, "string", other.type_name())),
    }
}

fn repeat(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return Err(RuntimeError::arity_error("strings.repeat", "2", args.len()));
    }
    let s = as_str(&args[0], "strings.repeat")?;
    let n = match &args[1] {
        Value::Int(i) if *i >= 0 => *i as usize,
        other => return Err(RuntimeError::type_error("strings.repeat", "non-negative int", other.type_name())),
    };
    Ok(Value::string(s.repeat(n)))
}

fn reverse(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::arity_error("strings.reverse", "1", args.len()));
    }
    Ok(Value::string(as_str(&args[0], "strings.reverse")?.chars().rev().collect::<String>()))
}

fn starts_with(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return Err(RuntimeError::arity_error("strings.starts_with", "2", args.len()));
    }
    Ok(Value::Bool(
        as_str(&args[0], "strings.starts_with")?.starts_with(as_str(&args[1], "strings.starts_with")?),
    ))
}

fn ends_with(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return Err(RuntimeError::arity_error("strings.ends_with", "2", args.len()));
    }
    Ok(Value::Bool(
        as_str(&args[0], "strings.ends_with")?.ends_with(as_str(&args[1], "strings.ends_with")?),
    ))
}

pub static FUNCTIONS: &[ModuleEntry] = &[
    ModuleEntry { name: "repeat", func: repeat },
    ModuleEntry { name: "reverse", func: reverse },
    ModuleEntry { name: "starts_with", func: starts_with },
    ModuleEntry { name: "ends_with", func: ends_with },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_reverses_chars() {
        assert_eq!(reverse(&[Value::string("abc")]).unwrap(), Value::string("cba"));
    }
}
