// ABOUTME: The `math` module namespace reachable via `math.fn(...)`, compiled through OpModuleCall

use super::ModuleEntry;
use crate::error::RuntimeError;
use crate::value::Value;

fn as_f64(v: &Value, fname: &str) -> Result<f64, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(RuntimeError::type_error(fname, "number", other.type_name())),
    }
}

fn sqrt(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::arity_error("math.sqrt", "1", args.len()));
    }
    Ok(Value::Float(as_f64(&args[0], "math.sqrt")?.sqrt()))
}

fn pow(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 2 {
        return Err(RuntimeError::arity_error("math.pow", "2", args.len()));
    }
    Ok(Value::Float(
        as_f64(&args[0], "math.pow")?.powf(as_f64(&args[1], "math.pow")?),
    ))
}

fn abs(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() != 1 {
        return Err(RuntimeError::arity_error("math.abs", "1", args.len()));
    }
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(RuntimeError::type_error("math.abs", "number", other.type_name())),
    }
}

fn pi(args: &[Value]) -> Result<Value, RuntimeError> {
    if !args.is_empty() {
        return Err(RuntimeError::arity_error("math.pi", "0", args.len()));
    }
    Ok(Value::Float(std::f64::consts::PI))
}

pub static FUNCTIONS: &[ModuleEntry] = &[
    ModuleEntry { name: "sqrt", func: sqrt },
    ModuleEntry { name: "pow", func: pow },
    ModuleEntry { name: "abs", func: abs },
    ModuleEntry { name: "pi", func: pi },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_of_four() {
        assert_eq!(sqrt(&[Value::Int(4)]).unwrap(), Value::Float(2.0));
    }
}
