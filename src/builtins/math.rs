// ABOUTME: Math builtins — abs/min/max/round/floor/ceil/sqrt/pow

use crate::error::RuntimeError;
use crate::value::Value;
use exprlang_macros::builtin;

fn as_f64(v: &Value, fname: &str) -> Result<f64, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i as f64),
        Value::Float(f) => Ok(*f),
        other => Err(RuntimeError::type_error(fname, "number", other.type_name())),
    }
}

#[builtin(name = "abs", category = "Math", arity = "1")]
pub fn abs(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(i.wrapping_abs())),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(RuntimeError::type_error("abs", "number", other.type_name())),
    }
}

/// `min(a, b)` compares two numbers; `min(slice)`
/// reduces a slice to its smallest element. Distinguished by arity, like
/// the source's overload resolution.
#[builtin(name = "min", category = "Math", arity = "1-2")]
pub fn min(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() == 1 {
        return reduce_slice(&args[0], "min", |a, b| pairwise_min(a, b));
    }
    pairwise_min(&args[0], &args[1])
}

#[builtin(name = "max", category = "Math", arity = "1-2")]
pub fn max(args: &[Value]) -> Result<Value, RuntimeError> {
    if args.len() == 1 {
        return reduce_slice(&args[0], "max", |a, b| pairwise_max(a, b));
    }
    pairwise_max(&args[0], &args[1])
}

fn pairwise_min(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.min(b))),
        (a, b) => Ok(Value::Float(as_f64(a, "min")?.min(as_f64(b, "min")?))),
    }
}

fn pairwise_max(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(*a.max(b))),
        (a, b) => Ok(Value::Float(as_f64(a, "max")?.max(as_f64(b, "max")?))),
    }
}

fn reduce_slice(
    v: &Value,
    fname: &str,
    combine: impl Fn(&Value, &Value) -> Result<Value, RuntimeError>,
) -> Result<Value, RuntimeError> {
    match v {
        Value::Slice(items, _) => {
            let mut iter = items.iter();
            let first = iter
                .next()
                .ok_or_else(|| RuntimeError::custom(fname, "empty slice"))?;
            iter.try_fold(first.clone(), |acc, item| combine(&acc, item))
        }
        other => Err(RuntimeError::type_error(fname, "slice", other.type_name())),
    }
}

#[builtin(name = "round", category = "Math", arity = "1")]
pub fn round(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(as_f64(&args[0], "round")?.round()))
}

#[builtin(name = "floor", category = "Math", arity = "1")]
pub fn floor(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(as_f64(&args[0], "floor")?.floor()))
}

#[builtin(name = "ceil", category = "Math", arity = "1")]
pub fn ceil(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(as_f64(&args[0], "ceil")?.ceil()))
}

#[builtin(name = "sqrt", category = "Math", arity = "1")]
pub fn sqrt(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Float(as_f64(&args[0], "sqrt")?.sqrt()))
}

#[builtin(name = "pow", category = "Math", arity = "2")]
pub fn pow(args: &[Value]) -> Result<Value, RuntimeError> {
    match (&args[0], &args[1]) {
        (Value::Int(base), Value::Int(exp)) if *exp >= 0 => Ok(Value::Int(base.wrapping_pow(*exp as u32))),
        (a, b) => Ok(Value::Float(as_f64(a, "pow")?.powf(as_f64(b, "pow")?))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abs_handles_int_and_float() {
        assert_eq!(abs(&[Value::Int(-3)]).unwrap(), Value::Int(3));
        assert_eq!(abs(&[Value::Float(-2.5)]).unwrap(), Value::Float(2.5));
    }

    #[test]
    fn min_max_prefer_int_when_both_ints() {
        assert_eq!(min(&[Value::Int(2), Value::Int(5)]).unwrap(), Value::Int(2));
        assert_eq!(max(&[Value::Int(2), Value::Int(5)]).unwrap(), Value::Int(5));
    }

    #[test]
    fn pow_stays_int_for_nonneg_int_exponent() {
        assert_eq!(pow(&[Value::Int(2), Value::Int(10)]).unwrap(), Value::Int(1024));
    }
}
