// ABOUTME: Collection builtins and type methods — len, push, first/last, keys/values

use crate::error::RuntimeError;
use crate::value::{Value, ValueMap};
use exprlang_macros::{builtin, type_method};

fn collection_len(v: &Value) -> Result<i64, RuntimeError> {
    match v {
        Value::String(s) => Ok(s.chars().count() as i64),
        Value::Slice(items, _) => Ok(items.len() as i64),
        Value::Map(m) => Ok(m.len() as i64),
        other => Err(RuntimeError::type_error("len", "string, slice, or map", other.type_name())),
    }
}

#[builtin(name = "len", category = "Collection", arity = "1")]
pub fn len(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(collection_len(&args[0])?))
}

#[builtin(name = "push", category = "Collection", arity = "2")]
pub fn push(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => {
            let mut next = items.as_ref().clone();
            next.push(args[1].clone());
            Ok(Value::slice(next))
        }
        other => Err(RuntimeError::type_error("push", "slice", other.type_name())),
    }
}

#[builtin(name = "first", category = "Collection", arity = "1")]
pub fn first(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => Ok(items.first().cloned().unwrap_or(Value::Nil)),
        other => Err(RuntimeError::type_error("first", "slice", other.type_name())),
    }
}

#[builtin(name = "last", category = "Collection", arity = "1")]
pub fn last(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => Ok(items.last().cloned().unwrap_or(Value::Nil)),
        other => Err(RuntimeError::type_error("last", "slice", other.type_name())),
    }
}

#[builtin(name = "keys", category = "Collection", arity = "1")]
pub fn keys(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Map(m) => Ok(Value::slice(m.keys().map(Value::string).collect())),
        other => Err(RuntimeError::type_error("keys", "map", other.type_name())),
    }
}

#[builtin(name = "values", category = "Collection", arity = "1")]
pub fn values(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Map(m) => Ok(Value::slice(m.values().cloned().collect())),
        other => Err(RuntimeError::type_error("values", "map", other.type_name())),
    }
}

#[builtin(name = "set", category = "Collection", arity = "3")]
pub fn set(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Map(m) => {
            let key = match &args[1] {
                Value::String(s) => s.to_string(),
                other => return Err(RuntimeError::type_error("set", "string key", other.type_name())),
            };
            Ok(Value::Map(std::rc::Rc::new(m.with(key, args[2].clone()))))
        }
        other => Err(RuntimeError::type_error("set", "map", other.type_name())),
    }
}

#[builtin(name = "sum", category = "Collection", arity = "1")]
pub fn sum(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => {
            let mut int_total: i64 = 0;
            let mut float_total: f64 = 0.0;
            let mut saw_float = false;
            for item in items.iter() {
                match item {
                    Value::Int(i) if !saw_float => int_total = int_total.wrapping_add(*i),
                    Value::Int(i) => float_total += *i as f64,
                    Value::Float(f) => {
                        if !saw_float {
                            float_total = int_total as f64;
                            saw_float = true;
                        }
                        float_total += f;
                    }
                    other => return Err(RuntimeError::type_error("sum", "number", other.type_name())),
                }
            }
            Ok(if saw_float { Value::Float(float_total) } else { Value::Int(int_total) })
        }
        other => Err(RuntimeError::type_error("sum", "slice", other.type_name())),
    }
}

#[builtin(name = "avg", category = "Collection", arity = "1")]
pub fn avg(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) if items.is_empty() => Err(RuntimeError::custom("avg", "empty slice")),
        Value::Slice(items, _) => {
            let total = match sum(args)? {
                Value::Int(i) => i as f64,
                Value::Float(f) => f,
                _ => unreachable!("sum always returns a number"),
            };
            Ok(Value::Float(total / items.len() as f64))
        }
        other => Err(RuntimeError::type_error("avg", "slice", other.type_name())),
    }
}

#[builtin(name = "count", category = "Collection", arity = "1")]
pub fn count(args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(collection_len(&args[0])?))
}

#[builtin(name = "sort", category = "Collection", arity = "1")]
pub fn sort(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => {
            let mut sorted = items.as_ref().clone();
            let mut err = None;
            sorted.sort_by(|a, b| match a.partial_cmp_value(b) {
                Ok(Some(ord)) => ord,
                Ok(None) => std::cmp::Ordering::Equal,
                Err(e) => {
                    err.get_or_insert(e);
                    std::cmp::Ordering::Equal
                }
            });
            if let Some(e) = err {
                return Err(e);
            }
            Ok(Value::slice(sorted))
        }
        other => Err(RuntimeError::type_error("sort", "slice", other.type_name())),
    }
}

#[builtin(name = "reverse", category = "Collection", arity = "1")]
pub fn reverse(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => {
            let mut reversed = items.as_ref().clone();
            reversed.reverse();
            Ok(Value::slice(reversed))
        }
        other => Err(RuntimeError::type_error("reverse", "slice", other.type_name())),
    }
}

#[builtin(name = "unique", category = "Collection", arity = "1")]
pub fn unique(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items.iter() {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Ok(Value::slice(out))
        }
        other => Err(RuntimeError::type_error("unique", "slice", other.type_name())),
    }
}

#[builtin(name = "flatten", category = "Collection", arity = "1")]
pub fn flatten(args: &[Value]) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Slice(items, _) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items.iter() {
                match item {
                    Value::Slice(inner, _) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::slice(out))
        }
        other => Err(RuntimeError::type_error("flatten", "slice", other.type_name())),
    }
}

#[builtin(name = "take", category = "Collection", arity = "2")]
pub fn take(args: &[Value]) -> Result<Value, RuntimeError> {
    match (&args[0], &args[1]) {
        (Value::Slice(items, _), Value::Int(n)) => {
            let n = (*n).max(0) as usize;
            Ok(Value::slice(items.iter().take(n).cloned().collect()))
        }
        (other, _) => Err(RuntimeError::type_error("take", "slice, int", other.type_name())),
    }
}

#[builtin(name = "range", category = "Collection", arity = "1-2")]
pub fn range(args: &[Value]) -> Result<Value, RuntimeError> {
    let as_int = |v: &Value| match v {
        Value::Int(i) => Ok(*i),
        other => Err(RuntimeError::type_error("range", "int", other.type_name())),
    };
    let (start, end) = if args.len() == 1 {
        (0, as_int(&args[0])?)
    } else {
        (as_int(&args[0])?, as_int(&args[1])?)
    };
    Ok(Value::slice((start..end).map(Value::Int).collect()))
}

/// `filter`/`map`/`reduce` take a callable second argument and must
/// invoke it once per element, which a plain `fn(&[Value])` builtin has
/// no way to do — the VM intercepts these three names before dispatching
/// here (see `vm::Vm::dispatch_builtin`) and only falls through to these
/// stubs if called by something that bypasses the VM entirely.
#[builtin(name = "filter", category = "Collection", arity = "2")]
pub fn filter(_args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::custom("filter", "must be invoked by the VM"))
}

#[builtin(name = "map", category = "Collection", arity = "2")]
pub fn map(_args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::custom("map", "must be invoked by the VM"))
}

#[builtin(name = "reduce", category = "Collection", arity = "2-3")]
pub fn reduce(_args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::custom("reduce", "must be invoked by the VM"))
}

#[builtin(name = "all", category = "Collection", arity = "2")]
pub fn all(_args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::custom("all", "must be invoked by the VM"))
}

#[builtin(name = "any", category = "Collection", arity = "2")]
pub fn any(_args: &[Value]) -> Result<Value, RuntimeError> {
    Err(RuntimeError::custom("any", "must be invoked by the VM"))
}

#[type_method(type_name = "slice", name = "len", arity = "0")]
pub fn slice_len(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(collection_len(receiver)?))
}

#[type_method(type_name = "slice", name = "first", arity = "0")]
pub fn slice_first(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    first(std::slice::from_ref(receiver))
}

#[type_method(type_name = "slice", name = "last", arity = "0")]
pub fn slice_last(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    last(std::slice::from_ref(receiver))
}

#[type_method(type_name = "map", name = "len", arity = "0")]
pub fn map_len(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Int(collection_len(receiver)?))
}

#[type_method(type_name = "map", name = "keys", arity = "0")]
pub fn map_keys(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    keys(std::slice::from_ref(receiver))
}

#[type_method(type_name = "map", name = "values", arity = "0")]
pub fn map_values(receiver: &Value, _args: &[Value]) -> Result<Value, RuntimeError> {
    values(std::slice::from_ref(receiver))
}

#[allow(dead_code)]
fn _uses_value_map(_: &ValueMap) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_counts_slice_elements() {
        let v = Value::slice(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(len(&[v]).unwrap(), Value::Int(2));
    }

    #[test]
    fn push_returns_new_slice_without_mutating_original() {
        let original = Value::slice(vec![Value::Int(1)]);
        let grown = push(&[original.clone(), Value::Int(2)]).unwrap();
        assert_eq!(len(&[original]).unwrap(), Value::Int(1));
        assert_eq!(len(&[grown]).unwrap(), Value::Int(2));
    }

    #[test]
    fn keys_and_values_round_trip() {
        let map = Value::map(vec![("a".into(), Value::Int(1))]);
        assert_eq!(keys(&[map.clone()]).unwrap(), Value::slice(vec![Value::string("a")]));
        assert_eq!(values(&[map]).unwrap(), Value::slice(vec![Value::Int(1)]));
    }

    #[test]
    fn sum_stays_int_until_a_float_appears() {
        let ints = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(sum(&[ints]).unwrap(), Value::Int(6));
        let mixed = Value::slice(vec![Value::Int(1), Value::Float(2.5)]);
        assert_eq!(sum(&[mixed]).unwrap(), Value::Float(3.5));
    }

    #[test]
    fn avg_divides_sum_by_length() {
        let v = Value::slice(vec![Value::Int(2), Value::Int(4)]);
        assert_eq!(avg(&[v]).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn sort_orders_ints_ascending() {
        let v = Value::slice(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(
            sort(&[v]).unwrap(),
            Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn unique_drops_repeats_preserving_first_occurrence_order() {
        let v = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(1)]);
        assert_eq!(unique(&[v]).unwrap(), Value::slice(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn flatten_splices_one_level_of_nested_slices() {
        let v = Value::slice(vec![
            Value::slice(vec![Value::Int(1), Value::Int(2)]),
            Value::Int(3),
        ]);
        assert_eq!(
            flatten(&[v]).unwrap(),
            Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn range_defaults_start_to_zero() {
        assert_eq!(
            range(&[Value::Int(3)]).unwrap(),
            Value::slice(vec![Value::Int(0), Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            range(&[Value::Int(1), Value::Int(4)]).unwrap(),
            Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn higher_order_stubs_report_they_need_the_vm() {
        assert!(filter(&[]).is_err());
        assert!(map(&[]).is_err());
        assert!(reduce(&[]).is_err());
    }
}
