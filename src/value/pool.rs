// ABOUTME: Process-wide interning pool for small ints, common strings, and common floats

use super::Value;
use crate::config::{INTERN_INT_HIGH, INTERN_INT_LOW};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

/// Preloaded entries are immutable arrays built once; the extended integer
/// range is backed by a mutex-protected map populated lazily — thread-safe
/// via mutex-protected hash maps for non-preloaded entries, while preloaded
/// entries stay immutable.
struct Pool {
    small_ints: Vec<Value>,
    extra_ints: Mutex<HashMap<i64, Value>>,
    common_strings: HashMap<&'static str, Value>,
}

const SMALL_INT_LOW: i64 = 0;
const SMALL_INT_HIGH: i64 = 256;

fn pool() -> &'static Pool {
    static POOL: OnceLock<Pool> = OnceLock::new();
    POOL.get_or_init(|| {
        let small_ints = (SMALL_INT_LOW..SMALL_INT_HIGH).map(Value::Int).collect();

        let mut common_strings = HashMap::new();
        for s in ["", " ", "true", "false"] {
            common_strings.insert(s, Value::string(s));
        }
        for d in 0..10u8 {
            let s: &'static str = Box::leak(d.to_string().into_boxed_str());
            common_strings.insert(s, Value::string(s));
        }

        Pool {
            small_ints,
            extra_ints: Mutex::new(HashMap::new()),
            common_strings,
        }
    })
}

/// Returns an interned `Value::Int` when `i` falls in the interned range,
/// otherwise a fresh one. Fast path (the `[0, 256)` preloaded array) never
/// takes a lock; the extended `[-512, 512)` range does.
pub fn intern_int(i: i64) -> Value {
    let p = pool();
    if (SMALL_INT_LOW..SMALL_INT_HIGH).contains(&i) {
        return p.small_ints[(i - SMALL_INT_LOW) as usize].clone();
    }
    if (INTERN_INT_LOW..INTERN_INT_HIGH).contains(&i) {
        let mut extra = p.extra_ints.lock().expect("value pool mutex poisoned");
        return extra.entry(i).or_insert_with(|| Value::Int(i)).clone();
    }
    Value::Int(i)
}

/// Interns the handful of float constants worth naming (0.0, 1.0, -1.0);
/// any other float allocates a fresh `Value::Float` (floats are `Copy`
/// payloads, so "allocates" here is nominal — there's no heap behind it
/// either way).
pub fn intern_float(f: f64) -> Value {
    if f == 0.0 && f.is_sign_positive() {
        Value::Float(0.0)
    } else if f == 1.0 {
        Value::Float(1.0)
    } else if f == -1.0 {
        Value::Float(-1.0)
    } else {
        Value::Float(f)
    }
}

/// Interns short common strings (`""`, `" "`, `"true"`,
/// `"false"`, digits `0`-`9`); anything else allocates a fresh `Rc<str>`.
pub fn intern_string(s: &str) -> Value {
    if let Some(v) = pool().common_strings.get(s) {
        return v.clone();
    }
    Value::string(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_ints_share_backing_allocation() {
        let a = intern_int(5);
        let b = intern_int(5);
        match (&a, &b) {
            (Value::Int(x), Value::Int(y)) => assert_eq!(x, y),
            _ => panic!("expected ints"),
        }
    }

    #[test]
    fn extended_range_is_also_interned() {
        let a = intern_int(-100);
        let b = intern_int(-100);
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_ints_still_work() {
        assert_eq!(intern_int(10_000), Value::Int(10_000));
    }

    #[test]
    fn common_strings_round_trip() {
        assert_eq!(intern_string("true"), Value::string("true"));
        assert_eq!(intern_string("5"), Value::string("5"));
    }
}
