// ABOUTME: Content hashing for values, constant-pool dedup, and the instruction cache

use super::Value;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// FNV-1a over a byte slice — used both to hash instruction sequences for
/// the content-addressed cache and as the primitive that
/// `hash_value` builds on, so both stay stable across runs within a
/// process.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET;
    for &byte in bytes {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn mix(hash: &mut u64, bytes: &[u8]) {
    *hash ^= fnv1a(bytes);
    *hash = hash.wrapping_mul(FNV_PRIME);
}

/// Structural hash of a `Value`, discriminated by variant so that values of
/// different kinds never collide on payload alone (e.g. `Int(0)` and
/// `Bool(false)`). Floats hash by bit pattern (with `-0.0` normalized to
/// `0.0` and all NaNs normalized to one pattern) since `f64` has no `Hash`
/// impl of its own.
pub fn hash_value(value: &Value) -> u64 {
    let mut hash = FNV_OFFSET;
    match value {
        Value::Nil => mix(&mut hash, &[0]),
        Value::Bool(b) => mix(&mut hash, &[1, *b as u8]),
        Value::Int(i) => {
            mix(&mut hash, &[2]);
            mix(&mut hash, &i.to_le_bytes());
        }
        Value::Float(f) => {
            mix(&mut hash, &[3]);
            let normalized: f64 = if f.is_nan() {
                f64::NAN
            } else if *f == 0.0 {
                0.0
            } else {
                *f
            };
            mix(&mut hash, &normalized.to_bits().to_le_bytes());
        }
        Value::String(s) => {
            mix(&mut hash, &[4]);
            mix(&mut hash, s.as_bytes());
        }
        Value::Slice(items, _) => {
            mix(&mut hash, &[5]);
            for item in items.iter() {
                mix(&mut hash, &hash_value(item).to_le_bytes());
            }
        }
        Value::Map(map) => {
            mix(&mut hash, &[6]);
            for (k, v) in map.iter() {
                mix(&mut hash, k.as_bytes());
                mix(&mut hash, &hash_value(v).to_le_bytes());
            }
        }
        // Funcs and pipeline ops are identity-like and not used as cache/
        // map keys in practice; hash by discriminant only.
        Value::Func(_) => mix(&mut hash, &[7]),
        Value::PlaceholderExpr(_) => mix(&mut hash, &[8]),
        Value::PipelineOp(_) => mix(&mut hash, &[9]),
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_bool_zero_do_not_collide() {
        assert_ne!(hash_value(&Value::Int(0)), hash_value(&Value::Bool(false)));
    }

    #[test]
    fn equal_strings_hash_equal() {
        assert_eq!(
            hash_value(&Value::string("abc")),
            hash_value(&Value::string("abc"))
        );
    }

    #[test]
    fn nan_hashes_consistently() {
        assert_eq!(
            hash_value(&Value::Float(f64::NAN)),
            hash_value(&Value::Float(-f64::NAN))
        );
    }
}
