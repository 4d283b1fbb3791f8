// ABOUTME: Per-type method registry consulted by the pipeline `#.method()` protocol

use super::Arity;
use crate::error::RuntimeError;
use crate::value::{TypeKind, Value};
use std::sync::OnceLock;

pub type TypeMethodFn = fn(&Value, &[Value]) -> Result<Value, RuntimeError>;

pub struct TypeMethodEntry {
    pub type_name: &'static str,
    pub name: &'static str,
    pub arity_spec: &'static str,
    pub func: TypeMethodFn,
}

inventory::collect!(TypeMethodEntry);

fn table() -> &'static [(&'static TypeMethodEntry, Arity)] {
    static TABLE: OnceLock<Vec<(&'static TypeMethodEntry, Arity)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut entries: Vec<&'static TypeMethodEntry> =
            inventory::iter::<TypeMethodEntry>().collect();
        entries.sort_by_key(|e| (e.type_name, e.name));
        entries
            .into_iter()
            .map(|e| (e, Arity::parse(e.arity_spec)))
            .collect()
    })
}

fn type_name_of(kind: TypeKind) -> &'static str {
    kind.name()
}

pub fn lookup(kind: TypeKind, method: &str) -> Option<(&'static TypeMethodEntry, Arity)> {
    let type_name = type_name_of(kind);
    table()
        .iter()
        .find(|(e, _)| e.type_name == type_name && e.name == method)
        .copied()
}

pub fn call(receiver: &Value, method: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    let (entry, arity) = lookup(receiver.type_kind(), method)
        .ok_or_else(|| RuntimeError::custom(method, format!("no such method on {}", receiver.type_name())))?;
    if !arity.accepts(args.len()) {
        return Err(RuntimeError::arity_error(entry.name, arity.describe(), args.len()));
    }
    (entry.func)(receiver, args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_upper_method_is_registered() {
        let result = call(&Value::string("hi"), "upper", &[]).unwrap();
        assert_eq!(result, Value::string("HI"));
    }

    #[test]
    fn unknown_method_errors() {
        assert!(call(&Value::Int(1), "nope", &[]).is_err());
    }
}
