// ABOUTME: The free-function builtin registry — populated at link time via `inventory`

pub mod collection;
pub mod conversion;
pub mod math;
pub mod methods;
pub mod string;

use crate::error::RuntimeError;
use crate::value::Value;
use std::sync::OnceLock;

pub type BuiltinFn = fn(&[Value]) -> Result<Value, RuntimeError>;

/// One entry per `#[builtin(...)]`-annotated function, submitted at link
/// time rather than through a hand-maintained `register_*` call.
pub struct BuiltinEntry {
    pub name: &'static str,
    pub category: &'static str,
    pub arity_spec: &'static str,
    pub func: BuiltinFn,
}

inventory::collect!(BuiltinEntry);

/// The arity grammar `#[builtin(arity = "...")]` accepts:
/// an exact count, an inclusive range, a floor, or unrestricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    pub fn parse(spec: &str) -> Self {
        if spec == "any" {
            return Arity::Any;
        }
        if let Some(n) = spec.strip_prefix("at_least_") {
            return Arity::AtLeast(n.parse().unwrap_or(0));
        }
        if let Some((lo, hi)) = spec.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.parse(), hi.parse()) {
                return Arity::Range(lo, hi);
            }
        }
        spec.parse().map(Arity::Exact).unwrap_or(Arity::Any)
    }

    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range(lo, hi) => count >= lo && count <= hi,
            Arity::AtLeast(n) => count >= n,
            Arity::Any => true,
        }
    }

    pub fn describe(self) -> String {
        match self {
            Arity::Exact(n) => n.to_string(),
            Arity::Range(lo, hi) => format!("{lo}-{hi}"),
            Arity::AtLeast(n) => format!("at least {n}"),
            Arity::Any => "any number of".to_string(),
        }
    }
}

/// The builtin table, sorted by name once so that the index a program's
/// compile time assigns a builtin is stable for the lifetime of the
/// process (`inventory::iter` order reflects link order, which isn't a
/// contract worth depending on).
fn table() -> &'static [(&'static BuiltinEntry, Arity)] {
    static TABLE: OnceLock<Vec<(&'static BuiltinEntry, Arity)>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut entries: Vec<&'static BuiltinEntry> = inventory::iter::<BuiltinEntry>().collect();
        entries.sort_by_key(|e| e.name);
        entries
            .into_iter()
            .map(|e| (e, Arity::parse(e.arity_spec)))
            .collect()
    })
}

/// Builtin names in table (index) order, so `symtab::define_builtin`'s
/// index assignment lines up with `index_of`/`by_index`.
pub fn all_names() -> Vec<&'static str> {
    table().iter().map(|(e, _)| e.name).collect()
}

pub fn index_of(name: &str) -> Option<u16> {
    table().iter().position(|(e, _)| e.name == name).map(|i| i as u16)
}

pub fn by_index(index: u16) -> Option<(&'static BuiltinEntry, Arity)> {
    table().get(index as usize).copied()
}

pub fn by_name(name: &str) -> Option<(&'static BuiltinEntry, Arity)> {
    table().iter().find(|(e, _)| e.name == name).copied()
}

pub fn call(index: u16, args: &[Value]) -> Result<Value, RuntimeError> {
    let (entry, arity) = by_index(index).ok_or(RuntimeError::UnknownOpcode(index as u8))?;
    if !arity.accepts(args.len()) {
        return Err(RuntimeError::arity_error(entry.name, arity.describe(), args.len()));
    }
    (entry.func)(args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_grammar_parses() {
        assert_eq!(Arity::parse("2"), Arity::Exact(2));
        assert_eq!(Arity::parse("1-2"), Arity::Range(1, 2));
        assert_eq!(Arity::parse("at_least_1"), Arity::AtLeast(1));
        assert_eq!(Arity::parse("any"), Arity::Any);
    }

    #[test]
    fn len_builtin_is_registered() {
        let idx = index_of("len").expect("len should be registered");
        let result = call(idx, &[Value::string("hello")]).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn unknown_name_is_absent() {
        assert_eq!(index_of("definitely_not_a_builtin"), None);
    }
}
