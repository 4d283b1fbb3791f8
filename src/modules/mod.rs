// ABOUTME: Module registry consulted by `OpModuleCall` — a closed set of namespaces, unlike the open builtin table

pub mod math;
pub mod strings;

use crate::error::RuntimeError;
use crate::value::Value;

pub type ModuleFn = fn(&[Value]) -> Result<Value, RuntimeError>;

pub struct ModuleEntry {
    pub name: &'static str,
    pub func: ModuleFn,
}

pub fn resolve(module: &str, function: &str) -> Option<ModuleFn> {
    let functions: &[ModuleEntry] = match module {
        "math" => math::FUNCTIONS,
        "strings" => strings::FUNCTIONS,
        _ => return None,
    };
    functions.iter().find(|e| e.name == function).map(|e| e.func)
}

pub fn is_known_module(module: &str) -> bool {
    matches!(module, "math" | "strings")
}

pub fn call(module: &str, function: &str, args: &[Value]) -> Result<Value, RuntimeError> {
    match resolve(module, function) {
        Some(f) => f(args),
        None => Err(RuntimeError::custom(
            function,
            format!("unknown function '{module}.{function}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_module_function() {
        assert!(resolve("math", "sqrt").is_some());
        assert!(resolve("math", "nope").is_none());
        assert!(resolve("nonexistent", "sqrt").is_none());
    }
}
