//! Procedural macros for exprlang builtin and type-method functions.
//!
//! Provides the `#[builtin]` and `#[type_method]` attribute macros, which
//! turn a free function into a registry entry submitted at link time via
//! `inventory`, instead of requiring an explicit call into a hand-maintained
//! `register_*` function.

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Parse simple `key = "value"` pairs out of an attribute's token stream.
/// Good enough for the small, flat argument lists these macros accept —
/// ad hoc parsing rather than pulling in `darling` for three string
/// fields.
fn parse_kv_args(attr_stream: TokenStream) -> std::collections::HashMap<String, String> {
    let attr_str = attr_stream.to_string();
    let mut out = std::collections::HashMap::new();
    for part in attr_str.split(',') {
        if let Some(eq) = part.find('=') {
            let key = part[..eq].trim().to_string();
            let mut val = part[eq + 1..].trim().to_string();
            if val.starts_with('"') && val.ends_with('"') && val.len() >= 2 {
                val = val[1..val.len() - 1].to_string();
            }
            if !key.is_empty() {
                out.insert(key, val);
            }
        }
    }
    out
}

/// Attribute macro for defining a free-standing builtin.
///
/// # Attribute Arguments
///
/// - `name`: the expression-language name (e.g. `"len"`); defaults to the
///   Rust function name when omitted.
/// - `category`: grouping used only for introspection/help.
/// - `arity`: one of `"N"`, `"N-M"`, `"at_least_N"`, `"any"` — parsed at
///   builtin-table build time, not by the macro itself.
///
/// # Example
///
/// ```ignore
/// #[builtin(name = "len", category = "Collection", arity = "1")]
/// pub fn len(args: &[Value]) -> Result<Value, RuntimeError> {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn builtin(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    let args = parse_kv_args(attr);

    let fn_name = func.sig.ident.clone();
    let name_to_use = args
        .get("name")
        .cloned()
        .unwrap_or_else(|| fn_name.to_string());
    let category = args.get("category").cloned().unwrap_or_default();
    let arity = args.get("arity").cloned().unwrap_or_else(|| "any".into());

    let expanded = quote! {
        #func

        ::inventory::submit! {
            crate::builtins::BuiltinEntry {
                name: #name_to_use,
                category: #category,
                arity_spec: #arity,
                func: #fn_name,
            }
        }
    };

    TokenStream::from(expanded)
}

/// Attribute macro for defining a per-type method (`"<type>.<method>"`).
///
/// # Attribute Arguments
///
/// - `type_name`: the runtime type this method is scoped to (e.g. `"string"`).
/// - `name`: the method name (e.g. `"upper"`); defaults to the function name.
/// - `arity`: same grammar as `#[builtin]`'s `arity`, counting arguments
///   *after* the receiver.
#[proc_macro_attribute]
pub fn type_method(attr: TokenStream, item: TokenStream) -> TokenStream {
    let func = parse_macro_input!(item as ItemFn);
    let args = parse_kv_args(attr);

    let fn_name = func.sig.ident.clone();
    let type_name = args.get("type_name").cloned().unwrap_or_default();
    let name_to_use = args
        .get("name")
        .cloned()
        .unwrap_or_else(|| fn_name.to_string());
    let arity = args.get("arity").cloned().unwrap_or_else(|| "any".into());

    let expanded = quote! {
        #func

        ::inventory::submit! {
            crate::builtins::methods::TypeMethodEntry {
                type_name: #type_name,
                name: #name_to_use,
                arity_spec: #arity,
                func: #fn_name,
            }
        }
    };

    TokenStream::from(expanded)
}
