// ABOUTME: Compiles the `|` pipeline operator's right-hand side into a `PipelineOp` or a plain callable

use super::Compiler;
use crate::ast::{Literal, Node, NodeKind};
use crate::error::{CompileError, Position};
use crate::opcode::Opcode;
use crate::symtab::Scope;
use crate::value::{PipelineNode, PipelineOp, Value};
use std::rc::Rc;

/// `data | func` — `data` is compiled normally; `func` compiles to either a
/// `PipelineOp` constant (when it contains a `#` placeholder, or is a bare
/// builtin name used as sugar for `builtin(#)`) or to an ordinary callable
/// expression (a lambda or a variable holding a closure, applied to each
/// element directly). The VM's `OpPipe` handler distinguishes the two by
/// the popped value's variant.
pub(super) fn compile_pipe(
    compiler: &mut Compiler,
    data: &Node,
    func: &Node,
    position: Position,
) -> Result<(), CompileError> {
    // `data | f(arg1, arg2, ...)` where none of the call's arguments touch
    // `#` — e.g. `users | filter(u => u.age >= 18)` — has no per-element
    // deferred evaluation to do: it desugars entirely at compile time to
    // `f(data, arg1, arg2, ...)`, skipping `OpPipe` altogether. This is the
    // resolution documented in DESIGN.md, which otherwise collides with a
    // lambda argument that contains no placeholder at all.
    if let NodeKind::Call { callee, args } = &func.kind {
        if !func.has_placeholder() {
            let mut prepended = Vec::with_capacity(args.len() + 1);
            prepended.push(data.clone());
            prepended.extend(args.iter().cloned());
            let desugared = Node::new(
                NodeKind::Call {
                    callee: callee.clone(),
                    args: prepended,
                },
                position,
            );
            return compiler.compile_node(&desugared);
        }
    }

    compiler.compile_node(data)?;

    let is_bare_builtin = matches!(&func.kind, NodeKind::Identifier(name)
        if compiler.symtab.resolve(name).is_some_and(|s| s.scope == Scope::Builtin));

    if is_bare_builtin {
        let NodeKind::Identifier(name) = &func.kind else {
            unreachable!()
        };
        let op = PipelineOp::SimplePlaceholder {
            function: name.clone(),
            args: vec![PipelineNode::Placeholder],
        };
        let idx = compiler.add_constant(Value::PipelineOp(Rc::new(op)));
        compiler.emit(Opcode::Constant, &[idx as u32]);
    } else if func.has_placeholder() {
        let op = build_pipeline_op(compiler, func, position)?;
        let idx = compiler.add_constant(Value::PipelineOp(Rc::new(op)));
        compiler.emit(Opcode::Constant, &[idx as u32]);
    } else {
        compiler.compile_node(func)?;
    }
    compiler.emit(Opcode::Pipe, &[]);
    Ok(())
}

fn is_placeholder(node: &Node) -> bool {
    matches!(node.kind, NodeKind::Placeholder)
}

/// Recognizes the known pipeline right-hand-side shapes and picks the
/// matching `PipelineOp` variant, falling back to a bare expression tree
/// for anything else that still contains a placeholder.
fn build_pipeline_op(compiler: &Compiler, func: &Node, position: Position) -> Result<PipelineOp, CompileError> {
    // `#.prop` used directly as the pipeline function.
    if let NodeKind::Member { object, property } = &func.kind {
        if is_placeholder(object) {
            return Ok(PipelineOp::MemberAccess {
                property: property.clone(),
            });
        }
    }

    if let NodeKind::Call { callee, args } = &func.kind {
        if let NodeKind::Identifier(function) = &callee.kind {
            if args.len() == 1 {
                // `f(#.method())`
                if let Some(method) = as_bare_placeholder_method_call(&args[0]) {
                    return Ok(PipelineOp::TypeMethod {
                        function: function.clone(),
                        method,
                        args: Vec::new(),
                    });
                }
                // `f(#.method() > const)` — a placeholder method call
                // nested inside a larger expression compiles to its own
                // sub-program, evaluated once per element.
                if let Some(method) = find_placeholder_method(&args[0]) {
                    let substituted = replace_placeholder(&args[0]);
                    let nested =
                        crate::compiler::compile(&substituted, &["#".to_string()], compiler.options.clone())?;
                    return Ok(PipelineOp::ComplexTypeMethod {
                        function: function.clone(),
                        method,
                        program: Rc::new(nested),
                    });
                }
            }
            // `f(<expr-with-#>)` in general.
            let built = args
                .iter()
                .map(|a| build_pipeline_node(a, position))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(PipelineOp::SimplePlaceholder {
                function: function.clone(),
                args: built,
            });
        }
    }

    Ok(PipelineOp::Expression(build_pipeline_node(func, position)?))
}

/// Matches `#.method()` exactly (no further wrapping), returning the method
/// name.
fn as_bare_placeholder_method_call(node: &Node) -> Option<String> {
    let NodeKind::Call { callee, args } = &node.kind else {
        return None;
    };
    if !args.is_empty() {
        return None;
    }
    let NodeKind::Member { object, property } = &callee.kind else {
        return None;
    };
    is_placeholder(object).then(|| property.clone())
}

/// Searches for a `#.method()` call anywhere in `node`, returning the first
/// method name found — used to recognize the `ComplexTypeMethod` shape.
fn find_placeholder_method(node: &Node) -> Option<String> {
    if let Some(method) = as_bare_placeholder_method_call(node) {
        return Some(method);
    }
    match &node.kind {
        NodeKind::Prefix { operand, .. } => find_placeholder_method(operand),
        NodeKind::Infix { left, right, .. } => {
            find_placeholder_method(left).or_else(|| find_placeholder_method(right))
        }
        NodeKind::Call { callee, args } => {
            find_placeholder_method(callee).or_else(|| args.iter().find_map(find_placeholder_method))
        }
        NodeKind::Index { object, index } => {
            find_placeholder_method(object).or_else(|| find_placeholder_method(index))
        }
        NodeKind::Member { object, .. } | NodeKind::OptionalChain { object, .. } => {
            find_placeholder_method(object)
        }
        NodeKind::NullCoalesce { left, right } => {
            find_placeholder_method(left).or_else(|| find_placeholder_method(right))
        }
        NodeKind::Conditional {
            test,
            consequent,
            alternative,
        } => find_placeholder_method(test)
            .or_else(|| find_placeholder_method(consequent))
            .or_else(|| find_placeholder_method(alternative)),
        _ => None,
    }
}

/// Clones `node`, replacing every bare `#` with the identifier `#` (a name
/// no source-level identifier can lex to, so it can't collide) — the
/// nested sub-program this feeds is compiled with `#` declared as its sole
/// global, and the VM binds it to the current element before each call.
fn replace_placeholder(node: &Node) -> Node {
    let kind = match &node.kind {
        NodeKind::Placeholder => NodeKind::Identifier("#".to_string()),
        NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::Import { .. } => node.kind.clone(),
        NodeKind::Prefix { op, operand } => NodeKind::Prefix {
            op: *op,
            operand: Box::new(replace_placeholder(operand)),
        },
        NodeKind::Infix { op, left, right } => NodeKind::Infix {
            op: *op,
            left: Box::new(replace_placeholder(left)),
            right: Box::new(replace_placeholder(right)),
        },
        NodeKind::Call { callee, args } => NodeKind::Call {
            callee: Box::new(replace_placeholder(callee)),
            args: args.iter().map(replace_placeholder).collect(),
        },
        NodeKind::Index { object, index } => NodeKind::Index {
            object: Box::new(replace_placeholder(object)),
            index: Box::new(replace_placeholder(index)),
        },
        NodeKind::Member { object, property } => NodeKind::Member {
            object: Box::new(replace_placeholder(object)),
            property: property.clone(),
        },
        NodeKind::OptionalChain { object, property } => NodeKind::OptionalChain {
            object: Box::new(replace_placeholder(object)),
            property: property.clone(),
        },
        NodeKind::NullCoalesce { left, right } => NodeKind::NullCoalesce {
            left: Box::new(replace_placeholder(left)),
            right: Box::new(replace_placeholder(right)),
        },
        NodeKind::Conditional {
            test,
            consequent,
            alternative,
        } => NodeKind::Conditional {
            test: Box::new(replace_placeholder(test)),
            consequent: Box::new(replace_placeholder(consequent)),
            alternative: Box::new(replace_placeholder(alternative)),
        },
        NodeKind::ArrayLiteral(items) => NodeKind::ArrayLiteral(items.iter().map(replace_placeholder).collect()),
        NodeKind::MapLiteral(entries) => {
            NodeKind::MapLiteral(entries.iter().map(|(k, v)| (k.clone(), replace_placeholder(v))).collect())
        }
        NodeKind::Lambda { params, body } => NodeKind::Lambda {
            params: params.clone(),
            body: Box::new(replace_placeholder(body)),
        },
        NodeKind::Pipe { data, func } => NodeKind::Pipe {
            data: Box::new(replace_placeholder(data)),
            func: Box::new(replace_placeholder(func)),
        },
        NodeKind::ModuleCall { module, function, args } => NodeKind::ModuleCall {
            module: module.clone(),
            function: function.clone(),
            args: args.iter().map(replace_placeholder).collect(),
        },
        NodeKind::Destructure { pattern, value } => NodeKind::Destructure {
            pattern: pattern.clone(),
            value: Box::new(replace_placeholder(value)),
        },
        NodeKind::Block(stmts) => NodeKind::Block(stmts.iter().map(replace_placeholder).collect()),
    };
    Node::new(kind, node.position)
}

/// Converts a placeholder-bearing expression into the `PipelineNode` tree
/// the VM evaluates once per element. Only the narrow shapes `PipelineNode`
/// supports are accepted; anything richer belongs behind
/// `ComplexTypeMethod`'s nested program instead.
fn build_pipeline_node(node: &Node, position: Position) -> Result<PipelineNode, CompileError> {
    match &node.kind {
        NodeKind::Placeholder => Ok(PipelineNode::Placeholder),
        NodeKind::Literal(lit) => Ok(PipelineNode::Constant(Box::new(literal_value(lit)))),
        NodeKind::Infix { op, left, right } => Ok(PipelineNode::Infix {
            op: op.as_str().to_string(),
            left: Box::new(build_pipeline_node(left, position)?),
            right: Box::new(build_pipeline_node(right, position)?),
        }),
        NodeKind::Prefix { op, operand } => Ok(PipelineNode::Prefix {
            op: op.as_str().to_string(),
            operand: Box::new(build_pipeline_node(operand, position)?),
        }),
        NodeKind::Member { object, property } => Ok(PipelineNode::Member {
            object: Box::new(build_pipeline_node(object, position)?),
            property: property.clone(),
        }),
        NodeKind::Call { callee, args } => {
            let NodeKind::Member { object, property } = &callee.kind else {
                return Err(CompileError::TypeMismatch {
                    expected: "placeholder/literal/infix/prefix/member/method-call".into(),
                    actual: format!("{:?}", callee.kind),
                    position,
                });
            };
            let built_args = args
                .iter()
                .map(|a| build_pipeline_node(a, position))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PipelineNode::MethodCall {
                object: Box::new(build_pipeline_node(object, position)?),
                method: property.clone(),
                args: built_args,
            })
        }
        other => Err(CompileError::TypeMismatch {
            expected: "placeholder/literal/infix/prefix/member/method-call".into(),
            actual: format!("{other:?}"),
            position,
        }),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) => crate::value::pool::intern_int(*i),
        Literal::Float(f) => crate::value::pool::intern_float(*f),
        Literal::String(s) => crate::value::pool::intern_string(s),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Nil => Value::Nil,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::parser::parse;

    fn compile_src(src: &str) -> crate::opcode::Program {
        let node = parse(src).unwrap();
        crate::compiler::compile(&node, &["data".to_string()], CompileOptions::default()).unwrap()
    }

    #[test]
    fn member_access_pipeline_compiles_to_pipe_opcode() {
        let program = compile_src("data | #.name");
        assert!(program.instructions.contains(&(Opcode::Pipe as u8)));
    }

    #[test]
    fn simple_placeholder_call_compiles() {
        let program = compile_src("data | upper(#)");
        assert!(program.instructions.contains(&(Opcode::Pipe as u8)));
    }

    #[test]
    fn bare_builtin_reference_pipe_emits_pipeline_op() {
        let program = compile_src("data | upper");
        assert!(program.instructions.contains(&(Opcode::Pipe as u8)));
        assert!(program
            .constants
            .iter()
            .any(|c| matches!(c, Value::PipelineOp(_))));
    }
}
