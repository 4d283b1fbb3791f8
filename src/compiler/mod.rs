// ABOUTME: AST to bytecode compiler — constant folding, type-aware opcode selection, scope resolution

pub mod pipeline;

use crate::ast::{InfixOp, Literal, Node, NodeKind, Pattern, PrefixOp};
use crate::config::CompileOptions;
use crate::error::{CompileError, Position};
use crate::opcode::{make, Opcode, Program};
use crate::symtab::{Scope, Symbol, SymbolTable};
use crate::value::hash::hash_value;
use crate::value::{TypeKind, Value};
use std::collections::HashMap;
use std::rc::Rc;

pub fn compile(node: &Node, env_vars: &[String], options: CompileOptions) -> Result<Program, CompileError> {
    if let Some(expected) = options.expected_type {
        if let Some(inferred) = infer_static_type(node) {
            if inferred != expected {
                return Err(CompileError::TypeMismatch {
                    expected: expected.name().to_string(),
                    actual: inferred.name().to_string(),
                    position: node.position,
                });
            }
        }
    }
    let mut compiler = Compiler::new_global(env_vars, options);
    compiler.compile_node(node)?;
    compiler.emit(Opcode::Halt, &[]);
    Ok(compiler.into_program())
}

pub(crate) struct Compiler {
    instructions: Vec<u8>,
    constants: Vec<Value>,
    const_lookup: HashMap<u64, Vec<u16>>,
    symtab: Rc<SymbolTable>,
    variables: Vec<String>,
    variable_index: HashMap<String, u16>,
    fields: HashMap<String, u16>,
    builtins_used: HashMap<String, u16>,
    options: CompileOptions,
}

impl Compiler {
    /// `env_vars` is the host environment's binding set; it is sorted
    /// alphabetically and declared as globals before anything else is
    /// compiled, so the resulting `Program.variables` prefix is the stable
    /// "globals order" a host binds by name against. Any
    /// destructuring encountered later appends past this prefix.
    fn new_global(env_vars: &[String], options: CompileOptions) -> Self {
        let symtab = Rc::new(SymbolTable::new_global());
        for (idx, name) in crate::builtins::all_names().into_iter().enumerate() {
            symtab.define_builtin(idx as u16, name);
        }
        let mut sorted: Vec<String> = env_vars.to_vec();
        sorted.sort();
        sorted.dedup();
        let mut compiler = Self {
            instructions: Vec::new(),
            constants: Vec::new(),
            const_lookup: HashMap::new(),
            symtab,
            variables: Vec::new(),
            variable_index: HashMap::new(),
            fields: HashMap::new(),
            builtins_used: HashMap::new(),
            options,
        };
        for name in &sorted {
            compiler.declare_local_var(name);
        }
        compiler
    }

    /// A fresh compiler for a lambda body, sharing nothing with the
    /// enclosing compiler except the symbol-table chain — each lambda
    /// gets its own bytecode fragment and constant pool.
    fn new_enclosed(parent_symtab: Rc<SymbolTable>, options: CompileOptions) -> Self {
        let symtab = Rc::new(SymbolTable::new_enclosed(parent_symtab));
        Self {
            instructions: Vec::new(),
            constants: Vec::new(),
            const_lookup: HashMap::new(),
            symtab,
            variables: Vec::new(),
            variable_index: HashMap::new(),
            fields: HashMap::new(),
            builtins_used: HashMap::new(),
            options,
        }
    }

    fn into_program(self) -> Program {
        Program {
            instructions: self.instructions,
            constants: self.constants,
            variables: self.variables,
            variable_index: self.variable_index,
            fields: self.fields,
            builtins: self.builtins_used,
            timeout: self.options.timeout,
        }
    }

    fn emit(&mut self, op: Opcode, operands: &[u32]) -> usize {
        let pos = self.instructions.len();
        self.instructions.extend(make(op, operands));
        pos
    }

    fn patch_u16(&mut self, at: usize, value: u16) {
        let bytes = value.to_be_bytes();
        self.instructions[at + 1] = bytes[0];
        self.instructions[at + 2] = bytes[1];
    }

    fn add_constant(&mut self, value: Value) -> u16 {
        let h = hash_value(&value);
        if let Some(candidates) = self.const_lookup.get(&h) {
            for &idx in candidates {
                if self.constants[idx as usize] == value {
                    return idx;
                }
            }
        }
        let idx = self.constants.len() as u16;
        self.constants.push(value);
        self.const_lookup.entry(h).or_default().push(idx);
        idx
    }

    fn declare_local_var(&mut self, name: &str) -> Symbol {
        let sym = self.symtab.define(name);
        let flat_index = sym.index;
        // Keep `variables`/`variable_index` in sync with however the
        // symbol table numbered this definition.
        if (flat_index as usize) == self.variables.len() {
            self.variables.push(name.to_string());
        } else if (flat_index as usize) < self.variables.len() {
            self.variables[flat_index as usize] = name.to_string();
        } else {
            self.variables.resize(flat_index as usize + 1, String::new());
            self.variables[flat_index as usize] = name.to_string();
        }
        self.variable_index.insert(name.to_string(), flat_index);
        sym
    }

    // ---- statement / block ----------------------------------------------------

    fn compile_node(&mut self, node: &Node) -> Result<(), CompileError> {
        match &node.kind {
            NodeKind::Block(statements) => {
                for (i, stmt) in statements.iter().enumerate() {
                    self.compile_node(stmt)?;
                    if i + 1 < statements.len() {
                        self.emit(Opcode::Pop, &[]);
                    }
                }
                Ok(())
            }
            NodeKind::Literal(lit) => self.compile_literal(lit),
            NodeKind::Identifier(name) => self.compile_identifier(name, node.position),
            NodeKind::Placeholder => Err(CompileError::PlaceholderOutsidePipeline {
                position: node.position,
            }),
            NodeKind::Prefix { op, operand } => self.compile_prefix(*op, operand, node.position),
            NodeKind::Infix { op, left, right } => self.compile_infix(*op, left, right, node.position),
            NodeKind::Call { callee, args } => self.compile_call(callee, args, node.position),
            NodeKind::Index { object, index } => {
                self.compile_node(object)?;
                self.compile_node(index)?;
                self.emit(Opcode::Index, &[]);
                Ok(())
            }
            NodeKind::Member { object, property } => {
                self.compile_node(object)?;
                let idx = self.add_constant(Value::string(property.as_str()));
                self.fields.entry(property.clone()).or_insert(idx);
                self.emit(Opcode::Constant, &[idx as u32]);
                self.emit(Opcode::Member, &[]);
                Ok(())
            }
            NodeKind::OptionalChain { object, property } => {
                self.compile_node(object)?;
                let idx = self.add_constant(Value::string(property.as_str()));
                self.emit(Opcode::Constant, &[idx as u32]);
                self.emit(Opcode::OptionalChaining, &[]);
                Ok(())
            }
            NodeKind::NullCoalesce { left, right } => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                self.emit(Opcode::NullCoalescing, &[]);
                Ok(())
            }
            NodeKind::Conditional {
                test,
                consequent,
                alternative,
            } => self.compile_conditional(test, consequent, alternative),
            NodeKind::ArrayLiteral(items) => {
                for item in items {
                    self.compile_node(item)?;
                }
                self.emit(Opcode::Slice, &[items.len() as u32]);
                Ok(())
            }
            NodeKind::MapLiteral(entries) => {
                for (key, value) in entries {
                    let idx = self.add_constant(Value::string(key.as_str()));
                    self.emit(Opcode::Constant, &[idx as u32]);
                    self.compile_node(value)?;
                }
                self.emit(Opcode::Map, &[entries.len() as u32]);
                Ok(())
            }
            NodeKind::Lambda { params, body } => self.compile_lambda(params, body, node.position),
            NodeKind::Pipe { data, func } => pipeline::compile_pipe(self, data, func, node.position),
            NodeKind::Import { module } => {
                if !crate::modules::is_known_module(module) {
                    return Err(CompileError::unknown_identifier(module.clone(), node.position));
                }
                let idx = self.add_constant(Value::Nil);
                self.emit(Opcode::Constant, &[idx as u32]);
                Ok(())
            }
            NodeKind::ModuleCall { module, function, args } => {
                if !crate::modules::is_known_module(module) {
                    return Err(CompileError::unknown_identifier(module.clone(), node.position));
                }
                for arg in args {
                    self.compile_node(arg)?;
                }
                let module_idx = self.add_constant(Value::string(module.as_str()));
                let func_idx = self.add_constant(Value::string(function.as_str()));
                self.emit(
                    Opcode::ModuleCall,
                    &[module_idx as u32, func_idx as u32, args.len() as u32],
                );
                Ok(())
            }
            NodeKind::Destructure { pattern, value } => self.compile_destructure(pattern, value, node.position),
        }
    }

    fn compile_literal(&mut self, lit: &Literal) -> Result<(), CompileError> {
        let value = literal_to_value(lit);
        let idx = self.add_constant(value);
        self.emit(Opcode::Constant, &[idx as u32]);
        Ok(())
    }

    fn compile_identifier(&mut self, name: &str, position: Position) -> Result<(), CompileError> {
        let symbol = self
            .symtab
            .resolve(name)
            .ok_or_else(|| CompileError::unknown_identifier(name.to_string(), position))?;
        match symbol.scope {
            Scope::Builtin => Err(CompileError::unknown_identifier(name.to_string(), position)),
            _ => {
                self.emit(Opcode::GetVar, &[symbol.index as u32]);
                Ok(())
            }
        }
    }

    fn compile_prefix(&mut self, op: PrefixOp, operand: &Node, position: Position) -> Result<(), CompileError> {
        if !self.options.disable_constant_folding {
            if let NodeKind::Literal(lit) = &operand.kind {
                if let Some(folded) = fold_prefix(op, lit) {
                    return self.compile_literal(&folded);
                }
            }
        }
        self.compile_node(operand)?;
        let op = match op {
            PrefixOp::Neg => Opcode::Neg,
            PrefixOp::Not => Opcode::Not,
            PrefixOp::BitNot => Opcode::BitNot,
        };
        self.emit(op, &[]);
        Ok(())
    }

    fn compile_infix(
        &mut self,
        op: InfixOp,
        left: &Node,
        right: &Node,
        _position: Position,
    ) -> Result<(), CompileError> {
        if !self.options.disable_constant_folding {
            if let (NodeKind::Literal(l), NodeKind::Literal(r)) = (&left.kind, &right.kind) {
                if let Some(folded) = fold_infix(op, l, r) {
                    return self.compile_literal(&folded);
                }
            }
        }

        match op {
            InfixOp::And => return self.compile_short_circuit(true, left, right),
            InfixOp::Or => return self.compile_short_circuit(false, left, right),
            // `<`/`<=` canonicalize to swapped `>`/`>=`.
            InfixOp::Lt => {
                self.compile_node(right)?;
                self.compile_node(left)?;
                self.emit(Opcode::GreaterThan, &[]);
                return Ok(());
            }
            InfixOp::LtEq => {
                self.compile_node(right)?;
                self.compile_node(left)?;
                self.emit(Opcode::GreaterEqual, &[]);
                return Ok(());
            }
            // `**` has no dedicated opcode family; it compiles to a call
            // against the `pow` builtin, same as a source-level `pow(a, b)`.
            InfixOp::Pow => {
                self.compile_node(left)?;
                self.compile_node(right)?;
                let idx = crate::builtins::index_of("pow").expect("pow builtin is registered");
                self.emit(Opcode::Builtin, &[idx as u32, 2]);
                return Ok(());
            }
            _ => {}
        }

        self.compile_node(left)?;
        self.compile_node(right)?;

        let specialized = if self.options.disable_type_specialization {
            None
        } else {
            specialize_infix(op, infer_static_type(left), infer_static_type(right))
        };

        let opcode = specialized.unwrap_or(match op {
            InfixOp::Add => Opcode::Add,
            InfixOp::Sub => Opcode::Sub,
            InfixOp::Mul => Opcode::Mul,
            InfixOp::Div => Opcode::Div,
            InfixOp::Mod => Opcode::Mod,
            InfixOp::Eq => Opcode::Equal,
            InfixOp::NotEq => Opcode::NotEqual,
            InfixOp::Gt => Opcode::GreaterThan,
            InfixOp::GtEq => Opcode::GreaterEqual,
            InfixOp::BitAnd => Opcode::BitAnd,
            InfixOp::BitOr => Opcode::BitOr,
            InfixOp::BitXor => Opcode::BitXor,
            InfixOp::Shl => Opcode::ShiftL,
            InfixOp::Shr => Opcode::ShiftR,
            InfixOp::Pow | InfixOp::Lt | InfixOp::LtEq | InfixOp::And | InfixOp::Or => {
                unreachable!("handled above")
            }
        });

        self.emit(opcode, &[]);
        Ok(())
    }

    /// `&&`/`||` short-circuit: only the left side is unconditionally
    /// evaluated. The VM's conditional jumps peek rather than pop, so the
    /// short-circuited value is left on the stack by the jump itself.
    fn compile_short_circuit(&mut self, is_and: bool, left: &Node, right: &Node) -> Result<(), CompileError> {
        self.compile_node(left)?;
        let jump_op = if is_and { Opcode::JumpFalse } else { Opcode::JumpTrue };
        let jump_pos = self.emit(jump_op, &[0]);
        self.emit(Opcode::Pop, &[]);
        self.compile_node(right)?;
        let after = self.instructions.len();
        self.patch_u16(jump_pos, after as u16);
        Ok(())
    }

    fn compile_conditional(
        &mut self,
        test: &Node,
        consequent: &Node,
        alternative: &Node,
    ) -> Result<(), CompileError> {
        self.compile_node(test)?;
        let jump_false_pos = self.emit(Opcode::JumpFalse, &[0]);
        self.emit(Opcode::Pop, &[]);
        self.compile_node(consequent)?;
        let jump_end_pos = self.emit(Opcode::Jump, &[0]);
        let alt_start = self.instructions.len();
        self.patch_u16(jump_false_pos, alt_start as u16);
        self.emit(Opcode::Pop, &[]);
        self.compile_node(alternative)?;
        let end = self.instructions.len();
        self.patch_u16(jump_end_pos, end as u16);
        Ok(())
    }

    fn compile_call(&mut self, callee: &Node, args: &[Node], position: Position) -> Result<(), CompileError> {
        if let NodeKind::Identifier(name) = &callee.kind {
            if let Some(symbol) = self.symtab.resolve(name) {
                if symbol.scope == Scope::Builtin {
                    for arg in args {
                        self.compile_node(arg)?;
                    }
                    self.builtins_used.entry(name.clone()).or_insert(symbol.index);
                    self.emit(Opcode::Builtin, &[symbol.index as u32, args.len() as u32]);
                    return Ok(());
                }
            } else {
                return Err(CompileError::unknown_identifier(name.clone(), position));
            }
        }
        // `receiver.method(args...)` — member-call syntax
        // compiles to a dedicated `OpMethodCall` rather than an `OpMember`
        // result fed into `OpCall`, since type methods are looked up in
        // their own table (see DESIGN.md).
        if let NodeKind::Member { object, property } = &callee.kind {
            self.compile_node(object)?;
            for arg in args {
                self.compile_node(arg)?;
            }
            let idx = self.add_constant(Value::string(property.as_str()));
            self.emit(Opcode::MethodCall, &[idx as u32, args.len() as u32]);
            return Ok(());
        }
        self.compile_node(callee)?;
        for arg in args {
            self.compile_node(arg)?;
        }
        self.emit(Opcode::Call, &[args.len() as u32]);
        Ok(())
    }

    fn compile_lambda(&mut self, params: &[String], body: &Node, position: Position) -> Result<(), CompileError> {
        let mut child = Compiler::new_enclosed(self.symtab.clone(), self.options.clone());
        for p in params {
            child.declare_local_var(p);
        }
        child.symtab.set_free_base(params.len() as u16);
        child.compile_node(body)?;
        child.emit(Opcode::Halt, &[]);

        let free_names = child.symtab.free_names();
        for name in &free_names {
            child.variables.push(name.clone());
            let idx = child.variables.len() as u16 - 1;
            child.variable_index.insert(name.clone(), idx);
        }

        let child_program = child.into_program();
        let template = Value::Func(Rc::new(crate::value::FuncValue {
            name: None,
            params: params.to_vec(),
            body: Rc::new(child_program),
            captured: Rc::new(Vec::new()),
        }));
        let const_idx = self.add_constant(template);

        for name in &free_names {
            self.compile_identifier(name, position)?;
        }
        self.emit(Opcode::MakeClosure, &[const_idx as u32, free_names.len() as u32]);
        Ok(())
    }

    fn compile_destructure(&mut self, pattern: &Pattern, value: &Node, position: Position) -> Result<(), CompileError> {
        self.compile_node(value)?;
        match pattern {
            Pattern::Array(items) => {
                for item in items {
                    match item {
                        Pattern::Identifier(name) => {
                            self.declare_local_var(name);
                        }
                        Pattern::Rest(_) => {
                            return Err(CompileError::TypeMismatch {
                                expected: "flat identifier pattern".into(),
                                actual: "rest pattern".into(),
                                position,
                            })
                        }
                        _ => {
                            return Err(CompileError::TypeMismatch {
                                expected: "flat identifier pattern".into(),
                                actual: "nested pattern".into(),
                                position,
                            })
                        }
                    }
                }
                let start_idx = self.start_index_of(items)?;
                self.emit(Opcode::ArrayDestructure, &[items.len() as u32, start_idx as u32]);
                Ok(())
            }
            Pattern::Object(entries) => {
                for (_, sub) in entries {
                    match sub {
                        Pattern::Identifier(name) => {
                            self.declare_local_var(name);
                        }
                        _ => {
                            return Err(CompileError::TypeMismatch {
                                expected: "flat identifier pattern".into(),
                                actual: "nested pattern".into(),
                                position,
                            })
                        }
                    }
                }
                let start_idx = self.object_start_index(entries)?;
                for (key, _) in entries {
                    let idx = self.add_constant(Value::string(key.as_str()));
                    self.emit(Opcode::Constant, &[idx as u32]);
                }
                self.emit(Opcode::ObjectDestructure, &[entries.len() as u32, start_idx as u32]);
                Ok(())
            }
            Pattern::Identifier(name) => {
                let sym = self.declare_local_var(name);
                self.emit(Opcode::SetVar, &[sym.index as u32]);
                Ok(())
            }
            Pattern::Rest(_) => Err(CompileError::TypeMismatch {
                expected: "binding pattern".into(),
                actual: "bare rest pattern".into(),
                position,
            }),
        }
    }

    fn start_index_of(&self, items: &[Pattern]) -> Result<u16, CompileError> {
        for item in items {
            if let Pattern::Identifier(name) = item {
                if let Some(&idx) = self.variable_index.get(name) {
                    return Ok(idx);
                }
            }
        }
        Ok(0)
    }

    fn object_start_index(&self, entries: &[(String, Pattern)]) -> Result<u16, CompileError> {
        for (_, sub) in entries {
            if let Pattern::Identifier(name) = sub {
                if let Some(&idx) = self.variable_index.get(name) {
                    return Ok(idx);
                }
            }
        }
        Ok(0)
    }
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(i) => crate::value::pool::intern_int(*i),
        Literal::Float(f) => crate::value::pool::intern_float(*f),
        Literal::String(s) => crate::value::pool::intern_string(s),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Nil => Value::Nil,
    }
}

fn fold_prefix(op: PrefixOp, operand: &Literal) -> Option<Literal> {
    match (op, operand) {
        (PrefixOp::Neg, Literal::Int(i)) => i.checked_neg().map(Literal::Int),
        (PrefixOp::Neg, Literal::Float(f)) => {
            let r = -f;
            r.is_finite().then_some(Literal::Float(r))
        }
        (PrefixOp::Not, lit) => Some(Literal::Bool(!literal_to_value(lit).truthy())),
        (PrefixOp::BitNot, Literal::Int(i)) => Some(Literal::Int(!i)),
        _ => None,
    }
}

/// Folds a literal/literal infix expression at compile time. Returns `None`
/// to defer to the runtime opcode — division and modulo always defer (so a
/// literal zero divisor still raises `RuntimeError::DivisionByZero` rather
/// than a compile error), and arithmetic that would overflow an `i64` or
/// produce a non-finite `f64` also defers rather than folding to a wrapped
/// or `inf`/`NaN` constant.
fn fold_infix(op: InfixOp, l: &Literal, r: &Literal) -> Option<Literal> {
    use Literal::*;
    match op {
        InfixOp::Div | InfixOp::Mod => None,
        InfixOp::Add => match (l, r) {
            (Int(a), Int(b)) => a.checked_add(*b).map(Int),
            (Float(a), Float(b)) => finite(a + b),
            (Int(a), Float(b)) => finite(*a as f64 + b),
            (Float(a), Int(b)) => finite(a + *b as f64),
            (String(a), String(b)) => Some(String(format!("{a}{b}"))),
            _ => None,
        },
        InfixOp::Sub => match (l, r) {
            (Int(a), Int(b)) => a.checked_sub(*b).map(Int),
            (Float(a), Float(b)) => finite(a - b),
            (Int(a), Float(b)) => finite(*a as f64 - b),
            (Float(a), Int(b)) => finite(a - *b as f64),
            _ => None,
        },
        InfixOp::Mul => match (l, r) {
            (Int(a), Int(b)) => a.checked_mul(*b).map(Int),
            (Float(a), Float(b)) => finite(a * b),
            (Int(a), Float(b)) => finite(*a as f64 * b),
            (Float(a), Int(b)) => finite(a * *b as f64),
            _ => None,
        },
        InfixOp::Pow => match (l, r) {
            (Int(a), Int(b)) if *b >= 0 && *b <= u32::MAX as i64 => {
                a.checked_pow(*b as u32).map(Int)
            }
            (Float(a), Float(b)) => finite(a.powf(*b)),
            (Int(a), Float(b)) => finite((*a as f64).powf(*b)),
            (Float(a), Int(b)) => finite(a.powf(*b as f64)),
            _ => None,
        },
        InfixOp::BitAnd => match (l, r) {
            (Int(a), Int(b)) => Some(Int(a & b)),
            _ => None,
        },
        InfixOp::BitOr => match (l, r) {
            (Int(a), Int(b)) => Some(Int(a | b)),
            _ => None,
        },
        InfixOp::BitXor => match (l, r) {
            (Int(a), Int(b)) => Some(Int(a ^ b)),
            _ => None,
        },
        InfixOp::Shl => match (l, r) {
            (Int(a), Int(b)) if (0..64).contains(b) => Some(Int(a << b)),
            _ => None,
        },
        InfixOp::Shr => match (l, r) {
            (Int(a), Int(b)) if (0..64).contains(b) => Some(Int(a >> b)),
            _ => None,
        },
        InfixOp::And => Some(Bool(literal_to_value(l).truthy() && literal_to_value(r).truthy())),
        InfixOp::Or => Some(Bool(literal_to_value(l).truthy() || literal_to_value(r).truthy())),
        InfixOp::Eq => Some(Bool(literal_to_value(l) == literal_to_value(r))),
        InfixOp::NotEq => Some(Bool(literal_to_value(l) != literal_to_value(r))),
        InfixOp::Lt | InfixOp::LtEq | InfixOp::Gt | InfixOp::GtEq => {
            let ord = literal_to_value(l).partial_cmp_value(&literal_to_value(r)).ok()??;
            let result = match op {
                InfixOp::Lt => ord.is_lt(),
                InfixOp::LtEq => ord.is_le(),
                InfixOp::Gt => ord.is_gt(),
                InfixOp::GtEq => ord.is_ge(),
                _ => unreachable!(),
            };
            Some(Bool(result))
        }
    }
}

fn finite(f: f64) -> Option<Literal> {
    f.is_finite().then_some(Literal::Float(f))
}

fn infer_static_type(node: &Node) -> Option<TypeKind> {
    match &node.kind {
        NodeKind::Literal(Literal::Int(_)) => Some(TypeKind::Int),
        NodeKind::Literal(Literal::Float(_)) => Some(TypeKind::Float),
        NodeKind::Literal(Literal::String(_)) => Some(TypeKind::String),
        NodeKind::Literal(Literal::Bool(_)) => Some(TypeKind::Bool),
        NodeKind::Literal(Literal::Nil) => Some(TypeKind::Nil),
        NodeKind::Infix { op, left, right } => {
            let lt = infer_static_type(left)?;
            let rt = infer_static_type(right)?;
            match op {
                InfixOp::Add | InfixOp::Sub | InfixOp::Mul | InfixOp::Div | InfixOp::Mod | InfixOp::Pow
                    if lt == rt && matches!(lt, TypeKind::Int | TypeKind::Float) =>
                {
                    Some(lt)
                }
                InfixOp::Add if lt == TypeKind::String && rt == TypeKind::String => Some(TypeKind::String),
                _ => None,
            }
        }
        NodeKind::Prefix { op: PrefixOp::Neg, operand } => infer_static_type(operand),
        _ => None,
    }
}

/// Chooses a type-specialized opcode when both operands are known at
/// compile time to share a numeric type; `None` falls back
/// to the dynamically-dispatched generic opcode.
fn specialize_infix(op: InfixOp, lt: Option<TypeKind>, rt: Option<TypeKind>) -> Option<Opcode> {
    let (lt, rt) = (lt?, rt?);
    if lt != rt {
        return None;
    }
    match (op, lt) {
        (InfixOp::Add, TypeKind::Int) => Some(Opcode::AddInt64),
        (InfixOp::Sub, TypeKind::Int) => Some(Opcode::SubInt64),
        (InfixOp::Mul, TypeKind::Int) => Some(Opcode::MulInt64),
        (InfixOp::Div, TypeKind::Int) => Some(Opcode::DivInt64),
        (InfixOp::Mod, TypeKind::Int) => Some(Opcode::ModInt64),
        (InfixOp::Add, TypeKind::Float) => Some(Opcode::AddFloat64),
        (InfixOp::Sub, TypeKind::Float) => Some(Opcode::SubFloat64),
        (InfixOp::Mul, TypeKind::Float) => Some(Opcode::MulFloat64),
        (InfixOp::Div, TypeKind::Float) => Some(Opcode::DivFloat64),
        (InfixOp::Mod, TypeKind::Float) => Some(Opcode::ModFloat64),
        (InfixOp::Add, TypeKind::String) => Some(Opcode::AddString),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile_src(src: &str) -> Program {
        let node = parse(src).unwrap();
        compile(&node, &[], CompileOptions::default()).unwrap()
    }

    #[test]
    fn folds_constant_arithmetic() {
        let program = compile_src("1 + 2 * 3");
        assert_eq!(program.constants, vec![Value::Int(7)]);
    }

    #[test]
    fn defers_division_to_runtime_even_with_literal_zero() {
        let program = compile_src("1 / 0");
        assert!(program.constants.contains(&Value::Int(1)));
        assert!(program.constants.contains(&Value::Int(0)));
    }

    #[test]
    fn specializes_int_addition() {
        let node = parse("a + b").unwrap();
        let program = compile(&node, &["a".into(), "b".into()], CompileOptions::default()).unwrap();
        // with unknown variable types, no specialization: generic Add used
        assert!(program.instructions.contains(&(Opcode::Add as u8)));
    }

    #[test]
    fn unknown_identifier_errors() {
        let node = parse("totallyUndefined").unwrap();
        let err = compile(&node, &[], CompileOptions::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnknownIdentifier { .. }));
    }

    #[test]
    fn canonicalizes_less_than_to_swapped_greater_than() {
        let program = compile_src("1 < 2");
        // constant-folded entirely away; verify no-fold path separately below
        assert_eq!(program.constants, vec![Value::Bool(true)]);
    }

    #[test]
    fn less_than_with_variable_swaps_and_uses_greater_than() {
        let node = parse("a < 5").unwrap();
        let program = compile(&node, &["a".into()], CompileOptions::default()).unwrap();
        assert!(program.instructions.contains(&(Opcode::GreaterThan as u8)));
    }

    #[test]
    fn destructuring_declares_bindings() {
        let node = parse("[x, y] = [1, 2]; x + y").unwrap();
        let program = compile(&node, &[], CompileOptions::default()).unwrap();
        assert!(program.variable_index.contains_key("x"));
        assert!(program.variable_index.contains_key("y"));
    }

    #[test]
    fn expected_type_mismatch_is_a_compile_error() {
        let node = parse("1 + 2").unwrap();
        let options = CompileOptions {
            expected_type: Some(TypeKind::String),
            ..CompileOptions::default()
        };
        let err = compile(&node, &[], options).unwrap_err();
        assert!(matches!(err, CompileError::TypeMismatch { .. }));
    }

    #[test]
    fn expected_type_match_compiles_normally() {
        let node = parse("1 + 2").unwrap();
        let options = CompileOptions {
            expected_type: Some(TypeKind::Int),
            ..CompileOptions::default()
        };
        assert!(compile(&node, &[], options).is_ok());
    }

    #[test]
    fn lambda_captures_free_variable() {
        let node = parse("(x) => x + captured").unwrap();
        let program = compile(&node, &["captured".into()], CompileOptions::default()).unwrap();
        assert!(program.instructions.contains(&(Opcode::MakeClosure as u8)));
    }
}
