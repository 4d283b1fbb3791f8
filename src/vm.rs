// ABOUTME: Stack-based bytecode interpreter — the dispatch loop, value arithmetic, and pipeline-protocol evaluation

use crate::builtins;
use crate::cache::InstructionCache;
use crate::error::RuntimeError;
use crate::modules;
use crate::opcode::{read_u16, read_u8, Opcode, Program};
use crate::value::{FuncValue, PipelineNode, PipelineOp, Value};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A single-threaded bytecode interpreter. One `Vm` instance is built per
/// `Run`/`Eval` call ("running the same program on the same VM
/// twice should produce independent results, no state bleeds between
/// runs") — the operand stack and pipeline context live entirely inside
/// this struct, never the `Program`.
///
/// `'a` ties an optional instruction cache and cooperative-cancellation
/// flag to the lifetime of the call that lent them; both are threaded
/// through every nested frame (lambda calls, pipeline sub-programs)
/// because they're fields on `self`, not parameters re-passed by hand.
pub struct Vm<'a> {
    stack: Vec<Value>,
    stack_size: usize,
    pipeline_element: Option<Value>,
    cache: Option<&'a InstructionCache>,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Vm<'a> {
    pub fn new(stack_size: usize) -> Self {
        Self {
            stack: Vec::new(),
            stack_size,
            pipeline_element: None,
            cache: None,
            cancel: None,
        }
    }

    /// Builds a `Vm` reusing an already-allocated stack buffer (cleared
    /// first) rather than starting from an empty `Vec` — the facade's VM
    /// pool hands back the backing allocation of a prior run instead of
    /// letting it drop ("stack and globals arrays are large
    /// pre-allocated buffers reused across executions").
    pub fn new_with_stack(stack_size: usize, mut stack: Vec<Value>) -> Self {
        stack.clear();
        Self {
            stack,
            stack_size,
            pipeline_element: None,
            cache: None,
            cancel: None,
        }
    }

    /// Reclaims the stack's backing allocation so the facade can return it
    /// to the pool after a run completes.
    pub fn into_stack(self) -> Vec<Value> {
        self.stack
    }

    pub fn with_cache(mut self, cache: &'a InstructionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Runs a compiled program against a host environment, binding `env`
    /// values to `program.variables`' prefix in order and padding any
    /// destructuring-introduced slots with `Nil`. `globals_size` is the
    /// configured ceiling — a program that declares more variables than
    /// that is a capacity error, not a silent truncation.
    pub fn run(&mut self, program: &Program, env: &[Value], globals_size: usize) -> Result<Value, RuntimeError> {
        self.stack.clear();
        self.pipeline_element = None;
        if program.variables.len() > globals_size {
            return Err(RuntimeError::GlobalsOutOfRange(program.variables.len()));
        }
        let mut globals: Vec<Value> = (0..program.variables.len())
            .map(|i| env.get(i).cloned().unwrap_or(Value::Nil))
            .collect();
        self.run_frame(&program.instructions, &program.constants, &mut globals)
    }

    fn push(&mut self, v: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.stack_size {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack.pop().ok_or(RuntimeError::StackUnderflow)
    }

    /// Pops `n` values and restores push order (first pushed ends up
    /// first in the returned `Vec`) — every call-like opcode pushes its
    /// arguments left to right, so popping is always followed by this.
    fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, RuntimeError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.pop()?);
        }
        out.reverse();
        Ok(out)
    }

    fn check_cancelled(&self) -> Result<(), RuntimeError> {
        if let Some(flag) = self.cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(RuntimeError::Timeout);
            }
        }
        Ok(())
    }

    /// The core dispatch loop, re-entered for lambda bodies and pipeline
    /// sub-programs alike — `globals` is this frame's flat variable
    /// array, addressed by `OpGetVar`/`OpSetVar`/destructure operands.
    fn run_frame(
        &mut self,
        instructions: &[u8],
        constants: &[Value],
        globals: &mut Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if let Some(cache) = self.cache {
            cache.record(instructions);
        }
        let mut ip = 0usize;
        loop {
            self.check_cancelled()?;
            let byte = instructions[ip];
            let op = Opcode::try_from(byte)?;
            ip += 1;

            match op {
                Opcode::Constant => {
                    let idx = read_u16(instructions, ip) as usize;
                    ip += 2;
                    self.push(constants[idx].clone())?;
                }
                Opcode::Pop => {
                    self.pop()?;
                }
                Opcode::GetVar => {
                    let idx = read_u16(instructions, ip) as usize;
                    ip += 2;
                    let v = globals
                        .get(idx)
                        .cloned()
                        .ok_or(RuntimeError::GlobalsOutOfRange(idx))?;
                    self.push(v)?;
                }
                Opcode::SetVar => {
                    let idx = read_u16(instructions, ip) as usize;
                    ip += 2;
                    let v = self.pop()?;
                    if idx >= globals.len() {
                        globals.resize(idx + 1, Value::Nil);
                    }
                    globals[idx] = v.clone();
                    self.push(v)?;
                }

                Opcode::Add => self.binary(value_add)?,
                Opcode::Sub => self.binary(value_sub)?,
                Opcode::Mul => self.binary(value_mul)?,
                Opcode::Div => self.binary(value_div)?,
                Opcode::Mod => self.binary(value_mod)?,
                Opcode::Neg => {
                    let v = self.pop()?;
                    self.push(value_neg(&v)?)?;
                }

                Opcode::AddInt64 => self.specialized_binary(value_add, |v| matches!(v, Value::Int(_)))?,
                Opcode::SubInt64 => self.specialized_binary(value_sub, |v| matches!(v, Value::Int(_)))?,
                Opcode::MulInt64 => self.specialized_binary(value_mul, |v| matches!(v, Value::Int(_)))?,
                Opcode::DivInt64 => self.specialized_binary(value_div, |v| matches!(v, Value::Int(_)))?,
                Opcode::ModInt64 => self.specialized_binary(value_mod, |v| matches!(v, Value::Int(_)))?,
                Opcode::AddFloat64 => self.specialized_binary(value_add, |v| matches!(v, Value::Float(_)))?,
                Opcode::SubFloat64 => self.specialized_binary(value_sub, |v| matches!(v, Value::Float(_)))?,
                Opcode::MulFloat64 => self.specialized_binary(value_mul, |v| matches!(v, Value::Float(_)))?,
                Opcode::DivFloat64 => self.specialized_binary(value_div, |v| matches!(v, Value::Float(_)))?,
                Opcode::ModFloat64 => self.specialized_binary(value_mod, |v| matches!(v, Value::Float(_)))?,
                Opcode::AddString => self.specialized_binary(value_add, |v| matches!(v, Value::String(_)))?,

                Opcode::Equal => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a == b))?;
                }
                Opcode::NotEqual => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a != b))?;
                }
                Opcode::GreaterThan => self.compare(|ord| ord.is_gt())?,
                Opcode::GreaterEqual => self.compare(|ord| ord.is_ge())?,
                Opcode::LessThan => self.compare(|ord| ord.is_lt())?,
                Opcode::LessEqual => self.compare(|ord| ord.is_le())?,

                Opcode::And => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a.truthy() && b.truthy()))?;
                }
                Opcode::Or => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::Bool(a.truthy() || b.truthy()))?;
                }
                Opcode::Not => {
                    let v = self.pop()?;
                    self.push(Value::Bool(!v.truthy()))?;
                }

                Opcode::BitAnd => self.binary(value_bitand)?,
                Opcode::BitOr => self.binary(value_bitor)?,
                Opcode::BitXor => self.binary(value_bitxor)?,
                Opcode::ShiftL => self.binary(value_shl)?,
                Opcode::ShiftR => self.binary(value_shr)?,
                Opcode::BitNot => {
                    let v = self.pop()?;
                    self.push(value_bitnot(&v)?)?;
                }

                Opcode::Call => {
                    let argc = read_u8(instructions, ip) as usize;
                    ip += 1;
                    let args = self.pop_n(argc)?;
                    let callee = self.pop()?;
                    let result = self.call_value(callee, args)?;
                    self.push(result)?;
                }
                Opcode::Builtin => {
                    let index = read_u8(instructions, ip) as u16;
                    let argc = read_u8(instructions, ip + 1) as usize;
                    ip += 2;
                    let args = self.pop_n(argc)?;
                    let result = self.dispatch_builtin(index, &args)?;
                    self.push(result)?;
                }
                Opcode::ModuleCall => {
                    let module_idx = read_u16(instructions, ip) as usize;
                    let func_idx = read_u16(instructions, ip + 2) as usize;
                    let argc = read_u8(instructions, ip + 4) as usize;
                    ip += 5;
                    let args = self.pop_n(argc)?;
                    let module = as_name(&constants[module_idx]);
                    let function = as_name(&constants[func_idx]);
                    let result = modules::call(module, function, &args)?;
                    self.push(result)?;
                }
                Opcode::MethodCall => {
                    let name_idx = read_u16(instructions, ip) as usize;
                    let argc = read_u8(instructions, ip + 2) as usize;
                    ip += 3;
                    let args = self.pop_n(argc)?;
                    let receiver = self.pop()?;
                    let method = as_name(&constants[name_idx]);
                    let result = builtins::methods::call(&receiver, method, &args)?;
                    self.push(result)?;
                }

                Opcode::Index => {
                    let index = self.pop()?;
                    let object = self.pop()?;
                    self.push(index_into(&object, &index)?)?;
                }
                Opcode::Member => {
                    let property = self.pop()?;
                    let object = self.pop()?;
                    self.push(member_access(&object, as_name(&property))?)?;
                }
                Opcode::OptionalChaining => {
                    let property = self.pop()?;
                    let object = self.pop()?;
                    let result = match object {
                        Value::Nil => Value::Nil,
                        other => member_access(&other, as_name(&property))?,
                    };
                    self.push(result)?;
                }
                Opcode::NullCoalescing => {
                    let right = self.pop()?;
                    let left = self.pop()?;
                    self.push(if left == Value::Nil { right } else { left })?;
                }

                Opcode::Array => {
                    let count = read_u8(instructions, ip) as usize;
                    ip += 1;
                    let items = self.pop_n(count)?;
                    self.push(Value::slice(items))?;
                }
                Opcode::Slice => {
                    let count = read_u16(instructions, ip) as usize;
                    ip += 2;
                    let items = self.pop_n(count)?;
                    self.push(Value::slice(items))?;
                }
                Opcode::Object => {
                    let count = read_u8(instructions, ip) as usize;
                    ip += 1;
                    let map = self.build_map(count)?;
                    self.push(map)?;
                }
                Opcode::Map => {
                    let count = read_u16(instructions, ip) as usize;
                    ip += 2;
                    let map = self.build_map(count)?;
                    self.push(map)?;
                }

                Opcode::Pipe => {
                    let function = self.pop()?;
                    let data = self.pop()?;
                    let previous = self.pipeline_element.replace(data.clone());
                    let result = self.eval_pipe(&data, function);
                    self.pipeline_element = previous;
                    self.push(result?)?;
                }
                Opcode::GetPipelineElement => {
                    self.push(self.pipeline_element.clone().unwrap_or(Value::Nil))?;
                }
                Opcode::Concat => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.push(Value::string(format!("{a}{b}")))?;
                }

                Opcode::Jump => {
                    let target = read_u16(instructions, ip) as usize;
                    ip = target;
                }
                Opcode::JumpTrue => {
                    let target = read_u16(instructions, ip) as usize;
                    ip += 2;
                    if self.stack.last().is_some_and(Value::truthy) {
                        ip = target;
                    }
                }
                Opcode::JumpFalse => {
                    let target = read_u16(instructions, ip) as usize;
                    ip += 2;
                    if self.stack.last().is_some_and(|v| !v.truthy()) {
                        ip = target;
                    }
                }
                Opcode::Halt => {
                    return self.pop();
                }

                Opcode::ArrayDestructure => {
                    let count = read_u16(instructions, ip) as usize;
                    let start = read_u16(instructions, ip + 2) as usize;
                    ip += 4;
                    let value = self.pop()?;
                    let items: Rc<Vec<Value>> = match &value {
                        Value::Slice(items, _) => items.clone(),
                        other => return Err(RuntimeError::type_error("destructure", "slice", other.type_name())),
                    };
                    for i in 0..count {
                        set_global(globals, start + i, items.get(i).cloned().unwrap_or(Value::Nil));
                    }
                    self.push(value)?;
                }
                Opcode::ObjectDestructure => {
                    let count = read_u16(instructions, ip) as usize;
                    let start = read_u16(instructions, ip + 2) as usize;
                    ip += 4;
                    let keys = self.pop_n(count)?;
                    let value = self.pop()?;
                    let map = match &value {
                        Value::Map(m) => m.clone(),
                        other => return Err(RuntimeError::type_error("destructure", "map", other.type_name())),
                    };
                    for (i, key) in keys.iter().enumerate() {
                        let v = map.get(as_name(key)).cloned().unwrap_or(Value::Nil);
                        set_global(globals, start + i, v);
                    }
                    self.push(value)?;
                }

                Opcode::MakeClosure => {
                    let const_idx = read_u16(instructions, ip) as usize;
                    let free_count = read_u8(instructions, ip + 2) as usize;
                    ip += 3;
                    let captured_values = self.pop_n(free_count)?;
                    let template = match &constants[const_idx] {
                        Value::Func(f) => f.clone(),
                        other => return Err(RuntimeError::type_error("closure", "func template", other.type_name())),
                    };
                    let free_names = &template.body.variables[template.params.len()..];
                    let captured: Vec<(String, Value)> = free_names
                        .iter()
                        .cloned()
                        .zip(captured_values)
                        .collect();
                    self.push(Value::Func(Rc::new(FuncValue {
                        name: template.name.clone(),
                        params: template.params.clone(),
                        body: template.body.clone(),
                        captured: Rc::new(captured),
                    })))?;
                }
            }
        }
    }

    /// Pops `count` key/value pairs (key pushed as a `Constant` string
    /// immediately before its value, per `OpMap`/`OpObject`'s compiled
    /// layout) and builds a `Value::Map` restoring original key order.
    fn build_map(&mut self, count: usize) -> Result<Value, RuntimeError> {
        let flat = self.pop_n(count * 2)?;
        let mut pairs = Vec::with_capacity(count);
        for pair in flat.chunks_exact(2) {
            pairs.push((as_name(&pair[0]).to_string(), pair[1].clone()));
        }
        Ok(Value::map(pairs))
    }

    fn binary(&mut self, f: impl Fn(&Value, &Value) -> Result<Value, RuntimeError>) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(f(&a, &b)?)
    }

    /// Same as `binary`, but asserts (debug builds only) that both
    /// operands match the opcode's advertised specialization before
    /// falling through to the shared arithmetic helper — the type-aware
    /// opcode only changes what the disassembler shows, not the runtime
    /// math, so a wrong static guess still computes the right answer.
    fn specialized_binary(
        &mut self,
        f: impl Fn(&Value, &Value) -> Result<Value, RuntimeError>,
        expect: impl Fn(&Value) -> bool,
    ) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        debug_assert!(expect(&a) && expect(&b), "specialized opcode operand type mismatch");
        self.push(f(&a, &b)?)
    }

    fn compare(&mut self, accept: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let ord = a.partial_cmp_value(&b)?;
        self.push(Value::Bool(ord.is_some_and(&accept)))
    }

    /// Invokes any callable `Value` — a compiled closure, a builtin
    /// referenced by name (the pipe's bare-builtin sugar, ), or
    /// a `PipelineOp` used outside the pipe operator. Used by `OpCall`,
    /// `OpPipe`, and the `filter`/`map`/`reduce` builtins, which need to
    /// invoke a lambda argument mid-builtin-call.
    fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Func(f) => {
                if args.len() != f.params.len() {
                    return Err(RuntimeError::arity_error(
                        f.name.as_deref().unwrap_or("<lambda>"),
                        f.params.len().to_string(),
                        args.len(),
                    ));
                }
                let mut frame_globals = vec![Value::Nil; f.body.variables.len()];
                for (i, a) in args.into_iter().enumerate() {
                    frame_globals[i] = a;
                }
                for (i, (_, v)) in f.captured.iter().enumerate() {
                    frame_globals[f.params.len() + i] = v.clone();
                }
                self.run_frame(&f.body.instructions, &f.body.constants, &mut frame_globals)
            }
            Value::String(name) => {
                let idx = builtins::index_of(&name).ok_or_else(|| RuntimeError::UnknownBuiltin(name.to_string()))?;
                self.dispatch_builtin(idx, &args)
            }
            Value::PipelineOp(op) => {
                let data = args.into_iter().next().ok_or(RuntimeError::NotCallable)?;
                self.eval_pipeline_op(&op, &data)
            }
            _ => Err(RuntimeError::NotCallable),
        }
    }

    /// Routes `filter`/`map`/`reduce` to the VM (they take a callable
    /// second argument and must invoke it per element) and everything
    /// else straight to the free-function builtin table.
    fn dispatch_builtin(&mut self, index: u16, args: &[Value]) -> Result<Value, RuntimeError> {
        let name = builtins::by_index(index).map(|(e, _)| e.name).unwrap_or("");
        match name {
            "filter" if args.len() == 2 => self.higher_order_filter(&args[0], args[1].clone()),
            "map" if args.len() == 2 => self.higher_order_map(&args[0], args[1].clone()),
            "reduce" if (2..=3).contains(&args.len()) => self.higher_order_reduce(args),
            "all" if args.len() == 2 => self.higher_order_quantifier(&args[0], args[1].clone(), true),
            "any" if args.len() == 2 => self.higher_order_quantifier(&args[0], args[1].clone(), false),
            _ => builtins::call(index, args),
        }
    }

    fn slice_items(&self, v: &Value, fname: &str) -> Result<Rc<Vec<Value>>, RuntimeError> {
        match v {
            Value::Slice(items, _) => Ok(items.clone()),
            other => Err(RuntimeError::type_error(fname, "slice", other.type_name())),
        }
    }

    fn higher_order_filter(&mut self, data: &Value, pred: Value) -> Result<Value, RuntimeError> {
        let items = self.slice_items(data, "filter")?;
        let mut out = Vec::new();
        for el in items.iter() {
            if self.call_value(pred.clone(), vec![el.clone()])?.truthy() {
                out.push(el.clone());
            }
        }
        Ok(Value::slice(out))
    }

    fn higher_order_map(&mut self, data: &Value, f: Value) -> Result<Value, RuntimeError> {
        let items = self.slice_items(data, "map")?;
        let mut out = Vec::with_capacity(items.len());
        for el in items.iter() {
            out.push(self.call_value(f.clone(), vec![el.clone()])?);
        }
        Ok(Value::slice(out))
    }

    /// Shared implementation of the direct-call `all(slice, pred)` /
    /// `any(slice, pred)` builtins — `require_all` picks which quantifier.
    fn higher_order_quantifier(&mut self, data: &Value, pred: Value, require_all: bool) -> Result<Value, RuntimeError> {
        let name = if require_all { "all" } else { "any" };
        let items = self.slice_items(data, name)?;
        for el in items.iter() {
            let truthy = self.call_value(pred.clone(), vec![el.clone()])?.truthy();
            if require_all && !truthy {
                return Ok(Value::Bool(false));
            }
            if !require_all && truthy {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(require_all))
    }

    fn higher_order_reduce(&mut self, args: &[Value]) -> Result<Value, RuntimeError> {
        let items = self.slice_items(&args[0], "reduce")?;
        let f = args[1].clone();
        let mut iter = items.iter();
        let mut acc = match args.get(2) {
            Some(init) => init.clone(),
            None => iter
                .next()
                .cloned()
                .ok_or_else(|| RuntimeError::custom("reduce", "empty slice with no initial value"))?,
        };
        for el in iter {
            acc = self.call_value(f.clone(), vec![acc, el.clone()])?;
        }
        Ok(acc)
    }

    /// `OpPipe`'s right-hand side, already reduced to a `Value` by the
    /// time the VM sees it: a bare builtin/closure applies to
    /// the whole piped value once; a `PipelineOp` follows the dispatch
    /// rules worked out in `eval_pipeline_op`. `|` is shared with
    /// bitwise-or at parse time (see `parser::looks_like_pipeline_target`),
    /// so a non-callable right-hand side — e.g. two int-valued identifiers,
    /// `permissions | mask` — falls back to `value_bitor` instead of
    /// erroring as "not callable".
    fn eval_pipe(&mut self, data: &Value, function: Value) -> Result<Value, RuntimeError> {
        match function {
            Value::PipelineOp(op) => self.eval_pipeline_op(&op, data),
            Value::Func(_) | Value::String(_) => self.call_value(function, vec![data.clone()]),
            other => value_bitor(data, &other),
        }
    }

    /// Per-shape pipeline dispatch: `MemberAccess` and the named-function
    /// forms operate on the whole piped value once; `filter`/`map`/`all`/
    /// `any` iterate element-wise.
    fn eval_pipeline_op(&mut self, op: &PipelineOp, data: &Value) -> Result<Value, RuntimeError> {
        match op {
            PipelineOp::MemberAccess { property } => member_access(data, property),
            PipelineOp::TypeMethod { function, method, .. } => {
                self.iterate_dispatch(function, data, |_vm, el| builtins::methods::call(el, method, &[]))
            }
            PipelineOp::ComplexTypeMethod { function, program, .. } => {
                self.iterate_dispatch(function, data, |vm, el| {
                    let mut globals = vec![el.clone()];
                    vm.run_frame(&program.instructions, &program.constants, &mut globals)
                })
            }
            PipelineOp::SimplePlaceholder { function, args } => {
                if matches!(function.as_str(), "filter" | "map" | "all" | "any") {
                    let expr = args
                        .first()
                        .ok_or_else(|| RuntimeError::custom(function, "missing pipeline expression"))?;
                    self.iterate_dispatch(function, data, |vm, el| vm.eval_pipeline_node(expr, el))
                } else {
                    let mut evaluated = Vec::with_capacity(args.len());
                    for a in args {
                        evaluated.push(self.eval_pipeline_node(a, data)?);
                    }
                    let idx = builtins::index_of(function)
                        .ok_or_else(|| RuntimeError::UnknownBuiltin(function.clone()))?;
                    self.dispatch_builtin(idx, &evaluated)
                }
            }
            PipelineOp::Expression(node) => self.eval_pipeline_node(node, data),
        }
    }

    /// Shared element-wise loop for the pipeline shapes that iterate a
    /// slice: `filter` keeps elements the predicate accepts, `map`
    /// collects the transformed elements, `all`/`any` short-circuit to a
    /// `Bool`. Any other function name (the `is_bare_builtin` sugar path,
    /// or a `f(#.method())` whose `f` isn't one of these four) is not
    /// reached here — `eval_pipeline_op` calls the named builtin once
    /// against the whole value instead.
    fn iterate_dispatch(
        &mut self,
        function: &str,
        data: &Value,
        mut compute: impl FnMut(&mut Self, &Value) -> Result<Value, RuntimeError>,
    ) -> Result<Value, RuntimeError> {
        let items = self.slice_items(data, function)?;
        match function {
            "filter" => {
                let mut out = Vec::new();
                for el in items.iter() {
                    if compute(self, el)?.truthy() {
                        out.push(el.clone());
                    }
                }
                Ok(Value::slice(out))
            }
            "all" => {
                for el in items.iter() {
                    if !compute(self, el)?.truthy() {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "any" => {
                for el in items.iter() {
                    if compute(self, el)?.truthy() {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            _ => {
                let mut out = Vec::with_capacity(items.len());
                for el in items.iter() {
                    out.push(compute(self, el)?);
                }
                Ok(Value::slice(out))
            }
        }
    }

    fn eval_pipeline_node(&mut self, node: &PipelineNode, element: &Value) -> Result<Value, RuntimeError> {
        match node {
            PipelineNode::Placeholder => Ok(element.clone()),
            PipelineNode::Constant(v) => Ok((**v).clone()),
            PipelineNode::Infix { op, left, right } => {
                let l = self.eval_pipeline_node(left, element)?;
                let r = self.eval_pipeline_node(right, element)?;
                apply_infix_str(op, &l, &r)
            }
            PipelineNode::Prefix { op, operand } => {
                let v = self.eval_pipeline_node(operand, element)?;
                apply_prefix_str(op, &v)
            }
            PipelineNode::Member { object, property } => {
                let obj = self.eval_pipeline_node(object, element)?;
                member_access(&obj, property)
            }
            PipelineNode::MethodCall { object, method, args } => {
                let obj = self.eval_pipeline_node(object, element)?;
                let mut evaluated = Vec::with_capacity(args.len());
                for a in args {
                    evaluated.push(self.eval_pipeline_node(a, element)?);
                }
                builtins::methods::call(&obj, method, &evaluated)
            }
        }
    }
}

fn set_global(globals: &mut Vec<Value>, idx: usize, v: Value) {
    if idx >= globals.len() {
        globals.resize(idx + 1, Value::Nil);
    }
    globals[idx] = v;
}

fn as_name(v: &Value) -> &str {
    match v {
        Value::String(s) => s.as_ref(),
        _ => "",
    }
}

fn member_access(object: &Value, property: &str) -> Result<Value, RuntimeError> {
    match object {
        Value::Map(m) => Ok(m.get(property).cloned().unwrap_or(Value::Nil)),
        Value::String(s) if property == "length" => Ok(Value::Int(s.chars().count() as i64)),
        Value::Slice(items, _) if property == "length" => Ok(Value::Int(items.len() as i64)),
        other => Err(RuntimeError::type_error("member access", "map, string, or slice", other.type_name())),
    }
}

fn index_into(object: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (object, index) {
        (Value::Slice(items, _), Value::Int(i)) => {
            let len = items.len() as i64;
            let pos = if *i < 0 { i + len } else { *i };
            if pos < 0 || pos >= len {
                return Err(RuntimeError::IndexOutOfRange {
                    index: *i,
                    length: items.len(),
                });
            }
            Ok(items[pos as usize].clone())
        }
        (Value::String(s), Value::Int(i)) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let pos = if *i < 0 { i + len } else { *i };
            if pos < 0 || pos >= len {
                return Err(RuntimeError::IndexOutOfRange {
                    index: *i,
                    length: chars.len(),
                });
            }
            Ok(Value::string(chars[pos as usize].to_string()))
        }
        (Value::Map(m), Value::String(k)) => Ok(m.get(k.as_ref()).cloned().unwrap_or(Value::Nil)),
        (obj, idx) => Err(RuntimeError::type_error("index", "slice[int], string[int], or map[string]", &format!(
            "{}[{}]",
            obj.type_name(),
            idx.type_name()
        ))),
    }
}

fn value_add(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_add(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x + y)),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f64 + y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x + *y as f64)),
        (Value::String(x), Value::String(y)) => Ok(Value::string(format!("{x}{y}"))),
        (a, b) => Err(RuntimeError::type_error("+", "numbers or strings", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_sub(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_sub(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x - y)),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f64 - y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x - *y as f64)),
        (a, b) => Err(RuntimeError::type_error("-", "numbers", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_mul(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_mul(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x * y)),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f64 * y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x * *y as f64)),
        (a, b) => Err(RuntimeError::type_error("*", "numbers", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_div(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::DivisionByZero),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_div(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x / y)),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f64 / y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x / *y as f64)),
        (a, b) => Err(RuntimeError::type_error("/", "numbers", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_mod(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => Err(RuntimeError::ModuloByZero),
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_rem(*y))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x % y)),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(*x as f64 % y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x % *y as f64)),
        (a, b) => Err(RuntimeError::type_error("%", "numbers", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_neg(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Int(x) => Ok(Value::Int(x.wrapping_neg())),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(RuntimeError::type_error("-", "number", other.type_name())),
    }
}

fn value_bitand(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x & y)),
        (a, b) => Err(RuntimeError::type_error("&", "ints", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_bitor(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x | y)),
        (a, b) => Err(RuntimeError::type_error("|", "ints", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_bitxor(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x ^ y)),
        (a, b) => Err(RuntimeError::type_error("^", "ints", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_shl(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_shl(y.rem_euclid(64) as u32))),
        (a, b) => Err(RuntimeError::type_error("<<", "ints", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_shr(a: &Value, b: &Value) -> Result<Value, RuntimeError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_shr(y.rem_euclid(64) as u32))),
        (a, b) => Err(RuntimeError::type_error(">>", "ints", &format!("{}, {}", a.type_name(), b.type_name()))),
    }
}

fn value_bitnot(v: &Value) -> Result<Value, RuntimeError> {
    match v {
        Value::Int(x) => Ok(Value::Int(!x)),
        other => Err(RuntimeError::type_error("~", "int", other.type_name())),
    }
}

/// Evaluates an infix operator by its source spelling — used inside
/// `PipelineNode::Infix`, which stores the operator as a string rather
/// than the compiler's `InfixOp` enum, since `PipelineNode` is built from
/// a placeholder expression at compile time and kept deliberately small.
fn apply_infix_str(op: &str, l: &Value, r: &Value) -> Result<Value, RuntimeError> {
    match op {
        "+" => value_add(l, r),
        "-" => value_sub(l, r),
        "*" => value_mul(l, r),
        "/" => value_div(l, r),
        "%" => value_mod(l, r),
        "**" => match (l, r) {
            (Value::Int(base), Value::Int(exp)) if *exp >= 0 => Ok(Value::Int(base.wrapping_pow(*exp as u32))),
            (a, b) => builtins::math::pow(&[a.clone(), b.clone()]),
        },
        "==" => Ok(Value::Bool(l == r)),
        "!=" => Ok(Value::Bool(l != r)),
        "<" => Ok(Value::Bool(l.partial_cmp_value(r)?.is_some_and(|o| o.is_lt()))),
        "<=" => Ok(Value::Bool(l.partial_cmp_value(r)?.is_some_and(|o| o.is_le()))),
        ">" => Ok(Value::Bool(l.partial_cmp_value(r)?.is_some_and(|o| o.is_gt()))),
        ">=" => Ok(Value::Bool(l.partial_cmp_value(r)?.is_some_and(|o| o.is_ge()))),
        "&&" => Ok(Value::Bool(l.truthy() && r.truthy())),
        "||" => Ok(Value::Bool(l.truthy() || r.truthy())),
        "&" => value_bitand(l, r),
        "|" => value_bitor(l, r),
        "^" => value_bitxor(l, r),
        "<<" => value_shl(l, r),
        ">>" => value_shr(l, r),
        other => Err(RuntimeError::custom(other, "unknown pipeline operator")),
    }
}

fn apply_prefix_str(op: &str, v: &Value) -> Result<Value, RuntimeError> {
    match op {
        "-" => value_neg(v),
        "!" => Ok(Value::Bool(!v.truthy())),
        "~" => value_bitnot(v),
        other => Err(RuntimeError::custom(other, "unknown pipeline prefix operator")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use crate::parser::parse;

    fn run_src(src: &str, env_names: &[&str], env_values: &[Value]) -> Value {
        let node = parse(src).unwrap();
        let names: Vec<String> = env_names.iter().map(|s| s.to_string()).collect();
        let program = crate::compiler::compile(&node, &names, CompileOptions::default()).unwrap();
        let mut vm = Vm::new(crate::config::DEFAULT_STACK_SIZE);
        vm.run(&program, env_values, crate::config::DEFAULT_GLOBALS_SIZE).unwrap()
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run_src("2 + 3 * 4", &[], &[]), Value::Int(14));
    }

    #[test]
    fn string_concatenation_builtin_conversion() {
        assert_eq!(
            run_src("\"Alice\" + \" is \" + string(30)", &[], &[]),
            Value::string("Alice is 30")
        );
    }

    #[test]
    fn ternary_conditional() {
        assert_eq!(run_src("5 > 3 ? \"yes\" : \"no\"", &[], &[]), Value::string("yes"));
    }

    #[test]
    fn lambda_closure_over_outer_variable() {
        let result = run_src("(x) => x + captured", &["captured"], &[Value::Int(10)]);
        assert!(matches!(result, Value::Func(_)));
    }

    #[test]
    fn calling_a_closure_with_captured_state() {
        // A block binds the lambda, then calls it — exercises MakeClosure
        // followed by a real OpCall against the resulting Func value.
        let result = run_src("f = (x) => x + captured; f(5)", &["captured"], &[Value::Int(10)]);
        assert_eq!(result, Value::Int(15));
    }

    #[test]
    fn destructuring_assignment_binds_and_yields_sum() {
        assert_eq!(run_src("[a, b] = [10, 20]; a + b", &[], &[]), Value::Int(30));
    }

    #[test]
    fn pipeline_member_access() {
        let user = Value::map(vec![("name".into(), Value::string("Ann"))]);
        assert_eq!(run_src("user | #.name", &["user"], &[user]), Value::string("Ann"));
    }

    #[test]
    fn pipeline_filter_then_map_over_placeholder_lambdas() {
        let users = Value::slice(vec![
            Value::map(vec![("name".into(), Value::string("Ann")), ("age".into(), Value::Int(30))]),
            Value::map(vec![("name".into(), Value::string("Bo")), ("age".into(), Value::Int(12))]),
        ]);
        let result = run_src(
            "users | filter(u => u.age >= 18) | map(u => u.name)",
            &["users"],
            &[users],
        );
        assert_eq!(result, Value::slice(vec![Value::string("Ann")]));
    }

    #[test]
    fn pipe_between_int_identifiers_falls_back_to_bitwise_or() {
        // `permissions | mask` parses as `Pipe` (a bare identifier looks
        // like a pipeline target at parse time), but both operands are
        // plain ints at runtime — `eval_pipe` falls back to bitwise-or
        // rather than erroring as "not callable".
        let result = run_src(
            "permissions | mask",
            &["permissions", "mask"],
            &[Value::Int(5), Value::Int(2)],
        );
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn direct_filter_call_without_pipe() {
        let nums = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let result = run_src("filter(nums, n => n % 2 == 0)", &["nums"], &[nums]);
        assert_eq!(result, Value::slice(vec![Value::Int(2), Value::Int(4)]));
    }

    #[test]
    fn reduce_sums_with_initial_value() {
        let nums = Value::slice(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let result = run_src("reduce(nums, (acc, n) => acc + n, 0)", &["nums"], &[nums]);
        assert_eq!(result, Value::Int(6));
    }

    #[test]
    fn nil_coalescing_and_optional_chaining() {
        assert_eq!(run_src("nil ?? 5", &[], &[]), Value::Int(5));
        assert_eq!(run_src("user?.name", &["user"], &[Value::Nil]), Value::Nil);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let node = parse("1 / x").unwrap();
        let program = crate::compiler::compile(&node, &["x".to_string()], CompileOptions::default()).unwrap();
        let mut vm = Vm::new(crate::config::DEFAULT_STACK_SIZE);
        let err = vm
            .run(&program, &[Value::Int(0)], crate::config::DEFAULT_GLOBALS_SIZE)
            .unwrap_err();
        assert_eq!(err, RuntimeError::DivisionByZero);
    }

    #[test]
    fn stack_overflow_is_reported_not_panicked() {
        let node = parse("1 + 2").unwrap();
        let program = crate::compiler::compile(&node, &[], CompileOptions::default()).unwrap();
        let mut vm = Vm::new(0);
        let err = vm.run(&program, &[], crate::config::DEFAULT_GLOBALS_SIZE).unwrap_err();
        assert_eq!(err, RuntimeError::StackOverflow);
    }

    #[test]
    fn method_call_syntax_invokes_type_method() {
        assert_eq!(run_src("\"hello\".upper()", &[], &[]), Value::string("HELLO"));
    }
}
