// ABOUTME: Compile/Run/Eval facade — VM pooling, timeout, and the host-value environment adapter

use crate::cache::InstructionCache;
use crate::compiler;
use crate::config::{
    CompileOptions, DEFAULT_GLOBALS_SIZE, DEFAULT_INSTRUCTION_CACHE_SIZE, DEFAULT_STACK_SIZE, DEFAULT_TIMEOUT,
};
use crate::error::{CompileError, EngineError};
use crate::opcode::Program;
use crate::parser;
use crate::value::{TypeKind, Value};
use crate::vm::Vm;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Host → `Value` conversion. Implemented for every signed/unsigned
/// integer width (all widen to `Int`), `f32`/`f64` (widen to `Float`),
/// strings, `Option` (absent → `Nil`), and `Vec`/`HashMap` of anything
/// itself convertible — plus the identity case for `Value`.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
}

macro_rules! int_into_value {
    ($($t:ty),* $(,)?) => {
        $(impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::Int(self as i64)
            }
        })*
    };
}
int_into_value!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Float(self as f64)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::string(self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::string(self.to_string())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Nil,
        }
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn into_value(self) -> Value {
        Value::slice(self.into_iter().map(IntoValue::into_value).collect())
    }
}

impl<T: IntoValue> IntoValue for HashMap<String, T> {
    fn into_value(self) -> Value {
        let mut pairs: Vec<(String, Value)> = self.into_iter().map(|(k, v)| (k, v.into_value())).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Value::map(pairs)
    }
}

/// Structural-conversion escape hatch for host structs that expose a
/// `ToMap()`-equivalent method — a direct, zero-reflection path for host
/// structs. Implement this instead of hand-building a `Value::Map` at
/// every call site.
pub trait ToMap {
    fn to_map(&self) -> Vec<(String, Value)>;
}

/// A host→engine variable binding set: a flat name→value table the host
/// builds up before a `Run`/`Eval` call. Flat and case-sensitive, with no
/// parent chain — the VM's globals array is already flat; scoping is a
/// compiler concept applied to lambda bodies, not a host-facing one.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    bindings: HashMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name` to any host value convertible via `IntoValue`.
    pub fn set(&mut self, name: impl Into<String>, value: impl IntoValue) -> &mut Self {
        self.bindings.insert(name.into(), value.into_value());
        self
    }

    /// Binds `name` to a host struct via its `ToMap` conversion — a
    /// zero-reflection path for types that can't implement `IntoValue`
    /// directly without an orphan-rule conflict.
    pub fn set_struct(&mut self, name: impl Into<String>, value: &impl ToMap) -> &mut Self {
        self.bindings.insert(name.into(), Value::map(value.to_map()));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    /// Positional binding vector matching `program.variables`' alphabetical
    /// order; `Nil` for any declared variable this
    /// environment never set.
    fn bind_positional(&self, program: &Program) -> Vec<Value> {
        program
            .variables
            .iter()
            .map(|name| self.bindings.get(name).cloned().unwrap_or(Value::Nil))
            .collect()
    }
}

/// Tunables for an `Engine` instance: VM ceilings, default
/// timeout, and whether the optional instruction cache is
/// built at all — it is pure observability, so an engine that doesn't
/// care about hit-count telemetry can skip the allocation and locking
/// entirely.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub stack_size: usize,
    pub globals_size: usize,
    pub default_timeout: Duration,
    pub enable_instruction_cache: bool,
    pub instruction_cache_size: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            globals_size: DEFAULT_GLOBALS_SIZE,
            default_timeout: DEFAULT_TIMEOUT,
            enable_instruction_cache: false,
            instruction_cache_size: DEFAULT_INSTRUCTION_CACHE_SIZE,
        }
    }
}

/// A timeout this long or longer is treated as "no timeout" and skips
/// spinning up the cooperative-cancellation timer thread — a hot loop
/// evaluating hundreds of thousands of times a second shouldn't pay a
/// thread spawn per call when the caller plainly isn't relying on the
/// deadline.
const UNBOUNDED_TIMEOUT_THRESHOLD: Duration = Duration::from_secs(3600);

/// Diagnostic variant of `Run`'s return value (`RunWithResult`): the
/// value, its `TypeKind`, and wall-clock execution time.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub value: Value,
    pub type_kind: TypeKind,
    pub execution_time: Duration,
}

/// The engine facade: `Compile`/`Run`/`Eval`/`RunWithResult`.
/// Owns the pieces that are safe to share across threads — the optional
/// instruction cache and a pool of reusable operand-stack buffers — while
/// every `Run` builds its own `Vm`, which is not thread-safe and is
/// exclusively owned by the executing thread for the duration of a run.
pub struct Engine {
    options: EngineOptions,
    cache: Option<InstructionCache>,
    stack_pool: Mutex<Vec<Vec<Value>>>,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let cache = options
            .enable_instruction_cache
            .then(|| InstructionCache::new(options.instruction_cache_size));
        Self {
            options,
            cache,
            stack_pool: Mutex::new(Vec::new()),
        }
    }

    /// `Compile(source, options) -> Program | CompileError`.
    /// `env`'s binding names (not its values) seed the compiler's globals
    /// order — destructuring targets get appended past this prefix.
    pub fn compile(&self, source: &str, env: &Environment, options: CompileOptions) -> Result<Program, EngineError> {
        let node = parser::parse(source).map_err(CompileError::from)?;
        let mut names = env.names();
        names.sort();
        let program = compiler::compile(&node, &names, options)?;
        Ok(program)
    }

    /// `Run(program, env) -> Value | RuntimeError`: acquires a
    /// pooled stack buffer, binds `env` positionally, runs, and returns
    /// the buffer to the pool.
    pub fn run(&self, program: &Program, env: &Environment) -> Result<Value, EngineError> {
        self.run_timed(program, env).map(|r| r.value)
    }

    /// `Eval(source, env) -> Value | Error` — the convenience composition.
    pub fn eval(&self, source: &str, env: &Environment) -> Result<Value, EngineError> {
        let program = self.compile(source, env, CompileOptions::default())?;
        self.run(&program, env)
    }

    /// `RunWithResult(program, env) -> {value, type, executionTime} | Error`.
    pub fn run_with_result(&self, program: &Program, env: &Environment) -> Result<RunResult, EngineError> {
        self.run_timed(program, env)
    }

    fn acquire_stack(&self) -> Vec<Value> {
        self.stack_pool
            .lock()
            .expect("vm stack pool mutex poisoned")
            .pop()
            .unwrap_or_default()
    }

    fn release_stack(&self, mut stack: Vec<Value>) {
        stack.clear();
        let mut pool = self.stack_pool.lock().expect("vm stack pool mutex poisoned");
        const MAX_POOLED_STACKS: usize = 64;
        if pool.len() < MAX_POOLED_STACKS {
            pool.push(stack);
        }
    }

    fn run_timed(&self, program: &Program, env: &Environment) -> Result<RunResult, EngineError> {
        let bindings = env.bind_positional(program);
        let timeout = program.timeout.unwrap_or(self.options.default_timeout);

        let cancel = Arc::new(AtomicBool::new(false));
        let timer = spawn_timeout_timer(timeout, Arc::clone(&cancel));

        let started = Instant::now();
        let mut vm = Vm::new_with_stack(self.options.stack_size, self.acquire_stack()).with_cancel(&cancel);
        if let Some(cache) = &self.cache {
            vm = vm.with_cache(cache);
        }
        let result = vm.run(program, &bindings, self.options.globals_size);
        let execution_time = started.elapsed();
        self.release_stack(vm.into_stack());

        if let Some(TimeoutTimer { stop, handle }) = timer {
            stop.store(true, Ordering::Relaxed);
            let _ = handle.join();
        }

        let value = result?;
        let type_kind = value.type_kind();
        Ok(RunResult {
            value,
            type_kind,
            execution_time,
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineOptions::default())
    }
}

struct TimeoutTimer {
    stop: Arc<AtomicBool>,
    handle: std::thread::JoinHandle<()>,
}

/// Spawns the background cooperative-cancellation timer: sleeps in short
/// slices so it notices both the deadline and an early `stop` request
/// (set once the run finishes on its own), then flips `cancel` — the
/// VM's main loop polls that flag once per instruction
/// (`Vm::check_cancelled`) rather than being forcibly interrupted.
fn spawn_timeout_timer(timeout: Duration, cancel: Arc<AtomicBool>) -> Option<TimeoutTimer> {
    if timeout >= UNBOUNDED_TIMEOUT_THRESHOLD {
        return None;
    }
    let stop = Arc::new(AtomicBool::new(false));
    let timer_stop = Arc::clone(&stop);
    let handle = std::thread::Builder::new()
        .name("exprlang-timeout".into())
        .spawn(move || {
            let deadline = Instant::now() + timeout;
            let poll_interval = Duration::from_millis(5).min(timeout.max(Duration::from_millis(1)));
            while Instant::now() < deadline {
                if timer_stop.load(Ordering::Relaxed) {
                    return;
                }
                std::thread::sleep(poll_interval);
            }
            if !timer_stop.load(Ordering::Relaxed) {
                cancel.store(true, Ordering::Relaxed);
            }
        })
        .ok()?;
    Some(TimeoutTimer { stop, handle })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_composes_compile_and_run() {
        let engine = Engine::default();
        let env = Environment::new();
        assert_eq!(engine.eval("2 + 3 * 4", &env).unwrap(), Value::Int(14));
    }

    #[test]
    fn environment_binds_primitives_by_name() {
        let engine = Engine::default();
        let mut env = Environment::new();
        env.set("a", 10i64).set("b", 20i64);
        assert_eq!(engine.eval("a + b", &env).unwrap(), Value::Int(30));
    }

    #[test]
    fn environment_binds_vec_and_option() {
        let engine = Engine::default();
        let mut env = Environment::new();
        env.set("xs", vec![1i64, 2, 3]).set("maybe", Some(5i64));
        assert_eq!(engine.eval("len(xs) + maybe", &env).unwrap(), Value::Int(8));
    }

    #[test]
    fn destructuring_target_absent_from_env_resolves_to_nil() {
        let engine = Engine::default();
        let env = Environment::new();
        // `y` is introduced by the destructuring pattern itself, never by
        // the (empty) environment, and the source array is one short — it
        // must still resolve to `Nil` rather than a binding error.
        let result = engine.eval("[x, y] = [1]; y ?? 7", &env).unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[test]
    fn unknown_identifier_is_a_compile_error() {
        let engine = Engine::default();
        let env = Environment::new();
        let err = engine.eval("totally_unbound", &env).unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn run_with_result_reports_type_and_elapsed_time() {
        let engine = Engine::default();
        let env = Environment::new();
        let program = engine.compile("1 + 1", &env, CompileOptions::default()).unwrap();
        let result = engine.run_with_result(&program, &env).unwrap();
        assert_eq!(result.value, Value::Int(2));
        assert_eq!(result.type_kind, TypeKind::Int);
    }

    #[test]
    fn compile_error_surfaces_as_engine_error() {
        let engine = Engine::default();
        let env = Environment::new();
        let err = engine.eval("1 +", &env).unwrap_err();
        assert!(matches!(err, EngineError::Compile(_)));
    }

    #[test]
    fn runtime_error_surfaces_as_engine_error() {
        let engine = Engine::default();
        let mut env = Environment::new();
        env.set("x", 0i64);
        let err = engine.eval("1 / x", &env).unwrap_err();
        assert!(matches!(err, EngineError::Runtime(_)));
    }

    #[test]
    fn vm_reuse_across_runs_is_independent() {
        let engine = Engine::default();
        let mut env = Environment::new();
        env.set("a", 1i64);
        let program = engine.compile("a * 2", &env, CompileOptions::default()).unwrap();
        assert_eq!(engine.run(&program, &env).unwrap(), Value::Int(2));
        env.set("a", 9i64);
        assert_eq!(engine.run(&program, &env).unwrap(), Value::Int(18));
    }

    #[test]
    fn instruction_cache_can_be_enabled() {
        let engine = Engine::new(EngineOptions {
            enable_instruction_cache: true,
            ..EngineOptions::default()
        });
        let env = Environment::new();
        engine.eval("1 + 1", &env).unwrap();
        assert!(engine.cache.as_ref().unwrap().len() > 0);
    }

    struct User {
        name: String,
        age: i64,
    }

    impl ToMap for User {
        fn to_map(&self) -> Vec<(String, Value)> {
            vec![
                ("name".to_string(), Value::string(self.name.clone())),
                ("age".to_string(), Value::Int(self.age)),
            ]
        }
    }

    #[test]
    fn host_struct_binds_via_to_map() {
        let engine = Engine::default();
        let mut env = Environment::new();
        env.set_struct("user", &User { name: "Ann".to_string(), age: 30 });
        assert_eq!(engine.eval("user.name", &env).unwrap(), Value::string("Ann"));
    }
}
