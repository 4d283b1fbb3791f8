// ABOUTME: Tunables and option builders for the engine
// This module contains version info and the fixed ceilings the VM is built around

use std::time::Duration;

#[allow(dead_code)]
pub const VERSION: &str = "1.0.0";

/// Fixed operand-stack ceiling (`STACK_SIZE`). Exceeding it during
/// a run is a `RuntimeError::StackOverflow`, not a resize.
pub const DEFAULT_STACK_SIZE: usize = 2048;

/// Fixed globals-array ceiling (`GLOBALS_SIZE`). Destructuring
/// targets beyond the compiled variable count grow the globals array with
/// `Nil` padding rather than erroring.
pub const DEFAULT_GLOBALS_SIZE: usize = 65536;

/// Default wall-clock budget for a single `Run` call when the caller does
/// not override it.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Small-integer interning range, widened from the conventional
/// `[0, 256)` to `[-512, 512)` to cover common negative offsets too.
pub const INTERN_INT_LOW: i64 = -512;
pub const INTERN_INT_HIGH: i64 = 512;

/// Instruction-cache capacity before LRU eviction kicks in. The `maxSize`
/// parameter is enforced here via a hand-rolled LRU, unlike an unbounded cache.
pub const DEFAULT_INSTRUCTION_CACHE_SIZE: usize = 4096;

/// Options that affect compilation: expected result type checking, custom
/// builtins, precedence overrides, optimization flags, and a max execution
/// time recorded on the compiled `Program` for `Run` to honor by default.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// When set, the compiler checks (best-effort, via static type
    /// inference) that the expression's inferred result type matches.
    pub expected_type: Option<crate::value::TypeKind>,
    /// Disable constant folding — used to compare folded vs. unfolded
    /// results and confirm folding never changes program behavior.
    pub disable_constant_folding: bool,
    /// Disable type-specialized opcode emission; always emit the generic
    /// arithmetic/comparison opcodes.
    pub disable_type_specialization: bool,
    /// Per-program override of the engine's default timeout, recorded
    /// verbatim on the resulting `Program.timeout`.
    pub timeout: Option<std::time::Duration>,
}

/// Options that affect a single `Run`/`Eval` call.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub timeout: Duration,
    pub stack_size: usize,
    pub globals_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            stack_size: DEFAULT_STACK_SIZE,
            globals_size: DEFAULT_GLOBALS_SIZE,
        }
    }
}
