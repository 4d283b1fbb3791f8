// ABOUTME: Error types for every stage of the engine pipeline

use thiserror::Error;

/// A source position, in (line, column), both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A single lexical error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{position}: {message}")]
pub struct LexError {
    pub message: String,
    pub position: Position,
}

/// A single parse error. The parser collects as many of these as it can
/// before giving up, rather than stopping at the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{position}: {message}")]
pub struct ParseErrorEntry {
    pub message: String,
    pub position: Position,
}

/// The aggregate failure returned by `parse` — one or more collected
/// `ParseErrorEntry` diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub Vec<ParseErrorEntry>);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} parse error(s): ", self.0.len())?;
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Failures that occur while turning an AST into bytecode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    #[error("{position}: unknown identifier '{name}'")]
    UnknownIdentifier { name: String, position: Position },

    #[error("{position}: unknown builtin '{name}'")]
    UnknownBuiltin { name: String, position: Position },

    #[error("{position}: {function} expected {expected} argument{}, got {actual}", if *.expected == "1" { "" } else { "s" })]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
        position: Position,
    },

    #[error("{position}: expected type {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        position: Position,
    },

    #[error("{position}: placeholder '#' used outside of a pipeline argument")]
    PlaceholderOutsidePipeline { position: Position },

    #[error("program exceeds the constant pool or globals ceiling: {0}")]
    CapacityExceeded(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl CompileError {
    pub fn unknown_identifier(name: impl Into<String>, position: Position) -> Self {
        CompileError::UnknownIdentifier {
            name: name.into(),
            position,
        }
    }

    pub fn unknown_builtin(name: impl Into<String>, position: Position) -> Self {
        CompileError::UnknownBuiltin {
            name: name.into(),
            position,
        }
    }

    pub fn arity_mismatch(
        function: impl Into<String>,
        expected: impl Into<String>,
        actual: usize,
        position: Position,
    ) -> Self {
        CompileError::ArityMismatch {
            function: function.into(),
            expected: expected.into(),
            actual,
            position,
        }
    }
}

/// Failures raised by the VM while executing a compiled program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("{function}: expected {expected}, got {actual}")]
    TypeMismatch {
        function: String,
        expected: String,
        actual: String,
    },

    #[error("{function}: expected {expected} argument{}, got {actual}", if *.expected == "1" { "" } else { "s" })]
    ArityMismatch {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("unknown builtin '{0}'")]
    UnknownBuiltin(String),

    #[error("unknown opcode byte {0:#04x}")]
    UnknownOpcode(u8),

    #[error("value is not callable")]
    NotCallable,

    #[error("stack overflow")]
    StackOverflow,

    #[error("stack underflow")]
    StackUnderflow,

    #[error("globals index {0} out of range")]
    GlobalsOutOfRange(usize),

    #[error("evaluation timed out")]
    Timeout,

    #[error("{function}: {message}")]
    Custom { function: String, message: String },
}

impl RuntimeError {
    pub fn type_error(function: &str, expected: &str, actual: &str) -> Self {
        RuntimeError::TypeMismatch {
            function: function.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn arity_error(function: &str, expected: impl Into<String>, actual: usize) -> Self {
        RuntimeError::ArityMismatch {
            function: function.to_string(),
            expected: expected.into(),
            actual,
        }
    }

    pub fn custom(function: &str, message: impl Into<String>) -> Self {
        RuntimeError::Custom {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

/// The top-level error returned by the engine facade — whichever stage
/// failed first.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("conversion error: {0}")]
    Conversion(String),
}
