// ABOUTME: AST node variants produced by the parser and consumed by the compiler

use crate::error::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl InfixOp {
    pub fn as_str(self) -> &'static str {
        match self {
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::Pow => "**",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::Lt => "<",
            InfixOp::LtEq => "<=",
            InfixOp::Gt => ">",
            InfixOp::GtEq => ">=",
            InfixOp::And => "&&",
            InfixOp::Or => "||",
            InfixOp::BitAnd => "&",
            InfixOp::BitOr => "|",
            InfixOp::BitXor => "^",
            InfixOp::Shl => "<<",
            InfixOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Neg,
    Not,
    BitNot,
}

impl PrefixOp {
    pub fn as_str(self) -> &'static str {
        match self {
            PrefixOp::Neg => "-",
            PrefixOp::Not => "!",
            PrefixOp::BitNot => "~",
        }
    }
}

/// A destructuring pattern — array, object, rest, or plain identifier.
/// The compiler only ever emits flat, single-level
/// `OpArrayDestructure`/`OpObjectDestructure`, so nested
/// array/object sub-patterns are parsed but rejected at compile time with
/// a clear `CompileError` rather than silently flattened — see DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Identifier(String),
    Array(Vec<Pattern>),
    Object(Vec<(String, Pattern)>),
    Rest(Box<Pattern>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Nil,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Literal(Literal),
    Identifier(String),
    /// The bare `#` placeholder token ("parsed as a distinct
    /// node"; validity is decided by the compiler).
    Placeholder,
    Prefix {
        op: PrefixOp,
        operand: Box<Node>,
    },
    Infix {
        op: InfixOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    Index {
        object: Box<Node>,
        index: Box<Node>,
    },
    Member {
        object: Box<Node>,
        property: String,
    },
    OptionalChain {
        object: Box<Node>,
        property: String,
    },
    NullCoalesce {
        left: Box<Node>,
        right: Box<Node>,
    },
    Conditional {
        test: Box<Node>,
        consequent: Box<Node>,
        alternative: Box<Node>,
    },
    ArrayLiteral(Vec<Node>),
    MapLiteral(Vec<(String, Node)>),
    Lambda {
        params: Vec<String>,
        body: Box<Node>,
    },
    Pipe {
        data: Box<Node>,
        func: Box<Node>,
    },
    Import {
        module: String,
    },
    ModuleCall {
        module: String,
        function: String,
        args: Vec<Node>,
    },
    Destructure {
        pattern: Pattern,
        value: Box<Node>,
    },
    /// A `;`-separated sequence of statements; the last one's value is the
    /// expression's result (e.g. `[a, b] = [10, 20]; a + b`).
    Block(Vec<Node>),
}

/// Every node carries its source position. Subexpressions are
/// owned exclusively by their parent — no shared subtrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub position: Position,
}

impl Node {
    pub fn new(kind: NodeKind, position: Position) -> Self {
        Self { kind, position }
    }

    /// Walks the tree to decide whether this expression contains a `#`
    /// placeholder anywhere beneath it, used to decide whether a call
    /// compiles as a plain call or as a pipeline-function marker.
    pub fn has_placeholder(&self) -> bool {
        match &self.kind {
            NodeKind::Placeholder => true,
            NodeKind::Literal(_) | NodeKind::Identifier(_) | NodeKind::Import { .. } => false,
            NodeKind::Prefix { operand, .. } => operand.has_placeholder(),
            NodeKind::Infix { left, right, .. } => {
                left.has_placeholder() || right.has_placeholder()
            }
            NodeKind::Call { callee, args } => {
                callee.has_placeholder() || args.iter().any(Node::has_placeholder)
            }
            NodeKind::Index { object, index } => {
                object.has_placeholder() || index.has_placeholder()
            }
            NodeKind::Member { object, .. } | NodeKind::OptionalChain { object, .. } => {
                object.has_placeholder()
            }
            NodeKind::NullCoalesce { left, right } => {
                left.has_placeholder() || right.has_placeholder()
            }
            NodeKind::Conditional {
                test,
                consequent,
                alternative,
            } => {
                test.has_placeholder()
                    || consequent.has_placeholder()
                    || alternative.has_placeholder()
            }
            NodeKind::ArrayLiteral(items) => items.iter().any(Node::has_placeholder),
            NodeKind::MapLiteral(entries) => entries.iter().any(|(_, v)| v.has_placeholder()),
            NodeKind::Lambda { .. } => false,
            NodeKind::Pipe { data, func } => data.has_placeholder() || func.has_placeholder(),
            NodeKind::ModuleCall { args, .. } => args.iter().any(Node::has_placeholder),
            NodeKind::Destructure { value, .. } => value.has_placeholder(),
            NodeKind::Block(stmts) => stmts.iter().any(Node::has_placeholder),
        }
    }
}
