// ABOUTME: Token stream to AST — a hand-rolled Pratt-style precedence parser

use crate::ast::{InfixOp, Literal, Node, NodeKind, Pattern, PrefixOp};
use crate::error::{ParseError, ParseErrorEntry, Position};
use crate::lexer::{Lexer, Token, TokenKind};

/// Parses a full program. A `;`-separated sequence compiles to a single
/// `NodeKind::Block`; a lone expression comes back unwrapped.
pub fn parse(src: &str) -> Result<Node, ParseError> {
    let tokens = Lexer::tokenize(src).map_err(|e| ParseError(vec![ParseErrorEntry {
        message: e.message,
        position: e.position,
    }]))?;
    let mut parser = Parser::new(tokens);
    let node = parser.parse_program();
    if parser.errors.is_empty() {
        Ok(node)
    } else {
        Err(ParseError(parser.errors))
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseErrorEntry>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        let idx = (self.pos + ahead).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn position(&self) -> Position {
        self.current().position
    }

    fn is(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(ParseErrorEntry {
            message: message.into(),
            position: self.position(),
        });
    }

    fn expect(&mut self, kind: TokenKind) -> Token {
        if self.is(&kind) {
            self.advance()
        } else {
            self.error(format!("expected {kind:?}, found {:?}", self.current().kind));
            self.advance()
        }
    }

    fn expect_ident(&mut self) -> String {
        match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                name
            }
            other => {
                self.error(format!("expected identifier, found {other:?}"));
                self.advance();
                String::new()
            }
        }
    }

    // ---- program / statements -------------------------------------------------

    fn parse_program(&mut self) -> Node {
        let start = self.position();
        let mut statements = vec![self.parse_statement()];
        while self.is(&TokenKind::Semicolon) {
            self.advance();
            if self.is(&TokenKind::Eof) {
                break;
            }
            statements.push(self.parse_statement());
        }
        if statements.len() == 1 {
            statements.pop().unwrap()
        } else {
            Node::new(NodeKind::Block(statements), start)
        }
    }

    fn parse_statement(&mut self) -> Node {
        let start = self.position();

        if let TokenKind::Ident(name) = &self.current().kind {
            if name == "import" && matches!(self.peek_at(1).kind, TokenKind::String(_)) {
                self.advance();
                let module = match self.advance().kind {
                    TokenKind::String(s) => s,
                    _ => unreachable!(),
                };
                return Node::new(NodeKind::Import { module }, start);
            }
        }

        if matches!(self.current().kind, TokenKind::LBracket | TokenKind::LBrace) {
            if let Some(node) = self.try_parse_destructure(start) {
                return node;
            }
        }

        self.parse_expression()
    }

    /// Looks ahead for `<pattern> = <expr>`, restoring position if the
    /// bracketed construct turns out to be an ordinary array/map literal.
    fn try_parse_destructure(&mut self, start: Position) -> Option<Node> {
        let save = self.pos;
        let pattern = self.try_parse_pattern()?;
        if !self.is(&TokenKind::Eq) {
            self.pos = save;
            return None;
        }
        self.advance();
        let value = self.parse_expression();
        Some(Node::new(
            NodeKind::Destructure {
                pattern,
                value: Box::new(value),
            },
            start,
        ))
    }

    fn try_parse_pattern(&mut self) -> Option<Pattern> {
        match self.current().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Some(Pattern::Identifier(name))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = Vec::new();
                while !self.is(&TokenKind::RBracket) {
                    if self.is(&TokenKind::Eof) {
                        return None;
                    }
                    if matches!(self.current().kind, TokenKind::Comma) {
                        // sparse hole, e.g. `[a, , b]`; not modeled, bail out
                        return None;
                    }
                    // rest element: `...name`, lexed as three `Dot` tokens
                    if matches!(self.current().kind, TokenKind::Dot)
                        && matches!(self.peek_at(1).kind, TokenKind::Dot)
                        && matches!(self.peek_at(2).kind, TokenKind::Dot)
                    {
                        self.advance();
                        self.advance();
                        self.advance();
                        let inner = self.try_parse_pattern()?;
                        items.push(Pattern::Rest(Box::new(inner)));
                    } else {
                        items.push(self.try_parse_pattern()?);
                    }
                    if self.is(&TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                if !self.is(&TokenKind::RBracket) {
                    return None;
                }
                self.advance();
                Some(Pattern::Array(items))
            }
            TokenKind::LBrace => {
                self.advance();
                let mut entries = Vec::new();
                while !self.is(&TokenKind::RBrace) {
                    if self.is(&TokenKind::Eof) {
                        return None;
                    }
                    let key = match self.current().kind.clone() {
                        TokenKind::Ident(n) => {
                            self.advance();
                            n
                        }
                        _ => return None,
                    };
                    let sub = if self.is(&TokenKind::Colon) {
                        self.advance();
                        self.try_parse_pattern()?
                    } else {
                        Pattern::Identifier(key.clone())
                    };
                    entries.push((key, sub));
                    if self.is(&TokenKind::Comma) {
                        self.advance();
                    } else {
                        break;
                    }
                }
                if !self.is(&TokenKind::RBrace) {
                    return None;
                }
                self.advance();
                Some(Pattern::Object(entries))
            }
            _ => None,
        }
    }

    // ---- expressions, loosest to tightest -------------------------------------

    fn parse_expression(&mut self) -> Node {
        self.parse_pipe()
    }

    /// `|` is shared between the pipeline operator (loosest in the
    /// precedence table) and bitwise-or (bound tighter, between `&&` and
    /// `^` — see `parse_bitor`). Every `|` still seen here, after
    /// `parse_conditional`'s descent through `parse_bitor` has had a
    /// chance to claim the ones that are structurally bitwise-or, is a
    /// pipe. See DESIGN.md.
    fn parse_pipe(&mut self) -> Node {
        let mut left = self.parse_conditional();
        while self.is(&TokenKind::Pipe) {
            let pos = self.position();
            self.advance();
            let right = self.parse_conditional();
            left = Node::new(
                NodeKind::Pipe {
                    data: Box::new(left),
                    func: Box::new(right),
                },
                pos,
            );
        }
        left
    }

    fn looks_like_pipeline_target(node: &Node) -> bool {
        match &node.kind {
            NodeKind::Call { .. }
            | NodeKind::Lambda { .. }
            | NodeKind::Member { .. }
            | NodeKind::Identifier(_) => true,
            _ => node.has_placeholder(),
        }
    }

    fn parse_conditional(&mut self) -> Node {
        let start = self.position();
        let test = self.parse_null_coalesce();
        if self.is(&TokenKind::Question) {
            self.advance();
            let consequent = self.parse_expression();
            self.expect(TokenKind::Colon);
            let alternative = self.parse_conditional();
            Node::new(
                NodeKind::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternative: Box::new(alternative),
                },
                start,
            )
        } else {
            test
        }
    }

    fn parse_null_coalesce(&mut self) -> Node {
        let mut left = self.parse_or();
        while self.is(&TokenKind::QuestionQuestion) {
            let pos = self.position();
            self.advance();
            let right = self.parse_or();
            left = Node::new(
                NodeKind::NullCoalesce {
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
        left
    }

    fn parse_or(&mut self) -> Node {
        self.parse_left_assoc_infix(Self::parse_and, &[(TokenKind::OrOr, InfixOp::Or)])
    }

    fn parse_and(&mut self) -> Node {
        self.parse_left_assoc_infix(Self::parse_bitor, &[(TokenKind::AndAnd, InfixOp::And)])
    }

    /// Bitwise-or sits here in the precedence table — tighter than
    /// `&&`/`||`/`??`/the pipe operator, looser than `^`. `|` is shared
    /// with the pipe operator, disambiguated structurally: if the
    /// right-hand side looks like a pipeline target (a call, a lambda, a
    /// member access, or a bare identifier/placeholder expression), this
    /// `|` isn't bitwise-or — back off and leave it for `parse_pipe`, the
    /// loosest level, to consume instead.
    fn parse_bitor(&mut self) -> Node {
        let mut left = self.parse_bitxor();
        while self.is(&TokenKind::Pipe) {
            let save = self.pos;
            let pos = self.position();
            self.advance();
            let right = self.parse_bitxor();
            if Self::looks_like_pipeline_target(&right) {
                self.pos = save;
                break;
            }
            left = Node::new(
                NodeKind::Infix {
                    op: InfixOp::BitOr,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            );
        }
        left
    }

    fn parse_bitxor(&mut self) -> Node {
        self.parse_left_assoc_infix(Self::parse_bitand, &[(TokenKind::Caret, InfixOp::BitXor)])
    }

    fn parse_bitand(&mut self) -> Node {
        self.parse_left_assoc_infix(Self::parse_equality, &[(TokenKind::Amp, InfixOp::BitAnd)])
    }

    fn parse_equality(&mut self) -> Node {
        self.parse_left_assoc_infix(
            Self::parse_comparison,
            &[(TokenKind::EqEq, InfixOp::Eq), (TokenKind::NotEq, InfixOp::NotEq)],
        )
    }

    fn parse_comparison(&mut self) -> Node {
        self.parse_left_assoc_infix(
            Self::parse_shift,
            &[
                (TokenKind::Lt, InfixOp::Lt),
                (TokenKind::LtEq, InfixOp::LtEq),
                (TokenKind::Gt, InfixOp::Gt),
                (TokenKind::GtEq, InfixOp::GtEq),
            ],
        )
    }

    fn parse_shift(&mut self) -> Node {
        self.parse_left_assoc_infix(
            Self::parse_additive,
            &[(TokenKind::Shl, InfixOp::Shl), (TokenKind::Shr, InfixOp::Shr)],
        )
    }

    fn parse_additive(&mut self) -> Node {
        self.parse_left_assoc_infix(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, InfixOp::Add), (TokenKind::Minus, InfixOp::Sub)],
        )
    }

    fn parse_multiplicative(&mut self) -> Node {
        self.parse_left_assoc_infix(
            Self::parse_power,
            &[
                (TokenKind::Star, InfixOp::Mul),
                (TokenKind::Slash, InfixOp::Div),
                (TokenKind::Percent, InfixOp::Mod),
            ],
        )
    }

    /// Right-associative: `2 ** 3 ** 2 == 2 ** (3 ** 2)`.
    fn parse_power(&mut self) -> Node {
        let left = self.parse_unary();
        if self.is(&TokenKind::StarStar) {
            let pos = self.position();
            self.advance();
            let right = self.parse_power();
            Node::new(
                NodeKind::Infix {
                    op: InfixOp::Pow,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                pos,
            )
        } else {
            left
        }
    }

    fn parse_unary(&mut self) -> Node {
        let pos = self.position();
        let op = match self.current().kind {
            TokenKind::Minus => PrefixOp::Neg,
            TokenKind::Bang => PrefixOp::Not,
            TokenKind::Tilde => PrefixOp::BitNot,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary();
        Node::new(
            NodeKind::Prefix {
                op,
                operand: Box::new(operand),
            },
            pos,
        )
    }

    fn parse_left_assoc_infix(
        &mut self,
        next: fn(&mut Self) -> Node,
        ops: &[(TokenKind, InfixOp)],
    ) -> Node {
        let mut left = next(self);
        'outer: loop {
            for (tok, op) in ops {
                if self.is(tok) {
                    let pos = self.position();
                    self.advance();
                    let right = next(self);
                    left = Node::new(
                        NodeKind::Infix {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        pos,
                    );
                    continue 'outer;
                }
            }
            break;
        }
        left
    }

    // ---- postfix chain: call / index / member / optional-chain ---------------

    fn parse_postfix(&mut self) -> Node {
        let mut node = self.parse_primary();
        loop {
            match &self.current().kind {
                TokenKind::LParen => {
                    let pos = self.position();
                    self.advance();
                    let args = self.parse_args(TokenKind::RParen);
                    node = self.finish_call(node, args, pos);
                }
                TokenKind::LBracket => {
                    let pos = self.position();
                    self.advance();
                    let index = self.parse_expression();
                    self.expect(TokenKind::RBracket);
                    node = Node::new(
                        NodeKind::Index {
                            object: Box::new(node),
                            index: Box::new(index),
                        },
                        pos,
                    );
                }
                TokenKind::Dot => {
                    let pos = self.position();
                    self.advance();
                    let property = self.expect_ident();
                    node = Node::new(
                        NodeKind::Member {
                            object: Box::new(node),
                            property,
                        },
                        pos,
                    );
                }
                TokenKind::QuestionDot => {
                    let pos = self.position();
                    self.advance();
                    let property = self.expect_ident();
                    node = Node::new(
                        NodeKind::OptionalChain {
                            object: Box::new(node),
                            property,
                        },
                        pos,
                    );
                }
                _ => break,
            }
        }
        node
    }

    /// Promotes `identifier.identifier(args)` call chains into a dedicated
    /// `ModuleCall` node — the surface form reserved for imported modules,
    /// compiling to `OpModuleCall`; plain calls stay `Call`.
    fn finish_call(&mut self, callee: Node, args: Vec<Node>, pos: Position) -> Node {
        if let NodeKind::Member { object, property } = callee.kind {
            let is_module = matches!(object.kind, NodeKind::Identifier(_));
            if is_module {
                let module = match object.kind {
                    NodeKind::Identifier(name) => name,
                    _ => unreachable!(),
                };
                return Node::new(
                    NodeKind::ModuleCall {
                        module,
                        function: property,
                        args,
                    },
                    pos,
                );
            }
            let callee = Node::new(NodeKind::Member { object, property }, pos);
            return Node::new(
                NodeKind::Call {
                    callee: Box::new(callee),
                    args,
                },
                pos,
            );
        }
        Node::new(
            NodeKind::Call {
                callee: Box::new(callee),
                args,
            },
            pos,
        )
    }

    fn parse_args(&mut self, closing: TokenKind) -> Vec<Node> {
        let mut args = Vec::new();
        while !self.is(&closing) {
            if self.is(&TokenKind::Eof) {
                self.error("unexpected end of input inside argument list");
                break;
            }
            args.push(self.parse_expression());
            if self.is(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(closing);
        args
    }

    // ---- primary ---------------------------------------------------------------

    fn parse_primary(&mut self) -> Node {
        let pos = self.position();
        match self.current().kind.clone() {
            TokenKind::Int(n) => {
                self.advance();
                Node::new(NodeKind::Literal(Literal::Int(n)), pos)
            }
            TokenKind::Float(n) => {
                self.advance();
                Node::new(NodeKind::Literal(Literal::Float(n)), pos)
            }
            TokenKind::String(s) => {
                self.advance();
                Node::new(NodeKind::Literal(Literal::String(s)), pos)
            }
            TokenKind::True => {
                self.advance();
                Node::new(NodeKind::Literal(Literal::Bool(true)), pos)
            }
            TokenKind::False => {
                self.advance();
                Node::new(NodeKind::Literal(Literal::Bool(false)), pos)
            }
            TokenKind::Null => {
                self.advance();
                Node::new(NodeKind::Literal(Literal::Nil), pos)
            }
            TokenKind::Hash => {
                self.advance();
                Node::new(NodeKind::Placeholder, pos)
            }
            TokenKind::Ident(name) => {
                if matches!(self.peek_at(1).kind, TokenKind::FatArrow) {
                    self.advance();
                    self.advance();
                    let body = self.parse_expression();
                    return Node::new(
                        NodeKind::Lambda {
                            params: vec![name],
                            body: Box::new(body),
                        },
                        pos,
                    );
                }
                self.advance();
                Node::new(NodeKind::Identifier(name), pos)
            }
            TokenKind::LParen => {
                if let Some(lambda) = self.try_parse_paren_lambda(pos) {
                    return lambda;
                }
                self.advance();
                let inner = self.parse_expression();
                self.expect(TokenKind::RParen);
                inner
            }
            TokenKind::LBracket => self.parse_array_literal(pos),
            TokenKind::LBrace => self.parse_map_literal(pos),
            other => {
                self.error(format!("unexpected token {other:?}"));
                self.advance();
                Node::new(NodeKind::Literal(Literal::Nil), pos)
            }
        }
    }

    /// `(a, b) => expr`. Looks ahead for a parenthesized identifier list
    /// immediately followed by `=>`; restores position and falls back to a
    /// grouped expression otherwise.
    fn try_parse_paren_lambda(&mut self, pos: Position) -> Option<Node> {
        let save = self.pos;
        self.advance();
        let mut params = Vec::new();
        while let TokenKind::Ident(name) = self.current().kind.clone() {
            params.push(name);
            self.advance();
            if self.is(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        if self.is(&TokenKind::RParen) && matches!(self.peek_at(1).kind, TokenKind::FatArrow) {
            self.advance();
            self.advance();
            let body = self.parse_expression();
            return Some(Node::new(
                NodeKind::Lambda {
                    params,
                    body: Box::new(body),
                },
                pos,
            ));
        }
        self.pos = save;
        None
    }

    fn parse_array_literal(&mut self, pos: Position) -> Node {
        self.advance();
        let mut items = Vec::new();
        while !self.is(&TokenKind::RBracket) {
            if self.is(&TokenKind::Eof) {
                self.error("unexpected end of input inside array literal");
                break;
            }
            items.push(self.parse_expression());
            if self.is(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBracket);
        Node::new(NodeKind::ArrayLiteral(items), pos)
    }

    fn parse_map_literal(&mut self, pos: Position) -> Node {
        self.advance();
        let mut entries = Vec::new();
        while !self.is(&TokenKind::RBrace) {
            if self.is(&TokenKind::Eof) {
                self.error("unexpected end of input inside map literal");
                break;
            }
            let key = match self.current().kind.clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    name
                }
                TokenKind::String(s) => {
                    self.advance();
                    s
                }
                other => {
                    self.error(format!("expected map key, found {other:?}"));
                    self.advance();
                    String::new()
                }
            };
            self.expect(TokenKind::Colon);
            let value = self.parse_expression();
            entries.push((key, value));
            if self.is(&TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(TokenKind::RBrace);
        Node::new(NodeKind::MapLiteral(entries), pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(src: &str) -> Node {
        parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let node = ok("1 + 2 * 3");
        match node.kind {
            NodeKind::Infix { op: InfixOp::Add, right, .. } => {
                assert!(matches!(right.kind, NodeKind::Infix { op: InfixOp::Mul, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let node = ok("2 ** 3 ** 2");
        match node.kind {
            NodeKind::Infix { op: InfixOp::Pow, right, .. } => {
                assert!(matches!(right.kind, NodeKind::Infix { op: InfixOp::Pow, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_identifier_lambda() {
        let node = ok("x => x + 1");
        assert!(matches!(node.kind, NodeKind::Lambda { .. }));
    }

    #[test]
    fn parenthesized_lambda_params() {
        let node = ok("(a, b) => a + b");
        match node.kind {
            NodeKind::Lambda { params, .. } => assert_eq!(params, vec!["a", "b"]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pipe_with_call_target() {
        let node = ok("numbers | filter(# > 2)");
        assert!(matches!(node.kind, NodeKind::Pipe { .. }));
    }

    #[test]
    fn bitwise_or_between_numbers() {
        let node = ok("flags | 1");
        assert!(matches!(
            node.kind,
            NodeKind::Infix { op: InfixOp::BitOr, .. }
        ));
    }

    #[test]
    fn bitwise_or_binds_tighter_than_null_coalescing() {
        // `a ?? b | 2` must parse as `a ?? (b | 2)`, not `(a ?? b) | 2` —
        // bitwise-or sits between `&&` and `^` in the precedence table,
        // well inside `??`.
        let node = ok("a ?? b | 2");
        match node.kind {
            NodeKind::NullCoalesce { right, .. } => {
                assert!(matches!(right.kind, NodeKind::Infix { op: InfixOp::BitOr, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn optional_chain_and_null_coalesce() {
        let node = ok("a?.b ?? c");
        assert!(matches!(node.kind, NodeKind::NullCoalesce { .. }));
    }

    #[test]
    fn conditional_ternary() {
        let node = ok("a > 1 ? \"big\" : \"small\"");
        assert!(matches!(node.kind, NodeKind::Conditional { .. }));
    }

    #[test]
    fn module_call_is_recognized() {
        let node = ok("math.sqrt(4)");
        match node.kind {
            NodeKind::ModuleCall { module, function, args } => {
                assert_eq!(module, "math");
                assert_eq!(function, "sqrt");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn array_destructuring_statement() {
        let node = ok("[a, b] = [10, 20]; a + b");
        match node.kind {
            NodeKind::Block(stmts) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0].kind, NodeKind::Destructure { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plain_array_literal_is_not_mistaken_for_destructure() {
        let node = ok("[1, 2, 3]");
        assert!(matches!(node.kind, NodeKind::ArrayLiteral(_)));
    }

    #[test]
    fn collects_multiple_parse_errors() {
        let err = parse("1 +").unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn import_statement() {
        let node = ok("import \"math\"");
        match node.kind {
            NodeKind::Import { module } => assert_eq!(module, "math"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
