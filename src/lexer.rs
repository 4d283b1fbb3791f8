// ABOUTME: Source text to token stream

use crate::error::{LexError, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    String(String),
    Ident(String),
    True,
    False,
    Null,

    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semicolon,

    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    Percent,

    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,

    AndAnd,
    OrOr,
    Bang,

    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    Eq,
    FatArrow,

    Question,
    QuestionQuestion,
    QuestionDot,
    Dot,

    Hash,

    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: Position,
}

pub struct Lexer<'a> {
    chars: Vec<char>,
    src: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            src,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.offset).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.offset + ahead).copied()
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    /// Tokenizes the whole input eagerly rather than lazily. The parser
    /// only ever looks ahead a bounded number of tokens, so an eager
    /// `Vec` (cheap at these input sizes) keeps the parser's lookahead
    /// trivial without an explicit streaming iterator contract.
    /// `next_token` below is still the unit that produces one token at a
    /// time.
    pub fn tokenize(src: &'a str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Self::new(src);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        let position = self.position();

        let Some(c) = self.peek() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };

        if c.is_ascii_digit() || (c == '.' && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit())) {
            return self.lex_number(position);
        }
        if c == '"' || c == '\'' {
            return self.lex_string(position, c);
        }
        if c.is_alphabetic() || c == '_' {
            return self.lex_ident(position);
        }

        self.lex_operator(position)
    }

    fn lex_number(&mut self, position: Position) -> Result<Token, LexError> {
        let start = self.offset;
        let mut is_float = false;

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        if self.peek() == Some('.') && matches!(self.peek_at(1), Some(d) if d.is_ascii_digit()) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.offset;
            let mut tentative = self.offset + 1;
            if matches!(self.chars.get(tentative), Some('+') | Some('-')) {
                tentative += 1;
            }
            if matches!(self.chars.get(tentative), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                while self.offset < tentative {
                    self.bump();
                }
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.offset = save;
            }
        }

        let text: String = self.chars[start..self.offset].iter().collect();
        if is_float {
            let value: f64 = text.parse().map_err(|_| LexError {
                message: format!("invalid float literal '{text}'"),
                position,
            })?;
            Ok(Token {
                kind: TokenKind::Float(value),
                position,
            })
        } else {
            let value: i64 = text.parse().map_err(|_| LexError {
                message: format!("invalid int literal '{text}'"),
                position,
            })?;
            Ok(Token {
                kind: TokenKind::Int(value),
                position,
            })
        }
    }

    fn lex_string(&mut self, position: Position, quote: char) -> Result<Token, LexError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(LexError {
                        message: "unterminated string literal".into(),
                        position,
                    })
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('\\') => value.push('\\'),
                    Some(c) if c == quote => value.push(quote),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => {
                        return Err(LexError {
                            message: "unterminated escape sequence".into(),
                            position,
                        })
                    }
                },
                Some(c) => value.push(c),
            }
        }
        Ok(Token {
            kind: TokenKind::String(value),
            position,
        })
    }

    fn lex_ident(&mut self, position: Position) -> Result<Token, LexError> {
        let start = self.offset;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        let text: String = self.chars[start..self.offset].iter().collect();
        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" | "nil" => TokenKind::Null,
            _ => TokenKind::Ident(text),
        };
        Ok(Token { kind, position })
    }

    fn lex_operator(&mut self, position: Position) -> Result<Token, LexError> {
        let c = self.bump().expect("checked by caller");
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            ';' => TokenKind::Semicolon,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                }
            }
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::FatArrow
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::LtEq
                } else if self.peek() == Some('<') {
                    self.bump();
                    TokenKind::Shl
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::GtEq
                } else if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::Shr
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            // The pipe operator and bitwise-or share `|`; a single `|` not
            // followed by another `|` is the pipe, distinguished from
            // bitwise-or only by the parser's precedence context.
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '?' => {
                if self.peek() == Some('?') {
                    self.bump();
                    TokenKind::QuestionQuestion
                } else if self.peek() == Some('.') {
                    self.bump();
                    TokenKind::QuestionDot
                } else {
                    TokenKind::Question
                }
            }
            '.' => TokenKind::Dot,
            '#' => TokenKind::Hash,
            other => {
                return Err(LexError {
                    message: format!("unexpected character '{other}'"),
                    position,
                })
            }
        };
        let _ = self.src;
        Ok(Token { kind, position })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(
            kinds("42 3.14 1e3"),
            vec![
                TokenKind::Int(42),
                TokenKind::Float(3.14),
                TokenKind::Float(1000.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_strings_with_escapes() {
        assert_eq!(
            kinds(r#""a\nb" 'c\'d'"#),
            vec![
                TokenKind::String("a\nb".into()),
                TokenKind::String("c'd".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn distinguishes_pipe_from_or() {
        assert_eq!(
            kinds("a | b || c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Pipe,
                TokenKind::Ident("b".into()),
                TokenKind::OrOr,
                TokenKind::Ident("c".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn lexes_modern_operators() {
        assert_eq!(
            kinds("a?.b ?? c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::QuestionDot,
                TokenKind::Ident("b".into()),
                TokenKind::QuestionQuestion,
                TokenKind::Ident("c".into()),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn reports_position_on_error() {
        let err = Lexer::tokenize("1 + @").unwrap_err();
        assert_eq!(err.position, Position::new(1, 5));
    }

    #[test]
    fn keywords_true_false_null() {
        assert_eq!(
            kinds("true false null nil"),
            vec![
                TokenKind::True,
                TokenKind::False,
                TokenKind::Null,
                TokenKind::Null,
                TokenKind::Eof
            ]
        );
    }
}
