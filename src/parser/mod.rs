//! Module parser
//!
//! A recursive descent parser with precedence climbing for binary
//! operators. It produces a [`Program`] from a stream of tokens.

use crate::ast::*;
use crate::error::{messages, Error, Result, SourceLocation};
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use std::rc::Rc;

/// Deepest expression tree the parser builds; evaluation recurses once per level
pub const MAX_NESTING_DEPTH: usize = 200;

/// A recursive descent parser for module source
pub struct Parser<'src> {
    /// Source code (kept for error snippets)
    source: &'src str,
    /// Tokens to parse
    tokens: Vec<Token<'src>>,
    /// Current position in tokens
    pos: usize,
    /// Expression levels open around the current token
    depth: usize,
}

impl<'src> Parser<'src> {
    /// Tokenize `source` up front; lexer failures surface here
    pub fn new(source: &'src str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let tokens = lexer.tokenize()?;
        Ok(Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        })
    }

    /// Parse the source as a complete module
    pub fn parse_program(&mut self) -> Result<Program> {
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_assignment()?);
        }
        Ok(Program { body })
    }

    /// Parse a single expression, requiring the input to end after it
    pub fn parse_standalone_expression(&mut self) -> Result<Expr> {
        let expr = self.parse_expression()?;
        if !self.is_eof() {
            let loc = self.location();
            return Err(self.error(
                format!("Unexpected token '{}' after expression", self.current().text),
                loc,
            ));
        }
        Ok(expr)
    }

    fn current(&self) -> &Token<'src> {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn is_eof(&self) -> bool {
        self.peek() == TokenKind::Eof
    }

    fn location(&self) -> SourceLocation {
        self.current().location
    }

    fn error(&self, message: impl Into<String>, location: SourceLocation) -> Error {
        Error::parse_error(message, location, self.source)
    }

    fn unexpected(&self, expected: &str) -> Error {
        let token = self.current();
        let message = if token.kind == TokenKind::Eof {
            format!("{}, expected {}", messages::UNEXPECTED_END, expected)
        } else {
            format!("Unexpected token '{}', expected {}", token.text, expected)
        };
        self.error(message, token.location)
    }

    fn advance(&mut self) -> &Token<'src> {
        let token = &self.tokens[self.pos];
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<&Token<'src>> {
        if self.peek() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.peek() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Open one expression level, failing past [`MAX_NESTING_DEPTH`]
    fn enter(&mut self) -> Result<()> {
        if self.depth >= MAX_NESTING_DEPTH {
            let loc = self.location();
            return Err(self.error(messages::NESTED_TOO_DEEPLY, loc));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_identifier(&mut self) -> Result<String> {
        Ok(self
            .expect(TokenKind::Identifier, "identifier")?
            .text
            .to_string())
    }

    fn parse_assignment(&mut self) -> Result<Assignment> {
        let location = self.location();
        let mut target = vec![self.parse_identifier()?];
        while self.consume(TokenKind::Dot) {
            target.push(self.parse_identifier()?);
        }
        self.expect(TokenKind::Equals, "'='")?;

        let name = target.last().cloned().unwrap_or_default();
        let value = self.parse_value(&name)?;
        Ok(Assignment {
            target,
            value,
            location,
        })
    }

    /// Parse the right-hand side of `name = ...`, naming function literals
    fn parse_value(&mut self, name: &str) -> Result<Expr> {
        if self.peek() == TokenKind::Keyword(Keyword::Fn) {
            return self.parse_function(Some(name.to_string()));
        }
        self.parse_expression()
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.enter()?;
        let expr = match self.peek() {
            TokenKind::Keyword(Keyword::Fn) => self.parse_function(None),
            TokenKind::Keyword(Keyword::If) => self.parse_if(),
            _ => self.parse_binary(1),
        };
        self.depth -= 1;
        expr
    }

    fn parse_function(&mut self, name: Option<String>) -> Result<Expr> {
        let location = self.location();
        self.advance(); // fn
        self.expect(TokenKind::LeftParen, "'(' after 'fn'")?;

        let mut params = Vec::new();
        while !self.consume(TokenKind::RightParen) {
            let param_loc = self.location();
            let param = self.parse_identifier()?;
            if params.contains(&param) {
                return Err(self.error(format!("Duplicate parameter '{}'", param), param_loc));
            }
            params.push(param);
            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightParen, "',' or ')'")?;
                break;
            }
        }

        self.expect(TokenKind::Arrow, "'=>'")?;
        let body = self.parse_expression()?;
        Ok(Expr::Function(Rc::new(FunctionDef {
            name,
            params,
            body,
            location,
        })))
    }

    fn parse_if(&mut self) -> Result<Expr> {
        self.advance(); // if
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Keyword(Keyword::Then), "'then'")?;
        let then_branch = self.parse_expression()?;
        self.expect(TokenKind::Keyword(Keyword::Else), "'else'")?;
        let else_branch = self.parse_expression()?;
        Ok(Expr::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn binary_precedence(&self) -> u8 {
        match self.peek() {
            TokenKind::Keyword(Keyword::Or) => 1,
            TokenKind::Keyword(Keyword::And) => 2,
            TokenKind::EqualsEquals | TokenKind::BangEquals => 3,
            TokenKind::Less
            | TokenKind::Greater
            | TokenKind::LessEquals
            | TokenKind::GreaterEquals => 4,
            TokenKind::Plus | TokenKind::Minus => 5,
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => 6,
            _ => 0,
        }
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        // each operator in a chain wraps `left` one level deeper
        let outer = self.depth;

        loop {
            let prec = self.binary_precedence();
            if prec == 0 || prec < min_prec {
                break;
            }
            self.enter()?;

            let location = self.location();
            let kind = self.advance().kind;
            let right = self.parse_binary(prec + 1)?;

            left = match kind {
                TokenKind::Keyword(Keyword::And) => Expr::Logical {
                    operator: LogicalOperator::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                TokenKind::Keyword(Keyword::Or) => Expr::Logical {
                    operator: LogicalOperator::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                _ => Expr::Binary {
                    operator: binary_operator(kind),
                    left: Box::new(left),
                    right: Box::new(right),
                    location,
                },
            };
        }

        self.depth = outer;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let location = self.location();
        let operator = match self.peek() {
            TokenKind::Minus => UnaryOperator::Negate,
            TokenKind::Keyword(Keyword::Not) => UnaryOperator::Not,
            _ => return self.parse_postfix(),
        };
        self.enter()?;
        self.advance();
        let operand = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary {
            operator,
            operand: Box::new(operand?),
            location,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        let outer = self.depth;

        loop {
            let location = self.location();
            if matches!(self.peek(), TokenKind::Dot | TokenKind::LeftParen | TokenKind::Colon) {
                self.enter()?;
            }
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_identifier()?;
                    expr = Expr::Field {
                        object: Box::new(expr),
                        name,
                        location,
                    };
                }
                TokenKind::LeftParen => {
                    self.advance();
                    let args = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                        location,
                    };
                }
                TokenKind::Colon => {
                    self.advance();
                    let name = self.parse_identifier()?;
                    self.expect(TokenKind::LeftParen, "'(' after method name")?;
                    let args = self.parse_arguments()?;
                    expr = Expr::MethodCall {
                        object: Box::new(expr),
                        name,
                        args,
                        location,
                    };
                }
                _ => break,
            }
        }

        self.depth = outer;
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        while !self.consume(TokenKind::RightParen) {
            args.push(self.parse_expression()?);
            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightParen, "',' or ')'")?;
                break;
            }
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let location = self.location();

        match self.peek() {
            TokenKind::NumberLiteral => {
                let text = self.advance().text;
                let value = parse_number_value(text)
                    .ok_or_else(|| self.error(format!("Invalid number: {}", text), location))?;
                Ok(Expr::Number(value))
            }
            TokenKind::StringLiteral => {
                let text = self.advance().text;
                Ok(Expr::String(parse_string_value(text)))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Expr::Boolean(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Expr::Boolean(false))
            }
            TokenKind::Keyword(Keyword::Nil) => {
                self.advance();
                Ok(Expr::Nil)
            }
            TokenKind::Identifier => {
                let name = self.parse_identifier()?;
                let ident = Expr::Identifier { name, location };
                if self.peek() == TokenKind::LeftBrace {
                    return self.parse_table(Some(ident));
                }
                Ok(ident)
            }
            TokenKind::LeftBrace => self.parse_table(None),
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(expr)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_table(&mut self, shape: Option<Expr>) -> Result<Expr> {
        let location = self.location();
        self.expect(TokenKind::LeftBrace, "'{'")?;

        let mut fields: Vec<(String, Expr)> = Vec::new();
        while !self.consume(TokenKind::RightBrace) {
            let key_loc = self.location();
            let key = self.parse_identifier()?;
            if fields.iter().any(|(k, _)| *k == key) {
                return Err(self.error(format!("Duplicate field '{}'", key), key_loc));
            }
            self.expect(TokenKind::Equals, "'=' after field name")?;
            let value = self.parse_value(&key)?;
            fields.push((key, value));
            if !self.consume(TokenKind::Comma) {
                self.expect(TokenKind::RightBrace, "',' or '}'")?;
                break;
            }
        }

        Ok(Expr::Table {
            shape: shape.map(Box::new),
            fields,
            location,
        })
    }
}

fn binary_operator(kind: TokenKind) -> BinaryOperator {
    match kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Minus => BinaryOperator::Sub,
        TokenKind::Star => BinaryOperator::Mul,
        TokenKind::Slash => BinaryOperator::Div,
        TokenKind::Percent => BinaryOperator::Rem,
        TokenKind::EqualsEquals => BinaryOperator::Eq,
        TokenKind::BangEquals => BinaryOperator::NotEq,
        TokenKind::Less => BinaryOperator::Less,
        TokenKind::LessEquals => BinaryOperator::LessEq,
        TokenKind::Greater => BinaryOperator::Greater,
        _ => BinaryOperator::GreaterEq,
    }
}

fn parse_number_value(text: &str) -> Option<f64> {
    let clean: String = text.chars().filter(|&c| c != '_').collect();
    if let Some(hex) = clean.strip_prefix("0x").or_else(|| clean.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok().map(|n| n as f64)
    } else {
        clean.parse::<f64>().ok()
    }
}

fn parse_string_value(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('0') => result.push('\0'),
            Some(other) => result.push(other),
            None => {}
        }
    }

    result
}

/// Parse module source into an AST
pub fn parse(source: &str) -> Result<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parse source holding exactly one expression
pub fn parse_expression(source: &str) -> Result<Expr> {
    let mut parser = Parser::new(source)?;
    parser.parse_standalone_expression()
}
