//! Module source lexer
//!
//! Turns module source text into a flat token stream. Comments start with
//! `#` or `//` and run to the end of the line.

mod token;

pub use token::{Keyword, Token, TokenKind};

use crate::error::{messages, Error, Result, SourceLocation};

/// Single-pass lexer over one module file
pub struct Lexer<'src> {
    source: &'src str,
    /// Byte offset of the next unread char
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    fn error(&self, message: impl Into<String>, location: SourceLocation) -> Error {
        Error::lex_error(message, location, self.source)
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(c) = self.peek() {
                if c.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            match (self.peek(), self.peek_next()) {
                (Some('#'), _) | (Some('/'), Some('/')) => self.skip_line(),
                _ => break,
            }
        }
    }

    fn is_id_start(c: char) -> bool {
        c == '_' || unicode_xid::UnicodeXID::is_xid_start(c)
    }

    fn is_id_continue(c: char) -> bool {
        c == '_' || unicode_xid::UnicodeXID::is_xid_continue(c)
    }

    fn token(&self, kind: TokenKind, start: usize, location: SourceLocation) -> Token<'src> {
        Token {
            kind,
            text: &self.source[start..self.pos],
            location,
        }
    }

    fn scan_identifier(&mut self) -> Token<'src> {
        let start = self.pos;
        let start_loc = self.location();

        while let Some(c) = self.peek() {
            if Self::is_id_continue(c) {
                self.advance();
            } else {
                break;
            }
        }

        let text = &self.source[start..self.pos];
        let kind = match Keyword::from_text(text) {
            Some(keyword) => TokenKind::Keyword(keyword),
            None => TokenKind::Identifier,
        };
        self.token(kind, start, start_loc)
    }

    fn scan_digits(&mut self, accept: fn(char) -> bool) {
        while let Some(c) = self.peek() {
            if accept(c) || c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn scan_number(&mut self) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();

        if self.peek() == Some('0') && matches!(self.peek_next(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            self.scan_digits(|c| c.is_ascii_hexdigit());
            if self.pos - start == 2 {
                return Err(self.error("Invalid hexadecimal literal", start_loc));
            }
            return Ok(self.token(TokenKind::NumberLiteral, start, start_loc));
        }

        self.scan_digits(|c| c.is_ascii_digit());

        if self.peek() == Some('.') && self.peek_next().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
            self.scan_digits(|c| c.is_ascii_digit());
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
                return Err(self.error("Invalid number: missing exponent digits", start_loc));
            }
            self.scan_digits(|c| c.is_ascii_digit());
        }

        if self.peek().is_some_and(Self::is_id_start) {
            let loc = self.location();
            return Err(self.error("Identifier starts immediately after numeric literal", loc));
        }

        Ok(self.token(TokenKind::NumberLiteral, start, start_loc))
    }

    fn scan_string(&mut self, quote: char) -> Result<Token<'src>> {
        let start = self.pos;
        let start_loc = self.location();
        self.advance();

        loop {
            match self.peek() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error(messages::UNTERMINATED_STRING, start_loc));
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                _ => {
                    self.advance();
                }
            }
        }

        Ok(self.token(TokenKind::StringLiteral, start, start_loc))
    }

    /// Scan the next token
    pub fn next_token(&mut self) -> Result<Token<'src>> {
        self.skip_whitespace_and_comments();

        let start = self.pos;
        let start_loc = self.location();
        let Some(c) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, start, start_loc));
        };

        if Self::is_id_start(c) {
            return Ok(self.scan_identifier());
        }
        if c.is_ascii_digit() {
            return self.scan_number();
        }
        if c == '"' || c == '\'' {
            return self.scan_string(c);
        }

        self.advance();
        let next = self.peek();
        let kind = match (c, next) {
            ('=', Some('=')) => {
                self.advance();
                TokenKind::EqualsEquals
            }
            ('=', Some('>')) => {
                self.advance();
                TokenKind::Arrow
            }
            ('!', Some('=')) => {
                self.advance();
                TokenKind::BangEquals
            }
            ('<', Some('=')) => {
                self.advance();
                TokenKind::LessEquals
            }
            ('>', Some('=')) => {
                self.advance();
                TokenKind::GreaterEquals
            }
            ('=', _) => TokenKind::Equals,
            ('<', _) => TokenKind::Less,
            ('>', _) => TokenKind::Greater,
            ('(', _) => TokenKind::LeftParen,
            (')', _) => TokenKind::RightParen,
            ('{', _) => TokenKind::LeftBrace,
            ('}', _) => TokenKind::RightBrace,
            ('.', _) => TokenKind::Dot,
            (',', _) => TokenKind::Comma,
            (':', _) => TokenKind::Colon,
            ('+', _) => TokenKind::Plus,
            ('-', _) => TokenKind::Minus,
            ('*', _) => TokenKind::Star,
            ('/', _) => TokenKind::Slash,
            ('%', _) => TokenKind::Percent,
            _ => return Err(self.error(format!("Unexpected character '{}'", c), start_loc)),
        };

        Ok(self.token(kind, start, start_loc))
    }

    /// Tokenize the whole source, ending with an `Eof` token
    pub fn tokenize(&mut self) -> Result<Vec<Token<'src>>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_assignment_tokens() {
        assert_eq!(
            kinds("value = 1"),
            vec![
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::NumberLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_function_tokens() {
        assert_eq!(
            kinds("f = fn(x) => x >= 2"),
            vec![
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::Keyword(Keyword::Fn),
                TokenKind::LeftParen,
                TokenKind::Identifier,
                TokenKind::RightParen,
                TokenKind::Arrow,
                TokenKind::Identifier,
                TokenKind::GreaterEquals,
                TokenKind::NumberLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("# header\na = 1 // trailing\n"),
            vec![
                TokenKind::Identifier,
                TokenKind::Equals,
                TokenKind::NumberLiteral,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_locations() {
        let tokens = Lexer::new("a = 1\n  bb = 2").tokenize().unwrap();
        assert_eq!(tokens[3].text, "bb");
        assert_eq!(tokens[3].location.line, 2);
        assert_eq!(tokens[3].location.column, 3);
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("s = \"abc").tokenize().unwrap_err();
        assert!(err.is_syntax_error());
        assert!(err.to_string().contains("Unterminated string literal"));
    }

    #[test]
    fn test_unexpected_character() {
        let err = Lexer::new("a = 1 @ 2").tokenize().unwrap_err();
        assert!(err.to_string().contains("Unexpected character '@'"));
    }

    #[test]
    fn test_number_forms() {
        let tokens = Lexer::new("1_000 0xff 2.5e3").tokenize().unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["1_000", "0xff", "2.5e3", ""]);
    }
}
