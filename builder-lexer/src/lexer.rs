use crate::{
    span::Span,
    token::{Token, TokenKind},
};

/// A tokenization failure. The span points into the expression region the
/// lexer was constructed over; the caller maps it onto a source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

impl LexError {
    fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

/// Tokenizer for a single expression region.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    pub input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn advance_char(&mut self) {
        if let Some(char) = self.current_char() {
            self.position += char.len_utf8();
        }
    }

    fn range(&self, start: usize) -> Span {
        Span {
            start,
            end: self.position,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(' ' | '\t' | '\r' | '\n') = self.current_char() {
            self.advance_char();
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: self.range(start),
        }
    }

    fn identifier(&mut self, start: usize) -> Token {
        while let Some('a'..='z' | 'A'..='Z' | '0'..='9' | '_') = self.current_char() {
            self.advance_char();
        }
        self.token(TokenKind::Ident, start)
    }

    fn number(&mut self, start: usize) -> Result<Token, LexError> {
        while let Some('0'..='9') = self.current_char() {
            self.advance_char();
        }
        if self.current_char() == Some('.') {
            self.advance_char();
            while let Some('0'..='9') = self.current_char() {
                self.advance_char();
            }
        }
        if let Some('e' | 'E') = self.current_char() {
            let exponent_start = self.position;
            self.advance_char();
            if let Some('+' | '-') = self.current_char() {
                self.advance_char();
            }
            if !matches!(self.current_char(), Some('0'..='9')) {
                return Err(LexError::new(
                    self.range(exponent_start),
                    "exponent must be followed by digits",
                ));
            }
            while let Some('0'..='9') = self.current_char() {
                self.advance_char();
            }
        }
        Ok(self.token(TokenKind::Number, start))
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, LexError> {
        self.advance_char();
        loop {
            match self.current_char() {
                None => {
                    return Err(LexError::new(
                        self.range(start),
                        format!("string literal does not have a closing quote `{quote}`"),
                    ));
                }
                Some('\\') => {
                    self.advance_char();
                    // The escape is validated when the literal is unescaped.
                    self.advance_char();
                }
                Some(c) if c == quote => {
                    self.advance_char();
                    break;
                }
                _ => self.advance_char(),
            }
        }
        Ok(self.token(TokenKind::String, start))
    }

    fn single_char_token(&mut self, kind: TokenKind) -> Token {
        let start = self.position;
        self.advance_char();
        self.token(kind, start)
    }

    fn single_or_double_char_token(
        &mut self,
        kind: TokenKind,
        second: char,
        second_kind: TokenKind,
    ) -> Token {
        let start = self.position;
        self.advance_char();
        if self.current_char() == Some(second) {
            self.advance_char();
            self.token(second_kind, start)
        } else {
            self.token(kind, start)
        }
    }

    /// `&&` and `||` have no single-character form; the first character alone
    /// is an error.
    fn double_char_token(&mut self, second: char, kind: TokenKind) -> Result<Token, LexError> {
        let start = self.position;
        self.advance_char();
        if self.current_char() == Some(second) {
            self.advance_char();
            Ok(self.token(kind, start))
        } else {
            Err(LexError::new(
                self.range(start),
                format!("expected `{second}{second}`"),
            ))
        }
    }

    pub fn next(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();
        let start = self.position;

        let Some(char) = self.current_char() else {
            return Ok(self.token(TokenKind::EndOfInput, start));
        };

        Ok(match char {
            'a'..='z' | 'A'..='Z' | '_' => {
                self.advance_char();
                self.identifier(start)
            }
            '0'..='9' => {
                self.advance_char();
                self.number(start)?
            }
            '.' => {
                self.advance_char();
                if let Some('0'..='9') = self.current_char() {
                    self.number(start)?
                } else {
                    self.token(TokenKind::Dot, start)
                }
            }
            '"' | '\'' => self.string(start, char)?,
            '+' => self.single_char_token(TokenKind::Add),
            '-' => self.single_char_token(TokenKind::Sub),
            '*' => self.single_char_token(TokenKind::Mul),
            '/' => self.single_char_token(TokenKind::Div),
            '%' => self.single_char_token(TokenKind::Rem),
            '!' => self.single_or_double_char_token(TokenKind::Not, '=', TokenKind::NotEqual),
            '=' => self.single_or_double_char_token(TokenKind::Assign, '=', TokenKind::Equal),
            '<' => self.single_or_double_char_token(TokenKind::Less, '=', TokenKind::LessEqual),
            '>' => {
                self.single_or_double_char_token(TokenKind::Greater, '=', TokenKind::GreaterEqual)
            }
            '&' => self.double_char_token('&', TokenKind::And)?,
            '|' => self.double_char_token('|', TokenKind::Or)?,
            ',' => self.single_char_token(TokenKind::Comma),
            '?' => self.single_char_token(TokenKind::Question),
            ':' => self.single_char_token(TokenKind::Colon),
            '(' => self.single_char_token(TokenKind::LeftParen),
            ')' => self.single_char_token(TokenKind::RightParen),
            '[' => self.single_char_token(TokenKind::LeftBracket),
            ']' => self.single_char_token(TokenKind::RightBracket),
            unknown => {
                self.advance_char();
                return Err(LexError::new(
                    self.range(start),
                    format!("unrecognized character: {unknown:?}"),
                ));
            }
        })
    }

    pub fn peek(&mut self) -> Result<Token, LexError> {
        let position = self.position;
        let result = self.next();
        self.position = position;
        result
    }
}

/// Resolves the escape sequences of a quoted string literal, given the slice
/// *including* the surrounding quotes.
pub fn unescape_string_literal(literal: &str) -> Result<String, String> {
    let inner = &literal[1..literal.len() - 1];
    let mut result = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(char) = chars.next() {
        if char != '\\' {
            result.push(char);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some(other) => return Err(format!("unknown escape sequence `\\{other}`")),
            None => return Err("dangling `\\` at end of string".into()),
        }
    }
    Ok(result)
}
