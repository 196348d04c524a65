use builder_lexer::{
    lexer::{unescape_string_literal, LexError},
    Lexer, Token, TokenKind,
};

use crate::ast::{BinaryOp, Expr, UnaryOp};

/// An unparseable expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        Self::new(error.message)
    }
}

/// Parses a complete expression region. Trailing tokens are an error.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser {
        lexer: Lexer::new(input),
    };
    let expr = parser.ternary()?;
    let trailing = parser.next()?;
    if trailing.kind != TokenKind::EndOfInput {
        return Err(ParseError::new(format!(
            "unexpected {} after expression",
            parser.describe(trailing)
        )));
    }
    Ok(expr)
}

// Binary operators are parsed by precedence climbing rather than one
// recursive-descent rule per level; with seven levels the table is easier to
// read and to extend.
struct Parser<'a> {
    lexer: Lexer<'a>,
}

fn infix_binding_power(kind: TokenKind) -> Option<(u8, BinaryOp)> {
    Some(match kind {
        TokenKind::Or => (1, BinaryOp::Or),
        TokenKind::And => (3, BinaryOp::And),
        TokenKind::Equal => (5, BinaryOp::Eq),
        TokenKind::NotEqual => (5, BinaryOp::Ne),
        TokenKind::Less => (7, BinaryOp::Lt),
        TokenKind::LessEqual => (7, BinaryOp::Le),
        TokenKind::Greater => (7, BinaryOp::Gt),
        TokenKind::GreaterEqual => (7, BinaryOp::Ge),
        TokenKind::Add => (9, BinaryOp::Add),
        TokenKind::Sub => (9, BinaryOp::Sub),
        TokenKind::Mul => (11, BinaryOp::Mul),
        TokenKind::Div => (11, BinaryOp::Div),
        TokenKind::Rem => (11, BinaryOp::Rem),
        _ => return None,
    })
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Result<Token, ParseError> {
        Ok(self.lexer.next()?)
    }

    fn peek(&mut self) -> Result<Token, ParseError> {
        Ok(self.lexer.peek()?)
    }

    fn describe(&self, token: Token) -> String {
        if token.kind == TokenKind::EndOfInput {
            token.kind.name().to_owned()
        } else {
            format!("`{}`", token.span.get_input(self.lexer.input))
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        let token = self.next()?;
        if token.kind != kind {
            return Err(ParseError::new(format!(
                "{} expected, but got {}",
                kind.name(),
                self.describe(token)
            )));
        }
        Ok(token)
    }

    /// The top level of the grammar: `cond ? then : otherwise`, right
    /// associative, with the condition drawn from the binary-operator level.
    fn ternary(&mut self) -> Result<Expr, ParseError> {
        let condition = self.binary(0)?;
        if self.peek()?.kind != TokenKind::Question {
            return Ok(condition);
        }
        self.next()?;
        let then = self.ternary()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.ternary()?;
        Ok(Expr::Ternary {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn binary(&mut self, min_binding_power: u8) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let Some((binding_power, op)) = infix_binding_power(self.peek()?.kind) else {
                break;
            };
            if binding_power < min_binding_power {
                break;
            }
            self.next()?;
            let right = self.binary(binding_power + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek()?.kind {
            TokenKind::Add => UnaryOp::Plus,
            TokenKind::Sub => UnaryOp::Minus,
            TokenKind::Not => UnaryOp::Not,
            _ => return self.postfix(),
        };
        self.next()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(self.unary()?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek()?.kind {
                TokenKind::Dot => {
                    self.next()?;
                    let field = self.expect(TokenKind::Ident)?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        field: field.span.get_input(self.lexer.input).to_owned(),
                    };
                }
                TokenKind::LeftBracket => {
                    self.next()?;
                    let index = self.ternary()?;
                    self.expect(TokenKind::RightBracket)?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.next()?;
        Ok(match token.kind {
            TokenKind::Number => {
                let text = token.span.get_input(self.lexer.input);
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ParseError::new(format!("malformed number `{text}`")))?;
                Expr::Number(value)
            }
            TokenKind::String => {
                let literal = token.span.get_input(self.lexer.input);
                Expr::String(unescape_string_literal(literal).map_err(ParseError::new)?)
            }
            TokenKind::Ident => {
                let name = token.span.get_input(self.lexer.input);
                match name {
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    "null" => Expr::Null,
                    _ if self.peek()?.kind == TokenKind::LeftParen => {
                        self.next()?;
                        let args = self.call_args()?;
                        Expr::Call {
                            callee: name.to_owned(),
                            args,
                        }
                    }
                    _ => Expr::Ident(name.to_owned()),
                }
            }
            TokenKind::LeftParen => {
                let inner = self.ternary()?;
                self.expect(TokenKind::RightParen)?;
                inner
            }
            TokenKind::LeftBracket => {
                let mut elements = vec![];
                if self.peek()?.kind == TokenKind::RightBracket {
                    self.next()?;
                } else {
                    loop {
                        elements.push(self.ternary()?);
                        let separator = self.next()?;
                        match separator.kind {
                            TokenKind::Comma => (),
                            TokenKind::RightBracket => break,
                            _ => {
                                return Err(ParseError::new(format!(
                                    "`,` or `]` expected, but got {}",
                                    self.describe(separator)
                                )))
                            }
                        }
                    }
                }
                Expr::Array(elements)
            }
            _ => {
                return Err(ParseError::new(format!(
                    "expression expected, but got {}",
                    self.describe(token)
                )))
            }
        })
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut args = vec![];
        if self.peek()?.kind == TokenKind::RightParen {
            self.next()?;
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            let separator = self.next()?;
            match separator.kind {
                TokenKind::Comma => (),
                TokenKind::RightParen => break,
                _ => {
                    return Err(ParseError::new(format!(
                        "`,` or `)` expected, but got {}",
                        self.describe(separator)
                    )))
                }
            }
        }
        Ok(args)
    }
}
