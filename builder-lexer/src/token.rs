use crate::span::Span;

/// The kinds of tokens an expression region can contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    String,

    Add,
    Sub,
    Mul,
    Div,
    Rem,

    Not,
    NotEqual,
    Assign,
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,

    Dot,
    Comma,
    Question,
    Colon,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,

    EndOfInput,
}

impl TokenKind {
    /// Human-readable name for error messages.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Ident => "identifier",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Add => "`+`",
            TokenKind::Sub => "`-`",
            TokenKind::Mul => "`*`",
            TokenKind::Div => "`/`",
            TokenKind::Rem => "`%`",
            TokenKind::Not => "`!`",
            TokenKind::NotEqual => "`!=`",
            TokenKind::Assign => "`=`",
            TokenKind::Equal => "`==`",
            TokenKind::Less => "`<`",
            TokenKind::LessEqual => "`<=`",
            TokenKind::Greater => "`>`",
            TokenKind::GreaterEqual => "`>=`",
            TokenKind::And => "`&&`",
            TokenKind::Or => "`||`",
            TokenKind::Dot => "`.`",
            TokenKind::Comma => "`,`",
            TokenKind::Question => "`?`",
            TokenKind::Colon => "`:`",
            TokenKind::LeftParen => "`(`",
            TokenKind::RightParen => "`)`",
            TokenKind::LeftBracket => "`[`",
            TokenKind::RightBracket => "`]`",
            TokenKind::EndOfInput => "end of expression",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}
