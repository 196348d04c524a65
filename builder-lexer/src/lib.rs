//! Line classification and expression tokenization for the Builder
//! preprocessor.
//!
//! Builder is line-oriented: every input line is either a directive line
//! (`@set`, `@if`, ...), or a text line that passes through, possibly with
//! inline `@{...}` expression splices. The [`line`] module classifies lines
//! and carves out splices; the [`lexer`] module turns the expression regions
//! into tokens for the parser in `builder-expr`.

pub mod lexer;
pub mod line;
pub mod span;
pub mod token;

pub use lexer::{LexError, Lexer};
pub use span::Span;
pub use token::{Token, TokenKind};
