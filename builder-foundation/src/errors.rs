use std::fmt;

use thiserror::Error;

use crate::location::Location;

/// What went wrong. Every kind is fatal to the `execute` call that raised it;
/// no directive recovers from an error in its body.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// Ill-formed directive, unclosed `@macro`/`@if`, stray `@elseif`/`@else`/
    /// `@endif`, nested `@macro`, bad inline splice.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// Unparseable expression.
    #[error("expression error: {0}")]
    Expr(String),

    /// Operator applied to incompatible operands, or wrong arity to a
    /// built-in function.
    #[error("type error: {0}")]
    Type(String),

    /// Call to an unknown function. Unknown variables are not errors; they
    /// evaluate to `null`.
    #[error("unknown function `{0}`")]
    Name(String),

    #[error("circular include of `{0}`")]
    CircularInclude(String),

    /// No registered reader recognizes the include reference.
    #[error("no reader recognizes source reference `{0}`")]
    UnknownSource(String),

    /// A reader accepted the reference but failed to produce its text.
    #[error("cannot read `{reference}`: {cause}")]
    SourceReading {
        reference: String,
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Raised by the `@error` directive.
    #[error("{0}")]
    User(String),
}

/// A fatal preprocessing error: the kind of failure, the location of the
/// offending line, and the include trace at the point of failure (innermost
/// first).
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub location: Location,
    pub trace: Vec<Location>,
}

impl Error {
    pub fn new(kind: ErrorKind, location: Location) -> Self {
        Self {
            kind,
            location,
            trace: vec![],
        }
    }

    pub fn with_trace(mut self, trace: Vec<Location>) -> Self {
        self.trace = trace;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.kind)?;
        for included_by in &self.trace {
            write!(f, "\n  included from {included_by}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
