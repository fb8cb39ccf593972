use std::time::Duration;
use std::{fmt, io};

use thiserror::Error;

use crate::ast::Position;

#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("unmatched ')' at {0}")]
    UnmatchedClose(Position),
    #[error("unexpected end of input at {0}")]
    UnexpectedEof(Position),
    #[error("unterminated string starting at {0}")]
    UnterminatedString(Position),
    #[error("could not read source: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    UnknownIdentifier,
    ArityMismatch,
    TypeMismatch,
    StructuralError,
    UsedBeforeDefined,
    MissingFunctionBody,
    Killed,
}

/// An evaluation failure, carrying the operator traceback rendered at the
/// moment of the raise. Frames run from the outermost call to the innermost.
#[derive(Debug)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    pub trace: Vec<String>,
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if !self.trace.is_empty() {
            writeln!(f, "traceback (innermost call last):")?;
            for frame in &self.trace {
                writeln!(f, "{}", frame)?;
            }
        }
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for EvalError {}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),
}
