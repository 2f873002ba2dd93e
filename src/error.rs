use crate::evaluator::EvalError;
use crate::parser::ParseError;
use crate::source::Span;
use thiserror::Error;

/// Anything that can go wrong reading and evaluating a line of input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::Parse(error) => error.span(),
            Error::Eval(error) => error.span(),
        }
    }
}
