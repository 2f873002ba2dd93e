use crate::source::Span;
use crate::{EnvError, Error, EvalError, ParseError};
use ariadne::{Label, Report, ReportKind, Source};
use std::io;

const SOURCE_ID: &str = "REPL";

// Prints a single-label report against `input` to stderr.
fn emit(input: &str, span: Span, message: String, label: String) -> io::Result<()> {
    Report::build(ReportKind::Error, (SOURCE_ID, span.to_range()))
        .with_message(message)
        .with_label(Label::new((SOURCE_ID, span.to_range())).with_message(label))
        .finish()
        .eprint((SOURCE_ID, Source::from(input)))
}

impl ParseError {
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        let (message, label) = match self {
            ParseError::IllegalToken { text, .. } => (
                format!("Illegal syntax `{}`", text),
                "This text is not a valid token".to_string(),
            ),
            ParseError::UnexpectedEof { expected, .. } => (
                "Unexpected end of input".to_string(),
                format!("This form is never closed, expected {}", expected),
            ),
            ParseError::UnexpectedToken {
                found, expected, ..
            } => (
                format!("Unexpected token: {}", found),
                format!("Expected {}", expected),
            ),
            ParseError::InvalidNumber { text, .. } => (
                format!("Invalid number `{}`", text),
                "This literal does not fit a 64-bit number".to_string(),
            ),
            ParseError::MissingMacroTarget { name, .. } => (
                format!("Dangling `{}`", name),
                "A form must follow this reader macro".to_string(),
            ),
        };
        emit(input, self.span(), message, label)
    }
}

impl EvalError {
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        let (message, label) = match self {
            EvalError::Env(EnvError::UndefinedSymbol(symbol, _)) => (
                format!("Undefined symbol `{}`", symbol),
                "This symbol is not defined in the current scope".to_string(),
            ),
            EvalError::UnpairedMapKey(_) => (
                "Map literal has an odd number of forms".to_string(),
                "The last key has no value".to_string(),
            ),
            EvalError::TypeMismatch {
                operator,
                expected,
                found,
                ..
            } => (
                format!("Type mismatch in `{}`", operator),
                format!("Expected {}, found {}", expected, found),
            ),
            EvalError::Arity {
                name,
                expected,
                found,
                ..
            } => (
                format!("Wrong number of arguments to `{}`", name),
                format!("Expected {}, got {}", expected, found),
            ),
            EvalError::InvalidSpecialForm(message, _) => (
                format!("Invalid special form: {}", message),
                "This special form is malformed or incomplete".to_string(),
            ),
            EvalError::InvalidLiteral(text, _) => (
                format!("Invalid literal `{}`", text),
                "This literal cannot be evaluated".to_string(),
            ),
            EvalError::Arithmetic {
                operator, error, ..
            } => (
                format!("Arithmetic error in `{}`", operator),
                error.to_string(),
            ),
            EvalError::Output(message, _) => (
                "Could not write output".to_string(),
                message.clone(),
            ),
        };
        emit(input, self.span(), message, label)
    }
}

impl Error {
    pub fn pretty_print(&self, input: &str) -> io::Result<()> {
        match self {
            Error::Parse(error) => error.pretty_print(input),
            Error::Eval(error) => error.pretty_print(input),
        }
    }
}
