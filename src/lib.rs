// Declare modules publicly so they are part of the library interface
pub mod ast;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod value;

pub use ast::{Node, Program, Sexpr};
pub use environment::{EnvError, EnvId, Environments};
pub use error::Error;
pub use evaluator::{EvalError, EvalResult, Interpreter};
pub use lexer::{Token, TokenKind, Tokenizer, tokenize};
pub use parser::{ParseError, Parser, parse_str};
pub use source::{Position, Span};
pub use value::Value;

use tracing_subscriber::EnvFilter;

/// Installs the stderr log subscriber used by the binaries, filtered by the
/// `MALRS_LOG` environment variable (default `warn`).
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("MALRS_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber installed by an embedding program wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
