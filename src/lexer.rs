use logos::Logos;
use std::fmt;
use tracing::debug;

use crate::source::{Position, Span};

/// How a string scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quoting {
    Closed,
    Unterminated,
}

// Raw scanner. Positions, literal keywords (nil/true/false) and lookahead are
// layered on top by `Tokenizer`.
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\n\r\x08\x0C,]+")] // Whitespace, backspace and commas
enum RawToken {
    #[regex(r";[^\n]*")]
    Comment,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("~@")]
    TildeAt,
    #[token("'")]
    Quote,
    #[token("`")]
    Backquote,
    #[token("~")]
    Tilde,
    #[token("^")]
    Caret,
    #[token("@")]
    At,
    #[regex(r"-?[0-9]+")]
    Int,
    // At most one '.', a second one ends the number.
    #[regex(r"-?[0-9]+\.[0-9]*")]
    Float,
    #[token("\"", lex_string)]
    Str(Quoting),
    #[regex(r":[^ ,()\[\]{}\x00-\x1F\x7F]*")]
    Keyword,
    // Cannot start with a digit, a reader-macro character, '"', ';' or ':'.
    // A leading '-' must not be followed by a digit (that is a number).
    #[regex(r#"[^ ,()\[\]{}\x00-\x1F\x7F"';:`~^@0-9\-][^ ,()\[\]{}\x00-\x1F\x7F]*"#)]
    #[regex(r"-([^ ,()\[\]{}\x00-\x1F\x7F0-9][^ ,()\[\]{}\x00-\x1F\x7F]*)?")]
    Symbol,
}

/// Scans the body of a string literal after its opening quote.
///
/// A quote preceded by an odd number of backslashes is escaped. A newline or
/// the end of input stops the scan without consuming the newline.
fn lex_string(lex: &mut logos::Lexer<RawToken>) -> Quoting {
    let rest = lex.remainder().as_bytes();
    let mut slashes = 0usize;
    for (i, &byte) in rest.iter().enumerate() {
        match byte {
            b'\n' => {
                lex.bump(i);
                return Quoting::Unterminated;
            }
            b'\\' => slashes += 1,
            b'"' if slashes % 2 == 0 => {
                lex.bump(i + 1);
                return Quoting::Closed;
            }
            _ => slashes = 0,
        }
    }
    lex.bump(rest.len());
    Quoting::Unterminated
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Illegal,
    Eof,
    Comment,

    // Literals
    Nil,
    Bool,
    Int,
    Float,
    Str,
    Keyword,

    // Delimiters
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Reader macros
    TildeAt,
    Quote,
    Backquote,
    Tilde,
    Caret,
    At,

    Symbol,
}

impl TokenKind {
    fn from_raw(raw: RawToken, text: &str) -> Self {
        match raw {
            RawToken::Comment => TokenKind::Comment,
            RawToken::LParen => TokenKind::LParen,
            RawToken::RParen => TokenKind::RParen,
            RawToken::LBracket => TokenKind::LBracket,
            RawToken::RBracket => TokenKind::RBracket,
            RawToken::LBrace => TokenKind::LBrace,
            RawToken::RBrace => TokenKind::RBrace,
            RawToken::TildeAt => TokenKind::TildeAt,
            RawToken::Quote => TokenKind::Quote,
            RawToken::Backquote => TokenKind::Backquote,
            RawToken::Tilde => TokenKind::Tilde,
            RawToken::Caret => TokenKind::Caret,
            RawToken::At => TokenKind::At,
            RawToken::Int => TokenKind::Int,
            RawToken::Float => TokenKind::Float,
            RawToken::Str(Quoting::Closed) => TokenKind::Str,
            // Unterminated strings keep whatever was scanned.
            RawToken::Str(Quoting::Unterminated) => {
                debug!(text, "unterminated string literal");
                TokenKind::Str
            }
            RawToken::Keyword => TokenKind::Keyword,
            RawToken::Symbol => match text {
                "nil" => TokenKind::Nil,
                "true" | "false" => TokenKind::Bool,
                _ => TokenKind::Symbol,
            },
        }
    }

    /// Returns the closing delimiter matching an opening one.
    pub fn closing(self) -> Option<TokenKind> {
        match self {
            TokenKind::LParen => Some(TokenKind::RParen),
            TokenKind::LBracket => Some(TokenKind::RBracket),
            TokenKind::LBrace => Some(TokenKind::RBrace),
            _ => None,
        }
    }

    pub fn is_closing(self) -> bool {
        matches!(
            self,
            TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Illegal => "illegal token",
            TokenKind::Eof => "end of input",
            TokenKind::Comment => "comment",
            TokenKind::Nil => "nil",
            TokenKind::Bool => "boolean",
            TokenKind::Int => "integer",
            TokenKind::Float => "float",
            TokenKind::Str => "string",
            TokenKind::Keyword => "keyword",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::TildeAt => "'~@'",
            TokenKind::Quote => "'''",
            TokenKind::Backquote => "'`'",
            TokenKind::Tilde => "'~'",
            TokenKind::Caret => "'^'",
            TokenKind::At => "'@'",
            TokenKind::Symbol => "symbol",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: Position,
    pub end: Position,
    pub text: String, // Raw source text
}

impl Token {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// Token stream with a single token of lookahead.
pub struct Tokenizer<'src> {
    source: &'src str,
    raw: logos::Lexer<'src, RawToken>,
    cursor: Position,
    peeked: Option<Token>,
}

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str) -> Self {
        Tokenizer {
            source,
            raw: RawToken::lexer(source),
            cursor: Position::default(),
            peeked: None,
        }
    }

    /// Returns the next token without consuming it. Repeated calls return the
    /// same token.
    pub fn peek_token(&mut self) -> &Token {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.scan(),
        };
        self.peeked.insert(token)
    }

    /// Consumes the next token. Once the input is exhausted every call yields
    /// an `Eof` token.
    pub fn next_token(&mut self) -> Token {
        self.peeked.take().unwrap_or_else(|| self.scan())
    }

    fn scan(&mut self) -> Token {
        let Some(result) = self.raw.next() else {
            self.advance_to(self.source.len());
            return Token {
                kind: TokenKind::Eof,
                start: self.cursor,
                end: self.cursor,
                text: String::new(),
            };
        };
        let range = self.raw.span();
        self.advance_to(range.start);
        let start = self.cursor;
        self.advance_to(range.end);

        let text = self.raw.slice();
        let kind = match result {
            Ok(raw) => TokenKind::from_raw(raw, text),
            Err(()) => TokenKind::Illegal,
        };
        Token {
            kind,
            start,
            end: self.cursor,
            text: text.to_string(),
        }
    }

    // Every consumed byte, skipped whitespace included, moves the cursor.
    fn advance_to(&mut self, offset: usize) {
        let source = self.source;
        if offset > self.cursor.offset {
            self.cursor
                .advance_over(&source.as_bytes()[self.cursor.offset..offset]);
        }
    }
}

// Helper function to tokenize a string directly (useful for tests, the REPL and benches)
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token();
        if token.kind == TokenKind::Eof {
            return tokens;
        }
        tokens.push(token);
    }
}
