use crate::source::Span;
use std::fmt;
use std::ops::ControlFlow;
use std::rc::Rc;

/// Literal kinds of a single atom.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AtomKind {
    Nil,
    Bool,
    Int,
    Float,
    String,
    Keyword,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ContainerKind {
    Vector,
    Map,
}

impl ContainerKind {
    fn delimiters(self) -> (&'static str, &'static str) {
        match self {
            ContainerKind::Vector => ("[", "]"),
            ContainerKind::Map => ("{", "}"),
        }
    }
}

/// Reader-macro shorthands and the special-form names they expand to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReaderMacro {
    Quote,
    Quasiquote,
    Unquote,
    SpliceUnquote,
    Deref,
    WithMeta,
}

impl ReaderMacro {
    pub fn name(self) -> &'static str {
        match self {
            ReaderMacro::Quote => "quote",
            ReaderMacro::Quasiquote => "quasiquote",
            ReaderMacro::Unquote => "unquote",
            ReaderMacro::SpliceUnquote => "splice-unquote",
            ReaderMacro::Deref => "deref",
            ReaderMacro::WithMeta => "with-meta",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: Sexpr, // The syntactic form
    pub span: Span,  // The source span it covers
}

/// A parsed form. Child nodes are reference counted so closures can hold on
/// to their bodies without copying the tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Comment(String), // Includes the leading ';', never the newline
    Symbol(String),
    Atom(AtomKind, String), // Raw source text
    Container(ContainerKind, Vec<Rc<Node>>),
    List {
        macro_symbol: Option<ReaderMacro>,
        elems: Vec<Rc<Node>>,
    },
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, Sexpr::Comment(_))
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match &self.kind {
            Sexpr::Symbol(name) => Some(name),
            _ => None,
        }
    }
}

/// Iterates over child forms, skipping comments.
pub fn forms(elems: &[Rc<Node>]) -> impl Iterator<Item = &Rc<Node>> {
    elems.iter().filter(|node| !node.is_comment())
}

/// Returns the text between the quotes of a raw string literal. An
/// unterminated literal has no closing quote to strip.
pub fn string_body(raw: &str) -> &str {
    let inner = raw.strip_prefix('"').unwrap_or(raw);
    match inner.strip_suffix('"') {
        Some(body) if is_closing_quote(body) => body,
        _ => inner,
    }
}

// A trailing quote closes the literal unless an odd run of backslashes
// precedes it.
fn is_closing_quote(body: &str) -> bool {
    body.bytes().rev().take_while(|&b| b == b'\\').count() % 2 == 0
}

/// Decodes the escapes of a string literal body. Unknown escapes are kept
/// verbatim.
pub fn unescape(body: &str) -> String {
    let mut result = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }
    result
}

/// Inverse of [`unescape`] for the readable print mode.
pub fn escape(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut acc, c| {
        match c {
            '\\' => acc.push_str("\\\\"),
            '"' => acc.push_str("\\\""),
            '\n' => acc.push_str("\\n"),
            '\r' => acc.push_str("\\r"),
            '\t' => acc.push_str("\\t"),
            c => acc.push(c),
        }
        acc
    })
}

fn write_children(f: &mut fmt::Formatter<'_>, elems: &[Rc<Node>], mut first: bool) -> fmt::Result {
    for elem in forms(elems) {
        if !first {
            write!(f, " ")?;
        }
        write!(f, "{}", elem)?;
        first = false;
    }
    Ok(())
}

// Canonical rendering: one space between siblings, none inside delimiters.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Sexpr::Comment(text) => write!(f, "{}", text),
            Sexpr::Symbol(name) => write!(f, "{}", name),
            Sexpr::Atom(AtomKind::String, raw) => {
                write!(f, "\"{}\"", escape(&unescape(string_body(raw))))
            }
            Sexpr::Atom(_, raw) => write!(f, "{}", raw),
            Sexpr::Container(kind, elems) => {
                let (open, close) = kind.delimiters();
                write!(f, "{}", open)?;
                write_children(f, elems, true)?;
                write!(f, "{}", close)
            }
            Sexpr::List {
                macro_symbol,
                elems,
            } => {
                write!(f, "(")?;
                if let Some(macro_symbol) = macro_symbol {
                    write!(f, "{}", macro_symbol.name())?;
                }
                write_children(f, elems, macro_symbol.is_none())?;
                write!(f, ")")
            }
        }
    }
}

/// A whole parsed input: its top-level forms in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub forms: Vec<Rc<Node>>,
}

impl Program {
    pub fn new(forms: Vec<Rc<Node>>) -> Self {
        Program { forms }
    }

    /// Visits the top-level forms in order until the visitor breaks.
    pub fn walk<B>(&self, mut visitor: impl FnMut(&Rc<Node>) -> ControlFlow<B>) -> ControlFlow<B> {
        for form in &self.forms {
            visitor(form)?;
        }
        ControlFlow::Continue(())
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

// One form per line, comments omitted.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for form in forms(&self.forms) {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", form)?;
            first = false;
        }
        Ok(())
    }
}
