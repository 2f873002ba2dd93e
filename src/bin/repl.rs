use std::borrow::Cow;
use std::cell::RefCell;
use std::env;
use std::rc::Rc;

use malrs::{Interpreter, ParseError, TokenKind, parse_str, tokenize};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, EditMode, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};

const DEFAULT_HISTORY: &str = "malrs_history.txt";

struct MalCompleter {
    interpreter: Rc<RefCell<Interpreter>>,
}

impl rustyline::completion::Completer for MalCompleter {
    type Candidate = String;

    // Completes the symbol under the cursor from the global bindings and the
    // special forms.
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        let tokens = tokenize(&line[..pos]);
        let candidates = match tokens.last() {
            Some(token) if token.kind == TokenKind::Symbol && token.end.offset == pos => {
                let prefix = token.text.as_str();
                let mut candidates: Vec<String> = self
                    .interpreter
                    .borrow()
                    .identifiers()
                    .into_iter()
                    .filter_map(|id| id.strip_prefix(prefix).map(str::to_string))
                    .filter(|rest| !rest.is_empty())
                    .collect();
                candidates.sort();
                candidates
            }
            _ => vec![],
        };
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputHelper {
    #[rustyline(Validator)]
    validator: MalValidator,
    #[rustyline(Highlighter)]
    highlighter: MalHighlighter,
    #[rustyline(Completer)]
    completer: MalCompleter,
}

struct MalValidator;

// An unclosed form asks for another line; a stray closer is rejected
// immediately. Every other problem is left for evaluation to report.
impl Validator for MalValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        Ok(match parse_str(ctx.input()) {
            Err(ParseError::UnexpectedEof { .. }) => ValidationResult::Incomplete,
            Err(error @ ParseError::UnexpectedToken { .. }) => {
                ValidationResult::Invalid(Some(format!("  - {}", error)))
            }
            _ => ValidationResult::Valid(None),
        })
    }
}

struct MalHighlighter;

fn paint(code: &str, text: &str) -> String {
    format!("\x1b[{}m{}\x1b[0m", code, text)
}

impl Highlighter for MalHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let mut pieces: Vec<String> = Vec::new();
        // Open delimiters: kind, index into `pieces`, byte offset.
        let mut open: Vec<(TokenKind, usize, usize)> = Vec::new();
        let mut last = 0;

        for token in tokenize(line) {
            let (start, end) = (token.start.offset, token.end.offset);
            if start > last {
                pieces.push(line[last..start].to_string());
            }
            last = end;
            let text = token.text.as_str();
            match token.kind {
                TokenKind::Str => pieces.push(paint("32", text)), // Green
                TokenKind::Comment => pieces.push(paint("90", text)),
                TokenKind::Keyword => pieces.push(paint("35", text)),
                kind if kind.closing().is_some() => {
                    open.push((kind, pieces.len(), start));
                    pieces.push(text.to_string());
                }
                kind if kind.is_closing() => match open.pop() {
                    Some((opener, index, offset)) if opener.closing() == Some(kind) => {
                        // Blue pair when the cursor touches either end.
                        if pos == end || pos == offset + 1 {
                            let painted = paint("1;34", &pieces[index]);
                            pieces[index] = painted;
                            pieces.push(paint("34", text));
                        } else {
                            pieces.push(text.to_string());
                        }
                    }
                    Some((_, index, _)) => {
                        let painted = paint("1;31", &pieces[index]);
                        pieces[index] = painted;
                        pieces.push(paint("31", text));
                    }
                    None => pieces.push(paint("31", text)), // Red for unmatched closers
                },
                _ => pieces.push(text.to_string()),
            }
        }
        if last < line.len() {
            pieces.push(line[last..].to_string());
        }
        Cow::Owned(pieces.concat())
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn edit_mode() -> EditMode {
    match env::var("MALRS_EDIT_MODE").as_deref() {
        Ok("vi") => EditMode::Vi,
        _ => EditMode::Emacs,
    }
}

fn main() -> rustyline::Result<()> {
    malrs::init_logging();
    println!("malrs REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let interpreter = Rc::new(RefCell::new(Interpreter::new()));
    let helper = InputHelper {
        validator: MalValidator,
        highlighter: MalHighlighter,
        completer: MalCompleter {
            interpreter: Rc::clone(&interpreter),
        },
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(edit_mode())
        .auto_add_history(false)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );

    let history = env::var("MALRS_HISTORY").unwrap_or_else(|_| DEFAULT_HISTORY.to_string());
    if rl.load_history(&history).is_err() {
        println!("No previous history.");
    }

    loop {
        match rl.readline("user> ") {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if input.eq_ignore_ascii_case("exit") {
                    break;
                }
                let result = interpreter.borrow_mut().rep(input);
                match result {
                    Ok(values) => {
                        for value in values {
                            println!("{}", value);
                        }
                    }
                    Err(error) => {
                        if error.pretty_print(input).is_err() {
                            eprintln!("ERR: {}", error);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(&history)
}
