use crate::ast::{AtomKind, ContainerKind, Node, Program, ReaderMacro, Sexpr, forms, string_body, unescape};
use crate::environment::{EnvError, EnvId, Environments};
use crate::error::Error;
use crate::parser::parse_str;
use crate::primitives::BUILTINS;
use crate::source::Span;
use crate::value::{ArithmeticError, Lambda, MapKey, Value};
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::ops::ControlFlow;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

// --- Evaluation Error ---

/// How many arguments a callable accepts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AritySpec {
    Exact(usize),
    AtLeast(usize),
}

impl AritySpec {
    /// Arity of a parameter list, where `&` marks the variadic tail.
    pub fn of_params(params: &[String]) -> Self {
        match params.iter().position(|p| p == "&") {
            Some(required) => AritySpec::AtLeast(required),
            None => AritySpec::Exact(params.len()),
        }
    }

    pub fn accepts(self, count: usize) -> bool {
        match self {
            AritySpec::Exact(n) => count == n,
            AritySpec::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for AritySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AritySpec::Exact(n) => write!(f, "{}", n),
            AritySpec::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("[{0}] map literal has a key without a value")]
    UnpairedMapKey(Span),
    #[error("[{span}] '{operator}' expects {expected}, got {found}")]
    TypeMismatch {
        operator: String,
        expected: &'static str,
        found: &'static str,
        span: Span,
    },
    #[error("[{span}] '{name}' expects {expected} arguments, got {found}")]
    Arity {
        name: String,
        expected: AritySpec,
        found: usize,
        span: Span,
    },
    #[error("[{1}] invalid special form: {0}")]
    InvalidSpecialForm(String, Span),
    #[error("[{1}] invalid literal: {0}")]
    InvalidLiteral(String, Span),
    #[error("[{span}] {error} in '{operator}'")]
    Arithmetic {
        operator: String,
        error: ArithmeticError,
        span: Span,
    },
    #[error("[{1}] could not write output: {0}")]
    Output(String, Span),
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::Env(error) => error.span(),
            EvalError::UnpairedMapKey(span)
            | EvalError::InvalidSpecialForm(_, span)
            | EvalError::InvalidLiteral(_, span)
            | EvalError::Output(_, span) => *span,
            EvalError::TypeMismatch { span, .. }
            | EvalError::Arity { span, .. }
            | EvalError::Arithmetic { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

// --- Special forms ---

// What a special form or call hands back to the trampoline: a finished value,
// or the next expression to evaluate in tail position.
enum Step {
    Return(Value),
    Continue(EnvId, Rc<Node>),
}

type SpecialForm = fn(&mut Interpreter, &[&Rc<Node>], Span, EnvId) -> EvalResult<Step>;

const SPECIAL_FORMS: &[(&str, SpecialForm)] = &[
    ("def!", Interpreter::eval_def),
    ("let*", Interpreter::eval_let),
    ("do", Interpreter::eval_do),
    ("if", Interpreter::eval_if),
    ("fn*", Interpreter::eval_fn),
];

fn special_form(name: &str) -> Option<SpecialForm> {
    SPECIAL_FORMS
        .iter()
        .find(|(form, _)| *form == name)
        .map(|(_, handler)| *handler)
}

pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|(name, _)| name.to_string()).collect()
}

// Children of a parameter or binding list, which may be written as a list or
// a vector.
fn sequence_forms<'a>(node: &'a Rc<Node>, form: &str) -> EvalResult<Vec<&'a Rc<Node>>> {
    match &node.kind {
        Sexpr::List {
            macro_symbol: None,
            elems,
        }
        | Sexpr::Container(ContainerKind::Vector, elems) => Ok(forms(elems).collect()),
        _ => Err(EvalError::InvalidSpecialForm(
            format!("{} expects a list or vector of bindings", form),
            node.span,
        )),
    }
}

fn expect_symbol<'a>(node: &'a Node, form: &str) -> EvalResult<&'a str> {
    node.as_symbol().ok_or_else(|| {
        EvalError::InvalidSpecialForm(format!("{} expects a symbol, got {}", form, node), node.span)
    })
}

fn literal(kind: AtomKind, raw: &str, span: Span) -> EvalResult {
    let invalid = || EvalError::InvalidLiteral(raw.to_string(), span);
    Ok(match kind {
        AtomKind::Nil => Value::Nil,
        AtomKind::Bool => Value::Bool(raw == "true"),
        AtomKind::Int => Value::Int(raw.parse().map_err(|_| invalid())?),
        AtomKind::Float => Value::Float(raw.parse().map_err(|_| invalid())?),
        AtomKind::String => Value::String(unescape(string_body(raw))),
        AtomKind::Keyword => Value::Keyword(raw.strip_prefix(':').unwrap_or(raw).to_string()),
    })
}

// --- Interpreter ---

const PRELUDE: &str = "(def! not (fn* (a) (if a false true)))";

const GC_INITIAL_THRESHOLD: usize = 1024;

/// Owns the global environment and the output sink used by the printing
/// builtins. Everything evaluated through one interpreter shares its globals.
pub struct Interpreter {
    envs: Environments,
    global: EnvId,
    output: Box<dyn Write>,
    gc_threshold: usize,
    // Garbage collection roots besides the globals: the environment of every
    // running trampoline, and values evaluated but not yet stored anywhere.
    active: Vec<EnvId>,
    held: Vec<Value>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// An interpreter printing to stdout.
    pub fn new() -> Self {
        Interpreter::with_output(Box::new(io::stdout()))
    }

    pub fn with_output(output: Box<dyn Write>) -> Self {
        let mut envs = Environments::new();
        let global = envs.create(None);
        for builtin in BUILTINS {
            envs.set(global, builtin.name, Value::Function(*builtin));
        }
        let mut interpreter = Interpreter {
            envs,
            global,
            output,
            gc_threshold: GC_INITIAL_THRESHOLD,
            active: Vec::new(),
            held: Vec::new(),
        };
        if let Err(error) = interpreter.rep(PRELUDE) {
            tracing::error!(%error, "prelude failed to evaluate");
        }
        interpreter
    }

    pub fn global(&self) -> EnvId {
        self.global
    }

    /// Binds `name` in the global environment.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.envs.set(self.global, name, value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.envs.find(self.global, name).cloned()
    }

    /// Names bound globally, plus the special forms.
    pub fn identifiers(&self) -> HashSet<String> {
        let mut identifiers = self.envs.identifiers(self.global);
        identifiers.extend(special_form_identifiers());
        identifiers
    }

    pub fn live_environments(&self) -> usize {
        self.envs.live_frames()
    }

    /// Reclaims environments no longer reachable from the globals or from an
    /// evaluation in progress. Values returned by earlier evaluations that
    /// still hold closures over reclaimed scopes lose those bindings.
    pub fn collect_garbage(&mut self) -> usize {
        let mut roots = vec![self.global];
        roots.extend_from_slice(&self.active);
        for value in &self.held {
            value.captured_envs(&mut roots);
        }
        let released = self.envs.collect_garbage(&roots);
        debug!(released, live = self.envs.live_frames(), "collected environments");
        released
    }

    fn maybe_collect_garbage(&mut self) {
        if self.envs.live_frames() >= self.gc_threshold {
            self.collect_garbage();
            self.gc_threshold = (self.envs.live_frames() * 2).max(GC_INITIAL_THRESHOLD);
        }
    }

    /// Parses and evaluates `source`, returning the value of every
    /// non-comment top-level form.
    pub fn rep(&mut self, source: &str) -> Result<Vec<Value>, Error> {
        let program = parse_str(source)?;
        Ok(self.eval_program(&program)?)
    }

    /// Evaluates each top-level form in order in the global environment. The
    /// first error stops the program; bindings made before it remain.
    pub fn eval_program(&mut self, program: &Program) -> EvalResult<Vec<Value>> {
        self.maybe_collect_garbage();
        // Earlier results stay rooted while later forms run.
        let base = self.held.len();
        let flow = program.walk(|form| match self.eval_form(form) {
            Ok(Some(value)) => {
                self.held.push(value);
                ControlFlow::Continue(())
            }
            Ok(None) => ControlFlow::Continue(()),
            Err(error) => ControlFlow::Break(error),
        });
        let results = self.held.split_off(base);
        match flow {
            ControlFlow::Continue(()) => Ok(results),
            ControlFlow::Break(error) => Err(error),
        }
    }

    /// Evaluates one form in the global environment. Comments yield `None`.
    pub fn eval_form(&mut self, form: &Rc<Node>) -> EvalResult<Option<Value>> {
        if form.is_comment() {
            return Ok(None);
        }
        self.eval(form, self.global).map(Some)
    }

    fn eval(&mut self, node: &Rc<Node>, env: EnvId) -> EvalResult {
        self.active.push(env);
        let slot = self.active.len() - 1;
        let result = self.run(node, env, slot);
        self.active.truncate(slot);
        result
    }

    // Trampoline: forms in tail position replace the current expression
    // instead of recursing, so tail calls run in constant stack space. Each
    // step is a safe point for garbage collection, so abandoned call frames
    // do not pile up either.
    fn run(&mut self, node: &Rc<Node>, env: EnvId, slot: usize) -> EvalResult {
        let mut env = env;
        let mut expr = Rc::clone(node);
        loop {
            let Sexpr::List {
                macro_symbol,
                elems,
            } = &expr.kind
            else {
                return self.eval_atom(&expr, env);
            };
            match self.eval_list(&expr, *macro_symbol, elems, env)? {
                Step::Return(value) => return Ok(value),
                Step::Continue(next_env, next_expr) => {
                    env = next_env;
                    expr = next_expr;
                    self.active[slot] = env;
                    self.maybe_collect_garbage();
                }
            }
        }
    }

    fn eval_atom(&mut self, node: &Rc<Node>, env: EnvId) -> EvalResult {
        match &node.kind {
            // Only reachable through a hand-built tree.
            Sexpr::Comment(_) => Ok(Value::Nil),
            Sexpr::Symbol(name) => Ok(self.envs.get(env, name, node.span)?),
            Sexpr::Atom(kind, raw) => literal(*kind, raw, node.span),
            Sexpr::Container(ContainerKind::Vector, elems) => {
                self.eval_each(forms(elems), env).map(Value::Vector)
            }
            Sexpr::Container(ContainerKind::Map, elems) => self.eval_map(node, elems, env),
            Sexpr::List { .. } => self.eval(node, env),
        }
    }

    fn eval_map(&mut self, node: &Node, elems: &[Rc<Node>], env: EnvId) -> EvalResult {
        // Keys cannot capture environments; values wait on the held stack.
        let base = self.held.len();
        let mut keys = Vec::new();
        for (index, elem) in forms(elems).enumerate() {
            let value = match self.eval(elem, env) {
                Ok(value) => value,
                Err(error) => {
                    self.held.truncate(base);
                    return Err(error);
                }
            };
            if index % 2 == 1 {
                self.held.push(value);
                continue;
            }
            match MapKey::try_from(value) {
                Ok(key) => keys.push(key),
                Err(found) => {
                    self.held.truncate(base);
                    return Err(EvalError::TypeMismatch {
                        operator: "map literal".to_string(),
                        expected: "a string or keyword key",
                        found: found.type_name(),
                        span: elem.span,
                    });
                }
            }
        }
        let values = self.held.split_off(base);
        if keys.len() != values.len() {
            return Err(EvalError::UnpairedMapKey(node.span));
        }
        Ok(Value::Map(keys.into_iter().zip(values).collect()))
    }

    fn eval_list(
        &mut self,
        list: &Rc<Node>,
        macro_symbol: Option<ReaderMacro>,
        elems: &[Rc<Node>],
        env: EnvId,
    ) -> EvalResult<Step> {
        let items: Vec<&Rc<Node>> = forms(elems).collect();

        // Reader-macro lists call whatever their tag name is bound to.
        if let Some(tag) = macro_symbol {
            return self.apply_symbol(tag.name(), list.span, &items, list.span, env);
        }

        let Some((head, args)) = items.split_first() else {
            return Ok(Step::Return(Value::Raw(Rc::clone(list))));
        };
        match head.as_symbol() {
            Some(name) => match special_form(name) {
                Some(handler) => handler(self, args, list.span, env),
                None => self.apply_symbol(name, head.span, args, list.span, env),
            },
            None => match self.eval(head, env)? {
                Value::Lambda(lambda) => self.call_lambda("fn*", &lambda, args, list.span, env),
                _ => Ok(Step::Return(Value::Raw(Rc::clone(list)))),
            },
        }
    }

    fn apply_symbol(
        &mut self,
        name: &str,
        name_span: Span,
        args: &[&Rc<Node>],
        span: Span,
        env: EnvId,
    ) -> EvalResult<Step> {
        match self.envs.get(env, name, name_span)? {
            Value::Function(builtin) => {
                let argv = self.eval_args(args, env)?;
                (builtin.func)(argv, &mut *self.output, span).map(Step::Return)
            }
            Value::Lambda(lambda) => self.call_lambda(name, &lambda, args, span, env),
            value => Ok(Step::Return(value)),
        }
    }

    fn call_lambda(
        &mut self,
        name: &str,
        lambda: &Rc<Lambda>,
        args: &[&Rc<Node>],
        span: Span,
        env: EnvId,
    ) -> EvalResult<Step> {
        // The callee's scope may be reachable only through this value.
        self.held.push(Value::Lambda(Rc::clone(lambda)));
        let argv = self.eval_args(args, env);
        self.held.pop();
        let argv = argv?;
        let arity = AritySpec::of_params(&lambda.params);
        if !arity.accepts(argv.len()) {
            return Err(EvalError::Arity {
                name: name.to_string(),
                expected: arity,
                found: argv.len(),
                span,
            });
        }
        trace!(function = name, args = argv.len(), "tail call");
        let frame = self.envs.bind(lambda.env, &lambda.params, argv);
        Ok(Step::Continue(frame, Rc::clone(&lambda.body)))
    }

    fn eval_args(&mut self, args: &[&Rc<Node>], env: EnvId) -> EvalResult<Vec<Value>> {
        self.eval_each(args.iter().copied(), env)
    }

    // Evaluates `nodes` in order, keeping finished values rooted until all
    // of them are done.
    fn eval_each<'a>(
        &mut self,
        nodes: impl IntoIterator<Item = &'a Rc<Node>>,
        env: EnvId,
    ) -> EvalResult<Vec<Value>> {
        let base = self.held.len();
        for node in nodes {
            match self.eval(node, env) {
                Ok(value) => self.held.push(value),
                Err(error) => {
                    self.held.truncate(base);
                    return Err(error);
                }
            }
        }
        Ok(self.held.split_off(base))
    }

    fn eval_def(&mut self, args: &[&Rc<Node>], span: Span, env: EnvId) -> EvalResult<Step> {
        let [target, value] = args else {
            return Err(EvalError::InvalidSpecialForm(
                "def! expects a symbol and a value".to_string(),
                span,
            ));
        };
        let name = expect_symbol(target, "def!")?;
        let value = self.eval(value, env)?;
        debug!(symbol = name, "def!");
        self.envs.set(env, name, value.clone());
        Ok(Step::Return(value))
    }

    fn eval_let(&mut self, args: &[&Rc<Node>], span: Span, env: EnvId) -> EvalResult<Step> {
        let [bindings, body] = args else {
            return Err(EvalError::InvalidSpecialForm(
                "let* expects bindings and a single body form".to_string(),
                span,
            ));
        };
        let pairs = sequence_forms(bindings, "let*")?;
        if pairs.len() % 2 != 0 {
            return Err(EvalError::InvalidSpecialForm(
                "let* bindings must come in name/value pairs".to_string(),
                bindings.span,
            ));
        }
        // Each binding sees the ones before it. The scope stays rooted while
        // its values are evaluated, since a tail call there moves the nested
        // trampoline off it.
        let scope = self.envs.create(Some(env));
        self.active.push(scope);
        let bound = self.bind_let(scope, &pairs);
        self.active.pop();
        bound?;
        Ok(Step::Continue(scope, Rc::clone(body)))
    }

    fn bind_let(&mut self, scope: EnvId, pairs: &[&Rc<Node>]) -> EvalResult<()> {
        for pair in pairs.chunks(2) {
            let name = expect_symbol(pair[0], "let*")?;
            let value = self.eval(pair[1], scope)?;
            self.envs.set(scope, name, value);
        }
        Ok(())
    }

    fn eval_do(&mut self, args: &[&Rc<Node>], _span: Span, env: EnvId) -> EvalResult<Step> {
        let Some((last, init)) = args.split_last() else {
            return Ok(Step::Return(Value::Nil));
        };
        for form in init {
            self.eval(form, env)?;
        }
        Ok(Step::Continue(env, Rc::clone(last)))
    }

    fn eval_if(&mut self, args: &[&Rc<Node>], span: Span, env: EnvId) -> EvalResult<Step> {
        let (condition, consequent, alternate) = match args {
            [condition, consequent] => (condition, consequent, None),
            [condition, consequent, alternate] => (condition, consequent, Some(alternate)),
            _ => {
                return Err(EvalError::InvalidSpecialForm(
                    "if expects a condition, a consequent and an optional alternate".to_string(),
                    span,
                ));
            }
        };
        if self.eval(condition, env)?.is_truthy() {
            Ok(Step::Continue(env, Rc::clone(consequent)))
        } else if let Some(alternate) = alternate {
            Ok(Step::Continue(env, Rc::clone(alternate)))
        } else {
            Ok(Step::Return(Value::Nil))
        }
    }

    fn eval_fn(&mut self, args: &[&Rc<Node>], span: Span, env: EnvId) -> EvalResult<Step> {
        let [params, body] = args else {
            return Err(EvalError::InvalidSpecialForm(
                "fn* expects parameters and a single body form".to_string(),
                span,
            ));
        };
        let params = sequence_forms(params, "fn*")?
            .into_iter()
            .map(|param| expect_symbol(param, "fn*").map(str::to_string))
            .collect::<EvalResult<Vec<String>>>()?;
        if let Some(marker) = params.iter().position(|p| p == "&") {
            if marker + 2 != params.len() {
                return Err(EvalError::InvalidSpecialForm(
                    "& must be followed by exactly one parameter name".to_string(),
                    span,
                ));
            }
        }
        Ok(Step::Return(Value::Lambda(Rc::new(Lambda {
            params,
            body: Rc::clone(body),
            env,
        }))))
    }
}
