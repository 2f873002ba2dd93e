use crate::ast::{Node, escape};
use crate::environment::EnvId;
use crate::primitives::BuiltinFn;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Keyword(String), // Without the leading ':'
    List(List),
    Vector(Vec<Value>),
    Map(BTreeMap<MapKey, Value>),
    Function(Builtin),
    Lambda(Rc<Lambda>),
    Raw(Rc<Node>), // Unevaluated syntax handed back by the evaluator
}

#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl Builtin {
    pub const fn new(name: &'static str, func: BuiltinFn) -> Self {
        Builtin { name, func }
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

/// A user function. The captured environment is shared, so later `def!`s in
/// it are visible to the body.
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>, // May contain the variadic marker "&"
    pub body: Rc<Node>,
    pub env: EnvId,
}

/// Map keys are restricted to strings and keywords.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    String(String),
    Keyword(String),
}

impl TryFrom<Value> for MapKey {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(MapKey::String(s)),
            Value::Keyword(k) => Ok(MapKey::Keyword(k)),
            other => Err(other),
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Self {
        match key {
            MapKey::String(s) => Value::String(s),
            MapKey::Keyword(k) => Value::Keyword(k),
        }
    }
}

// --- Persistent list ---

struct Cons {
    value: Value,
    next: Option<Rc<Cons>>,
}

/// Persistent singly-linked list. `cons` shares the tail.
#[derive(Clone, Default)]
pub struct List {
    head: Option<Rc<Cons>>,
    len: usize,
}

impl List {
    pub fn new() -> Self {
        List::default()
    }

    pub fn cons(&self, value: Value) -> List {
        List {
            head: Some(Rc::new(Cons {
                value,
                next: self.head.clone(),
            })),
            len: self.len + 1,
        }
    }

    pub fn first(&self) -> Option<&Value> {
        self.head.as_deref().map(|cell| &cell.value)
    }

    pub fn rest(&self) -> List {
        match self.head.as_deref() {
            Some(cell) => List {
                head: cell.next.clone(),
                len: self.len - 1,
            },
            None => List::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> ListIter<'_> {
        ListIter {
            next: self.head.as_deref(),
        }
    }
}

// Unlinks cells one at a time so long lists don't recurse on drop.
impl Drop for List {
    fn drop(&mut self) {
        let mut next = self.head.take();
        while let Some(cell) = next {
            match Rc::try_unwrap(cell) {
                Ok(mut cell) => next = cell.next.take(),
                Err(_) => break,
            }
        }
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let items: Vec<Value> = iter.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(List::new(), |list, value| list.cons(value))
    }
}

impl fmt::Debug for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

pub struct ListIter<'a> {
    next: Option<&'a Cons>,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|cell| {
            self.next = cell.next.as_deref();
            &cell.value
        })
    }
}

// --- Numbers ---

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArithmeticError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow")]
    Overflow,
}

impl Number {
    // Ints stay ints; anything involving a float is computed in floats.
    fn combine(
        self,
        other: Number,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Number, ArithmeticError> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => {
                int_op(a, b).map(Number::Int).ok_or(ArithmeticError::Overflow)
            }
            (a, b) => Ok(Number::Float(float_op(a.as_f64(), b.as_f64()))),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn add(self, other: Number) -> Result<Number, ArithmeticError> {
        self.combine(other, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, other: Number) -> Result<Number, ArithmeticError> {
        self.combine(other, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, other: Number) -> Result<Number, ArithmeticError> {
        self.combine(other, i64::checked_mul, |a, b| a * b)
    }

    /// Integer division truncates toward zero. A zero divisor is an error for
    /// both ints and floats.
    pub fn div(self, other: Number) -> Result<Number, ArithmeticError> {
        if other.is_zero() {
            return Err(ArithmeticError::DivisionByZero);
        }
        self.combine(other, i64::checked_div, |a, b| a / b)
    }

    /// `None` when either side is NaN.
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<Number> for Value {
    fn from(number: Number) -> Self {
        match number {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

// --- Value behaviour ---

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Keyword(_) => "keyword",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Map(_) => "map",
            Value::Function(_) => "function",
            Value::Lambda(_) => "lambda",
            Value::Raw(_) => "raw form",
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Int(i) => Some(Number::Int(*i)),
            Value::Float(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }

    /// Everything is true except `nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Elements of a list or vector.
    pub fn sequence_len(&self) -> Option<usize> {
        match self {
            Value::List(list) => Some(list.len()),
            Value::Vector(items) => Some(items.len()),
            _ => None,
        }
    }

    /// Structural equality. Ints never equal floats, lists and vectors compare
    /// element-wise, functions equal nothing.
    pub fn is_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Keyword(a), Value::Keyword(b)) => a == b,
            (Value::List(a), Value::List(b)) => sequence_equal(a.iter(), a.len(), b.iter(), b.len()),
            (Value::List(a), Value::Vector(b)) => sequence_equal(a.iter(), a.len(), b.iter(), b.len()),
            (Value::Vector(a), Value::List(b)) => sequence_equal(a.iter(), a.len(), b.iter(), b.len()),
            (Value::Vector(a), Value::Vector(b)) => sequence_equal(a.iter(), a.len(), b.iter(), b.len()),
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(key, value)| b.get(key).is_some_and(|other| value.is_equal(other)))
            }
            (Value::Raw(a), Value::Raw(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Renders the value. Readable mode quotes and escapes strings.
    pub fn print(&self, readable: bool) -> String {
        let mut out = String::new();
        self.write_to(&mut out, readable);
        out
    }

    fn write_to(&self, out: &mut String, readable: bool) {
        match self {
            Value::Nil => out.push_str("nil"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Int(i) => out.push_str(&i.to_string()),
            // Debug keeps a fractional part: 3.0, 2.5
            Value::Float(f) => out.push_str(&format!("{:?}", f)),
            Value::String(s) if readable => {
                out.push('"');
                out.push_str(&escape(s));
                out.push('"');
            }
            Value::String(s) => out.push_str(s),
            Value::Keyword(k) => {
                out.push(':');
                out.push_str(k);
            }
            Value::List(list) => write_sequence(out, "(", list.iter(), ")", readable),
            Value::Vector(items) => write_sequence(out, "[", items.iter(), "]", readable),
            Value::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                    }
                    Value::from(key.clone()).write_to(out, readable);
                    out.push(' ');
                    value.write_to(out, readable);
                }
                out.push('}');
            }
            Value::Function(builtin) => out.push_str(&format!("#<function {}>", builtin.name)),
            Value::Lambda(_) => out.push_str("#<function>"),
            Value::Raw(node) => out.push_str(&node.to_string()),
        }
    }

    /// Pushes every environment reachable from this value (closures, possibly
    /// nested in collections).
    pub fn captured_envs(&self, out: &mut Vec<EnvId>) {
        match self {
            Value::Lambda(lambda) => out.push(lambda.env),
            Value::List(list) => list.iter().for_each(|v| v.captured_envs(out)),
            Value::Vector(items) => items.iter().for_each(|v| v.captured_envs(out)),
            Value::Map(map) => map.values().for_each(|v| v.captured_envs(out)),
            _ => {}
        }
    }
}

fn sequence_equal<'a>(
    a: impl Iterator<Item = &'a Value>,
    a_len: usize,
    b: impl Iterator<Item = &'a Value>,
    b_len: usize,
) -> bool {
    a_len == b_len && a.zip(b).all(|(x, y)| x.is_equal(y))
}

fn write_sequence<'a>(
    out: &mut String,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
    readable: bool,
) {
    out.push_str(open);
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push(' ');
        }
        item.write_to(out, readable);
    }
    out.push_str(close);
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.print(true))
    }
}
