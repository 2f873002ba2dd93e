use crate::evaluator::{AritySpec, EvalError, EvalResult};
use crate::source::Span;
use crate::value::{ArithmeticError, Builtin, Number, Value};
use std::cmp::Ordering;
use std::io::Write;

/// Signature shared by every builtin: evaluated arguments, the output sink
/// for printing builtins, and the span of the call.
pub type BuiltinFn = fn(Vec<Value>, &mut dyn Write, Span) -> EvalResult;

/// The builtins bound in every global environment.
pub const BUILTINS: &[Builtin] = &[
    Builtin::new("+", prim_add),
    Builtin::new("-", prim_sub),
    Builtin::new("*", prim_mul),
    Builtin::new("/", prim_div),
    Builtin::new("<", prim_less_than),
    Builtin::new("<=", prim_less_than_or_equals),
    Builtin::new(">", prim_greater_than),
    Builtin::new(">=", prim_greater_than_or_equals),
    Builtin::new("=", prim_equals),
    Builtin::new("list", prim_list),
    Builtin::new("list?", prim_is_list),
    Builtin::new("empty?", prim_is_empty),
    Builtin::new("count", prim_count),
    Builtin::new("prn", prim_prn),
    Builtin::new("pr-str", prim_pr_str),
    Builtin::new("str", prim_str),
    Builtin::new("println", prim_println),
];

// Checks the number of arguments
macro_rules! check_arity {
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(EvalError::Arity {
                name: $name.to_string(),
                expected: AritySpec::Exact($expected),
                found: $args.len(),
                span: $span,
            });
        }
    };
}

fn expect_number(value: &Value, span: Span, operator: &str) -> EvalResult<Number> {
    value.as_number().ok_or_else(|| EvalError::TypeMismatch {
        operator: operator.to_string(),
        expected: "a number",
        found: value.type_name(),
        span,
    })
}

fn numeric_pair(args: &[Value], span: Span, operator: &str) -> EvalResult<(Number, Number)> {
    check_arity!(args, 2, span, operator);
    Ok((
        expect_number(&args[0], span, operator)?,
        expect_number(&args[1], span, operator)?,
    ))
}

fn arithmetic(
    args: Vec<Value>,
    span: Span,
    operator: &str,
    op: fn(Number, Number) -> Result<Number, ArithmeticError>,
) -> EvalResult {
    let (a, b) = numeric_pair(&args, span, operator)?;
    op(a, b).map(Value::from).map_err(|error| EvalError::Arithmetic {
        operator: operator.to_string(),
        error,
        span,
    })
}

// NaN compares false against everything.
fn compare(args: Vec<Value>, span: Span, operator: &str, test: fn(Ordering) -> bool) -> EvalResult {
    let (a, b) = numeric_pair(&args, span, operator)?;
    Ok(Value::Bool(a.compare(b).is_some_and(test)))
}

fn join(args: &[Value], separator: &str, readable: bool) -> String {
    args.iter()
        .map(|arg| arg.print(readable))
        .collect::<Vec<_>>()
        .join(separator)
}

fn emit_line(out: &mut dyn Write, line: &str, span: Span) -> EvalResult<()> {
    writeln!(out, "{}", line)
        .and_then(|_| out.flush())
        .map_err(|e| EvalError::Output(e.to_string(), span))
}

pub fn prim_add(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    arithmetic(args, span, "+", Number::add)
}

pub fn prim_sub(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    arithmetic(args, span, "-", Number::sub)
}

pub fn prim_mul(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    arithmetic(args, span, "*", Number::mul)
}

/// Integer division truncates; dividing by zero is an error.
pub fn prim_div(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    arithmetic(args, span, "/", Number::div)
}

pub fn prim_less_than(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    compare(args, span, "<", Ordering::is_lt)
}

pub fn prim_less_than_or_equals(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    compare(args, span, "<=", Ordering::is_le)
}

pub fn prim_greater_than(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    compare(args, span, ">", Ordering::is_gt)
}

pub fn prim_greater_than_or_equals(
    args: Vec<Value>,
    _out: &mut dyn Write,
    span: Span,
) -> EvalResult {
    compare(args, span, ">=", Ordering::is_ge)
}

pub fn prim_equals(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "=");
    Ok(Value::Bool(args[0].is_equal(&args[1])))
}

pub fn prim_list(args: Vec<Value>, _out: &mut dyn Write, _span: Span) -> EvalResult {
    Ok(Value::List(args.into_iter().collect()))
}

pub fn prim_is_list(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "list?");
    Ok(Value::Bool(matches!(args[0], Value::List(_))))
}

/// True only for an empty list or vector.
pub fn prim_is_empty(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "empty?");
    Ok(Value::Bool(args[0].sequence_len() == Some(0)))
}

/// Length of a list or vector; 0 for anything else.
pub fn prim_count(args: Vec<Value>, _out: &mut dyn Write, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "count");
    let len = args[0].sequence_len().unwrap_or(0);
    Ok(Value::Int(len as i64))
}

pub fn prim_prn(args: Vec<Value>, out: &mut dyn Write, span: Span) -> EvalResult {
    emit_line(out, &join(&args, " ", true), span)?;
    Ok(Value::Nil)
}

pub fn prim_pr_str(args: Vec<Value>, _out: &mut dyn Write, _span: Span) -> EvalResult {
    Ok(Value::String(join(&args, " ", true)))
}

pub fn prim_str(args: Vec<Value>, _out: &mut dyn Write, _span: Span) -> EvalResult {
    Ok(Value::String(join(&args, "", false)))
}

pub fn prim_println(args: Vec<Value>, out: &mut dyn Write, span: Span) -> EvalResult {
    emit_line(out, &join(&args, " ", false), span)?;
    Ok(Value::Nil)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{List, MapKey};
    use std::io;

    fn call(func: BuiltinFn, args: Vec<Value>) -> EvalResult {
        func(args, &mut io::sink(), Span::default())
    }

    fn string(s: &str) -> Value {
        Value::String(s.to_string())
    }

    fn list(values: Vec<Value>) -> Value {
        Value::List(values.into_iter().collect())
    }

    #[test]
    fn test_builtin_table_names_are_unique() {
        let mut names: Vec<&str> = BUILTINS.iter().map(|b| b.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), BUILTINS.len());
        assert_eq!(BUILTINS.len(), 17);
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(call(prim_add, vec![Value::Int(1), Value::Int(2)]), Ok(Value::Int(3)));
        assert_eq!(call(prim_sub, vec![Value::Int(1), Value::Int(5)]), Ok(Value::Int(-4)));
        assert_eq!(call(prim_mul, vec![Value::Int(6), Value::Int(7)]), Ok(Value::Int(42)));
        assert_eq!(call(prim_div, vec![Value::Int(7), Value::Int(2)]), Ok(Value::Int(3)));
        assert_eq!(call(prim_div, vec![Value::Int(-7), Value::Int(2)]), Ok(Value::Int(-3)));
        assert!(matches!(
            call(prim_div, vec![Value::Int(7), Value::Float(2.0)]),
            Ok(Value::Float(f)) if f == 3.5
        ));
        assert!(matches!(
            call(prim_add, vec![Value::Float(0.5), Value::Int(2)]),
            Ok(Value::Float(f)) if f == 2.5
        ));
    }

    #[test]
    fn test_arithmetic_errors() {
        assert!(matches!(
            call(prim_div, vec![Value::Int(1), Value::Int(0)]),
            Err(EvalError::Arithmetic { error: ArithmeticError::DivisionByZero, .. })
        ));
        assert!(matches!(
            call(prim_div, vec![Value::Float(1.0), Value::Float(0.0)]),
            Err(EvalError::Arithmetic { error: ArithmeticError::DivisionByZero, .. })
        ));
        assert!(matches!(
            call(prim_mul, vec![Value::Int(i64::MAX), Value::Int(2)]),
            Err(EvalError::Arithmetic { error: ArithmeticError::Overflow, .. })
        ));
        assert!(matches!(
            call(prim_add, vec![Value::Int(1), string("2")]),
            Err(EvalError::TypeMismatch { found: "string", .. })
        ));
        assert!(matches!(
            call(prim_add, vec![Value::Int(1)]),
            Err(EvalError::Arity { expected: AritySpec::Exact(2), found: 1, .. })
        ));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call(prim_less_than, vec![Value::Int(1), Value::Int(2)]), Ok(Value::Bool(true)));
        assert_eq!(
            call(prim_less_than_or_equals, vec![Value::Int(2), Value::Float(2.0)]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            call(prim_greater_than, vec![Value::Float(2.5), Value::Int(2)]),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            call(prim_greater_than_or_equals, vec![Value::Int(1), Value::Int(2)]),
            Ok(Value::Bool(false))
        );
        assert_eq!(
            call(prim_less_than, vec![Value::Float(f64::NAN), Value::Int(2)]),
            Ok(Value::Bool(false))
        );
        assert!(matches!(
            call(prim_less_than, vec![Value::Nil, Value::Int(2)]),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_equals() {
        let eq = |a, b| call(prim_equals, vec![a, b]);
        assert_eq!(eq(Value::Int(1), Value::Int(1)), Ok(Value::Bool(true)));
        assert_eq!(eq(Value::Int(1), Value::Float(1.0)), Ok(Value::Bool(false)));
        assert_eq!(eq(string("a"), Value::Keyword("a".into())), Ok(Value::Bool(false)));
        assert_eq!(
            eq(
                list(vec![Value::Int(1), Value::Int(2)]),
                Value::Vector(vec![Value::Int(1), Value::Int(2)])
            ),
            Ok(Value::Bool(true))
        );
        assert_eq!(eq(Value::Nil, Value::Nil), Ok(Value::Bool(true)));
    }

    #[test]
    fn test_list_predicates() {
        assert_eq!(
            call(prim_list, vec![Value::Int(1), Value::Int(2)]).map(|v| v.to_string()),
            Ok("(1 2)".to_string())
        );
        assert_eq!(call(prim_is_list, vec![Value::List(List::new())]), Ok(Value::Bool(true)));
        assert_eq!(call(prim_is_list, vec![Value::Vector(vec![])]), Ok(Value::Bool(false)));
        assert_eq!(call(prim_is_empty, vec![Value::List(List::new())]), Ok(Value::Bool(true)));
        assert_eq!(call(prim_is_empty, vec![Value::Vector(vec![])]), Ok(Value::Bool(true)));
        assert_eq!(call(prim_is_empty, vec![list(vec![Value::Nil])]), Ok(Value::Bool(false)));
        assert_eq!(call(prim_is_empty, vec![Value::Nil]), Ok(Value::Bool(false)));
    }

    #[test]
    fn test_count() {
        assert_eq!(call(prim_count, vec![list(vec![Value::Nil, Value::Nil])]), Ok(Value::Int(2)));
        assert_eq!(call(prim_count, vec![Value::Vector(vec![Value::Nil])]), Ok(Value::Int(1)));
        assert_eq!(call(prim_count, vec![Value::Nil]), Ok(Value::Int(0)));
        let map = Value::Map([(MapKey::Keyword("a".into()), Value::Int(1))].into_iter().collect());
        assert_eq!(call(prim_count, vec![map]), Ok(Value::Int(0)));
        assert!(matches!(call(prim_count, vec![]), Err(EvalError::Arity { .. })));
    }

    #[test]
    fn test_string_builtins() {
        let args = || vec![string("a\"b"), Value::Int(1), Value::Keyword("k".into())];
        assert_eq!(call(prim_pr_str, args()), Ok(string(r#""a\"b" 1 :k"#)));
        assert_eq!(call(prim_str, args()), Ok(string("a\"b1:k")));
        assert_eq!(call(prim_str, vec![string("a"), string("b")]), Ok(string("ab")));
        assert_eq!(call(prim_str, vec![]), Ok(string("")));
        assert_eq!(call(prim_pr_str, vec![]), Ok(string("")));
    }

    #[test]
    fn test_printing_builtins() {
        let mut out = Vec::new();
        let result = prim_prn(vec![string("x"), Value::Nil], &mut out, Span::default());
        assert_eq!(result, Ok(Value::Nil));
        let result = prim_println(vec![string("x"), Value::Nil], &mut out, Span::default());
        assert_eq!(result, Ok(Value::Nil));
        prim_prn(vec![], &mut out, Span::default()).ok();
        assert_eq!(String::from_utf8(out).unwrap(), "\"x\" nil\nx nil\n\n");
    }

    #[test]
    fn test_write_failure_is_an_error() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        assert!(matches!(
            prim_println(vec![Value::Nil], &mut Broken, Span::default()),
            Err(EvalError::Output(_, _))
        ));
    }
}
