//! Property-based tests for canonical printing and integer division.

use malrs::{Interpreter, Value, parse_str};
use proptest::prelude::*;
use std::io;

#[derive(Debug, Clone)]
enum Form {
    Int(i64),
    Symbol(String),
    List(Vec<Form>),
    Vector(Vec<Form>),
}

fn arb_form() -> impl Strategy<Value = Form> {
    let leaf = prop_oneof![
        any::<i64>().prop_map(Form::Int),
        "[a-z][a-z0-9*+!?-]{0,6}".prop_map(Form::Symbol),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Form::List),
            prop::collection::vec(inner, 0..4).prop_map(Form::Vector),
        ]
    })
}

/// Whitespace the reader must ignore; commas included.
fn arb_gap() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just(" "), Just("  "), Just("\n"), Just(", "), Just("\t")]
}

// `pad` goes inside the delimiters, `sep` between siblings.
fn render(form: &Form, sep: &str, pad: &str) -> String {
    let children = |items: &[Form]| {
        items
            .iter()
            .map(|item| render(item, sep, pad))
            .collect::<Vec<_>>()
            .join(sep)
    };
    match form {
        Form::Int(i) => i.to_string(),
        Form::Symbol(s) => s.clone(),
        Form::List(items) => format!("({}{}{})", pad, children(items), pad),
        Form::Vector(items) => format!("[{}{}{}]", pad, children(items), pad),
    }
}

fn eval(source: &str) -> Value {
    let mut interpreter = Interpreter::with_output(Box::new(io::sink()));
    let mut values = interpreter
        .rep(source)
        .unwrap_or_else(|e| panic!("evaluation of '{}' failed: {}", source, e));
    values.pop().unwrap_or(Value::Nil)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Extra whitespace never survives a parse/print round.
    #[test]
    fn printing_is_canonical(form in arb_form(), sep in arb_gap(), pad in arb_gap()) {
        let source = render(&form, sep, pad);
        let program = parse_str(&source).unwrap();
        prop_assert_eq!(program.to_string(), render(&form, " ", ""));
    }

    /// Int / Int truncates toward zero and stays an Int.
    #[test]
    fn integer_division_truncates(a in -1_000_000i64..1_000_000, b in prop_oneof![-1000i64..=-1, 1i64..=1000]) {
        let result = eval(&format!("(/ {} {})", a, b));
        prop_assert_eq!(result, Value::Int(a / b));
    }

    /// A float literal on either side promotes the quotient.
    #[test]
    fn float_operand_promotes_division(a in -1000i64..1000, b in 1i64..1000, left in any::<bool>()) {
        let source = if left {
            format!("(/ {}.0 {})", a, b)
        } else {
            format!("(/ {} {}.0)", a, b)
        };
        let result = eval(&source);
        prop_assert!(matches!(result, Value::Float(_)), "Expected Float for {}", source);
    }
}
