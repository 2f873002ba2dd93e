use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use malrs::{Interpreter, parse_str, tokenize};
use std::io;

const DEFINITIONS: &str = r#"
; Calculate the nth Fibonacci number
(def! fib (fn* (n)
  (if (< n 2)
      n
      (+ (fib (- n 1))
         (fib (- n 2))))))

(def! sum-to (fn* (n acc)
  (if (= n 0) acc (sum-to (- n 1) (+ acc n)))))

(def! describe (fn* (& xs)
  (str "items: " (count xs) " " (pr-str xs))))
"#;

const BENCH_INPUT: &str = r#"
(fib 15)
(sum-to 5000 0)
(describe "string with escapes \"\n\t\"" :kw 123 45.67 -10 [1 2 {:a 1}])
(let* [a 1 b (+ a 1) c (* b 2.5)] (list a b c))
(= (list 1 2 3) [1 2 3])
"#;

fn bench_interpreter(c: &mut Criterion) {
    let mut group = c.benchmark_group("Interpreter");

    group.bench_with_input(
        BenchmarkId::new("tokenize", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| tokenize(black_box(input))),
    );

    group.bench_with_input(
        BenchmarkId::new("parse", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| parse_str(black_box(input))),
    );

    let mut interpreter = Interpreter::with_output(Box::new(io::sink()));
    if let Err(error) = interpreter.rep(DEFINITIONS) {
        panic!("benchmark definitions failed: {}", error);
    }
    group.bench_with_input(
        BenchmarkId::new("rep", "program"),
        &BENCH_INPUT,
        |b, input| b.iter(|| interpreter.rep(black_box(input))),
    );

    group.finish();
}

criterion_group!(benches, bench_interpreter);
criterion_main!(benches);
