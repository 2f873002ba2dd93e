use malrs::Interpreter;
use std::io::{self, BufRead, IsTerminal, Write};

// Line-at-a-time driver: every line is a complete program evaluated against
// the same globals. Errors are reported and the loop carries on.
fn main() -> io::Result<()> {
    malrs::init_logging();

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut lines = stdin.lock().lines();
    let mut interpreter = Interpreter::new();

    loop {
        if interactive {
            print!("user> ");
            io::stdout().flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        match interpreter.rep(&line?) {
            Ok(values) => {
                for value in values {
                    println!("{}", value);
                }
            }
            Err(error) => eprintln!("ERR: {}", error),
        }
    }
    Ok(())
}
