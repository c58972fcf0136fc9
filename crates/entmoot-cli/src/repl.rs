//! Line-oriented interactive loop.
//!
//! Each line is one JSON-encoded `Interactive` unit evaluated in the
//! thread's `__main__` module; results other than `None` are echoed.

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use entmoot::ast::Interactive;
use entmoot::{repr, EvalError, ThreadContext, Value};

const PROMPT: &str = ">>> ";

/// Read and evaluate lines until end of input.
pub fn run(thread: &mut ThreadContext<'_>) -> Result<()> {
    let mut editor = DefaultEditor::new().context("cannot start the line editor")?;
    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                eprintln!("KeyboardInterrupt");
                continue;
            }
            Err(ReadlineError::Eof) => return Ok(()),
            Err(error) => return Err(error).context("reading input failed"),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line);

        let unit: Interactive = match serde_json::from_str(line) {
            Ok(unit) => unit,
            Err(error) => {
                eprintln!("SyntaxError: {}", error);
                continue;
            }
        };
        // a Ctrl-C that arrived while idle is not meant for this unit
        let _ = thread.process_interrupts();
        match thread.evaluate(unit) {
            Ok(value) => {
                if !matches!(value.value(), Value::None) {
                    println!("{}", repr(&value));
                }
            }
            Err(EvalError::Exception(exception)) => eprint!("{}", exception.report()),
            Err(error) => return Err(error.into()),
        }
    }
}
