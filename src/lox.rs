//! One interpreter session: source text in, output and diagnostics out.
//!
//! A session keeps a single [`Interpreter`] alive across runs, so globals
//! defined by one prompt line are visible to the next.

use std::io::{self, Stdout, Write};
use std::panic;
use std::thread;

use log::{debug, info};

use crate::error::{Diagnostics, Result};
use crate::interpreter::Interpreter;
use crate::parser::Parser;
use crate::resolver::Resolver;
use crate::scanner::Scanner;
use crate::stmt::Stmt;
use crate::token::Token;

/// Stack reserved for the thread that executes Lox code.
///
/// Each nested Lox call costs a handful of recursive `execute`/`evaluate`
/// frames; at [`DEFAULT_MAX_CALL_DEPTH`](crate::interpreter::DEFAULT_MAX_CALL_DEPTH)
/// this leaves over 100 KiB per call.
pub const INTERPRETER_STACK_SIZE: usize = 128 * 1024 * 1024;

/// Run `f` on a dedicated thread with [`INTERPRETER_STACK_SIZE`] bytes of
/// stack and wait for its result.  A panic in `f` is re-raised here.
pub fn on_interpreter_stack<F, T>(f: F) -> io::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    debug!("Spawning interpreter thread with {} byte stack", INTERPRETER_STACK_SIZE);

    let handle = thread::Builder::new()
        .name("lox-interpreter".to_string())
        .stack_size(INTERPRETER_STACK_SIZE)
        .spawn(f)?;

    match handle.join() {
        Ok(value) => Ok(value),
        Err(payload) => panic::resume_unwind(payload),
    }
}

/// Check that raw source bytes are UTF‑8 and borrow them as text.
pub fn decode_source(bytes: &[u8]) -> Result<&str> {
    Ok(std::str::from_utf8(bytes)?)
}

pub struct Lox<W: Write = Stdout> {
    interpreter: Interpreter<W>,
}

impl Lox<Stdout> {
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Lox<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Lox<W> {
    pub fn with_output(out: W) -> Self {
        Self::with_interpreter(Interpreter::with_output(out))
    }

    pub fn with_interpreter(interpreter: Interpreter<W>) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Interpreter<W> {
        &self.interpreter
    }

    /// Scan, parse, resolve and execute `source`.
    ///
    /// Static errors stop the run before anything executes; a runtime error
    /// stops it at the failing statement.  Either way the returned
    /// diagnostics say what happened.
    pub fn run(&mut self, source: &str) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        let tokens: Vec<Token> = Scanner::new(source).scan_tokens(&mut diagnostics);
        let statements: Vec<Stmt> = Parser::new(tokens).parse(&mut diagnostics);

        if diagnostics.had_error() {
            info!("Syntax errors; skipping execution");
            return diagnostics;
        }

        let locals = Resolver::new().resolve(&statements, &mut diagnostics);

        if diagnostics.had_error() {
            info!("Resolution errors; skipping execution");
            return diagnostics;
        }

        self.interpreter.resolve(locals);

        if let Err(e) = self.interpreter.interpret(&statements) {
            debug!("Runtime debug: {}", e);
            diagnostics.report(e);
        }

        diagnostics
    }
}
