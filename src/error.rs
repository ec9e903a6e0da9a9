//! Centralised error hierarchy for the **Lox interpreter**.
//!
//! All subsystems (scanner, parser, resolver, runtime) convert their internal
//! failure modes into one of the variants defined here.  Static errors are
//! collected in a [`Diagnostics`] value that is threaded through each phase,
//! so the driver can decide afterwards which exit code a run maps to.
//!
//! The module **does not** print diagnostics itself

use std::io::{self, Write};
use std::str::Utf8Error;
use thiserror::Error;

use log::info;

use crate::token::{Token, TokenType};

/// Canonical error type used throughout the interpreter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoxError {
    /// Lexical (scanner) error with source line information.
    #[error("[line {line}] Error: {message}")]
    Lex {
        /// Human‑readable description.
        message: String,

        /// 1‑based line where the error occurred.
        line: usize,
    },

    /// Syntactic (parser) error.  `location` is either `" at 'lexeme'"`,
    /// `" at end"` or empty.
    #[error("[line {line}] Error{location}: {message}")]
    Parse {
        message: String,
        location: String,
        line: usize,
    },

    /// Static‑analysis or resolution failure (e.g. self‑referential initializer).
    #[error("[line {line}] Error{location}: {message}")]
    Resolve {
        message: String,
        location: String,
        line: usize,
    },

    /// Runtime evaluation error, located by the offending token's line.
    #[error("{message}\n[line {line}]")]
    Runtime { message: String, line: usize },

    /// Wrapper around `std::io::Error` (transparent).  Enables `?` on I/O ops.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// Source bytes that are not valid UTF‑8.
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
}

/// Formats the `" at 'x'"` / `" at end"` suffix for token-located errors.
fn location_of(token: &Token) -> String {
    if token.token_type == TokenType::EOF {
        " at end".to_string()
    } else {
        format!(" at '{}'", token.lexeme)
    }
}

impl LoxError {
    /// Helper constructor for the **scanner**.
    pub fn lex<S: Into<String>>(line: usize, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Lex error: line={}, msg={}", line, message);

        LoxError::Lex { message, line }
    }

    /// Helper constructor for the **parser**.
    pub fn parse<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Parse error: line={}, msg={}", token.line, message);

        LoxError::Parse {
            message,
            location: location_of(token),
            line: token.line,
        }
    }

    /// Helper constructor for the **resolver**.
    pub fn resolve<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Resolve error: line={}, msg={}", token.line, message);

        LoxError::Resolve {
            message,
            location: location_of(token),
            line: token.line,
        }
    }

    /// Helper constructor for the **interpreter**.
    pub fn runtime<S: Into<String>>(token: &Token, msg: S) -> Self {
        let message: String = msg.into();

        info!("Creating Runtime error: line={}, msg={}", token.line, message);

        LoxError::Runtime {
            message,
            line: token.line,
        }
    }

    /// `true` for scan, parse and resolve errors, which suppress execution.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            LoxError::Lex { .. } | LoxError::Parse { .. } | LoxError::Resolve { .. }
        )
    }
}

/// Crate‑wide `Result` alias.
pub type Result<T> = std::result::Result<T, LoxError>;

/// Accumulates every error reported during one run.
///
/// Each phase appends to it; the driver inspects [`had_error`](Self::had_error)
/// and [`had_runtime_error`](Self::had_runtime_error) afterwards.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<LoxError>,
    had_error: bool,
    had_runtime_error: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error and raise the matching flag.
    pub fn report(&mut self, error: LoxError) {
        if error.is_static() {
            self.had_error = true;
        } else {
            self.had_runtime_error = true;
        }

        self.errors.push(error);
    }

    /// Report a `(line, message)` error, as the scanner does.
    pub fn error_at_line<S: Into<String>>(&mut self, line: usize, msg: S) {
        self.report(LoxError::lex(line, msg));
    }

    /// Report a `(token, message)` syntax error.
    pub fn error_at_token<S: Into<String>>(&mut self, token: &Token, msg: S) {
        self.report(LoxError::parse(token, msg));
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn had_runtime_error(&self) -> bool {
        self.had_runtime_error
    }

    pub fn errors(&self) -> &[LoxError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Print every error: runtime errors go to `out` alongside program
    /// output, static errors go to `err`.
    pub fn write_to<O: Write, E: Write>(&self, out: &mut O, err: &mut E) -> io::Result<()> {
        for error in &self.errors {
            if error.is_static() {
                writeln!(err, "{}", error)?;
            } else {
                writeln!(out, "{}", error)?;
            }
        }

        out.flush()?;
        err.flush()
    }
}

impl Extend<LoxError> for Diagnostics {
    fn extend<I: IntoIterator<Item = LoxError>>(&mut self, iter: I) {
        for error in iter {
            self.report(error);
        }
    }
}
