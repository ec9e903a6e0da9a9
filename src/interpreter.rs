//! Tree-walking evaluator.
//!
//! Statements run against a chain of [`Environment`] frames.  The current
//! frame is swapped on block entry and function calls and always restored
//! on the way out, including when an error or a `return` passes through.
//! `return` travels as [`Flow::Return`] in the `Ok` channel; only real
//! runtime errors use `Err`.

use std::io::{self, Stdout, Write};
use std::mem;
use std::rc::Rc;

use chrono::Utc;
use log::{debug, error, info};

use crate::environment::{EnvRef, Environment};
use crate::error::{LoxError, Result};
use crate::expr::{Expr, ExprId, LiteralValue};
use crate::resolver::Locals;
use crate::stmt::Stmt;
use crate::token::{Token, TokenType};
use crate::value::{Callable, LoxFunction, NativeFunction, Value};

/// Nesting limit for calls to user functions.  Sized so that a program run
/// through [`on_interpreter_stack`](crate::lox::on_interpreter_stack) hits
/// this limit long before the thread's stack runs out.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// How a statement finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal,

    /// A `return` unwinding to the nearest function call.
    Return(Value),
}

pub struct Interpreter<W: Write = Stdout> {
    globals: EnvRef,
    environment: EnvRef,
    locals: Locals,
    out: W,
    call_depth: usize,
    max_call_depth: usize,
    dynamic_lookup: bool,
}

impl Interpreter<Stdout> {
    /// An interpreter printing to standard output.
    pub fn new() -> Self {
        Self::with_output(io::stdout())
    }
}

impl Default for Interpreter<Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

/// Native `clock()`: seconds since the Unix epoch.
fn clock(_args: &[Value]) -> std::result::Result<Value, String> {
    let micros: i64 = Utc::now().timestamp_micros();

    Ok(Value::Number(micros as f64 / 1_000_000.0))
}

impl<W: Write> Interpreter<W> {
    /// Creates a new Interpreter writing `print` output to `out`, with the
    /// native functions already defined in the globals.
    pub fn with_output(out: W) -> Self {
        info!("Initializing Interpreter");

        let globals: EnvRef = Environment::new().into_ref();

        debug!("Defining native function 'clock'");

        globals.borrow_mut().define(
            "clock",
            Value::Callable(Callable::Native(Rc::new(NativeFunction {
                name: "clock",
                arity: 0,
                func: clock,
            }))),
        );

        Self {
            environment: Rc::clone(&globals),
            globals,
            locals: Locals::new(),
            out,
            call_depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            dynamic_lookup: false,
        }
    }

    /// Calls nested deeper than `depth` fail with `Stack overflow.`.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Look unresolved names up through the current environment chain instead
    /// of the globals.  This is what running without the resolver means.
    pub fn with_dynamic_lookup(mut self) -> Self {
        self.dynamic_lookup = true;
        self
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn globals(&self) -> &EnvRef {
        &self.globals
    }

    /// Merge binding distances produced by the resolver.
    ///
    /// Entries are never removed: closures defined on earlier prompt lines
    /// keep their syntax nodes alive and still look them up.
    pub fn resolve(&mut self, locals: Locals) {
        debug!("Recording {} resolved locals", locals.len());

        self.locals.extend(locals);
    }

    /// Interprets a list of statements (a "program").  The first runtime error
    /// aborts the rest of the run.
    pub fn interpret(&mut self, statements: &[Stmt]) -> Result<()> {
        debug!("Interpreting {} statements", statements.len());

        let result: Result<Flow> = self.execute_all(statements);
        self.out.flush()?;

        match result? {
            Flow::Normal => info!("Interpretation completed successfully"),
            Flow::Return(value) => info!("Top-level return with {}", value),
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Statements
    // ─────────────────────────────────────────────────────────────────────────

    fn execute_all(&mut self, statements: &[Stmt]) -> Result<Flow> {
        for stmt in statements {
            if let Flow::Return(value) = self.execute(stmt)? {
                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Normal)
    }

    /// Executes a single statement.
    pub fn execute(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Expression(expr) => {
                self.evaluate(expr)?;
            }

            Stmt::Print(expr) => {
                let value: Value = self.evaluate(expr)?;
                writeln!(self.out, "{}", value)?;
            }

            Stmt::Var { name, initializer } => {
                let value: Value = match initializer {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Defining variable '{}' = {}", name.lexeme, value);

                self.environment.borrow_mut().define(&name.lexeme, value);
            }

            Stmt::Block(statements) => {
                let env: EnvRef =
                    Environment::with_enclosing(Rc::clone(&self.environment)).into_ref();

                return self.execute_block(statements, env);
            }

            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    return self.execute(then_branch);
                } else if let Some(else_stmt) = else_branch {
                    return self.execute(else_stmt);
                }
            }

            Stmt::While { condition, body } => {
                while self.evaluate(condition)?.is_truthy() {
                    if let Flow::Return(value) = self.execute(body)? {
                        return Ok(Flow::Return(value));
                    }
                }
            }

            Stmt::Function(decl) => {
                debug!("Defining function '{}'", decl.name.lexeme);

                // Capture the *current* environment, not the globals.
                let function = LoxFunction {
                    declaration: Rc::clone(decl),
                    closure: Rc::clone(&self.environment),
                };

                self.environment.borrow_mut().define(
                    &decl.name.lexeme,
                    Value::Callable(Callable::Function(Rc::new(function))),
                );
            }

            Stmt::Return { value, .. } => {
                let value: Value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::Nil,
                };

                debug!("Returning value: {}", value);

                return Ok(Flow::Return(value));
            }
        }

        Ok(Flow::Normal)
    }

    /// Run `statements` with `env` as the current environment, then put the
    /// previous environment back whatever the outcome.
    pub fn execute_block(&mut self, statements: &[Stmt], env: EnvRef) -> Result<Flow> {
        let previous: EnvRef = mem::replace(&mut self.environment, env);
        let result: Result<Flow> = self.execute_all(statements);
        self.environment = previous;

        result
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Expressions
    // ─────────────────────────────────────────────────────────────────────────

    /// Evaluates an expression and returns a Value.
    pub fn evaluate(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),

            Expr::Grouping(inner) => self.evaluate(inner),

            Expr::Logical {
                left,
                operator,
                right,
            } => {
                let left_val: Value = self.evaluate(left)?;

                let short_circuit: bool = if operator.token_type == TokenType::OR {
                    left_val.is_truthy()
                } else {
                    !left_val.is_truthy()
                };

                if short_circuit {
                    Ok(left_val)
                } else {
                    self.evaluate(right)
                }
            }

            Expr::Unary { operator, right } => {
                let right_val: Value = self.evaluate(right)?;
                evaluate_unary(operator, right_val)
            }

            Expr::Binary {
                left,
                operator,
                right,
            } => {
                let left_val: Value = self.evaluate(left)?;
                let right_val: Value = self.evaluate(right)?;
                evaluate_binary(operator, left_val, right_val)
            }

            Expr::Variable { id, name } => self.look_up_variable(*id, name),

            Expr::Assign { id, name, value } => {
                let value: Value = self.evaluate(value)?;
                self.assign_variable(*id, name, value.clone())?;

                Ok(value)
            }

            Expr::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee_val: Value = self.evaluate(callee)?;

                let args: Vec<Value> = arguments
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<Value>>>()?;

                let Value::Callable(callable) = callee_val else {
                    return Err(LoxError::runtime(paren, "Can only call functions."));
                };

                self.call(&callable, paren, args)
            }
        }
    }

    fn look_up_variable(&self, id: ExprId, name: &Token) -> Result<Value> {
        match self.locals.get(&id) {
            Some(&distance) => Environment::get_at(&self.environment, distance, &name.lexeme)
                .ok_or_else(|| resolver_mismatch(name)),
            None if self.dynamic_lookup => self.environment.borrow().get(name),
            None => self.globals.borrow().get(name),
        }
    }

    fn assign_variable(&mut self, id: ExprId, name: &Token, value: Value) -> Result<()> {
        match self.locals.get(&id) {
            Some(&distance) => {
                if Environment::assign_at(&self.environment, distance, &name.lexeme, value) {
                    Ok(())
                } else {
                    Err(resolver_mismatch(name))
                }
            }
            None if self.dynamic_lookup => self.environment.borrow_mut().assign(name, value),
            None => self.globals.borrow_mut().assign(name, value),
        }
    }

    /// Invokes a callable (native or user-defined function).
    fn call(&mut self, callable: &Callable, paren: &Token, args: Vec<Value>) -> Result<Value> {
        if args.len() != callable.arity() {
            return Err(LoxError::runtime(
                paren,
                format!(
                    "Expected {} arguments but got {}.",
                    callable.arity(),
                    args.len()
                ),
            ));
        }

        debug!("Calling '{}' with {} argument(s)", callable.name(), args.len());

        match callable {
            Callable::Native(native) => {
                (native.func)(&args).map_err(|msg| LoxError::runtime(paren, msg))
            }

            Callable::Function(function) => {
                if self.call_depth >= self.max_call_depth {
                    return Err(LoxError::runtime(paren, "Stack overflow."));
                }

                let mut env = Environment::with_enclosing(Rc::clone(&function.closure));

                for (param, arg) in function.declaration.params.iter().zip(args) {
                    env.define(&param.lexeme, arg);
                }

                self.call_depth += 1;
                let result: Result<Flow> =
                    self.execute_block(&function.declaration.body, env.into_ref());
                self.call_depth -= 1;

                match result? {
                    Flow::Return(value) => Ok(value),
                    Flow::Normal => Ok(Value::Nil),
                }
            }
        }
    }
}

fn resolver_mismatch(name: &Token) -> LoxError {
    error!(
        "Resolved binding for '{}' missing at run time (line {})",
        name.lexeme, name.line
    );

    LoxError::runtime(
        name,
        format!("Internal error: unresolved local '{}'.", name.lexeme),
    )
}

fn literal_value(literal: &LiteralValue) -> Value {
    match literal {
        LiteralValue::Number(n) => Value::Number(*n),
        LiteralValue::Str(s) => Value::String(s.clone()),
        LiteralValue::Bool(b) => Value::Bool(*b),
        LiteralValue::Nil => Value::Nil,
    }
}

fn evaluate_unary(operator: &Token, right: Value) -> Result<Value> {
    match operator.token_type {
        TokenType::MINUS => match right {
            Value::Number(n) => Ok(Value::Number(-n)),
            _ => Err(LoxError::runtime(operator, "Operand must be a number.")),
        },

        TokenType::BANG => Ok(Value::Bool(!right.is_truthy())),

        _ => Err(LoxError::runtime(operator, "Invalid unary operator.")),
    }
}

fn number_operands(operator: &Token, left: &Value, right: &Value) -> Result<(f64, f64)> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => Ok((*a, *b)),
        _ => Err(LoxError::runtime(operator, "Operands must be numbers.")),
    }
}

fn evaluate_binary(operator: &Token, left: Value, right: Value) -> Result<Value> {
    match operator.token_type {
        TokenType::PLUS => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
            _ => Err(LoxError::runtime(
                operator,
                "Operands must be two numbers or two strings.",
            )),
        },

        TokenType::EQUAL_EQUAL => Ok(Value::Bool(left == right)),
        TokenType::BANG_EQUAL => Ok(Value::Bool(left != right)),

        _ => {
            let (a, b) = number_operands(operator, &left, &right)?;

            match operator.token_type {
                TokenType::MINUS => Ok(Value::Number(a - b)),
                TokenType::STAR => Ok(Value::Number(a * b)),
                // IEEE semantics: x / 0 is ±inf or NaN.
                TokenType::SLASH => Ok(Value::Number(a / b)),
                TokenType::GREATER => Ok(Value::Bool(a > b)),
                TokenType::GREATER_EQUAL => Ok(Value::Bool(a >= b)),
                TokenType::LESS => Ok(Value::Bool(a < b)),
                TokenType::LESS_EQUAL => Ok(Value::Bool(a <= b)),
                _ => Err(LoxError::runtime(operator, "Invalid binary operator.")),
            }
        }
    }
}
