use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};
use memmap2::Mmap;

use rox::ast_printer::AstPrinter;
use rox::error::Diagnostics;
use rox::interpreter::{Interpreter, DEFAULT_MAX_CALL_DEPTH};
use rox::lox::{decode_source, on_interpreter_stack, Lox};
use rox::parser::Parser;
use rox::scanner::Scanner;

/// Exit code for scan, parse and resolve errors.
const EXIT_STATIC_ERROR: i32 = 65;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 70;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,

    /// Maximum nesting of function calls before a "Stack overflow." error
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Tokenizes input from a file, printing each token
    Tokenize {
        filename: PathBuf,

        /// Print one JSON object per token
        #[arg(long)]
        json: bool,
    },

    /// Parses a program from a file and prints its syntax tree
    Parse { filename: PathBuf },

    /// Evaluates input from a file as a single expression and prints the result
    Evaluate { filename: PathBuf },

    /// Runs a Lox program, or starts an interactive prompt without a file
    Run { filename: Option<PathBuf> },
}

/// Reads a source file through a memory map and checks it is UTF‑8.
fn read_file(filename: &Path) -> Result<String> {
    info!("Reading file: {:?}", filename);

    let file = File::open(filename).context(format!("Failed to open file {:?}", filename))?;

    // SAFETY: the map is read once and copied out before anything else can
    // touch the file.
    let map = unsafe { Mmap::map(&file) }.context(format!("Failed to map file {:?}", filename))?;

    let source: String = decode_source(&map)
        .context(format!("File {:?} is not valid UTF-8", filename))?
        .to_owned();

    info!("Read {} bytes from {:?}", source.len(), filename);

    Ok(source)
}

fn init_logger() -> Result<()> {
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record
                .module_path()
                .unwrap_or("<unnamed>")
                .strip_prefix("rox::")
                .unwrap_or(record.module_path().unwrap_or("<unnamed>"));
            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Runtime errors share stdout with program output; static errors go to stderr.
fn print_diagnostics(diagnostics: &Diagnostics) -> Result<()> {
    diagnostics
        .write_to(&mut io::stdout().lock(), &mut io::stderr().lock())
        .context("Failed to print diagnostics")
}

fn tokenize(filename: &Path, json: bool) -> Result<()> {
    let source: String = read_file(filename)?;
    let mut tokenized = true;

    for token in Scanner::new(&source) {
        match token {
            Ok(token) if json => println!("{}", serde_json::to_string(&token)?),
            Ok(token) => println!("{}", token),
            Err(e) => {
                tokenized = false;
                eprintln!("{}", e);
            }
        }
    }

    if !tokenized {
        debug!("Tokenization failed, exiting with code {}", EXIT_STATIC_ERROR);
        std::process::exit(EXIT_STATIC_ERROR);
    }

    Ok(())
}

fn parse(filename: &Path) -> Result<()> {
    let source: String = read_file(filename)?;
    let mut diagnostics = Diagnostics::new();

    let tokens = Scanner::new(&source).scan_tokens(&mut diagnostics);
    let statements = Parser::new(tokens).parse(&mut diagnostics);

    if diagnostics.had_error() {
        print_diagnostics(&diagnostics)?;
        std::process::exit(EXIT_STATIC_ERROR);
    }

    let printer = AstPrinter;
    for stmt in &statements {
        println!("{}", printer.print_stmt(stmt));
    }

    Ok(())
}

fn evaluate(filename: &Path, max_call_depth: usize) -> Result<()> {
    let source: String = read_file(filename)?;
    let mut diagnostics = Diagnostics::new();

    let tokens = Scanner::new(&source).scan_tokens(&mut diagnostics);
    let expr = Parser::new(tokens).parse_expression(&mut diagnostics);

    let Some(expr) = expr.filter(|_| !diagnostics.had_error()) else {
        print_diagnostics(&diagnostics)?;
        std::process::exit(EXIT_STATIC_ERROR);
    };

    let mut interpreter = Interpreter::new().with_max_call_depth(max_call_depth);

    match interpreter.evaluate(&expr) {
        Ok(value) => println!("{}", value),
        Err(e) => {
            println!("{}", e);
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
    }

    Ok(())
}

fn run_file(filename: &Path, max_call_depth: usize) -> Result<()> {
    let source: String = read_file(filename)?;
    let mut lox = Lox::with_interpreter(Interpreter::new().with_max_call_depth(max_call_depth));

    let diagnostics: Diagnostics = lox.run(&source);
    print_diagnostics(&diagnostics)?;

    if diagnostics.had_error() {
        std::process::exit(EXIT_STATIC_ERROR);
    }
    if diagnostics.had_runtime_error() {
        std::process::exit(EXIT_RUNTIME_ERROR);
    }

    info!("Program executed successfully");
    Ok(())
}

fn run_prompt(max_call_depth: usize) -> Result<()> {
    info!("Starting interactive prompt");

    let mut lox = Lox::with_interpreter(Interpreter::new().with_max_call_depth(max_call_depth));
    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush().context("Failed to flush prompt")?;

        line.clear();
        let read: usize = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;

        if read == 0 {
            break;
        }

        // Errors only affect the line that caused them.
        print_diagnostics(&lox.run(&line))?;
    }

    info!("Prompt closed");
    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    if args.log {
        init_logger()?;
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    on_interpreter_stack(move || dispatch(args))
        .context("Failed to start interpreter thread")?
}

fn dispatch(args: Cli) -> Result<()> {
    match args.commands {
        Commands::Tokenize { filename, json } => tokenize(&filename, json),
        Commands::Parse { filename } => parse(&filename),
        Commands::Evaluate { filename } => evaluate(&filename, args.max_call_depth),
        Commands::Run { filename } => match filename {
            Some(filename) => run_file(&filename, args.max_call_depth),
            None => run_prompt(args.max_call_depth),
        },
    }
}
