use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser as ClapParser;
use clap::Subcommand;
use env_logger::Builder;
use log::{debug, info};

use tjunkie::ast_printer::AstPrinter;
use tjunkie::error::LoxError;
use tjunkie::parser::Parser;
use tjunkie::scanner::Scanner;

#[derive(ClapParser, Debug)]
#[command(version, about = "Lox language interpreter", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    commands: Commands,

    /// Enable logging to app.log
    #[arg(long, global = true)]
    log: bool,
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

    /// Parses a Lox program and prints its syntax tree
    Parse { filename: PathBuf },

    /// Runs input from a file as a Lox program
    Run { filename: PathBuf },
}

/// Reads the contents of a file as UTF‑8 source text.
fn read_file(filename: PathBuf) -> Result<String> {
    info!("Reading file: {:?}", filename);
    let file = File::open(&filename).context(format!("Failed to open file {:?}", filename))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();

    let bytes = reader
        .read_to_end(&mut buf)
        .context(format!("Failed to read file {:?}", filename))?;

    info!("Read {} bytes from {:?}", bytes, filename);

    String::from_utf8(buf).context(format!("{:?} is not valid UTF-8", filename))
}

fn init_logger() -> Result<()> {
    // Create or open the log file
    let log_file = File::create("app.log").context("Failed to create app.log")?;

    Builder::new()
        .format(|buf, record| {
            let module = record.module_path().unwrap_or("<unnamed>");
            let module = module.strip_prefix("tjunkie::").unwrap_or(module);

            writeln!(
                buf,
                "[{}:{}] - {}",
                module,
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter(None, log::LevelFilter::Debug) // Default to Debug, override with RUST_LOG
        .parse_default_env()
        .init();

    info!("Logger initialized, writing to app.log");
    Ok(())
}

/// Exit status for a failed phase: 65 for static errors, 70 at runtime.
fn exit_code(error: &LoxError) -> i32 {
    if error.is_static() {
        65
    } else {
        70
    }
}

fn tokenize(source: &str, json: bool) -> Result<bool> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut tokenized = true;

    for token in Scanner::new(source) {
        match token {
            Ok(token) => {
                debug!("Scanned token: {}", token);

                if json {
                    serde_json::to_writer(&mut out, &token)?;
                    writeln!(out)?;
                } else {
                    writeln!(out, "{}", token)?;
                }
            }

            Err(e) => {
                tokenized = false;
                debug!("Tokenization debug: {}", e);
                eprintln!("{}", e);
            }
        }
    }

    Ok(tokenized)
}

fn parse(source: &str) -> std::result::Result<(), LoxError> {
    let (tokens, errors) = tjunkie::scanner::scan_tokens(source);

    if !errors.is_empty() {
        return Err(LoxError::Compile(errors));
    }

    let statements = Parser::new(&tokens).parse()?;

    info!("Parsed {} statements", statements.len());

    for stmt in &statements {
        println!("{}", AstPrinter::print_stmt(stmt));
    }

    Ok(())
}

fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // Initialize logger only if --log flag is provided
    if args.log {
        init_logger()?;
    } else {
        // Initialize a minimal logger to avoid "no logger" errors
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }

    info!("CLI arguments: {:?}", args);

    match args.commands {
        Commands::Tokenize { filename, json } => {
            info!("Running Tokenize subcommand");
            let source = read_file(filename)?;

            if !tokenize(&source, json)? {
                debug!("Tokenization failed, exiting with code 65");
                std::process::exit(65);
            }

            info!("Tokenization completed successfully");
        }

        Commands::Parse { filename } => {
            info!("Running Parse subcommand");
            let source = read_file(filename)?;

            if let Err(e) = parse(&source) {
                debug!("Parse debug: {}", e);
                eprintln!("{}", e);
                std::process::exit(exit_code(&e));
            }

            info!("Parse subcommand completed");
        }

        Commands::Run { filename } => {
            info!("Running Run subcommand");
            let source = read_file(filename)?;
            info!("Provided input:\n {}", source);

            if let Err(e) = tjunkie::run(&source, io::stdout()) {
                debug!("Run debug: {}", e);
                eprintln!("{}", e);
                std::process::exit(exit_code(&e));
            }

            info!("Program executed successfully");
        }
    }

    Ok(())
}
