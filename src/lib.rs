//! Tjunkie: a tree‑walking interpreter for the Lox scripting language.
//!
//! Source text goes through four phases: [`scanner`] → [`parser`] →
//! [`resolver`] → [`interpreter`].  Static diagnostics from the first three
//! phases are collected and reported together; the first runtime error ends
//! a run.
//!
//! ```
//! let mut out = Vec::new();
//! tjunkie::run("print 1 + 2;", &mut out).unwrap();
//! assert_eq!(out, b"3\n");
//! ```

pub mod ast;
pub mod ast_printer;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod native;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod token;
pub mod value;

use std::io::Write;

use log::info;

use error::{LoxError, Result};
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;

/// Scan, parse, resolve and execute `source`, writing `print` output to
/// `out`.
///
/// Lexical and syntax errors are reported together as one
/// [`LoxError::Compile`] and stop the run before resolution; resolution
/// errors likewise stop it before anything executes.
pub fn run(source: &str, out: impl Write) -> Result<()> {
    let (tokens, mut errors) = scanner::scan_tokens(source);

    let (statements, parse_errors) = Parser::new(&tokens).parse_program();
    errors.extend(parse_errors);

    if !errors.is_empty() {
        errors.sort_by_key(|e| e.line().unwrap_or(0));
        return Err(LoxError::Compile(errors));
    }

    let locals = Resolver::new().resolve(&statements)?;

    let mut interpreter = Interpreter::with_output(out);
    interpreter.resolve(locals);
    interpreter.interpret(&statements)?;

    info!("Run finished");
    Ok(())
}
