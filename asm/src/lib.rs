//! Lexer, token grammar, and parser for the Metro instruction set's assembly
//! syntax. Produces a `Vec<metro_vcpu::Instruction>` that the `mvm` crate
//! hands straight to `Machine::execute`.

pub mod error;
pub mod lexer;
pub mod parser;
pub mod token;

pub use error::{Error, LexError, ParseError};
use metro_vcpu::Instruction;

/// Lexes and parses `source` into a program ready to execute.
pub fn assemble(source: &str) -> Result<Vec<Instruction>, Error> {
    let tokens = lexer::Lexer::new(source).lex()?;
    let program = parser::parse(tokens)?;
    Ok(program)
}
