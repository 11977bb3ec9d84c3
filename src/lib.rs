//! Core types and execution engine for the Metro virtual machine.
//!
//! This crate has no notion of assembly syntax; it only knows how to run an
//! already-decoded [`instruction::Instruction`] stream against a [`machine::Machine`].
//! Turning source text into that stream is the job of the sibling `asm` crate.

pub mod constants;
pub mod instruction;
pub mod machine;
pub mod memory;

pub use instruction::{DataValue, Instruction, Operand, RegId, Width};
pub use machine::{Machine, RuntimeError};

#[cfg(test)]
mod test;
