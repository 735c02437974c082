//! A small C compiler that emits x86-64 assembly.

/// Contains the code generation components.
pub mod codegen;
/// Contains the compiler driver.
pub mod compiler;
/// Contains the error types for the application.
pub mod error;
/// Contains the lexer.
pub mod lexer;
pub mod parser;
/// Contains the scope tree and the symbol records it stores.
pub mod symbol_table;

pub mod types;

pub mod test_utils;
