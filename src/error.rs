use crate::codegen::error::CodegenError;
use crate::lexer::LexerError;
use crate::parser::error::ParserError;
use crate::symbol_table::SemanticError;

use thiserror::Error;

/// Any error that can abort a compilation. Each stage owns its error type;
/// this enum is what the driver and the tests see.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("{0}")]
    Lexer(#[from] LexerError),
    #[error("{0}")]
    Parser(#[from] ParserError),
    #[error("{0}")]
    Semantic(#[from] SemanticError),
    #[error("{0}")]
    Codegen(#[from] CodegenError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Driver-level failure outside any stage: a missing `main`, a
    /// failed assembler or linker run.
    #[error("{0}")]
    Driver(String),
}

impl CompilerError {
    /// Source position of the failure, when the stage recorded one.
    pub fn location(&self) -> Option<(u32, u32)> {
        match self {
            CompilerError::Lexer(e) => Some(e.location()),
            CompilerError::Parser(e) => e.location(),
            CompilerError::Semantic(_)
            | CompilerError::Codegen(_)
            | CompilerError::Io(_)
            | CompilerError::Driver(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    msg: String,
    path: Option<String>,
    loc: Option<(u32, u32)>,
}

impl Report {
    pub fn new(msg: String, path: Option<String>, loc: Option<(u32, u32)>) -> Self {
        Self { msg, path, loc }
    }

    pub fn from_error(err: &CompilerError, path: Option<String>) -> Self {
        Self::new(err.to_string(), path, err.location())
    }
}

pub fn report(report: &Report) {
    eprintln!("\x1b[31merror\x1b[0m: {}", report.msg);
    if let Some(path) = &report.path {
        if let Some((line, col)) = report.loc {
            eprintln!(" --> {}:{}:{}", path, line, col);
        } else {
            eprintln!(" --> {}", path);
        }
    }
}
