use crate::lexer::TokenKind;
use crate::symbol_table::SemanticError;
use thiserror::Error;

/// An error raised while parsing the token stream. Parsing is fail-fast:
/// the first error aborts the compilation, there is no resynchronization.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("unexpected token '{kind}'")]
    UnexpectedToken { kind: TokenKind, line: u32, col: u32 },
    #[error("expected '{expected}', found '{found}'")]
    ExpectedToken {
        expected: TokenKind,
        found: TokenKind,
        line: u32,
        col: u32,
    },
    #[error("expected an identifier, found '{found}'")]
    ExpectedIdentifier { found: TokenKind, line: u32, col: u32 },
    #[error("expected a constant expression")]
    ExpectedConstant { line: u32, col: u32 },
    #[error("{source}")]
    Semantic {
        source: SemanticError,
        line: u32,
        col: u32,
    },
    #[error("{what} are not supported")]
    Unsupported {
        what: &'static str,
        line: u32,
        col: u32,
    },
    #[error("initializer string of {len} bytes overflows '{ty}'")]
    OversizedInitializer {
        ty: String,
        len: usize,
        line: u32,
        col: u32,
    },
}

impl ParserError {
    /// Source position of the failure.
    pub fn location(&self) -> Option<(u32, u32)> {
        match *self {
            ParserError::UnexpectedToken { line, col, .. }
            | ParserError::ExpectedToken { line, col, .. }
            | ParserError::ExpectedIdentifier { line, col, .. }
            | ParserError::ExpectedConstant { line, col }
            | ParserError::Semantic { line, col, .. }
            | ParserError::Unsupported { line, col, .. }
            | ParserError::OversizedInitializer { line, col, .. } => Some((line, col)),
        }
    }
}
