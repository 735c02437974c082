use thiserror::Error;

/// An error raised while lowering the AST to assembly. These are
/// internal-consistency failures: the parser's type resolution should
/// leave nothing here to reject, so surfacing one means a resolver rule
/// and a lowering rule disagree.
#[derive(Error, Debug)]
pub enum CodegenError {
    /// No lowering rule for this operator/type combination.
    #[error("no lowering rule for '{op}' on '{ty}'")]
    UnsupportedOperation { op: &'static str, ty: String },
    /// No conversion rule between these two types.
    #[error("no conversion rule from '{from}' to '{to}'")]
    UnsupportedCast { from: String, to: String },
    /// The AST referenced a function the symbol table no longer knows.
    #[error("call to unknown function '{0}'")]
    MissingFunction(String),
    /// A `break`, `continue` or `case` with no construct to bind to.
    #[error("'{0}' has no enclosing target")]
    OrphanControl(&'static str),
}
