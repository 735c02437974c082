//! AST node definitions.
//!
//! Every expression node carries the operand type the parser resolved for
//! it; the code generator reads those annotations and never re-derives a
//! type. Frame offsets, struct member offsets, and switch label ids are
//! likewise baked in during parsing.

use thin_vec::ThinVec;

use crate::symbol_table::ScopeId;
use crate::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LogAnd,
    LogOr,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::LogAnd | BinOp::LogOr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Arithmetic negation.
    Neg,
    /// Logical not, yielding 0 or 1.
    Not,
    /// Bitwise complement.
    BitNot,
}

/// How a resolved variable reference is addressed.
#[derive(Debug, Clone, PartialEq)]
pub enum VarRef {
    /// Frame-relative local or spilled argument.
    Local { name: String, offset: i32 },
    /// Global or static, addressed by its emitted label.
    Data { label: String },
}

/// One argument at a call site. Arguments of record type too large for
/// registers travel through a caller-allocated frame copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArg {
    pub expr: Expr,
    pub copy_slot: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    /// Resolved operand type; drives implicit cast and load/store sizing
    /// decisions in the code generator.
    pub ty: Type,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Expr { kind, ty }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    /// Hoisted to a read-only constant by the code generator.
    StrLiteral(String),
    Var(VarRef),
    /// Member access on a struct lvalue; `p->m` arrives here as
    /// `(*p).m` so the base is always a struct-typed place.
    Member {
        base: Box<Expr>,
        member: String,
        offset: u32,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `target op= value`, and the prefix step forms `++`/`--` with a
    /// literal 1. The target address is computed once; `op_ty` is the
    /// type the read-modify-write runs in before the result narrows
    /// back to the target.
    CompoundAssign {
        target: Box<Expr>,
        op: BinOp,
        value: Box<Expr>,
        op_ty: Type,
    },
    /// Conversion to `self.ty` from `operand.ty`, inserted by the parser.
    Cast {
        operand: Box<Expr>,
    },
    Deref(Box<Expr>),
    AddrOf(Box<Expr>),
    /// Post-increment or post-decrement; yields the old value.
    PostIncDec {
        operand: Box<Expr>,
        is_inc: bool,
    },
    Call {
        name: String,
        args: ThinVec<CallArg>,
        /// Frame slot receiving a record return value: filled through the
        /// hidden pointer for large records, by spilling the returned
        /// register pair for small ones.
        sret_slot: Option<i32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Expression in statement position.
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    /// `while` and `for` share one lowering: optional init statements,
    /// optional condition, optional step.
    Loop {
        init: ThinVec<Stmt>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    /// The scope id is where the collected case labels live.
    Switch {
        cond: Expr,
        body: Box<Stmt>,
        scope: ScopeId,
    },
    /// `case` and `default` both; the id pairs the statement with the
    /// `ValueLabel` registered in the enclosing switch scope.
    Case {
        id: u32,
        stmt: Box<Stmt>,
    },
    Break,
    Continue,
    Goto(String),
    Label {
        name: String,
        stmt: Box<Stmt>,
    },
    Block(ThinVec<Stmt>),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub body: ThinVec<Stmt>,
}

/// One parsed translation unit. Globals and statics live in the symbol
/// table; only function bodies need AST form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranslationUnit {
    pub functions: ThinVec<Function>,
}
