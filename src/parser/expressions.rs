//! Expression parsing.
//!
//! One layer per precedence level, lowest binding at the top. Every node
//! leaves here with its operand type resolved: implicit widenings appear as
//! explicit `Cast` nodes, pointer arithmetic is scaled by pointee size,
//! array-typed operands decay to element pointers, and `p->m` and `a[i]`
//! are desugared to their primitive forms. Prefix `++`/`--` and the
//! compound assignments become `CompoundAssign` nodes, which keep the
//! target in place so its address is evaluated exactly once. The code
//! generator never revisits any of this.

use std::rc::Rc;

use thin_vec::ThinVec;

use crate::lexer::TokenKind;
use crate::parser::ast::{BinOp, CallArg, Expr, ExprKind, UnOp, VarRef};
use crate::parser::error::ParserError;
use crate::parser::{Parser, declarations};
use crate::symbol_table::SemanticError;
use crate::types::{StructLayout, TyKind, Type, usual_arithmetic_conversion};

pub(crate) fn parse_expression(parser: &mut Parser) -> Result<Expr, ParserError> {
    parse_assignment(parser)
}

/// A condition operand: scalar, with floating-point comparisons against
/// zero made explicit so the generator always tests an integer.
pub(crate) fn parse_condition(parser: &mut Parser) -> Result<Expr, ParserError> {
    let expr = parse_expression(parser)?;
    wrap_condition(parser, expr)
}

/// Assignment is right-associative: `a = b = c` assigns `c` to both.
/// Compound assignments stay a single node so the target lvalue and any
/// side effects inside it are evaluated once.
pub(crate) fn parse_assignment(parser: &mut Parser) -> Result<Expr, ParserError> {
    let lhs = parse_logical_or(parser)?;

    let op = match parser.current_kind() {
        TokenKind::Assign => None,
        TokenKind::PlusAssign => Some(BinOp::Add),
        TokenKind::MinusAssign => Some(BinOp::Sub),
        TokenKind::StarAssign => Some(BinOp::Mul),
        TokenKind::DivAssign => Some(BinOp::Div),
        TokenKind::ModAssign => Some(BinOp::Mod),
        _ => return Ok(lhs),
    };
    parser.advance();
    require_lvalue(parser, &lhs)?;
    let rhs = parse_assignment(parser)?;

    let Some(op) = op else {
        let target_ty = lhs.ty.clone();
        let value = coerce(parser, rhs, &target_ty)?;
        return Ok(Expr::new(
            ExprKind::Assign {
                target: Box::new(lhs),
                value: Box::new(value),
            },
            target_ty,
        ));
    };
    make_compound_assignment(parser, op, lhs, rhs)
}

fn parse_logical_or(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_logical_and(parser)?;
    while parser.accept(&TokenKind::LogicOr) {
        let rhs = parse_logical_and(parser)?;
        lhs = make_binary(parser, BinOp::LogOr, lhs, rhs)?;
    }
    Ok(lhs)
}

fn parse_logical_and(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_bit_or(parser)?;
    while parser.accept(&TokenKind::LogicAnd) {
        let rhs = parse_bit_or(parser)?;
        lhs = make_binary(parser, BinOp::LogAnd, lhs, rhs)?;
    }
    Ok(lhs)
}

fn parse_bit_or(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_bit_xor(parser)?;
    while parser.accept(&TokenKind::Or) {
        let rhs = parse_bit_xor(parser)?;
        lhs = make_binary(parser, BinOp::BitOr, lhs, rhs)?;
    }
    Ok(lhs)
}

fn parse_bit_xor(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_bit_and(parser)?;
    while parser.accept(&TokenKind::Xor) {
        let rhs = parse_bit_and(parser)?;
        lhs = make_binary(parser, BinOp::BitXor, lhs, rhs)?;
    }
    Ok(lhs)
}

fn parse_bit_and(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_equality(parser)?;
    while parser.accept(&TokenKind::And) {
        let rhs = parse_equality(parser)?;
        lhs = make_binary(parser, BinOp::BitAnd, lhs, rhs)?;
    }
    Ok(lhs)
}

fn parse_equality(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_relational(parser)?;
    loop {
        let op = match parser.current_kind() {
            TokenKind::Equal => BinOp::Eq,
            TokenKind::NotEqual => BinOp::Ne,
            _ => return Ok(lhs),
        };
        parser.advance();
        let rhs = parse_relational(parser)?;
        lhs = make_binary(parser, op, lhs, rhs)?;
    }
}

fn parse_relational(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_shift(parser)?;
    loop {
        let op = match parser.current_kind() {
            TokenKind::Less => BinOp::Lt,
            TokenKind::LessEqual => BinOp::Le,
            TokenKind::Greater => BinOp::Gt,
            TokenKind::GreaterEqual => BinOp::Ge,
            _ => return Ok(lhs),
        };
        parser.advance();
        let rhs = parse_shift(parser)?;
        lhs = make_binary(parser, op, lhs, rhs)?;
    }
}

fn parse_shift(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_additive(parser)?;
    loop {
        let op = match parser.current_kind() {
            TokenKind::LeftShift => BinOp::Shl,
            TokenKind::RightShift => BinOp::Shr,
            _ => return Ok(lhs),
        };
        parser.advance();
        let rhs = parse_additive(parser)?;
        lhs = make_binary(parser, op, lhs, rhs)?;
    }
}

fn parse_additive(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_multiplicative(parser)?;
    loop {
        let op = match parser.current_kind() {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            _ => return Ok(lhs),
        };
        parser.advance();
        let rhs = parse_multiplicative(parser)?;
        lhs = make_binary(parser, op, lhs, rhs)?;
    }
}

fn parse_multiplicative(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut lhs = parse_cast(parser)?;
    loop {
        let op = match parser.current_kind() {
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            _ => return Ok(lhs),
        };
        parser.advance();
        let rhs = parse_cast(parser)?;
        lhs = make_binary(parser, op, lhs, rhs)?;
    }
}

/// Unary level, including casts. A `(` here is a cast exactly when a type
/// name follows; otherwise the cursor is rewound and the paren belongs to
/// a primary expression.
fn parse_cast(parser: &mut Parser) -> Result<Expr, ParserError> {
    match parser.current_kind().clone() {
        TokenKind::LeftParen => {
            parser.advance();
            if parser.is_type_name() {
                let ty = declarations::parse_type_name(parser)?;
                parser.expect(TokenKind::RightParen)?;
                let operand = parse_cast(parser)?;
                return cast_to(parser, operand, ty);
            }
            parser.token_go_back(1);
            parse_postfix(parser)
        }
        TokenKind::Star => {
            parser.advance();
            let operand = decay(parse_cast(parser)?);
            let Some(pointee) = operand.ty.pointee() else {
                return Err(invalid_operand(parser, "*", &operand.ty));
            };
            if pointee.is_void() {
                return Err(invalid_operand(parser, "*", &operand.ty));
            }
            Ok(Expr::new(ExprKind::Deref(Box::new(operand)), pointee))
        }
        TokenKind::And => {
            parser.advance();
            let operand = parse_cast(parser)?;
            if !operand.ty.is_array() {
                require_lvalue(parser, &operand)?;
            }
            let ty = operand.ty.pointer_to();
            Ok(Expr::new(ExprKind::AddrOf(Box::new(operand)), ty))
        }
        TokenKind::Minus => {
            parser.advance();
            let operand = decay(parse_cast(parser)?);
            match operand.kind {
                ExprKind::IntLiteral(v) => {
                    Ok(Expr::new(ExprKind::IntLiteral(v.wrapping_neg()), operand.ty))
                }
                ExprKind::FloatLiteral(v) => {
                    Ok(Expr::new(ExprKind::FloatLiteral(-v), operand.ty))
                }
                _ => {
                    let operand = promote_arithmetic(parser, operand, "-")?;
                    let ty = operand.ty.clone();
                    Ok(Expr::new(
                        ExprKind::Unary {
                            op: UnOp::Neg,
                            operand: Box::new(operand),
                        },
                        ty,
                    ))
                }
            }
        }
        TokenKind::Plus => {
            parser.advance();
            let operand = decay(parse_cast(parser)?);
            promote_arithmetic(parser, operand, "+")
        }
        TokenKind::Not => {
            parser.advance();
            let operand = parse_cast(parser)?;
            let operand = wrap_condition(parser, operand)?;
            Ok(Expr::new(
                ExprKind::Unary {
                    op: UnOp::Not,
                    operand: Box::new(operand),
                },
                Type::int(),
            ))
        }
        TokenKind::Tilde => {
            parser.advance();
            let operand = decay(parse_cast(parser)?);
            if !operand.ty.is_integer() {
                return Err(invalid_operand(parser, "~", &operand.ty));
            }
            let operand = promote_arithmetic(parser, operand, "~")?;
            let ty = operand.ty.clone();
            Ok(Expr::new(
                ExprKind::Unary {
                    op: UnOp::BitNot,
                    operand: Box::new(operand),
                },
                ty,
            ))
        }
        TokenKind::Increment => {
            parser.advance();
            let target = parse_cast(parser)?;
            make_step_assignment(parser, target, BinOp::Add)
        }
        TokenKind::Decrement => {
            parser.advance();
            let target = parse_cast(parser)?;
            make_step_assignment(parser, target, BinOp::Sub)
        }
        TokenKind::Sizeof => {
            parser.advance();
            parse_sizeof(parser)
        }
        _ => parse_postfix(parser),
    }
}

/// `sizeof (type)` or `sizeof unary-expr`, folded to a constant here; the
/// operand expression is never evaluated.
fn parse_sizeof(parser: &mut Parser) -> Result<Expr, ParserError> {
    if parser.accept(&TokenKind::LeftParen) {
        if parser.is_type_name() {
            let ty = declarations::parse_type_name(parser)?;
            parser.expect(TokenKind::RightParen)?;
            return Ok(Expr::new(
                ExprKind::IntLiteral(ty.size() as i64),
                Type::long(),
            ));
        }
        parser.token_go_back(1);
    }
    let operand = parse_cast(parser)?;
    Ok(Expr::new(
        ExprKind::IntLiteral(operand.ty.size() as i64),
        Type::long(),
    ))
}

fn parse_postfix(parser: &mut Parser) -> Result<Expr, ParserError> {
    let mut expr = parse_primary(parser)?;
    loop {
        match parser.current_kind() {
            TokenKind::LeftBracket => {
                parser.advance();
                let index = parse_expression(parser)?;
                parser.expect(TokenKind::RightBracket)?;
                let base = decay(expr);
                let sum = make_binary(parser, BinOp::Add, base, index)?;
                let Some(pointee) = sum.ty.pointee() else {
                    return Err(invalid_operand(parser, "[]", &sum.ty));
                };
                expr = Expr::new(ExprKind::Deref(Box::new(sum)), pointee);
            }
            TokenKind::Dot => {
                parser.advance();
                expr = parse_member_access(parser, expr)?;
            }
            TokenKind::Arrow => {
                parser.advance();
                let base = decay(expr);
                let pointee = match base.ty.pointee() {
                    Some(ty) if ty.is_record() => ty,
                    _ => return Err(invalid_operand(parser, "->", &base.ty)),
                };
                let deref = Expr::new(ExprKind::Deref(Box::new(base)), pointee);
                expr = parse_member_access(parser, deref)?;
            }
            TokenKind::Increment => {
                parser.advance();
                require_lvalue(parser, &expr)?;
                let ty = expr.ty.clone();
                if !ty.is_integer() && !ty.is_pointer() && !ty.is_floating() {
                    return Err(invalid_operand(parser, "++", &ty));
                }
                expr = Expr::new(
                    ExprKind::PostIncDec {
                        operand: Box::new(expr),
                        is_inc: true,
                    },
                    ty,
                );
            }
            TokenKind::Decrement => {
                parser.advance();
                require_lvalue(parser, &expr)?;
                let ty = expr.ty.clone();
                if !ty.is_integer() && !ty.is_pointer() && !ty.is_floating() {
                    return Err(invalid_operand(parser, "--", &ty));
                }
                expr = Expr::new(
                    ExprKind::PostIncDec {
                        operand: Box::new(expr),
                        is_inc: false,
                    },
                    ty,
                );
            }
            _ => return Ok(expr),
        }
    }
}

/// `.member` on a record-typed base. `->` funnels in here after wrapping
/// its base in a deref.
fn parse_member_access(parser: &mut Parser, base: Expr) -> Result<Expr, ParserError> {
    if !base.ty.is_record() {
        return Err(invalid_operand(parser, ".", &base.ty));
    }
    let layout = record_layout_of(parser, &base.ty)?;
    let member = parser.expect_identifier()?;
    let Some(found) = layout.find_member(&member) else {
        return Err(parser.semantic(SemanticError::NoSuchMember {
            ty: base.ty.to_string(),
            member,
        }));
    };
    let ty = found.ty.clone();
    let offset = found.offset;
    Ok(Expr::new(
        ExprKind::Member {
            base: Box::new(base),
            member,
            offset,
        },
        ty,
    ))
}

fn parse_primary(parser: &mut Parser) -> Result<Expr, ParserError> {
    match parser.current_kind().clone() {
        TokenKind::IntegerConstant(v) => {
            parser.advance();
            let ty = if v > i32::MAX as i64 || v < i32::MIN as i64 {
                Type::long()
            } else {
                Type::int()
            };
            Ok(Expr::new(ExprKind::IntLiteral(v), ty))
        }
        TokenKind::FloatConstant(v) => {
            parser.advance();
            Ok(Expr::new(ExprKind::FloatLiteral(v), Type::double()))
        }
        TokenKind::CharacterConstant(c) => {
            parser.advance();
            Ok(Expr::new(ExprKind::IntLiteral(c as i64), Type::int()))
        }
        TokenKind::StringLiteral(s) => {
            parser.advance();
            Ok(Expr::new(
                ExprKind::StrLiteral(s),
                Type::char_ty().pointer_to(),
            ))
        }
        TokenKind::Identifier(name) => {
            parser.advance();
            if *parser.current_kind() == TokenKind::LeftParen {
                return parse_call(parser, name);
            }
            if let Some(var) = parser.table.find_var(parser.scope(), &name) {
                let ty = var.ty.clone();
                let var_ref = if var.is_global() || var.is_static() {
                    VarRef::Data {
                        label: var.data_label(),
                    }
                } else {
                    VarRef::Local {
                        name: var.name,
                        offset: var.stack_offset,
                    }
                };
                return Ok(Expr::new(ExprKind::Var(var_ref), ty));
            }
            if let Some(value) = parser.table.find_enum_constant(parser.scope(), &name) {
                return Ok(Expr::new(ExprKind::IntLiteral(value), Type::int()));
            }
            parser.token_go_back(1);
            Err(parser.semantic(SemanticError::UndefinedSymbol(name)))
        }
        TokenKind::LeftParen => {
            parser.advance();
            let expr = parse_expression(parser)?;
            parser.expect(TokenKind::RightParen)?;
            Ok(expr)
        }
        _ => Err(parser.unexpected()),
    }
}

/// A call to a declared function. Fixed arguments are coerced to their
/// parameter types; variadic extras get the default promotions. Record
/// arguments too large for registers get a frame slot for the caller-side
/// copy, and a record return too large for registers gets a hidden result
/// slot; both slots are reserved here so the frame size is final when the
/// enclosing function finishes parsing.
fn parse_call(parser: &mut Parser, name: String) -> Result<Expr, ParserError> {
    let func = parser
        .table
        .lookup_func(parser.scope(), &name)
        .map_err(|e| parser.semantic(e))?;
    parser.expect(TokenKind::LeftParen)?;

    let mut raw_args = Vec::new();
    if !parser.accept(&TokenKind::RightParen) {
        loop {
            raw_args.push(parse_assignment(parser)?);
            if !parser.accept(&TokenKind::Comma) {
                break;
            }
        }
        parser.expect(TokenKind::RightParen)?;
    }

    if raw_args.len() < func.params.len() || (!func.is_variadic && raw_args.len() > func.params.len())
    {
        return Err(parser.semantic(SemanticError::ArgumentCount {
            name,
            expected: func.params.len(),
            found: raw_args.len(),
        }));
    }

    let mut args = ThinVec::with_capacity(raw_args.len());
    for (index, arg) in raw_args.into_iter().enumerate() {
        let arg = match func.params.get(index) {
            Some(param) => coerce(parser, arg, &param.ty)?,
            None => promote_variadic(parser, arg)?,
        };
        let copy_slot = if arg.ty.is_record() && arg.ty.size() > 16 {
            Some(
                parser
                    .table
                    .alloc_slot(parser.scope(), arg.ty.size(), arg.ty.align()),
            )
        } else {
            None
        };
        args.push(CallArg {
            expr: arg,
            copy_slot,
        });
    }

    // Every record return needs a frame slot: large records are filled by
    // the callee through the hidden pointer, register-sized ones are
    // spilled into it right after the call so record values are uniformly
    // addressable.
    let return_ty = func.return_type.clone();
    let sret_slot = if return_ty.is_record() {
        Some(
            parser
                .table
                .alloc_slot(parser.scope(), return_ty.size(), return_ty.align()),
        )
    } else {
        None
    };

    Ok(Expr::new(
        ExprKind::Call {
            name,
            args,
            sret_slot,
        },
        return_ty,
    ))
}

/// Default argument promotions for variadic tails: `float` widens to
/// `double`, sub-`int` integers widen to `int`.
fn promote_variadic(parser: &Parser, arg: Expr) -> Result<Expr, ParserError> {
    let arg = decay(arg);
    if arg.ty.is_floating() && arg.ty.kind == TyKind::Float {
        return coerce(parser, arg, &Type::double());
    }
    if arg.ty.is_integer() && arg.ty.get_integer_rank() < Type::int().get_integer_rank() {
        return coerce(parser, arg, &Type::int());
    }
    Ok(arg)
}

/// Inserts a conversion node unless the types already agree. Record types
/// never convert; everything scalar goes through a `Cast`.
pub(crate) fn coerce(parser: &Parser, expr: Expr, target: &Type) -> Result<Expr, ParserError> {
    let expr = decay(expr);
    if expr.ty == *target {
        return Ok(expr);
    }
    if expr.ty.is_record() || target.is_record() || target.is_array() {
        return Err(invalid_operand(parser, "conversion", &expr.ty));
    }
    Ok(Expr::new(
        ExprKind::Cast {
            operand: Box::new(expr),
        },
        target.clone(),
    ))
}

/// Explicit cast. Also covers `(void)x`.
fn cast_to(parser: &Parser, operand: Expr, target: Type) -> Result<Expr, ParserError> {
    let operand = decay(operand);
    if operand.ty == target {
        return Ok(operand);
    }
    if operand.ty.is_record() || target.is_record() || target.is_array() {
        return Err(invalid_operand(parser, "cast", &operand.ty));
    }
    Ok(Expr::new(
        ExprKind::Cast {
            operand: Box::new(operand),
        },
        target,
    ))
}

/// Array-to-pointer decay, baked in as an address-of node so the variable
/// reference below it still names the array storage.
fn decay(expr: Expr) -> Expr {
    if !expr.ty.is_array() {
        return expr;
    }
    let ty = expr.ty.element().pointer_to();
    Expr::new(ExprKind::AddrOf(Box::new(expr)), ty)
}

/// Conditions must be scalar; a floating-point condition becomes an
/// explicit `!= 0.0` so the generator always branches on an integer.
pub(crate) fn wrap_condition(parser: &Parser, expr: Expr) -> Result<Expr, ParserError> {
    let expr = decay(expr);
    if expr.ty.is_floating() {
        let zero = Expr::new(ExprKind::FloatLiteral(0.0), expr.ty.clone());
        return Ok(Expr::new(
            ExprKind::Binary {
                op: BinOp::Ne,
                lhs: Box::new(expr),
                rhs: Box::new(zero),
            },
            Type::int(),
        ));
    }
    if !expr.ty.is_integer() && !expr.ty.is_pointer() {
        return Err(invalid_operand(parser, "condition", &expr.ty));
    }
    Ok(expr)
}

/// Central binary-node constructor: decays, checks operand classes,
/// inserts the promotion casts, scales pointer arithmetic, and resolves
/// the result type.
fn make_binary(parser: &Parser, op: BinOp, lhs: Expr, rhs: Expr) -> Result<Expr, ParserError> {
    let lhs = decay(lhs);
    let rhs = decay(rhs);

    if lhs.ty.is_record() || rhs.ty.is_record() {
        return Err(invalid_operand(parser, op_symbol(op), &lhs.ty));
    }

    if op.is_logical() {
        let lhs = wrap_condition(parser, lhs)?;
        let rhs = wrap_condition(parser, rhs)?;
        return Ok(binary(op, lhs, rhs, Type::int()));
    }

    if op.is_comparison() {
        return make_comparison(parser, op, lhs, rhs);
    }

    match op {
        BinOp::Add => make_add_sub(parser, BinOp::Add, lhs, rhs),
        BinOp::Sub => make_add_sub(parser, BinOp::Sub, lhs, rhs),
        BinOp::Mul | BinOp::Div => {
            if !is_arithmetic(&lhs.ty) || !is_arithmetic(&rhs.ty) {
                return Err(invalid_operand(parser, op_symbol(op), &pick_bad(&lhs, &rhs)));
            }
            let ty = usual_arithmetic_conversion(&lhs.ty, &rhs.ty);
            let lhs = coerce(parser, lhs, &ty)?;
            let rhs = coerce(parser, rhs, &ty)?;
            Ok(binary(op, lhs, rhs, ty))
        }
        BinOp::Mod | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
            if !lhs.ty.is_integer() || !rhs.ty.is_integer() {
                return Err(invalid_operand(parser, op_symbol(op), &pick_bad(&lhs, &rhs)));
            }
            let ty = usual_arithmetic_conversion(&lhs.ty, &rhs.ty);
            let lhs = coerce(parser, lhs, &ty)?;
            let rhs = coerce(parser, rhs, &ty)?;
            Ok(binary(op, lhs, rhs, ty))
        }
        BinOp::Shl | BinOp::Shr => {
            if !lhs.ty.is_integer() || !rhs.ty.is_integer() {
                return Err(invalid_operand(parser, op_symbol(op), &pick_bad(&lhs, &rhs)));
            }
            let lhs = promote_arithmetic(parser, lhs, op_symbol(op))?;
            let rhs = coerce(parser, rhs, &Type::int())?;
            let ty = lhs.ty.clone();
            Ok(binary(op, lhs, rhs, ty))
        }
        BinOp::LogAnd | BinOp::LogOr | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        | BinOp::Eq | BinOp::Ne => unreachable!("handled above"),
    }
}

/// `+`/`-` with the three C shapes: arithmetic, pointer ± integer (scaled
/// by pointee size), and pointer - pointer (byte difference divided back
/// down to an element count).
fn make_add_sub(parser: &Parser, op: BinOp, lhs: Expr, rhs: Expr) -> Result<Expr, ParserError> {
    if is_arithmetic(&lhs.ty) && is_arithmetic(&rhs.ty) {
        let ty = usual_arithmetic_conversion(&lhs.ty, &rhs.ty);
        let lhs = coerce(parser, lhs, &ty)?;
        let rhs = coerce(parser, rhs, &ty)?;
        return Ok(binary(op, lhs, rhs, ty));
    }

    if lhs.ty.is_pointer() && rhs.ty.is_integer() {
        let scaled = scale_index(parser, rhs, &lhs.ty)?;
        let ty = lhs.ty.clone();
        return Ok(binary(op, lhs, scaled, ty));
    }

    if op == BinOp::Add && lhs.ty.is_integer() && rhs.ty.is_pointer() {
        let scaled = scale_index(parser, lhs, &rhs.ty)?;
        let ty = rhs.ty.clone();
        return Ok(binary(op, rhs, scaled, ty));
    }

    if op == BinOp::Sub && lhs.ty.is_pointer() && rhs.ty.is_pointer() {
        let size = pointee_size(parser, &lhs.ty)?;
        let diff = binary(BinOp::Sub, lhs, rhs, Type::long());
        let count = binary(
            BinOp::Div,
            diff,
            Expr::new(ExprKind::IntLiteral(size as i64), Type::long()),
            Type::long(),
        );
        return Ok(count);
    }

    Err(invalid_operand(parser, op_symbol(op), &pick_bad(&lhs, &rhs)))
}

/// Bakes pointer-arithmetic scaling in as an explicit multiply of the
/// index by the pointee size.
fn scale_index(parser: &Parser, index: Expr, pointer_ty: &Type) -> Result<Expr, ParserError> {
    let size = pointee_size(parser, pointer_ty)?;
    let index = coerce(parser, index, &Type::long())?;
    Ok(binary(
        BinOp::Mul,
        index,
        Expr::new(ExprKind::IntLiteral(size as i64), Type::long()),
        Type::long(),
    ))
}

fn pointee_size(parser: &Parser, pointer_ty: &Type) -> Result<u32, ParserError> {
    let Some(pointee) = pointer_ty.pointee() else {
        return Err(invalid_operand(parser, "+", pointer_ty));
    };
    if pointee.is_void() {
        return Err(invalid_operand(parser, "+", pointer_ty));
    }
    Ok(pointee.size())
}

fn make_comparison(parser: &Parser, op: BinOp, lhs: Expr, rhs: Expr) -> Result<Expr, ParserError> {
    if is_arithmetic(&lhs.ty) && is_arithmetic(&rhs.ty) {
        let common = usual_arithmetic_conversion(&lhs.ty, &rhs.ty);
        let lhs = coerce(parser, lhs, &common)?;
        let rhs = coerce(parser, rhs, &common)?;
        return Ok(binary(op, lhs, rhs, Type::int()));
    }
    // Pointer comparisons; a bare integer (usually the 0 null constant)
    // converts to the pointer side's type.
    if lhs.ty.is_pointer() || rhs.ty.is_pointer() {
        let pointer_ty = if lhs.ty.is_pointer() {
            lhs.ty.clone()
        } else {
            rhs.ty.clone()
        };
        let lhs = coerce(parser, lhs, &pointer_ty)?;
        let rhs = coerce(parser, rhs, &pointer_ty)?;
        return Ok(binary(op, lhs, rhs, Type::int()));
    }
    Err(invalid_operand(parser, op_symbol(op), &pick_bad(&lhs, &rhs)))
}

/// Prefix `++`/`--` are `x += 1` / `x -= 1`, yielding the updated value.
fn make_step_assignment(parser: &Parser, target: Expr, op: BinOp) -> Result<Expr, ParserError> {
    let one = Expr::new(ExprKind::IntLiteral(1), Type::int());
    make_compound_assignment(parser, op, target, one)
}

/// `target op= value` as one read-modify-write node. The operand checks
/// and the promoted operation type mirror the matching binary operator,
/// with pointer `+=`/`-=` scaling the step by the pointee size; the
/// result narrows back to the target type on store. The target never
/// gets duplicated into the value side, so `a[i++] += 2` bumps `i` once
/// and touches one element.
fn make_compound_assignment(
    parser: &Parser,
    op: BinOp,
    target: Expr,
    rhs: Expr,
) -> Result<Expr, ParserError> {
    require_lvalue(parser, &target)?;
    let rhs = decay(rhs);
    let target_ty = target.ty.clone();

    if target_ty.is_pointer() && matches!(op, BinOp::Add | BinOp::Sub) && rhs.ty.is_integer() {
        let value = scale_index(parser, rhs, &target_ty)?;
        return Ok(Expr::new(
            ExprKind::CompoundAssign {
                target: Box::new(target),
                op,
                value: Box::new(value),
                op_ty: target_ty.clone(),
            },
            target_ty,
        ));
    }

    let valid = match op {
        BinOp::Mod => target_ty.is_integer() && rhs.ty.is_integer(),
        _ => is_arithmetic(&target_ty) && is_arithmetic(&rhs.ty),
    };
    if !valid {
        return Err(invalid_operand(
            parser,
            op_symbol(op),
            &pick_bad(&target, &rhs),
        ));
    }
    let op_ty = usual_arithmetic_conversion(&target_ty, &rhs.ty);
    let value = coerce(parser, rhs, &op_ty)?;
    Ok(Expr::new(
        ExprKind::CompoundAssign {
            target: Box::new(target),
            op,
            value: Box::new(value),
            op_ty,
        },
        target_ty,
    ))
}

/// Integer promotion with `int` as the floor; floats pass through.
fn promote_arithmetic(parser: &Parser, expr: Expr, op: &'static str) -> Result<Expr, ParserError> {
    if expr.ty.is_floating() {
        return Ok(expr);
    }
    if !expr.ty.is_integer() {
        return Err(invalid_operand(parser, op, &expr.ty));
    }
    if expr.ty.get_integer_rank() < Type::int().get_integer_rank() {
        return coerce(parser, expr, &Type::int());
    }
    Ok(expr)
}

fn require_lvalue(parser: &Parser, expr: &Expr) -> Result<(), ParserError> {
    match expr.kind {
        ExprKind::Var(_) | ExprKind::Deref(_) | ExprKind::Member { .. } => Ok(()),
        _ => Err(invalid_operand(parser, "assignment", &expr.ty)),
    }
}

/// Chases an incomplete forward-declared layout to its completed
/// definition in the symbol table.
fn record_layout_of(parser: &Parser, ty: &Type) -> Result<Rc<StructLayout>, ParserError> {
    let Some(layout) = ty.struct_layout() else {
        return Err(invalid_operand(parser, ".", ty));
    };
    if layout.is_incomplete() {
        return parser
            .table
            .lookup_record(parser.scope(), &layout.tag, layout.is_union)
            .map_err(|e| parser.semantic(e));
    }
    Ok(layout.clone())
}

fn binary(op: BinOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    Expr::new(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

fn is_arithmetic(ty: &Type) -> bool {
    ty.is_integer() || ty.is_floating()
}

fn pick_bad(lhs: &Expr, rhs: &Expr) -> Type {
    if is_arithmetic(&lhs.ty) {
        rhs.ty.clone()
    } else {
        lhs.ty.clone()
    }
}

fn invalid_operand(parser: &Parser, op: &'static str, ty: &Type) -> ParserError {
    parser.semantic(SemanticError::InvalidOperand {
        op,
        ty: ty.to_string(),
    })
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::BitAnd => "&",
        BinOp::BitOr => "|",
        BinOp::BitXor => "^",
        BinOp::Shl => "<<",
        BinOp::Shr => ">>",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::LogAnd => "&&",
        BinOp::LogOr => "||",
    }
}
