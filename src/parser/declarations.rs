//! Declaration parsing: specifiers, declarators, records, enums, typedefs,
//! functions, and the constant-expression evaluator that feeds array
//! lengths, enum values, case labels, and global initializers.

use std::rc::Rc;

use log::debug;
use thin_vec::ThinVec;

use crate::lexer::TokenKind;
use crate::parser::ast::{self, Expr, ExprKind, Stmt, TranslationUnit, VarRef};
use crate::parser::error::ParserError;
use crate::parser::{Parser, expressions, statements};
use crate::symbol_table::{ConstValue, Function, Object, ScopeId, SemanticError, VarFlags, Variable};
use crate::types::{StructLayout, TyKind, Type};

/// Parsed declaration specifiers: the base type plus storage-class flags.
pub(crate) struct DeclSpec {
    pub base: Type,
    pub flags: VarFlags,
    pub is_typedef: bool,
}

/// One top-level construct: a type declaration, a global variable, or a
/// function declaration or definition.
pub(crate) fn parse_top_level(
    parser: &mut Parser,
    unit: &mut TranslationUnit,
) -> Result<(), ParserError> {
    let spec = parse_declaration_specifiers(parser)?;

    if spec.is_typedef {
        parse_typedef_declarators(parser, &spec)?;
        return Ok(());
    }

    // A bare `struct s { ... };` or `enum e { ... };` declares only the type.
    if parser.accept(&TokenKind::Semicolon) {
        return Ok(());
    }

    let (name, ty) = parse_declarator(parser, spec.base.clone())?;

    if *parser.current_kind() == TokenKind::LeftParen {
        return parse_function(parser, unit, name, ty);
    }

    let mut name = name;
    let mut ty = ty;
    loop {
        declare_global(parser, name, ty, &spec)?;
        if !parser.accept(&TokenKind::Comma) {
            break;
        }
        let next = parse_declarator(parser, spec.base.clone())?;
        name = next.0;
        ty = next.1;
    }
    parser.expect(TokenKind::Semicolon)?;
    Ok(())
}

/// Declaration specifiers: storage classes, qualifiers, and the base type.
/// `short`/`long`/`int` combine by width; everything else stands alone.
pub(crate) fn parse_declaration_specifiers(parser: &mut Parser) -> Result<DeclSpec, ParserError> {
    let mut flags = VarFlags::empty();
    let mut is_typedef = false;
    let mut base: Option<Type> = None;
    let mut longs = 0u32;
    let mut short_seen = false;
    let mut int_seen = false;

    loop {
        let kind = parser.current_kind().clone();
        match kind {
            TokenKind::Extern => {
                parser.advance();
                flags |= VarFlags::EXTERN;
            }
            TokenKind::Static => {
                parser.advance();
                flags |= VarFlags::STATIC;
            }
            TokenKind::Const => {
                parser.advance();
                flags |= VarFlags::CONST;
            }
            TokenKind::Typedef => {
                parser.advance();
                is_typedef = true;
            }
            TokenKind::Void => {
                parser.advance();
                base = Some(Type::void());
            }
            TokenKind::Bool => {
                parser.advance();
                base = Some(Type::new(TyKind::Bool));
            }
            TokenKind::Char => {
                parser.advance();
                base = Some(Type::char_ty());
            }
            TokenKind::Float => {
                parser.advance();
                base = Some(Type::new(TyKind::Float));
            }
            TokenKind::Double => {
                parser.advance();
                base = Some(Type::double());
            }
            TokenKind::Int => {
                parser.advance();
                int_seen = true;
            }
            TokenKind::Short => {
                parser.advance();
                short_seen = true;
            }
            TokenKind::Long => {
                parser.advance();
                longs += 1;
            }
            TokenKind::Struct => {
                parser.advance();
                base = Some(parse_record_specifier(parser, false)?);
            }
            TokenKind::Union => {
                parser.advance();
                base = Some(parse_record_specifier(parser, true)?);
            }
            TokenKind::Enum => {
                parser.advance();
                base = Some(parse_enum_specifier(parser)?);
            }
            TokenKind::Identifier(name) => {
                if base.is_some() || longs > 0 || short_seen || int_seen {
                    break;
                }
                match parser.table.find_typedef(parser.scope(), &name) {
                    Some(ty) => {
                        parser.advance();
                        base = Some(ty);
                    }
                    None => break,
                }
            }
            _ => break,
        }
    }

    let base = match base {
        Some(ty) => ty,
        None if short_seen => Type::new(TyKind::Short),
        None if longs > 0 => Type::long(),
        None if int_seen => Type::int(),
        None => return Err(parser.unexpected()),
    };

    Ok(DeclSpec {
        base,
        flags,
        is_typedef,
    })
}

/// A named declarator: leading `*`s, the name, and an optional single
/// array dimension.
pub(crate) fn parse_declarator(
    parser: &mut Parser,
    mut ty: Type,
) -> Result<(String, Type), ParserError> {
    while parser.accept(&TokenKind::Star) {
        while parser.accept(&TokenKind::Const) {}
        ty = ty.pointer_to();
    }
    let name = parser.expect_identifier()?;
    if parser.accept(&TokenKind::LeftBracket) {
        let len = const_int_expr(parser)?;
        parser.expect(TokenKind::RightBracket)?;
        if *parser.current_kind() == TokenKind::LeftBracket {
            return Err(parser.unsupported("multidimensional arrays"));
        }
        if len <= 0 {
            return Err(parser.unsupported("arrays of non-positive length"));
        }
        ty = ty.array_of(len as u32);
    }
    Ok((name, ty))
}

/// An abstract type name, as used by casts and `sizeof`.
pub(crate) fn parse_type_name(parser: &mut Parser) -> Result<Type, ParserError> {
    let spec = parse_declaration_specifiers(parser)?;
    let mut ty = spec.base;
    while parser.accept(&TokenKind::Star) {
        while parser.accept(&TokenKind::Const) {}
        ty = ty.pointer_to();
    }
    Ok(ty)
}

/// `struct`/`union` specifier; the keyword itself is already consumed.
/// A body completes the tag in the current scope, a bare tag refers to the
/// nearest visible definition or forward-declares an incomplete one.
fn parse_record_specifier(parser: &mut Parser, is_union: bool) -> Result<Type, ParserError> {
    let tag = match parser.accept_identifier() {
        Some(tag) => tag,
        None => parser.fresh_anon_tag(if is_union { "union" } else { "struct" }),
    };

    if !parser.accept(&TokenKind::LeftBrace) {
        return match parser.table.lookup_record(parser.scope(), &tag, is_union) {
            Ok(layout) => Ok(Type::new(TyKind::Struct(layout))),
            Err(_) => {
                // Forward reference; only pointers to it are usable until
                // the tag is completed.
                let layout = Rc::new(StructLayout::incomplete(tag, is_union));
                parser
                    .table
                    .insert_object(parser.scope(), Object::Record(layout.clone()));
                Ok(Type::new(TyKind::Struct(layout)))
            }
        };
    }

    let scope = parser.scope();
    // Register the tag before the members so self-referential pointer
    // members resolve.
    parser
        .table
        .complete_record(scope, Rc::new(StructLayout::incomplete(tag.clone(), is_union)));

    let mut decls: Vec<(String, Type)> = Vec::new();
    while !parser.accept(&TokenKind::RightBrace) {
        let member_spec = parse_declaration_specifiers(parser)?;
        loop {
            let (member_name, member_ty) = parse_declarator(parser, member_spec.base.clone())?;
            if member_ty.ptr_depth == 0
                && let Some(layout) = member_ty.struct_layout()
                && layout.is_incomplete()
            {
                return Err(parser.semantic(SemanticError::UndefinedTag(layout.tag.clone())));
            }
            decls.push((member_name, member_ty));
            if !parser.accept(&TokenKind::Comma) {
                break;
            }
        }
        parser.expect(TokenKind::Semicolon)?;
    }

    let layout = Rc::new(StructLayout::compute(tag, is_union, decls));
    debug!(
        "declared {} '{}' (size {}, align {})",
        if is_union { "union" } else { "struct" },
        layout.tag,
        layout.size,
        layout.align
    );
    parser.table.complete_record(scope, layout.clone());
    Ok(Type::new(TyKind::Struct(layout)))
}

/// `enum` specifier; the keyword is already consumed. Constants count up
/// from zero unless reset by an explicit value.
fn parse_enum_specifier(parser: &mut Parser) -> Result<Type, ParserError> {
    let tag = match parser.accept_identifier() {
        Some(tag) => tag,
        None => parser.fresh_anon_tag("enum"),
    };

    if !parser.accept(&TokenKind::LeftBrace) {
        return Ok(Type::new(TyKind::Enum(tag)));
    }

    let mut constants = Vec::new();
    let mut next = 0i64;
    loop {
        let name = parser.expect_identifier()?;
        if parser.accept(&TokenKind::Assign) {
            next = const_int_expr(parser)?;
        }
        constants.push((name, next));
        next = next.wrapping_add(1);
        if !parser.accept(&TokenKind::Comma) {
            break;
        }
        if *parser.current_kind() == TokenKind::RightBrace {
            break;
        }
    }
    parser.expect(TokenKind::RightBrace)?;

    parser.table.insert_object(
        parser.scope(),
        Object::Enum {
            tag: tag.clone(),
            constants,
        },
    );
    Ok(Type::new(TyKind::Enum(tag)))
}

fn parse_typedef_declarators(parser: &mut Parser, spec: &DeclSpec) -> Result<(), ParserError> {
    loop {
        let (name, ty) = parse_declarator(parser, spec.base.clone())?;
        debug!("typedef '{}' = {}", name, ty);
        parser
            .table
            .insert_object(parser.scope(), Object::Typedef { name, ty });
        if !parser.accept(&TokenKind::Comma) {
            break;
        }
    }
    parser.expect(TokenKind::Semicolon)?;
    Ok(())
}

/// A function declaration or definition, entered at the opening paren of
/// the parameter list. Definitions allocate parameter slots in the body
/// scope immediately so parameter offsets precede every local's.
fn parse_function(
    parser: &mut Parser,
    unit: &mut TranslationUnit,
    name: String,
    return_type: Type,
) -> Result<(), ParserError> {
    parser.expect(TokenKind::LeftParen)?;
    let (params, is_variadic) = parse_parameter_list(parser)?;

    if parser.accept(&TokenKind::Semicolon) {
        let func = Function {
            name,
            params,
            return_type,
            stack_space_used: 0,
            is_defined: false,
            is_variadic,
        };
        parser
            .table
            .insert_func(ScopeId::GLOBAL, func)
            .map_err(|e| parser.semantic(e))?;
        return Ok(());
    }

    for param in &params {
        if param.name.is_empty() {
            return Err(parser.unexpected());
        }
        if param.ty.ptr_depth == 0
            && let Some(layout) = param.ty.struct_layout()
            && layout.is_incomplete()
        {
            return Err(parser.semantic(SemanticError::UndefinedTag(layout.tag.clone())));
        }
    }

    debug!("parsing definition of '{}'", name);
    let scope = parser.table.push_function_scope();
    let mut placed = Vec::with_capacity(params.len());
    for mut param in params {
        param.stack_offset = parser.table.alloc_local(scope, &param.ty);
        param.flags |= VarFlags::ARGUMENT;
        placed.push(param.clone());
        parser
            .table
            .insert_var(scope, param)
            .map_err(|e| parser.semantic(e))?;
    }

    // Registered before the body so recursive calls resolve.
    let func = Function {
        name: name.clone(),
        params: placed,
        return_type: return_type.clone(),
        stack_space_used: 0,
        is_defined: true,
        is_variadic,
    };
    parser
        .table
        .insert_func(ScopeId::GLOBAL, func)
        .map_err(|e| parser.semantic(e))?;
    parser.current_return_type = Some(return_type);

    parser.expect(TokenKind::LeftBrace)?;
    let mut body = ThinVec::new();
    statements::parse_block_body(parser, &mut body)?;

    let frame = parser.table.get_scope(scope).cur_stack_offset;
    if let Some(func) = parser.table.get_func_mut(ScopeId::GLOBAL, &name) {
        func.stack_space_used = frame;
    }
    parser.table.pop_scope();
    parser.current_return_type = None;

    unit.functions.push(ast::Function { name, body });
    Ok(())
}

/// Parameter list up to and including the closing paren. `(void)` means
/// no parameters; a trailing `...` marks the function variadic. Array
/// parameters decay to pointers here.
fn parse_parameter_list(parser: &mut Parser) -> Result<(Vec<Variable>, bool), ParserError> {
    let mut params = Vec::new();
    let mut is_variadic = false;

    if parser.accept(&TokenKind::RightParen) {
        return Ok((params, is_variadic));
    }
    if *parser.current_kind() == TokenKind::Void && *parser.peek_kind(1) == TokenKind::RightParen {
        parser.advance();
        parser.advance();
        return Ok((params, is_variadic));
    }

    loop {
        if parser.accept(&TokenKind::Ellipsis) {
            is_variadic = true;
            break;
        }
        let spec = parse_declaration_specifiers(parser)?;
        let mut ty = spec.base;
        while parser.accept(&TokenKind::Star) {
            while parser.accept(&TokenKind::Const) {}
            ty = ty.pointer_to();
        }
        let param_name = parser.accept_identifier().unwrap_or_default();
        if parser.accept(&TokenKind::LeftBracket) {
            if !parser.accept(&TokenKind::RightBracket) {
                let _ = const_int_expr(parser)?;
                parser.expect(TokenKind::RightBracket)?;
            }
            ty = ty.pointer_to();
        }
        params.push(Variable::new(param_name, ty));
        if !parser.accept(&TokenKind::Comma) {
            break;
        }
    }
    parser.expect(TokenKind::RightParen)?;
    Ok((params, is_variadic))
}

fn declare_global(
    parser: &mut Parser,
    name: String,
    ty: Type,
    spec: &DeclSpec,
) -> Result<(), ParserError> {
    if ty.is_void() {
        return Err(parser.unsupported("variables of type void"));
    }
    let mut var = Variable::new(name, ty);
    var.flags |= VarFlags::GLOBAL | spec.flags;
    if parser.accept(&TokenKind::Assign) {
        var.init = Some(parse_const_initializer(parser, &var.ty)?);
    }
    debug!("declared global '{}'", var.name);
    parser
        .table
        .insert_var(ScopeId::GLOBAL, var)
        .map_err(|e| parser.semantic(e))?;
    Ok(())
}

/// A declaration in statement position. Returns the assignment statements
/// synthesized for any initializers, in declaration order.
pub(crate) fn parse_local_declaration(parser: &mut Parser) -> Result<ThinVec<Stmt>, ParserError> {
    let spec = parse_declaration_specifiers(parser)?;
    let mut stmts = ThinVec::new();

    if spec.is_typedef {
        parse_typedef_declarators(parser, &spec)?;
        return Ok(stmts);
    }
    if parser.accept(&TokenKind::Semicolon) {
        return Ok(stmts);
    }

    loop {
        let (name, ty) = parse_declarator(parser, spec.base.clone())?;
        declare_local(parser, name, ty, &spec, &mut stmts)?;
        if !parser.accept(&TokenKind::Comma) {
            break;
        }
    }
    parser.expect(TokenKind::Semicolon)?;
    Ok(stmts)
}

fn declare_local(
    parser: &mut Parser,
    name: String,
    ty: Type,
    spec: &DeclSpec,
    out: &mut ThinVec<Stmt>,
) -> Result<(), ParserError> {
    if ty.is_void() {
        return Err(parser.unsupported("variables of type void"));
    }
    if ty.ptr_depth == 0
        && let Some(layout) = ty.struct_layout()
        && layout.is_incomplete()
    {
        return Err(parser.semantic(SemanticError::UndefinedTag(layout.tag.clone())));
    }

    let mut var = Variable::new(name.clone(), ty.clone());
    var.flags |= spec.flags;

    // Statics and externs live in the data section, not the frame.
    if var.is_static() || var.flags.contains(VarFlags::EXTERN) {
        if parser.accept(&TokenKind::Assign) {
            var.init = Some(parse_const_initializer(parser, &ty)?);
        }
        parser
            .table
            .insert_var(parser.scope(), var)
            .map_err(|e| parser.semantic(e))?;
        return Ok(());
    }

    var.stack_offset = parser.table.alloc_local(parser.scope(), &ty);
    let offset = var.stack_offset;
    parser
        .table
        .insert_var(parser.scope(), var)
        .map_err(|e| parser.semantic(e))?;

    if parser.accept(&TokenKind::Assign) {
        if ty.is_aggregate() {
            return Err(parser.unsupported("aggregate initializers"));
        }
        let value = expressions::parse_assignment(parser)?;
        let value = expressions::coerce(parser, value, &ty)?;
        let target = Expr::new(ExprKind::Var(VarRef::Local { name, offset }), ty.clone());
        out.push(Stmt::Expr(Expr::new(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            ty,
        )));
    }
    Ok(())
}

/// Constant initializer for a global or static.
fn parse_const_initializer(parser: &mut Parser, ty: &Type) -> Result<ConstValue, ParserError> {
    match parser.current_kind().clone() {
        TokenKind::FloatConstant(v) => {
            parser.advance();
            Ok(ConstValue::Float(v))
        }
        TokenKind::Minus if matches!(parser.peek_kind(1), TokenKind::FloatConstant(_)) => {
            parser.advance();
            let TokenKind::FloatConstant(v) = parser.advance().kind else {
                return Err(parser.unexpected());
            };
            Ok(ConstValue::Float(-v))
        }
        TokenKind::StringLiteral(s) => {
            if ty.is_array() {
                if ty.kind != TyKind::Char {
                    return Err(parser.semantic(SemanticError::InvalidOperand {
                        op: "initializer",
                        ty: ty.to_string(),
                    }));
                }
                // The trailing NUL must fit in the object as well.
                if s.len() + 1 > ty.size() as usize {
                    let token = parser.current();
                    return Err(ParserError::OversizedInitializer {
                        ty: ty.to_string(),
                        len: s.len() + 1,
                        line: token.line,
                        col: token.col,
                    });
                }
            }
            parser.advance();
            Ok(ConstValue::Str(s))
        }
        _ if ty.is_floating() => Ok(ConstValue::Float(const_int_expr(parser)? as f64)),
        _ => Ok(ConstValue::Int(const_int_expr(parser)?)),
    }
}

/// Integer constant expression. Covers what array lengths, enum values,
/// case labels, and scalar global initializers need: literals, character
/// and enum constants, `sizeof(type)`, parentheses, unary sign, and the
/// additive/multiplicative operators.
pub(crate) fn const_int_expr(parser: &mut Parser) -> Result<i64, ParserError> {
    const_additive(parser)
}

fn const_additive(parser: &mut Parser) -> Result<i64, ParserError> {
    let mut value = const_multiplicative(parser)?;
    loop {
        if parser.accept(&TokenKind::Plus) {
            value = value.wrapping_add(const_multiplicative(parser)?);
        } else if parser.accept(&TokenKind::Minus) {
            value = value.wrapping_sub(const_multiplicative(parser)?);
        } else {
            return Ok(value);
        }
    }
}

fn const_multiplicative(parser: &mut Parser) -> Result<i64, ParserError> {
    let mut value = const_unary(parser)?;
    loop {
        if parser.accept(&TokenKind::Star) {
            value = value.wrapping_mul(const_unary(parser)?);
        } else if parser.accept(&TokenKind::Slash) {
            let divisor = const_unary(parser)?;
            value = value.checked_div(divisor).ok_or_else(|| not_constant(parser))?;
        } else if parser.accept(&TokenKind::Percent) {
            let divisor = const_unary(parser)?;
            value = value.checked_rem(divisor).ok_or_else(|| not_constant(parser))?;
        } else {
            return Ok(value);
        }
    }
}

fn const_unary(parser: &mut Parser) -> Result<i64, ParserError> {
    if parser.accept(&TokenKind::Minus) {
        return Ok(const_unary(parser)?.wrapping_neg());
    }
    if parser.accept(&TokenKind::Plus) {
        return const_unary(parser);
    }
    const_primary(parser)
}

fn const_primary(parser: &mut Parser) -> Result<i64, ParserError> {
    match parser.current_kind().clone() {
        TokenKind::IntegerConstant(v) => {
            parser.advance();
            Ok(v)
        }
        TokenKind::CharacterConstant(c) => {
            parser.advance();
            Ok(c as i64)
        }
        TokenKind::Identifier(name) => match parser.table.find_enum_constant(parser.scope(), &name)
        {
            Some(value) => {
                parser.advance();
                Ok(value)
            }
            None => Err(not_constant(parser)),
        },
        TokenKind::Sizeof => {
            parser.advance();
            parser.expect(TokenKind::LeftParen)?;
            let ty = parse_type_name(parser)?;
            parser.expect(TokenKind::RightParen)?;
            Ok(ty.size() as i64)
        }
        TokenKind::LeftParen => {
            parser.advance();
            let value = const_int_expr(parser)?;
            parser.expect(TokenKind::RightParen)?;
            Ok(value)
        }
        _ => Err(not_constant(parser)),
    }
}

fn not_constant(parser: &Parser) -> ParserError {
    let token = parser.current();
    ParserError::ExpectedConstant {
        line: token.line,
        col: token.col,
    }
}
