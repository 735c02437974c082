//! Statement parsing: control flow, blocks, and expression statements.
//!
//! `while` and `for` collapse into one loop node; `switch` bodies run in a
//! dedicated switch scope so the case labels registered inside can be
//! collected from the scope tree afterwards.

use log::debug;
use thin_vec::ThinVec;

use crate::lexer::TokenKind;
use crate::parser::ast::Stmt;
use crate::parser::error::ParserError;
use crate::parser::{Parser, declarations, expressions};
use crate::symbol_table::{ScopeId, SemanticError, ValueLabel};
use crate::types::Type;

/// Parses the items of a brace-enclosed body into `out`. The caller has
/// consumed the opening brace and owns the enclosing scope.
pub(crate) fn parse_block_body(
    parser: &mut Parser,
    out: &mut ThinVec<Stmt>,
) -> Result<(), ParserError> {
    while !parser.accept(&TokenKind::RightBrace) {
        if parser.is_declaration_start() {
            out.extend(declarations::parse_local_declaration(parser)?);
        } else {
            out.push(parse_statement(parser)?);
        }
    }
    Ok(())
}

pub(crate) fn parse_statement(parser: &mut Parser) -> Result<Stmt, ParserError> {
    debug!("parse_statement: at '{}'", parser.current_kind());
    match parser.current_kind().clone() {
        TokenKind::LeftBrace => parse_block(parser),
        TokenKind::If => parse_if(parser),
        TokenKind::While => parse_while(parser),
        TokenKind::For => parse_for(parser),
        TokenKind::Do => parse_do_while(parser),
        TokenKind::Switch => parse_switch(parser),
        TokenKind::Case => parse_case(parser),
        TokenKind::Default => parse_default(parser),
        TokenKind::Break => {
            if parser.loop_depth == 0 && !in_switch(parser) {
                return Err(parser.unexpected());
            }
            parser.advance();
            parser.expect(TokenKind::Semicolon)?;
            Ok(Stmt::Break)
        }
        TokenKind::Continue => {
            if parser.loop_depth == 0 {
                return Err(parser.unexpected());
            }
            parser.advance();
            parser.expect(TokenKind::Semicolon)?;
            Ok(Stmt::Continue)
        }
        TokenKind::Goto => {
            parser.advance();
            let name = parser.expect_identifier()?;
            parser.expect(TokenKind::Semicolon)?;
            Ok(Stmt::Goto(name))
        }
        TokenKind::Return => parse_return(parser),
        TokenKind::Semicolon => {
            parser.advance();
            Ok(Stmt::Empty)
        }
        TokenKind::Identifier(name) if *parser.peek_kind(1) == TokenKind::Colon => {
            parser.advance();
            parser.advance();
            let stmt = parse_statement(parser)?;
            Ok(Stmt::Label {
                name,
                stmt: Box::new(stmt),
            })
        }
        _ => {
            let expr = expressions::parse_expression(parser)?;
            parser.expect(TokenKind::Semicolon)?;
            Ok(Stmt::Expr(expr))
        }
    }
}

fn parse_block(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::LeftBrace)?;
    parser.table.push_scope();
    let mut stmts = ThinVec::new();
    let body = parse_block_body(parser, &mut stmts);
    parser.table.pop_scope();
    body?;
    Ok(Stmt::Block(stmts))
}

fn parse_if(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::If)?;
    parser.expect(TokenKind::LeftParen)?;
    let cond = expressions::parse_condition(parser)?;
    parser.expect(TokenKind::RightParen)?;
    let then_branch = Box::new(parse_statement(parser)?);
    let else_branch = if parser.accept(&TokenKind::Else) {
        Some(Box::new(parse_statement(parser)?))
    } else {
        None
    };
    Ok(Stmt::If {
        cond,
        then_branch,
        else_branch,
    })
}

fn parse_while(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::While)?;
    parser.expect(TokenKind::LeftParen)?;
    let cond = expressions::parse_condition(parser)?;
    parser.expect(TokenKind::RightParen)?;
    parser.loop_depth += 1;
    let body = parse_statement(parser);
    parser.loop_depth -= 1;
    Ok(Stmt::Loop {
        init: ThinVec::new(),
        cond: Some(cond),
        step: None,
        body: Box::new(body?),
    })
}

/// `for` gets its own scope so an induction variable declared in the
/// init clause dies with the loop.
fn parse_for(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::For)?;
    parser.expect(TokenKind::LeftParen)?;
    parser.table.push_scope();

    let result = (|| {
        let mut init = ThinVec::new();
        if !parser.accept(&TokenKind::Semicolon) {
            if parser.is_declaration_start() {
                init = declarations::parse_local_declaration(parser)?;
            } else {
                let expr = expressions::parse_expression(parser)?;
                parser.expect(TokenKind::Semicolon)?;
                init.push(Stmt::Expr(expr));
            }
        }
        let cond = if parser.accept(&TokenKind::Semicolon) {
            None
        } else {
            let cond = expressions::parse_condition(parser)?;
            parser.expect(TokenKind::Semicolon)?;
            Some(cond)
        };
        let step = if parser.accept(&TokenKind::RightParen) {
            None
        } else {
            let step = expressions::parse_expression(parser)?;
            parser.expect(TokenKind::RightParen)?;
            Some(step)
        };
        parser.loop_depth += 1;
        let body = parse_statement(parser);
        parser.loop_depth -= 1;
        Ok(Stmt::Loop {
            init,
            cond,
            step,
            body: Box::new(body?),
        })
    })();

    parser.table.pop_scope();
    result
}

fn parse_do_while(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::Do)?;
    parser.loop_depth += 1;
    let body = parse_statement(parser);
    parser.loop_depth -= 1;
    let body = body?;
    parser.expect(TokenKind::While)?;
    parser.expect(TokenKind::LeftParen)?;
    let cond = expressions::parse_condition(parser)?;
    parser.expect(TokenKind::RightParen)?;
    parser.expect(TokenKind::Semicolon)?;
    Ok(Stmt::DoWhile {
        body: Box::new(body),
        cond,
    })
}

fn parse_switch(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::Switch)?;
    parser.expect(TokenKind::LeftParen)?;
    let cond = expressions::parse_expression(parser)?;
    if !cond.ty.is_integer() {
        return Err(parser.semantic(SemanticError::InvalidOperand {
            op: "switch",
            ty: cond.ty.to_string(),
        }));
    }
    parser.expect(TokenKind::RightParen)?;

    let scope = parser.table.push_switch_scope();
    let body = parse_statement(parser);
    parser.table.pop_scope();

    Ok(Stmt::Switch {
        cond,
        body: Box::new(body?),
        scope,
    })
}

fn parse_case(parser: &mut Parser) -> Result<Stmt, ParserError> {
    let Some(switch_scope) = parser.table.enclosing_switch(parser.scope()) else {
        return Err(parser.unexpected());
    };
    parser.expect(TokenKind::Case)?;
    let value = declarations::const_int_expr(parser)?;
    require_fresh_label(parser, switch_scope, Some(value))?;
    parser.expect(TokenKind::Colon)?;

    let id = parser.next_case_id;
    parser.next_case_id += 1;
    parser
        .table
        .insert_label(parser.scope(), ValueLabel {
            value: Some(value),
            id,
        });

    let stmt = parse_statement(parser)?;
    Ok(Stmt::Case {
        id,
        stmt: Box::new(stmt),
    })
}

fn parse_default(parser: &mut Parser) -> Result<Stmt, ParserError> {
    let Some(switch_scope) = parser.table.enclosing_switch(parser.scope()) else {
        return Err(parser.unexpected());
    };
    parser.expect(TokenKind::Default)?;
    require_fresh_label(parser, switch_scope, None)?;
    parser.expect(TokenKind::Colon)?;

    let id = parser.next_case_id;
    parser.next_case_id += 1;
    parser
        .table
        .insert_label(parser.scope(), ValueLabel { value: None, id });

    let stmt = parse_statement(parser)?;
    Ok(Stmt::Case {
        id,
        stmt: Box::new(stmt),
    })
}

fn parse_return(parser: &mut Parser) -> Result<Stmt, ParserError> {
    parser.expect(TokenKind::Return)?;
    let return_ty = parser.current_return_type.clone().unwrap_or_else(Type::int);

    if parser.accept(&TokenKind::Semicolon) {
        return Ok(Stmt::Return(None));
    }

    let expr = expressions::parse_expression(parser)?;
    if return_ty.is_void() {
        return Err(parser.semantic(SemanticError::InvalidOperand {
            op: "return",
            ty: expr.ty.to_string(),
        }));
    }
    let expr = expressions::coerce(parser, expr, &return_ty)?;
    parser.expect(TokenKind::Semicolon)?;
    Ok(Stmt::Return(Some(expr)))
}

/// Whether the statement sits under a switch; `break` is legal there
/// even outside any loop.
fn in_switch(parser: &Parser) -> bool {
    parser.table.enclosing_switch(parser.scope()).is_some()
}

/// A `case` value or `default` may appear once per switch. Labels of a
/// nested switch live in their own scope and never collide with the
/// enclosing one.
fn require_fresh_label(
    parser: &Parser,
    switch_scope: ScopeId,
    value: Option<i64>,
) -> Result<(), ParserError> {
    let taken = parser
        .table
        .collect_switch_case_labels(switch_scope)
        .iter()
        .any(|label| label.value == value);
    if taken {
        let name = match value {
            Some(v) => format!("case {v}"),
            None => "default".to_string(),
        };
        return Err(parser.semantic(SemanticError::Redefinition(name)));
    }
    Ok(())
}
