//! Recursive-descent parser.
//!
//! One pass over the token stream builds the AST, resolves every identifier
//! against the symbol table as it goes, assigns frame offsets to locals, and
//! annotates each expression node with its resolved operand type. There is
//! no later checking pass; what the code generator receives is final.

use log::debug;

use crate::lexer::{Token, TokenKind};
use crate::symbol_table::{ScopeId, SemanticError, SymbolTable};
use crate::types::Type;

pub mod ast;
pub mod declarations;
pub mod error;
pub mod expressions;
pub mod statements;

use ast::TranslationUnit;
use error::ParserError;

/// A parser that converts a stream of tokens into an abstract syntax tree,
/// populating the scope-tree symbol table as a side effect.
pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    pub(crate) table: SymbolTable,
    /// Return type of the function currently being parsed; `return`
    /// expressions are coerced to it.
    pub(crate) current_return_type: Option<Type>,
    /// Ids handed to `case`/`default` labels, unique per translation unit.
    pub(crate) next_case_id: u32,
    /// Counter for generated tags of anonymous structs/unions/enums.
    pub(crate) next_anon_tag: u32,
    /// Loop nesting depth; `break`/`continue` placement is checked against
    /// it (switches count for `break` via the scope's label prefix).
    pub(crate) loop_depth: u32,
}

impl Parser {
    /// Creates a new `Parser` over a lexed token stream. The stream must be
    /// terminated by an `EndOfFile` token, which the lexer guarantees.
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            position: 0,
            table: SymbolTable::new(),
            current_return_type: None,
            next_case_id: 1,
            next_anon_tag: 0,
            loop_depth: 0,
        }
    }

    /// Parses a whole translation unit, consuming the parser. Returns the
    /// AST together with the populated symbol table the code generator
    /// reads frame offsets and data declarations from.
    pub fn parse(mut self) -> Result<(TranslationUnit, SymbolTable), ParserError> {
        let mut unit = TranslationUnit::default();
        while *self.current_kind() != TokenKind::EndOfFile {
            declarations::parse_top_level(&mut self, &mut unit)?;
        }
        debug!("parsed {} function definitions", unit.functions.len());
        Ok((unit, self.table))
    }

    /// Returns the current token without consuming it. Safe at any cursor
    /// position because the stream ends with a sticky `EndOfFile`.
    pub(crate) fn current(&self) -> &Token {
        let idx = self.position.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub(crate) fn current_kind(&self) -> &TokenKind {
        &self.current().kind
    }

    /// Returns the token `n` positions ahead of the cursor.
    pub(crate) fn peek_kind(&self, n: usize) -> &TokenKind {
        let idx = (self.position + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    /// Consumes and returns the current token.
    pub(crate) fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    /// Consumes the current token if it matches `kind`, leaving the cursor
    /// untouched otherwise.
    pub(crate) fn accept(&mut self, kind: &TokenKind) -> bool {
        if self.current_kind() == kind {
            self.advance();
            return true;
        }
        false
    }

    /// Consumes the current token or fails with an `ExpectedToken` error.
    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token, ParserError> {
        if self.current_kind() == &kind {
            return Ok(self.advance());
        }
        let found = self.current();
        Err(ParserError::ExpectedToken {
            expected: kind,
            found: found.kind.clone(),
            line: found.line,
            col: found.col,
        })
    }

    /// Rewinds the cursor by `n` tokens. Used for the short lookaheads that
    /// keep the grammar LL(1) everywhere else, e.g. telling a cast apart
    /// from a parenthesized expression.
    pub(crate) fn token_go_back(&mut self, n: usize) {
        debug_assert!(n <= self.position);
        self.position -= n;
    }

    /// Consumes an identifier token if one is current.
    pub(crate) fn accept_identifier(&mut self) -> Option<String> {
        if let TokenKind::Identifier(name) = self.current_kind() {
            let name = name.clone();
            self.advance();
            return Some(name);
        }
        None
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParserError> {
        match self.accept_identifier() {
            Some(name) => Ok(name),
            None => {
                let found = self.current();
                Err(ParserError::ExpectedIdentifier {
                    found: found.kind.clone(),
                    line: found.line,
                    col: found.col,
                })
            }
        }
    }

    /// The standard "this token does not belong here" error.
    pub(crate) fn unexpected(&self) -> ParserError {
        let token = self.current();
        ParserError::UnexpectedToken {
            kind: token.kind.clone(),
            line: token.line,
            col: token.col,
        }
    }

    /// Wraps a symbol-table failure with the current source position.
    pub(crate) fn semantic(&self, source: SemanticError) -> ParserError {
        let token = self.current();
        ParserError::Semantic {
            source,
            line: token.line,
            col: token.col,
        }
    }

    pub(crate) fn unsupported(&self, what: &'static str) -> ParserError {
        let token = self.current();
        ParserError::Unsupported {
            what,
            line: token.line,
            col: token.col,
        }
    }

    pub(crate) fn scope(&self) -> ScopeId {
        self.table.current_scope()
    }

    /// Whether the current token can begin a declaration, accounting for
    /// typedef names registered so far.
    pub(crate) fn is_declaration_start(&self) -> bool {
        let is_typedef_name = match self.current_kind() {
            TokenKind::Identifier(name) => self.table.find_typedef(self.scope(), name).is_some(),
            _ => false,
        };
        self.current_kind().is_declaration_start(is_typedef_name)
    }

    /// Whether the current token begins a type name (for casts and sizeof).
    pub(crate) fn is_type_name(&self) -> bool {
        match self.current_kind() {
            TokenKind::Identifier(name) => self.table.find_typedef(self.scope(), name).is_some(),
            kind => kind.is_type_specifier() || *kind == TokenKind::Const,
        }
    }

    pub(crate) fn fresh_anon_tag(&mut self, what: &str) -> String {
        let tag = format!("__anon.{}.{}", what, self.next_anon_tag);
        self.next_anon_tag += 1;
        tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::ast::{ExprKind, Stmt, VarRef};
    use crate::symbol_table::ScopeId;

    fn parse(src: &str) -> (TranslationUnit, SymbolTable) {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(src: &str) -> ParserError {
        let tokens = Lexer::new(src).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    #[test]
    fn cursor_primitives_accept_and_rewind() {
        let tokens = Lexer::new("int x ;").tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        assert!(parser.accept(&TokenKind::Int));
        assert!(!parser.accept(&TokenKind::Int));
        assert_eq!(parser.accept_identifier().as_deref(), Some("x"));
        parser.token_go_back(1);
        assert_eq!(parser.accept_identifier().as_deref(), Some("x"));
        assert!(parser.expect(TokenKind::Semicolon).is_ok());
        assert_eq!(*parser.current_kind(), TokenKind::EndOfFile);
    }

    #[test]
    fn expect_reports_position() {
        let tokens = Lexer::new("int\nx").tokenize().unwrap();
        let mut parser = Parser::new(tokens);
        parser.advance();
        let err = parser.expect(TokenKind::Semicolon).unwrap_err();
        assert_eq!(err.location(), Some((2, 1)));
    }

    #[test]
    fn parses_minimal_main() {
        let (unit, table) = parse("int main() { return 0; }");
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].name, "main");
        let func = table.find_func(ScopeId::GLOBAL, "main").unwrap();
        assert!(func.is_defined);
        assert_eq!(func.return_type, Type::int());
    }

    #[test]
    fn locals_get_distinct_frame_offsets() {
        let (unit, _) = parse("int main() { int a; int b; a = 1; b = 2; return a; }");
        let body = &unit.functions[0].body;
        let mut offsets = Vec::new();
        for stmt in body.iter() {
            if let Stmt::Expr(e) = stmt
                && let ExprKind::Assign { target, .. } = &e.kind
                && let ExprKind::Var(VarRef::Local { offset, .. }) = &target.kind
            {
                offsets.push(*offset);
            }
        }
        assert_eq!(offsets, vec![-4, -8]);
    }

    #[test]
    fn offsets_are_deterministic_across_parses() {
        let src = "int main() { int a; long b; char c; a = 1; b = 2; c = 3; return 0; }";
        let first = parse(src);
        let second = parse(src);
        assert_eq!(first.0, second.0);
    }

    #[test]
    fn expression_nodes_carry_resolved_types() {
        let (unit, _) = parse("int main() { int a; a = 1; return a + 2; }");
        let body = &unit.functions[0].body;
        let Some(Stmt::Return(Some(expr))) = body.last() else {
            panic!("expected return with a value");
        };
        assert_eq!(expr.ty, Type::int());
    }

    #[test]
    fn int_plus_long_widens_to_long() {
        let (unit, _) = parse("long f() { int a; long b; a = 1; b = 2; return a + b; }");
        let body = &unit.functions[0].body;
        let Some(Stmt::Return(Some(expr))) = body.last() else {
            panic!("expected return with a value");
        };
        assert_eq!(expr.ty, Type::long());
        let ExprKind::Binary { lhs, .. } = &expr.kind else {
            panic!("expected binary add");
        };
        // The narrower operand is wrapped in an explicit widening cast.
        assert!(matches!(lhs.kind, ExprKind::Cast { .. }));
        assert_eq!(lhs.ty, Type::long());
    }

    #[test]
    fn pointer_addition_scales_by_pointee_size() {
        let (unit, _) = parse("int f(int *p) { return *(p + 2); }");
        let body = &unit.functions[0].body;
        let Some(Stmt::Return(Some(expr))) = body.last() else {
            panic!("expected return with a value");
        };
        let ExprKind::Deref(inner) = &expr.kind else {
            panic!("expected deref");
        };
        let ExprKind::Binary { rhs, .. } = &inner.kind else {
            panic!("expected scaled add");
        };
        // The index operand is itself a multiplication by sizeof(int).
        let ExprKind::Binary { rhs: scale, .. } = &rhs.kind else {
            panic!("expected scaling multiply");
        };
        assert!(matches!(scale.kind, ExprKind::IntLiteral(4)));
    }

    #[test]
    fn cast_and_parenthesized_expression_disambiguate() {
        // `(int)x` must parse as a cast, `(x + 1)` as an expression.
        let (unit, _) = parse("int main() { long x; x = 5; return (int)x + (x + 1) * 0; }");
        assert_eq!(unit.functions.len(), 1);
    }

    #[test]
    fn undefined_variable_is_a_semantic_error() {
        let err = parse_err("int main() { return missing; }");
        assert!(matches!(
            err,
            ParserError::Semantic {
                source: SemanticError::UndefinedSymbol(ref name),
                ..
            } if name == "missing"
        ));
    }

    #[test]
    fn undefined_function_is_a_semantic_error() {
        let err = parse_err("int main() { return missing(); }");
        assert!(matches!(
            err,
            ParserError::Semantic {
                source: SemanticError::UndefinedSymbol(_),
                ..
            }
        ));
    }

    #[test]
    fn stray_token_is_a_parse_error() {
        let err = parse_err("int main() { return 0; } }");
        assert!(matches!(err, ParserError::UnexpectedToken { .. }));
    }

    #[test]
    fn struct_member_access_uses_precomputed_offset() {
        let (unit, _) = parse(
            "struct point { int x; int y; };\n\
             int main() { struct point p; p.y = 3; return p.y; }",
        );
        let body = &unit.functions[0].body;
        let Some(Stmt::Return(Some(expr))) = body.last() else {
            panic!("expected return with a value");
        };
        let ExprKind::Member { offset, .. } = &expr.kind else {
            panic!("expected member access");
        };
        assert_eq!(*offset, 4);
    }

    #[test]
    fn enum_constants_resolve_to_int_literals() {
        let (unit, _) = parse("enum color { RED, GREEN = 5, BLUE };\nint main() { return BLUE; }");
        let body = &unit.functions[0].body;
        let Some(Stmt::Return(Some(expr))) = body.last() else {
            panic!("expected return with a value");
        };
        assert!(matches!(expr.kind, ExprKind::IntLiteral(6)));
    }

    #[test]
    fn typedef_names_parse_as_types() {
        let (unit, table) = parse("typedef long word;\nword main() { word w; w = 9; return w; }");
        assert_eq!(unit.functions.len(), 1);
        let func = table.find_func(ScopeId::GLOBAL, "main").unwrap();
        assert_eq!(func.return_type, Type::long());
    }

    #[test]
    fn switch_cases_register_value_labels() {
        let (unit, table) = parse(
            "int main(int argc, char **argv) {\n\
               switch (argc) { case 1: return 1; default: return 9; }\n\
             }",
        );
        let body = &unit.functions[0].body;
        let Some(Stmt::Switch { scope, .. }) = body.last() else {
            panic!("expected switch statement");
        };
        let labels = table.collect_switch_case_labels(*scope);
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].value, Some(1));
        assert_eq!(labels[1].value, None);
    }

    #[test]
    fn string_literals_type_as_char_pointer() {
        let (unit, _) = parse("int puts(char *s);\nint main() { puts(\"hi\"); return 0; }");
        let Stmt::Expr(call) = &unit.functions[0].body[0] else {
            panic!("expected call statement");
        };
        let ExprKind::Call { args, .. } = &call.kind else {
            panic!("expected call");
        };
        assert_eq!(args[0].expr.ty, Type::char_ty().pointer_to());
    }

    #[test]
    fn sizeof_folds_to_a_constant() {
        let (unit, _) = parse(
            "struct pair { long a; long b; };\n\
             int main() { return sizeof(struct pair); }",
        );
        let Some(Stmt::Return(Some(expr))) = unit.functions[0].body.last() else {
            panic!("expected return");
        };
        // Folded at parse time; the return coercion may wrap it in a cast.
        match &expr.kind {
            ExprKind::IntLiteral(16) => {}
            ExprKind::Cast { operand } => {
                assert!(matches!(operand.kind, ExprKind::IntLiteral(16)));
            }
            other => panic!("expected folded sizeof, got {other:?}"),
        }
    }

    #[test]
    fn variadic_declaration_parses() {
        let (_, table) = parse("int printf(char *fmt, ...);\nint main() { return 0; }");
        let func = table.find_func(ScopeId::GLOBAL, "printf").unwrap();
        assert!(func.is_variadic);
        assert!(!func.is_defined);
        assert_eq!(func.params.len(), 1);
    }

    #[test]
    fn globals_do_not_get_stack_offsets() {
        let (_, table) = parse("int counter = 7;\nint main() { return counter; }");
        let var = table.lookup_var(ScopeId::GLOBAL, "counter").unwrap();
        assert!(var.is_global());
        assert_eq!(var.stack_offset, 0);
        assert_eq!(var.init, Some(crate::symbol_table::ConstValue::Int(7)));
    }

    #[test]
    fn function_stack_space_accumulates_block_scopes() {
        let (_, table) = parse(
            "int main() {\n\
               int a;\n\
               { long b; b = 1; a = b; }\n\
               { char c; c = 2; a = c; }\n\
               return a;\n\
             }",
        );
        let func = table.find_func(ScopeId::GLOBAL, "main").unwrap();
        // 4 for `a`, then the long block widens the high-water mark to 16.
        assert!(func.stack_space_used >= 16);
    }

    #[test]
    fn record_types_cannot_be_dereferenced() {
        let err = parse_err(
            "struct s { int x; };\n\
             int main() { struct s v; return *v; }",
        );
        assert!(matches!(err, ParserError::Semantic { .. }));
    }
}
