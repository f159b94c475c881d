use std::rc::Rc;

use anyhow::Result;

use crate::ast::{ClassDecl, Expr, ExprIdGen, ExprKind, FunctionDecl, Param, Stmt};
use crate::token::{Literal, Token, TokenKind};
use crate::types::TypeRef;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ids: &'a mut ExprIdGen,
    /// In REPL mode the final statement may omit its terminating `;`.
    repl: bool,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, ids: &'a mut ExprIdGen, repl: bool) -> Self {
        Self {
            tokens,
            pos: 0,
            ids,
            repl,
        }
    }

    pub fn parse_program(mut self) -> Result<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::Eof) {
            statements.push(self.parse_declaration()?);
        }
        Ok(statements)
    }

    fn parse_declaration(&mut self) -> Result<Stmt> {
        if self.consume_if(TokenKind::Var) {
            return self.parse_var_declaration();
        }
        if self.consume_if(TokenKind::Fun) {
            return Ok(Stmt::Function(self.parse_function()?));
        }
        if self.consume_if(TokenKind::Class) {
            return self.parse_class_declaration();
        }
        self.parse_statement()
    }

    fn parse_var_declaration(&mut self) -> Result<Stmt> {
        let name = self.expect(TokenKind::Identifier, "variable name")?;
        let type_ref = self.parse_annotation()?;
        let initializer = if self.consume_if(TokenKind::Equal) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_terminator()?;
        Ok(Stmt::Var {
            name,
            type_ref,
            initializer,
        })
    }

    fn parse_function(&mut self) -> Result<Rc<FunctionDecl>> {
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.expect(TokenKind::LeftParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                let param_name = self.expect(TokenKind::Identifier, "parameter name")?;
                let type_ref = self.parse_annotation()?;
                params.push(Param {
                    name: param_name,
                    type_ref,
                });
                if !self.consume_if(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RightParen, "')'")?;

        // Return annotation stays an unresolved slot when omitted; the type
        // passes diagnose the missing annotation, not the parser.
        let return_type = self.parse_annotation()?;

        self.expect(TokenKind::LeftBrace, "'{'")?;
        let body = self.parse_block_body()?;
        Ok(Rc::new(FunctionDecl {
            name,
            params,
            return_type,
            body,
        }))
    }

    fn parse_class_declaration(&mut self) -> Result<Stmt> {
        let name = self.expect(TokenKind::Identifier, "class name")?;
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.expect(TokenKind::Fun, "method declaration")?;
            methods.push(self.parse_function()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(Stmt::Class(Rc::new(ClassDecl { name, methods })))
    }

    fn parse_annotation(&mut self) -> Result<TypeRef> {
        if self.consume_if(TokenKind::Colon) {
            let specifier = self.expect(TokenKind::Identifier, "type name")?;
            Ok(TypeRef::with_specifier(specifier))
        } else {
            Ok(TypeRef::unresolved())
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if self.consume_if(TokenKind::Print) {
            let expr = self.parse_expression()?;
            self.expect_terminator()?;
            return Ok(Stmt::Print(expr));
        }
        if self.check(TokenKind::Return) {
            let keyword = self.advance();
            let value = if self.check(TokenKind::Semicolon) || self.check(TokenKind::Eof) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect_terminator()?;
            return Ok(Stmt::Return { keyword, value });
        }
        if self.consume_if(TokenKind::If) {
            return self.parse_if();
        }
        if self.consume_if(TokenKind::While) {
            return self.parse_while();
        }
        if self.consume_if(TokenKind::LeftBrace) {
            return Ok(Stmt::Block(self.parse_block_body()?));
        }
        if self.consume_if(TokenKind::Semicolon) {
            let empty = self.expr(ExprKind::Empty);
            return Ok(Stmt::Expression(empty));
        }
        let expr = self.parse_expression()?;
        self.expect_terminator()?;
        Ok(Stmt::Expression(expr))
    }

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            statements.push(self.parse_declaration()?);
        }
        self.expect(TokenKind::RightBrace, "'}'")?;
        Ok(statements)
    }

    fn parse_if(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.consume_if(TokenKind::Else) {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            condition,
            then_branch,
            else_branch,
        })
    }

    fn parse_while(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::LeftParen, "'('")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::RightParen, "')'")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::While { condition, body })
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let expr = self.parse_or()?;
        if self.check(TokenKind::Equal) {
            let equals = self.advance();
            let value = self.parse_assignment()?;
            return match expr.kind {
                ExprKind::Variable { name } => Ok(self.expr(ExprKind::Assign {
                    name,
                    value: Box::new(value),
                })),
                _ => Err(self.error_at(&equals, "assignment target")),
            };
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut expr = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let op = self.advance();
            let right = self.parse_and()?;
            expr = self.expr(ExprKind::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut expr = self.parse_equality()?;
        while self.check(TokenKind::And) {
            let op = self.advance();
            let right = self.parse_equality()?;
            expr = self.expr(ExprKind::Logical {
                left: Box::new(expr),
                op,
                right: Box::new(right),
            });
        }
        Ok(expr)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut expr = self.parse_comparison()?;
        while self.check(TokenKind::EqualEqual) || self.check(TokenKind::BangEqual) {
            let op = self.advance();
            let right = self.parse_comparison()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        while self.check(TokenKind::Greater)
            || self.check(TokenKind::GreaterEqual)
            || self.check(TokenKind::Less)
            || self.check(TokenKind::LessEqual)
        {
            let op = self.advance();
            let right = self.parse_term()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_factor()?;
        while self.check(TokenKind::Plus) || self.check(TokenKind::Minus) {
            let op = self.advance();
            let right = self.parse_factor()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let mut expr = self.parse_power()?;
        while self.check(TokenKind::Star)
            || self.check(TokenKind::Slash)
            || self.check(TokenKind::Percent)
        {
            let op = self.advance();
            let right = self.parse_power()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_unary()?;
        if self.check(TokenKind::StarStar) {
            let op = self.advance();
            // Right-associative: 2 ** 3 ** 2 is 2 ** (3 ** 2).
            let exponent = self.parse_power()?;
            return Ok(self.binary(base, op, exponent));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.check(TokenKind::Bang) || self.check(TokenKind::Minus) {
            let op = self.advance();
            let right = self.parse_unary()?;
            return Ok(self.expr(ExprKind::UnaryPrefix {
                op,
                right: Box::new(right),
            }));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::PlusPlus) || self.check(TokenKind::MinusMinus) {
                let op = self.advance();
                let name = match &expr.kind {
                    ExprKind::Variable { name } => name.clone(),
                    _ => return Err(self.error_at(&op, "identifier before postfix operator")),
                };
                expr = self.expr(ExprKind::UnaryPostfix {
                    left: Box::new(expr),
                    op,
                    name,
                });
            } else if self.check(TokenKind::LeftParen) {
                let paren = self.advance();
                let mut args = Vec::new();
                if !self.check(TokenKind::RightParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.consume_if(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RightParen, "')'")?;
                expr = self.expr(ExprKind::Call {
                    callee: Box::new(expr),
                    paren,
                    args,
                });
            } else if self.consume_if(TokenKind::Dot) {
                let name = self.expect(TokenKind::Identifier, "member name")?;
                expr = self.expr(ExprKind::Get {
                    object: Box::new(expr),
                    name,
                });
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current().kind {
            TokenKind::Integer | TokenKind::Float | TokenKind::String => {
                let token = self.advance();
                Ok(self.expr(ExprKind::Literal {
                    value: token.literal,
                }))
            }
            TokenKind::True => {
                self.advance();
                Ok(self.expr(ExprKind::Literal {
                    value: Some(Literal::Bool(true)),
                }))
            }
            TokenKind::False => {
                self.advance();
                Ok(self.expr(ExprKind::Literal {
                    value: Some(Literal::Bool(false)),
                }))
            }
            TokenKind::Null => {
                self.advance();
                Ok(self.expr(ExprKind::Literal { value: None }))
            }
            TokenKind::Identifier => {
                let name = self.advance();
                Ok(self.expr(ExprKind::Variable { name }))
            }
            TokenKind::LeftParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "')'")?;
                Ok(self.expr(ExprKind::Grouping {
                    inner: Box::new(inner),
                }))
            }
            _ => {
                let current = self.current().clone();
                Err(self.error_at(&current, "expression"))
            }
        }
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        Expr::new(self.ids.next_id(), kind)
    }

    fn binary(&mut self, left: Expr, op: Token, right: Expr) -> Expr {
        self.expr(ExprKind::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn consume_if(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let current = self.current().clone();
            Err(self.error_at(&current, expected))
        }
    }

    fn expect_terminator(&mut self) -> Result<()> {
        if self.consume_if(TokenKind::Semicolon) {
            return Ok(());
        }
        if self.repl && self.check(TokenKind::Eof) {
            return Ok(());
        }
        let current = self.current().clone();
        Err(self.error_at(&current, "';'"))
    }

    fn error_at(&self, token: &Token, expected: &str) -> anyhow::Error {
        let got = if matches!(token.kind, TokenKind::Eof) {
            "end of input".to_string()
        } else {
            format!("'{}'", token.lexeme)
        };
        anyhow::anyhow!("Expected {expected}, got {got} at line {}", token.line)
    }
}

pub fn parse_tokens(tokens: Vec<Token>, ids: &mut ExprIdGen, repl: bool) -> Result<Vec<Stmt>> {
    Parser::new(tokens, ids, repl).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::print_ast;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> Vec<Stmt> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        parse_tokens(tokens, &mut ids, false).expect("parse should succeed")
    }

    fn parse_repl(source: &str) -> Vec<Stmt> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        parse_tokens(tokens, &mut ids, true).expect("parse should succeed")
    }

    #[test]
    fn parses_var_with_annotation_and_initializer() {
        let stmts = parse("var a: int = 1 + 2 * 3;");
        assert_eq!(print_ast(&stmts), "(var a (+ 1 (* 2 3)))\n");
        match &stmts[0] {
            Stmt::Var { type_ref, .. } => {
                assert!(type_ref.is_explicit());
                assert_eq!(type_ref.specifier().expect("specifier").lexeme, "int");
            }
            other => panic!("expected var statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_function_declaration_with_typed_parameters() {
        let stmts = parse("fun add(a: int, b: int): int { return a + b; }");
        match &stmts[0] {
            Stmt::Function(decl) => {
                assert_eq!(decl.name.lexeme, "add");
                assert_eq!(decl.params.len(), 2);
                assert!(decl.params[0].type_ref.is_explicit());
                assert!(decl.return_type.is_explicit());
                assert_eq!(decl.body.len(), 1);
            }
            other => panic!("expected function statement, got {other:?}"),
        }
    }

    #[test]
    fn missing_return_annotation_stays_unresolved() {
        let stmts = parse("fun f() { return; }");
        match &stmts[0] {
            Stmt::Function(decl) => {
                assert!(!decl.return_type.is_explicit());
                assert!(!decl.return_type.is_resolved());
            }
            other => panic!("expected function statement, got {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_factor() {
        let stmts = parse("print 2 * 3 ** 2 ** 2;");
        assert_eq!(print_ast(&stmts), "(print (* 2 (** 3 (** 2 2))))\n");
    }

    #[test]
    fn postfix_applies_to_identifiers_only() {
        let stmts = parse("i++;");
        assert_eq!(print_ast(&stmts), "(postfix++ i)\n");

        let tokens = tokenize("1++;").expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        let err = parse_tokens(tokens, &mut ids, false).expect_err("expected parse failure");
        assert!(err.to_string().contains("identifier before postfix"));
    }

    #[test]
    fn parses_member_call_chain() {
        let stmts = parse("Base64.decode(\"aGVq\");");
        assert_eq!(print_ast(&stmts), "(call (get Base64 decode) \"aGVq\")\n");
    }

    #[test]
    fn if_else_and_while_take_parenthesized_conditions() {
        let stmts = parse("if (a > 1) { print a; } else print 0; while (a < 3) a = a + 1;");
        assert_eq!(
            print_ast(&stmts),
            "(if (> a 1) (block (print a)) (print 0))\n(while (< a 3) (assign a (+ a 1)))\n"
        );
    }

    #[test]
    fn repl_mode_allows_missing_final_semicolon() {
        let stmts = parse_repl("print 10");
        assert_eq!(print_ast(&stmts), "(print 10)\n");

        let tokens = tokenize("print 10").expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        let err = parse_tokens(tokens, &mut ids, false).expect_err("expected parse failure");
        assert!(err.to_string().contains("Expected ';'"));
    }

    #[test]
    fn expression_ids_are_unique_across_inputs_sharing_a_generator() {
        let mut ids = ExprIdGen::default();
        let first = parse_tokens(tokenize("1;").expect("tokenize"), &mut ids, false)
            .expect("parse should succeed");
        let second = parse_tokens(tokenize("2;").expect("tokenize"), &mut ids, false)
            .expect("parse should succeed");
        let first_id = match &first[0] {
            Stmt::Expression(expr) => expr.id,
            other => panic!("expected expression statement, got {other:?}"),
        };
        let second_id = match &second[0] {
            Stmt::Expression(expr) => expr.id,
            other => panic!("expected expression statement, got {other:?}"),
        };
        assert_ne!(first_id, second_id);
    }

    #[test]
    fn assignment_requires_a_name_target() {
        let tokens = tokenize("1 = 2;").expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        let err = parse_tokens(tokens, &mut ids, false).expect_err("expected parse failure");
        assert!(err.to_string().contains("assignment target"));
    }
}
