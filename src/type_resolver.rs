//! First type pass: resolves explicit annotations by short-name lookup and
//! propagates expression types bottom-up. A node whose children failed to
//! resolve is abandoned without a fresh diagnostic; the upstream error has
//! already been recorded.

use crate::ast::{Expr, ExprKind, FunctionDecl, Stmt};
use crate::diagnostics::Diagnostic;
use crate::resolver::{Binding, BindingTable};
use crate::token::{Literal, Token, TokenKind};
use crate::types::{Type, TypeRef, builtin_type};

pub struct TypeResolver<'a> {
    bindings: &'a BindingTable,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(bindings: &'a BindingTable) -> Self {
        Self {
            bindings,
            diagnostics: Vec::new(),
        }
    }

    pub fn run<'s>(mut self, stmts: impl IntoIterator<Item = &'s Stmt>) -> Vec<Diagnostic> {
        for stmt in stmts {
            self.visit_stmt(stmt);
        }
        self.diagnostics
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.visit_expr(expr),
            Stmt::Var {
                type_ref,
                initializer,
                ..
            } => {
                if let Some(init) = initializer {
                    self.visit_expr(init);
                }
                if type_ref.is_explicit() {
                    self.resolve_annotation(type_ref);
                } else if let Some(init) = initializer
                    && let Some(inferred) = init.type_ref.resolved()
                {
                    type_ref.fill(inferred);
                }
            }
            Stmt::Block(stmts) => {
                for inner in stmts {
                    self.visit_stmt(inner);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.visit_expr(condition);
                self.visit_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.visit_stmt(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.visit_expr(condition);
                self.visit_stmt(body);
            }
            Stmt::Function(decl) => self.visit_function(decl),
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            Stmt::Class(decl) => {
                for method in &decl.methods {
                    self.visit_function(method);
                }
            }
        }
    }

    fn visit_function(&mut self, decl: &FunctionDecl) {
        if decl.return_type.is_explicit() {
            self.resolve_annotation(&decl.return_type);
        } else {
            self.diagnostics
                .push(Diagnostic::inference_unsupported_for_function(&decl.name));
        }
        for param in &decl.params {
            if param.type_ref.is_explicit() {
                self.resolve_annotation(&param.type_ref);
            } else {
                self.diagnostics
                    .push(Diagnostic::inference_unsupported_for_parameter(
                        &param.name,
                        &decl.name,
                    ));
            }
        }
        for stmt in &decl.body {
            self.visit_stmt(stmt);
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal { value } => {
                expr.type_ref.fill(literal_type(value.as_ref()));
            }
            ExprKind::Grouping { inner } => {
                self.visit_expr(inner);
                if let Some(ty) = inner.type_ref.resolved() {
                    expr.type_ref.fill(ty);
                }
            }
            ExprKind::UnaryPrefix { right, .. } => {
                self.visit_expr(right);
                if let Some(ty) = right.type_ref.resolved() {
                    expr.type_ref.fill(ty);
                }
            }
            ExprKind::UnaryPostfix { left, .. } => {
                self.visit_expr(left);
                if let Some(ty) = left.type_ref.resolved() {
                    expr.type_ref.fill(ty);
                }
            }
            ExprKind::Binary { left, op, right } => {
                self.visit_expr(left);
                self.visit_expr(right);
                self.visit_binary(expr, left, op, right);
            }
            ExprKind::Logical { left, right, .. } => {
                self.visit_expr(left);
                self.visit_expr(right);
                expr.type_ref.fill(Type::Bool);
            }
            ExprKind::Assign { name, value } => {
                self.visit_expr(value);
                if self.bindings.get(expr.id).is_none() {
                    self.diagnostics.push(Diagnostic::undefined_variable(name));
                    return;
                }
                if let Some(ty) = value.type_ref.resolved() {
                    expr.type_ref.fill(ty);
                }
            }
            ExprKind::Variable { name } => {
                let Some(binding) = self.bindings.get(expr.id) else {
                    self.diagnostics.push(Diagnostic::undefined_variable(name));
                    return;
                };
                if let Some(type_ref) = binding.type_ref() {
                    if type_ref.is_explicit() && !type_ref.is_resolved() {
                        self.resolve_annotation(&type_ref);
                    }
                    if let Some(ty) = type_ref.resolved() {
                        expr.type_ref.fill(ty);
                    }
                }
            }
            ExprKind::Call {
                callee,
                paren,
                args,
            } => {
                for arg in args {
                    self.visit_expr(arg);
                }
                self.visit_call(expr, callee, paren);
            }
            ExprKind::Get { object, .. } => {
                // Member access refers to a method on a host object; the
                // evaluator resolves it, so the result type stays open.
                self.visit_expr(object);
            }
            ExprKind::Empty => expr.type_ref.fill(Type::Null),
        }
    }

    fn visit_binary(&mut self, expr: &Expr, left: &Expr, op: &Token, right: &Expr) {
        let (Some(left_ty), Some(right_ty)) =
            (left.type_ref.resolved(), right.type_ref.resolved())
        else {
            return;
        };

        for ty in [left_ty, right_ty] {
            if !ty.is_comparable() {
                self.diagnostics.push(Diagnostic::not_comparable(op, ty));
                return;
            }
        }

        match op.kind {
            TokenKind::Plus if left_ty == Type::Str || right_ty == Type::Str => {
                // String concatenation takes the left operand's type.
                expr.type_ref.fill(left_ty);
            }
            TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Slash
            | TokenKind::Percent
            | TokenKind::StarStar => {
                if !left_ty.is_arithmetic() || !right_ty.is_arithmetic() {
                    self.diagnostics
                        .push(Diagnostic::invalid_operands(op, left_ty, right_ty));
                    return;
                }
                expr.type_ref.fill(Type::promote(left_ty, right_ty));
            }
            TokenKind::Greater
            | TokenKind::GreaterEqual
            | TokenKind::Less
            | TokenKind::LessEqual
            | TokenKind::EqualEqual
            | TokenKind::BangEqual => {
                expr.type_ref.fill(Type::Bool);
            }
            _ => {
                self.diagnostics.push(Diagnostic::internal(
                    Some(op),
                    format!("Unexpected binary operator '{}'", op.lexeme),
                ));
            }
        }
    }

    fn visit_call(&mut self, expr: &Expr, callee: &Expr, paren: &Token) {
        match &callee.kind {
            ExprKind::Variable { name } => {
                let Some(binding) = self.bindings.get(callee.id) else {
                    self.diagnostics.push(Diagnostic::undefined_function(name));
                    return;
                };
                self.adopt_callee_type(expr, binding);
            }
            ExprKind::Get { object, .. } => {
                self.visit_expr(object);
                // A statically resolved host method types the call; any
                // other member call is dispatched by the evaluator and the
                // result type stays open.
                if let Some(binding) = self.bindings.get(callee.id) {
                    self.adopt_callee_type(expr, binding);
                }
            }
            _ => {
                self.visit_expr(callee);
                self.diagnostics.push(Diagnostic::internal(
                    Some(paren),
                    "Call target is neither a name nor a member access",
                ));
            }
        }
    }

    fn adopt_callee_type(&mut self, expr: &Expr, binding: &Binding) {
        if let Some(type_ref) = binding.type_ref() {
            if type_ref.is_explicit() && !type_ref.is_resolved() {
                self.resolve_annotation(&type_ref);
            }
            if let Some(ty) = type_ref.resolved() {
                expr.type_ref.fill(ty);
            }
        }
    }

    /// Short-name lookup against the built-in table. Unknown names leave the
    /// slot unresolved; the validator surfaces them as `TypeNotFound`.
    fn resolve_annotation(&mut self, type_ref: &TypeRef) {
        if type_ref.is_resolved() {
            return;
        }
        let Some(specifier) = type_ref.specifier() else {
            return;
        };
        if let Some(ty) = builtin_type(&specifier.lexeme) {
            type_ref.fill(ty);
        }
    }
}

fn literal_type(value: Option<&Literal>) -> Type {
    match value {
        Some(Literal::Int(_)) => Type::Int32,
        Some(Literal::Float(_)) => Type::Float64,
        Some(Literal::Str(_)) => Type::Str,
        Some(Literal::Bool(_)) => Type::Bool,
        None => Type::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprIdGen;
    use crate::lexer::tokenize;
    use crate::natives::NativeRegistry;
    use crate::parser::parse_tokens;
    use crate::resolver::Resolver;
    use indoc::indoc;

    fn analyze(source: &str) -> (Vec<Stmt>, Vec<Diagnostic>) {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        let stmts = parse_tokens(tokens, &mut ids, false).expect("parse should succeed");
        let natives = NativeRegistry::standard();
        let (bindings, resolve_diags) = Resolver::new(&natives).resolve(stmts.iter());
        assert!(resolve_diags.is_empty(), "unexpected {resolve_diags:?}");
        let diagnostics = TypeResolver::new(&bindings).run(stmts.iter());
        (stmts, diagnostics)
    }

    fn stmt_expr_type(stmt: &Stmt) -> Option<Type> {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => expr.type_ref.resolved(),
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn infers_variable_type_from_initializer() {
        let (stmts, diagnostics) = analyze("var a = 42;");
        assert!(diagnostics.is_empty());
        let Stmt::Var { type_ref, .. } = &stmts[0] else {
            panic!("expected var");
        };
        assert_eq!(type_ref.resolved(), Some(Type::Int32));
    }

    #[test]
    fn resolves_explicit_annotations_and_aliases() {
        let (stmts, diagnostics) = analyze("var a: Int32 = 1; var s: string = \"x\";");
        assert!(diagnostics.is_empty());
        for (stmt, expected) in stmts.iter().zip([Type::Int32, Type::Str]) {
            let Stmt::Var { type_ref, .. } = stmt else {
                panic!("expected var");
            };
            assert_eq!(type_ref.resolved(), Some(expected));
        }
    }

    #[test]
    fn unknown_annotation_stays_unresolved() {
        let (stmts, diagnostics) = analyze("var a: Elephant = 1;");
        assert!(diagnostics.is_empty());
        let Stmt::Var { type_ref, .. } = &stmts[0] else {
            panic!("expected var");
        };
        assert!(!type_ref.is_resolved());
    }

    #[test]
    fn arithmetic_promotes_to_the_wider_operand() {
        let (stmts, diagnostics) = analyze("1 + 2; 1 + 2.5; 2.5 * 2;");
        assert!(diagnostics.is_empty());
        assert_eq!(stmt_expr_type(&stmts[0]), Some(Type::Int32));
        assert_eq!(stmt_expr_type(&stmts[1]), Some(Type::Float64));
        assert_eq!(stmt_expr_type(&stmts[2]), Some(Type::Float64));
    }

    #[test]
    fn string_concat_takes_the_left_type() {
        let (stmts, diagnostics) = analyze("\"a\" + \"b\";");
        assert!(diagnostics.is_empty());
        assert_eq!(stmt_expr_type(&stmts[0]), Some(Type::Str));
    }

    #[test]
    fn comparisons_are_boolean() {
        let (stmts, diagnostics) = analyze("1 < 2; 1 == 2; null == null;");
        assert!(diagnostics.is_empty());
        for stmt in &stmts {
            assert_eq!(stmt_expr_type(stmt), Some(Type::Bool));
        }
    }

    #[test]
    fn arithmetic_on_non_arithmetic_operands_is_diagnosed() {
        let (_, diagnostics) = analyze("true - 1;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Invalid operands Bool and Int32 for operator '-'"
        );
    }

    #[test]
    fn undefined_names_are_diagnosed() {
        let (_, diagnostics) = analyze("missing;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Undefined variable 'missing'");

        let (_, diagnostics) = analyze("missing();");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Attempting to call undefined function 'missing'"
        );
    }

    #[test]
    fn call_adopts_the_declared_return_type() {
        let (stmts, diagnostics) = analyze("fun f(): int { return 1; } f();");
        assert!(diagnostics.is_empty());
        assert_eq!(stmt_expr_type(&stmts[1]), Some(Type::Int32));
    }

    #[test]
    fn native_method_call_adopts_the_descriptor_return_type() {
        let (stmts, diagnostics) = analyze("Base64.decode(\"aGVq\");");
        assert!(diagnostics.is_empty());
        assert_eq!(stmt_expr_type(&stmts[0]), Some(Type::Str));
    }

    #[test]
    fn member_call_on_host_object_stays_open() {
        let (stmts, diagnostics) = analyze("ARGV.pop();");
        assert!(diagnostics.is_empty());
        assert_eq!(stmt_expr_type(&stmts[0]), None);
    }

    #[test]
    fn missing_function_annotations_are_diagnosed() {
        let (_, diagnostics) = analyze(indoc! {"
            fun f(x) {
                print x;
            }
        "});
        let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Inferred typing is not yet supported for function 'f'",
                "Inferred typing is not yet supported for parameter 'x' to function 'f'",
            ]
        );
    }

    #[test]
    fn rerunning_the_pass_is_idempotent() {
        let tokens = tokenize("var a = 42; print a + 1;").expect("tokenize");
        let mut ids = ExprIdGen::default();
        let stmts = parse_tokens(tokens, &mut ids, false).expect("parse should succeed");
        let natives = NativeRegistry::standard();
        let (bindings, _) = Resolver::new(&natives).resolve(stmts.iter());
        let first = TypeResolver::new(&bindings).run(stmts.iter());
        let second = TypeResolver::new(&bindings).run(stmts.iter());
        assert!(first.is_empty());
        assert!(second.is_empty());
    }
}
