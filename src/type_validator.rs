//! Second type pass: assumes the type resolver ran to fixpoint and enforces
//! call-site arity, identity-only coercion, declaration coercibility, and
//! annotation resolution.

use crate::ast::{Expr, ExprKind, FunctionDecl, Stmt};
use crate::diagnostics::Diagnostic;
use crate::resolver::{Binding, BindingTable};
use crate::types::Type;

pub struct TypeValidator<'a> {
    bindings: &'a BindingTable,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> TypeValidator<'a> {
    pub fn new(bindings: &'a BindingTable) -> Self {
        Self {
            bindings,
            diagnostics: Vec::new(),
        }
    }

    pub fn run<'s>(mut self, stmts: impl IntoIterator<Item = &'s Stmt>) -> Vec<Diagnostic> {
        for stmt in stmts {
            self.validate_stmt(stmt);
        }
        self.diagnostics
    }

    fn validate_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.validate_expr(expr),
            Stmt::Var {
                name,
                type_ref,
                initializer,
            } => {
                if let Some(init) = initializer {
                    self.validate_expr(init);
                }
                match (type_ref.resolved(), initializer) {
                    (Some(declared), Some(init)) => {
                        if let Some(found) = init.type_ref.resolved()
                            && !Type::can_be_coerced_into(declared, found)
                        {
                            self.diagnostics
                                .push(Diagnostic::initializer_mismatch(name, declared, found));
                        }
                    }
                    (None, _) if type_ref.is_explicit() => {
                        if let Some(specifier) = type_ref.specifier() {
                            self.diagnostics.push(Diagnostic::type_not_found(&specifier));
                        }
                    }
                    (None, None) => {
                        self.diagnostics
                            .push(Diagnostic::cannot_infer_without_initializer(name));
                    }
                    _ => {}
                }
            }
            Stmt::Block(stmts) => {
                for inner in stmts {
                    self.validate_stmt(inner);
                }
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.validate_expr(condition);
                self.validate_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.validate_stmt(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.validate_expr(condition);
                self.validate_stmt(body);
            }
            Stmt::Function(decl) => self.validate_function(decl),
            Stmt::Return { keyword, value } => {
                if let Some(value) = value {
                    self.validate_expr(value);
                    if !value.type_ref.is_resolved() && !is_host_dispatched(value) {
                        self.diagnostics.push(Diagnostic::internal(
                            Some(keyword),
                            "Returned value has no resolved type",
                        ));
                    }
                }
            }
            Stmt::Class(decl) => {
                for method in &decl.methods {
                    self.validate_function(method);
                }
            }
        }
    }

    fn validate_function(&mut self, decl: &FunctionDecl) {
        if decl.return_type.is_explicit() {
            if !decl.return_type.is_resolved()
                && let Some(specifier) = decl.return_type.specifier()
            {
                self.diagnostics.push(Diagnostic::type_not_found(&specifier));
            }
        } else {
            self.diagnostics
                .push(Diagnostic::inference_unsupported_for_function(&decl.name));
        }
        for param in &decl.params {
            if param.type_ref.is_explicit() {
                if !param.type_ref.is_resolved()
                    && let Some(specifier) = param.type_ref.specifier()
                {
                    self.diagnostics.push(Diagnostic::type_not_found(&specifier));
                }
            } else {
                self.diagnostics
                    .push(Diagnostic::inference_unsupported_for_parameter(
                        &param.name,
                        &decl.name,
                    ));
            }
        }
        for stmt in &decl.body {
            self.validate_stmt(stmt);
        }
    }

    fn validate_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal { .. } | ExprKind::Variable { .. } | ExprKind::Empty => {}
            ExprKind::Grouping { inner } => self.validate_expr(inner),
            ExprKind::UnaryPrefix { right, .. } => self.validate_expr(right),
            ExprKind::UnaryPostfix { left, .. } => self.validate_expr(left),
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.validate_expr(left);
                self.validate_expr(right);
            }
            ExprKind::Assign { value, .. } => self.validate_expr(value),
            ExprKind::Call { callee, args, .. } => {
                for arg in args {
                    self.validate_expr(arg);
                }
                if let ExprKind::Get { object, .. } = &callee.kind {
                    self.validate_expr(object);
                }
                self.validate_call(callee, args);
            }
            ExprKind::Get { object, .. } => self.validate_expr(object),
        }
    }

    /// Call sites check arity and coerce each positional argument into its
    /// parameter type. Bindings other than user functions and natives are
    /// left to the evaluator's not-callable error.
    fn validate_call(&mut self, callee: &Expr, args: &[Expr]) {
        match self.bindings.get(callee.id) {
            Some(Binding::Function { decl, .. }) => {
                if decl.params.len() != args.len() {
                    self.diagnostics.push(Diagnostic::function_arity_mismatch(
                        &decl.name,
                        decl.params.len(),
                        args.len(),
                    ));
                    return;
                }
                for (param, arg) in decl.params.iter().zip(args) {
                    let (Some(param_ty), Some(arg_ty)) =
                        (param.type_ref.resolved(), arg.type_ref.resolved())
                    else {
                        continue;
                    };
                    if !Type::can_be_coerced_into(param_ty, arg_ty) {
                        self.diagnostics.push(Diagnostic::argument_mismatch(
                            &decl.name,
                            &param.name.lexeme,
                            param_ty,
                            arg_ty,
                        ));
                    }
                }
            }
            Some(Binding::Native { function }) => {
                let name_token = callee_name(callee);
                if function.params.len() != args.len() {
                    self.diagnostics.push(Diagnostic::method_arity_mismatch(
                        name_token,
                        function.params.len(),
                        args.len(),
                    ));
                    return;
                }
                for (param_ty, arg) in function.params.iter().zip(args) {
                    let Some(arg_ty) = arg.type_ref.resolved() else {
                        continue;
                    };
                    if !Type::can_be_coerced_into(*param_ty, arg_ty) {
                        self.diagnostics.push(Diagnostic::native_argument_mismatch(
                            name_token, *param_ty, arg_ty,
                        ));
                    }
                }
            }
            _ => {}
        }
    }
}

/// The token naming a callee, used in native call diagnostics.
fn callee_name(callee: &Expr) -> &crate::token::Token {
    match &callee.kind {
        ExprKind::Variable { name } => name,
        ExprKind::Get { name, .. } => name,
        ExprKind::Call { paren, .. } => paren,
        _ => unreachable!("callee is a name or member access"),
    }
}

/// Member accesses on host objects, and calls through them, resolve at
/// evaluation time; their type slots legitimately stay open.
fn is_host_dispatched(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Get { .. } => true,
        ExprKind::Call { callee, .. } => matches!(callee.kind, ExprKind::Get { .. }),
        ExprKind::Grouping { inner } => is_host_dispatched(inner),
        _ => false,
    }
}
