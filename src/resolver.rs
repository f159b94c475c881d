//! Name resolution: computes, for every name-referring expression, a
//! binding to a lexical slot at a known scope distance, to a global, or to
//! a host-provided callable, class, or super-global.
//!
//! The pass collects diagnostics and keeps walking so one input can surface
//! several scope errors at once. Bindings are keyed by expression identity
//! (`ExprId`), never by textual name, and the table is rebuilt from scratch
//! on every resolve pass.

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{ClassDecl, Expr, ExprId, ExprKind, FunctionDecl, Stmt};
use crate::diagnostics::Diagnostic;
use crate::natives::{NativeFunction, NativeRegistry};
use crate::token::Token;
use crate::types::{Type, TypeRef};

/// The resolver's verdict about one identifier use. `distance` is `None`
/// for globals and `Some(k)` for a local slot `k` frames outward from the
/// referring site.
#[derive(Debug, Clone)]
pub enum Binding {
    Variable {
        type_ref: TypeRef,
        distance: Option<usize>,
    },
    Function {
        decl: Rc<FunctionDecl>,
        type_ref: TypeRef,
        distance: Option<usize>,
    },
    Native {
        function: Rc<NativeFunction>,
    },
    NativeObject {
        ty: Type,
    },
    Class {
        decl: Rc<ClassDecl>,
    },
}

impl Binding {
    /// Only lexical bindings know a scope distance.
    pub fn distance(&self) -> Option<usize> {
        match self {
            Binding::Variable { distance, .. } | Binding::Function { distance, .. } => *distance,
            Binding::Native { .. } | Binding::NativeObject { .. } | Binding::Class { .. } => None,
        }
    }

    pub fn type_ref(&self) -> Option<TypeRef> {
        match self {
            Binding::Variable { type_ref, .. } | Binding::Function { type_ref, .. } => {
                Some(type_ref.clone())
            }
            Binding::Native { function } => Some(function.return_type.clone()),
            Binding::NativeObject { ty } => Some(TypeRef::of(*ty)),
            Binding::Class { .. } => Some(TypeRef::of(Type::Object)),
        }
    }
}

/// Binding directory produced by one resolve pass, keyed by node identity.
#[derive(Debug, Default)]
pub struct BindingTable {
    map: HashMap<ExprId, Binding>,
}

impl BindingTable {
    pub fn get(&self, id: ExprId) -> Option<&Binding> {
        self.map.get(&id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.map.keys().copied()
    }

    fn insert(&mut self, id: ExprId, binding: Binding) {
        let previous = self.map.insert(id, binding);
        debug_assert!(previous.is_none(), "node {id:?} bound twice in one pass");
    }
}

/// What a defined slot names, beyond its type.
#[derive(Debug, Clone)]
enum Definition {
    Variable,
    Function(Rc<FunctionDecl>),
    Class(Rc<ClassDecl>),
}

/// Slots move `Declared -> Defined`; reading a `Declared` slot is the
/// own-initializer error.
#[derive(Debug, Clone)]
enum SlotState {
    Declared,
    Defined {
        type_ref: TypeRef,
        definition: Definition,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionContext {
    None,
    Function,
}

pub struct Resolver<'a> {
    natives: &'a NativeRegistry,
    scopes: Vec<HashMap<String, SlotState>>,
    globals: HashMap<String, SlotState>,
    bindings: BindingTable,
    diagnostics: Vec<Diagnostic>,
    current_function: FunctionContext,
}

impl<'a> Resolver<'a> {
    pub fn new(natives: &'a NativeRegistry) -> Self {
        Self {
            natives,
            scopes: Vec::new(),
            globals: HashMap::new(),
            bindings: BindingTable::default(),
            diagnostics: Vec::new(),
            current_function: FunctionContext::None,
        }
    }

    pub fn resolve<'s>(
        mut self,
        stmts: impl IntoIterator<Item = &'s Stmt>,
    ) -> (BindingTable, Vec<Diagnostic>) {
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }
        (self.bindings, self.diagnostics)
    }

    fn resolve_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => self.resolve_expr(expr),
            Stmt::Var {
                name,
                type_ref,
                initializer,
            } => {
                self.declare(name);
                if let Some(init) = initializer {
                    self.resolve_expr(init);
                }
                // The slot adopts the annotation when present, otherwise it
                // shares the initializer's slot so inference flows through.
                let slot_type = if type_ref.is_explicit() {
                    type_ref.clone()
                } else if let Some(init) = initializer {
                    init.type_ref.clone()
                } else {
                    type_ref.clone()
                };
                self.define(name, slot_type, Definition::Variable);
            }
            Stmt::Block(stmts) => {
                self.begin_scope();
                for inner in stmts {
                    self.resolve_stmt(inner);
                }
                self.end_scope();
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_stmt(then_branch);
                if let Some(else_branch) = else_branch {
                    self.resolve_stmt(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_stmt(body);
            }
            Stmt::Function(decl) => {
                self.declare(&decl.name);
                self.define(
                    &decl.name,
                    decl.return_type.clone(),
                    Definition::Function(decl.clone()),
                );
                self.resolve_function(decl);
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionContext::None {
                    self.diagnostics.push(Diagnostic::return_at_top_level(keyword));
                }
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Stmt::Class(decl) => {
                self.declare(&decl.name);
                self.define(
                    &decl.name,
                    TypeRef::of(Type::Object),
                    Definition::Class(decl.clone()),
                );
                // Method bodies are resolved for scope errors even though
                // declared classes carry no callable methods in this core.
                for method in &decl.methods {
                    self.resolve_function(method);
                }
            }
        }
    }

    fn resolve_function(&mut self, decl: &Rc<FunctionDecl>) {
        let enclosing = std::mem::replace(&mut self.current_function, FunctionContext::Function);
        self.begin_scope();
        for param in &decl.params {
            self.declare(&param.name);
            self.define(&param.name, param.type_ref.clone(), Definition::Variable);
        }
        for stmt in &decl.body {
            self.resolve_stmt(stmt);
        }
        self.end_scope();
        self.current_function = enclosing;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Literal { .. } | ExprKind::Empty => {}
            ExprKind::Grouping { inner } => self.resolve_expr(inner),
            ExprKind::UnaryPrefix { right, .. } => self.resolve_expr(right),
            ExprKind::UnaryPostfix { left, name, .. } => {
                self.resolve_expr(left);
                // The postfix node needs its own binding for the store-back.
                self.resolve_local(expr.id, name);
            }
            ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            ExprKind::Assign { name, value } => {
                self.resolve_expr(value);
                self.resolve_local(expr.id, name);
            }
            ExprKind::Variable { name } => {
                self.resolve_local(expr.id, name);
            }
            ExprKind::Call { callee, args, .. } => {
                self.resolve_callee(callee);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            ExprKind::Get { object, .. } => self.resolve_expr(object),
        }
    }

    /// Callees resolve like any expression, except that a member access on a
    /// host class resolves the method descriptor statically so the type
    /// passes can check the call site.
    fn resolve_callee(&mut self, callee: &Expr) {
        if let ExprKind::Get { object, name } = &callee.kind
            && let ExprKind::Variable { name: class_name } = &object.kind
            && let Some(class) = self.natives.class(&class_name.lexeme)
            && self.local_slot(&class_name.lexeme).is_none()
        {
            self.resolve_expr(object);
            if let Some(method) = class.method(&name.lexeme) {
                self.bindings.insert(callee.id, Binding::Native { function: method });
            }
            return;
        }
        self.resolve_expr(callee);
    }

    fn begin_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    /// Inserts a placeholder slot in the innermost frame. A no-op at global
    /// level; duplicate checking for globals happens in `define`.
    fn declare(&mut self, name: &Token) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        if scope.contains_key(&name.lexeme) {
            self.diagnostics
                .push(Diagnostic::variable_already_declared(name));
            return;
        }
        scope.insert(name.lexeme.clone(), SlotState::Declared);
    }

    fn define(&mut self, name: &Token, type_ref: TypeRef, definition: Definition) {
        let state = SlotState::Defined {
            type_ref,
            definition,
        };
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(name.lexeme.clone(), state);
            }
            None => {
                if self.globals.contains_key(&name.lexeme) {
                    self.diagnostics
                        .push(Diagnostic::variable_already_declared(name));
                    return;
                }
                self.globals.insert(name.lexeme.clone(), state);
            }
        }
    }

    fn local_slot(&self, lexeme: &str) -> Option<&SlotState> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(lexeme))
    }

    /// Walks frames innermost-outward; on a miss falls through to the host
    /// directories and then the globals frame. Emitting no binding at all is
    /// legal: the type resolver reports the undefined name.
    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        for (index, scope) in self.scopes.iter().enumerate().rev() {
            let Some(state) = scope.get(&name.lexeme) else {
                continue;
            };
            match state {
                SlotState::Declared => {
                    self.diagnostics
                        .push(Diagnostic::read_in_own_initializer(name));
                }
                SlotState::Defined {
                    type_ref,
                    definition,
                } => {
                    let distance = Some(self.scopes.len() - 1 - index);
                    let binding =
                        Self::slot_binding(type_ref.clone(), definition.clone(), distance);
                    self.bindings.insert(id, binding);
                }
            }
            return;
        }

        if let Some(function) = self.natives.callable(&name.lexeme) {
            self.bindings.insert(id, Binding::Native { function });
            return;
        }
        if let Some(ty) = self.natives.super_global(&name.lexeme) {
            self.bindings.insert(id, Binding::NativeObject { ty });
            return;
        }
        if let Some(class) = self.natives.class(&name.lexeme) {
            self.bindings.insert(id, Binding::NativeObject { ty: class.ty });
            return;
        }
        if let Some(SlotState::Defined {
            type_ref,
            definition,
        }) = self.globals.get(&name.lexeme)
        {
            let binding = Self::slot_binding(type_ref.clone(), definition.clone(), None);
            self.bindings.insert(id, binding);
        }
    }

    fn slot_binding(
        type_ref: TypeRef,
        definition: Definition,
        distance: Option<usize>,
    ) -> Binding {
        match definition {
            Definition::Variable => Binding::Variable { type_ref, distance },
            Definition::Function(decl) => Binding::Function {
                decl,
                type_ref,
                distance,
            },
            Definition::Class(decl) => Binding::Class { decl },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprIdGen;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;
    use indoc::indoc;

    fn parse(source: &str) -> Vec<Stmt> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let mut ids = ExprIdGen::default();
        parse_tokens(tokens, &mut ids, false).expect("parse should succeed")
    }

    fn resolve(source: &str) -> (BindingTable, Vec<Diagnostic>, Vec<Stmt>) {
        let stmts = parse(source);
        let natives = NativeRegistry::standard();
        let (bindings, diagnostics) = Resolver::new(&natives).resolve(stmts.iter());
        (bindings, diagnostics, stmts)
    }

    fn expr_id(stmt: &Stmt) -> ExprId {
        match stmt {
            Stmt::Expression(expr) | Stmt::Print(expr) => expr.id,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn global_reference_has_no_distance() {
        let (bindings, diagnostics, stmts) = resolve("var a = 42; print a;");
        assert!(diagnostics.is_empty());
        let binding = bindings.get(expr_id(&stmts[1])).expect("binding");
        assert!(matches!(binding, Binding::Variable { .. }));
        assert_eq!(binding.distance(), None);
    }

    #[test]
    fn distances_count_frames_outward() {
        let source = indoc! {"
            fun f(a: int): void {
                var b = a;
                {
                    print a;
                    print b;
                    var c = 1;
                    print c;
                }
            }
        "};
        let (bindings, diagnostics, stmts) = resolve(source);
        assert!(diagnostics.is_empty());

        let Stmt::Function(decl) = &stmts[0] else {
            panic!("expected function");
        };
        let Stmt::Block(block) = &decl.body[1] else {
            panic!("expected block");
        };
        let print_a = expr_id(&block[0]);
        let print_b = expr_id(&block[1]);
        let print_c = expr_id(&block[3]);

        assert_eq!(bindings.get(print_a).expect("a").distance(), Some(1));
        assert_eq!(bindings.get(print_b).expect("b").distance(), Some(1));
        assert_eq!(bindings.get(print_c).expect("c").distance(), Some(0));
    }

    #[test]
    fn shadowing_across_frames_is_accepted() {
        let source = indoc! {"
            var a = 1;
            {
                var a = 2;
                {
                    var a = 3;
                    print a;
                }
            }
        "};
        let (_, diagnostics, _) = resolve(source);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn duplicate_declaration_in_one_scope_is_an_error() {
        let (_, diagnostics, _) = resolve("{ var a = 1; var a = 2; }");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Variable with this name already declared in this scope."
        );
    }

    #[test]
    fn duplicate_global_declaration_is_an_error() {
        let (_, diagnostics, _) = resolve("var a = 42; var a = 44;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Variable with this name already declared in this scope."
        );
    }

    #[test]
    fn reading_local_in_its_own_initializer_is_an_error() {
        let (_, diagnostics, _) = resolve("{ var a = 1; { var a = a; } }");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].message,
            "Cannot read local variable in its own initializer."
        );
    }

    #[test]
    fn top_level_return_is_an_error_while_function_return_is_not() {
        let (_, diagnostics, _) = resolve("return 1;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Cannot return from top-level code.");

        let (_, diagnostics, _) = resolve("fun f(): int { return 1; }");
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn function_references_bind_to_their_declaration() {
        let (bindings, diagnostics, stmts) = resolve("fun f(): int { return 1; } f();");
        assert!(diagnostics.is_empty());
        let Stmt::Expression(call) = &stmts[1] else {
            panic!("expected call statement");
        };
        let ExprKind::Call { callee, .. } = &call.kind else {
            panic!("expected call expression");
        };
        match bindings.get(callee.id).expect("callee binding") {
            Binding::Function { decl, distance, .. } => {
                assert_eq!(decl.name.lexeme, "f");
                assert_eq!(*distance, None);
            }
            other => panic!("expected function binding, got {other:?}"),
        }
    }

    #[test]
    fn native_class_method_call_binds_the_descriptor() {
        let (bindings, diagnostics, stmts) = resolve("Base64.decode(\"aGVq\");");
        assert!(diagnostics.is_empty());
        let Stmt::Expression(call) = &stmts[0] else {
            panic!("expected call statement");
        };
        let ExprKind::Call { callee, .. } = &call.kind else {
            panic!("expected call expression");
        };
        match bindings.get(callee.id).expect("callee binding") {
            Binding::Native { function } => assert_eq!(function.name, "decode"),
            other => panic!("expected native binding, got {other:?}"),
        }
    }

    #[test]
    fn super_global_resolves_as_native_object() {
        let (bindings, diagnostics, stmts) = resolve("print ARGV;");
        assert!(diagnostics.is_empty());
        match bindings.get(expr_id(&stmts[0])).expect("binding") {
            Binding::NativeObject { ty } => assert_eq!(*ty, Type::Object),
            other => panic!("expected native object binding, got {other:?}"),
        }
    }

    #[test]
    fn unknown_name_emits_no_binding_and_no_resolver_diagnostic() {
        let (bindings, diagnostics, stmts) = resolve("var a = 1; missing;");
        assert!(diagnostics.is_empty());
        assert!(bindings.get(expr_id(&stmts[1])).is_none());
    }

    #[test]
    fn resolving_twice_yields_identical_bindings() {
        let stmts = parse(indoc! {"
            var a = 1;
            fun f(x: int): int {
                var y = x + a;
                return y;
            }
            print f(2);
        "});
        let natives = NativeRegistry::standard();
        let (first, first_diags) = Resolver::new(&natives).resolve(stmts.iter());
        let (second, second_diags) = Resolver::new(&natives).resolve(stmts.iter());
        assert!(first_diags.is_empty());
        assert!(second_diags.is_empty());
        assert_eq!(first.len(), second.len());
        for id in first.ids() {
            let left = first.get(id).expect("binding");
            let right = second.get(id).expect("binding");
            assert_eq!(left.distance(), right.distance());
            assert_eq!(
                std::mem::discriminant(left),
                std::mem::discriminant(right)
            );
        }
    }
}
