//! AST produced by the parser and consumed by every downstream pass.
//!
//! Expression nodes carry a session-unique `ExprId` (the key of the
//! resolver's binding table) and a shared `TypeRef` slot filled by the type
//! resolver. Function and class declarations are `Rc` handles so scope
//! slots, bindings, and runtime values can share them.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::token::{Literal, Token};
use crate::types::TypeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(u32);

/// Hands out expression ids. Owned by the interpreter session so ids stay
/// unique across REPL inputs.
#[derive(Debug, Default)]
pub struct ExprIdGen {
    next: u32,
}

impl ExprIdGen {
    pub fn next_id(&mut self) -> ExprId {
        let id = ExprId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: ExprId,
    pub kind: ExprKind,
    pub type_ref: TypeRef,
}

impl Expr {
    pub fn new(id: ExprId, kind: ExprKind) -> Self {
        Self {
            id,
            kind,
            type_ref: TypeRef::unresolved(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    /// A literal value; `None` is the `null` literal.
    Literal { value: Option<Literal> },
    Grouping {
        inner: Box<Expr>,
    },
    UnaryPrefix {
        op: Token,
        right: Box<Expr>,
    },
    /// Postfix `++`/`--`; `name` is the mutated identifier.
    UnaryPostfix {
        left: Box<Expr>,
        op: Token,
        name: Token,
    },
    Binary {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Logical {
        left: Box<Expr>,
        op: Token,
        right: Box<Expr>,
    },
    Assign {
        name: Token,
        value: Box<Expr>,
    },
    /// The name-reference form.
    Variable {
        name: Token,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        args: Vec<Expr>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Empty,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expression(Expr),
    Print(Expr),
    Var {
        name: Token,
        type_ref: TypeRef,
        initializer: Option<Expr>,
    },
    Block(Vec<Stmt>),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
    Class(Rc<ClassDecl>),
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Token,
    pub type_ref: TypeRef,
}

#[derive(Debug)]
pub struct ClassDecl {
    pub name: Token,
    pub methods: Vec<Rc<FunctionDecl>>,
}

/// Parenthesized textual rendering backing the `-p` flag.
pub fn print_ast(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        print_stmt(&mut out, stmt);
        out.push('\n');
    }
    out
}

fn print_stmt(out: &mut String, stmt: &Stmt) {
    match stmt {
        Stmt::Expression(expr) => print_expr(out, expr),
        Stmt::Print(expr) => {
            out.push_str("(print ");
            print_expr(out, expr);
            out.push(')');
        }
        Stmt::Var {
            name, initializer, ..
        } => {
            let _ = write!(out, "(var {}", name.lexeme);
            if let Some(init) = initializer {
                out.push(' ');
                print_expr(out, init);
            }
            out.push(')');
        }
        Stmt::Block(stmts) => {
            out.push_str("(block");
            for inner in stmts {
                out.push(' ');
                print_stmt(out, inner);
            }
            out.push(')');
        }
        Stmt::If {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push_str("(if ");
            print_expr(out, condition);
            out.push(' ');
            print_stmt(out, then_branch);
            if let Some(else_branch) = else_branch {
                out.push(' ');
                print_stmt(out, else_branch);
            }
            out.push(')');
        }
        Stmt::While { condition, body } => {
            out.push_str("(while ");
            print_expr(out, condition);
            out.push(' ');
            print_stmt(out, body);
            out.push(')');
        }
        Stmt::Function(decl) => {
            let _ = write!(out, "(fun {} (", decl.name.lexeme);
            for (index, param) in decl.params.iter().enumerate() {
                if index > 0 {
                    out.push(' ');
                }
                out.push_str(&param.name.lexeme);
            }
            out.push(')');
            for inner in &decl.body {
                out.push(' ');
                print_stmt(out, inner);
            }
            out.push(')');
        }
        Stmt::Return { value, .. } => {
            out.push_str("(return");
            if let Some(value) = value {
                out.push(' ');
                print_expr(out, value);
            }
            out.push(')');
        }
        Stmt::Class(decl) => {
            let _ = write!(out, "(class {})", decl.name.lexeme);
        }
    }
}

fn print_expr(out: &mut String, expr: &Expr) {
    match &expr.kind {
        ExprKind::Literal { value } => match value {
            Some(Literal::Int(v)) => {
                let _ = write!(out, "{v}");
            }
            Some(Literal::Float(v)) => {
                let _ = write!(out, "{v}");
            }
            Some(Literal::Str(v)) => {
                let _ = write!(out, "\"{v}\"");
            }
            Some(Literal::Bool(v)) => {
                let _ = write!(out, "{v}");
            }
            None => out.push_str("null"),
        },
        ExprKind::Grouping { inner } => {
            out.push_str("(group ");
            print_expr(out, inner);
            out.push(')');
        }
        ExprKind::UnaryPrefix { op, right } => {
            let _ = write!(out, "({} ", op.lexeme);
            print_expr(out, right);
            out.push(')');
        }
        ExprKind::UnaryPostfix { left, op, .. } => {
            let _ = write!(out, "(postfix{} ", op.lexeme);
            print_expr(out, left);
            out.push(')');
        }
        ExprKind::Binary { left, op, right } | ExprKind::Logical { left, op, right } => {
            let _ = write!(out, "({} ", op.lexeme);
            print_expr(out, left);
            out.push(' ');
            print_expr(out, right);
            out.push(')');
        }
        ExprKind::Assign { name, value } => {
            let _ = write!(out, "(assign {} ", name.lexeme);
            print_expr(out, value);
            out.push(')');
        }
        ExprKind::Variable { name } => out.push_str(&name.lexeme),
        ExprKind::Call { callee, args, .. } => {
            out.push_str("(call ");
            print_expr(out, callee);
            for arg in args {
                out.push(' ');
                print_expr(out, arg);
            }
            out.push(')');
        }
        ExprKind::Get { object, name } => {
            out.push_str("(get ");
            print_expr(out, object);
            let _ = write!(out, " {})", name.lexeme);
        }
        ExprKind::Empty => out.push_str("(empty)"),
    }
}
