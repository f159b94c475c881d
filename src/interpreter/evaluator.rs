use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{Expr, ExprId, ExprKind, Stmt};
use crate::interpreter::environment::Environment;
use crate::interpreter::error::{RuntimeError, RuntimeErrorKind};
use crate::interpreter::value::{ScriptFunction, Value};
use crate::natives::{NativeFunction, NativeRegistry};
use crate::resolver::{Binding, BindingTable};
use crate::token::{Literal, Token, TokenKind};

/// Control-flow marker for statement execution. `Return` bubbles through
/// enclosing statements until the call-expression evaluator absorbs it.
pub(super) enum ExecResult {
    Continue,
    Return(Value),
}

type ExecOutcome = Result<ExecResult, RuntimeError>;
type EvalResult = Result<Value, RuntimeError>;

/// Tree-walking executor. Reads and writes are directed by the resolver's
/// bindings: a known scope distance targets the environment chain, no
/// distance targets the globals frame or the host directories.
pub(super) struct Evaluator<'a> {
    bindings: &'a BindingTable,
    natives: &'a NativeRegistry,
    globals: Rc<RefCell<Environment>>,
    environment: Rc<RefCell<Environment>>,
    output: &'a mut dyn FnMut(&str),
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(
        bindings: &'a BindingTable,
        natives: &'a NativeRegistry,
        globals: Rc<RefCell<Environment>>,
        output: &'a mut dyn FnMut(&str),
    ) -> Self {
        Self {
            bindings,
            natives,
            environment: Rc::clone(&globals),
            globals,
            output,
        }
    }

    pub(super) fn exec_block(&mut self, body: &[Stmt]) -> ExecOutcome {
        for statement in body {
            match self.exec_statement(statement)? {
                ExecResult::Continue => {}
                ExecResult::Return(value) => return Ok(ExecResult::Return(value)),
            }
        }
        Ok(ExecResult::Continue)
    }

    fn exec_block_in(&mut self, body: &[Stmt], env: Rc<RefCell<Environment>>) -> ExecOutcome {
        let previous = std::mem::replace(&mut self.environment, env);
        let result = self.exec_block(body);
        // Every exit path restores the previous frame, including errors.
        self.environment = previous;
        result
    }

    fn exec_statement(&mut self, statement: &Stmt) -> ExecOutcome {
        match statement {
            Stmt::Expression(expr) => {
                self.eval_expression(expr)?;
                Ok(ExecResult::Continue)
            }
            Stmt::Print(expr) => {
                let value = self.eval_expression(expr)?;
                (self.output)(&value.stringify());
                Ok(ExecResult::Continue)
            }
            Stmt::Var {
                name, initializer, ..
            } => {
                let value = match initializer {
                    Some(init) => self.eval_expression(init)?,
                    None => Value::Null,
                };
                self.environment
                    .borrow_mut()
                    .define(name.lexeme.clone(), value);
                Ok(ExecResult::Continue)
            }
            Stmt::Block(stmts) => {
                let child = Environment::child_of(&self.environment);
                self.exec_block_in(stmts, child)
            }
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_expression(condition)?.is_truthy() {
                    self.exec_statement(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.exec_statement(else_branch)
                } else {
                    Ok(ExecResult::Continue)
                }
            }
            Stmt::While { condition, body } => {
                while self.eval_expression(condition)?.is_truthy() {
                    if let ExecResult::Return(value) = self.exec_statement(body)? {
                        return Ok(ExecResult::Return(value));
                    }
                }
                Ok(ExecResult::Continue)
            }
            Stmt::Function(decl) => {
                let function = Value::Function(Rc::new(ScriptFunction {
                    decl: Rc::clone(decl),
                    closure: Rc::clone(&self.environment),
                }));
                self.environment
                    .borrow_mut()
                    .define(decl.name.lexeme.clone(), function);
                Ok(ExecResult::Continue)
            }
            Stmt::Class(decl) => {
                self.environment
                    .borrow_mut()
                    .define(decl.name.lexeme.clone(), Value::ScriptClass(Rc::clone(decl)));
                Ok(ExecResult::Continue)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.eval_expression(value)?,
                    None => Value::Null,
                };
                Ok(ExecResult::Return(value))
            }
        }
    }

    pub(super) fn eval_expression(&mut self, expr: &Expr) -> EvalResult {
        match &expr.kind {
            ExprKind::Literal { value } => Ok(match value {
                Some(Literal::Int(v)) => Value::Int(*v),
                Some(Literal::Float(v)) => Value::Float(*v),
                Some(Literal::Str(v)) => Value::string(v.clone()),
                Some(Literal::Bool(v)) => Value::Bool(*v),
                None => Value::Null,
            }),
            ExprKind::Grouping { inner } => self.eval_expression(inner),
            ExprKind::UnaryPrefix { op, right } => {
                let value = self.eval_expression(right)?;
                match op.kind {
                    TokenKind::Minus => match value {
                        Value::Int(v) => v
                            .checked_neg()
                            .map(Value::Int)
                            .ok_or_else(|| RuntimeError::new(op, RuntimeErrorKind::IntegerOverflow)),
                        Value::Float(v) => Ok(Value::Float(-v)),
                        _ => Err(RuntimeError::new(op, RuntimeErrorKind::NonNumericOperand)),
                    },
                    TokenKind::Bang => Ok(Value::Bool(!value.is_truthy())),
                    _ => Err(RuntimeError::new(
                        op,
                        RuntimeErrorKind::Internal("unexpected prefix operator"),
                    )),
                }
            }
            ExprKind::UnaryPostfix { op, name, .. } => self.eval_postfix(expr.id, op, name),
            ExprKind::Binary { left, op, right } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                self.eval_binary(left, op, right)
            }
            ExprKind::Logical { left, op, right } => {
                let left = self.eval_expression(left)?;
                // Short-circuit: the left value decides whether the right
                // side runs, and whichever value fixed the result is it.
                match op.kind {
                    TokenKind::Or if left.is_truthy() => Ok(left),
                    TokenKind::And if !left.is_truthy() => Ok(left),
                    _ => self.eval_expression(right),
                }
            }
            ExprKind::Assign { name, value } => {
                let value = self.eval_expression(value)?;
                self.assign_name(expr.id, name, value.clone())?;
                Ok(value)
            }
            ExprKind::Variable { name } => self.read_name(expr.id, name),
            ExprKind::Call {
                callee,
                paren,
                args,
            } => {
                let callee_value = self.eval_expression(callee)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval_expression(arg)?);
                }
                self.call_value(callee_value, values, paren)
            }
            ExprKind::Get { object, name } => {
                let object = self.eval_expression(object)?;
                self.eval_get(object, name)
            }
            ExprKind::Empty => Ok(Value::Null),
        }
    }

    /// Identifier read directed by the binding: a scope distance targets
    /// the chain, otherwise host classes win over the globals frame.
    fn read_name(&mut self, id: ExprId, name: &Token) -> EvalResult {
        match self.bindings.get(id) {
            Some(
                Binding::Variable {
                    distance: Some(distance),
                    ..
                }
                | Binding::Function {
                    distance: Some(distance),
                    ..
                },
            ) => Environment::get_at(&self.environment, *distance, &name.lexeme).ok_or_else(|| {
                RuntimeError::new(
                    name,
                    RuntimeErrorKind::UndefinedIdentifier {
                        name: name.lexeme.clone(),
                    },
                )
            }),
            Some(Binding::Native { function }) => Ok(Value::Native(Rc::clone(function))),
            _ => {
                if let Some(class) = self.natives.class(&name.lexeme) {
                    return Ok(Value::Class(class));
                }
                self.globals.borrow().get(&name.lexeme).ok_or_else(|| {
                    RuntimeError::new(
                        name,
                        RuntimeErrorKind::UndefinedIdentifier {
                            name: name.lexeme.clone(),
                        },
                    )
                })
            }
        }
    }

    fn assign_name(&mut self, id: ExprId, name: &Token, value: Value) -> Result<(), RuntimeError> {
        let stored = match self.bindings.get(id).and_then(Binding::distance) {
            Some(distance) => {
                Environment::assign_at(&self.environment, distance, &name.lexeme, value)
            }
            None => self.globals.borrow_mut().assign(&name.lexeme, value),
        };
        if stored {
            Ok(())
        } else {
            Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UndefinedIdentifier {
                    name: name.lexeme.clone(),
                },
            ))
        }
    }

    /// Postfix `++`/`--`: store the stepped value back into the same slot
    /// and produce the previous value.
    fn eval_postfix(&mut self, id: ExprId, op: &Token, name: &Token) -> EvalResult {
        let previous = self.read_name(id, name)?;
        let step: i64 = if op.kind == TokenKind::PlusPlus { 1 } else { -1 };
        let next = match previous {
            Value::Int(v) => v
                .checked_add(step)
                .map(Value::Int)
                .ok_or_else(|| RuntimeError::new(op, RuntimeErrorKind::IntegerOverflow))?,
            Value::Float(v) => Value::Float(v + step as f64),
            _ => return Err(RuntimeError::new(op, RuntimeErrorKind::NonNumericOperand)),
        };
        self.assign_name(id, name, next)?;
        Ok(previous)
    }

    fn eval_binary(&mut self, left: Value, op: &Token, right: Value) -> EvalResult {
        match op.kind {
            TokenKind::Greater | TokenKind::GreaterEqual | TokenKind::Less
            | TokenKind::LessEqual => {
                let ordering = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                    (a, b) if a.is_numeric() && b.is_numeric() => {
                        as_float(a).partial_cmp(&as_float(b))
                    }
                    _ => {
                        return Err(RuntimeError::new(
                            op,
                            RuntimeErrorKind::NonNumericOperands,
                        ));
                    }
                };
                let Some(ordering) = ordering else {
                    // NaN comparisons are false on every operator.
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op.kind {
                    TokenKind::Greater => ordering.is_gt(),
                    TokenKind::GreaterEqual => ordering.is_ge(),
                    TokenKind::Less => ordering.is_lt(),
                    _ => ordering.is_le(),
                }))
            }
            TokenKind::EqualEqual => Ok(Value::Bool(left.equals(&right))),
            TokenKind::BangEqual => Ok(Value::Bool(!left.equals(&right))),
            TokenKind::Plus => match (&left, &right) {
                (Value::Str(a), Value::Str(b)) => {
                    let mut combined = a.to_string();
                    combined.push_str(b);
                    Ok(Value::string(combined))
                }
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(*b)
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::new(op, RuntimeErrorKind::IntegerOverflow)),
                (a, b) if a.is_numeric() && b.is_numeric() => {
                    Ok(Value::Float(as_float(a) + as_float(b)))
                }
                _ => Err(RuntimeError::new(op, RuntimeErrorKind::MixedAddOperands)),
            },
            TokenKind::Minus | TokenKind::Star => match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => {
                    let result = if op.kind == TokenKind::Minus {
                        a.checked_sub(*b)
                    } else {
                        a.checked_mul(*b)
                    };
                    result
                        .map(Value::Int)
                        .ok_or_else(|| RuntimeError::new(op, RuntimeErrorKind::IntegerOverflow))
                }
                (a, b) if a.is_numeric() && b.is_numeric() => {
                    let (a, b) = (as_float(a), as_float(b));
                    Ok(Value::Float(if op.kind == TokenKind::Minus {
                        a - b
                    } else {
                        a * b
                    }))
                }
                _ => Err(RuntimeError::new(op, RuntimeErrorKind::NonNumericOperands)),
            },
            TokenKind::Slash | TokenKind::Percent => match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => {
                    if *b == 0 {
                        return Err(RuntimeError::new(op, RuntimeErrorKind::DivisionByZero));
                    }
                    Ok(Value::Int(if op.kind == TokenKind::Slash {
                        a / b
                    } else {
                        a % b
                    }))
                }
                (a, b) if a.is_numeric() && b.is_numeric() => {
                    let (a, b) = (as_float(a), as_float(b));
                    Ok(Value::Float(if op.kind == TokenKind::Slash {
                        a / b
                    } else {
                        a % b
                    }))
                }
                _ => Err(RuntimeError::new(op, RuntimeErrorKind::NonNumericOperands)),
            },
            TokenKind::StarStar => self.eval_power(left, op, right),
            _ => Err(RuntimeError::new(
                op,
                RuntimeErrorKind::Internal("unexpected binary operator"),
            )),
        }
    }

    /// `**` stays integral only for non-negative integer exponents on
    /// integer bases; everything else goes through floating point.
    fn eval_power(&mut self, left: Value, op: &Token, right: Value) -> EvalResult {
        match (&left, &right) {
            (Value::Int(base), Value::Int(exp)) if *exp >= 0 => {
                let exp = u32::try_from(*exp)
                    .map_err(|_| RuntimeError::new(op, RuntimeErrorKind::IntegerOverflow))?;
                base.checked_pow(exp)
                    .map(Value::Int)
                    .ok_or_else(|| RuntimeError::new(op, RuntimeErrorKind::IntegerOverflow))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => {
                Ok(Value::Float(as_float(a).powf(as_float(b))))
            }
            _ => Err(RuntimeError::new(op, RuntimeErrorKind::NonNumericOperands)),
        }
    }

    fn eval_get(&mut self, object: Value, name: &Token) -> EvalResult {
        match object {
            Value::Class(class) => match class.method(&name.lexeme) {
                Some(method) => Ok(Value::Native(method)),
                None => Err(RuntimeError::new(
                    name,
                    RuntimeErrorKind::UnknownMethod {
                        method: name.lexeme.clone(),
                        type_name: "native class",
                    },
                )),
            },
            Value::Arguments(args) => match name.lexeme.as_str() {
                "pop" | "len" => Ok(Value::BoundMethod {
                    receiver: Box::new(Value::Arguments(args)),
                    method: name.lexeme.clone(),
                }),
                _ => Err(RuntimeError::new(
                    name,
                    RuntimeErrorKind::UnknownMethod {
                        method: name.lexeme.clone(),
                        type_name: "arguments",
                    },
                )),
            },
            other => Err(RuntimeError::new(
                name,
                RuntimeErrorKind::UnknownMethod {
                    method: name.lexeme.clone(),
                    type_name: other.type_name(),
                },
            )),
        }
    }

    fn call_value(&mut self, callee: Value, args: Vec<Value>, paren: &Token) -> EvalResult {
        match callee {
            Value::Function(function) => {
                if args.len() != function.decl.params.len() {
                    return Err(RuntimeError::new(
                        paren,
                        RuntimeErrorKind::FunctionArityMismatch {
                            name: function.decl.name.lexeme.clone(),
                            expected: function.decl.params.len(),
                            found: args.len(),
                        },
                    ));
                }
                // Fresh frame chained to the captured closure, not to the
                // caller's environment.
                let frame = Environment::child_of(&function.closure);
                for (param, value) in function.decl.params.iter().zip(args) {
                    frame.borrow_mut().define(param.name.lexeme.clone(), value);
                }
                match self.exec_block_in(&function.decl.body, frame)? {
                    ExecResult::Continue => Ok(Value::Null),
                    ExecResult::Return(value) => Ok(value),
                }
            }
            Value::Native(function) => self.call_native(&function, args, paren),
            Value::BoundMethod { receiver, method } => {
                self.call_bound_method(*receiver, &method, args, paren)
            }
            other => Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::NotCallable {
                    type_name: other.type_name(),
                },
            )),
        }
    }

    fn call_native(
        &mut self,
        function: &NativeFunction,
        args: Vec<Value>,
        paren: &Token,
    ) -> EvalResult {
        if args.len() != function.params.len() {
            return Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::MethodArityMismatch {
                    method: function.name.to_string(),
                    expected: function.params.len(),
                    found: args.len(),
                },
            ));
        }
        (function.func)(&args)
            .map_err(|error| RuntimeError::new(paren, RuntimeErrorKind::Native(error.0)))
    }

    fn call_bound_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        paren: &Token,
    ) -> EvalResult {
        let Value::Arguments(list) = receiver else {
            return Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::Internal("bound method on unexpected receiver"),
            ));
        };
        if !args.is_empty() {
            return Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::MethodArityMismatch {
                    method: method.to_string(),
                    expected: 0,
                    found: args.len(),
                },
            ));
        }
        match method {
            "pop" => match list.borrow_mut().pop() {
                Some(argument) => Ok(Value::string(argument)),
                None => Err(RuntimeError::new(paren, RuntimeErrorKind::NoArgumentsLeft)),
            },
            "len" => {
                let len = list.borrow().len();
                Ok(Value::Int(len as i64))
            }
            _ => Err(RuntimeError::new(
                paren,
                RuntimeErrorKind::Internal("bound method with unknown name"),
            )),
        }
    }
}

fn as_float(value: &Value) -> f64 {
    match value {
        Value::Int(v) => *v as f64,
        Value::Float(v) => *v,
        _ => unreachable!("caller checked is_numeric"),
    }
}
