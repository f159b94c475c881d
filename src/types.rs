//! Static type domain: the built-in type table, the numeric promotion
//! matrix, the identity-only coercion policy, and the shared `TypeRef`
//! slots attached to expressions and declarations.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    BigInt,
    Bool,
    Str,
    Char,
    DateTime,
    Object,
    Null,
    Void,
}

impl Type {
    /// Arithmetic kinds participate in `+ - * / % **` promotion.
    pub fn is_arithmetic(self) -> bool {
        self.magnitude_rank().is_some()
    }

    /// Comparable kinds may appear as binary operands at all. `Object` and
    /// `Void` carry no ordering or equality contract in this core.
    pub fn is_comparable(self) -> bool {
        !matches!(self, Type::Object | Type::Void)
    }

    /// Rank ordered by the maximum representable magnitude of each kind.
    /// Ties cannot arise between distinct kinds.
    fn magnitude_rank(self) -> Option<u8> {
        match self {
            Type::Int8 => Some(0),
            Type::UInt8 => Some(1),
            Type::Int16 => Some(2),
            Type::UInt16 => Some(3),
            Type::Int32 => Some(4),
            Type::UInt32 => Some(5),
            Type::Int64 => Some(6),
            Type::UInt64 => Some(7),
            Type::Float32 => Some(8),
            Type::Float64 => Some(9),
            Type::BigInt => Some(10),
            _ => None,
        }
    }

    /// The wider of two arithmetic operand types; the left operand wins on
    /// equal rank. Callers must check `is_arithmetic` on both sides first.
    pub fn promote(left: Type, right: Type) -> Type {
        let left_rank = left.magnitude_rank().unwrap_or(0);
        let right_rank = right.magnitude_rank().unwrap_or(0);
        if right_rank > left_rank { right } else { left }
    }

    /// Identity-only coercion: an argument or initializer type is accepted
    /// iff it equals the target type. Numeric widening happens only inside
    /// expression promotion, never at call sites or declarations.
    pub fn can_be_coerced_into(target: Type, source: Type) -> bool {
        target == source
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Int8 => "Int8",
            Type::Int16 => "Int16",
            Type::Int32 => "Int32",
            Type::Int64 => "Int64",
            Type::UInt8 => "UInt8",
            Type::UInt16 => "UInt16",
            Type::UInt32 => "UInt32",
            Type::UInt64 => "UInt64",
            Type::Float32 => "Float32",
            Type::Float64 => "Float",
            Type::BigInt => "BigInt",
            Type::Bool => "Bool",
            Type::Str => "String",
            Type::Char => "Char",
            Type::DateTime => "DateTime",
            Type::Object => "Object",
            Type::Null => "Null",
            Type::Void => "Void",
        };
        write!(f, "{name}")
    }
}

/// Short-name lookup for explicit type annotations.
pub fn builtin_type(name: &str) -> Option<Type> {
    match name {
        "int" | "Int32" => Some(Type::Int32),
        "long" | "Int64" => Some(Type::Int64),
        "float" | "double" | "Float" | "Double" => Some(Type::Float64),
        "string" | "String" => Some(Type::Str),
        "bool" | "Boolean" => Some(Type::Bool),
        "char" | "Char" => Some(Type::Char),
        "object" | "Object" => Some(Type::Object),
        "void" | "Void" => Some(Type::Void),
        _ => None,
    }
}

#[derive(Debug)]
struct TypeSlot {
    specifier: Option<Token>,
    resolved: Option<Type>,
}

/// A shared, mutable type slot. Created unresolved by the parser; filled
/// exactly once by the type resolver. Cloning shares the slot, so a
/// binding and the declaration it refers to observe the same resolution.
#[derive(Debug, Clone)]
pub struct TypeRef(Rc<RefCell<TypeSlot>>);

impl TypeRef {
    pub fn unresolved() -> Self {
        TypeRef(Rc::new(RefCell::new(TypeSlot {
            specifier: None,
            resolved: None,
        })))
    }

    pub fn with_specifier(token: Token) -> Self {
        TypeRef(Rc::new(RefCell::new(TypeSlot {
            specifier: Some(token),
            resolved: None,
        })))
    }

    pub fn of(ty: Type) -> Self {
        TypeRef(Rc::new(RefCell::new(TypeSlot {
            specifier: None,
            resolved: Some(ty),
        })))
    }

    pub fn is_resolved(&self) -> bool {
        self.0.borrow().resolved.is_some()
    }

    /// A slot is explicit iff it carries a written type specifier token.
    pub fn is_explicit(&self) -> bool {
        self.0.borrow().specifier.is_some()
    }

    pub fn resolved(&self) -> Option<Type> {
        self.0.borrow().resolved
    }

    pub fn specifier(&self) -> Option<Token> {
        self.0.borrow().specifier.clone()
    }

    /// First resolution wins; a slot is never reassigned. Re-running the
    /// type passes over retained REPL statements is therefore a no-op.
    pub fn fill(&self, ty: Type) {
        let mut slot = self.0.borrow_mut();
        if slot.resolved.is_none() {
            slot.resolved = Some(ty);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    #[test]
    fn promotion_prefers_larger_magnitude() {
        assert_eq!(Type::promote(Type::Int32, Type::Int64), Type::Int64);
        assert_eq!(Type::promote(Type::Int64, Type::Float64), Type::Float64);
        assert_eq!(Type::promote(Type::UInt32, Type::Int32), Type::UInt32);
        assert_eq!(Type::promote(Type::Float64, Type::UInt64), Type::Float64);
        assert_eq!(Type::promote(Type::Float32, Type::UInt64), Type::Float32);
        assert_eq!(Type::promote(Type::BigInt, Type::Float64), Type::BigInt);
    }

    #[test]
    fn promotion_ties_keep_left() {
        assert_eq!(Type::promote(Type::Int32, Type::Int32), Type::Int32);
    }

    #[test]
    fn coercion_is_identity_only() {
        assert!(Type::can_be_coerced_into(Type::Int32, Type::Int32));
        assert!(!Type::can_be_coerced_into(Type::Int64, Type::Int32));
        assert!(!Type::can_be_coerced_into(Type::Float64, Type::Int32));
        assert!(!Type::can_be_coerced_into(Type::Str, Type::Null));
    }

    #[test]
    fn builtin_table_covers_aliases() {
        assert_eq!(builtin_type("int"), Some(Type::Int32));
        assert_eq!(builtin_type("Int32"), Some(Type::Int32));
        assert_eq!(builtin_type("string"), Some(Type::Str));
        assert_eq!(builtin_type("String"), Some(Type::Str));
        assert_eq!(builtin_type("void"), Some(Type::Void));
        assert_eq!(builtin_type("Elephant"), None);
    }

    #[test]
    fn non_arithmetic_kinds_are_rejected_from_promotion() {
        assert!(!Type::Bool.is_arithmetic());
        assert!(!Type::Str.is_arithmetic());
        assert!(!Type::DateTime.is_arithmetic());
        assert!(!Type::Null.is_arithmetic());
        assert!(Type::BigInt.is_arithmetic());
    }

    #[test]
    fn type_ref_resolves_exactly_once() {
        let slot = TypeRef::unresolved();
        assert!(!slot.is_resolved());
        slot.fill(Type::Int32);
        slot.fill(Type::Str);
        assert_eq!(slot.resolved(), Some(Type::Int32));
    }

    #[test]
    fn explicit_tracks_specifier_presence() {
        let token = Token::new(TokenKind::Identifier, "int", 1);
        let explicit = TypeRef::with_specifier(token);
        assert!(explicit.is_explicit());
        assert!(!TypeRef::unresolved().is_explicit());

        let shared = explicit.clone();
        shared.fill(Type::Int32);
        assert_eq!(explicit.resolved(), Some(Type::Int32));
    }
}
