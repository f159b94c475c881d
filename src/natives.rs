//! Host-provided callables and classes exposed to scripts under global
//! names. The resolver consumes these directories read-only; the evaluator
//! invokes the descriptors with already-evaluated argument values.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::interpreter::Value;
use crate::types::{Type, TypeRef};

/// A host exception surfaced to the evaluator, which annotates it with the
/// call-site token and reports it as a runtime error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError(pub String);

impl NativeError {
    pub fn new(message: impl Into<String>) -> Self {
        NativeError(message.into())
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type NativeFn = fn(&[Value]) -> Result<Value, NativeError>;

/// Descriptor of one host callable: parameter types for the validator,
/// a return-type slot for the type resolver, and the method itself.
pub struct NativeFunction {
    pub name: &'static str,
    pub params: Vec<Type>,
    pub return_type: TypeRef,
    pub func: NativeFn,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A host class: a type handle plus named static methods.
#[derive(Debug)]
pub struct NativeClass {
    pub name: &'static str,
    pub ty: Type,
    pub methods: HashMap<&'static str, Rc<NativeFunction>>,
}

impl NativeClass {
    pub fn method(&self, name: &str) -> Option<Rc<NativeFunction>> {
        self.methods.get(name).cloned()
    }
}

/// The immutable host directories handed to the resolver: top-level
/// callables, classes, and super-globals pre-bound in the root environment.
#[derive(Debug)]
pub struct NativeRegistry {
    pub callables: HashMap<&'static str, Rc<NativeFunction>>,
    pub classes: HashMap<&'static str, Rc<NativeClass>>,
    pub super_globals: HashMap<&'static str, Type>,
}

impl NativeRegistry {
    pub fn standard() -> Self {
        let mut callables = HashMap::new();
        callables.insert(
            "clock",
            Rc::new(NativeFunction {
                name: "clock",
                params: Vec::new(),
                return_type: TypeRef::of(Type::Float64),
                func: native_clock,
            }),
        );

        let mut classes = HashMap::new();
        classes.insert("Base64", Rc::new(base64_class()));

        let mut super_globals = HashMap::new();
        super_globals.insert("ARGV", Type::Object);

        Self {
            callables,
            classes,
            super_globals,
        }
    }

    pub fn callable(&self, name: &str) -> Option<Rc<NativeFunction>> {
        self.callables.get(name).cloned()
    }

    pub fn class(&self, name: &str) -> Option<Rc<NativeClass>> {
        self.classes.get(name).cloned()
    }

    pub fn super_global(&self, name: &str) -> Option<Type> {
        self.super_globals.get(name).copied()
    }
}

fn base64_class() -> NativeClass {
    let mut methods = HashMap::new();
    methods.insert(
        "decode",
        Rc::new(NativeFunction {
            name: "decode",
            params: vec![Type::Str],
            return_type: TypeRef::of(Type::Str),
            func: native_base64_decode,
        }),
    );
    methods.insert(
        "encode",
        Rc::new(NativeFunction {
            name: "encode",
            params: vec![Type::Str],
            return_type: TypeRef::of(Type::Str),
            func: native_base64_encode,
        }),
    );
    NativeClass {
        name: "Base64",
        ty: Type::Object,
        methods,
    }
}

fn native_clock(_args: &[Value]) -> Result<Value, NativeError> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| NativeError::new("System clock before Unix epoch"))?;
    Ok(Value::Float(now.as_secs_f64()))
}

fn native_base64_decode(args: &[Value]) -> Result<Value, NativeError> {
    let input = expect_string(args, 0, "decode")?;
    let bytes =
        base64_decode(&input).ok_or_else(|| NativeError::new("Invalid base64 input"))?;
    let text = String::from_utf8(bytes)
        .map_err(|_| NativeError::new("Decoded base64 is not valid UTF-8"))?;
    Ok(Value::string(text))
}

fn native_base64_encode(args: &[Value]) -> Result<Value, NativeError> {
    let input = expect_string(args, 0, "encode")?;
    Ok(Value::string(base64_encode(input.as_bytes())))
}

fn expect_string(args: &[Value], index: usize, method: &str) -> Result<String, NativeError> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(NativeError::new(format!(
            "Method '{method}' expected a string argument, got {}",
            other.type_name()
        ))),
        None => Err(NativeError::new(format!(
            "Method '{method}' is missing argument {index}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Base64 encoding/decoding (RFC 4648 §4); decode tolerates missing padding
// ---------------------------------------------------------------------------

const BASE64_TABLE: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

pub fn base64_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = chunk.get(1).copied().unwrap_or(0) as u32;
        let b2 = chunk.get(2).copied().unwrap_or(0) as u32;
        let triple = (b0 << 16) | (b1 << 8) | b2;
        out.push(BASE64_TABLE[((triple >> 18) & 0x3F) as usize] as char);
        out.push(BASE64_TABLE[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            out.push(BASE64_TABLE[((triple >> 6) & 0x3F) as usize] as char);
        } else {
            out.push('=');
        }
        if chunk.len() > 2 {
            out.push(BASE64_TABLE[(triple & 0x3F) as usize] as char);
        } else {
            out.push('=');
        }
    }
    out
}

pub fn base64_decode(input: &str) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf: u32 = 0;
    let mut bits: u32 = 0;
    for &b in input.as_bytes() {
        if b == b'=' {
            break;
        }
        let val = BASE64_TABLE.iter().position(|&c| c == b)? as u32;
        buf = (buf << 6) | val;
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((buf >> bits) as u8);
            buf &= (1 << bits) - 1;
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_padded_and_unpadded_input() {
        assert_eq!(
            base64_decode("aGVqIGhlag==").expect("decode"),
            b"hej hej".to_vec()
        );
        assert_eq!(
            base64_decode("aGVqIGhlag").expect("decode"),
            b"hej hej".to_vec()
        );
    }

    #[test]
    fn encode_round_trips_through_decode() {
        let encoded = base64_encode(b"hej hej");
        assert_eq!(encoded, "aGVqIGhlag==");
        assert_eq!(base64_decode(&encoded).expect("decode"), b"hej hej".to_vec());
    }

    #[test]
    fn rejects_characters_outside_the_alphabet() {
        assert!(base64_decode("a$b").is_none());
    }

    #[test]
    fn decode_native_surfaces_host_errors() {
        let err = native_base64_decode(&[Value::string("###")]).expect_err("expected error");
        assert_eq!(err, NativeError::new("Invalid base64 input"));
    }

    #[test]
    fn registry_exposes_standard_directories() {
        let registry = NativeRegistry::standard();
        assert!(registry.callable("clock").is_some());
        assert!(registry.class("Base64").is_some());
        assert_eq!(registry.super_global("ARGV"), Some(Type::Object));
        let base64 = registry.class("Base64").expect("class");
        assert_eq!(
            base64.method("decode").expect("method").params,
            vec![Type::Str]
        );
    }
}
