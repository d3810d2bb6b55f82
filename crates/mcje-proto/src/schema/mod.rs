//! Schema-driven typed codec.
//!
//! A protocol schema maps type names to type trees ([`def::TypeDef`]). The
//! [`TypeRegistry`] interprets those trees to read, write, and size packets
//! as [`serde_json::Value`] structures. Named references are resolved through
//! the registry on every use, so cyclic definitions cost nothing to build.

pub mod def;

mod context;
mod nbt_span;
mod read;
mod size;
mod write;

use std::collections::HashMap;

use serde_json::Value;

pub use context::ContextChain;
pub use def::{CountSpec, Field, FlagSpec, TypeDef, TypeRef};

use crate::error::ProtoError;
use crate::types::{VarInt, VarLong};

/// Maximum hops through named aliases before we declare a resolution cycle.
const MAX_ALIAS_HOPS: usize = 32;

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Positioned reader over a packet body. All multi-byte integers are
/// big-endian, per the Java wire format.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The unread tail of the buffer.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8], ProtoError> {
        if self.remaining() < n {
            return Err(ProtoError::BufferTooShort {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn peek_u8(&self) -> Result<u8, ProtoError> {
        self.buf.get(self.pos).copied().ok_or(ProtoError::BufferTooShort {
            needed: 1,
            remaining: 0,
        })
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtoError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i8(&mut self) -> Result<i8, ProtoError> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtoError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_i16(&mut self) -> Result<i16, ProtoError> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtoError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_i32(&mut self) -> Result<i32, ProtoError> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_u64(&mut self) -> Result<u64, ProtoError> {
        let b = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_be_bytes(raw))
    }

    pub fn get_i64(&mut self) -> Result<i64, ProtoError> {
        Ok(self.get_u64()? as i64)
    }

    pub fn get_f32(&mut self) -> Result<f32, ProtoError> {
        Ok(f32::from_bits(self.get_u32()?))
    }

    pub fn get_f64(&mut self) -> Result<f64, ProtoError> {
        Ok(f64::from_bits(self.get_u64()?))
    }

    pub fn get_varint(&mut self) -> Result<i32, ProtoError> {
        let (value, consumed) = VarInt::decode(self.rest())?;
        self.pos += consumed;
        Ok(value.0)
    }

    pub fn get_varlong(&mut self) -> Result<i64, ProtoError> {
        let (value, consumed) = VarLong::decode(self.rest())?;
        self.pos += consumed;
        Ok(value.0)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Named type table plus the interpreter entry points (see `read.rs`,
/// `write.rs`, `size.rs`).
#[derive(Debug)]
pub struct TypeRegistry {
    types: HashMap<String, TypeRef>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// A registry with every primitive pre-registered.
    pub fn new() -> Self {
        let mut reg = Self {
            types: HashMap::new(),
        };
        let natives: &[(&str, TypeDef)] = &[
            ("bool", TypeDef::Bool),
            ("i8", TypeDef::I8),
            ("u8", TypeDef::U8),
            ("i16", TypeDef::I16),
            ("u16", TypeDef::U16),
            ("i32", TypeDef::I32),
            ("u32", TypeDef::U32),
            ("i64", TypeDef::I64),
            ("u64", TypeDef::U64),
            ("f32", TypeDef::F32),
            ("f64", TypeDef::F64),
            ("varint", TypeDef::VarInt),
            ("varlong", TypeDef::VarLong),
            ("void", TypeDef::Void),
            ("UUID", TypeDef::Uuid),
            ("restBuffer", TypeDef::RestBuffer),
            ("nbt", TypeDef::Nbt),
            ("anonymousNbt", TypeDef::AnonymousNbt),
            (
                "string",
                TypeDef::PString {
                    count: CountSpec::Prefixed(Box::new(TypeRef::Named("varint".into()))),
                },
            ),
        ];
        for (name, def) in natives {
            reg.types
                .insert((*name).into(), TypeRef::Inline(Box::new(def.clone())));
        }
        reg
    }

    /// Register one named type.
    pub fn insert(&mut self, name: impl Into<String>, ty: TypeRef) {
        self.types.insert(name.into(), ty);
    }

    /// Register every entry of a JSON `types` object. Values equal to the
    /// string `"native"` are skipped — those are the pre-registered
    /// primitives.
    pub fn add_types(&mut self, types: &Value) -> Result<(), ProtoError> {
        let map = types.as_object().ok_or_else(|| {
            ProtoError::MalformedSchema("types section must be an object".into())
        })?;
        for (name, ty) in map {
            if ty.as_str() == Some("native") {
                continue;
            }
            self.types.insert(name.clone(), TypeRef::parse(ty)?);
        }
        Ok(())
    }

    /// Follow named references until an inline definition is found.
    pub(crate) fn resolve<'s>(&'s self, ty: &'s TypeRef) -> Result<&'s TypeDef, ProtoError> {
        let mut current = ty;
        for _ in 0..MAX_ALIAS_HOPS {
            match current {
                TypeRef::Inline(def) => return Ok(def),
                TypeRef::Named(name) => {
                    current = self
                        .types
                        .get(name)
                        .ok_or_else(|| ProtoError::UnknownType(name.clone()))?;
                }
            }
        }
        Err(ProtoError::MalformedSchema(
            "type alias chain too deep (cycle?)".into(),
        ))
    }

    /// Read a named type from the start of `data`, requiring full
    /// consumption of the buffer.
    pub fn read_named(&self, name: &str, data: &[u8]) -> Result<Value, ProtoError> {
        let mut r = Reader::new(data);
        let value = self.read(&TypeRef::Named(name.into()), &mut r, None)?;
        if r.remaining() > 0 {
            return Err(ProtoError::TrailingBytes(r.remaining()));
        }
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Value helpers
// ---------------------------------------------------------------------------

pub(crate) fn num_i64(v: &Value) -> Result<i64, ProtoError> {
    v.as_i64().ok_or_else(|| ProtoError::BadValue {
        expected: "integer",
        got: v.to_string(),
    })
}

pub(crate) fn num_u64(v: &Value) -> Result<u64, ProtoError> {
    v.as_u64().ok_or_else(|| ProtoError::BadValue {
        expected: "unsigned integer",
        got: v.to_string(),
    })
}

pub(crate) fn num_f64(v: &Value) -> Result<f64, ProtoError> {
    v.as_f64().ok_or_else(|| ProtoError::BadValue {
        expected: "number",
        got: v.to_string(),
    })
}

/// Convert a buffer value (array of byte-sized numbers) back to bytes.
pub fn value_to_bytes(v: &Value) -> Result<Vec<u8>, ProtoError> {
    let items = v.as_array().ok_or_else(|| ProtoError::BadValue {
        expected: "buffer",
        got: v.to_string(),
    })?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let byte = item
            .as_u64()
            .filter(|&b| b <= 0xff)
            .ok_or_else(|| ProtoError::BadValue {
                expected: "byte",
                got: item.to_string(),
            })?;
        out.push(byte as u8);
    }
    Ok(out)
}

/// Represent raw bytes as a buffer value.
pub fn bytes_to_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|&b| Value::from(b)).collect())
}

/// Stringification used to select switch branches.
pub(crate) fn discriminant_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
