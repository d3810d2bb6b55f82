//! Read interpretation of schema types.

use serde_json::{Map, Number, Value};
use uuid::Uuid;

use super::def::{CountSpec, Field, FlagSpec, TypeDef, TypeRef};
use super::nbt_span::nbt_span;
use super::{bytes_to_value, discriminant_string, num_i64, ContextChain, Reader, TypeRegistry};
use crate::error::ProtoError;

impl TypeRegistry {
    /// Read one value of `ty` from `r`. `ctx` is the enclosing container
    /// chain, consulted by `switch` and field-referenced counts.
    pub fn read(
        &self,
        ty: &TypeRef,
        r: &mut Reader<'_>,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<Value, ProtoError> {
        let def = self.resolve(ty)?;
        match def {
            TypeDef::Bool => Ok(Value::Bool(r.get_u8()? != 0)),
            TypeDef::I8 => Ok(Value::from(r.get_i8()? as i64)),
            TypeDef::U8 => Ok(Value::from(r.get_u8()? as u64)),
            TypeDef::I16 => Ok(Value::from(r.get_i16()? as i64)),
            TypeDef::U16 => Ok(Value::from(r.get_u16()? as u64)),
            TypeDef::I32 => Ok(Value::from(r.get_i32()? as i64)),
            TypeDef::U32 => Ok(Value::from(r.get_u32()? as u64)),
            TypeDef::I64 => Ok(Value::from(r.get_i64()?)),
            TypeDef::U64 => Ok(Value::from(r.get_u64()?)),
            TypeDef::F32 => float_value(r.get_f32()? as f64),
            TypeDef::F64 => float_value(r.get_f64()?),
            TypeDef::VarInt => Ok(Value::from(r.get_varint()? as i64)),
            TypeDef::VarLong => Ok(Value::from(r.get_varlong()?)),
            TypeDef::Void => Ok(Value::Null),
            TypeDef::Uuid => {
                let mut raw = [0u8; 16];
                raw.copy_from_slice(r.take(16)?);
                Ok(Value::String(Uuid::from_bytes(raw).to_string()))
            }
            TypeDef::RestBuffer => {
                let rest = r.take(r.remaining())?;
                Ok(bytes_to_value(rest))
            }
            TypeDef::Nbt => {
                let span = nbt_span(r.rest(), false)?;
                Ok(bytes_to_value(r.take(span)?))
            }
            TypeDef::AnonymousNbt => {
                let span = nbt_span(r.rest(), true)?;
                Ok(bytes_to_value(r.take(span)?))
            }
            TypeDef::PString { count } => {
                let len = self.read_count(count, r, ctx)?;
                let bytes = r.take(len)?;
                String::from_utf8(bytes.to_vec())
                    .map(Value::String)
                    .map_err(|_| ProtoError::InvalidUtf8)
            }
            TypeDef::Buffer { count } => {
                let len = self.read_count(count, r, ctx)?;
                Ok(bytes_to_value(r.take(len)?))
            }
            TypeDef::Container { fields } => self.read_container(fields, r, ctx),
            TypeDef::Array { count, elem } => {
                let len = self.read_count(count, r, ctx)?;
                let mut items = Vec::with_capacity(len.min(4096));
                for _ in 0..len {
                    items.push(self.read(elem, r, ctx)?);
                }
                Ok(Value::Array(items))
            }
            TypeDef::Mapper { base, to_name, .. } => {
                let raw = self.read(base, r, ctx)?;
                let id = num_i64(&raw)?;
                to_name
                    .get(&id)
                    .map(|name| Value::String(name.clone()))
                    .ok_or(ProtoError::UnknownPacketId(id))
            }
            TypeDef::Switch {
                compare_to,
                cases,
                default,
            } => {
                let branch = self.select_branch(compare_to, cases, default.as_deref(), ctx)?;
                self.read(branch, r, ctx)
            }
            TypeDef::Option(inner) => {
                if r.get_u8()? != 0 {
                    self.read(inner, r, ctx)
                } else {
                    Ok(Value::Null)
                }
            }
            TypeDef::Bitfield { members } => read_bitfield(members, r),
            TypeDef::Bitflags { base, flags, shift } => {
                let raw = self.read(base, r, ctx)?;
                let bits = bit_pattern(&raw)? >> shift;
                let mut obj = Map::new();
                match flags {
                    FlagSpec::Positional(names) => {
                        for (i, name) in names.iter().enumerate() {
                            obj.insert(name.clone(), Value::Bool((bits >> i) & 1 != 0));
                        }
                    }
                    FlagSpec::Masked(entries) => {
                        for (name, mask) in entries {
                            obj.insert(name.clone(), Value::Bool(bits & mask != 0));
                        }
                    }
                }
                Ok(Value::Object(obj))
            }
            TypeDef::EntityMetadataLoop { end, elem } => {
                let mut items = Vec::new();
                loop {
                    if r.peek_u8()? == *end {
                        r.take(1)?;
                        return Ok(Value::Array(items));
                    }
                    items.push(self.read(elem, r, ctx)?);
                }
            }
            TypeDef::TopBitSetTerminatedArray { elem } => {
                self.read_top_bit_terminated(elem, r, ctx)
            }
            TypeDef::RegistryEntryHolder {
                base_name,
                otherwise_name,
                otherwise,
            } => {
                let disc = r.get_varint()?;
                let mut obj = Map::new();
                if disc == 0 {
                    obj.insert(otherwise_name.clone(), self.read(otherwise, r, ctx)?);
                } else {
                    obj.insert(base_name.clone(), Value::from((disc - 1) as i64));
                }
                Ok(Value::Object(obj))
            }
            TypeDef::RegistryEntryHolderSet {
                base_name,
                base,
                otherwise_name,
                otherwise,
            } => {
                let disc = r.get_varint()?;
                let mut obj = Map::new();
                if disc == 0 {
                    obj.insert(base_name.clone(), self.read(base, r, ctx)?);
                } else {
                    let mut ids = Vec::with_capacity((disc - 1) as usize);
                    for _ in 0..disc - 1 {
                        ids.push(self.read(otherwise, r, ctx)?);
                    }
                    obj.insert(otherwise_name.clone(), Value::Array(ids));
                }
                Ok(Value::Object(obj))
            }
        }
    }

    fn read_container(
        &self,
        fields: &[Field],
        r: &mut Reader<'_>,
        parent: Option<&ContextChain<'_>>,
    ) -> Result<Value, ProtoError> {
        let mut obj = Map::new();
        for field in fields {
            let value = {
                let chain = ContextChain {
                    map: &obj,
                    parent,
                };
                self.read(&field.ty, r, Some(&chain))?
            };
            match &field.name {
                Some(name) => {
                    obj.insert(name.clone(), value);
                }
                None => merge_anonymous(&mut obj, value)?,
            }
        }
        Ok(Value::Object(obj))
    }

    fn read_top_bit_terminated(
        &self,
        elem: &TypeRef,
        r: &mut Reader<'_>,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<Value, ProtoError> {
        let mut items = Vec::new();
        loop {
            let first = r.peek_u8()?;
            let more = first & 0x80 != 0;
            // The entry is decoded with its continuation bit stripped.
            let mut scratch = r.rest().to_vec();
            scratch[0] = first & 0x7f;
            let mut sub = Reader::new(&scratch);
            let item = self.read(elem, &mut sub, ctx)?;
            let consumed = sub.pos();
            r.take(consumed)?;
            items.push(item);
            if !more {
                return Ok(Value::Array(items));
            }
        }
    }

    pub(crate) fn read_count(
        &self,
        spec: &CountSpec,
        r: &mut Reader<'_>,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<usize, ProtoError> {
        let raw = match spec {
            CountSpec::Fixed(n) => return Ok(*n),
            CountSpec::Prefixed(ty) => {
                let v = self.read(ty, r, ctx)?;
                num_i64(&v)?
            }
            CountSpec::FieldRef(path) => {
                let ctx = ctx.ok_or_else(|| ProtoError::BadContextPath(path.clone()))?;
                let v = ctx
                    .resolve(path)
                    .ok_or_else(|| ProtoError::BadContextPath(path.clone()))?;
                num_i64(v)?
            }
        };
        if raw < 0 {
            return Err(ProtoError::NegativeLength(raw as i32));
        }
        Ok(raw as usize)
    }

    pub(crate) fn select_branch<'s>(
        &'s self,
        compare_to: &str,
        cases: &'s std::collections::HashMap<String, TypeRef>,
        default: Option<&'s TypeRef>,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<&'s TypeRef, ProtoError> {
        let ctx = ctx.ok_or_else(|| ProtoError::BadContextPath(compare_to.to_string()))?;
        let target = ctx
            .resolve(compare_to)
            .ok_or_else(|| ProtoError::BadContextPath(compare_to.to_string()))?;
        let disc = discriminant_string(target);
        if let Some(branch) = cases.get(&disc) {
            return Ok(branch);
        }
        default.ok_or(ProtoError::SwitchMiss {
            path: compare_to.to_string(),
            value: disc,
        })
    }
}

fn float_value(v: f64) -> Result<Value, ProtoError> {
    Number::from_f64(v)
        .map(Value::Number)
        .ok_or(ProtoError::BadValue {
            expected: "finite float",
            got: v.to_string(),
        })
}

/// An anonymous field contributes its object entries to the parent; a void
/// (or absent optional) contributes nothing.
fn merge_anonymous(obj: &mut Map<String, Value>, value: Value) -> Result<(), ProtoError> {
    match value {
        Value::Object(inner) => {
            for (k, v) in inner {
                obj.insert(k, v);
            }
            Ok(())
        }
        Value::Null => Ok(()),
        other => Err(ProtoError::BadValue {
            expected: "object for anonymous field",
            got: other.to_string(),
        }),
    }
}

/// Bit pattern of a decoded integer, for bitflags.
fn bit_pattern(v: &Value) -> Result<u64, ProtoError> {
    if let Some(u) = v.as_u64() {
        return Ok(u);
    }
    if let Some(i) = v.as_i64() {
        return Ok(i as u64);
    }
    Err(ProtoError::BadValue {
        expected: "integer",
        got: v.to_string(),
    })
}

fn read_bitfield(
    members: &[super::def::BitfieldMember],
    r: &mut Reader<'_>,
) -> Result<Value, ProtoError> {
    let total: u32 = members.iter().map(|m| m.bits).sum();
    let nbytes = total.div_ceil(8) as usize;
    let mut acc: u128 = 0;
    for &b in r.take(nbytes)? {
        acc = (acc << 8) | b as u128;
    }

    let mut remaining = (nbytes as u32) * 8;
    let mut obj = Map::new();
    for member in members {
        remaining -= member.bits;
        let mask = if member.bits == 128 {
            u128::MAX
        } else {
            (1u128 << member.bits) - 1
        };
        let raw = (acc >> remaining) & mask;
        let value = if member.signed && raw >= 1 << (member.bits - 1) {
            Value::from((raw as i128 - (1i128 << member.bits)) as i64)
        } else {
            Value::from(raw as u64)
        };
        obj.insert(member.name.clone(), value);
    }
    Ok(Value::Object(obj))
}
