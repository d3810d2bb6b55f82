//! Write interpretation of schema types. The value being written supplies
//! the context for `switch` and field-referenced counts.

use bytes::{BufMut, BytesMut};
use serde_json::Value;
use uuid::Uuid;

use super::def::{BitfieldMember, CountSpec, Field, FlagSpec, TypeDef, TypeRef};
use super::{num_f64, num_i64, num_u64, value_to_bytes, ContextChain, TypeRegistry};
use crate::codec::ProtoEncode;
use crate::error::ProtoError;
use crate::types::{VarInt, VarLong};

impl TypeRegistry {
    pub fn write(
        &self,
        ty: &TypeRef,
        value: &Value,
        out: &mut BytesMut,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<(), ProtoError> {
        let def = self.resolve(ty)?;
        match def {
            TypeDef::Bool => {
                out.put_u8(value.as_bool().ok_or_else(|| bad("bool", value))? as u8);
            }
            TypeDef::I8 => out.put_i8(int_in_range(value, i8::MIN as i64, i8::MAX as i64)? as i8),
            TypeDef::U8 => out.put_u8(uint_in_range(value, u8::MAX as u64)? as u8),
            TypeDef::I16 => {
                out.put_i16(int_in_range(value, i16::MIN as i64, i16::MAX as i64)? as i16)
            }
            TypeDef::U16 => out.put_u16(uint_in_range(value, u16::MAX as u64)? as u16),
            TypeDef::I32 => {
                out.put_i32(int_in_range(value, i32::MIN as i64, i32::MAX as i64)? as i32)
            }
            TypeDef::U32 => out.put_u32(uint_in_range(value, u32::MAX as u64)? as u32),
            TypeDef::I64 => out.put_i64(num_i64(value)?),
            TypeDef::U64 => out.put_u64(num_u64(value)?),
            TypeDef::F32 => out.put_f32(num_f64(value)? as f32),
            TypeDef::F64 => out.put_f64(num_f64(value)?),
            TypeDef::VarInt => {
                VarInt(int_in_range(value, i32::MIN as i64, i32::MAX as i64)? as i32)
                    .proto_encode(out)
            }
            TypeDef::VarLong => VarLong(num_i64(value)?).proto_encode(out),
            TypeDef::Void => {}
            TypeDef::Uuid => {
                let s = value.as_str().ok_or_else(|| bad("UUID string", value))?;
                let uuid = Uuid::parse_str(s).map_err(|_| bad("UUID string", value))?;
                out.put_slice(uuid.as_bytes());
            }
            TypeDef::RestBuffer | TypeDef::Nbt | TypeDef::AnonymousNbt => {
                out.put_slice(&value_to_bytes(value)?);
            }
            TypeDef::PString { count } => {
                let s = value.as_str().ok_or_else(|| bad("string", value))?;
                self.write_count(count, s.len(), out, ctx)?;
                out.put_slice(s.as_bytes());
            }
            TypeDef::Buffer { count } => {
                let bytes = value_to_bytes(value)?;
                self.write_count(count, bytes.len(), out, ctx)?;
                out.put_slice(&bytes);
            }
            TypeDef::Container { fields } => self.write_container(fields, value, out, ctx)?,
            TypeDef::Array { count, elem } => {
                let items = value.as_array().ok_or_else(|| bad("array", value))?;
                self.write_count(count, items.len(), out, ctx)?;
                for item in items {
                    self.write(elem, item, out, ctx)?;
                }
            }
            TypeDef::Mapper { base, to_id, .. } => {
                let name = value.as_str().ok_or_else(|| bad("mapped name", value))?;
                let id = to_id
                    .get(name)
                    .ok_or_else(|| ProtoError::MapperMiss(name.to_string()))?;
                self.write(base, &Value::from(*id), out, ctx)?;
            }
            TypeDef::Switch {
                compare_to,
                cases,
                default,
            } => {
                let branch = self.select_branch(compare_to, cases, default.as_deref(), ctx)?;
                self.write(branch, value, out, ctx)?;
            }
            TypeDef::Option(inner) => {
                if value.is_null() {
                    out.put_u8(0);
                } else {
                    out.put_u8(1);
                    self.write(inner, value, out, ctx)?;
                }
            }
            TypeDef::Bitfield { members } => write_bitfield(members, value, out)?,
            TypeDef::Bitflags { base, flags, shift } => {
                let obj = value.as_object().ok_or_else(|| bad("flag object", value))?;
                let mut bits: u64 = 0;
                match flags {
                    FlagSpec::Positional(names) => {
                        for (i, name) in names.iter().enumerate() {
                            if obj.get(name).and_then(Value::as_bool) == Some(true) {
                                bits |= 1 << i;
                            }
                        }
                    }
                    FlagSpec::Masked(entries) => {
                        for (name, mask) in entries {
                            if obj.get(name).and_then(Value::as_bool) == Some(true) {
                                bits |= mask;
                            }
                        }
                    }
                }
                self.write(base, &Value::from(bits << shift), out, ctx)?;
            }
            TypeDef::EntityMetadataLoop { end, elem } => {
                let items = value.as_array().ok_or_else(|| bad("array", value))?;
                for item in items {
                    self.write(elem, item, out, ctx)?;
                }
                out.put_u8(*end);
            }
            TypeDef::TopBitSetTerminatedArray { elem } => {
                let items = value.as_array().ok_or_else(|| bad("array", value))?;
                for (i, item) in items.iter().enumerate() {
                    let mut scratch = BytesMut::new();
                    self.write(elem, item, &mut scratch, ctx)?;
                    if scratch.is_empty() {
                        return Err(bad("non-empty entry", item));
                    }
                    if i + 1 < items.len() {
                        scratch[0] |= 0x80;
                    }
                    out.put_slice(&scratch);
                }
            }
            TypeDef::RegistryEntryHolder {
                base_name,
                otherwise_name,
                otherwise,
            } => {
                let obj = value.as_object().ok_or_else(|| bad("object", value))?;
                if let Some(inline) = obj.get(otherwise_name) {
                    VarInt(0).proto_encode(out);
                    self.write(otherwise, inline, out, ctx)?;
                } else if let Some(id) = obj.get(base_name) {
                    let id = num_i64(id)?;
                    VarInt(id as i32 + 1).proto_encode(out);
                } else {
                    return Err(bad("holder object", value));
                }
            }
            TypeDef::RegistryEntryHolderSet {
                base_name,
                base,
                otherwise_name,
                otherwise,
            } => {
                let obj = value.as_object().ok_or_else(|| bad("object", value))?;
                if let Some(tag) = obj.get(base_name) {
                    VarInt(0).proto_encode(out);
                    self.write(base, tag, out, ctx)?;
                } else if let Some(ids) = obj.get(otherwise_name) {
                    let ids = ids.as_array().ok_or_else(|| bad("id array", value))?;
                    VarInt(ids.len() as i32 + 1).proto_encode(out);
                    for id in ids {
                        self.write(otherwise, id, out, ctx)?;
                    }
                } else {
                    return Err(bad("holder set object", value));
                }
            }
        }
        Ok(())
    }

    fn write_container(
        &self,
        fields: &[Field],
        value: &Value,
        out: &mut BytesMut,
        parent: Option<&ContextChain<'_>>,
    ) -> Result<(), ProtoError> {
        let obj = value.as_object().ok_or_else(|| bad("object", value))?;
        for field in fields {
            let chain = ContextChain { map: obj, parent };
            match &field.name {
                Some(name) => {
                    let v = obj.get(name).unwrap_or(&Value::Null);
                    self.write(&field.ty, v, out, Some(&chain))?;
                }
                // Anonymous fields draw their entries from this object.
                None => self.write(&field.ty, value, out, Some(&chain))?,
            }
        }
        Ok(())
    }

    fn write_count(
        &self,
        spec: &CountSpec,
        actual: usize,
        out: &mut BytesMut,
        ctx: Option<&ContextChain<'_>>,
    ) -> Result<(), ProtoError> {
        match spec {
            CountSpec::Fixed(n) => {
                if *n != actual {
                    return Err(ProtoError::BadValue {
                        expected: "fixed-count collection",
                        got: format!("{actual} items, schema says {n}"),
                    });
                }
                Ok(())
            }
            CountSpec::Prefixed(ty) => self.write(ty, &Value::from(actual as u64), out, ctx),
            // The count is carried by a sibling field; nothing to emit here.
            CountSpec::FieldRef(_) => Ok(()),
        }
    }
}

fn bad(expected: &'static str, value: &Value) -> ProtoError {
    ProtoError::BadValue {
        expected,
        got: value.to_string(),
    }
}

fn int_in_range(value: &Value, min: i64, max: i64) -> Result<i64, ProtoError> {
    let n = num_i64(value)?;
    if n < min || n > max {
        return Err(ProtoError::BadValue {
            expected: "integer in range",
            got: value.to_string(),
        });
    }
    Ok(n)
}

fn uint_in_range(value: &Value, max: u64) -> Result<u64, ProtoError> {
    let n = num_u64(value)?;
    if n > max {
        return Err(ProtoError::BadValue {
            expected: "unsigned integer in range",
            got: value.to_string(),
        });
    }
    Ok(n)
}

fn write_bitfield(
    members: &[BitfieldMember],
    value: &Value,
    out: &mut BytesMut,
) -> Result<(), ProtoError> {
    let obj = value.as_object().ok_or_else(|| bad("object", value))?;
    let total: u32 = members.iter().map(|m| m.bits).sum();
    let nbytes = total.div_ceil(8) as usize;

    let mut acc: u128 = 0;
    for member in members {
        let raw = obj.get(&member.name).unwrap_or(&Value::Null);
        let bits = if member.signed {
            num_i64(raw)? as u64
        } else {
            num_u64(raw)?
        };
        let mask = if member.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << member.bits) - 1
        };
        acc = (acc << member.bits) | (bits & mask) as u128;
    }
    // Fields are packed from the most significant bit; padding sits at the
    // low end of the final byte.
    acc <<= nbytes as u32 * 8 - total;
    for i in (0..nbytes).rev() {
        out.put_u8((acc >> (i * 8)) as u8);
    }
    Ok(())
}
